//! Backend unit lifecycle manager.
//!
//! Spawns one backend unit per request and turns its output into a
//! [`BackendEventStream`].

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tracing::{debug, info, warn};

use sandbox_bridge_core::config::{BackendConfig, EchoConfig, StreamFormat};
use sandbox_bridge_core::events::{BackendEvent, SseDecoder};
use sandbox_bridge_core::framing::LineBuffer;

use super::stream::{BackendEventStream, StreamItem};

const READ_CHUNK: usize = 4096;
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Request to run one backend unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub backend_unit_id: String,
    pub text: String,
}

impl SpawnRequest {
    pub fn new(backend_unit_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            backend_unit_id: backend_unit_id.into(),
            text: text.into(),
        }
    }
}

/// Something that can start a backend unit for a request.
pub trait Backend: Send + Sync {
    fn start(&self, request: SpawnRequest) -> Result<BackendEventStream, SubprocessError>;
}

/// Spawns backend units as child processes.
pub struct SubprocessManager {
    config: BackendConfig,
    echo: EchoConfig,
    slots: Arc<Semaphore>,
}

impl SubprocessManager {
    pub fn new(config: BackendConfig, echo: EchoConfig) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_processes));
        Self {
            config,
            echo,
            slots,
        }
    }

    /// Number of backend units currently running.
    pub fn active_count(&self) -> usize {
        self.config
            .max_processes
            .saturating_sub(self.slots.available_permits())
    }

    pub const fn capacity(&self) -> usize {
        self.config.max_processes
    }

    /// Argument vector passed to the backend binary (after argv[0]).
    ///
    /// The text travels as a single argument after `--`; no shell is
    /// involved, so it is never interpreted.
    pub fn build_args(&self, text: &str) -> Result<Vec<String>, SubprocessError> {
        if text.is_empty() {
            return Err(SubprocessError::InvalidArgument {
                reason: "text must not be empty".to_string(),
            });
        }
        if text.contains('\0') {
            return Err(SubprocessError::InvalidArgument {
                reason: "text must not contain NUL bytes".to_string(),
            });
        }

        let mut args = self.config.args.clone();
        args.push("--socket".to_string());
        args.push(self.echo.socket_path.display().to_string());
        args.push("--".to_string());
        args.push(text.to_string());
        Ok(args)
    }

    fn working_directory(&self) -> Option<PathBuf> {
        let requested = self.config.working_directory.as_ref()?;
        if requested.is_dir() {
            return Some(requested.clone());
        }
        let fallback = dirs::home_dir().unwrap_or_else(|| {
            warn!("dirs::home_dir() returned None; falling back to temp_dir for working directory");
            std::env::temp_dir()
        });
        warn!(
            requested = %requested.display(),
            fallback = %fallback.display(),
            "Working directory missing, using fallback"
        );
        Some(fallback)
    }

    /// Spawn a backend unit for `request`.
    pub fn spawn(&self, request: SpawnRequest) -> Result<BackendEventStream, SubprocessError> {
        let args = self.build_args(&request.text)?;

        let permit = Arc::clone(&self.slots).try_acquire_owned().map_err(|_| {
            SubprocessError::PoolExhausted {
                current: self.active_count(),
                max: self.config.max_processes,
            }
        })?;

        let mut cmd = Command::new(&self.config.bin);
        cmd.args(&args)
            .env("SANDBOX_BRIDGE_UNIT_ID", &request.backend_unit_id)
            .env(
                "SANDBOX_BRIDGE_ECHO_TIMEOUT_MS",
                self.echo.response_timeout_ms.to_string(),
            )
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = self.working_directory() {
            cmd.current_dir(dir);
        }

        let process_id = uuid::Uuid::new_v4().to_string();
        info!(
            process_id,
            bin = %self.config.bin.display(),
            backend_unit_id = %request.backend_unit_id,
            format = ?self.config.stream_format,
            "Spawning backend unit"
        );

        let mut child = cmd.spawn().map_err(|e| SubprocessError::SpawnFailed {
            reason: e.to_string(),
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SubprocessError::SpawnFailed {
                reason: "Failed to capture stdout".to_string(),
            })?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SubprocessError::SpawnFailed {
                reason: "Failed to capture stderr".to_string(),
            })?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let pipes = Pipes {
            child,
            stdout,
            stderr,
            tx,
            process_id: process_id.clone(),
            _permit: permit,
        };
        let task = match self.config.stream_format {
            StreamFormat::Lines => tokio::spawn(pipes.pump_lines()),
            StreamFormat::Sse => tokio::spawn(pipes.pump_sse()),
        };

        Ok(BackendEventStream::from_process(rx, process_id, task))
    }
}

impl Backend for SubprocessManager {
    fn start(&self, request: SpawnRequest) -> Result<BackendEventStream, SubprocessError> {
        self.spawn(request)
    }
}

/// A running child with its captured pipes. Owns the pool slot.
struct Pipes {
    child: Child,
    stdout: ChildStdout,
    stderr: ChildStderr,
    tx: mpsc::Sender<StreamItem>,
    process_id: String,
    _permit: OwnedSemaphorePermit,
}

impl Pipes {
    /// Forward stdout and stderr lines as they arrive, then the exit status.
    async fn pump_lines(mut self) {
        let mut out_lines = LineBuffer::new();
        let mut err_lines = LineBuffer::new();
        let mut out_chunk = vec![0u8; READ_CHUNK];
        let mut err_chunk = vec![0u8; READ_CHUNK];
        let mut out_open = true;
        let mut err_open = true;

        while out_open || err_open {
            let mut batch = Vec::new();
            let mut batch_is_stderr = false;
            tokio::select! {
                read = self.stdout.read(&mut out_chunk), if out_open => match read {
                    Ok(0) => {
                        out_open = false;
                        batch.extend(out_lines.take_remainder());
                    }
                    Ok(n) => batch.extend(out_lines.push(&out_chunk[..n])),
                    Err(e) => {
                        self.send(Err(e.into())).await;
                        return;
                    }
                },
                read = self.stderr.read(&mut err_chunk), if err_open => match read {
                    Ok(0) => {
                        err_open = false;
                        batch_is_stderr = true;
                        batch.extend(err_lines.take_remainder());
                    }
                    Ok(n) => {
                        batch_is_stderr = true;
                        batch.extend(err_lines.push(&err_chunk[..n]));
                    }
                    Err(e) => {
                        self.send(Err(e.into())).await;
                        return;
                    }
                },
            }
            for line in batch {
                let data = line_text(&line);
                let event = if batch_is_stderr {
                    BackendEvent::stderr(data)
                } else {
                    BackendEvent::stdout(data)
                };
                if !self.send(Ok(event)).await {
                    return;
                }
            }
        }

        let terminal = match self.child.wait().await {
            Ok(status) => exit_event(status),
            Err(e) => BackendEvent::error(format!("Failed to wait for backend unit: {e}")),
        };
        debug!(process_id = %self.process_id, event = terminal.kind(), "Backend unit finished");
        self.send(Ok(terminal)).await;
    }

    /// Decode SSE-framed events from stdout; stderr is diagnostics only.
    async fn pump_sse(mut self) {
        let mut decoder = SseDecoder::new();
        let mut out_chunk = vec![0u8; READ_CHUNK];
        let mut err_chunk = vec![0u8; READ_CHUNK];
        let mut err_lines = LineBuffer::new();
        let mut err_open = true;

        loop {
            tokio::select! {
                read = self.stdout.read(&mut out_chunk) => match read {
                    Ok(0) => break,
                    Ok(n) => {
                        for item in decoder.push(&out_chunk[..n]) {
                            if !self.send(item.map_err(Into::into)).await {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        self.send(Err(e.into())).await;
                        return;
                    }
                },
                read = self.stderr.read(&mut err_chunk), if err_open => {
                    err_open = log_stderr(&self.process_id, read, &err_chunk, &mut err_lines);
                }
            }
        }

        if let Some(item) = decoder.finish() {
            self.send(item.map_err(Into::into)).await;
        }

        // Stdout is the event stream: once it closes the stream ends, even if
        // the child lingers. Stderr keeps draining so the child never blocks
        // on a full pipe while it is reaped.
        let Self {
            mut child,
            mut stderr,
            tx,
            process_id,
            _permit,
            ..
        } = self;
        drop(tx);

        let drain = async {
            while err_open {
                let read = stderr.read(&mut err_chunk).await;
                err_open = log_stderr(&process_id, read, &err_chunk, &mut err_lines);
            }
        };
        let ((), status) = tokio::join!(drain, child.wait());
        match status {
            Ok(status) => debug!(%process_id, ?status, "Backend unit exited"),
            Err(e) => warn!(%process_id, error = %e, "Failed to wait for backend unit"),
        }
    }

    /// Returns `false` once the consumer has gone away.
    async fn send(&self, item: StreamItem) -> bool {
        if self.tx.send(item).await.is_err() {
            debug!(process_id = %self.process_id, "Event stream dropped, stopping reader");
            return false;
        }
        true
    }
}

/// Log complete stderr lines from one read. Returns whether stderr is still open.
fn log_stderr(
    process_id: &str,
    read: std::io::Result<usize>,
    chunk: &[u8],
    lines: &mut LineBuffer,
) -> bool {
    match read {
        Ok(0) => {
            if let Some(tail) = lines.take_remainder() {
                warn!(process_id, "stderr: {}", line_text(&tail));
            }
            false
        }
        Ok(n) => {
            for line in lines.push(&chunk[..n]) {
                warn!(process_id, "stderr: {}", line_text(&line));
            }
            true
        }
        Err(e) => {
            debug!(process_id, error = %e, "Failed to read stderr");
            false
        }
    }
}

fn line_text(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    text.strip_suffix('\r').unwrap_or(&text).to_string()
}

fn exit_event(status: ExitStatus) -> BackendEvent {
    status.code().map_or_else(
        || BackendEvent::error(format!("Backend unit terminated abnormally ({status})")),
        |exit_code| BackendEvent::Complete { exit_code },
    )
}

/// Errors from subprocess operations.
#[derive(Debug, thiserror::Error)]
pub enum SubprocessError {
    #[error("Subprocess pool exhausted ({current}/{max})")]
    PoolExhausted { current: usize, max: usize },

    #[error("Failed to spawn subprocess: {reason}")]
    SpawnFailed { reason: String },

    #[error("Invalid backend argument: {reason}")]
    InvalidArgument { reason: String },
}
