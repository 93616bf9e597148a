//! Echo server: accepts Unix socket connections and echoes each frame.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use sandbox_bridge_core::LineBuffer;

use crate::ECHO_PREFIX;
use crate::error::EchoError;

const READ_CHUNK: usize = 4096;

/// Pause after a failed accept so a persistent error (e.g. `EMFILE`)
/// does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Build the response frame for one request payload.
///
/// `payload` comes out of a [`LineBuffer`] and so never contains the
/// terminator.
pub fn echo_response(payload: &[u8]) -> Vec<u8> {
    let mut response = Vec::with_capacity(ECHO_PREFIX.len() + payload.len() + 1);
    response.extend_from_slice(ECHO_PREFIX.as_bytes());
    response.extend_from_slice(payload);
    response.push(b'\n');
    response
}

/// Serve one connection until the peer closes it.
///
/// Handles several frames per read and frames split across reads. Returns
/// the number of frames answered.
pub async fn serve_connection<S>(stream: S) -> Result<usize, EchoError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut buffer = LineBuffer::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut answered = 0;

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        debug!(bytes = n, buffered = buffer.len() + n, "Received data chunk");

        for frame in buffer.push(&chunk[..n]) {
            debug!(payload = %String::from_utf8_lossy(&frame), "Received complete message");
            writer.write_all(&echo_response(&frame)).await?;
            answered += 1;
        }
        writer.flush().await?;
    }

    if !buffer.is_empty() {
        debug!(pending = buffer.len(), "Client disconnected with unterminated data");
    }
    Ok(answered)
}

/// Echo server bound to a filesystem socket path.
///
/// The socket file is removed when the server is dropped.
pub struct EchoServer {
    listener: UnixListener,
    path: PathBuf,
}

impl EchoServer {
    /// Bind the socket, replacing a stale socket file if present.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self, EchoError> {
        let path = path.as_ref().to_path_buf();
        let bind_err = |source| EchoError::Bind {
            path: path.clone(),
            source,
        };

        if path.exists() {
            info!(path = %path.display(), "Removing existing socket");
            std::fs::remove_file(&path).map_err(bind_err)?;
        }
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(bind_err)?;
        }

        let listener = UnixListener::bind(&path).map_err(bind_err)?;
        info!(path = %path.display(), "Echo server listening");
        Ok(Self { listener, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept connections until `shutdown` flips to `true`.
    ///
    /// Each connection runs on its own task; errors on one connection never
    /// stop the server. Open connections are aborted on shutdown.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> Result<(), EchoError> {
        let mut connections = JoinSet::new();
        let mut next_id: u64 = 0;

        while !*shutdown.borrow() {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, _) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            accept_failed(&e).await;
                            continue;
                        }
                    };
                    next_id += 1;
                    let conn_id = next_id;
                    debug!(conn_id, "Client connected");
                    connections.spawn(async move {
                        match serve_connection(stream).await {
                            Ok(answered) => debug!(conn_id, answered, "Client disconnected"),
                            Err(e) => warn!(conn_id, error = %e, "Echo connection error"),
                        }
                    });
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(path = %self.path.display(), open = connections.len(), "Echo server shutting down");
        connections.shutdown().await;
        Ok(())
    }
}

async fn accept_failed(error: &std::io::Error) {
    warn!(%error, backoff = ?ACCEPT_BACKOFF, "Failed to accept echo connection");
    tokio::time::sleep(ACCEPT_BACKOFF).await;
}

impl Drop for EchoServer {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %self.path.display(), error = %e, "Failed to remove echo socket");
        }
    }
}
