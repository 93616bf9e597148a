//! Echo client: one connection, one frame out, one frame back.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::{debug, trace};

use sandbox_bridge_core::LineBuffer;
use sandbox_bridge_core::framing::encode_frame;

use crate::error::EchoError;

/// Bounded wait for the response frame.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for the echo server.
///
/// Uses a connection per request. Dropping an in-flight
/// [`request`](Self::request) future closes the connection.
#[derive(Debug, Clone)]
pub struct EchoClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl EchoClient {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `payload` as one frame and wait for the echoed frame.
    ///
    /// Returns the response payload without its terminator.
    pub async fn request(&self, payload: &str) -> Result<String, EchoError> {
        let frame = encode_frame(payload.as_bytes())?;
        let start = Instant::now();

        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| EchoError::from_connect(self.socket_path.clone(), e))?;
        debug!(path = %self.socket_path.display(), "Connected to echo server");

        let response = tokio::time::timeout(self.timeout, exchange(stream, &frame))
            .await
            .map_err(|_| EchoError::Timeout(self.timeout))??;

        debug!(
            elapsed_ms = start.elapsed().as_millis(),
            response_len = response.len(),
            "Echo round trip complete"
        );
        Ok(response)
    }
}

async fn exchange(mut stream: UnixStream, frame: &[u8]) -> Result<String, EchoError> {
    stream.write_all(frame).await?;
    stream.flush().await?;
    trace!("Request sent, waiting for response");

    let mut buffer = LineBuffer::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(EchoError::ClosedBeforeResponse);
        }
        if let Some(first) = buffer.push(&chunk[..n]).into_iter().next() {
            return Ok(String::from_utf8_lossy(&first).into_owned());
        }
    }
}
