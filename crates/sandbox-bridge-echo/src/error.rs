//! Echo channel errors.

use std::path::PathBuf;
use std::time::Duration;

use sandbox_bridge_core::framing::FrameError;

/// Errors from echo channel operations.
#[derive(Debug, thiserror::Error)]
pub enum EchoError {
    /// Nothing is listening on the socket path.
    #[error("No echo server listening at {}", path.display())]
    NoListener { path: PathBuf },

    /// The socket exists but the connection failed for another reason.
    #[error("Failed to connect to echo server at {}: {source}", path.display())]
    ConnectFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out after {0:?} waiting for echo response")]
    Timeout(Duration),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("Echo server closed the connection before responding")]
    ClosedBeforeResponse,

    #[error("Failed to bind echo socket at {}: {source}", path.display())]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Echo I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EchoError {
    /// Whether the connection could not be established at all.
    pub const fn is_connection_unavailable(&self) -> bool {
        matches!(self, Self::NoListener { .. } | Self::ConnectFailed { .. })
    }

    pub(crate) fn from_connect(path: PathBuf, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused => {
                Self::NoListener { path }
            }
            _ => Self::ConnectFailed { path, source },
        }
    }
}
