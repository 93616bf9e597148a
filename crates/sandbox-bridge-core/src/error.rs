//! Error types for the `sandbox-bridge` core library.

use thiserror::Error;

/// Result type alias using the core Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `sandbox-bridge` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Client protocol error
    #[error(transparent)]
    Protocol(#[from] crate::protocol::ProtocolError),

    /// Backend event decoding error
    #[error(transparent)]
    Event(#[from] crate::events::EventDecodeError),

    /// Frame encoding error
    #[error(transparent)]
    Frame(#[from] crate::framing::FrameError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
