//! Backend event types.

use serde::{Deserialize, Serialize};

/// One element of a backend unit's event stream.
///
/// Produced incrementally by the spawned unit and consumed exactly once, in
/// order, by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendEvent {
    Stdout {
        #[serde(default)]
        data: String,
    },
    Stderr {
        #[serde(default)]
        data: String,
    },
    Complete {
        #[serde(rename = "exitCode")]
        exit_code: i32,
    },
    Error {
        error: String,
    },
}

impl BackendEvent {
    pub fn stdout(data: impl Into<String>) -> Self {
        Self::Stdout { data: data.into() }
    }

    pub fn stderr(data: impl Into<String>) -> Self {
        Self::Stderr { data: data.into() }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
        }
    }

    /// Whether this event ends the stream.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }

    /// Tag name as it appears on the wire.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Stdout { .. } => "stdout",
            Self::Stderr { .. } => "stderr",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }
}

/// Errors decoding a backend event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventDecodeError {
    #[error("Malformed backend event: {0}")]
    Malformed(String),

    #[error("Backend event missing 'type' field")]
    MissingType,

    #[error("Unknown backend event type: {0}")]
    UnknownType(String),
}
