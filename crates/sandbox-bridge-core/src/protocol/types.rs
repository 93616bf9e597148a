//! Message types for the client control protocol.

use serde_json::{Value, json};

/// Message sent by a client over its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Liveness probe; answered with [`EventMessage::Pong`].
    Ping,
    /// Run the backend unit with the given (non-empty) text.
    Message { text: String },
}

/// Message sent to a client.
///
/// Within one request, any number of `Output` events may be followed by
/// exactly one `Complete` or `Error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventMessage {
    Pong,
    Output { data: String },
    Complete { exit_code: i32 },
    Error { reason: String },
}

impl EventMessage {
    pub fn output(data: impl Into<String>) -> Self {
        Self::Output { data: data.into() }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error {
            reason: reason.into(),
        }
    }

    /// Whether this event ends a request's event sequence.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }

    /// Wire representation as a JSON value.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Pong => json!({ "type": "pong" }),
            Self::Output { data } => json!({ "type": "output", "data": data }),
            Self::Complete { exit_code } => json!({ "type": "complete", "exitCode": exit_code }),
            Self::Error { reason } => json!({ "type": "error", "error": reason }),
        }
    }

    /// Serialize for the wire. Total: every variant has a JSON form.
    pub fn encode(&self) -> String {
        self.to_json().to_string()
    }

    /// Parse an event message, as a client would.
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(raw).map_err(|_| ProtocolError::InvalidJson)?;
        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?;
        let field = |name: &str| {
            value
                .get(name)
                .and_then(Value::as_str)
                .map(String::from)
                .ok_or_else(|| ProtocolError::InvalidMessage(format!("'{tag}' requires '{name}'")))
        };

        match tag {
            "pong" => Ok(Self::Pong),
            "output" => Ok(Self::Output {
                data: field("data")?,
            }),
            "complete" => {
                let exit_code = value
                    .get("exitCode")
                    .and_then(Value::as_i64)
                    .and_then(|c| i32::try_from(c).ok())
                    .ok_or_else(|| {
                        ProtocolError::InvalidMessage("'complete' requires 'exitCode'".into())
                    })?;
                Ok(Self::Complete { exit_code })
            }
            "error" => Ok(Self::Error {
                reason: field("error")?,
            }),
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}

impl From<&ProtocolError> for EventMessage {
    fn from(err: &ProtocolError) -> Self {
        Self::error(err.to_string())
    }
}

/// Classification of protocol failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolErrorKind {
    InvalidMessage,
}

/// Malformed or unrecognised client input.
///
/// Always recovered locally: surfaced to the client as an `error` event
/// while the connection stays open.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid JSON")]
    InvalidJson,

    #[error("Missing 'type' field")]
    MissingType,

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

impl ProtocolError {
    pub const fn kind(&self) -> ProtocolErrorKind {
        match self {
            Self::InvalidJson | Self::MissingType | Self::UnknownType(_) | Self::InvalidMessage(_) => {
                ProtocolErrorKind::InvalidMessage
            }
        }
    }
}
