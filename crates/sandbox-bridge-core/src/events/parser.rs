//! JSON decoder for backend events.
//!
//! Unknown fields are ignored. Unknown event types are errors: the relay
//! must not silently skip an event it does not understand.

use serde_json::Value;

use super::types::{BackendEvent, EventDecodeError};

const KNOWN_TYPES: [&str; 4] = ["stdout", "stderr", "complete", "error"];

/// Parse a single JSON-encoded backend event.
pub fn parse_event(json: &str) -> Result<BackendEvent, EventDecodeError> {
    let raw: Value =
        serde_json::from_str(json).map_err(|e| EventDecodeError::Malformed(e.to_string()))?;
    parse_value(raw)
}

/// Convert a JSON value into a backend event.
pub fn parse_value(raw: Value) -> Result<BackendEvent, EventDecodeError> {
    let event_type = raw
        .get("type")
        .and_then(Value::as_str)
        .ok_or(EventDecodeError::MissingType)?;

    if !KNOWN_TYPES.contains(&event_type) {
        return Err(EventDecodeError::UnknownType(event_type.to_string()));
    }

    serde_json::from_value(raw).map_err(|e| EventDecodeError::Malformed(e.to_string()))
}
