//! Control message decoder.
//!
//! Tolerant of unknown fields, strict about the `type` tag: anything that is
//! not a known control message is an error, never a silent no-op.

use serde_json::Value;

use super::types::{ControlMessage, ProtocolError};

/// Decode a raw client frame (text or binary) into a control message.
pub fn decode(raw: &[u8]) -> Result<ControlMessage, ProtocolError> {
    let text = std::str::from_utf8(raw).map_err(|_| ProtocolError::InvalidJson)?;
    decode_str(text)
}

/// Decode a text client frame into a control message.
pub fn decode_str(raw: &str) -> Result<ControlMessage, ProtocolError> {
    let value: Value = serde_json::from_str(raw).map_err(|_| ProtocolError::InvalidJson)?;
    decode_value(&value)
}

fn decode_value(raw: &Value) -> Result<ControlMessage, ProtocolError> {
    let msg_type = raw
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?;

    match msg_type {
        "ping" => Ok(ControlMessage::Ping),
        "message" => parse_message(raw),
        other => Err(ProtocolError::UnknownType(other.to_string())),
    }
}

fn parse_message(raw: &Value) -> Result<ControlMessage, ProtocolError> {
    let text = raw
        .get("message")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::InvalidMessage("'message' must be a string".into()))?;

    if text.is_empty() {
        return Err(ProtocolError::InvalidMessage(
            "'message' must not be empty".into(),
        ));
    }

    Ok(ControlMessage::Message {
        text: text.to_string(),
    })
}
