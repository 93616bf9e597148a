//! Incremental Server-Sent-Events decoder for backend event streams.
//!
//! Each SSE event carries one JSON-encoded [`BackendEvent`] in its `data`
//! field. Bytes may arrive in arbitrary chunks; events are yielded as soon as
//! their terminating blank line has been seen.

use tracing::trace;

use super::parser::parse_event;
use super::types::{BackendEvent, EventDecodeError};
use crate::framing::LineBuffer;

/// Stateful SSE decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    lines: LineBuffer,
    data: Vec<String>,
}

impl SseDecoder {
    pub const fn new() -> Self {
        Self {
            lines: LineBuffer::new(),
            data: Vec::new(),
        }
    }

    /// Feed a chunk of the stream and return every event it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<BackendEvent, EventDecodeError>> {
        let mut events = Vec::new();
        for line in self.lines.push(chunk) {
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush at end-of-stream.
    ///
    /// A final event whose blank line never arrived is still dispatched.
    pub fn finish(&mut self) -> Option<Result<BackendEvent, EventDecodeError>> {
        if let Some(tail) = self.lines.take_remainder()
            && let Some(event) = self.process_line(&tail)
        {
            return Some(event);
        }
        self.dispatch()
    }

    fn process_line(&mut self, raw: &[u8]) -> Option<Result<BackendEvent, EventDecodeError>> {
        let decoded = String::from_utf8_lossy(raw);
        let line = decoded.strip_suffix('\r').unwrap_or(&decoded);

        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.data.push(value.to_string()),
            other => trace!(field = other, "Ignoring SSE field"),
        }
        None
    }

    fn dispatch(&mut self) -> Option<Result<BackendEvent, EventDecodeError>> {
        if self.data.is_empty() {
            return None;
        }
        let payload = std::mem::take(&mut self.data).join("\n");
        Some(parse_event(&payload))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const STREAM: &str = concat!(
        ": keep-alive\n",
        "event: stdout\n",
        "data: {\"type\":\"stdout\",\"data\":\"a\"}\n",
        "\n",
        "data: {\"type\":\"stdout\",\"data\":\"b\"}\r\n",
        "\r\n",
        "id: 3\n",
        "data: {\"type\":\"complete\",\n",
        "data:  \"exitCode\":0}\n",
        "\n",
    );

    fn decode_chunks(chunks: &[&[u8]]) -> Vec<BackendEvent> {
        let mut decoder = SseDecoder::new();
        let mut events: Vec<BackendEvent> = chunks
            .iter()
            .flat_map(|c| decoder.push(c))
            .map(Result::unwrap)
            .collect();
        events.extend(decoder.finish().map(Result::unwrap));
        events
    }

    #[test]
    fn decodes_events_in_order() {
        let events = decode_chunks(&[STREAM.as_bytes()]);
        assert_eq!(
            events,
            vec![
                BackendEvent::stdout("a"),
                BackendEvent::stdout("b"),
                BackendEvent::Complete { exit_code: 0 },
            ]
        );
    }

    #[test]
    fn chunk_boundaries_do_not_matter() {
        let whole = decode_chunks(&[STREAM.as_bytes()]);
        let bytewise: Vec<&[u8]> = STREAM.as_bytes().chunks(1).collect();
        assert_eq!(decode_chunks(&bytewise), whole);
        let sevens: Vec<&[u8]> = STREAM.as_bytes().chunks(7).collect();
        assert_eq!(decode_chunks(&sevens), whole);
    }

    #[test]
    fn finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"type\":\"error\",\"error\":\"x\"}").is_empty());
        assert_eq!(decoder.finish().unwrap().unwrap(), BackendEvent::error("x"));
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn invalid_payload_surfaces_as_error() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: {\"type\":\"bogus\"}\n\n");
        assert_eq!(
            events,
            vec![Err(EventDecodeError::UnknownType("bogus".into()))]
        );
    }

    #[test]
    fn blank_lines_without_data_are_ignored() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"\n\n: comment\n\n").is_empty());
        assert!(decoder.finish().is_none());
    }
}
