//! Newline framing for line-delimited local protocols.
//!
//! A frame is an arbitrary byte payload without `\n`, terminated on the wire
//! by a single `\n`. [`LineBuffer`] accumulates bytes across partial reads and
//! hands back every complete frame as soon as its terminator arrives.

/// Frame terminator byte.
pub const TERMINATOR: u8 = b'\n';

/// Errors from frame encoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("Frame payload contains a line terminator at byte {position}")]
    EmbeddedTerminator { position: usize },
}

/// Encode a payload as a single terminated frame.
///
/// Payloads are not escaped: a terminator inside the payload is a caller
/// error and is rejected.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if let Some(position) = payload.iter().position(|b| *b == TERMINATOR) {
        return Err(FrameError::EmbeddedTerminator { position });
    }
    let mut frame = Vec::with_capacity(payload.len() + 1);
    frame.extend_from_slice(payload);
    frame.push(TERMINATOR);
    Ok(frame)
}

/// Per-connection accumulator of unterminated bytes.
///
/// After every [`push`](Self::push) the buffer holds exactly the bytes that do
/// not yet form a complete frame.
#[derive(Debug, Default, Clone)]
pub struct LineBuffer {
    buf: Vec<u8>,
    /// Bytes before this offset are known to contain no terminator.
    scanned: usize,
}

impl LineBuffer {
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            scanned: 0,
        }
    }

    /// Append a received chunk and extract every complete frame, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        let mut cursor = self.scanned;
        while let Some(offset) = self.buf[cursor..].iter().position(|b| *b == TERMINATOR) {
            let end = cursor + offset;
            frames.push(self.buf[start..end].to_vec());
            start = end + 1;
            cursor = start;
        }

        if start > 0 {
            self.buf.drain(..start);
        }
        self.scanned = self.buf.len();
        frames
    }

    /// Take whatever unterminated bytes remain, leaving the buffer empty.
    ///
    /// Used at end-of-stream when a trailing partial line should still be
    /// surfaced.
    pub fn take_remainder(&mut self) -> Option<Vec<u8>> {
        self.scanned = 0;
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }

    /// Unterminated bytes currently held.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    pub const fn len(&self) -> usize {
        self.buf.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
