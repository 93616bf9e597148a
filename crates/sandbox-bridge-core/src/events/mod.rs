//! Backend event stream decoding.
//!
//! A backend unit reports its lifecycle as a sequence of `stdout`, `stderr`,
//! `complete` and `error` events. Events arrive either as single JSON
//! documents or framed as Server-Sent Events on a byte stream.

mod parser;
mod sse;
mod types;

pub use parser::{parse_event, parse_value};
pub use sse::SseDecoder;
pub use types::*;
