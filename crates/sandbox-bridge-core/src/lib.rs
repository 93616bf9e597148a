//! `sandbox-bridge` Core Library
//!
//! Shared functionality for the bridge components:
//! - Client protocol codec (control messages in, event messages out)
//! - Backend event types and decoders (JSON, SSE)
//! - Newline framing with partial-read buffering
//! - Configuration resolution and hierarchy
//! - Common error types

pub mod config;
pub mod error;
pub mod events;
pub mod framing;
pub mod protocol;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
pub use events::BackendEvent;
pub use framing::LineBuffer;
pub use protocol::{ControlMessage, EventMessage, ProtocolError};
