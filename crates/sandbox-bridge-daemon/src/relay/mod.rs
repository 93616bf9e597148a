//! Relay module: runs one request against a backend unit.
//!
//! This is the "glue" that connects:
//! - `SessionRegistry` (which backend unit serves the connection)
//! - `Backend` (spawns the unit, yields its event stream)
//! - the client protocol (`EventMessage` sink)

mod pipeline;
mod types;

pub use pipeline::RequestRelay;
pub use types::*;
