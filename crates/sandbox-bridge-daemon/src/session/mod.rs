//! Session registry.
//!
//! Maps each live client connection to the backend unit serving it.

mod registry;
mod types;

pub use registry::SessionRegistry;
pub use types::{ConnectionId, Session, SessionError};
