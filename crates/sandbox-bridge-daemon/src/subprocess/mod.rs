//! Backend unit processes and their event streams.

pub mod manager;
pub mod stream;

pub use manager::{Backend, SpawnRequest, SubprocessError, SubprocessManager};
pub use stream::{BackendEventStream, StreamError, StreamItem};
