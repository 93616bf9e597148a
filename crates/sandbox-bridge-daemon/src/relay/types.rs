//! Relay module types.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use sandbox_bridge_core::EventMessage;

/// Reason sent when the connection has no registered session.
pub const NO_SESSION: &str = "no session";

/// Reason sent when a backend stream ends without `complete` or `error`.
pub const STREAM_ENDED_UNEXPECTEDLY: &str = "stream ended unexpectedly";

/// Reason sent when a second request arrives while one is running.
pub const REQUEST_IN_PROGRESS: &str = "request already in progress";

/// Lifecycle of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    Spawning,
    Streaming,
    Terminated,
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Spawning => "spawning",
            Self::Streaming => "streaming",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Summary of a finished request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    pub final_state: RelayState,
    /// `output` events delivered to the sink.
    pub outputs: usize,
    /// Terminal event delivered, or `None` when the request was cancelled.
    pub terminal: Option<EventMessage>,
}

impl RelayOutcome {
    pub const fn is_cancelled(&self) -> bool {
        self.terminal.is_none()
    }
}

/// Set while a request runs; cleared just before its terminal event is
/// queued, so a reply to that event never sees the request as running.
#[derive(Debug, Clone)]
pub struct RequestActivity(Arc<AtomicBool>);

impl RequestActivity {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn finish(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for RequestActivity {
    fn default() -> Self {
        Self::new()
    }
}
