//! Session registry types.

use std::fmt;
use std::time::SystemTime;

/// Identity of one client connection, unique per upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(uuid::Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Association between a client connection and its backend unit.
#[derive(Debug, Clone)]
pub struct Session {
    pub connection_id: ConnectionId,
    pub backend_unit_id: String,
    pub created_at: SystemTime,
}

impl Session {
    pub fn new(connection_id: ConnectionId, backend_unit_id: impl Into<String>) -> Self {
        Self {
            connection_id,
            backend_unit_id: backend_unit_id.into(),
            created_at: SystemTime::now(),
        }
    }
}

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(ConnectionId),

    #[error("Session already exists: {0}")]
    Duplicate(ConnectionId),
}
