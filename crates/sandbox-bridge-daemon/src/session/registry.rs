//! In-memory session registry shared by all connections.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use super::types::{ConnectionId, Session, SessionError};

/// Concurrent map from connection identity to session.
///
/// Operations on one identity are serialized by the lock; operations on
/// different identities only contend for the duration of a map access.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<ConnectionId, Arc<Session>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session for a freshly upgraded connection.
    pub async fn create(
        &self,
        connection_id: ConnectionId,
        backend_unit_id: &str,
    ) -> Result<Arc<Session>, SessionError> {
        let session = {
            let mut sessions = self.sessions.write().await;
            match sessions.entry(connection_id) {
                Entry::Occupied(_) => return Err(SessionError::Duplicate(connection_id)),
                Entry::Vacant(slot) => Arc::clone(
                    slot.insert(Arc::new(Session::new(connection_id, backend_unit_id))),
                ),
            }
        };
        info!(%connection_id, backend_unit_id, "Session created");
        Ok(session)
    }

    pub async fn lookup(&self, connection_id: ConnectionId) -> Result<Arc<Session>, SessionError> {
        self.sessions
            .read()
            .await
            .get(&connection_id)
            .cloned()
            .ok_or(SessionError::NotFound(connection_id))
    }

    /// Remove a session. Removing an unknown identity is a no-op.
    pub async fn remove(&self, connection_id: ConnectionId) -> Option<Arc<Session>> {
        let removed = self.sessions.write().await.remove(&connection_id);
        if removed.is_some() {
            info!(%connection_id, "Session removed");
        } else {
            debug!(%connection_id, "No session to remove");
        }
        removed
    }

    /// Snapshot of the registered identities, in no particular order.
    pub async fn connection_ids(&self) -> Vec<ConnectionId> {
        self.sessions.read().await.keys().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_lookup() {
        let registry = SessionRegistry::new();
        let id = ConnectionId::new();

        let created = registry.create(id, "unit-1").await.unwrap();
        let found = registry.lookup(id).await.unwrap();

        assert!(Arc::ptr_eq(&created, &found));
        assert_eq!(found.backend_unit_id, "unit-1");
        assert_eq!(found.connection_id, id);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let registry = SessionRegistry::new();
        let id = ConnectionId::new();

        registry.create(id, "unit-1").await.unwrap();
        let err = registry.create(id, "unit-2").await.unwrap_err();

        assert_eq!(err, SessionError::Duplicate(id));
        assert_eq!(registry.lookup(id).await.unwrap().backend_unit_id, "unit-1");
    }

    #[tokio::test]
    async fn lookup_unknown_is_not_found() {
        let registry = SessionRegistry::new();
        let id = ConnectionId::new();
        assert_eq!(registry.lookup(id).await.unwrap_err(), SessionError::NotFound(id));
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let registry = SessionRegistry::new();
        let id = ConnectionId::new();
        registry.create(id, "unit-1").await.unwrap();

        assert!(registry.remove(id).await.is_some());
        assert!(registry.remove(id).await.is_none());
        assert!(registry.is_empty().await);
        assert!(registry.lookup(id).await.is_err());
    }

    #[tokio::test]
    async fn concurrent_creates_for_distinct_connections() {
        let registry = SessionRegistry::new();
        let mut handles = Vec::new();
        for _ in 0..32 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let id = ConnectionId::new();
                registry.create(id, "unit").await.unwrap();
                id
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        assert_eq!(registry.len().await, 32);
        let snapshot = registry.connection_ids().await;
        assert_eq!(snapshot.len(), 32);
        for id in ids {
            assert!(registry.lookup(id).await.is_ok());
            assert!(snapshot.contains(&id));
        }
    }

    #[test]
    fn connection_ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }
}
