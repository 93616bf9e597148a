//! Server configuration.

use std::net::SocketAddr;

use sandbox_bridge_core::config::ServerSettings;

use super::ServerError;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP bind address.
    pub addr: SocketAddr,

    /// Route that accepts WebSocket upgrades.
    pub ws_path: String,

    /// Event messages queued per connection before the relay waits.
    pub outbound_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8787)),
            ws_path: "/ws".to_string(),
            outbound_capacity: 64,
        }
    }
}

impl ServerConfig {
    /// Create a new server config bound to `addr`.
    pub fn tcp(addr: SocketAddr) -> Self {
        Self {
            addr,
            ..Default::default()
        }
    }

    /// Build from the `server` section of the settings file.
    pub fn from_settings(settings: &ServerSettings) -> Result<Self, ServerError> {
        let addr = settings
            .addr
            .parse()
            .map_err(|_| ServerError::InvalidAddr(settings.addr.clone()))?;
        Ok(Self::tcp(addr)
            .with_ws_path(settings.ws_path.clone())
            .with_outbound_capacity(settings.outbound_capacity))
    }

    /// Set the upgrade route; a missing leading `/` is added.
    #[must_use]
    pub fn with_ws_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.ws_path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        self
    }

    /// Set the per-connection outbound queue size (at least 1).
    #[must_use]
    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }
}
