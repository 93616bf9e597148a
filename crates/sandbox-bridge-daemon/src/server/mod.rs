//! HTTP/WebSocket front end.
//!
//! Routes:
//! - `GET <ws_path>` upgrades to the client control protocol
//! - `GET /` and `GET /health` report liveness
//! - anything else is 404

mod config;
mod handler;
mod health;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::relay::RequestRelay;
use crate::session::SessionRegistry;
use crate::subprocess::Backend;

pub use config::ServerConfig;
pub use handler::{handle_socket, ws_handler};
pub use health::{HEALTH_MESSAGE, health_handler};

/// Shared state passed to axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub relay: RequestRelay,
    /// Backend unit assigned to every new session.
    pub backend_unit_id: String,
    pub outbound_capacity: usize,
}

impl AppState {
    pub fn new(
        registry: SessionRegistry,
        backend: Arc<dyn Backend>,
        backend_unit_id: impl Into<String>,
        outbound_capacity: usize,
    ) -> Self {
        Self {
            relay: RequestRelay::new(registry, backend),
            backend_unit_id: backend_unit_id.into(),
            outbound_capacity: outbound_capacity.max(1),
        }
    }
}

/// Errors from running the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid listen address: {0}")]
    InvalidAddr(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build the router with all routes.
pub fn build_router(state: AppState, ws_path: &str) -> Router {
    Router::new()
        .route(ws_path, get(ws_handler))
        .route("/", get(health_handler))
        .route("/health", get(health_handler))
        .fallback(|| async { (StatusCode::NOT_FOUND, "Not found") })
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// A bound, not yet serving, listener.
pub struct Server {
    listener: TcpListener,
    router: Router,
}

impl Server {
    pub async fn bind(config: &ServerConfig, state: AppState) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.addr,
                source,
            })?;
        Ok(Self {
            listener,
            router: build_router(state, &config.ws_path),
        })
    }

    /// Actual bound address (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` flips to `true`.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> Result<(), ServerError> {
        let addr = self.local_addr()?;
        info!(%addr, "Listening for WebSocket clients");
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                while !*shutdown.borrow() {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await?;
        info!(%addr, "Server stopped");
        Ok(())
    }
}
