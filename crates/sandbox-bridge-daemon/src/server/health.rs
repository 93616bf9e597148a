//! Health endpoint.

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use super::AppState;

pub const HEALTH_MESSAGE: &str = "sandbox-bridge relay";

/// `GET /` and `GET /health`.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let sessions = state.relay.registry().len().await;
    Json(json!({
        "status": "ok",
        "message": HEALTH_MESSAGE,
        "sessions": sessions,
    }))
}
