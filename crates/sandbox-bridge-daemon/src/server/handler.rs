//! WebSocket connection handling.
//!
//! One reader loop per connection decodes control messages; a writer task
//! drains the connection's outbound queue into the socket. At most one
//! request runs per connection, on its own task, so `ping` is answered
//! while a request is streaming.

use axum::extract::State;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sandbox_bridge_core::protocol::{self, ControlMessage, EventMessage, ProtocolError};

use crate::relay::{REQUEST_IN_PROGRESS, RelayOutcome, RequestActivity};
use crate::session::ConnectionId;

use super::AppState;

/// `GET <ws_path>`: upgrade, or 426 for plain HTTP requests.
pub async fn ws_handler(
    State(state): State<AppState>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    match upgrade {
        Ok(ws) => ws
            .on_upgrade(move |socket| handle_socket(socket, state))
            .into_response(),
        Err(rejection) => {
            debug!(%rejection, "Rejected non-upgrade request");
            (StatusCode::UPGRADE_REQUIRED, "Expected WebSocket upgrade").into_response()
        }
    }
}

/// A request running on its own task.
struct InFlight {
    token: CancellationToken,
    activity: RequestActivity,
    task: JoinHandle<RelayOutcome>,
}

impl InFlight {
    fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Still owed a terminal event. A task that died without one no longer counts.
    fn is_busy(&self) -> bool {
        self.activity.is_active() && self.is_running()
    }

    async fn cancel(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Relay task failed");
        }
    }
}

/// Drive one upgraded connection until the client goes away.
pub async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = ConnectionId::new();
    if let Err(e) = state
        .relay
        .registry()
        .create(connection_id, &state.backend_unit_id)
        .await
    {
        warn!(%connection_id, error = %e, "Failed to register session");
        return;
    }
    info!(%connection_id, backend_unit_id = %state.backend_unit_id, "Client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<EventMessage>(state.outbound_capacity);

    let writer = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            if ws_tx.send(Message::Text(event.encode().into())).await.is_err() {
                debug!(%connection_id, "Socket closed, dropping outbound events");
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let mut in_flight: Option<InFlight> = None;

    while let Some(frame) = ws_rx.next().await {
        let decoded = match frame {
            Ok(Message::Text(text)) => protocol::decode_str(text.as_str()),
            Ok(Message::Binary(bytes)) => protocol::decode(&bytes),
            Ok(Message::Close(_)) => break,
            // Pings are answered by axum.
            Ok(Message::Ping(_) | Message::Pong(_)) => continue,
            Err(e) => {
                debug!(%connection_id, error = %e, "WebSocket read error");
                break;
            }
        };

        let reply = match decoded {
            Err(e) => Some(protocol_error(connection_id, &e)),
            Ok(ControlMessage::Ping) => Some(EventMessage::Pong),
            Ok(ControlMessage::Message { text }) => {
                if in_flight.as_ref().is_some_and(InFlight::is_busy) {
                    debug!(%connection_id, "Rejecting overlapping request");
                    Some(EventMessage::error(REQUEST_IN_PROGRESS))
                } else {
                    let token = CancellationToken::new();
                    let activity = RequestActivity::new();
                    let relay = state.relay.clone();
                    let sink = out_tx.clone();
                    let cancel = token.clone();
                    let tracked = activity.clone();
                    let task = tokio::spawn(async move {
                        relay
                            .run_tracked(connection_id, text, sink, cancel, tracked)
                            .await
                    });
                    in_flight = Some(InFlight {
                        token,
                        activity,
                        task,
                    });
                    None
                }
            }
        };

        if let Some(reply) = reply
            && out_tx.send(reply).await.is_err()
        {
            break;
        }
    }

    if let Some(request) = in_flight.take()
        && request.is_running()
    {
        debug!(%connection_id, "Cancelling in-flight request");
        request.cancel().await;
    }
    drop(out_tx);
    state.relay.registry().remove(connection_id).await;
    if let Err(e) = writer.await {
        warn!(%connection_id, error = %e, "Writer task failed");
    }
    info!(%connection_id, "Client disconnected");
}

fn protocol_error(connection_id: ConnectionId, error: &ProtocolError) -> EventMessage {
    debug!(%connection_id, %error, "Rejected control message");
    EventMessage::from(error)
}
