//! Request relay: backend events → client event messages.
//!
//! Data flow:
//! ```text
//! message{text} → registry lookup → Backend::start → BackendEventStream
//!     stdout/stderr → output{data}      (immediately, in order)
//!     complete      → complete{exitCode}
//!     error / read failure / early end → error{reason}
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sandbox_bridge_core::{BackendEvent, EventMessage};

use crate::session::{ConnectionId, SessionRegistry};
use crate::subprocess::{Backend, BackendEventStream, SpawnRequest};

use super::types::{
    NO_SESSION, RelayOutcome, RelayState, RequestActivity, STREAM_ENDED_UNEXPECTEDLY,
};

/// Runs requests for registered sessions against a backend.
#[derive(Clone)]
pub struct RequestRelay {
    registry: SessionRegistry,
    backend: Arc<dyn Backend>,
}

/// Per-request bookkeeping.
struct Run<'a> {
    connection_id: ConnectionId,
    state: RelayState,
    outputs: usize,
    sink: &'a mpsc::Sender<EventMessage>,
    cancel: &'a CancellationToken,
    activity: RequestActivity,
}

impl RequestRelay {
    pub fn new(registry: SessionRegistry, backend: Arc<dyn Backend>) -> Self {
        Self { registry, backend }
    }

    pub const fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Run one request to completion, cancellation, or sink closure.
    ///
    /// Emits zero or more `output` events followed by exactly one terminal
    /// event, unless `cancel` fires or `sink` closes first, in which case
    /// nothing further is sent and the backend unit is released.
    pub async fn run(
        &self,
        connection_id: ConnectionId,
        text: String,
        sink: mpsc::Sender<EventMessage>,
        cancel: CancellationToken,
    ) -> RelayOutcome {
        self.run_tracked(connection_id, text, sink, cancel, RequestActivity::new())
            .await
    }

    /// [`run`](Self::run), clearing `activity` once the request is over.
    pub async fn run_tracked(
        &self,
        connection_id: ConnectionId,
        text: String,
        sink: mpsc::Sender<EventMessage>,
        cancel: CancellationToken,
        activity: RequestActivity,
    ) -> RelayOutcome {
        let mut run = Run {
            connection_id,
            state: RelayState::Idle,
            outputs: 0,
            sink: &sink,
            cancel: &cancel,
            activity,
        };

        let session = match self.registry.lookup(connection_id).await {
            Ok(session) => session,
            Err(e) => {
                debug!(%connection_id, error = %e, "Request without session");
                return run.finish(EventMessage::error(NO_SESSION)).await;
            }
        };

        run.transition(RelayState::Spawning);
        let request = SpawnRequest::new(session.backend_unit_id.clone(), text);
        let stream = match self.backend.start(request) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(%connection_id, error = %e, "Failed to start backend unit");
                return run.finish(EventMessage::error(e.to_string())).await;
            }
        };

        run.transition(RelayState::Streaming);
        run.stream(stream).await
    }
}

impl Run<'_> {
    fn transition(&mut self, next: RelayState) {
        debug!(connection_id = %self.connection_id, from = %self.state, to = %next, "Relay state");
        self.state = next;
    }

    async fn stream(mut self, mut stream: BackendEventStream) -> RelayOutcome {
        let process_id = stream.process_id().map(ToString::to_string);
        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return self.abandon("request cancelled"),
                () = self.sink.closed() => return self.abandon("client gone"),
                next = stream.next() => next,
            };

            let terminal = match next {
                Some(Ok(BackendEvent::Stdout { data } | BackendEvent::Stderr { data })) => {
                    if data.is_empty() {
                        continue;
                    }
                    if !self.deliver(EventMessage::output(data)).await {
                        return self.abandon("client gone");
                    }
                    self.outputs += 1;
                    continue;
                }
                Some(Ok(BackendEvent::Complete { exit_code })) => {
                    EventMessage::Complete { exit_code }
                }
                Some(Ok(BackendEvent::Error { error })) => EventMessage::error(error),
                Some(Err(e)) => {
                    warn!(connection_id = %self.connection_id, ?process_id, error = %e, "Backend stream failed");
                    EventMessage::error(e.to_string())
                }
                None => {
                    warn!(connection_id = %self.connection_id, ?process_id, "Backend stream ended without a terminal event");
                    EventMessage::error(STREAM_ENDED_UNEXPECTEDLY)
                }
            };
            // The stream is released before the terminal event goes out.
            drop(stream);
            return self.finish(terminal).await;
        }
    }

    async fn deliver(&self, event: EventMessage) -> bool {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            sent = self.sink.send(event) => sent.is_ok(),
        }
    }

    async fn finish(mut self, terminal: EventMessage) -> RelayOutcome {
        self.transition(RelayState::Terminated);
        let slot = tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            slot = self.sink.reserve() => slot.ok(),
        };
        let Some(slot) = slot else {
            return self.abandon("client gone");
        };
        self.activity.finish();
        slot.send(terminal.clone());
        info!(
            connection_id = %self.connection_id,
            outputs = self.outputs,
            terminal = %terminal.encode(),
            "Request finished"
        );
        RelayOutcome {
            final_state: self.state,
            outputs: self.outputs,
            terminal: Some(terminal),
        }
    }

    fn abandon(mut self, why: &str) -> RelayOutcome {
        self.activity.finish();
        if self.state != RelayState::Terminated {
            self.transition(RelayState::Terminated);
        }
        info!(connection_id = %self.connection_id, outputs = self.outputs, why, "Request abandoned");
        RelayOutcome {
            final_state: self.state,
            outputs: self.outputs,
            terminal: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::subprocess::{StreamError, StreamItem, SubprocessError};

    /// Backend that hands out pre-built streams and records requests.
    #[derive(Default)]
    struct ScriptedBackend {
        streams: Mutex<Vec<BackendEventStream>>,
        requests: Mutex<Vec<SpawnRequest>>,
        fail: bool,
    }

    impl ScriptedBackend {
        fn with(items: Vec<StreamItem>) -> Arc<Self> {
            Arc::new(Self {
                streams: Mutex::new(vec![BackendEventStream::scripted(items)]),
                ..Self::default()
            })
        }

        fn with_stream(stream: BackendEventStream) -> Arc<Self> {
            Arc::new(Self {
                streams: Mutex::new(vec![stream]),
                ..Self::default()
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail: true,
                ..Self::default()
            })
        }
    }

    impl Backend for ScriptedBackend {
        fn start(&self, request: SpawnRequest) -> Result<BackendEventStream, SubprocessError> {
            self.requests.lock().unwrap().push(request);
            if self.fail {
                return Err(SubprocessError::SpawnFailed {
                    reason: "no such file".into(),
                });
            }
            Ok(self
                .streams
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| BackendEventStream::scripted(Vec::new())))
        }
    }

    async fn setup(backend: Arc<ScriptedBackend>) -> (RequestRelay, ConnectionId) {
        let registry = SessionRegistry::new();
        let id = ConnectionId::new();
        registry.create(id, "unit-7").await.unwrap();
        (RequestRelay::new(registry, backend), id)
    }

    async fn run_collect(relay: &RequestRelay, id: ConnectionId) -> (RelayOutcome, Vec<EventMessage>) {
        let (tx, mut rx) = mpsc::channel(16);
        let outcome = relay
            .run(id, "Hello".into(), tx, CancellationToken::new())
            .await;
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        (outcome, events)
    }

    #[tokio::test]
    async fn outputs_then_complete_in_order() {
        let backend = ScriptedBackend::with(vec![
            Ok(BackendEvent::stdout("a")),
            Ok(BackendEvent::stderr("b")),
            Ok(BackendEvent::Complete { exit_code: 0 }),
        ]);
        let (relay, id) = setup(Arc::clone(&backend)).await;

        let (outcome, events) = run_collect(&relay, id).await;

        assert_eq!(
            events,
            vec![
                EventMessage::output("a"),
                EventMessage::output("b"),
                EventMessage::Complete { exit_code: 0 },
            ]
        );
        assert_eq!(outcome.final_state, RelayState::Terminated);
        assert_eq!(outcome.outputs, 2);
        assert_eq!(
            backend.requests.lock().unwrap()[0],
            SpawnRequest::new("unit-7", "Hello")
        );
    }

    #[tokio::test]
    async fn empty_payloads_are_skipped() {
        let backend = ScriptedBackend::with(vec![
            Ok(BackendEvent::stdout("")),
            Ok(BackendEvent::stderr("warn")),
            Ok(BackendEvent::Complete { exit_code: 2 }),
        ]);
        let (relay, id) = setup(backend).await;

        let (_, events) = run_collect(&relay, id).await;

        assert_eq!(
            events,
            vec![
                EventMessage::output("warn"),
                EventMessage::Complete { exit_code: 2 },
            ]
        );
    }

    #[tokio::test]
    async fn backend_error_is_terminal() {
        let backend = ScriptedBackend::with(vec![
            Ok(BackendEvent::error("boom")),
            Ok(BackendEvent::stdout("never")),
        ]);
        let (relay, id) = setup(backend).await;

        let (outcome, events) = run_collect(&relay, id).await;

        assert_eq!(events, vec![EventMessage::error("boom")]);
        assert_eq!(outcome.outputs, 0);
    }

    #[tokio::test]
    async fn early_end_becomes_error() {
        let backend = ScriptedBackend::with(vec![Ok(BackendEvent::stdout("x"))]);
        let (relay, id) = setup(backend).await;

        let (outcome, events) = run_collect(&relay, id).await;

        assert_eq!(
            events,
            vec![
                EventMessage::output("x"),
                EventMessage::error(STREAM_ENDED_UNEXPECTEDLY),
            ]
        );
        assert_eq!(outcome.terminal, Some(EventMessage::error(STREAM_ENDED_UNEXPECTEDLY)));
    }

    #[tokio::test]
    async fn decode_failure_is_terminal() {
        let backend = ScriptedBackend::with(vec![
            Ok(BackendEvent::stdout("x")),
            Err(StreamError::Decode(
                sandbox_bridge_core::events::EventDecodeError::UnknownType("progress".into()),
            )),
            Ok(BackendEvent::Complete { exit_code: 0 }),
        ]);
        let (relay, id) = setup(backend).await;

        let (_, events) = run_collect(&relay, id).await;

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], EventMessage::Error { reason } if reason.contains("progress")));
    }

    #[tokio::test]
    async fn missing_session_reports_no_session() {
        let backend = ScriptedBackend::with(Vec::new());
        let relay = RequestRelay::new(SessionRegistry::new(), Arc::clone(&backend) as Arc<dyn Backend>);

        let (outcome, events) = run_collect(&relay, ConnectionId::new()).await;

        assert_eq!(events, vec![EventMessage::error(NO_SESSION)]);
        assert_eq!(outcome.final_state, RelayState::Terminated);
        assert!(backend.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn spawn_failure_reports_reason() {
        let (relay, id) = setup(ScriptedBackend::failing()).await;

        let (_, events) = run_collect(&relay, id).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], EventMessage::Error { reason } if reason.contains("no such file")));
    }

    #[tokio::test]
    async fn activity_clears_before_terminal_is_queued() {
        let (source_tx, source_rx) = mpsc::channel(4);
        let backend = ScriptedBackend::with_stream(BackendEventStream::from_channel(source_rx));
        let (relay, id) = setup(backend).await;
        let activity = RequestActivity::new();

        let (tx, mut rx) = mpsc::channel(16);
        let task = tokio::spawn({
            let relay = relay.clone();
            let activity = activity.clone();
            async move {
                relay
                    .run_tracked(id, "Hello".into(), tx, CancellationToken::new(), activity)
                    .await
            }
        });

        source_tx.send(Ok(BackendEvent::stdout("a"))).await.unwrap();
        assert_eq!(rx.recv().await, Some(EventMessage::output("a")));
        assert!(activity.is_active());

        source_tx
            .send(Ok(BackendEvent::Complete { exit_code: 0 }))
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(EventMessage::Complete { exit_code: 0 }));
        assert!(!activity.is_active());
        assert!(!task.await.unwrap().is_cancelled());
    }

    #[tokio::test]
    async fn cancel_stops_without_terminal() {
        let (source_tx, source_rx) = mpsc::channel(4);
        let backend = ScriptedBackend::with_stream(BackendEventStream::from_channel(source_rx));
        let (relay, id) = setup(backend).await;

        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let task = {
            let relay = relay.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { relay.run(id, "Hello".into(), tx, cancel).await })
        };

        source_tx.send(Ok(BackendEvent::stdout("first"))).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), EventMessage::output("first"));

        cancel.cancel();
        let outcome = task.await.unwrap();

        assert!(outcome.is_cancelled());
        assert_eq!(outcome.outputs, 1);
        assert!(rx.recv().await.is_none());
        // The relay released the stream.
        assert!(source_tx.is_closed());
    }

    #[tokio::test]
    async fn closed_sink_releases_stream() {
        let (source_tx, source_rx) = mpsc::channel(4);
        let backend = ScriptedBackend::with_stream(BackendEventStream::from_channel(source_rx));
        let (relay, id) = setup(backend).await;

        let (tx, rx) = mpsc::channel(16);
        drop(rx);
        let outcome = relay
            .run(id, "Hello".into(), tx, CancellationToken::new())
            .await;

        assert!(outcome.is_cancelled());
        assert!(source_tx.is_closed());
    }
}
