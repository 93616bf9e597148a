//! Pull-based stream of backend events.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use sandbox_bridge_core::events::{BackendEvent, EventDecodeError};

/// Failure while reading or decoding a backend unit's output.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error(transparent)]
    Decode(#[from] EventDecodeError),

    #[error("Failed to read backend output: {0}")]
    Io(#[from] std::io::Error),
}

pub type StreamItem = Result<BackendEvent, StreamError>;

/// Events produced by one backend unit, consumed once and in order.
///
/// Dropping the stream cancels the producer: the reader task is aborted and
/// the child process (spawned with `kill_on_drop`) is killed with it.
#[derive(Debug)]
pub struct BackendEventStream {
    rx: mpsc::Receiver<StreamItem>,
    producer: Option<Producer>,
}

#[derive(Debug)]
struct Producer {
    process_id: String,
    task: JoinHandle<()>,
}

impl Drop for Producer {
    fn drop(&mut self) {
        if !self.task.is_finished() {
            tracing::debug!(process_id = %self.process_id, "Cancelling backend unit");
            self.task.abort();
        }
    }
}

impl BackendEventStream {
    /// Stream fed by a spawned reader task that owns the child process.
    pub(crate) fn from_process(
        rx: mpsc::Receiver<StreamItem>,
        process_id: String,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            rx,
            producer: Some(Producer { process_id, task }),
        }
    }

    /// Stream fed by an arbitrary channel; ends when every sender is dropped.
    pub const fn from_channel(rx: mpsc::Receiver<StreamItem>) -> Self {
        Self { rx, producer: None }
    }

    /// Stream that yields `items` and then ends.
    pub fn scripted(items: Vec<StreamItem>) -> Self {
        let (tx, rx) = mpsc::channel(items.len().max(1));
        for item in items {
            // Capacity covers every item, so this never fails.
            let _ = tx.try_send(item);
        }
        Self::from_channel(rx)
    }

    /// Id of the backing process, if any.
    pub fn process_id(&self) -> Option<&str> {
        self.producer.as_ref().map(|p| p.process_id.as_str())
    }

    /// Next event, or `None` once the source is exhausted.
    pub async fn next(&mut self) -> Option<StreamItem> {
        self.rx.recv().await
    }
}
