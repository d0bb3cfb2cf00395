//! Flush event bus.
//!
//! - tokio::sync::broadcast for pub-sub notifications
//! - The coordination loop publishes one event per flush attempt
//! - Lagging subscribers lose events; the loop never waits on them

use serde::Serialize;
use tokio::sync::broadcast::{self, Receiver, Sender};
use tokio_stream::wrappers::BroadcastStream;

/// What caused a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushTrigger {
    /// The batch reached its maximum size.
    Size,
    /// The flush period elapsed with a non-empty batch.
    Timer,
    /// Shutdown drained the remaining requests.
    Shutdown,
}

/// Whether the store accepted the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "error")]
pub enum FlushOutcome {
    Applied,
    /// The store rejected the batch; it was dropped, not retried.
    Failed(String),
}

/// Notification sent after each flush attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlushEvent {
    /// UUIDv7 identifying this flush
    pub batch_id: String,
    pub trigger: FlushTrigger,
    /// Number of requests in the batch
    pub len: usize,
    /// Key of the first request in the batch
    pub first_key: String,
    /// Key of the last request in the batch
    pub last_key: String,
    /// Successful flushes so far, including this one
    pub batch_count: u64,
    /// Writes applied so far, including this batch
    pub total_writes: u64,
    pub outcome: FlushOutcome,
}

impl FlushEvent {
    pub fn is_applied(&self) -> bool {
        self.outcome == FlushOutcome::Applied
    }
}

/// Notification bus for flush events.
#[derive(Clone)]
pub struct FlushNotifier {
    sender: Sender<FlushEvent>,
}

impl FlushNotifier {
    /// Create a new bus with the given capacity.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of buffered events per subscriber.
    ///   Older events are dropped if a subscriber falls behind.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> Receiver<FlushEvent> {
        self.sender.subscribe()
    }

    /// Subscribe as a `Stream`; lag shows up as `Err` items.
    pub fn stream(&self) -> BroadcastStream<FlushEvent> {
        BroadcastStream::new(self.subscribe())
    }

    /// Publish an event.
    ///
    /// # Returns
    ///
    /// The number of subscribers that received it.
    pub fn notify(&self, event: FlushEvent) -> usize {
        // send() errors when nobody is subscribed, which is fine
        self.sender.send(event).unwrap_or(0)
    }

    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for FlushNotifier {
    fn default() -> Self {
        Self::new(1024)
    }
}
