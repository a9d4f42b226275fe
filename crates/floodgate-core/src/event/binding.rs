//! Receiver binding: the executor's view of a running webhook receiver.
//!
//! The executor never holds a receiver type directly -- it receives this
//! explicit seam instead: the public URL to subscribe on behalf of a job,
//! and the event store where continuations are registered.

use std::sync::Arc;

use super::store::EventStore;

/// Handle to a running webhook receiver, passed explicitly to the executor.
#[derive(Clone)]
pub struct ReceiverBinding {
    /// Public webhook endpoint URL appended to delegated jobs.
    pub webhook_url: String,
    /// Event store the receiver emits into on delivery.
    pub events: Arc<EventStore>,
}

impl ReceiverBinding {
    pub fn new(webhook_url: impl Into<String>, events: Arc<EventStore>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            events,
        }
    }
}

impl std::fmt::Debug for ReceiverBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiverBinding")
            .field("webhook_url", &self.webhook_url)
            .field("pending_events", &self.events.pending_count())
            .finish()
    }
}
