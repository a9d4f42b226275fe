//! Concurrent event store with at-most-once handler firing.
//!
//! Maps an event identifier (the remote-assigned job id) to a pair of
//! completion handlers plus metadata. [`EventStore::emit`] removes the
//! entry under the lock before invoking anything, so N concurrent emits
//! for the same id fire exactly one handler: the losers see no entry and
//! are no-ops.
//!
//! Handlers run outside the lock. A panicking handler is caught and
//! logged, never propagated to the emitting thread.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Mutex, PoisonError};

use floodgate_types::webhook::DeliveryStatus;

/// A one-shot completion handler. Receives the webhook payload as JSON.
pub type EventHandler = Box<dyn FnOnce(serde_json::Value) + Send + 'static>;

struct EventEntry {
    on_success: Option<EventHandler>,
    on_failure: Option<EventHandler>,
    metadata: HashMap<String, String>,
}

/// Read-only view of a registered entry (handlers cannot be inspected).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSnapshot {
    pub has_on_success: bool,
    pub has_on_failure: bool,
    pub metadata: HashMap<String, String>,
}

/// Thread-safe registry of pending completion handlers.
///
/// Entries are never expired automatically: an entry whose webhook never
/// arrives stays until [`EventStore::remove`] or [`EventStore::clear`].
/// Callers that register speculatively should bound growth themselves via
/// [`EventStore::pending_count`].
#[derive(Default)]
pub struct EventStore {
    entries: Mutex<HashMap<String, EventEntry>>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register handlers for an event, overwriting any prior registration
    /// for the same id.
    pub fn register(
        &self,
        event_id: impl Into<String>,
        on_success: Option<EventHandler>,
        on_failure: Option<EventHandler>,
        metadata: HashMap<String, String>,
    ) {
        let event_id = event_id.into();
        tracing::debug!(event_id = %event_id, "registering event handlers");
        self.lock().insert(
            event_id,
            EventEntry {
                on_success,
                on_failure,
                metadata,
            },
        );
    }

    /// Emit an event, firing the handler selected by `status`.
    ///
    /// Returns `false` when no entry is registered for `event_id` -- the
    /// event is dropped, which callers must tolerate (webhooks can arrive
    /// for jobs nobody is waiting on). Returns `true` when an entry was
    /// consumed, whether or not a handler for that status was present.
    pub fn emit(&self, event_id: &str, status: DeliveryStatus, data: serde_json::Value) -> bool {
        // Take the entry under the lock: at-most-once even under
        // concurrent emits for the same id.
        let Some(entry) = self.lock().remove(event_id) else {
            return false;
        };

        let handler = match status {
            DeliveryStatus::Success => entry.on_success,
            DeliveryStatus::Failed => entry.on_failure,
            DeliveryStatus::Unknown => None,
        };

        match handler {
            Some(handler) => {
                // Handler runs outside the lock; a panic must not reach
                // the dispatching thread.
                let outcome = catch_unwind(AssertUnwindSafe(move || handler(data)));
                if outcome.is_err() {
                    tracing::error!(event_id = %event_id, ?status, "event handler panicked");
                }
            }
            None => {
                tracing::debug!(event_id = %event_id, ?status, "no handler for status");
            }
        }

        true
    }

    /// Snapshot of a registered entry, or `None`.
    pub fn get(&self, event_id: &str) -> Option<EventSnapshot> {
        self.lock().get(event_id).map(|entry| EventSnapshot {
            has_on_success: entry.on_success.is_some(),
            has_on_failure: entry.on_failure.is_some(),
            metadata: entry.metadata.clone(),
        })
    }

    /// Remove an entry without firing it. Returns whether one existed.
    pub fn remove(&self, event_id: &str) -> bool {
        self.lock().remove(event_id).is_some()
    }

    /// Number of entries still waiting for a webhook.
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    /// Drop every pending entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, EventEntry>> {
        // A panicked handler never runs under this lock, so poisoning can
        // only come from a panic between lock and unlock in this module;
        // recover rather than propagate.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for EventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStore")
            .field("pending_count", &self.pending_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handler(counter: &Arc<AtomicUsize>) -> EventHandler {
        let counter = Arc::clone(counter);
        Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn emit_fires_success_handler_and_removes_entry() {
        let store = EventStore::new();
        let fired = Arc::new(AtomicUsize::new(0));
        store.register(
            "job_1",
            Some(counting_handler(&fired)),
            None,
            HashMap::new(),
        );

        let consumed = store.emit("job_1", DeliveryStatus::Success, serde_json::json!({}));
        assert!(consumed);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(store.get("job_1").is_none());
    }

    #[test]
    fn emit_selects_failure_handler_on_failed_status() {
        let store = EventStore::new();
        let success = Arc::new(AtomicUsize::new(0));
        let failure = Arc::new(AtomicUsize::new(0));
        store.register(
            "job_1",
            Some(counting_handler(&success)),
            Some(counting_handler(&failure)),
            HashMap::new(),
        );

        store.emit("job_1", DeliveryStatus::Failed, serde_json::json!({}));
        assert_eq!(success.load(Ordering::SeqCst), 0);
        assert_eq!(failure.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn emit_without_registration_is_a_noop() {
        let store = EventStore::new();
        assert!(!store.emit("unknown", DeliveryStatus::Success, serde_json::json!({})));
    }

    #[test]
    fn unknown_status_consumes_entry_without_firing() {
        let store = EventStore::new();
        let fired = Arc::new(AtomicUsize::new(0));
        store.register(
            "job_1",
            Some(counting_handler(&fired)),
            Some(counting_handler(&fired)),
            HashMap::new(),
        );

        assert!(store.emit("job_1", DeliveryStatus::Unknown, serde_json::json!({})));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(store.pending_count(), 0);
    }

    #[test]
    fn concurrent_emits_fire_exactly_once() {
        let store = Arc::new(EventStore::new());
        let fired = Arc::new(AtomicUsize::new(0));
        store.register(
            "job_1",
            Some(counting_handler(&fired)),
            None,
            HashMap::new(),
        );

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store.emit("job_1", DeliveryStatus::Success, serde_json::json!({}))
                })
            })
            .collect();

        let consumed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&c| c)
            .count();

        assert_eq!(consumed, 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(store.get("job_1").is_none());
    }

    #[test]
    fn panicking_handler_is_contained_and_entry_removed() {
        let store = EventStore::new();
        store.register(
            "job_1",
            Some(Box::new(|_| panic!("handler exploded"))),
            None,
            HashMap::new(),
        );

        assert!(store.emit("job_1", DeliveryStatus::Success, serde_json::json!({})));
        assert_eq!(store.pending_count(), 0);

        // The store is still usable afterwards.
        store.register("job_2", None, None, HashMap::new());
        assert_eq!(store.pending_count(), 1);
    }

    #[test]
    fn register_overwrites_previous_entry() {
        let store = EventStore::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        store.register("job_1", Some(counting_handler(&first)), None, HashMap::new());
        store.register(
            "job_1",
            Some(counting_handler(&second)),
            None,
            HashMap::new(),
        );

        store.emit("job_1", DeliveryStatus::Success, serde_json::json!({}));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn get_exposes_metadata_snapshot() {
        let store = EventStore::new();
        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), "delegate".to_string());
        store.register("job_1", Some(Box::new(|_| {})), None, metadata);

        let snapshot = store.get("job_1").unwrap();
        assert!(snapshot.has_on_success);
        assert!(!snapshot.has_on_failure);
        assert_eq!(snapshot.metadata.get("source").unwrap(), "delegate");
    }

    #[test]
    fn remove_get_pending_clear() {
        let store = EventStore::new();
        store.register("a", None, None, HashMap::new());
        store.register("b", None, None, HashMap::new());
        assert_eq!(store.pending_count(), 2);

        assert!(store.remove("a"));
        assert!(!store.remove("a"));
        assert_eq!(store.pending_count(), 1);

        store.clear();
        assert_eq!(store.pending_count(), 0);
        assert!(store.get("b").is_none());
    }
}
