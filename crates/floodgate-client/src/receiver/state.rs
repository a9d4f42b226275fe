//! Shared state behind the webhook receiver.
//!
//! Results and waiters each sit behind their own mutex; neither lock is
//! ever held across an await or while user code runs. Stored results are
//! keyed by job id with last-write-wins on re-delivery.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;

use floodgate_core::dispatch::DispatchPool;
use floodgate_core::event::EventStore;
use floodgate_types::config::ReceiverConfig;
use floodgate_types::webhook::{WebhookDelivery, WebhookRecord};

/// Optional per-delivery hook, invoked with the job id and raw payload
/// for every accepted delivery. Runs on the dispatch pool, never on the
/// webhook response path.
pub type DeliveryCallback = Arc<dyn Fn(String, serde_json::Value) + Send + Sync>;

pub struct ReceiverState {
    results: Mutex<HashMap<String, WebhookRecord>>,
    waiters: Mutex<HashMap<String, Arc<Notify>>>,
    /// Continuation registry shared with the executor via the binding.
    pub events: Arc<EventStore>,
    /// Pool running event handlers off the webhook response path.
    pub pool: Arc<DispatchPool>,
    pub signing_secret: Option<String>,
    pub secondary_secret: Option<String>,
    pub callback: Option<DeliveryCallback>,
}

impl ReceiverState {
    /// Must be called inside a tokio runtime (the pool spawns workers).
    pub fn new(config: &ReceiverConfig) -> Self {
        Self::with_callback(config, None)
    }

    pub fn with_callback(config: &ReceiverConfig, callback: Option<DeliveryCallback>) -> Self {
        Self {
            results: Mutex::new(HashMap::new()),
            waiters: Mutex::new(HashMap::new()),
            events: Arc::new(EventStore::new()),
            pool: Arc::new(DispatchPool::new(
                config.callback_workers,
                config.callback_queue_depth,
            )),
            signing_secret: config.signing_secret.clone(),
            secondary_secret: config.secondary_secret.clone(),
            callback,
        }
    }

    /// Store a delivery and wake anyone waiting on its job id.
    pub fn store(&self, delivery: WebhookDelivery) {
        let job_id = delivery.job_id.clone();
        self.results_lock()
            .insert(job_id.clone(), WebhookRecord::now(delivery));
        if let Some(notify) = self.waiters_lock().remove(&job_id) {
            notify.notify_waiters();
        }
    }

    pub fn get(&self, job_id: &str) -> Option<WebhookRecord> {
        self.results_lock().get(job_id).cloned()
    }

    pub fn all(&self) -> HashMap<String, WebhookRecord> {
        self.results_lock().clone()
    }

    pub fn result_count(&self) -> usize {
        self.results_lock().len()
    }

    /// Drop every stored result. Pending waiters keep waiting.
    pub fn reset(&self) {
        self.results_lock().clear();
    }

    /// Wait until a result for `job_id` is stored, up to `timeout`.
    ///
    /// A result that is already present returns immediately. After the
    /// deadline the results map is checked one last time, so a wakeup lost
    /// to scheduling only costs latency, never the result.
    pub async fn wait_for_result(&self, job_id: &str, timeout: Duration) -> Option<WebhookRecord> {
        if let Some(record) = self.get(job_id) {
            return Some(record);
        }

        let notify = Arc::clone(
            self.waiters_lock()
                .entry(job_id.to_string())
                .or_insert_with(|| Arc::new(Notify::new())),
        );

        // Arm the future before re-checking: a store() that lands between
        // the check and the await still wakes this waiter.
        let notified = notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if let Some(record) = self.get(job_id) {
            return Some(record);
        }

        let _ = tokio::time::timeout(timeout, notified).await;

        let record = self.get(job_id);
        if record.is_none() {
            // Only the last waiter removes the shared entry; other holders
            // of the same Notify are still waiting on it.
            let mut waiters = self.waiters_lock();
            if let Some(existing) = waiters.get(job_id)
                && Arc::ptr_eq(existing, &notify)
                && Arc::strong_count(existing) <= 2
            {
                waiters.remove(job_id);
            }
        }
        record
    }

    fn results_lock(&self) -> MutexGuard<'_, HashMap<String, WebhookRecord>> {
        self.results.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn waiters_lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Notify>>> {
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ReceiverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiverState")
            .field("results", &self.result_count())
            .field("pending_events", &self.events.pending_count())
            .field("signed", &self.signing_secret.is_some())
            .finish()
    }
}
