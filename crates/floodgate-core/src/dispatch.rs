//! Bounded dispatch pool for callbacks and continuations.
//!
//! Webhook handling must never block on arbitrary user code, and callback
//! storms must not spawn an unbounded number of tasks. The pool runs a
//! fixed set of workers over a bounded queue; when the queue is full,
//! [`DispatchPool::dispatch`] sheds the task and returns `false` instead
//! of blocking the caller.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;

type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Fixed-size worker pool over a bounded task queue.
///
/// Must be created inside a tokio runtime (workers are spawned on it).
/// Dropping the pool closes the queue; workers drain what they already
/// accepted and exit.
pub struct DispatchPool {
    tx: mpsc::Sender<BoxedTask>,
    workers: usize,
}

impl DispatchPool {
    /// Create a pool with `workers` concurrent workers and a queue of
    /// `queue_depth` pending tasks. Both are clamped to at least 1.
    pub fn new(workers: usize, queue_depth: usize) -> Self {
        let workers = workers.max(1);
        let (tx, rx) = mpsc::channel::<BoxedTask>(queue_depth.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        for worker_id in 0..workers {
            let rx = Arc::clone(&rx);
            tokio::spawn(async move {
                loop {
                    let task = { rx.lock().await.recv().await };
                    match task {
                        Some(task) => task.await,
                        None => {
                            tracing::debug!(worker_id, "dispatch worker shutting down");
                            break;
                        }
                    }
                }
            });
        }

        Self { tx, workers }
    }

    /// Queue a task for background execution.
    ///
    /// Non-blocking: returns `false` and logs a warning when the queue is
    /// full -- the task is dropped, making backpressure explicit rather
    /// than stalling the webhook response cycle.
    pub fn dispatch(&self, task: impl Future<Output = ()> + Send + 'static) -> bool {
        match self.tx.try_send(Box::pin(task)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(capacity = self.tx.max_capacity(), "dispatch queue full, task dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("dispatch pool closed, task dropped");
                false
            }
        }
    }

    /// Number of workers in the pool.
    pub fn workers(&self) -> usize {
        self.workers
    }
}

impl std::fmt::Debug for DispatchPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchPool")
            .field("workers", &self.workers)
            .field("queue_capacity", &self.tx.max_capacity())
            .finish()
    }
}
