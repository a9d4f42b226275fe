//! Job execution engine.
//!
//! [`Executor`] drives a built [`Job`] to completion. Delegate jobs go
//! straight to the remote service through a [`JobSubmitter`]; local-first
//! jobs call the target through a [`TargetCaller`] and walk the local
//! fallback chain before escalating. Both seams are traits so transports
//! stay out of this crate and tests script them directly.
//!
//! When a [`ReceiverBinding`] is attached, delegated jobs subscribe the
//! receiver's webhook endpoint and register their continuations in the
//! event store, keyed by the remote-assigned job id. Continuations fired
//! by webhook deliveries run on the executor's bounded dispatch pool.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use floodgate_types::error::FloodgateError;
use floodgate_types::job::{JobSpec, Submission, TriggerCondition, WebhookSubscription};
use futures_util::future::BoxFuture;

use crate::dispatch::DispatchPool;
use crate::event::{EventHandler, ReceiverBinding};

use super::job::{ExecutionStrategy, Job};

const DEFAULT_WORKERS: usize = 4;
const DEFAULT_QUEUE_DEPTH: usize = 64;

// ---------------------------------------------------------------------------
// Transport seams
// ---------------------------------------------------------------------------

/// Submits wire payloads to the remote execution service.
pub trait JobSubmitter: Send + Sync {
    fn submit(&self, spec: JobSpec) -> BoxFuture<'_, Result<Submission, FloodgateError>>;
}

/// Calls a job's target directly during local-first execution.
pub trait TargetCaller: Send + Sync {
    fn call(&self, request: TargetRequest) -> BoxFuture<'_, Result<TargetResponse, TransportError>>;
}

/// One local HTTP attempt against a job's target.
#[derive(Debug, Clone)]
pub struct TargetRequest {
    pub url: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
    /// Deadline for the whole attempt.
    pub timeout: Duration,
}

/// Response from a local attempt. Any status counts as a response;
/// transport-level failures surface as [`TransportError`] instead.
#[derive(Debug, Clone)]
pub struct TargetResponse {
    pub status: u16,
    pub body: String,
}

impl TargetResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A local attempt that produced no HTTP response.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Other(String),
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// What executing a job produced.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    /// The target was called directly and answered with this response.
    Local { status: u16, body: String },
    /// The job was handed to the remote service.
    Delegated(Submission),
}

impl ExecutionOutcome {
    pub fn is_local(&self) -> bool {
        matches!(self, ExecutionOutcome::Local { .. })
    }

    /// Local response with a 2xx status.
    pub fn is_local_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Local { status, .. } if (200..300).contains(status))
    }

    /// Remote-assigned job id, when delegated.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            ExecutionOutcome::Delegated(submission) => Some(&submission.job_id),
            ExecutionOutcome::Local { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Drives jobs through their strategy. Cheap to clone; all state is shared.
pub struct Executor<S, C> {
    submitter: Arc<S>,
    caller: Arc<C>,
    receiver: Option<ReceiverBinding>,
    pool: Arc<DispatchPool>,
}

impl<S, C> Clone for Executor<S, C> {
    fn clone(&self) -> Self {
        Self {
            submitter: Arc::clone(&self.submitter),
            caller: Arc::clone(&self.caller),
            receiver: self.receiver.clone(),
            pool: Arc::clone(&self.pool),
        }
    }
}

impl<S, C> Executor<S, C>
where
    S: JobSubmitter + 'static,
    C: TargetCaller + 'static,
{
    /// Executor with a default-sized dispatch pool. Must be called inside
    /// a tokio runtime.
    pub fn new(submitter: Arc<S>, caller: Arc<C>) -> Self {
        Self::with_pool(
            submitter,
            caller,
            Arc::new(DispatchPool::new(DEFAULT_WORKERS, DEFAULT_QUEUE_DEPTH)),
        )
    }

    pub fn with_pool(submitter: Arc<S>, caller: Arc<C>, pool: Arc<DispatchPool>) -> Self {
        Self {
            submitter,
            caller,
            receiver: None,
            pool,
        }
    }

    /// Attach a running receiver. Delegated jobs will subscribe its webhook
    /// endpoint and register continuations in its event store.
    pub fn with_receiver(mut self, binding: ReceiverBinding) -> Self {
        self.receiver = Some(binding);
        self
    }

    /// Execute a job according to its strategy.
    ///
    /// Boxed because continuations and fallbacks recurse through here.
    pub fn execute<'a>(
        &'a self,
        job: &'a Job,
    ) -> BoxFuture<'a, Result<ExecutionOutcome, FloodgateError>> {
        Box::pin(async move {
            match job.strategy() {
                ExecutionStrategy::Delegate => self.run_delegate(job).await,
                ExecutionStrategy::LocalFirst {
                    escalate_on,
                    local_timeout,
                } => self.run_local_first(job, escalate_on, *local_timeout).await,
            }
        })
    }

    /// Submit a raw wire payload as-is: no webhook subscription is added
    /// and nothing is registered in the event store. This is the
    /// pass-through used by forwarding adapters.
    pub async fn submit_spec(&self, spec: JobSpec) -> Result<Submission, FloodgateError> {
        self.submitter.submit(spec).await
    }

    async fn run_delegate(&self, job: &Job) -> Result<ExecutionOutcome, FloodgateError> {
        let has_continuations = job.on_success().is_some() || job.on_failure().is_some();
        let mut spec = job.to_spec();
        if let Some(binding) = &self.receiver {
            // The injected subscription votes only when it drives a
            // continuation; a bare listener must not change the quorum the
            // caller configured.
            let url = binding.webhook_url.as_str();
            spec.webhooks.push(if has_continuations {
                WebhookSubscription::voting(url)
            } else {
                WebhookSubscription::non_voting(url)
            });
        }

        let submission = self.submitter.submit(spec).await?;

        if let Some(binding) = &self.receiver
            && has_continuations
        {
            let on_success = job
                .on_success()
                .cloned()
                .map(|next| self.continuation_handler(next));
            let on_failure = job
                .on_failure()
                .cloned()
                .map(|next| self.continuation_handler(next));
            binding.events.register(
                &submission.job_id,
                on_success,
                on_failure,
                job.metadata().clone(),
            );
        }

        tracing::info!(job_id = %submission.job_id, url = %job.url(), "job delegated");
        Ok(ExecutionOutcome::Delegated(submission))
    }

    async fn run_local_first(
        &self,
        job: &Job,
        escalate_on: &[u16],
        local_timeout: Duration,
    ) -> Result<ExecutionOutcome, FloodgateError> {
        match self.caller.call(target_request(job, local_timeout)).await {
            Ok(resp) if resp.is_success() => {
                if let Some(next) = job.on_success() {
                    self.run_continuation("on_success", next).await;
                }
                Ok(ExecutionOutcome::Local {
                    status: resp.status,
                    body: resp.body,
                })
            }
            Ok(resp) if escalate_on.contains(&resp.status) => {
                tracing::debug!(
                    status = resp.status,
                    url = %job.url(),
                    "local attempt failed, walking fallback chain"
                );
                if let Some(outcome) = self.local_chain(job, Some(resp.status)).await {
                    return Ok(outcome);
                }
                tracing::info!(url = %job.url(), "local chain exhausted, delegating");
                self.run_delegate(job).await
            }
            Ok(resp) => {
                // Non-escalating failure stays local.
                if let Some(next) = job.on_failure() {
                    self.run_continuation("on_failure", next).await;
                }
                Ok(ExecutionOutcome::Local {
                    status: resp.status,
                    body: resp.body,
                })
            }
            Err(err) => {
                tracing::warn!(error = %err, url = %job.url(), "local transport failure");
                if let Some(outcome) = self.local_chain(job, None).await {
                    return Ok(outcome);
                }
                self.run_delegate(job).await
            }
        }
    }

    /// Walk the local fallback chain after a failed attempt. Returns the
    /// first local success, or `None` when the chain is exhausted.
    ///
    /// `error_code` is the primary's HTTP status, or `None` for a transport
    /// failure. Delegate-typed fallbacks are skipped here: they only run
    /// remotely, as part of the submitted chain.
    async fn local_chain(&self, job: &Job, error_code: Option<u16>) -> Option<ExecutionOutcome> {
        for fallback in job.fallbacks() {
            if !fallback_applies(fallback.trigger.as_ref(), error_code) {
                continue;
            }
            if !fallback.job.strategy().is_local_first() {
                tracing::debug!(url = %fallback.job.url(), "skipping delegate-typed fallback locally");
                continue;
            }
            if let Some(outcome) = self.attempt_local(&fallback.job).await {
                return Some(outcome);
            }
        }
        None
    }

    /// One local-only attempt: never delegates, recursing into the job's
    /// own local fallbacks on failure. `Some` means a 2xx response.
    fn attempt_local<'a>(&'a self, job: &'a Job) -> BoxFuture<'a, Option<ExecutionOutcome>> {
        Box::pin(async move {
            let (escalate_on, local_timeout) = match job.strategy() {
                ExecutionStrategy::LocalFirst {
                    escalate_on,
                    local_timeout,
                } => (escalate_on.as_slice(), *local_timeout),
                ExecutionStrategy::Delegate => return None,
            };

            match self.caller.call(target_request(job, local_timeout)).await {
                Ok(resp) if resp.is_success() => {
                    if let Some(next) = job.on_success() {
                        self.run_continuation("on_success", next).await;
                    }
                    Some(ExecutionOutcome::Local {
                        status: resp.status,
                        body: resp.body,
                    })
                }
                Ok(resp) if escalate_on.contains(&resp.status) => {
                    self.local_chain(job, Some(resp.status)).await
                }
                Ok(resp) => {
                    tracing::debug!(status = resp.status, url = %job.url(), "fallback attempt failed");
                    None
                }
                Err(err) => {
                    tracing::debug!(error = %err, url = %job.url(), "fallback transport failure");
                    self.local_chain(job, None).await
                }
            }
        })
    }

    async fn run_continuation(&self, label: &'static str, job: &Job) {
        if let Err(err) = self.execute(job).await {
            tracing::warn!(error = %err, continuation = label, url = %job.url(), "continuation failed");
        }
    }

    /// Wrap a continuation job as an event handler. The handler queues the
    /// execution on the dispatch pool so the webhook cycle never blocks on
    /// it.
    fn continuation_handler(&self, next: Job) -> EventHandler {
        let exec = self.clone();
        Box::new(move |_payload| {
            tracing::debug!(url = %next.url(), "queueing continuation");
            let pool = Arc::clone(&exec.pool);
            let accepted = pool.dispatch(async move {
                if let Err(err) = exec.execute(&next).await {
                    tracing::error!(error = %err, "continuation execution failed");
                }
            });
            if !accepted {
                tracing::warn!("continuation dropped, dispatch queue full");
            }
        })
    }
}

impl<S, C> std::fmt::Debug for Executor<S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("receiver", &self.receiver)
            .field("pool", &self.pool)
            .finish()
    }
}

/// Whether a fallback trigger fires for the observed failure.
///
/// `OnError` requires a matching HTTP status; `OnTimeout` fires when the
/// attempt produced no response at all; no trigger always fires.
fn fallback_applies(trigger: Option<&TriggerCondition>, error_code: Option<u16>) -> bool {
    match trigger {
        None => true,
        Some(TriggerCondition::OnError { codes }) => {
            error_code.is_some_and(|code| codes.contains(&code))
        }
        Some(TriggerCondition::OnTimeout { .. }) => error_code.is_none(),
    }
}

fn target_request(job: &Job, timeout: Duration) -> TargetRequest {
    TargetRequest {
        url: job.url().to_string(),
        method: job.method().to_string(),
        headers: job.headers().clone(),
        body: job.body().map(str::to_string),
        timeout,
    }
}
