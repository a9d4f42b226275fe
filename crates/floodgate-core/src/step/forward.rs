//! Forwarding adapter for handler code.
//!
//! A request handler that decides mid-flight it cannot serve a request
//! (rate budget exhausted, downstream degraded) returns a
//! [`ForwardSignal`] instead of a value; [`auto_forward`] catches it and
//! submits the described work for remote execution through the executor's
//! pass-through path. The handler's success value flows through untouched.

use std::future::Future;

use floodgate_types::error::FloodgateError;
use floodgate_types::job::{JobSpec, Submission};

use super::executor::{Executor, JobSubmitter, TargetCaller};

/// Raised by handler code that wants the described work executed remotely.
#[derive(Debug, Clone)]
pub struct ForwardSignal {
    pub spec: JobSpec,
}

impl ForwardSignal {
    pub fn new(spec: JobSpec) -> Self {
        Self { spec }
    }

    /// Minimal signal: forward a bare call to `url` with `method`.
    pub fn to(url: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            spec: JobSpec::new(url, method),
        }
    }
}

/// How a forwarded operation ended.
#[derive(Debug)]
pub enum ForwardOutcome<T> {
    /// The handler served the request itself.
    Completed(T),
    /// The work was handed to the remote service.
    Forwarded(Submission),
}

impl<T> ForwardOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            ForwardOutcome::Completed(value) => Some(value),
            ForwardOutcome::Forwarded(_) => None,
        }
    }

    pub fn forwarded_job_id(&self) -> Option<&str> {
        match self {
            ForwardOutcome::Forwarded(submission) => Some(&submission.job_id),
            ForwardOutcome::Completed(_) => None,
        }
    }
}

/// Run `operation`, forwarding its [`ForwardSignal`] if it raises one.
///
/// The signal's spec is submitted via [`Executor::submit_spec`]: no
/// webhook subscription or continuation registration happens on this
/// path. A signal without a deduplication key gets a fresh unique one,
/// so repeated forwards of the same call never collapse into one job.
/// Submission failures surface to the caller.
pub async fn auto_forward<S, C, T, F, Fut>(
    executor: &Executor<S, C>,
    operation: F,
) -> Result<ForwardOutcome<T>, FloodgateError>
where
    S: JobSubmitter + 'static,
    C: TargetCaller + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ForwardSignal>>,
{
    match operation().await {
        Ok(value) => Ok(ForwardOutcome::Completed(value)),
        Err(mut signal) => {
            if signal.spec.idempotent_key.is_none() {
                signal.spec.idempotent_key = Some(uuid::Uuid::now_v7().to_string());
            }
            tracing::info!(url = %signal.spec.url, "forwarding work for remote execution");
            let submission = executor.submit_spec(signal.spec).await?;
            tracing::debug!(job_id = %submission.job_id, "forwarded");
            Ok(ForwardOutcome::Forwarded(submission))
        }
    }
}
