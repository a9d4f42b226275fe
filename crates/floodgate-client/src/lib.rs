//! HTTP transports and the webhook receiver for Floodgate.
//!
//! This crate supplies the concrete ends of the seams `floodgate-core`
//! defines: [`ProxyClient`] submits jobs through the authenticating proxy,
//! [`DirectCaller`] performs local-first attempts, and [`Receiver`] is the
//! axum server that accepts webhook deliveries, stores results, and fires
//! registered continuations.
//!
//! [`Floodgate`] ties the pieces together for the common case; everything
//! it wires is public, so callers needing a custom transport or their own
//! receiver lifecycle can assemble an
//! [`Executor`](floodgate_core::step::Executor) directly.

pub mod config;
pub mod proxy;
pub mod receiver;
pub mod target;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use floodgate_core::step::{ExecutionOutcome, Executor};
use floodgate_types::config::{ClientConfig, FloodgateConfig};
use floodgate_types::error::FloodgateError;
use floodgate_types::job::{JobSpec, Submission};
use floodgate_types::webhook::WebhookRecord;

pub use proxy::ProxyClient;
pub use receiver::Receiver;
pub use target::DirectCaller;

// Re-exported so most callers only import this crate.
pub use floodgate_core::step::{Job, JobBuilder};

/// The assembled SDK: executor plus an optional webhook receiver.
///
/// Must be constructed inside a tokio runtime.
pub struct Floodgate {
    executor: Executor<ProxyClient, DirectCaller>,
    receiver: Option<Receiver>,
}

impl Floodgate {
    /// Client without a receiver: jobs can be executed and delegated, but
    /// no webhook results are collected and continuations never fire.
    pub fn new(config: ClientConfig) -> Result<Self, FloodgateError> {
        let proxy = Arc::new(ProxyClient::new(&config)?);
        let caller = Arc::new(DirectCaller::new()?);
        Ok(Self {
            executor: Executor::new(proxy, caller),
            receiver: None,
        })
    }

    /// Client with a running webhook receiver. Delegated jobs subscribe
    /// the receiver's endpoint automatically.
    pub async fn with_receiver(config: FloodgateConfig) -> Result<Self, FloodgateError> {
        let proxy = Arc::new(ProxyClient::new(&config.client)?);
        let caller = Arc::new(DirectCaller::new()?);
        let receiver = Receiver::start(&config.receiver).await?;
        let executor = Executor::new(proxy, caller).with_receiver(receiver.binding());
        Ok(Self {
            executor,
            receiver: Some(receiver),
        })
    }

    /// Execute a built job according to its strategy.
    pub async fn execute(&self, job: &Job) -> Result<ExecutionOutcome, FloodgateError> {
        self.executor.execute(job).await
    }

    /// Submit a raw wire payload without receiver wiring.
    pub async fn submit_spec(&self, spec: JobSpec) -> Result<Submission, FloodgateError> {
        self.executor.submit_spec(spec).await
    }

    /// Block until the webhook result for `job_id` arrives.
    ///
    /// Fails with [`FloodgateError::Timeout`] when the deadline passes, and
    /// with [`FloodgateError::Config`] when no receiver is running.
    pub async fn wait_for_result(
        &self,
        job_id: &str,
        timeout: Duration,
    ) -> Result<WebhookRecord, FloodgateError> {
        let receiver = self.receiver.as_ref().ok_or_else(|| {
            FloodgateError::Config("no receiver is running, results cannot be awaited".to_string())
        })?;
        receiver.wait_for_result(job_id, timeout).await
    }

    pub fn receiver(&self) -> Option<&Receiver> {
        self.receiver.as_ref()
    }

    pub fn executor(&self) -> &Executor<ProxyClient, DirectCaller> {
        &self.executor
    }

    /// Stop the receiver, if one is running, and drop the client.
    pub async fn shutdown(self) {
        if let Some(receiver) = self.receiver {
            receiver.shutdown().await;
        }
    }
}
