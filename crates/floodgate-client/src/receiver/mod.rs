//! Local webhook receiver.
//!
//! One axum server per [`Receiver`], bound once at startup; the listen
//! port is fixed for the lifetime of the instance (port 0 picks a free
//! one). [`Receiver::binding`] hands the executor the public delivery URL
//! and the shared event store.

pub mod routes;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use floodgate_core::event::ReceiverBinding;
use floodgate_types::config::ReceiverConfig;
use floodgate_types::error::FloodgateError;
use floodgate_types::webhook::WebhookRecord;

pub use routes::SIGNATURE_HEADER;
pub use state::{DeliveryCallback, ReceiverState};

/// A running webhook receiver. Dropping it without calling
/// [`Receiver::shutdown`] leaves the server task running until the
/// runtime stops.
pub struct Receiver {
    state: Arc<ReceiverState>,
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl Receiver {
    /// Bind and start serving. Fails when the address cannot be bound.
    pub async fn start(config: &ReceiverConfig) -> Result<Self, FloodgateError> {
        Self::start_with_callback(config, None).await
    }

    /// [`Receiver::start`] with a per-delivery hook, invoked on the
    /// dispatch pool for every accepted delivery.
    pub async fn start_with_callback(
        config: &ReceiverConfig,
        callback: Option<DeliveryCallback>,
    ) -> Result<Self, FloodgateError> {
        let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
            .await
            .map_err(|err| {
                FloodgateError::Config(format!(
                    "cannot bind receiver on {}:{}: {err}",
                    config.host, config.port
                ))
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|err| FloodgateError::Config(format!("local addr: {err}")))?;

        let state = Arc::new(ReceiverState::with_callback(config, callback));
        let router = routes::build_router(Arc::clone(&state));

        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(err) = serve.await {
                tracing::error!(error = %err, "webhook receiver server error");
            }
        });

        tracing::info!(addr = %local_addr, signed = config.signing_secret.is_some(), "webhook receiver listening");
        Ok(Self {
            state,
            local_addr,
            shutdown,
            handle,
        })
    }

    /// Delivery URL to subscribe on behalf of delegated jobs.
    pub fn url(&self) -> String {
        format!("http://{}/webhook", self.local_addr)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Seam handed to the executor: delivery URL plus the event store.
    pub fn binding(&self) -> ReceiverBinding {
        ReceiverBinding::new(self.url(), Arc::clone(&self.state.events))
    }

    pub fn state(&self) -> &Arc<ReceiverState> {
        &self.state
    }

    /// Stored result for `job_id`, if one has arrived.
    pub fn result(&self, job_id: &str) -> Option<WebhookRecord> {
        self.state.get(job_id)
    }

    /// Block until the result for `job_id` arrives or `timeout` passes.
    pub async fn wait_for_result(
        &self,
        job_id: &str,
        timeout: Duration,
    ) -> Result<WebhookRecord, FloodgateError> {
        self.state
            .wait_for_result(job_id, timeout)
            .await
            .ok_or(FloodgateError::Timeout)
    }

    /// Stop accepting deliveries and wait for the server task to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(err) = self.handle.await {
            tracing::warn!(error = %err, "receiver task did not shut down cleanly");
        }
        tracing::info!(addr = %self.local_addr, "webhook receiver stopped");
    }
}

impl std::fmt::Debug for Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver")
            .field("local_addr", &self.local_addr)
            .field("state", &self.state)
            .finish()
    }
}
