//! Error taxonomy for the Floodgate SDK.
//!
//! Every public operation either returns a well-formed result or fails with
//! one of these typed errors. Transport-level failures during local-first
//! execution are deliberately absent: those are recovered internally by
//! escalating to the fallback chain, never surfaced to the caller.

use thiserror::Error;

/// Errors surfaced by Floodgate public operations.
#[derive(Debug, Error)]
pub enum FloodgateError {
    /// The proxy rejected the credential.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The proxy rate-limited the submission. `retry_at_ms` is the unix
    /// millisecond timestamp after which a retry is allowed, derived from
    /// the `Retry-After` header when present.
    #[error("rate limited by proxy")]
    RateLimited { retry_at_ms: Option<i64> },

    /// The proxy refused the call for policy reasons.
    #[error("request denied: {0}")]
    RequestDenied(String),

    /// The remote service could not create the delegated job.
    #[error("remote job creation failed: {0}")]
    RemoteExecution(String),

    /// No webhook or result arrived within the caller's deadline.
    #[error("timed out waiting for result")]
    Timeout,

    /// Inbound webhook signature verification failed.
    #[error("signature verification failed: {0}")]
    Verification(String),

    /// The job definition is invalid (missing target URL, quorum larger
    /// than the eligible subscriber count, ...).
    #[error("invalid job definition: {0}")]
    Config(String),
}

impl FloodgateError {
    /// Whether a caller can retry deterministically, and when.
    pub fn retry_at_ms(&self) -> Option<i64> {
        match self {
            FloodgateError::RateLimited { retry_at_ms } => *retry_at_ms,
            _ => None,
        }
    }
}
