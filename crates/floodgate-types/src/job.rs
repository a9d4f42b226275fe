//! Wire-level job payload types for Floodgate.
//!
//! [`JobSpec`] is the recursive JSON payload submitted to the remote
//! execution service. Default-valued fields are omitted from serialization
//! so a minimal job serializes to just `{"url": ..., "method": ...}`.
//! Fallback jobs nest one level per chain entry, each carrying the trigger
//! condition that gates it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// JobSpec (recursive wire payload)
// ---------------------------------------------------------------------------

/// One unit of remote work, as submitted to the execution service.
///
/// This is the serialized form of a built job definition. The engine does
/// not retain it after submission; continuation state lives in the event
/// store instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Target URL to call.
    pub url: String,
    /// HTTP method (always uppercase).
    pub method: String,
    /// Request headers.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    /// Raw request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Free-form key/value metadata echoed back in webhook deliveries.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    /// Webhook subscriptions notified when the job completes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub webhooks: Vec<WebhookSubscription>,
    /// Minimum quorum-eligible webhooks that must report success.
    /// Omitted when 1 (the server default).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_quorum: Option<u32>,
    /// Target regions for multi-region execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regions: Option<Vec<String>>,
    /// Region policy. Omitted when `fallback` (the server default).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_policy: Option<RegionPolicy>,
    /// Execution mode. Omitted when `race` (the server default).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_mode: Option<ExecutionMode>,
    /// Retry policy for the remote service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
    /// Earliest retry instant (unix milliseconds), when the caller controls
    /// retry timing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_at: Option<i64>,
    /// Deduplication key. Absent under the `hash` strategy -- the server
    /// derives a deterministic key from the call shape.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotent_key: Option<String>,
    /// Trigger condition gating this job. Only present on fallback entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerCondition>,
    /// Next fallback in the chain, attempted when `trigger` fires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_job: Option<Box<JobSpec>>,
    /// Continuation submitted when this job succeeds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success: Option<Box<JobSpec>>,
    /// Continuation submitted when this job fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_failure: Option<Box<JobSpec>>,
    /// Deadline after which the failure continuation fires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_failure_timeout_ms: Option<u64>,
}

impl JobSpec {
    /// Create a minimal spec with the given target.
    pub fn new(url: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            headers: HashMap::new(),
            body: None,
            metadata: HashMap::new(),
            webhooks: Vec::new(),
            webhook_quorum: None,
            regions: None,
            region_policy: None,
            execution_mode: None,
            retry_policy: None,
            retry_at: None,
            idempotent_key: None,
            trigger: None,
            fallback_job: None,
            on_success: None,
            on_failure: None,
            on_failure_timeout_ms: None,
        }
    }

    /// Depth of the fallback chain hanging off this spec (0 = no fallbacks).
    pub fn fallback_depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.fallback_job.as_deref();
        while let Some(spec) = current {
            depth += 1;
            current = spec.fallback_job.as_deref();
        }
        depth
    }
}

/// A webhook subscription attached to a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookSubscription {
    /// Delivery URL.
    pub url: String,
    /// Optional region affinity for delivery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Whether this subscriber counts toward the success quorum.
    #[serde(default)]
    pub has_quorum_vote: bool,
}

impl WebhookSubscription {
    /// A quorum-voting subscription at `url`.
    pub fn voting(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            region: None,
            has_quorum_vote: true,
        }
    }

    /// A subscription at `url` that observes deliveries without counting
    /// toward the success quorum.
    pub fn non_voting(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            region: None,
            has_quorum_vote: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Trigger condition
// ---------------------------------------------------------------------------

/// Condition gating a fallback job.
///
/// Internally tagged to match the wire structure:
/// `{"type": "on_error", "codes": [500, 502]}` or
/// `{"type": "on_timeout", "timeout_ms": 500}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerCondition {
    /// Fires when the primary fails with one of these status codes.
    OnError { codes: Vec<u16> },
    /// Fires when the primary takes at least this long.
    OnTimeout { timeout_ms: u64 },
}

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// How the remote service treats the region list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionPolicy {
    /// Prefer listed regions, fall back to any region.
    #[default]
    Fallback,
    /// Only execute in the listed regions.
    Strict,
}

/// How the remote service schedules across regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// First region to answer wins.
    #[default]
    Race,
    /// Execute in every region.
    Fanout,
}

/// Deduplication key generation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupStrategy {
    /// Server derives a deterministic key from (url, method, body), so
    /// identical calls collapse to one job. The key is never generated
    /// client-side under this strategy.
    #[default]
    Hash,
    /// Client generates a fresh key per built definition, so identical
    /// calls remain distinct (polling, repeated webhooks).
    Unique,
}

/// Retry policy interpreted by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum in-region retries.
    pub max_retries: u32,
    /// Maximum reroutes to another region.
    #[serde(default)]
    pub max_reroutes: u32,
    /// Status codes that trigger an in-region retry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retry_on: Vec<u16>,
    /// Status codes that trigger a reroute to another region.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reroute_on: Vec<u16>,
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// Response to a successful job submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    /// Remote-assigned job identifier -- the correlation key for webhooks.
    pub job_id: String,
    /// Remaining response fields as returned by the service.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
