//! Webhook delivery types.
//!
//! A [`WebhookDelivery`] is the JSON body the remote execution service
//! POSTs back when a job completes. The receiver stores each delivery as a
//! [`WebhookRecord`] keyed by `job_id` (last write wins on re-delivery).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Completion status reported in a webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Success,
    Failed,
    /// Any status string this SDK version does not know about.
    #[serde(other)]
    Unknown,
}

/// Inbound webhook payload from the remote execution service.
///
/// `job_id` and `status` are mandatory; a body missing either is rejected
/// at the HTTP boundary before touching any shared state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDelivery {
    /// The job this delivery corresponds to.
    pub job_id: String,
    /// Completion status.
    pub status: DeliveryStatus,
    /// Target response captured by the remote service, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    /// Deduplication key the job was created under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotent_key: Option<String>,
}

/// A stored webhook delivery plus receipt metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookRecord {
    /// When the receiver accepted the delivery.
    pub received_at: DateTime<Utc>,
    /// The raw delivery payload.
    pub delivery: WebhookDelivery,
}

impl WebhookRecord {
    /// Wrap a delivery with the current receipt timestamp.
    pub fn now(delivery: WebhookDelivery) -> Self {
        Self {
            received_at: Utc::now(),
            delivery,
        }
    }
}
