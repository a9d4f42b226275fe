//! Submission client for the authenticating proxy.
//!
//! Jobs are never posted to the remote execution service directly. The
//! serialized spec is wrapped in a proxy envelope and posted to
//! `{proxy_url}/api/v1/proxy` with the customer key as a bearer token; the
//! proxy authenticates, applies the plan's rate limits, and forwards the
//! inner payload to `{remote_url}/api/v1/jobs`. The proxy's reply nests
//! the remote service's response, so both layers are unwrapped here and
//! every refusal maps to a typed [`FloodgateError`].

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::BoxFuture;
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use floodgate_core::step::JobSubmitter;
use floodgate_types::config::ClientConfig;
use floodgate_types::error::FloodgateError;
use floodgate_types::job::{JobSpec, Submission};

/// Envelope the proxy expects. `scope: customer` with an empty metric name
/// checks every plan limit.
#[derive(Debug, Serialize)]
struct ProxyEnvelope {
    scope: &'static str,
    metric_name: &'static str,
    target_url: String,
    method: &'static str,
    headers: HashMap<String, String>,
    body: String,
}

/// Proxy reply wrapping the forwarded remote response.
#[derive(Debug, Deserialize)]
struct ProxyReply {
    status: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    forwarded_response: Option<ForwardedResponse>,
}

#[derive(Debug, Deserialize)]
struct ForwardedResponse {
    status_code: u16,
    #[serde(default)]
    body: Option<String>,
}

/// [`JobSubmitter`] backed by the authenticating proxy.
pub struct ProxyClient {
    http: reqwest::Client,
    api_key: SecretString,
    proxy_url: String,
    remote_url: String,
}

impl ProxyClient {
    pub fn new(config: &ClientConfig) -> Result<Self, FloodgateError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.submit_timeout_secs))
            .build()
            .map_err(|err| FloodgateError::Config(format!("http client: {err}")))?;
        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            proxy_url: config.proxy_url.trim_end_matches('/').to_string(),
            remote_url: config.remote_url.trim_end_matches('/').to_string(),
        })
    }

    async fn submit_inner(&self, spec: JobSpec) -> Result<Submission, FloodgateError> {
        let job_body = serde_json::to_string(&spec)
            .map_err(|err| FloodgateError::Config(format!("unserializable job: {err}")))?;
        let envelope = ProxyEnvelope {
            scope: "customer",
            metric_name: "",
            target_url: format!("{}/api/v1/jobs", self.remote_url),
            method: "POST",
            headers: HashMap::from([(
                "Content-Type".to_string(),
                "application/json".to_string(),
            )]),
            body: job_body,
        };

        let response = self
            .http
            .post(format!("{}/api/v1/proxy", self.proxy_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&envelope)
            .send()
            .await
            .map_err(map_transport)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(rate_limited(response).await);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let detail = response.text().await.unwrap_or_default();
            return Err(FloodgateError::Authentication(detail));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(FloodgateError::RequestDenied(format!(
                "proxy returned {status}: {detail}"
            )));
        }

        let reply: ProxyReply = response
            .json()
            .await
            .map_err(|err| FloodgateError::RemoteExecution(format!("malformed proxy reply: {err}")))?;

        if reply.status != "allowed" {
            return Err(FloodgateError::RequestDenied(
                reply.error.unwrap_or_else(|| "unknown reason".to_string()),
            ));
        }

        let forwarded = reply.forwarded_response.ok_or_else(|| {
            FloodgateError::RemoteExecution("proxy reply missing forwarded response".to_string())
        })?;
        if forwarded.status_code != 201 {
            return Err(FloodgateError::RemoteExecution(format!(
                "job creation returned {}: {}",
                forwarded.status_code,
                forwarded.body.as_deref().unwrap_or("")
            )));
        }

        let submission: Submission = serde_json::from_str(forwarded.body.as_deref().unwrap_or("{}"))
            .map_err(|err| {
                FloodgateError::RemoteExecution(format!("malformed submission body: {err}"))
            })?;
        tracing::debug!(job_id = %submission.job_id, "job accepted by remote service");
        Ok(submission)
    }
}

impl JobSubmitter for ProxyClient {
    fn submit(&self, spec: JobSpec) -> BoxFuture<'_, Result<Submission, FloodgateError>> {
        Box::pin(self.submit_inner(spec))
    }
}

impl std::fmt::Debug for ProxyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyClient")
            .field("proxy_url", &self.proxy_url)
            .field("remote_url", &self.remote_url)
            .finish()
    }
}

/// Build the rate-limit error from a 429 reply. The retry instant comes
/// from the `Retry-After` header when present, otherwise from a `retry_at`
/// field in the body.
async fn rate_limited(response: reqwest::Response) -> FloodgateError {
    let retry_after_secs = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<i64>().ok());

    let body: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);
    let retry_at_ms = retry_after_secs
        .map(|secs| Utc::now().timestamp_millis() + secs * 1000)
        .or_else(|| body.get("retry_at").and_then(|value| value.as_i64()));

    FloodgateError::RateLimited { retry_at_ms }
}

fn map_transport(err: reqwest::Error) -> FloodgateError {
    if err.is_timeout() {
        FloodgateError::Timeout
    } else {
        FloodgateError::RemoteExecution(format!("proxy unreachable: {err}"))
    }
}
