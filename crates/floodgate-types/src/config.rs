//! Construction-time configuration for the Floodgate client and receiver.
//!
//! All endpoints and credentials are supplied here; nothing is read from
//! ambient globals. The API key is wrapped in [`SecretString`] so it never
//! appears in `Debug` output or logs.

use secrecy::SecretString;
use serde::Deserialize;

fn default_proxy_url() -> String {
    "https://gate.floodgate.dev".to_string()
}

fn default_remote_url() -> String {
    "https://jobs.floodgate.dev".to_string()
}

fn default_submit_timeout_secs() -> u64 {
    30
}

/// Configuration for the outbound submission client.
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    /// Customer API key for the authenticating proxy.
    pub api_key: SecretString,
    /// Base URL of the authenticating proxy.
    #[serde(default = "default_proxy_url")]
    pub proxy_url: String,
    /// Base URL of the remote execution service (reached via the proxy).
    #[serde(default = "default_remote_url")]
    pub remote_url: String,
    /// Timeout for the submission round-trip, in seconds.
    #[serde(default = "default_submit_timeout_secs")]
    pub submit_timeout_secs: u64,
}

impl ClientConfig {
    /// Config with the given API key and default endpoints.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            proxy_url: default_proxy_url(),
            remote_url: default_remote_url(),
            submit_timeout_secs: default_submit_timeout_secs(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_callback_workers() -> usize {
    4
}

fn default_callback_queue_depth() -> usize {
    64
}

/// Configuration for the local webhook receiver.
#[derive(Debug, Clone, Deserialize)]
pub struct ReceiverConfig {
    /// Listen host.
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port. 0 picks a free port.
    #[serde(default)]
    pub port: u16,
    /// Shared secret for inbound signature verification. When absent,
    /// deliveries are accepted unverified.
    #[serde(default)]
    pub signing_secret: Option<String>,
    /// Secondary secret accepted during rotation.
    #[serde(default)]
    pub secondary_secret: Option<String>,
    /// Worker count for the user-callback dispatch pool.
    #[serde(default = "default_callback_workers")]
    pub callback_workers: usize,
    /// Queue depth for the user-callback dispatch pool. When the queue is
    /// full, callbacks are shed with a warning rather than blocking the
    /// webhook response.
    #[serde(default = "default_callback_queue_depth")]
    pub callback_queue_depth: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 0,
            signing_secret: None,
            secondary_secret: None,
            callback_workers: default_callback_workers(),
            callback_queue_depth: default_callback_queue_depth(),
        }
    }
}

/// Top-level configuration file shape (`floodgate.toml`).
#[derive(Debug, Deserialize)]
pub struct FloodgateConfig {
    pub client: ClientConfig,
    #[serde(default)]
    pub receiver: ReceiverConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn client_config_defaults() {
        let config = ClientConfig::new("ck_live_cust_123");
        assert_eq!(config.api_key.expose_secret(), "ck_live_cust_123");
        assert_eq!(config.proxy_url, "https://gate.floodgate.dev");
        assert_eq!(config.submit_timeout_secs, 30);
    }

    #[test]
    fn api_key_never_appears_in_debug_output() {
        let config = ClientConfig::new("ck_live_cust_123");
        let debug = format!("{config:?}");
        assert!(!debug.contains("ck_live_cust_123"));
    }

    #[test]
    fn config_file_parses_with_partial_receiver_section() {
        let toml = r#"
[client]
api_key = "ck_test_1"
proxy_url = "http://localhost:9000"

[receiver]
port = 5000
signing_secret = "whsec_abc"
"#;
        let config: FloodgateConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.client.proxy_url, "http://localhost:9000");
        assert_eq!(config.client.remote_url, "https://jobs.floodgate.dev");
        assert_eq!(config.receiver.port, 5000);
        assert_eq!(config.receiver.signing_secret.as_deref(), Some("whsec_abc"));
        assert_eq!(config.receiver.callback_workers, 4);
    }

    #[test]
    fn receiver_defaults_to_ephemeral_port() {
        let config = ReceiverConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 0);
        assert!(config.signing_secret.is_none());
    }
}
