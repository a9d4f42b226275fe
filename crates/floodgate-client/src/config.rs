//! TOML configuration loading.

use std::path::Path;

use floodgate_types::config::{FloodgateConfig, ReceiverConfig};
use floodgate_types::error::FloodgateError;

/// Load the full configuration from a `floodgate.toml` file.
///
/// The client section needs an `api_key`, so there is no default fallback
/// here: a missing or invalid file is an error.
pub fn load(path: impl AsRef<Path>) -> Result<FloodgateConfig, FloodgateError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .map_err(|err| FloodgateError::Config(format!("cannot read {}: {err}", path.display())))?;
    toml::from_str(&raw)
        .map_err(|err| FloodgateError::Config(format!("invalid config {}: {err}", path.display())))
}

/// Load just the receiver section, falling back to defaults when the file
/// is missing or does not parse. Standalone receivers carry no credential,
/// so running on defaults is safe; the fallback is logged.
pub fn load_receiver(path: impl AsRef<Path>) -> ReceiverConfig {
    let path = path.as_ref();
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "config not readable, using receiver defaults");
            return ReceiverConfig::default();
        }
    };

    #[derive(serde::Deserialize, Default)]
    struct ReceiverOnly {
        #[serde(default)]
        receiver: ReceiverConfig,
    }

    match toml::from_str::<ReceiverOnly>(&raw) {
        Ok(config) => config.receiver,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "config invalid, using receiver defaults");
            ReceiverConfig::default()
        }
    }
}
