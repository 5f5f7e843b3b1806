//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so partial
//! JSON files deserialize with missing fields taking their compiled default.

mod client;

pub use client::*;

use pcforge_core::RetryConfig;
use pcforge_core::constants::{NAME, VERSION};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the pcforge client.
///
/// ```json
/// {
///   "client": { "url": "wss://build.example.com/ws", "queryTimeoutMs": 45000 },
///   "retry": { "maxAttempts": 3 },
///   "logging": { "level": "info" }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PcforgeSettings {
    /// Settings schema version.
    pub version: String,
    /// Application name.
    pub name: String,
    /// Endpoints and session timing.
    pub client: ClientSettings,
    /// Reconnect backoff.
    pub retry: RetryConfig,
    /// Diagnostics output.
    pub logging: LoggingSettings,
}

impl Default for PcforgeSettings {
    fn default() -> Self {
        Self {
            version: VERSION.to_string(),
            name: NAME.to_string(),
            client: ClientSettings::default(),
            retry: RetryConfig::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl PcforgeSettings {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let url = self.client.url.as_str();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(SettingsError::InvalidValue(format!(
                "client.url must use ws:// or wss://, got {url:?}"
            )));
        }
        let health = self.client.health_url.as_str();
        if !(health.starts_with("http://") || health.starts_with("https://")) {
            return Err(SettingsError::InvalidValue(format!(
                "client.healthUrl must use http:// or https://, got {health:?}"
            )));
        }
        if self.client.max_query_chars == 0 {
            return Err(SettingsError::InvalidValue(
                "client.maxQueryChars must be at least 1".into(),
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(SettingsError::InvalidValue(format!(
                "retry.baseDelayMs ({}) exceeds retry.maxDelayMs ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (`error`, `warn`, `info`, `debug`, `trace`) or a full
    /// `EnvFilter` directive.
    pub level: String,
    /// Emit one JSON object per line instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults() {
        let settings = PcforgeSettings::default();
        assert_eq!(settings.name, "pcforge");
        assert_eq!(settings.client.open_timeout_ms, 10_000);
        assert_eq!(settings.client.heartbeat_timeout_ms, 60_000);
        assert_eq!(settings.client.probe_interval_ms, 600_000);
        assert_eq!(settings.client.probe_timeout_ms, 5_000);
        assert_eq!(settings.client.query_timeout_ms, 30_000);
        assert_eq!(settings.client.max_query_chars, 500);
        assert_eq!(settings.retry.max_attempts, 5);
        assert_eq!(settings.logging.level, "warn");
        assert!(!settings.logging.json);
        settings.validate().unwrap();
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(PcforgeSettings::default()).unwrap();
        assert!(json["client"]["healthUrl"].is_string());
        assert_eq!(json["client"]["queryTimeoutMs"], 30_000);
        assert_eq!(json["retry"]["baseDelayMs"], 1000);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: PcforgeSettings =
            serde_json::from_str(r#"{"client":{"queryTimeoutMs":45000}}"#).unwrap();
        assert_eq!(settings.client.query_timeout_ms, 45_000);
        assert_eq!(settings.client.open_timeout_ms, 10_000);
        assert_eq!(settings.retry, RetryConfig::default());
    }

    #[test]
    fn validate_rejects_http_socket_url() {
        let mut settings = PcforgeSettings::default();
        settings.client.url = "http://localhost:8000/ws".into();
        assert_matches!(settings.validate(), Err(SettingsError::InvalidValue(msg)) => {
            assert!(msg.contains("client.url"));
        });
    }

    #[test]
    fn validate_rejects_socket_health_url() {
        let mut settings = PcforgeSettings::default();
        settings.client.health_url = "ws://localhost:8000/health".into();
        assert_matches!(settings.validate(), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn validate_rejects_zero_query_limit() {
        let mut settings = PcforgeSettings::default();
        settings.client.max_query_chars = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_delays() {
        let mut settings = PcforgeSettings::default();
        settings.retry.base_delay_ms = 60_000;
        assert!(settings.validate().is_err());
    }
}
