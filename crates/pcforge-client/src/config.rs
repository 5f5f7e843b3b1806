//! Session configuration.

use std::time::Duration;

use pcforge_core::RetryConfig;
use pcforge_core::constants::{
    DEFAULT_HEARTBEAT_TIMEOUT_MS, DEFAULT_OPEN_TIMEOUT_MS, DEFAULT_PROBE_INTERVAL_MS,
    DEFAULT_PROBE_TIMEOUT_MS, DEFAULT_QUERY_TIMEOUT_MS, MAX_QUERY_CHARS,
};
use pcforge_settings::{DEFAULT_HEALTH_URL, DEFAULT_URL, PcforgeSettings};
use serde::{Deserialize, Serialize};

/// Runtime configuration for one session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// WebSocket endpoint.
    pub url: String,
    /// HTTP liveness endpoint.
    pub health_url: String,
    /// Transport open timeout in ms.
    pub open_timeout_ms: u64,
    /// Inbound silence tolerated while connected, in ms.
    pub heartbeat_timeout_ms: u64,
    /// Interval between health probes in ms.
    pub probe_interval_ms: u64,
    /// Per-probe timeout in ms.
    pub probe_timeout_ms: u64,
    /// Query timeout in ms.
    pub query_timeout_ms: u64,
    /// Maximum query length in characters.
    pub max_query_chars: usize,
    /// Reconnect backoff.
    pub retry: RetryConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.into(),
            health_url: DEFAULT_HEALTH_URL.into(),
            open_timeout_ms: DEFAULT_OPEN_TIMEOUT_MS,
            heartbeat_timeout_ms: DEFAULT_HEARTBEAT_TIMEOUT_MS,
            probe_interval_ms: DEFAULT_PROBE_INTERVAL_MS,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
            max_query_chars: MAX_QUERY_CHARS,
            retry: RetryConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &PcforgeSettings) -> Self {
        let client = &settings.client;
        Self {
            url: client.url.clone(),
            health_url: client.health_url.clone(),
            open_timeout_ms: client.open_timeout_ms,
            heartbeat_timeout_ms: client.heartbeat_timeout_ms,
            probe_interval_ms: client.probe_interval_ms,
            probe_timeout_ms: client.probe_timeout_ms,
            query_timeout_ms: client.query_timeout_ms,
            max_query_chars: client.max_query_chars,
            retry: settings.retry,
        }
    }

    /// Transport open timeout.
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    /// Heartbeat deadline.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Probe interval.
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    /// Per-probe timeout.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Query timeout.
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}
