use pcforge_core::constants::{
    DEFAULT_HEARTBEAT_TIMEOUT_MS, DEFAULT_OPEN_TIMEOUT_MS, DEFAULT_PROBE_INTERVAL_MS,
    DEFAULT_PROBE_TIMEOUT_MS, DEFAULT_QUERY_TIMEOUT_MS, MAX_QUERY_CHARS,
};
use serde::{Deserialize, Serialize};

/// Default WebSocket endpoint.
pub const DEFAULT_URL: &str = "ws://127.0.0.1:8000/ws";
/// Default liveness endpoint.
pub const DEFAULT_HEALTH_URL: &str = "http://127.0.0.1:8000/health";

/// Endpoints and session timing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// WebSocket endpoint of the service.
    pub url: String,
    /// HTTP liveness endpoint probed while connected.
    pub health_url: String,
    /// Transport open timeout.
    pub open_timeout_ms: u64,
    /// Inbound silence tolerated while connected.
    pub heartbeat_timeout_ms: u64,
    /// Interval between health probes.
    pub probe_interval_ms: u64,
    /// Per-probe HTTP timeout.
    pub probe_timeout_ms: u64,
    /// Time a query may wait for its final output.
    pub query_timeout_ms: u64,
    /// Maximum query length in characters.
    pub max_query_chars: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            health_url: DEFAULT_HEALTH_URL.to_string(),
            open_timeout_ms: DEFAULT_OPEN_TIMEOUT_MS,
            heartbeat_timeout_ms: DEFAULT_HEARTBEAT_TIMEOUT_MS,
            probe_interval_ms: DEFAULT_PROBE_INTERVAL_MS,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
            max_query_chars: MAX_QUERY_CHARS,
        }
    }
}
