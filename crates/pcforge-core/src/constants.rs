//! Package-level constants and protocol defaults.

/// Current version of the pcforge client (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const NAME: &str = "pcforge";

/// WebSocket close code for a clean, caller-requested shutdown.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code sent when the client abandons a socket it considers dead.
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Peer refused the payload type.
pub const CLOSE_UNSUPPORTED_DATA: u16 = 1003;
/// Synthetic code for a connection that dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;
/// Peer rejected the session for a policy violation.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
/// Peer is overloaded and asks the client to come back later.
pub const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

/// Maximum query length in characters.
pub const MAX_QUERY_CHARS: usize = 500;

/// Transport open timeout.
pub const DEFAULT_OPEN_TIMEOUT_MS: u64 = 10_000;
/// Inbound silence tolerated while connected.
pub const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 60_000;
/// Interval between out-of-band health probes.
pub const DEFAULT_PROBE_INTERVAL_MS: u64 = 10 * 60 * 1000;
/// Per-probe HTTP timeout.
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;
/// Time a submitted query may wait for its final output.
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 30_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_semver() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert_eq!(parts.len(), 3, "VERSION must be semver (MAJOR.MINOR.PATCH)");
        for part in parts {
            let _: u32 = part.parse().expect("each semver segment must be a number");
        }
    }

    #[test]
    fn name_is_lowercase() {
        assert_eq!(NAME, NAME.to_lowercase());
    }

    #[test]
    fn open_timeout_shorter_than_heartbeat() {
        assert!(DEFAULT_OPEN_TIMEOUT_MS < DEFAULT_HEARTBEAT_TIMEOUT_MS);
    }
}
