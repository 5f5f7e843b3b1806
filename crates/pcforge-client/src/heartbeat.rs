//! Inbound-silence detection.
//!
//! The monitor holds a single deadline, `last_seen_at + timeout`, re-armed
//! by every valid inbound frame. Explicit heartbeats are the primary signal,
//! but any decoded event proves the connection is alive. The session runtime
//! sleeps until [`HeartbeatMonitor::deadline`] and checks
//! [`HeartbeatMonitor::is_stale`] when it fires.

use std::time::Duration;

use tokio::time::Instant;

/// Tracks time since the last liveness signal.
#[derive(Clone, Debug)]
pub struct HeartbeatMonitor {
    timeout: Duration,
    last_seen_at: Option<Instant>,
}

impl HeartbeatMonitor {
    /// Create an idle monitor.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_seen_at: None,
        }
    }

    /// Begin monitoring, counting `now` as the first liveness signal.
    pub fn start(&mut self, now: Instant) {
        self.last_seen_at = Some(now);
    }

    /// Record a liveness signal. Ignored while idle.
    pub fn record(&mut self, now: Instant) {
        if self.last_seen_at.is_some() {
            self.last_seen_at = Some(now);
        }
    }

    /// Stop monitoring.
    pub fn stop(&mut self) {
        self.last_seen_at = None;
    }

    /// When the connection becomes stale, if monitoring.
    pub fn deadline(&self) -> Option<Instant> {
        self.last_seen_at.map(|seen| seen + self.timeout)
    }

    /// Whether the deadline has passed at `now`.
    pub fn is_stale(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|deadline| now >= deadline)
    }
}
