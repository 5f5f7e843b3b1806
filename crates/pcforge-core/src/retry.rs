//! Reconnect policy: backoff calculation and the attempt ceiling.
//!
//! - [`RetryConfig`]: ceiling and delay bounds
//! - [`calculate_backoff_delay`]: `min(base * 2^attempt, max)`
//! - [`RetryState`]: attempt counter owned by the session state machine
//!
//! No jitter is applied: a single client per session never causes a
//! thundering herd, and the delay sequence stays exactly reproducible.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::RetryNotice;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default retry ceiling.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Configuration for reconnect backoff.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Automatic retries before entering the terminal error state (default: 5).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay for exponential backoff in ms (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay between retries in ms (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl RetryConfig {
    /// Delay before zero-based attempt `attempt`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(calculate_backoff_delay(
            attempt,
            self.base_delay_ms,
            self.max_delay_ms,
        ))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backoff calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Calculate the exponential backoff delay for a zero-based attempt.
///
/// Formula: `min(max_delay, base_delay * 2^attempt)`. Saturates instead of
/// overflowing for large attempt numbers.
#[must_use]
pub fn calculate_backoff_delay(attempt: u32, base_delay_ms: u64, max_delay_ms: u64) -> u64 {
    let exponential = base_delay_ms.saturating_mul(1u64 << attempt.min(31));
    exponential.min(max_delay_ms)
}

// ─────────────────────────────────────────────────────────────────────────────
// Attempt tracking
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of asking the policy for another retry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after `delay`.
    Retry {
        /// Zero-based index of this retry.
        attempt: u32,
        /// Wait before reconnecting.
        delay: Duration,
    },
    /// The ceiling was reached; stop retrying automatically.
    Exhausted,
}

/// Attempt counter for automatic reconnects.
///
/// Reset on every successful connection; advanced on every failure that
/// schedules a retry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryState {
    config: RetryConfig,
    attempt_count: u32,
}

impl RetryState {
    /// Create a fresh counter.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Retries scheduled since the last successful connection.
    #[must_use]
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Retry ceiling.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Whether the ceiling has been reached.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.attempt_count >= self.config.max_attempts
    }

    /// Record a failure and decide whether to retry.
    pub fn next(&mut self) -> RetryDecision {
        if self.is_exhausted() {
            return RetryDecision::Exhausted;
        }
        let attempt = self.attempt_count;
        self.attempt_count += 1;
        RetryDecision::Retry {
            attempt,
            delay: self.config.delay_for(attempt),
        }
    }

    /// Countdown notice for a retry decision.
    #[must_use]
    pub fn notice(&self, attempt: u32, delay: Duration) -> RetryNotice {
        RetryNotice {
            attempt,
            max_attempts: self.config.max_attempts,
            delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Forget previous failures.
    pub fn reset(&mut self) {
        self.attempt_count = 0;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
