//! Session error taxonomy.
//!
//! Every failure the client surfaces is a [`SessionError`]: a closed
//! [`ErrorKind`], a human-readable message, a retryability flag and the time
//! it was detected. Only one error is "current" at a time; newer errors
//! replace older ones instead of stacking.
//!
//! The pure mapping from raw failure signals (close codes, transport
//! messages, probe statuses, malformed frames) to a [`SessionError`] lives in
//! [`classify`].

pub mod classify;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// ErrorKind
// ─────────────────────────────────────────────────────────────────────────────

/// Error category for classification and retry decisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transport-level failure (refused, reset, dropped).
    Connection,
    /// Transport open timeout or query timeout.
    Timeout,
    /// The peer rejected or could not serve the session.
    Server,
    /// The peer is throttling the client.
    RateLimit,
    /// A malformed inbound frame.
    Parse,
    /// Local send or probe failure.
    Network,
    /// Caller misuse (empty or oversized query, busy).
    Unknown,
}

impl ErrorKind {
    /// Retryability used when a constructor does not override it.
    #[must_use]
    pub fn default_retryable(self) -> bool {
        match self {
            Self::Connection | Self::Timeout | Self::RateLimit | Self::Parse | Self::Network => {
                true
            }
            Self::Server | Self::Unknown => false,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection => write!(f, "connection"),
            Self::Timeout => write!(f, "timeout"),
            Self::Server => write!(f, "server"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Parse => write!(f, "parse"),
            Self::Network => write!(f, "network"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RetryNotice
// ─────────────────────────────────────────────────────────────────────────────

/// Countdown attached to an error when an automatic retry is scheduled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryNotice {
    /// Zero-based attempt index of the scheduled retry.
    pub attempt: u32,
    /// Retry ceiling.
    pub max_attempts: u32,
    /// Delay before the retry starts.
    pub delay_ms: u64,
}

impl fmt::Display for RetryNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[allow(clippy::cast_precision_loss)]
        let secs = self.delay_ms as f64 / 1000.0;
        write!(
            f,
            "retrying in {secs}s (attempt {}/{})",
            self.attempt + 1,
            self.max_attempts
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SessionError
// ─────────────────────────────────────────────────────────────────────────────

/// The single user-visible error of a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionError {
    /// Error category.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Whether a retry (automatic or manual) makes sense.
    pub retryable: bool,
    /// When the failure was detected.
    pub occurred_at: DateTime<Utc>,
    /// Scheduled automatic retry, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryNotice>,
}

impl SessionError {
    /// Create an error with the kind's default retryability.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: kind.default_retryable(),
            occurred_at: Utc::now(),
            retry: None,
        }
    }

    /// Transport-level failure.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, message)
    }

    /// Open or query timeout.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Peer rejection or server-side failure.
    #[must_use]
    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Server, message)
    }

    /// Peer throttling.
    #[must_use]
    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimit, message)
    }

    /// Malformed inbound frame.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }

    /// Local send or probe failure.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    /// Caller misuse.
    #[must_use]
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    /// Override retryability.
    #[must_use]
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Attach a scheduled-retry countdown.
    #[must_use]
    pub fn with_retry_notice(mut self, notice: RetryNotice) -> Self {
        self.retry = Some(notice);
        self
    }

    /// Whether this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.retry {
            Some(notice) => write!(f, "{}; {notice}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for SessionError {}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
