//! Failure classification.
//!
//! Pure functions mapping raw failure signals onto a [`SessionError`]:
//!
//! - [`classify_close`]: WebSocket close codes → [`CloseClass`]
//! - [`classify_handshake_status`]: HTTP status of a refused upgrade
//! - [`classify_transport`]: transport exception text, matched against an
//!   ordered pattern table
//! - [`classify_probe_status`] / [`classify_probe_failure`]: health probe
//!   outcomes
//! - [`malformed_frame`]: decode failures

use std::fmt;

use super::{ErrorKind, SessionError};
use crate::constants::{
    CLOSE_NORMAL, CLOSE_POLICY_VIOLATION, CLOSE_TRY_AGAIN_LATER, CLOSE_UNSUPPORTED_DATA,
};

// ─────────────────────────────────────────────────────────────────────────────
// Close codes
// ─────────────────────────────────────────────────────────────────────────────

/// How a socket closure should be treated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseClass {
    /// Normal closure (1000). No error, no retry.
    Clean,
    /// Policy violation or unsupported data (1008/1003). Not retried.
    Rejected,
    /// Peer overloaded (1013). Retried.
    Overloaded,
    /// Anything else. Retried while under the attempt ceiling.
    Abnormal,
}

impl CloseClass {
    /// Whether the closure schedules an automatic retry.
    #[must_use]
    pub fn schedules_retry(self) -> bool {
        matches!(self, Self::Overloaded | Self::Abnormal)
    }

    /// The error surfaced for this closure, if any.
    #[must_use]
    pub fn error(self, code: u16, reason: &str) -> Option<SessionError> {
        let suffix = if reason.is_empty() {
            format!("code {code}")
        } else {
            format!("code {code}: {}", truncate(reason))
        };
        match self {
            Self::Clean => None,
            Self::Rejected => Some(
                SessionError::server(format!("Server rejected the session ({suffix})"))
                    .with_retryable(false),
            ),
            Self::Overloaded => Some(
                SessionError::server(format!("Server is overloaded ({suffix})"))
                    .with_retryable(true),
            ),
            Self::Abnormal => Some(SessionError::connection(format!(
                "Connection closed unexpectedly ({suffix})"
            ))),
        }
    }
}

impl fmt::Display for CloseClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clean => write!(f, "clean"),
            Self::Rejected => write!(f, "rejected"),
            Self::Overloaded => write!(f, "overloaded"),
            Self::Abnormal => write!(f, "abnormal"),
        }
    }
}

/// Classify a WebSocket close code.
#[must_use]
pub fn classify_close(code: u16) -> CloseClass {
    match code {
        CLOSE_NORMAL => CloseClass::Clean,
        CLOSE_POLICY_VIOLATION | CLOSE_UNSUPPORTED_DATA => CloseClass::Rejected,
        CLOSE_TRY_AGAIN_LATER => CloseClass::Overloaded,
        _ => CloseClass::Abnormal,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transport exceptions
// ─────────────────────────────────────────────────────────────────────────────

struct TransportPattern {
    check: fn(&str) -> bool,
    kind: ErrorKind,
    message: &'static str,
    retryable: bool,
}

/// Known transport failure patterns, checked in order against the lowercased
/// error text.
fn patterns() -> &'static [TransportPattern] {
    static PATTERNS: &[TransportPattern] = &[
        // Handshake rejected; only reached when the status itself is unavailable
        TransportPattern {
            check: |s| s.contains("too many requests"),
            kind: ErrorKind::RateLimit,
            message: "Service is rate limiting connections",
            retryable: true,
        },
        TransportPattern {
            check: |s| s.contains("unauthorized") || s.contains("forbidden"),
            kind: ErrorKind::Server,
            message: "Service refused the connection handshake",
            retryable: false,
        },
        TransportPattern {
            check: |s| {
                s.contains("internal server error")
                    || s.contains("bad gateway")
                    || s.contains("service unavailable")
                    || s.contains("gateway timeout")
            },
            kind: ErrorKind::Server,
            message: "Service temporarily unavailable",
            retryable: true,
        },
        // Socket level
        TransportPattern {
            check: |s| s.contains("connection refused") || s.contains("econnrefused"),
            kind: ErrorKind::Connection,
            message: "Connection refused",
            retryable: true,
        },
        TransportPattern {
            check: |s| s.contains("connection reset") || s.contains("broken pipe"),
            kind: ErrorKind::Connection,
            message: "Connection reset by peer",
            retryable: true,
        },
        TransportPattern {
            check: |s| s.contains("timed out") || s.contains("etimedout"),
            kind: ErrorKind::Timeout,
            message: "Connection timed out",
            retryable: true,
        },
        // Resolution / routing
        TransportPattern {
            check: |s| {
                s.contains("failed to lookup")
                    || s.contains("dns error")
                    || s.contains("name or service not known")
                    || s.contains("enotfound")
            },
            kind: ErrorKind::Network,
            message: "Could not resolve the service address",
            retryable: true,
        },
        TransportPattern {
            check: |s| s.contains("unreachable") || s.contains("network is down"),
            kind: ErrorKind::Network,
            message: "Network unreachable",
            retryable: true,
        },
    ];
    PATTERNS
}

/// Classify a transport exception message.
///
/// Unrecognized text is a retryable `connection` error.
#[must_use]
pub fn classify_transport(error_text: &str) -> SessionError {
    let lower = error_text.to_lowercase();
    let detail = truncate(error_text);
    for pattern in patterns() {
        if (pattern.check)(&lower) {
            return SessionError::new(pattern.kind, format!("{} ({detail})", pattern.message))
                .with_retryable(pattern.retryable);
        }
    }
    SessionError::connection(format!("Connection failed ({detail})"))
}

/// Classify an HTTP status returned in place of the WebSocket upgrade.
#[must_use]
pub fn classify_handshake_status(status: u16) -> SessionError {
    match status {
        429 => SessionError::rate_limit(format!(
            "Service is rate limiting connections (HTTP {status})"
        ))
        .with_retryable(true),
        401 | 403 => SessionError::server(format!(
            "Service refused the connection handshake (HTTP {status})"
        ))
        .with_retryable(false),
        500..=599 => SessionError::server(format!(
            "Service temporarily unavailable (HTTP {status})"
        ))
        .with_retryable(true),
        400..=499 => SessionError::server(format!("Handshake rejected (HTTP {status})"))
            .with_retryable(false),
        _ => SessionError::connection(format!("Unexpected handshake response (HTTP {status})")),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Health probe
// ─────────────────────────────────────────────────────────────────────────────

/// Classify a probe HTTP status. `None` for any 2xx.
#[must_use]
pub fn classify_probe_status(status: u16) -> Option<SessionError> {
    match status {
        200..=299 => None,
        429 => Some(SessionError::rate_limit(format!(
            "Health check throttled (HTTP {status})"
        ))),
        500..=599 => Some(
            SessionError::server(format!("Service reports unhealthy (HTTP {status})"))
                .with_retryable(true),
        ),
        _ => Some(SessionError::server(format!(
            "Health check failed (HTTP {status})"
        ))),
    }
}

/// Classify a probe that never produced a response.
#[must_use]
pub fn classify_probe_failure(error_text: &str) -> SessionError {
    SessionError::network(format!("Health check failed ({})", truncate(error_text)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Frames
// ─────────────────────────────────────────────────────────────────────────────

/// Error for a frame that could not be decoded.
#[must_use]
pub fn malformed_frame(detail: &dyn fmt::Display) -> SessionError {
    SessionError::parse(format!("Malformed message from service: {detail}"))
}

fn truncate(text: &str) -> &str {
    match text.char_indices().nth(200) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
