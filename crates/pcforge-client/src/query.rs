//! The single in-flight query.
//!
//! The tracker validates submissions and holds at most one
//! [`PendingQuery`]. Its timeout deadline lives in the session runtime; the
//! tracker only records which query that deadline belongs to.

use chrono::{DateTime, Utc};
use pcforge_core::{QueryId, SessionError};

/// A submitted query awaiting its final output.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingQuery {
    /// Correlation ID for logs.
    pub id: QueryId,
    /// Trimmed query text as sent.
    pub text: String,
    /// Submission time.
    pub submitted_at: DateTime<Utc>,
}

/// Holds at most one pending query.
#[derive(Clone, Debug)]
pub struct QueryTracker {
    pending: Option<PendingQuery>,
    max_chars: usize,
}

impl QueryTracker {
    /// Create an empty tracker accepting queries up to `max_chars`.
    pub fn new(max_chars: usize) -> Self {
        Self {
            pending: None,
            max_chars,
        }
    }

    /// Trim and length-check a submission.
    ///
    /// Length is counted in characters, not bytes.
    pub fn validate<'a>(&self, text: &'a str) -> Result<&'a str, SessionError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(SessionError::unknown("Query is empty"));
        }
        let chars = trimmed.chars().count();
        if chars > self.max_chars {
            return Err(SessionError::unknown(format!(
                "Query is too long ({chars} characters, maximum {})",
                self.max_chars
            )));
        }
        Ok(trimmed)
    }

    /// Error returned when a second query is submitted.
    pub fn busy_error(&self) -> SessionError {
        let detail = self
            .pending
            .as_ref()
            .map(|p| format!(" ({})", p.id))
            .unwrap_or_default();
        SessionError::unknown(format!("A query is already in progress{detail}"))
    }

    /// Whether a query is pending.
    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// The pending query, if any.
    pub fn pending(&self) -> Option<&PendingQuery> {
        self.pending.as_ref()
    }

    /// Record an accepted query.
    pub fn begin(&mut self, text: &str) -> QueryId {
        let id = QueryId::new();
        self.pending = Some(PendingQuery {
            id: id.clone(),
            text: text.to_owned(),
            submitted_at: Utc::now(),
        });
        id
    }

    /// The final output arrived.
    pub fn complete(&mut self) -> Option<PendingQuery> {
        self.pending.take()
    }

    /// The timeout fired first.
    pub fn expire(&mut self) -> Option<PendingQuery> {
        self.pending.take()
    }

    /// The caller gave up.
    pub fn cancel(&mut self) -> Option<PendingQuery> {
        self.pending.take()
    }
}
