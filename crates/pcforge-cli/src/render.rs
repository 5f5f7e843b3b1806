//! Terminal rendering for session output.

use pcforge_client::{ConnectionState, SessionStatus};
use pcforge_core::{ErrorKind, InboundEvent, SessionError};

/// One progress line for a `log` event. Other events have no progress line.
pub fn progress(event: &InboundEvent) -> Option<String> {
    let InboundEvent::Log { text, metadata } = event else {
        return None;
    };
    let detail = metadata.as_ref().and_then(|meta| match (&meta.tool, &meta.input) {
        (Some(tool), Some(input)) => Some(format!(" [{tool}: {input}]")),
        (Some(tool), None) => Some(format!(" [{tool}]")),
        (None, Some(input)) => Some(format!(" [{input}]")),
        (None, None) => None,
    });
    Some(format!("  · {text}{}", detail.unwrap_or_default()))
}

/// `[kind] message`, with the retry countdown when one is scheduled.
pub fn error_line(err: &SessionError) -> String {
    format!("[{}] {err}", err.kind)
}

/// Status summary printed when state or error changes.
pub fn status_line(status: &SessionStatus) -> String {
    match &status.error {
        Some(err) => format!("status: {} {}", status.state, error_line(err)),
        None => format!("status: {}", status.state),
    }
}

/// Whether the session has stopped trying on its own.
pub fn is_terminal(status: &SessionStatus) -> bool {
    match status.state {
        ConnectionState::Error => true,
        ConnectionState::ServerError => status.error.as_ref().is_none_or(|e| e.retry.is_none()),
        _ => false,
    }
}

/// Why an in-flight query can no longer complete, if it can't.
pub fn query_failure(status: &SessionStatus) -> Option<String> {
    let error = status.error.as_ref();
    match status.state {
        ConnectionState::Connected => error
            .filter(|e| e.kind == ErrorKind::Timeout)
            .map(error_line),
        ConnectionState::Disconnected if error.is_none() => {
            Some("the service closed the connection".into())
        }
        _ if is_terminal(status) => Some(
            error.map_or_else(|| format!("session ended in {}", status.state), error_line),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcforge_core::{LogMetadata, RetryNotice};

    fn status(state: ConnectionState, error: Option<SessionError>) -> SessionStatus {
        SessionStatus { state, error }
    }

    fn retrying(err: SessionError) -> SessionError {
        err.with_retry_notice(RetryNotice {
            attempt: 0,
            max_attempts: 5,
            delay_ms: 1000,
        })
    }

    #[test]
    fn progress_shows_tool_and_input() {
        let event = InboundEvent::Log {
            text: "Searching".into(),
            metadata: Some(LogMetadata {
                tool: Some("search".into()),
                input: Some("gpu under $300".into()),
                ..LogMetadata::default()
            }),
        };
        assert_eq!(
            progress(&event).unwrap(),
            "  · Searching [search: gpu under $300]"
        );
    }

    #[test]
    fn progress_without_metadata() {
        let event = InboundEvent::Log {
            text: "Thinking".into(),
            metadata: None,
        };
        assert_eq!(progress(&event).unwrap(), "  · Thinking");
        assert!(progress(&InboundEvent::Heartbeat).is_none());
        assert!(
            progress(&InboundEvent::FinalOutput {
                text: "done".into()
            })
            .is_none()
        );
    }

    #[test]
    fn status_line_includes_countdown() {
        let line = status_line(&status(
            ConnectionState::Timeout,
            Some(retrying(SessionError::timeout("Connection attempt timed out after 10s"))),
        ));
        assert!(line.starts_with("status: timeout [timeout] Connection attempt"));
        assert!(line.contains("attempt 1/5"));
        assert_eq!(
            status_line(&status(ConnectionState::Connected, None)),
            "status: connected"
        );
    }

    #[test]
    fn terminal_states() {
        assert!(is_terminal(&status(
            ConnectionState::Error,
            Some(SessionError::connection("gave up"))
        )));
        assert!(is_terminal(&status(
            ConnectionState::ServerError,
            Some(SessionError::server("rejected").with_retryable(false))
        )));
        assert!(!is_terminal(&status(
            ConnectionState::ServerError,
            Some(retrying(SessionError::server("overloaded")))
        )));
        assert!(!is_terminal(&status(ConnectionState::Reconnecting, None)));
    }

    #[test]
    fn query_timeout_fails_query() {
        let failure = query_failure(&status(
            ConnectionState::Connected,
            Some(SessionError::timeout("No response within 30s")),
        ));
        assert_eq!(failure.unwrap(), "[timeout] No response within 30s");
    }

    #[test]
    fn advisory_probe_error_does_not_fail_query() {
        assert!(
            query_failure(&status(
                ConnectionState::Connected,
                Some(SessionError::network("Health check failed"))
            ))
            .is_none()
        );
    }

    #[test]
    fn transient_drop_does_not_fail_query() {
        assert!(
            query_failure(&status(
                ConnectionState::Disconnected,
                Some(retrying(SessionError::connection("dropped")))
            ))
            .is_none()
        );
        assert!(query_failure(&status(ConnectionState::Disconnected, None)).is_some());
    }
}
