//! Connection state machine.
//!
//! [`SessionMachine`] owns the connection state, the current error, the
//! retry counter and the pending query. It never touches a socket or a
//! clock: every input is an [`Event`], every side effect is returned as an
//! [`Effect`] for the session runtime to carry out.
//!
//! ```text
//! disconnected ──connect──▶ connecting ──open──▶ connected
//!       ▲                      │  ▲                 │
//!       │          fail/timeout│  │ retry due       │ close / stale
//!       │                      ▼  │                 ▼
//!       └──── close(1000) ── timeout | server_error | disconnected
//!                                  │
//!                      ceiling hit ▼
//!                                error  (needs reconnect)
//! ```
//!
//! While a retry attempt is in flight the state is `reconnecting`. During
//! the backoff wait the state stays at the failure that caused it, so a
//! 1013 close reads `server_error` and an open timeout reads `timeout`
//! until the retry starts. Observers can tell why the link dropped while
//! the countdown runs.

use std::fmt;
use std::time::Duration;

use pcforge_core::constants::{CLOSE_GOING_AWAY, CLOSE_NORMAL};
use pcforge_core::errors::classify::{CloseClass, classify_close};
use pcforge_core::{
    InboundEvent, QueryId, RetryDecision, RetryState, SessionError, decode_frame, encode_query,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

use crate::config::SessionConfig;
use crate::query::{PendingQuery, QueryTracker};

// ─────────────────────────────────────────────────────────────────────────────
// State
// ─────────────────────────────────────────────────────────────────────────────

/// Connection state. Only [`SessionMachine`] changes it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No transport and no automatic retry pending, or waiting out a retry
    /// delay after an abnormal close.
    #[default]
    Disconnected,
    /// First transport attempt in flight.
    Connecting,
    /// Transport open.
    Connected,
    /// Retry transport attempt in flight.
    Reconnecting,
    /// Open timed out or the connection went stale.
    Timeout,
    /// Retry ceiling reached; needs `reconnect()`.
    Error,
    /// The peer rejected or could not serve the session.
    ServerError,
}

impl ConnectionState {
    /// Whether a transport (open or opening) exists in this state.
    pub fn has_transport(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected | Self::Reconnecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Timeout => write!(f, "timeout"),
            Self::Error => write!(f, "error"),
            Self::ServerError => write!(f, "server_error"),
        }
    }
}

/// Snapshot published to observers.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    /// Connection state.
    pub state: ConnectionState,
    /// Current error, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SessionError>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Events and effects
// ─────────────────────────────────────────────────────────────────────────────

/// Input to the machine.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Caller asked to connect.
    Connect,
    /// Caller asked to disconnect.
    Disconnect,
    /// Caller asked for a fresh reconnect.
    Reconnect,
    /// The transport attempt opened.
    SocketOpened,
    /// The transport attempt failed before opening.
    OpenFailed(SessionError),
    /// The open timeout fired.
    OpenTimedOut,
    /// The socket closed.
    SocketClosed {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
    /// An outbound write failed.
    WriteFailed(String),
    /// A text frame arrived.
    FrameReceived(String),
    /// The heartbeat deadline passed.
    HeartbeatExpired,
    /// The retry delay elapsed.
    RetryDue,
    /// A health probe succeeded.
    ProbeSucceeded,
    /// A health probe failed.
    ProbeFailed(SessionError),
    /// The query timeout fired.
    QueryTimedOut,
    /// Caller cancelled the pending query.
    CancelQuery,
}

/// Side effect requested by the machine.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    /// Start a new transport attempt and arm the open timeout.
    OpenTransport,
    /// Close the current transport or abandon the attempt in flight.
    CloseTransport {
        /// Close code to send.
        code: u16,
    },
    /// Start the heartbeat deadline.
    StartHeartbeat,
    /// Re-arm the heartbeat deadline.
    TouchHeartbeat,
    /// Stop the heartbeat deadline.
    StopHeartbeat,
    /// Probe now and then on the probe interval.
    StartProbing,
    /// Stop probing and ignore probes in flight.
    StopProbing,
    /// Arm the retry timer.
    ScheduleRetry {
        /// Delay before `RetryDue`.
        delay: Duration,
    },
    /// Disarm the retry timer.
    CancelRetry,
    /// Write a text frame.
    SendFrame(String),
    /// Arm the query timeout.
    ArmQueryTimeout,
    /// Disarm the query timeout.
    CancelQueryTimeout,
    /// Hand an event to the sink.
    Deliver(InboundEvent),
    /// The state changed.
    StateChanged(ConnectionState),
}

// ─────────────────────────────────────────────────────────────────────────────
// Machine
// ─────────────────────────────────────────────────────────────────────────────

/// Pure connection state machine.
#[derive(Debug)]
pub struct SessionMachine {
    config: SessionConfig,
    state: ConnectionState,
    error: Option<SessionError>,
    /// The current error came from a health probe.
    advisory_error: bool,
    retry: RetryState,
    retry_scheduled: bool,
    query: QueryTracker,
}

impl SessionMachine {
    /// Create a disconnected machine.
    pub fn new(config: SessionConfig) -> Self {
        let retry = RetryState::new(config.retry);
        let query = QueryTracker::new(config.max_query_chars);
        Self {
            config,
            state: ConnectionState::Disconnected,
            error: None,
            advisory_error: false,
            retry,
            retry_scheduled: false,
            query,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Current error.
    pub fn error(&self) -> Option<&SessionError> {
        self.error.as_ref()
    }

    /// State and error together.
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state,
            error: self.error.clone(),
        }
    }

    /// Retries scheduled since the last successful connection.
    pub fn attempt_count(&self) -> u32 {
        self.retry.attempt_count()
    }

    /// Whether an automatic retry is waiting for its delay.
    pub fn retry_scheduled(&self) -> bool {
        self.retry_scheduled
    }

    /// The pending query, if any.
    pub fn pending_query(&self) -> Option<&PendingQuery> {
        self.query.pending()
    }

    /// Apply one event.
    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        let mut fx = Vec::new();
        match event {
            Event::Connect => self.connect(&mut fx),
            Event::Disconnect => self.disconnect(&mut fx),
            Event::Reconnect => {
                self.retry.reset();
                self.clear_error();
                self.connect(&mut fx);
            }
            Event::SocketOpened => self.socket_opened(&mut fx),
            Event::OpenFailed(err) => self.open_failed(err, &mut fx),
            Event::OpenTimedOut => self.open_timed_out(&mut fx),
            Event::SocketClosed { code, reason } => self.socket_closed(code, &reason, &mut fx),
            Event::WriteFailed(detail) => {
                warn!(error = %detail, "write failed");
                self.set_error(SessionError::network(format!(
                    "Failed to send message ({detail})"
                )));
            }
            Event::FrameReceived(text) => self.frame_received(&text, &mut fx),
            Event::HeartbeatExpired => self.heartbeat_expired(&mut fx),
            Event::RetryDue => self.retry_due(&mut fx),
            Event::ProbeSucceeded => {
                if self.state == ConnectionState::Connected && self.advisory_error {
                    debug!("health probe recovered");
                    self.clear_error();
                }
            }
            Event::ProbeFailed(err) => {
                if self.state == ConnectionState::Connected {
                    warn!(kind = %err.kind, error = %err.message, "health probe failed");
                    self.set_error(err);
                    self.advisory_error = true;
                }
            }
            Event::QueryTimedOut => {
                if let Some(query) = self.query.expire() {
                    warn!(query_id = %query.id, "query timed out");
                    self.set_error(SessionError::timeout(format!(
                        "No response within {}",
                        fmt_ms(self.config.query_timeout_ms)
                    )));
                }
            }
            Event::CancelQuery => {
                if let Some(query) = self.query.cancel() {
                    debug!(query_id = %query.id, "query cancelled");
                    fx.push(Effect::CancelQueryTimeout);
                }
            }
        }
        fx
    }

    /// Send a raw text frame. Only allowed while connected.
    pub fn send(&mut self, payload: String) -> Result<Vec<Effect>, SessionError> {
        if self.state != ConnectionState::Connected {
            return Err(self.not_connected());
        }
        Ok(vec![Effect::SendFrame(payload)])
    }

    /// Submit a query.
    ///
    /// Rejections are returned to the caller and leave state, the current
    /// error and any pending query untouched.
    pub fn submit(&mut self, text: &str) -> Result<(QueryId, Vec<Effect>), SessionError> {
        let trimmed = self.query.validate(text)?;
        if self.state != ConnectionState::Connected {
            return Err(self.not_connected());
        }
        if self.query.is_busy() {
            return Err(self.query.busy_error());
        }
        let id = self.query.begin(trimmed);
        info!(query_id = %id, chars = trimmed.chars().count(), "query submitted");
        Ok((
            id,
            vec![Effect::SendFrame(encode_query(trimmed)), Effect::ArmQueryTimeout],
        ))
    }

    // ── Transitions ─────────────────────────────────────────────────

    fn connect(&mut self, fx: &mut Vec<Effect>) {
        if self.state.has_transport() {
            debug!(state = %self.state, "connect ignored");
            return;
        }
        if self.retry_scheduled {
            self.retry_scheduled = false;
            fx.push(Effect::CancelRetry);
        }
        self.transition(ConnectionState::Connecting, fx);
        fx.push(Effect::OpenTransport);
    }

    fn disconnect(&mut self, fx: &mut Vec<Effect>) {
        if self.state.has_transport() {
            fx.push(Effect::CloseTransport { code: CLOSE_NORMAL });
        }
        if self.state == ConnectionState::Connected {
            fx.push(Effect::StopHeartbeat);
            fx.push(Effect::StopProbing);
        }
        if self.retry_scheduled {
            self.retry_scheduled = false;
            fx.push(Effect::CancelRetry);
        }
        if let Some(query) = self.query.cancel() {
            debug!(query_id = %query.id, "pending query dropped on disconnect");
            fx.push(Effect::CancelQueryTimeout);
        }
        self.clear_error();
        self.transition(ConnectionState::Disconnected, fx);
    }

    fn socket_opened(&mut self, fx: &mut Vec<Effect>) {
        if !matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Reconnecting
        ) {
            return;
        }
        self.retry.reset();
        self.clear_error();
        self.transition(ConnectionState::Connected, fx);
        fx.push(Effect::StartHeartbeat);
        fx.push(Effect::StartProbing);
    }

    fn open_failed(&mut self, err: SessionError, fx: &mut Vec<Effect>) {
        if !matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Reconnecting
        ) {
            return;
        }
        if err.retryable {
            self.fail_and_retry(err, ConnectionState::Disconnected, fx);
        } else {
            warn!(kind = %err.kind, error = %err.message, "connection refused by service");
            self.set_error(err);
            self.transition(ConnectionState::ServerError, fx);
        }
    }

    fn open_timed_out(&mut self, fx: &mut Vec<Effect>) {
        if !matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Reconnecting
        ) {
            return;
        }
        fx.push(Effect::CloseTransport {
            code: CLOSE_GOING_AWAY,
        });
        let err = SessionError::timeout(format!(
            "Connection attempt timed out after {}",
            fmt_ms(self.config.open_timeout_ms)
        ));
        self.fail_and_retry(err, ConnectionState::Timeout, fx);
    }

    fn socket_closed(&mut self, code: u16, reason: &str, fx: &mut Vec<Effect>) {
        if !self.state.has_transport() {
            return;
        }
        if self.state == ConnectionState::Connected {
            fx.push(Effect::StopHeartbeat);
            fx.push(Effect::StopProbing);
        }
        let class = classify_close(code);
        info!(code, reason, class = %class, "socket closed");
        match class.error(code, reason) {
            Some(err) if class.schedules_retry() => {
                let landing = if class == CloseClass::Overloaded {
                    ConnectionState::ServerError
                } else {
                    ConnectionState::Disconnected
                };
                self.fail_and_retry(err, landing, fx);
            }
            Some(err) => {
                self.set_error(err);
                self.transition(ConnectionState::ServerError, fx);
            }
            None => {
                self.clear_error();
                self.transition(ConnectionState::Disconnected, fx);
            }
        }
    }

    fn frame_received(&mut self, text: &str, fx: &mut Vec<Effect>) {
        if self.state != ConnectionState::Connected {
            debug!(state = %self.state, "frame ignored outside connected state");
            return;
        }
        let event = match decode_frame(text) {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err.message, "dropping malformed frame");
                self.set_error(err);
                return;
            }
        };
        trace!(kind = event.kind(), "frame received");
        fx.push(Effect::TouchHeartbeat);
        match event {
            InboundEvent::Heartbeat => {}
            InboundEvent::ConnectionStatus { text } => {
                info!(status = %text, "service status");
            }
            InboundEvent::Log { .. } => fx.push(Effect::Deliver(event)),
            InboundEvent::FinalOutput { .. } => {
                match self.query.complete() {
                    Some(query) => info!(query_id = %query.id, "query completed"),
                    None => debug!("final output without a pending query"),
                }
                fx.push(Effect::CancelQueryTimeout);
                fx.push(Effect::Deliver(event));
            }
        }
    }

    fn heartbeat_expired(&mut self, fx: &mut Vec<Effect>) {
        if self.state != ConnectionState::Connected {
            return;
        }
        warn!(
            timeout_ms = self.config.heartbeat_timeout_ms,
            "connection stale, forcing reconnect"
        );
        fx.push(Effect::StopHeartbeat);
        fx.push(Effect::StopProbing);
        fx.push(Effect::CloseTransport {
            code: CLOSE_GOING_AWAY,
        });
        self.set_error(SessionError::timeout(format!(
            "No data from the service for {}",
            fmt_ms(self.config.heartbeat_timeout_ms)
        )));
        self.transition(ConnectionState::Timeout, fx);
        self.transition(ConnectionState::Connecting, fx);
        fx.push(Effect::OpenTransport);
    }

    fn retry_due(&mut self, fx: &mut Vec<Effect>) {
        if !self.retry_scheduled {
            return;
        }
        self.retry_scheduled = false;
        if !matches!(
            self.state,
            ConnectionState::Timeout | ConnectionState::ServerError | ConnectionState::Disconnected
        ) {
            return;
        }
        self.transition(ConnectionState::Reconnecting, fx);
        fx.push(Effect::OpenTransport);
    }

    // ── Helpers ─────────────────────────────────────────────────────

    /// Record `err` and either schedule a retry (landing in `failure_state`)
    /// or give up in `error`.
    fn fail_and_retry(
        &mut self,
        err: SessionError,
        failure_state: ConnectionState,
        fx: &mut Vec<Effect>,
    ) {
        match self.retry.next() {
            RetryDecision::Retry { attempt, delay } => {
                let notice = self.retry.notice(attempt, delay);
                warn!(
                    kind = %err.kind,
                    error = %err.message,
                    attempt = attempt + 1,
                    max_attempts = notice.max_attempts,
                    delay_ms = notice.delay_ms,
                    "scheduling reconnect"
                );
                self.set_error(err.with_retry_notice(notice));
                self.transition(failure_state, fx);
                self.retry_scheduled = true;
                fx.push(Effect::ScheduleRetry { delay });
            }
            RetryDecision::Exhausted => {
                let max = self.retry.max_attempts();
                error!(kind = %err.kind, error = %err.message, max_attempts = max, "giving up");
                self.set_error(SessionError::connection(format!(
                    "Unable to reach the service after {max} attempts ({})",
                    err.message
                )));
                self.transition(ConnectionState::Error, fx);
            }
        }
    }

    fn transition(&mut self, next: ConnectionState, fx: &mut Vec<Effect>) {
        if self.state == next {
            return;
        }
        info!(from = %self.state, to = %next, "connection state changed");
        self.state = next;
        fx.push(Effect::StateChanged(next));
    }

    fn set_error(&mut self, err: SessionError) {
        self.error = Some(err);
        self.advisory_error = false;
    }

    fn clear_error(&mut self) {
        self.error = None;
        self.advisory_error = false;
    }

    fn not_connected(&self) -> SessionError {
        SessionError::connection(format!(
            "Not connected to the service (state: {})",
            self.state
        ))
    }
}

/// `60000` → `"60s"`, `1500` → `"1500ms"`.
fn fmt_ms(ms: u64) -> String {
    if ms % 1000 == 0 {
        format!("{}s", ms / 1000)
    } else {
        format!("{ms}ms")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pcforge_core::ErrorKind;

    fn machine() -> SessionMachine {
        SessionMachine::new(SessionConfig::default())
    }

    fn connected() -> SessionMachine {
        let mut m = machine();
        let _ = m.handle(Event::Connect);
        let _ = m.handle(Event::SocketOpened);
        assert_eq!(m.state(), ConnectionState::Connected);
        m
    }

    fn closed(code: u16) -> Event {
        Event::SocketClosed {
            code,
            reason: String::new(),
        }
    }

    fn scheduled_delay(fx: &[Effect]) -> Option<Duration> {
        fx.iter().find_map(|e| match e {
            Effect::ScheduleRetry { delay } => Some(*delay),
            _ => None,
        })
    }

    fn frame(kind: &str, content: &str) -> Event {
        Event::FrameReceived(
            serde_json::json!({"type": kind, "content": content, "timestamp": "2025-01-01T00:00:00Z"})
                .to_string(),
        )
    }

    // -- connect / disconnect --

    #[test]
    fn connect_opens_transport() {
        let mut m = machine();
        let fx = m.handle(Event::Connect);
        assert_eq!(
            fx,
            vec![
                Effect::StateChanged(ConnectionState::Connecting),
                Effect::OpenTransport
            ]
        );
    }

    #[test]
    fn connect_is_idempotent() {
        let mut m = machine();
        let _ = m.handle(Event::Connect);
        assert!(m.handle(Event::Connect).is_empty());
        let _ = m.handle(Event::SocketOpened);
        assert!(m.handle(Event::Connect).is_empty());
        assert_eq!(m.state(), ConnectionState::Connected);
    }

    #[test]
    fn connect_ignored_while_reconnecting() {
        let mut m = machine();
        let _ = m.handle(Event::Connect);
        let _ = m.handle(Event::OpenTimedOut);
        let _ = m.handle(Event::RetryDue);
        assert_eq!(m.state(), ConnectionState::Reconnecting);
        assert!(m.handle(Event::Connect).is_empty());
    }

    #[test]
    fn socket_open_starts_monitors_and_clears_error() {
        let mut m = machine();
        let _ = m.handle(Event::Connect);
        let _ = m.handle(Event::OpenTimedOut);
        let _ = m.handle(Event::RetryDue);
        let fx = m.handle(Event::SocketOpened);
        assert_eq!(
            fx,
            vec![
                Effect::StateChanged(ConnectionState::Connected),
                Effect::StartHeartbeat,
                Effect::StartProbing
            ]
        );
        assert!(m.error().is_none());
        assert_eq!(m.attempt_count(), 0);
    }

    #[test]
    fn disconnect_cleans_up_everything() {
        let mut m = connected();
        let _ = m.submit("Budget Gaming PC").unwrap();
        let fx = m.handle(Event::Disconnect);
        assert_eq!(
            fx,
            vec![
                Effect::CloseTransport { code: 1000 },
                Effect::StopHeartbeat,
                Effect::StopProbing,
                Effect::CancelQueryTimeout,
                Effect::StateChanged(ConnectionState::Disconnected),
            ]
        );
        assert!(m.pending_query().is_none());
        assert!(m.error().is_none());
    }

    #[test]
    fn disconnect_cancels_scheduled_retry() {
        let mut m = connected();
        let _ = m.handle(closed(1006));
        assert!(m.retry_scheduled());
        let fx = m.handle(Event::Disconnect);
        assert!(fx.contains(&Effect::CancelRetry));
        assert!(!fx.iter().any(|e| matches!(e, Effect::CloseTransport { .. })));
        assert!(!m.retry_scheduled());
        assert!(m.handle(Event::RetryDue).is_empty());
    }

    #[test]
    fn connect_during_retry_wait_cancels_timer() {
        let mut m = connected();
        let _ = m.handle(closed(1006));
        let fx = m.handle(Event::Connect);
        assert_eq!(
            fx,
            vec![
                Effect::CancelRetry,
                Effect::StateChanged(ConnectionState::Connecting),
                Effect::OpenTransport
            ]
        );
    }

    // -- close-code policy --

    #[test]
    fn normal_close_disconnects_without_retry() {
        let mut m = connected();
        let fx = m.handle(closed(1000));
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert!(scheduled_delay(&fx).is_none());
        assert!(m.error().is_none());
    }

    #[test]
    fn policy_violation_is_terminal_server_error() {
        for code in [1008, 1003] {
            let mut m = connected();
            let fx = m.handle(closed(code));
            assert_eq!(m.state(), ConnectionState::ServerError);
            assert!(scheduled_delay(&fx).is_none());
            let err = m.error().unwrap();
            assert_eq!(err.kind, ErrorKind::Server);
            assert!(!err.retryable);
            assert!(m.handle(Event::RetryDue).is_empty());
        }
    }

    #[test]
    fn overloaded_close_retries_as_server_error() {
        let mut m = connected();
        let fx = m.handle(closed(1013));
        assert_eq!(m.state(), ConnectionState::ServerError);
        assert_eq!(scheduled_delay(&fx), Some(Duration::from_millis(1000)));
        let err = m.error().unwrap();
        assert_eq!(err.kind, ErrorKind::Server);
        assert!(err.retryable);
        assert!(err.retry.is_some());
    }

    #[test]
    fn abnormal_close_retries_as_disconnected() {
        let mut m = connected();
        let fx = m.handle(closed(1006));
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert_eq!(
            fx,
            vec![
                Effect::StopHeartbeat,
                Effect::StopProbing,
                Effect::StateChanged(ConnectionState::Disconnected),
                Effect::ScheduleRetry {
                    delay: Duration::from_millis(1000)
                },
            ]
        );
        assert_eq!(m.error().unwrap().kind, ErrorKind::Connection);
    }

    #[test]
    fn close_when_idle_is_ignored() {
        let mut m = machine();
        assert!(m.handle(closed(1006)).is_empty());
        assert_eq!(m.state(), ConnectionState::Disconnected);
    }

    // -- retry policy --

    #[test]
    fn backoff_sequence_then_terminal_error() {
        let mut m = machine();
        let _ = m.handle(Event::Connect);
        let mut delays = Vec::new();
        for _ in 0..5 {
            let fx = m.handle(Event::OpenFailed(SessionError::connection("refused")));
            delays.push(scheduled_delay(&fx).unwrap().as_millis());
            assert_eq!(m.state(), ConnectionState::Disconnected);
            let fx = m.handle(Event::RetryDue);
            assert_eq!(
                fx,
                vec![
                    Effect::StateChanged(ConnectionState::Reconnecting),
                    Effect::OpenTransport
                ]
            );
        }
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16_000]);

        let fx = m.handle(Event::OpenFailed(SessionError::connection("refused")));
        assert!(scheduled_delay(&fx).is_none());
        assert_eq!(m.state(), ConnectionState::Error);
        let err = m.error().unwrap();
        assert_eq!(err.kind, ErrorKind::Connection);
        assert!(err.retryable);
        assert!(err.message.contains("after 5 attempts"));
    }

    #[test]
    fn reconnect_from_error_resets_attempts() {
        let mut m = machine();
        let _ = m.handle(Event::Connect);
        for _ in 0..6 {
            let _ = m.handle(Event::OpenFailed(SessionError::connection("refused")));
            let _ = m.handle(Event::RetryDue);
        }
        assert_eq!(m.state(), ConnectionState::Error);

        let fx = m.handle(Event::Reconnect);
        assert_eq!(
            fx,
            vec![
                Effect::StateChanged(ConnectionState::Connecting),
                Effect::OpenTransport
            ]
        );
        assert_eq!(m.attempt_count(), 0);
        assert!(m.error().is_none());
        let fx = m.handle(Event::OpenFailed(SessionError::connection("refused")));
        assert_eq!(scheduled_delay(&fx), Some(Duration::from_millis(1000)));
    }

    #[test]
    fn retry_error_carries_countdown() {
        let mut m = machine();
        let _ = m.handle(Event::Connect);
        let _ = m.handle(Event::OpenFailed(SessionError::connection("refused")));
        let _ = m.handle(Event::RetryDue);
        let _ = m.handle(Event::OpenFailed(SessionError::connection("refused")));
        let notice = m.error().unwrap().retry.unwrap();
        assert_eq!(notice.attempt, 1);
        assert_eq!(notice.max_attempts, 5);
        assert_eq!(notice.delay_ms, 2000);
    }

    #[test]
    fn non_retryable_open_failure_stops() {
        let mut m = machine();
        let _ = m.handle(Event::Connect);
        let fx = m.handle(Event::OpenFailed(
            SessionError::server("handshake rejected").with_retryable(false),
        ));
        assert_eq!(m.state(), ConnectionState::ServerError);
        assert!(scheduled_delay(&fx).is_none());
        assert!(!m.retry_scheduled());
    }

    #[test]
    fn success_resets_attempts() {
        let mut m = connected();
        let _ = m.handle(closed(1006));
        let _ = m.handle(Event::RetryDue);
        let _ = m.handle(Event::OpenFailed(SessionError::connection("refused")));
        assert_eq!(m.attempt_count(), 2);
        let _ = m.handle(Event::RetryDue);
        let _ = m.handle(Event::SocketOpened);
        assert_eq!(m.attempt_count(), 0);
    }

    // -- open timeout --

    #[test]
    fn open_timeout_schedules_first_retry() {
        let mut m = machine();
        let _ = m.handle(Event::Connect);
        let fx = m.handle(Event::OpenTimedOut);
        assert_eq!(
            fx,
            vec![
                Effect::CloseTransport { code: 1001 },
                Effect::StateChanged(ConnectionState::Timeout),
                Effect::ScheduleRetry {
                    delay: Duration::from_millis(1000)
                },
            ]
        );
        let err = m.error().unwrap();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(err.message.contains("10s"));
    }

    #[test]
    fn late_open_timeout_is_ignored() {
        let mut m = connected();
        assert!(m.handle(Event::OpenTimedOut).is_empty());
    }

    // -- heartbeat --

    #[test]
    fn stale_heartbeat_forces_reconnect() {
        let mut m = connected();
        let fx = m.handle(Event::HeartbeatExpired);
        assert_eq!(
            fx,
            vec![
                Effect::StopHeartbeat,
                Effect::StopProbing,
                Effect::CloseTransport { code: 1001 },
                Effect::StateChanged(ConnectionState::Timeout),
                Effect::StateChanged(ConnectionState::Connecting),
                Effect::OpenTransport,
            ]
        );
        assert_eq!(m.state(), ConnectionState::Connecting);
        assert_eq!(m.error().unwrap().kind, ErrorKind::Timeout);
        assert_eq!(m.attempt_count(), 0);
    }

    #[test]
    fn heartbeat_expiry_outside_connected_is_noop() {
        let mut m = machine();
        assert!(m.handle(Event::HeartbeatExpired).is_empty());
    }

    // -- frames --

    #[test]
    fn heartbeat_frame_only_touches_monitor() {
        let mut m = connected();
        assert_eq!(m.handle(frame("heartbeat", "")), vec![Effect::TouchHeartbeat]);
    }

    #[test]
    fn status_frame_is_not_delivered() {
        let mut m = connected();
        assert_eq!(
            m.handle(frame("connection_status", "ready")),
            vec![Effect::TouchHeartbeat]
        );
    }

    #[test]
    fn log_frame_is_delivered() {
        let mut m = connected();
        let fx = m.handle(Event::FrameReceived(
            r#"{"type":"log","content":"Searching","metadata":{"tool":"Search","input":"RTX 4060"}}"#
                .into(),
        ));
        assert_eq!(fx.len(), 2);
        assert_matches!(&fx[1], Effect::Deliver(InboundEvent::Log { text, metadata: Some(meta) }) => {
            assert_eq!(text, "Searching");
            assert_eq!(meta.tool.as_deref(), Some("Search"));
        });
    }

    #[test]
    fn malformed_frame_sets_parse_error_only() {
        let mut m = connected();
        let _ = m.submit("Budget Gaming PC").unwrap();
        for bad in ["not json", r#"{"type":"nope","content":"x"}"#, r#"{"type":"log","content":1}"#] {
            let fx = m.handle(Event::FrameReceived(bad.into()));
            assert!(fx.is_empty(), "effects for {bad}: {fx:?}");
            assert_eq!(m.state(), ConnectionState::Connected);
            assert!(m.pending_query().is_some());
            assert_eq!(m.error().unwrap().kind, ErrorKind::Parse);
        }
    }

    #[test]
    fn frames_outside_connected_are_ignored() {
        let mut m = machine();
        assert!(m.handle(frame("log", "x")).is_empty());
    }

    // -- queries --

    #[test]
    fn submit_and_final_output() {
        let mut m = connected();
        let (id, fx) = m.submit("  Budget Gaming PC  ").unwrap();
        assert_eq!(
            fx,
            vec![
                Effect::SendFrame(r#"{"query":"Budget Gaming PC"}"#.into()),
                Effect::ArmQueryTimeout
            ]
        );
        assert_eq!(m.pending_query().unwrap().id, id);

        let fx = m.handle(frame("log", "Searching"));
        assert!(matches!(fx[1], Effect::Deliver(InboundEvent::Log { .. })));
        assert!(m.pending_query().is_some());

        let fx = m.handle(frame("final_output", "Ryzen 5 7600 + RTX 4060"));
        assert_eq!(
            fx,
            vec![
                Effect::TouchHeartbeat,
                Effect::CancelQueryTimeout,
                Effect::Deliver(InboundEvent::FinalOutput {
                    text: "Ryzen 5 7600 + RTX 4060".into()
                }),
            ]
        );
        assert!(m.pending_query().is_none());
    }

    #[test]
    fn empty_final_output_still_completes() {
        let mut m = connected();
        let _ = m.submit("x").unwrap();
        let _ = m.handle(frame("final_output", ""));
        assert!(m.pending_query().is_none());
    }

    #[test]
    fn second_submit_is_busy() {
        let mut m = connected();
        let (first, _) = m.submit("first").unwrap();
        let err = m.submit("second").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert!(!err.retryable);
        assert_eq!(m.pending_query().unwrap().id, first);
        assert_eq!(m.pending_query().unwrap().text, "first");
    }

    #[test]
    fn submit_validation_precedes_state_check() {
        let mut m = machine();
        assert_eq!(m.submit("   ").unwrap_err().kind, ErrorKind::Unknown);
        assert_eq!(
            m.submit(&"x".repeat(501)).unwrap_err().kind,
            ErrorKind::Unknown
        );
        assert_eq!(m.submit("ok").unwrap_err().kind, ErrorKind::Connection);
        assert!(m.error().is_none());
    }

    #[test]
    fn query_timeout_keeps_connection() {
        let mut m = connected();
        let _ = m.submit("x").unwrap();
        let fx = m.handle(Event::QueryTimedOut);
        assert!(fx.is_empty());
        assert_eq!(m.state(), ConnectionState::Connected);
        assert!(m.pending_query().is_none());
        let err = m.error().unwrap();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(err.retryable);
        assert!(m.submit("again").is_ok());
    }

    #[test]
    fn stale_query_timeout_is_ignored() {
        let mut m = connected();
        assert!(m.handle(Event::QueryTimedOut).is_empty());
        assert!(m.error().is_none());
    }

    #[test]
    fn cancel_query_is_silent() {
        let mut m = connected();
        let _ = m.submit("x").unwrap();
        assert_eq!(m.handle(Event::CancelQuery), vec![Effect::CancelQueryTimeout]);
        assert!(m.pending_query().is_none());
        assert!(m.error().is_none());
        assert!(m.handle(Event::CancelQuery).is_empty());
    }

    #[test]
    fn normal_close_keeps_pending_query() {
        let mut m = connected();
        let _ = m.submit("x").unwrap();
        let fx = m.handle(closed(1000));
        assert!(!fx.contains(&Effect::CancelQueryTimeout));
        assert!(m.pending_query().is_some());
    }

    #[test]
    fn send_requires_connection() {
        let mut m = machine();
        assert_eq!(m.send("x".into()).unwrap_err().kind, ErrorKind::Connection);
        let mut m = connected();
        assert_eq!(m.send("x".into()).unwrap(), vec![Effect::SendFrame("x".into())]);
    }

    #[test]
    fn write_failure_is_network_error() {
        let mut m = connected();
        let fx = m.handle(Event::WriteFailed("broken pipe".into()));
        assert!(fx.is_empty());
        assert_eq!(m.state(), ConnectionState::Connected);
        assert_eq!(m.error().unwrap().kind, ErrorKind::Network);
    }

    // -- health probe --

    #[test]
    fn probe_failure_is_advisory() {
        let mut m = connected();
        let fx = m.handle(Event::ProbeFailed(SessionError::server("unhealthy")));
        assert!(fx.is_empty());
        assert_eq!(m.state(), ConnectionState::Connected);
        assert_eq!(m.error().unwrap().kind, ErrorKind::Server);

        let _ = m.handle(Event::ProbeSucceeded);
        assert!(m.error().is_none());
    }

    #[test]
    fn probe_success_keeps_newer_error() {
        let mut m = connected();
        let _ = m.handle(Event::ProbeFailed(SessionError::network("probe")));
        let _ = m.handle(Event::FrameReceived("garbage".into()));
        let _ = m.handle(Event::ProbeSucceeded);
        assert_eq!(m.error().unwrap().kind, ErrorKind::Parse);
    }

    #[test]
    fn probe_results_outside_connected_are_ignored() {
        let mut m = machine();
        let _ = m.handle(Event::ProbeFailed(SessionError::network("probe")));
        assert!(m.error().is_none());
    }

    // -- misc --

    #[test]
    fn state_display_matches_serde() {
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Reconnecting,
            ConnectionState::Timeout,
            ConnectionState::Error,
            ConnectionState::ServerError,
        ] {
            assert_eq!(
                serde_json::to_value(state).unwrap(),
                serde_json::Value::String(state.to_string())
            );
        }
    }

    #[test]
    fn fmt_ms_prefers_seconds() {
        assert_eq!(fmt_ms(60_000), "60s");
        assert_eq!(fmt_ms(1500), "1500ms");
    }
}
