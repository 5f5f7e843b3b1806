//! Session runtime.
//!
//! One task per session owns the [`SessionMachine`], the transport link and
//! every deadline (open timeout, heartbeat, probe interval, retry delay,
//! query timeout). Handle commands, link events, probe results and timers
//! are all processed in a single `tokio::select!` loop, so there is exactly
//! one writer for connection state, retry state and the pending query.
//!
//! Transport attempts and probes carry an epoch. Results from an attempt or
//! probe that has since been abandoned are dropped.

use std::collections::VecDeque;
use std::future;
use std::sync::Arc;

use pcforge_core::constants::CLOSE_ABNORMAL;
use pcforge_core::{InboundEvent, QueryId, SessionError, SessionId};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, trace};

use crate::config::SessionConfig;
use crate::health::HealthProbe;
use crate::heartbeat::HeartbeatMonitor;
use crate::machine::{ConnectionState, Effect, Event, SessionMachine, SessionStatus};
use crate::transport::{Connector, Link, LinkCommand, LinkEvent};

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

enum Command {
    Connect,
    Disconnect,
    Reconnect,
    CancelQuery,
    Send {
        payload: String,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Submit {
        text: String,
        reply: oneshot::Sender<Result<QueryId, SessionError>>,
    },
}

/// Entry point for starting sessions.
pub struct Session;

impl Session {
    /// Start a session task.
    ///
    /// Returns the handle and the sink receiving `log` and `final_output`
    /// events. The session starts `disconnected`; call
    /// [`SessionHandle::connect`]. Must be called inside a Tokio runtime.
    pub fn spawn(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        probe: Arc<dyn HealthProbe>,
    ) -> (SessionHandle, mpsc::UnboundedReceiver<InboundEvent>) {
        let id = SessionId::new();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (sink_tx, sink_rx) = mpsc::unbounded_channel();
        let machine = SessionMachine::new(config.clone());
        let (status_tx, status_rx) = watch::channel(machine.status());
        let shutdown = CancellationToken::new();

        let runtime = SessionRuntime {
            heartbeat: HeartbeatMonitor::new(config.heartbeat_timeout()),
            config,
            machine,
            connector,
            probe,
            sink: sink_tx,
            status: status_tx,
            internal_tx,
            epoch: 0,
            link: None,
            open_task: None,
            open_deadline: None,
            probe_epoch: 0,
            probe_task: None,
            probe_deadline: None,
            retry_deadline: None,
            query_deadline: None,
        };
        let span = info_span!("session", session_id = %id);
        drop(tokio::spawn(
            runtime
                .run(cmd_rx, internal_rx, shutdown.clone())
                .instrument(span),
        ));

        let handle = SessionHandle {
            id,
            commands: cmd_tx,
            status: status_rx,
            shutdown,
        };
        (handle, sink_rx)
    }
}

/// Cloneable handle to a running session.
///
/// Dropping every handle shuts the session down.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    id: SessionId,
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<SessionStatus>,
    shutdown: CancellationToken,
}

impl SessionHandle {
    /// Session ID used in log output.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Open the connection. No-op while connecting, connected or
    /// reconnecting.
    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    /// Close cleanly, drop any pending query and stop retrying.
    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    /// Reset the retry counter and error, then connect.
    pub fn reconnect(&self) {
        self.command(Command::Reconnect);
    }

    /// Drop the pending query without an error.
    pub fn cancel_query(&self) {
        self.command(Command::CancelQuery);
    }

    /// Send a raw text frame. Fails unless connected.
    pub async fn send(&self, payload: impl Into<String>) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Send {
            payload: payload.into(),
            reply,
        });
        rx.await.unwrap_or_else(|_| Err(shut_down()))
    }

    /// Submit a query and return its ID once accepted.
    pub async fn submit(&self, text: impl Into<String>) -> Result<QueryId, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Submit {
            text: text.into(),
            reply,
        });
        rx.await.unwrap_or_else(|_| Err(shut_down()))
    }

    /// Current state and error.
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Watch state and error changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Tear the session down. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Resolves once the session task has exited.
    pub async fn closed(&self) {
        let mut status = self.status.clone();
        while status.changed().await.is_ok() {}
    }

    fn command(&self, command: Command) {
        // Fails only after shutdown; oneshot replies then resolve to an error
        let _ = self.commands.send(command);
    }
}

fn shut_down() -> SessionError {
    SessionError::connection("Session has shut down").with_retryable(false)
}

// ─────────────────────────────────────────────────────────────────────────────
// Runtime
// ─────────────────────────────────────────────────────────────────────────────

enum Internal {
    Opened {
        epoch: u64,
        result: Result<Link, SessionError>,
    },
    Probed {
        epoch: u64,
        result: Result<(), SessionError>,
    },
}

struct SessionRuntime {
    config: SessionConfig,
    machine: SessionMachine,
    connector: Arc<dyn Connector>,
    probe: Arc<dyn HealthProbe>,
    sink: mpsc::UnboundedSender<InboundEvent>,
    status: watch::Sender<SessionStatus>,
    internal_tx: mpsc::UnboundedSender<Internal>,

    epoch: u64,
    link: Option<Link>,
    open_task: Option<JoinHandle<()>>,
    open_deadline: Option<Instant>,
    heartbeat: HeartbeatMonitor,
    probe_epoch: u64,
    probe_task: Option<JoinHandle<()>>,
    probe_deadline: Option<Instant>,
    retry_deadline: Option<Instant>,
    query_deadline: Option<Instant>,
}

impl SessionRuntime {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
        shutdown: CancellationToken,
    ) {
        debug!(url = %self.config.url, "session started");
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },
                Some(message) = internal.recv() => self.on_internal(message),
                event = next_link_event(&mut self.link) => {
                    let event = event.unwrap_or_else(|| LinkEvent::Closed {
                        code: CLOSE_ABNORMAL,
                        reason: "transport ended".into(),
                    });
                    self.on_link_event(event);
                }
                () = sleep_until_opt(self.open_deadline) => {
                    self.open_deadline = None;
                    self.step(Event::OpenTimedOut);
                }
                () = sleep_until_opt(self.heartbeat.deadline()) => {
                    if self.heartbeat.is_stale(Instant::now()) {
                        self.heartbeat.stop();
                        self.step(Event::HeartbeatExpired);
                    }
                }
                () = sleep_until_opt(self.probe_deadline) => self.start_probe(),
                () = sleep_until_opt(self.retry_deadline) => {
                    self.retry_deadline = None;
                    self.step(Event::RetryDue);
                }
                () = sleep_until_opt(self.query_deadline) => {
                    self.query_deadline = None;
                    self.step(Event::QueryTimedOut);
                }
            }
        }
        self.teardown();
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.step(Event::Connect),
            Command::Disconnect => self.step(Event::Disconnect),
            Command::Reconnect => self.step(Event::Reconnect),
            Command::CancelQuery => self.step(Event::CancelQuery),
            Command::Send { payload, reply } => {
                let result = match self.machine.send(payload) {
                    Ok(effects) => {
                        self.execute(effects);
                        Ok(())
                    }
                    Err(err) => Err(err),
                };
                let _ = reply.send(result);
            }
            Command::Submit { text, reply } => {
                let result = match self.machine.submit(&text) {
                    Ok((id, effects)) => {
                        self.execute(effects);
                        Ok(id)
                    }
                    Err(err) => {
                        debug!(kind = %err.kind, error = %err.message, "query rejected");
                        Err(err)
                    }
                };
                let _ = reply.send(result);
            }
        }
    }

    fn on_internal(&mut self, message: Internal) {
        match message {
            Internal::Opened { epoch, result } => {
                if epoch != self.epoch {
                    debug!(epoch, current = self.epoch, "discarding stale transport attempt");
                    return;
                }
                self.open_task = None;
                self.open_deadline = None;
                match result {
                    Ok(link) => {
                        self.link = Some(link);
                        self.step(Event::SocketOpened);
                    }
                    Err(err) => self.step(Event::OpenFailed(err)),
                }
            }
            Internal::Probed { epoch, result } => {
                if epoch != self.probe_epoch {
                    trace!(epoch, "discarding stale probe result");
                    return;
                }
                self.probe_task = None;
                match result {
                    Ok(()) => self.step(Event::ProbeSucceeded),
                    Err(err) => self.step(Event::ProbeFailed(err)),
                }
            }
        }
    }

    fn on_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Frame(text) => {
                trace!(bytes = text.len(), "frame");
                self.step(Event::FrameReceived(text));
            }
            LinkEvent::Closed { code, reason } => {
                self.link = None;
                self.step(Event::SocketClosed { code, reason });
            }
            LinkEvent::Failed(detail) => self.step(Event::WriteFailed(detail)),
        }
    }

    // ── Effects ─────────────────────────────────────────────────────

    fn step(&mut self, event: Event) {
        let effects = self.machine.handle(event);
        self.execute(effects);
    }

    /// Carry out effects, feeding any follow-up events back through the
    /// machine, then publish the final status.
    fn execute(&mut self, effects: Vec<Effect>) {
        let mut follow_ups = VecDeque::new();
        for effect in effects {
            follow_ups.extend(self.apply(effect));
        }
        while let Some(event) = follow_ups.pop_front() {
            for effect in self.machine.handle(event) {
                follow_ups.extend(self.apply(effect));
            }
        }
        self.publish(self.machine.status());
    }

    fn apply(&mut self, effect: Effect) -> Option<Event> {
        let now = Instant::now();
        match effect {
            Effect::OpenTransport => self.open_transport(now),
            Effect::CloseTransport { code } => self.close_transport(code),
            Effect::StartHeartbeat => self.heartbeat.start(now),
            Effect::TouchHeartbeat => self.heartbeat.record(now),
            Effect::StopHeartbeat => self.heartbeat.stop(),
            Effect::StartProbing => {
                self.probe_epoch += 1;
                self.probe_deadline = Some(now);
            }
            Effect::StopProbing => {
                self.probe_epoch += 1;
                self.probe_deadline = None;
                if let Some(task) = self.probe_task.take() {
                    task.abort();
                }
            }
            Effect::ScheduleRetry { delay } => self.retry_deadline = Some(now + delay),
            Effect::CancelRetry => self.retry_deadline = None,
            Effect::SendFrame(text) => return self.send_frame(text),
            Effect::ArmQueryTimeout => {
                self.query_deadline = Some(now + self.config.query_timeout());
            }
            Effect::CancelQueryTimeout => self.query_deadline = None,
            Effect::Deliver(event) => {
                // Receiver gone means nobody is rendering; keep running
                let _ = self.sink.send(event);
            }
            Effect::StateChanged(state) => {
                let error = self.machine.error().cloned();
                self.publish(SessionStatus { state, error });
            }
        }
        None
    }

    fn open_transport(&mut self, now: Instant) {
        self.abandon_transport();
        self.epoch += 1;
        let epoch = self.epoch;
        self.open_deadline = Some(now + self.config.open_timeout());

        let connector = Arc::clone(&self.connector);
        let url = self.config.url.clone();
        let tx = self.internal_tx.clone();
        debug!(epoch, url = %url, "opening transport");
        self.open_task = Some(tokio::spawn(
            async move {
                let result = connector.open(&url).await;
                let _ = tx.send(Internal::Opened { epoch, result });
            }
            .in_current_span(),
        ));
    }

    fn close_transport(&mut self, code: u16) {
        if let Some(link) = self.link.take() {
            debug!(code, epoch = self.epoch, "closing transport");
            let _ = link.outbound.send(LinkCommand::Close {
                code,
                reason: String::new(),
            });
        }
        self.abandon_transport();
        self.epoch += 1;
    }

    /// Drop the link and any attempt in flight.
    fn abandon_transport(&mut self) {
        self.link = None;
        self.open_deadline = None;
        if let Some(task) = self.open_task.take() {
            task.abort();
        }
    }

    fn send_frame(&mut self, text: String) -> Option<Event> {
        let Some(link) = &self.link else {
            return Some(Event::WriteFailed("no open transport".into()));
        };
        trace!(bytes = text.len(), "queueing frame");
        match link.outbound.send(LinkCommand::Send(text)) {
            Ok(()) => None,
            Err(_) => Some(Event::WriteFailed("transport writer has stopped".into())),
        }
    }

    fn start_probe(&mut self) {
        let now = Instant::now();
        self.probe_deadline = Some(now + self.config.probe_interval());
        if let Some(task) = self.probe_task.take() {
            task.abort();
        }

        let epoch = self.probe_epoch;
        let probe = Arc::clone(&self.probe);
        let timeout = self.config.probe_timeout();
        let tx = self.internal_tx.clone();
        trace!(epoch, "probing service health");
        self.probe_task = Some(tokio::spawn(
            async move {
                let result = tokio::time::timeout(timeout, probe.check())
                    .await
                    .unwrap_or_else(|_| Err(SessionError::network("Health check timed out")));
                let _ = tx.send(Internal::Probed { epoch, result });
            }
            .in_current_span(),
        ));
    }

    fn publish(&self, status: SessionStatus) {
        let _ = self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    fn teardown(&mut self) {
        self.step(Event::Disconnect);
        if let Some(task) = self.probe_task.take() {
            task.abort();
        }
        self.abandon_transport();
        info!(state = %ConnectionState::Disconnected, "session shut down");
    }
}

async fn next_link_event(link: &mut Option<Link>) -> Option<LinkEvent> {
    match link {
        Some(link) => link.inbound.recv().await,
        None => future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
