//! Transport seam.
//!
//! A [`Connector`] opens one transport attempt and hands back a [`Link`]:
//! an outbound command channel and an inbound event channel. The session
//! runtime only ever talks to the link, so tests can substitute an
//! in-memory connector built on [`Link::pair`].
//!
//! [`WsConnector`] is the production implementation over
//! `tokio-tungstenite`, with one writer pump and one reader pump per
//! socket.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use pcforge_core::SessionError;
use pcforge_core::constants::CLOSE_ABNORMAL;
use pcforge_core::errors::classify::{classify_handshake_status, classify_transport};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, trace, warn};

/// Close code reported when the peer sends a close frame without a status.
const CLOSE_NO_STATUS: u16 = 1005;

/// Something that happened on an open transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    /// A text frame arrived.
    Frame(String),
    /// The socket closed. Always the last event of a link.
    Closed {
        /// WebSocket close code (1006 when the connection dropped).
        code: u16,
        /// Close reason, possibly empty.
        reason: String,
    },
    /// A write failed. The socket may still be readable.
    Failed(String),
}

/// A request to the transport writer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkCommand {
    /// Send a text frame.
    Send(String),
    /// Send a close frame and stop writing.
    Close {
        /// WebSocket close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

/// The session's end of an open transport.
#[derive(Debug)]
pub struct Link {
    /// Commands for the writer.
    pub outbound: mpsc::UnboundedSender<LinkCommand>,
    /// Events from the reader.
    pub inbound: mpsc::UnboundedReceiver<LinkEvent>,
}

/// The transport's end of a [`Link`], used by connectors and test doubles.
#[derive(Debug)]
pub struct LinkPeer {
    /// Events to deliver to the session.
    pub events: mpsc::UnboundedSender<LinkEvent>,
    /// Commands issued by the session.
    pub commands: mpsc::UnboundedReceiver<LinkCommand>,
}

impl Link {
    /// Create a connected link/peer pair.
    pub fn pair() -> (Self, LinkPeer) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                outbound: cmd_tx,
                inbound: event_rx,
            },
            LinkPeer {
                events: event_tx,
                commands: cmd_rx,
            },
        )
    }
}

/// Opens transport attempts.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a transport to `url`.
    ///
    /// Resolves once the socket is open. Failures are classified into a
    /// [`SessionError`]; the caller enforces the open timeout.
    async fn open(&self, url: &str) -> Result<Link, SessionError>;
}

/// `tokio-tungstenite` connector.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, url: &str) -> Result<Link, SessionError> {
        let (ws, response) = connect_async(url)
            .await
            .map_err(|e| classify_connect_error(&e))?;
        debug!(url, status = %response.status(), "websocket handshake complete");

        let (link, peer) = Link::pair();
        let LinkPeer { events, commands } = peer;
        let (sink, stream) = ws.split();

        drop(tokio::spawn(write_pump(sink, commands, events.clone())));
        drop(tokio::spawn(read_pump(stream, events)));
        Ok(link)
    }
}

/// A refused upgrade is classified on its HTTP status; everything else
/// falls back to the error text.
fn classify_connect_error(err: &WsError) -> SessionError {
    match err {
        WsError::Http(response) => classify_handshake_status(response.status().as_u16()),
        other => classify_transport(&other.to_string()),
    }
}

async fn write_pump<S>(
    mut sink: S,
    mut commands: mpsc::UnboundedReceiver<LinkCommand>,
    events: mpsc::UnboundedSender<LinkEvent>,
) where
    S: futures::Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    while let Some(command) = commands.recv().await {
        match command {
            LinkCommand::Send(text) => {
                trace!(bytes = text.len(), "sending frame");
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    warn!(error = %e, "websocket write failed");
                    let _ = events.send(LinkEvent::Failed(e.to_string()));
                }
            }
            LinkCommand::Close { code, reason } => {
                debug!(code, "sending close frame");
                let frame = CloseFrame {
                    code: CloseCode::from(code),
                    reason: reason.into(),
                };
                let _ = sink.send(Message::Close(Some(frame))).await;
                let _ = sink.close().await;
                return;
            }
        }
    }
    // Link dropped without an explicit close
    let _ = sink.close().await;
}

async fn read_pump<S, E>(mut stream: S, events: mpsc::UnboundedSender<LinkEvent>)
where
    S: futures::Stream<Item = Result<Message, E>> + Unpin,
    E: std::fmt::Display,
{
    let closed = loop {
        let event = match stream.next().await {
            Some(Ok(Message::Text(text))) => LinkEvent::Frame(text.as_str().to_owned()),
            Some(Ok(Message::Binary(bytes))) => {
                LinkEvent::Frame(String::from_utf8_lossy(&bytes).into_owned())
            }
            Some(Ok(Message::Close(frame))) => {
                break match frame {
                    Some(frame) => LinkEvent::Closed {
                        code: u16::from(frame.code),
                        reason: frame.reason.as_str().to_owned(),
                    },
                    None => LinkEvent::Closed {
                        code: CLOSE_NO_STATUS,
                        reason: String::new(),
                    },
                };
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                break LinkEvent::Closed {
                    code: CLOSE_ABNORMAL,
                    reason: e.to_string(),
                };
            }
            None => {
                break LinkEvent::Closed {
                    code: CLOSE_ABNORMAL,
                    reason: "connection dropped".into(),
                };
            }
        };
        if events.send(event).is_err() {
            // Session dropped the link
            return;
        }
    };
    let _ = events.send(closed);
}
