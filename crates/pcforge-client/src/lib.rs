//! # pcforge-client
//!
//! Client-side connection and session manager for the build-assistant
//! service.
//!
//! - [`machine`]: pure connection state machine (`event → effects`)
//! - [`session`]: single-writer runtime actor and the cloneable
//!   [`SessionHandle`]
//! - [`transport`]: the [`Connector`] seam and its `tokio-tungstenite`
//!   implementation
//! - [`heartbeat`]: inbound-silence deadline
//! - [`health`]: out-of-band HTTP liveness probe
//! - [`query`]: the single in-flight query
//!
//! ```no_run
//! use std::sync::Arc;
//! use pcforge_client::{HttpHealthProbe, Session, SessionConfig, WsConnector};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SessionConfig::default();
//! let probe = HttpHealthProbe::new(&config.health_url, config.probe_timeout())?;
//! let (session, mut events) = Session::spawn(config, Arc::new(WsConnector), Arc::new(probe));
//! session.connect();
//! let _ = session.submit("Budget Gaming PC").await?;
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod heartbeat;
pub mod machine;
pub mod query;
pub mod session;
pub mod transport;

pub use config::SessionConfig;
pub use errors::ClientError;
pub use health::{HealthProbe, HttpHealthProbe};
pub use heartbeat::HeartbeatMonitor;
pub use machine::{ConnectionState, Effect, Event, SessionMachine, SessionStatus};
pub use query::{PendingQuery, QueryTracker};
pub use session::{Session, SessionHandle};
pub use transport::{Connector, Link, LinkCommand, LinkEvent, LinkPeer, WsConnector};
