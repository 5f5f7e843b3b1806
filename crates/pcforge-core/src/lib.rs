//! # pcforge-core
//!
//! Foundation types shared by the pcforge client crates:
//!
//! - **Errors**: [`SessionError`] with a closed [`ErrorKind`] taxonomy and a
//!   retryability flag, plus the pure classifiers in [`errors::classify`]
//! - **Wire codec**: [`InboundEvent`] decoding and the outbound query frame
//! - **Retry policy**: exponential backoff and the attempt ceiling
//! - **IDs**: [`SessionId`] and [`QueryId`] for correlating log lines
//! - **Logging**: `tracing` subscriber initialization

#![deny(unsafe_code)]

pub mod codec;
pub mod constants;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod retry;

pub use codec::{InboundEvent, LogMetadata, OutboundFrame, decode_frame, encode_query};
pub use errors::{ErrorKind, RetryNotice, SessionError};
pub use ids::{QueryId, SessionId};
pub use logging::{LogFormat, init_subscriber};
pub use retry::{RetryConfig, RetryDecision, RetryState, calculate_backoff_delay};
