//! Client construction errors.
//!
//! Session-level failures are reported as [`pcforge_core::SessionError`];
//! this enum covers setting up the client itself.

use thiserror::Error;

/// Errors building client components.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The HTTP client for health probes could not be built.
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
    /// A configured URL is unusable.
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },
}
