//! Crate-wide error types
//!
//! Wire-level parse failures stay inside the protocol front-ends; everything
//! that crosses the group boundary is one of these.

use thiserror::Error;

/// Convenience result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for group and remux operations
#[derive(Debug, Error)]
pub enum Error {
    /// URL failed to parse or is missing required parts
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Peer sent something the protocol does not allow
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Stream already has an active publisher
    #[error("stream already has a publisher: {0}")]
    Conflict(String),

    /// Relay pull from the upstream server failed
    #[error("upstream pull failed: {0}")]
    UpstreamFailure(String),

    /// Subscriber could not keep up and was evicted
    #[error("subscriber evicted: output queue overflow")]
    SlowConsumer,

    /// Filesystem operation failed (HLS segments, FLV recording)
    #[error("file io: {0}")]
    FileIo(#[from] std::io::Error),

    /// Operation did not complete within its deadline
    #[error("operation timed out")]
    Timeout,

    /// Group or server is shutting down
    #[error("shutting down")]
    Shutdown,
}

impl Error {
    /// Whether the error terminates only the offending session, leaving the
    /// group intact.
    pub fn is_session_local(&self) -> bool {
        matches!(
            self,
            Error::ProtocolViolation(_) | Error::SlowConsumer | Error::Timeout
        )
    }
}
