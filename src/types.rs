//! Error types for pool operations

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PoolError>;

/// Error types for pool operations
#[derive(Debug, Error)]
pub enum PoolError {
    /// The resolver does not know the requested network group
    #[error("unknown network group: {0}")]
    UnknownNetwork(String),

    /// The client factory failed to build a client/transport pair.
    /// No instance is registered on failure, so the next call retries clean.
    #[error("client construction failed: {0}")]
    Construction(String),

    /// The transport's head ticker failed inside the poller.
    /// Never surfaces to callers; contained to the owning instance.
    #[error("head ticker failed: {0}")]
    Ticker(String),

    /// The pool has been shut down
    #[error("pool is shut down")]
    Closed,
}
