//! Error types for store operations.

use std::io;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An I/O error from the disk tier.
    #[error("disk I/O error")]
    Io(#[from] io::Error),

    /// The store was built with an invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
