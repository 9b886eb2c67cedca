//! Error types for peerlink core

use thiserror::Error;

/// Result type alias for peerlink core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in peerlink core operations
#[derive(Debug, Error)]
pub enum Error {
    /// Signaling store operation failed
    #[error("Store error: {0}")]
    Store(String),

    /// Document or collection path is malformed
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Local identity could not be loaded or persisted
    #[error("Identity error: {0}")]
    Identity(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
