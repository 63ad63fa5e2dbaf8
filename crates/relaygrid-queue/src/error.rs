//! Transport error types.

use thiserror::Error;

/// Result type alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors raised by queue, blob, and attribute collaborators.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("receipt handle {handle} is not current on channel {channel}")]
    InvalidReceipt { channel: String, handle: String },

    #[error("blob not found: {bucket}/{key}")]
    BlobNotFound { bucket: String, key: String },

    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}
