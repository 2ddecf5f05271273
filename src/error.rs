//! Crate-wide error type.
//!
//! Every fallible public operation returns [`Result<T>`], an alias over
//! [`EngramError`]. Variants map 1:1 onto the error taxonomy: integrity and
//! validation failures are surfaced to the caller unchanged, transient I/O
//! errors are not retried automatically, and the serial write queue /
//! compaction scheduler log their own failures rather than propagate them.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngramError>;

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum EngramError {
    /// Operation attempted before the owning store finished initialization.
    #[error("not initialized: {0}")]
    NotInitialized(String),

    /// A vector's length did not match the configured embedding dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Chunk bytes did not hash to their key, or a Merkle proof failed to verify.
    #[error("integrity error: {0}")]
    IntegrityError(String),

    /// A synapse referenced a neuron id that does not exist.
    #[error("dangling reference: {0}")]
    DanglingReference(String),

    /// Caller input failed a declared constraint (length, range, shape).
    #[error("validation error: {0}")]
    ValidationError(String),

    /// The embedding provider did not respond within its deadline.
    #[error("embedding timeout after {0:?}")]
    EmbeddingTimeout(std::time::Duration),

    /// The embedding provider failed for a reason other than timeout.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// The underlying key-value store or filesystem failed.
    #[error("storage error: {0}")]
    StorageError(String),

    /// A fire-and-forget task was rejected by the serial write queue.
    #[error("task dropped by serial queue: {0}")]
    QueueDropped(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<sled::Error> for EngramError {
    fn from(e: sled::Error) -> Self {
        EngramError::StorageError(e.to_string())
    }
}

impl EngramError {
    pub fn integrity(msg: impl Into<String>) -> Self {
        EngramError::IntegrityError(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        EngramError::ValidationError(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        EngramError::StorageError(msg.into())
    }

    pub fn dangling(msg: impl Into<String>) -> Self {
        EngramError::DanglingReference(msg.into())
    }
}
