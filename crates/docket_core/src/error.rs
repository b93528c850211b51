//! Error types for docket core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in docket core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error, propagated unchanged.
    #[error("storage error: {0}")]
    Storage(#[from] docket_storage::StorageError),

    /// A document could not be encoded or decoded.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// Every compare-and-swap attempt on a key lost to another writer.
    #[error("concurrent modification of {key} after {attempts} attempts")]
    ConcurrentModification {
        /// The contended key.
        key: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// A page operation found no index root where one must exist.
    #[error("index root missing: {key}")]
    IndexRootMissing {
        /// The root key.
        key: String,
    },

    /// Operation not permitted.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a concurrent modification error.
    pub fn concurrent_modification(key: impl Into<String>, attempts: u32) -> Self {
        Self::ConcurrentModification {
            key: key.into(),
            attempts,
        }
    }

    /// Creates an index root missing error.
    pub fn index_root_missing(key: impl Into<String>) -> Self {
        Self::IndexRootMissing { key: key.into() }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true for backend failures that a bounded retry may clear.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_transient())
    }
}
