//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The commit log is corrupted.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// A log record could not be encoded or decoded.
    #[error("record codec error: {0}")]
    Codec(String),

    /// Another process holds the store open.
    #[error("storage locked: another process has exclusive access")]
    Locked,

    /// The backend rejected a transaction because of a conflicting writer.
    ///
    /// This is the transient failure class; callers may retry.
    #[error("transaction conflict: {0}")]
    Conflict(String),

    /// A failed append could not be undone; the backend refuses writes.
    #[error("commit log {0} is poisoned by a failed append")]
    Poisoned(String),
}

impl StorageError {
    /// Returns true if retrying the failed operation may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
