//! Backend capability contract.

use crate::error::StorageResult;

/// Decision returned by a transaction body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnOutcome {
    /// Apply every write made through the transaction.
    Commit,
    /// Discard every write made through the transaction.
    Abort,
}

/// A transactional view over a backend's keyspace.
///
/// Reads observe the transaction's own pending writes. Nothing written
/// through this view is visible to other callers until the body returns
/// [`TxnOutcome::Commit`] and the backend applies it.
pub trait KvTransaction {
    /// Reads the value stored under `key`.
    fn get(&mut self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn put(&mut self, key: &str, value: Vec<u8>) -> StorageResult<()>;

    /// Removes `key`. Returns whether it existed.
    fn delete(&mut self, key: &str) -> StorageResult<bool>;
}

/// A string-keyed, transactional byte store.
///
/// # Invariants
///
/// - Each autocommit `put`/`delete` is atomic on its own
/// - A `transaction` body runs isolated from every other transaction and
///   autocommit write; its writes are applied all-or-nothing
/// - If `transaction` returns an error, none of the body's writes were
///   applied
/// - Backends must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
pub trait KvBackend: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Stores `value` under `key` in its own transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the write cannot be made durable.
    fn put(&self, key: &str, value: Vec<u8>) -> StorageResult<()>;

    /// Removes `key` in its own transaction. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the write cannot be made durable.
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Returns every key starting with `prefix`, in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Runs `body` inside a serializable transaction.
    ///
    /// The body is invoked at most once per call. Its writes are applied
    /// only if it returns [`TxnOutcome::Commit`] and this method returns
    /// `Ok`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend refuses the transaction or cannot
    /// make the commit durable. Nothing is applied in that case.
    fn transaction(
        &self,
        body: &mut dyn FnMut(&mut dyn KvTransaction) -> TxnOutcome,
    ) -> StorageResult<()>;
}
