//! In-memory storage backend for testing.

use crate::backend::{KvBackend, KvTransaction, TxnOutcome};
use crate::error::StorageResult;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Pending writes of one transaction layered over a committed keyspace.
///
/// `None` in `pending` marks a deletion.
pub(crate) struct OverlayTxn<'a> {
    base: &'a BTreeMap<String, Vec<u8>>,
    pending: BTreeMap<String, Option<Vec<u8>>>,
}

impl<'a> OverlayTxn<'a> {
    pub(crate) fn new(base: &'a BTreeMap<String, Vec<u8>>) -> Self {
        Self {
            base,
            pending: BTreeMap::new(),
        }
    }

    pub(crate) fn into_pending(self) -> BTreeMap<String, Option<Vec<u8>>> {
        self.pending
    }

    fn contains(&self, key: &str) -> bool {
        match self.pending.get(key) {
            Some(value) => value.is_some(),
            None => self.base.contains_key(key),
        }
    }
}

impl KvTransaction for OverlayTxn<'_> {
    fn get(&mut self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(match self.pending.get(key) {
            Some(value) => value.clone(),
            None => self.base.get(key).cloned(),
        })
    }

    fn put(&mut self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        self.pending.insert(key.to_string(), Some(value));
        Ok(())
    }

    fn delete(&mut self, key: &str) -> StorageResult<bool> {
        let existed = self.contains(key);
        self.pending.insert(key.to_string(), None);
        Ok(existed)
    }
}

/// Applies a committed overlay to the keyspace.
pub(crate) fn apply_pending(
    map: &mut BTreeMap<String, Vec<u8>>,
    pending: BTreeMap<String, Option<Vec<u8>>>,
) {
    for (key, value) in pending {
        match value {
            Some(value) => {
                map.insert(key, value);
            }
            None => {
                map.remove(&key);
            }
        }
    }
}

pub(crate) fn prefixed_keys(map: &BTreeMap<String, Vec<u8>>, prefix: &str) -> Vec<String> {
    map.range(prefix.to_string()..)
        .take_while(|(key, _)| key.starts_with(prefix))
        .map(|(key, _)| key.clone())
        .collect()
}

/// An in-memory storage backend.
///
/// This backend stores all data in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral stores that don't need persistence
///
/// # Thread Safety
///
/// Transactions hold the write lock for the duration of the body, so
/// they are serialized against each other and against autocommit writes.
///
/// # Example
///
/// ```rust
/// use docket_storage::{InMemoryBackend, KvBackend};
///
/// let backend = InMemoryBackend::new();
/// backend.put("k", b"v".to_vec()).unwrap();
/// assert_eq!(backend.len(), 1);
/// assert!(backend.delete("k").unwrap());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    data: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend preloaded with `entries`.
    #[must_use]
    pub fn with_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<u8>)>,
    {
        Self {
            data: RwLock::new(entries.into_iter().collect()),
        }
    }

    /// Returns the number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if no keys are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Returns a copy of the whole keyspace.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        self.data.read().clone()
    }

    /// Removes every key.
    pub fn clear(&self) {
        self.data.write().clear();
    }
}

impl KvBackend for InMemoryBackend {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        self.data.write().insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        Ok(self.data.write().remove(key).is_some())
    }

    fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(prefixed_keys(&self.data.read(), prefix))
    }

    fn transaction(
        &self,
        body: &mut dyn FnMut(&mut dyn KvTransaction) -> TxnOutcome,
    ) -> StorageResult<()> {
        let mut data = self.data.write();
        let (outcome, pending) = {
            let mut txn = OverlayTxn::new(&data);
            let outcome = body(&mut txn);
            (outcome, txn.into_pending())
        };

        if outcome == TxnOutcome::Commit {
            apply_pending(&mut data, pending);
        }
        Ok(())
    }
}
