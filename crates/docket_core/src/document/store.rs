//! Document store implementation.

use crate::codec::{decode, encode};
use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use docket_storage::{KvBackend, KvTransaction, TxnOutcome};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A payload together with its write counter.
///
/// `version` starts at 1 on the first write and increases by exactly one
/// on every successful write to the key. A missing key behaves as
/// version 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document<T> {
    /// Number of successful writes to the key.
    pub version: u64,
    /// The stored payload.
    pub data: T,
}

impl<T> Document<T> {
    /// Creates a document.
    pub fn new(version: u64, data: T) -> Self {
        Self { version, data }
    }
}

/// Result of a compare-and-swap write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CasOutcome {
    /// Whether the write was applied.
    pub ok: bool,
    /// The new version on success, the current version on mismatch.
    pub version: u64,
}

/// Typed access to a backend transaction.
pub struct DocTransaction<'a> {
    inner: &'a mut dyn KvTransaction,
}

impl DocTransaction<'_> {
    /// Reads the document under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or the document is not a `T`.
    pub fn get<T: DeserializeOwned>(&mut self, key: &str) -> CoreResult<Option<Document<T>>> {
        match self.inner.get(key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Returns the current version of `key`, 0 if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or the value is not a document.
    pub fn version(&mut self, key: &str) -> CoreResult<u64> {
        Ok(self
            .get::<IgnoredAny>(key)?
            .map_or(0, |doc| doc.version))
    }

    /// Writes `doc` under `key` as-is.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or `doc` cannot be encoded.
    pub fn put<T: Serialize>(&mut self, key: &str, doc: &Document<T>) -> CoreResult<()> {
        self.inner.put(key, encode(doc)?)?;
        Ok(())
    }

    /// Removes `key`. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub fn delete(&mut self, key: &str) -> CoreResult<bool> {
        Ok(self.inner.delete(key)?)
    }
}

/// Versioned documents over one shared keyspace.
///
/// `DocumentStore` is a cheap handle: clones share the backend and the
/// configuration. [`DocumentStore::cas_put`] is the single mutation
/// primitive the entity and index layers build on.
///
/// # Example
///
/// ```rust
/// use docket_core::DocumentStore;
/// use docket_storage::InMemoryBackend;
/// use std::sync::Arc;
///
/// let store = DocumentStore::new(Arc::new(InMemoryBackend::new()));
///
/// let first = store.cas_put("counter", 0, &1u32).unwrap();
/// assert!(first.ok);
/// assert_eq!(first.version, 1);
///
/// let stale = store.cas_put("counter", 0, &5u32).unwrap();
/// assert!(!stale.ok);
/// assert_eq!(stale.version, 1);
/// ```
#[derive(Clone)]
pub struct DocumentStore {
    backend: Arc<dyn KvBackend>,
    config: Arc<StoreConfig>,
}

impl fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DocumentStore {
    /// Creates a store over `backend` with the default configuration.
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self::with_config(backend, StoreConfig::default())
    }

    /// Creates a store over `backend` with `config`.
    pub fn with_config(backend: Arc<dyn KvBackend>, config: StoreConfig) -> Self {
        Self {
            backend,
            config: Arc::new(config),
        }
    }

    /// Returns the store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the underlying backend.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn KvBackend> {
        &self.backend
    }

    /// Reads the document under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or the document is not a `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> CoreResult<Option<Document<T>>> {
        match self.backend.get(key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Returns the current version of `key`, 0 if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or the value is not a document.
    pub fn version(&self, key: &str) -> CoreResult<u64> {
        Ok(self.get::<IgnoredAny>(key)?.map_or(0, |doc| doc.version))
    }

    /// Writes `doc` under `key` unconditionally.
    ///
    /// This bypasses version checking; mutation paths use
    /// [`DocumentStore::cas_put`].
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or `doc` cannot be encoded.
    pub fn put<T: Serialize>(&self, key: &str, doc: &Document<T>) -> CoreResult<()> {
        self.backend.put(key, encode(doc)?)?;
        Ok(())
    }

    /// Removes `key`. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub fn delete(&self, key: &str) -> CoreResult<bool> {
        Ok(self.backend.delete(key)?)
    }

    /// Returns whether `key` holds a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub fn has(&self, key: &str) -> CoreResult<bool> {
        Ok(self.backend.get(key)?.is_some())
    }

    /// Returns every key starting with `prefix`, in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub fn keys_with_prefix(&self, prefix: &str) -> CoreResult<Vec<String>> {
        Ok(self.backend.keys_with_prefix(prefix)?)
    }

    /// Writes `payload` as version `expected + 1` if `key` is currently at
    /// version `expected`.
    ///
    /// Runs as one backend transaction. An absent key is at version 0. On
    /// mismatch nothing is written and the current version is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or `payload` cannot be encoded.
    /// A version mismatch is not an error.
    pub fn cas_put<T: Serialize>(
        &self,
        key: &str,
        expected: u64,
        payload: &T,
    ) -> CoreResult<CasOutcome> {
        self.transaction(|txn| {
            let current = txn.version(key)?;
            if current != expected {
                return Ok(CasOutcome {
                    ok: false,
                    version: current,
                });
            }

            let next = current + 1;
            txn.put(
                key,
                &Document {
                    version: next,
                    data: payload,
                },
            )?;
            Ok(CasOutcome {
                ok: true,
                version: next,
            })
        })
    }

    /// Runs `f` inside one backend transaction.
    ///
    /// `Ok` commits every write made through the [`DocTransaction`];
    /// `Err` discards them and is returned to the caller.
    ///
    /// # Errors
    ///
    /// Returns the body's error, or a storage error if the backend refuses
    /// or fails the transaction.
    pub fn transaction<R, F>(&self, f: F) -> CoreResult<R>
    where
        F: FnOnce(&mut DocTransaction<'_>) -> CoreResult<R>,
    {
        let mut body = Some(f);
        let mut result: Option<CoreResult<R>> = None;

        self.backend.transaction(&mut |txn| {
            let Some(body) = body.take() else {
                return TxnOutcome::Abort;
            };
            let mut doc_txn = DocTransaction { inner: txn };
            let outcome = body(&mut doc_txn);
            let decision = if outcome.is_ok() {
                TxnOutcome::Commit
            } else {
                TxnOutcome::Abort
            };
            result = Some(outcome);
            decision
        })?;

        result.unwrap_or_else(|| {
            Err(CoreError::invalid_operation(
                "backend completed a transaction without running its body",
            ))
        })
    }
}
