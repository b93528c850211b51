//! Entity handle with optimistic concurrency.

use crate::codec::merge_fields;
use crate::document::DocumentStore;
use crate::entity::kind::EntityKind;
use crate::error::{CoreError, CoreResult};
use serde::Serialize;
use std::fmt;

/// Rewrites a loaded state so that it agrees with the handle's id.
pub(crate) type Normalizer<S> = fn(&str, &mut S);

/// A typed handle on the document `<K::ENTITY_NAME>:<id>`.
///
/// The handle caches the last `(version, state)` it observed. The cache is
/// never authoritative: every mutation path re-reads the document before
/// its compare-and-swap.
///
/// # Retry
///
/// [`Entity::save`], [`Entity::mutate`] and [`Entity::patch`] make up to
/// [`StoreConfig::entity_attempts`](crate::StoreConfig) attempts and then
/// fail with [`CoreError::ConcurrentModification`].
pub struct Entity<K: EntityKind> {
    store: DocumentStore,
    id: String,
    key: String,
    version: u64,
    state: Option<K::State>,
    normalize: Option<Normalizer<K::State>>,
}

impl<K: EntityKind> fmt::Debug for Entity<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("key", &self.key)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl<K: EntityKind> Entity<K> {
    /// Creates a handle for `id`. Nothing is read or written.
    pub fn new(store: DocumentStore, id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            key: K::key_for(&id),
            store,
            id,
            version: 0,
            state: None,
            normalize: None,
        }
    }

    pub(crate) fn with_normalizer(mut self, normalize: Normalizer<K::State>) -> Self {
        self.normalize = Some(normalize);
        self
    }

    /// Returns the entity id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the document key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Version observed by the last load or write (0 if none).
    #[must_use]
    pub fn cached_version(&self) -> u64 {
        self.version
    }

    /// State observed by the last load or write.
    #[must_use]
    pub fn cached_state(&self) -> Option<&K::State> {
        self.state.as_ref()
    }

    /// Loads the current state.
    ///
    /// An id that was never saved yields [`EntityKind::initial_state`] at
    /// version 0 without writing anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be read or decoded.
    pub fn get_state(&mut self) -> CoreResult<K::State> {
        self.load()
    }

    /// Re-reads the document into the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be read or decoded.
    pub fn refresh(&mut self) -> CoreResult<()> {
        self.load().map(|_| ())
    }

    /// Replaces the state with `next`.
    ///
    /// Each attempt reads the current version and then compare-and-swaps
    /// against it, so `save` only fails when another writer lands between
    /// the two on every attempt. The stored state is never decoded, so a
    /// document in an older shape is replaced too. If `next` was derived
    /// from an earlier read,
    /// concurrent updates are overwritten; use [`Entity::mutate`] for
    /// read-modify-write.
    ///
    /// # Errors
    ///
    /// Returns `ConcurrentModification` when the attempt budget runs out,
    /// or a storage/codec error.
    pub fn save(&mut self, next: K::State) -> CoreResult<()> {
        let mut next = next;
        self.apply_normalizer(&mut next);
        let attempts = self.store.config().effective_entity_attempts();

        for attempt in 1..=attempts {
            self.version = self.store.version(&self.key)?;
            let outcome = self.store.cas_put(&self.key, self.version, &next)?;
            if outcome.ok {
                self.version = outcome.version;
                self.state = Some(next);
                return Ok(());
            }
            tracing::debug!(
                key = %self.key,
                attempt,
                observed = outcome.version,
                "save lost compare-and-swap"
            );
        }

        Err(self.exhausted(attempts))
    }

    /// Applies `updater` to the current state and writes the result.
    ///
    /// On contention the document is re-read and `updater` runs again on
    /// the fresh state, so it may be called up to the attempt budget.
    ///
    /// # Errors
    ///
    /// Returns `ConcurrentModification` when the attempt budget runs out,
    /// or a storage/codec error.
    pub fn mutate<F>(&mut self, mut updater: F) -> CoreResult<K::State>
    where
        F: FnMut(&K::State) -> K::State,
    {
        self.try_mutate(|current| Ok(updater(current)))
    }

    /// Like [`Entity::mutate`], for updaters that can fail.
    ///
    /// An updater error aborts immediately without writing.
    ///
    /// # Errors
    ///
    /// Returns the updater's error, `ConcurrentModification` when the
    /// attempt budget runs out, or a storage/codec error.
    pub fn try_mutate<F>(&mut self, mut updater: F) -> CoreResult<K::State>
    where
        F: FnMut(&K::State) -> CoreResult<K::State>,
    {
        let attempts = self.store.config().effective_entity_attempts();

        for attempt in 1..=attempts {
            let current = self.load()?;
            let observed = self.version;
            let mut next = updater(&current)?;
            self.apply_normalizer(&mut next);

            let outcome = self.store.cas_put(&self.key, observed, &next)?;
            if outcome.ok {
                self.version = outcome.version;
                self.state = Some(next.clone());
                return Ok(next);
            }
            tracing::debug!(
                key = %self.key,
                attempt,
                expected = observed,
                observed = outcome.version,
                "mutate lost compare-and-swap"
            );
        }

        Err(self.exhausted(attempts))
    }

    /// Overlays the fields of `partial` onto the current state.
    ///
    /// See [`merge_fields`](crate::merge_fields) for the merge rules.
    ///
    /// # Errors
    ///
    /// Same as [`Entity::try_mutate`], plus merge errors.
    pub fn patch<P>(&mut self, partial: &P) -> CoreResult<K::State>
    where
        P: Serialize + ?Sized,
    {
        self.try_mutate(|current| merge_fields(current, partial))
    }

    /// Returns whether the document exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub fn exists(&self) -> CoreResult<bool> {
        self.store.has(&self.key)
    }

    /// Deletes the document. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub fn delete(&mut self) -> CoreResult<bool> {
        self.version = 0;
        self.state = None;
        self.store.delete(&self.key)
    }

    fn load(&mut self) -> CoreResult<K::State> {
        let (version, mut state) = match self.store.get::<K::State>(&self.key)? {
            Some(doc) => (doc.version, doc.data),
            None => (0, K::initial_state()),
        };
        self.apply_normalizer(&mut state);
        self.version = version;
        self.state = Some(state.clone());
        Ok(state)
    }

    fn apply_normalizer(&self, state: &mut K::State) {
        if let Some(normalize) = self.normalize {
            normalize(&self.id, state);
        }
    }

    fn exhausted(&self, attempts: u32) -> CoreError {
        tracing::warn!(key = %self.key, attempts, "giving up on contended document");
        CoreError::concurrent_modification(self.key.clone(), attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::document::Document;
    use docket_storage::{
        InMemoryBackend, KvBackend, KvTransaction, StorageResult, TxnOutcome,
    };
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Tally {
        label: String,
        value: i64,
    }

    struct TallyKind;

    impl EntityKind for TallyKind {
        const ENTITY_NAME: &'static str = "tally";
        type State = Tally;

        fn initial_state() -> Tally {
            Tally {
                label: "unnamed".into(),
                value: 0,
            }
        }
    }

    #[derive(Serialize)]
    struct LabelPatch<'a> {
        label: &'a str,
    }

    fn store() -> DocumentStore {
        DocumentStore::new(Arc::new(InMemoryBackend::new()))
    }

    fn bump(tally: &Tally) -> Tally {
        Tally {
            value: tally.value + 1,
            ..tally.clone()
        }
    }

    /// Rewrites one document right before each of the next `remaining`
    /// transactions, so a writer's version read is always stale by the
    /// time its compare-and-swap runs.
    struct RivalWrites {
        inner: Arc<dyn KvBackend>,
        key: &'static str,
        remaining: AtomicUsize,
    }

    impl RivalWrites {
        fn new(key: &'static str, writes: usize) -> Arc<Self> {
            Arc::new(Self {
                inner: Arc::new(InMemoryBackend::new()),
                key,
                remaining: AtomicUsize::new(writes),
            })
        }

        fn docs(&self) -> DocumentStore {
            DocumentStore::new(self.inner.clone())
        }
    }

    impl KvBackend for RivalWrites {
        fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
            self.inner.get(key)
        }

        fn put(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
            self.inner.put(key, value)
        }

        fn delete(&self, key: &str) -> StorageResult<bool> {
            self.inner.delete(key)
        }

        fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
            self.inner.keys_with_prefix(prefix)
        }

        fn transaction(
            &self,
            body: &mut dyn FnMut(&mut dyn KvTransaction) -> TxnOutcome,
        ) -> StorageResult<()> {
            let left = self.remaining.load(Ordering::SeqCst);
            if left > 0 {
                self.remaining.store(left - 1, Ordering::SeqCst);
                let docs = self.docs();
                let version = docs.version(self.key).unwrap();
                let rival = Tally {
                    label: "rival".into(),
                    value: version as i64 + 1,
                };
                docs.put(self.key, &Document::new(version + 1, rival)).unwrap();
            }
            self.inner.transaction(body)
        }
    }

    fn mine() -> Tally {
        Tally {
            label: "mine".into(),
            value: 7,
        }
    }

    #[test]
    fn key_is_namespaced() {
        let entity = Entity::<TallyKind>::new(store(), "t1");
        assert_eq!(entity.key(), "tally:t1");
        assert_eq!(entity.id(), "t1");
    }

    #[test]
    fn unsaved_entity_is_virtual() {
        let store = store();
        let mut entity = Entity::<TallyKind>::new(store.clone(), "t1");

        assert_eq!(entity.get_state().unwrap(), TallyKind::initial_state());
        assert_eq!(entity.cached_version(), 0);
        assert!(!entity.exists().unwrap());
        assert!(store.keys_with_prefix("").unwrap().is_empty());
    }

    #[test]
    fn save_then_get_round_trips() {
        let store = store();
        let state = Tally {
            label: "visits".into(),
            value: 41,
        };

        let mut writer = Entity::<TallyKind>::new(store.clone(), "t1");
        writer.save(state.clone()).unwrap();
        assert_eq!(writer.cached_version(), 1);

        let mut reader = Entity::<TallyKind>::new(store, "t1");
        assert_eq!(reader.get_state().unwrap(), state);
        assert_eq!(reader.cached_version(), 1);
    }

    #[test]
    fn save_overwrites_after_stale_read() {
        let store = store();
        let mut first = Entity::<TallyKind>::new(store.clone(), "t1");
        let mut second = Entity::<TallyKind>::new(store.clone(), "t1");

        first.get_state().unwrap();
        second.mutate(bump).unwrap();

        let replacement = Tally {
            label: "reset".into(),
            value: 0,
        };
        first.save(replacement.clone()).unwrap();
        assert_eq!(first.cached_version(), 2);
        assert_eq!(second.get_state().unwrap(), replacement);
    }

    #[test]
    fn save_gives_up_when_every_attempt_is_contended() {
        let backend = RivalWrites::new("tally:t1", 4);
        let store = DocumentStore::new(backend.clone());
        let mut entity = Entity::<TallyKind>::new(store.clone(), "t1");

        match entity.save(mine()) {
            Err(CoreError::ConcurrentModification { key, attempts }) => {
                assert_eq!(key, "tally:t1");
                assert_eq!(attempts, 4);
            }
            other => panic!("expected contention failure, got {other:?}"),
        }
        assert_eq!(store.version("tally:t1").unwrap(), 4);
        let mut reader = Entity::<TallyKind>::new(store, "t1");
        assert_eq!(reader.get_state().unwrap().label, "rival");
    }

    #[test]
    fn save_succeeds_on_last_attempt() {
        let backend = RivalWrites::new("tally:t1", 3);
        let store = DocumentStore::new(backend.clone());
        let mut entity = Entity::<TallyKind>::new(store.clone(), "t1");

        entity.save(mine()).unwrap();
        assert_eq!(entity.cached_version(), 4);
        assert_eq!(entity.cached_state(), Some(&mine()));
        assert_eq!(backend.remaining.load(Ordering::SeqCst), 0);

        let mut reader = Entity::<TallyKind>::new(store, "t1");
        assert_eq!(reader.get_state().unwrap(), mine());
    }

    #[test]
    fn save_replaces_document_in_older_shape() {
        let store = store();
        store.put("tally:t1", &Document::new(1, 42u32)).unwrap();

        let mut entity = Entity::<TallyKind>::new(store.clone(), "t1");
        assert!(entity.get_state().is_err());

        entity.save(mine()).unwrap();
        assert_eq!(entity.cached_version(), 2);
        assert_eq!(entity.get_state().unwrap(), mine());
    }

    #[test]
    fn mutate_applies_updater() {
        let mut entity = Entity::<TallyKind>::new(store(), "t1");
        for _ in 0..3 {
            entity.mutate(bump).unwrap();
        }
        assert_eq!(entity.get_state().unwrap().value, 3);
        assert_eq!(entity.cached_version(), 3);
    }

    #[test]
    fn patch_merges_fields() {
        let mut entity = Entity::<TallyKind>::new(store(), "t1");
        entity.mutate(bump).unwrap();

        let patched = entity.patch(&LabelPatch { label: "hits" }).unwrap();
        assert_eq!(
            patched,
            Tally {
                label: "hits".into(),
                value: 1
            }
        );
    }

    #[test]
    fn try_mutate_error_writes_nothing() {
        let mut entity = Entity::<TallyKind>::new(store(), "t1");
        let result = entity.try_mutate(|_| Err(CoreError::invalid_operation("rejected")));
        assert!(matches!(result, Err(CoreError::InvalidOperation { .. })));
        assert!(!entity.exists().unwrap());
    }

    #[test]
    fn delete_reports_existence() {
        let mut entity = Entity::<TallyKind>::new(store(), "t1");
        assert!(!entity.delete().unwrap());

        entity.mutate(bump).unwrap();
        assert!(entity.exists().unwrap());
        assert!(entity.delete().unwrap());
        assert!(!entity.exists().unwrap());
        assert_eq!(entity.get_state().unwrap(), TallyKind::initial_state());
    }

    #[test]
    fn mutate_gives_up_when_every_attempt_is_contended() {
        let store = store();
        let mut entity = Entity::<TallyKind>::new(store.clone(), "t1");
        let mut rival = Entity::<TallyKind>::new(store, "t1");
        let mut calls = 0;

        let result = entity.mutate(|current| {
            calls += 1;
            rival.mutate(bump).unwrap();
            bump(current)
        });

        match result {
            Err(CoreError::ConcurrentModification { key, attempts }) => {
                assert_eq!(key, "tally:t1");
                assert_eq!(attempts, 4);
            }
            other => panic!("expected contention failure, got {other:?}"),
        }
        assert_eq!(calls, 4);
        assert_eq!(rival.get_state().unwrap().value, 4);
    }

    #[test]
    fn mutate_succeeds_on_last_attempt() {
        let store = store();
        let mut entity = Entity::<TallyKind>::new(store.clone(), "t1");
        let mut rival = Entity::<TallyKind>::new(store, "t1");
        let mut calls = 0;

        let result = entity
            .mutate(|current| {
                calls += 1;
                if calls < 4 {
                    rival.mutate(bump).unwrap();
                }
                bump(current)
            })
            .unwrap();

        assert_eq!(calls, 4);
        assert_eq!(result.value, 4);
        assert_eq!(entity.cached_version(), 4);
    }

    #[test]
    fn attempt_budget_is_configurable() {
        let store = DocumentStore::with_config(
            Arc::new(InMemoryBackend::new()),
            StoreConfig::new().entity_attempts(1),
        );
        let mut entity = Entity::<TallyKind>::new(store.clone(), "t1");
        let mut rival = Entity::<TallyKind>::new(store, "t1");

        let result = entity.mutate(|current| {
            rival.mutate(bump).unwrap();
            bump(current)
        });
        assert!(matches!(
            result,
            Err(CoreError::ConcurrentModification { attempts: 1, .. })
        ));
    }

    #[test]
    fn concurrent_mutators_never_lose_increments() {
        let store = store();
        let threads = 4;
        let per_thread = 25;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    let mut entity = Entity::<TallyKind>::new(store, "shared");
                    let mut applied = 0;
                    while applied < per_thread {
                        match entity.mutate(bump) {
                            Ok(_) => applied += 1,
                            Err(CoreError::ConcurrentModification { .. }) => {}
                            Err(e) => panic!("unexpected error: {e}"),
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let mut entity = Entity::<TallyKind>::new(store, "shared");
        assert_eq!(entity.get_state().unwrap().value, threads * per_thread);
    }
}
