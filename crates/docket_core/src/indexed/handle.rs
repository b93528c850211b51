//! Collection-level operations over an indexed entity type.

use crate::document::DocumentStore;
use crate::entity::Entity;
use crate::error::CoreResult;
use crate::index::Index;
use crate::indexed::kind::{Identified, IndexedKind};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;

/// Result of [`IndexedEntity::reconcile`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Ids with a document but no index entry, now appended.
    pub reindexed: Vec<String>,
    /// Ids in the index with no document, now removed.
    pub pruned: Vec<String>,
}

impl ReconcileReport {
    /// Returns true if nothing needed repair.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.reindexed.is_empty() && self.pruned.is_empty()
    }
}

/// Collection handle for entity type `K`.
///
/// Creation saves the document and then appends its id to the index
/// `K::INDEX_NAME`; deletion does the reverse. The two steps are separate
/// store operations, so a failure between them can leave a document the
/// index does not list, or an id with no document. Listing resolves such
/// an id to [`initial_state`](crate::EntityKind::initial_state).
/// [`IndexedEntity::reconcile`] repairs both cases on demand.
pub struct IndexedEntity<K: IndexedKind> {
    store: DocumentStore,
    index: Index<String>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: IndexedKind> fmt::Debug for IndexedEntity<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexedEntity")
            .field("entity", &K::ENTITY_NAME)
            .field("index", &K::INDEX_NAME)
            .finish()
    }
}

impl<K: IndexedKind> Clone for IndexedEntity<K> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            index: self.index.clone(),
            _kind: PhantomData,
        }
    }
}

fn normalize_id<S: Identified>(id: &str, state: &mut S) {
    if state.id() != id {
        state.set_id(id.to_string());
    }
}

impl<K: IndexedKind> IndexedEntity<K> {
    /// Creates a handle over `store`. Nothing is read or written.
    pub fn new(store: DocumentStore) -> Self {
        Self {
            index: Index::new(store.clone(), K::INDEX_NAME),
            store,
            _kind: PhantomData,
        }
    }

    /// Returns the id index.
    #[must_use]
    pub fn index(&self) -> &Index<String> {
        &self.index
    }

    /// Returns an entity handle for `id` whose loaded and saved states
    /// always carry `id`.
    pub fn entity(&self, id: impl Into<String>) -> Entity<K> {
        Entity::new(self.store.clone(), id).with_normalizer(normalize_id::<K::State>)
    }

    /// Saves `state` under [`IndexedKind::key_of`] and indexes the id.
    ///
    /// Returns the state as saved, with its id set. The document is not
    /// read back.
    ///
    /// # Errors
    ///
    /// Returns the save or append error. If the append fails the document
    /// stays saved but unlisted.
    pub fn create(&self, state: K::State) -> CoreResult<K::State> {
        let id = K::key_of(&state);
        let mut state = state;
        normalize_id(&id, &mut state);
        self.entity(id.clone()).save(state.clone())?;
        self.index.add(id)?;
        Ok(state)
    }

    /// Loads the state of `id`, or the initial state if it was never saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be read or decoded.
    pub fn get(&self, id: &str) -> CoreResult<K::State> {
        self.entity(id).get_state()
    }

    /// Returns whether a document exists for `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub fn exists(&self, id: &str) -> CoreResult<bool> {
        self.entity(id).exists()
    }

    /// Returns the indexed ids in insertion order.
    ///
    /// # Errors
    ///
    /// Returns the first read or decode error.
    pub fn ids(&self) -> CoreResult<Vec<String>> {
        self.index.list()
    }

    /// Returns the number of indexed ids.
    ///
    /// # Errors
    ///
    /// Returns an error if the index root cannot be read.
    pub fn count(&self) -> CoreResult<u64> {
        self.index.count()
    }

    /// Loads every indexed state in index order.
    ///
    /// # Errors
    ///
    /// Returns the first read or decode error.
    pub fn list(&self) -> CoreResult<Vec<K::State>> {
        self.ids()?.iter().map(|id| self.get(id)).collect()
    }

    /// Creates [`IndexedKind::seed_data`] if the index is empty.
    ///
    /// Returns whether anything was seeded.
    ///
    /// # Errors
    ///
    /// Returns the first save or append error.
    pub fn ensure_seed(&self) -> CoreResult<bool> {
        if !self.index.is_empty()? {
            return Ok(false);
        }
        let seeds = K::seed_data();
        if seeds.is_empty() {
            return Ok(false);
        }

        let mut ids = Vec::with_capacity(seeds.len());
        for seed in seeds {
            let id = K::key_of(&seed);
            self.entity(id.clone()).save(seed)?;
            ids.push(id);
        }
        self.index.add_batch(&ids)?;
        tracing::debug!(index = K::INDEX_NAME, seeded = ids.len(), "seeded index");
        Ok(true)
    }

    /// Deletes the document of `id` and removes `id` from the index.
    ///
    /// Returns whether the document existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub fn delete(&self, id: &str) -> CoreResult<bool> {
        let existed = self.entity(id).delete()?;
        self.index.remove(&id.to_string())?;
        Ok(existed)
    }

    /// Deletes every document in `ids` and removes them from the index.
    ///
    /// Returns how many documents existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub fn delete_many(&self, ids: &[String]) -> CoreResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut deleted = 0;
        for id in ids {
            if self.entity(id.as_str()).delete()? {
                deleted += 1;
            }
        }
        self.index.remove_batch(ids)?;
        Ok(deleted)
    }

    /// Removes `id` from the index, leaving its document in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub fn remove_from_index(&self, id: &str) -> CoreResult<bool> {
        self.index.remove(&id.to_string())
    }

    /// Brings the index back in line with the stored documents.
    ///
    /// Appends ids of documents under `<ENTITY_NAME>:` that the index does
    /// not list, then removes listed ids that have no document. Assumes
    /// the default [`EntityKind::key_for`](crate::EntityKind::key_for)
    /// layout. Not atomic with respect to concurrent creates and deletes.
    ///
    /// # Errors
    ///
    /// Returns the first read, append or removal error.
    pub fn reconcile(&self) -> CoreResult<ReconcileReport> {
        let prefix = format!("{}:", K::ENTITY_NAME);
        let indexed = self.ids()?;
        let listed: HashSet<&str> = indexed.iter().map(String::as_str).collect();

        let mut report = ReconcileReport::default();
        let mut stored = HashSet::new();
        for key in self.store.keys_with_prefix(&prefix)? {
            let Some(id) = key.strip_prefix(&prefix) else {
                continue;
            };
            if !listed.contains(id) {
                report.reindexed.push(id.to_string());
            }
            stored.insert(id.to_string());
        }

        let mut seen = HashSet::new();
        for id in &indexed {
            if !stored.contains(id) && seen.insert(id.as_str()) {
                report.pruned.push(id.clone());
            }
        }

        self.index.add_batch(&report.reindexed)?;
        self.index.remove_batch(&report.pruned)?;

        if !report.is_clean() {
            tracing::info!(
                index = K::INDEX_NAME,
                reindexed = report.reindexed.len(),
                pruned = report.pruned.len(),
                "reconciled index"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::entity::EntityKind;
    use docket_storage::{
        InMemoryBackend, KvBackend, KvTransaction, StorageResult, TxnOutcome,
    };
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Chat {
        id: String,
        title: String,
    }

    impl Identified for Chat {
        fn id(&self) -> &str {
            &self.id
        }
        fn set_id(&mut self, id: String) {
            self.id = id;
        }
    }

    struct Chats;

    impl EntityKind for Chats {
        const ENTITY_NAME: &'static str = "chat";
        type State = Chat;

        fn initial_state() -> Chat {
            Chat::default()
        }
    }

    impl IndexedKind for Chats {
        const INDEX_NAME: &'static str = "chats";

        fn seed_data() -> Vec<Chat> {
            vec![chat("c1", "General"), chat("c2", "Random")]
        }
    }

    struct Slugged;

    impl EntityKind for Slugged {
        const ENTITY_NAME: &'static str = "slugged";
        type State = Chat;

        fn initial_state() -> Chat {
            Chat::default()
        }
    }

    impl IndexedKind for Slugged {
        const INDEX_NAME: &'static str = "slugs";

        fn key_of(state: &Chat) -> String {
            state.title.to_lowercase()
        }
    }

    fn chat(id: &str, title: &str) -> Chat {
        Chat {
            id: id.into(),
            title: title.into(),
        }
    }

    /// Deletes one key before every transaction after the first.
    struct DeletesAfterFirst {
        inner: InMemoryBackend,
        key: &'static str,
        seen: AtomicUsize,
    }

    impl KvBackend for DeletesAfterFirst {
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
            if self.seen.fetch_add(1, Ordering::SeqCst) > 0 {
                self.inner.delete(self.key)?;
            }
            self.inner.transaction(body)
        }
    }

    fn chats() -> (DocumentStore, IndexedEntity<Chats>) {
        let store = DocumentStore::new(Arc::new(InMemoryBackend::new()));
        (store.clone(), IndexedEntity::new(store))
    }

    #[test]
    fn create_then_list() {
        let (_, chats) = chats();
        chats.create(chat("a", "First")).unwrap();
        chats.create(chat("b", "Second")).unwrap();

        assert_eq!(chats.ids().unwrap(), vec!["a", "b"]);
        assert_eq!(
            chats.list().unwrap(),
            vec![chat("a", "First"), chat("b", "Second")]
        );
        assert_eq!(chats.count().unwrap(), 2);
        assert!(chats.exists("a").unwrap());
    }

    #[test]
    fn create_returns_saved_state_without_rereading() {
        let backend = Arc::new(DeletesAfterFirst {
            inner: InMemoryBackend::new(),
            key: "chat:a",
            seen: AtomicUsize::new(0),
        });
        let store = DocumentStore::new(backend.clone());
        let chats: IndexedEntity<Chats> = IndexedEntity::new(store.clone());

        let created = chats.create(chat("a", "Saved")).unwrap();
        assert_eq!(created, chat("a", "Saved"));
        assert_eq!(chats.ids().unwrap(), vec!["a"]);
        assert!(!store.has("chat:a").unwrap());
    }

    #[test]
    fn delete_unlists_and_reports_existence() {
        let (_, chats) = chats();
        chats.create(chat("a", "First")).unwrap();

        assert!(chats.delete("a").unwrap());
        assert!(chats.ids().unwrap().is_empty());
        assert!(!chats.exists("a").unwrap());
        assert!(!chats.delete("a").unwrap());
    }

    #[test]
    fn delete_many_counts_existing_documents() {
        let (_, chats) = chats();
        chats.create(chat("a", "A")).unwrap();
        chats.create(chat("b", "B")).unwrap();
        chats.create(chat("c", "C")).unwrap();

        let removed = chats
            .delete_many(&["a".to_string(), "c".to_string(), "zz".to_string()])
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(chats.ids().unwrap(), vec!["b"]);
        assert_eq!(chats.delete_many(&[]).unwrap(), 0);
    }

    #[test]
    fn remove_from_index_keeps_document() {
        let (_, chats) = chats();
        chats.create(chat("a", "Kept")).unwrap();

        assert!(chats.remove_from_index("a").unwrap());
        assert!(!chats.remove_from_index("a").unwrap());
        assert!(chats.ids().unwrap().is_empty());
        assert_eq!(chats.get("a").unwrap(), chat("a", "Kept"));
    }

    #[test]
    fn dangling_id_lists_as_initial_state() {
        let (store, chats) = chats();
        chats.create(chat("a", "Gone")).unwrap();
        store.delete("chat:a").unwrap();

        assert_eq!(chats.list().unwrap(), vec![chat("a", "")]);
    }

    #[test]
    fn loaded_state_takes_the_handle_id() {
        let (store, chats) = chats();
        store
            .put("chat:real", &Document::new(1, chat("forged", "T")))
            .unwrap();

        assert_eq!(chats.get("real").unwrap().id, "real");
    }

    #[test]
    fn saved_state_takes_the_handle_id() {
        let (store, chats) = chats();
        chats.entity("x").save(chat("other", "T")).unwrap();

        let doc = store.get::<Chat>("chat:x").unwrap().unwrap();
        assert_eq!(doc.data.id, "x");
    }

    #[test]
    fn ensure_seed_runs_once() {
        let (_, chats) = chats();
        assert!(chats.ensure_seed().unwrap());
        assert!(!chats.ensure_seed().unwrap());
        assert_eq!(chats.ids().unwrap(), vec!["c1", "c2"]);
        assert_eq!(chats.get("c2").unwrap().title, "Random");
    }

    #[test]
    fn ensure_seed_skips_populated_index() {
        let (_, chats) = chats();
        chats.create(chat("mine", "Mine")).unwrap();
        assert!(!chats.ensure_seed().unwrap());
        assert_eq!(chats.ids().unwrap(), vec!["mine"]);
    }

    #[test]
    fn ensure_seed_without_seed_data() {
        let store = DocumentStore::new(Arc::new(InMemoryBackend::new()));
        let slugs: IndexedEntity<Slugged> = IndexedEntity::new(store);
        assert!(!slugs.ensure_seed().unwrap());
        assert!(slugs.index().root().unwrap().is_none());
    }

    #[test]
    fn custom_key_of_sets_the_id() {
        let store = DocumentStore::new(Arc::new(InMemoryBackend::new()));
        let slugs: IndexedEntity<Slugged> = IndexedEntity::new(store.clone());

        let created = slugs.create(chat("ignored", "Hello")).unwrap();
        assert_eq!(created.id, "hello");
        assert_eq!(slugs.ids().unwrap(), vec!["hello"]);
        assert!(store.has("slugged:hello").unwrap());
    }

    #[test]
    fn reconcile_repairs_both_directions() {
        let (store, chats) = chats();
        chats.create(chat("a", "A")).unwrap();
        chats.create(chat("b", "B")).unwrap();

        store.delete("chat:a").unwrap();
        store
            .put("chat:orphan", &Document::new(1, chat("orphan", "O")))
            .unwrap();

        let report = chats.reconcile().unwrap();
        assert_eq!(report.reindexed, vec!["orphan"]);
        assert_eq!(report.pruned, vec!["a"]);
        assert_eq!(chats.ids().unwrap(), vec!["b", "orphan"]);

        assert!(chats.reconcile().unwrap().is_clean());
    }
}
