//! Index handle.

use crate::document::{Document, DocumentStore};
use crate::error::{CoreError, CoreResult};
use crate::index::keys::{new_page_id, page_key, root_key};
use crate::index::page::{IndexPage, IndexReport, IndexRoot, PageSummary};
use crate::index::scan::IndexScan;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

/// Pages reachable from a head, stopping at a missing page or a revisit.
struct Walk {
    pages: Vec<PageSummary>,
    missing: Option<String>,
    cycle_at: Option<String>,
}

/// A named, paginated, ordered collection of items.
///
/// Items keep insertion order across pages. Nothing is ever reordered or
/// compacted; only [`Index::clear`] resets the chain.
///
/// # Consistency
///
/// - [`Index::add_batch`] runs one transaction per page of work, so a
///   batch spanning several pages is not atomic as a whole
/// - [`Index::remove_batch`] and [`Index::clear`] each run as a single
///   transaction over every page they touch
/// - [`Index::scan`] and [`Index::list`] read without a snapshot
///
/// # Example
///
/// ```rust
/// use docket_core::{DocumentStore, Index};
/// use docket_storage::InMemoryBackend;
/// use std::sync::Arc;
///
/// let store = DocumentStore::new(Arc::new(InMemoryBackend::new()));
/// let index: Index<String> = Index::with_page_size(store, "tags", 2);
///
/// index.add_batch(&["a".into(), "b".into(), "c".into()]).unwrap();
/// assert_eq!(index.remove_batch(&["b".into()]).unwrap(), 1);
/// assert_eq!(index.list().unwrap(), vec!["a", "c"]);
/// assert_eq!(index.count().unwrap(), 2);
/// ```
pub struct Index<T> {
    store: DocumentStore,
    name: String,
    root_key: String,
    page_size: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for Index<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Index")
            .field("name", &self.name)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl<T> Clone for Index<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            name: self.name.clone(),
            root_key: self.root_key.clone(),
            page_size: self.page_size,
            _marker: PhantomData,
        }
    }
}

impl<T> Index<T>
where
    T: Serialize + DeserializeOwned + Clone + Eq + Hash,
{
    /// Opens the index `name` using the store's default page size.
    pub fn new(store: DocumentStore, name: impl Into<String>) -> Self {
        let page_size = store.config().effective_page_size();
        Self::with_page_size(store, name, page_size)
    }

    /// Opens the index `name`, creating it with `page_size` if needed.
    ///
    /// The page size only applies when the root is first created; an
    /// existing root keeps its own.
    pub fn with_page_size(store: DocumentStore, name: impl Into<String>, page_size: usize) -> Self {
        let name = name.into();
        Self {
            root_key: root_key(&name),
            store,
            name,
            page_size: page_size.max(1),
            _marker: PhantomData,
        }
    }

    /// Returns the index name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the root document key.
    #[must_use]
    pub fn root_key(&self) -> &str {
        &self.root_key
    }

    /// Reads the root, if the index has been created.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be read or decoded.
    pub fn root(&self) -> CoreResult<Option<IndexRoot>> {
        Ok(self
            .store
            .get::<IndexRoot>(&self.root_key)?
            .map(|doc| doc.data))
    }

    /// Returns the number of live items.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be read or decoded.
    pub fn count(&self) -> CoreResult<u64> {
        Ok(self.root()?.map_or(0, |root| root.total_count))
    }

    /// Returns true if the index holds no items.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be read or decoded.
    pub fn is_empty(&self) -> CoreResult<bool> {
        Ok(self.count()? == 0)
    }

    /// Appends one item.
    ///
    /// # Errors
    ///
    /// See [`Index::add_batch`].
    pub fn add(&self, item: T) -> CoreResult<()> {
        self.add_batch(std::slice::from_ref(&item))
    }

    /// Appends `items` in order.
    ///
    /// Items first fill the tail page up to the page size; the rest go to
    /// newly linked pages. Each step (create the head, fill the tail, or
    /// link one page) is its own transaction. A step failing with a
    /// transient storage error (a backend conflict) is retried up to
    /// [`StoreConfig::chunk_retries`](crate::StoreConfig) times; the budget
    /// resets after every successful step. Steps already committed stay
    /// committed if a later step fails.
    ///
    /// # Errors
    ///
    /// Returns the conflict once a step's retries run out. Other storage
    /// errors, `IndexRootMissing` if the root disappears mid-batch, and
    /// codec errors are returned without retrying.
    pub fn add_batch(&self, items: &[T]) -> CoreResult<()> {
        if items.is_empty() {
            return Ok(());
        }
        self.ensure_root()?;

        let budget = self.store.config().chunk_retries;
        let mut retries_left = budget;
        let mut offset = 0;

        while offset < items.len() {
            match self.append_step(&items[offset..]) {
                Ok(consumed) => {
                    offset += consumed;
                    retries_left = budget;
                }
                Err(e) if e.is_transient() && retries_left > 0 => {
                    retries_left -= 1;
                    tracing::debug!(
                        index = %self.name,
                        remaining = items.len() - offset,
                        retries_left,
                        error = %e,
                        "retrying index append step"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Removes one item (every occurrence on the pages visited).
    ///
    /// # Errors
    ///
    /// See [`Index::remove_batch`].
    pub fn remove(&self, item: &T) -> CoreResult<bool> {
        Ok(self.remove_batch(std::slice::from_ref(item))? > 0)
    }

    /// Removes `items` and returns how many entries were actually removed.
    ///
    /// Walks from the head in one transaction, rewriting only pages that
    /// change, and stops once the removed count reaches `items.len()`.
    /// Emptied pages stay linked. Items not present are ignored.
    ///
    /// # Errors
    ///
    /// Returns a storage or codec error; nothing is written in that case.
    pub fn remove_batch(&self, items: &[T]) -> CoreResult<usize> {
        if items.is_empty() {
            return Ok(0);
        }
        let targets: HashSet<&T> = items.iter().collect();
        let requested = items.len();

        self.store.transaction(|txn| {
            let Some(root) = txn.get::<IndexRoot>(&self.root_key)? else {
                return Ok(0);
            };

            let mut removed = 0;
            let mut current = root.data.head_page_id.clone();
            while let Some(page_id) = current {
                let key = page_key(&self.root_key, &page_id);
                let Some(page) = txn.get::<IndexPage<T>>(&key)? else {
                    break;
                };

                let IndexPage { items, next } = page.data;
                let before = items.len();
                let kept: Vec<T> = items
                    .into_iter()
                    .filter(|item| !targets.contains(item))
                    .collect();

                if kept.len() != before {
                    removed += before - kept.len();
                    txn.put(
                        &key,
                        &Document::new(
                            page.version + 1,
                            IndexPage {
                                items: kept,
                                next: next.clone(),
                            },
                        ),
                    )?;
                }
                if removed >= requested {
                    break;
                }
                current = next;
            }

            if removed > 0 {
                let mut state = root.data;
                state.total_count = state.total_count.saturating_sub(removed as u64);
                txn.put(&self.root_key, &Document::new(root.version + 1, state))?;
            }
            Ok(removed)
        })
    }

    /// Deletes every page and resets the root to empty.
    ///
    /// The root keeps its name and page size and stays usable. A missing
    /// root is left missing.
    ///
    /// # Errors
    ///
    /// Returns a storage or codec error; nothing is written in that case.
    pub fn clear(&self) -> CoreResult<()> {
        self.store.transaction(|txn| {
            let Some(root) = txn.get::<IndexRoot>(&self.root_key)? else {
                return Ok(());
            };

            let mut deleted = 0usize;
            let mut current = root.data.head_page_id.clone();
            while let Some(page_id) = current {
                let key = page_key(&self.root_key, &page_id);
                current = txn
                    .get::<IndexPage<IgnoredAny>>(&key)?
                    .and_then(|page| page.data.next);
                txn.delete(&key)?;
                deleted += 1;
            }

            tracing::debug!(index = %self.name, deleted, "cleared index");
            txn.put(
                &self.root_key,
                &Document::new(root.version + 1, root.data.cleared()),
            )
        })
    }

    /// Returns a lazy iterator over the items.
    ///
    /// Does not create the root.
    pub fn scan(&self) -> IndexScan<T> {
        IndexScan::new(self.store.clone(), self.root_key.clone())
    }

    /// Collects every item in order.
    ///
    /// # Errors
    ///
    /// Returns the first read or decode error of the scan.
    pub fn list(&self) -> CoreResult<Vec<T>> {
        self.scan().collect()
    }

    /// Describes every reachable page, head first.
    ///
    /// # Errors
    ///
    /// Returns an error if a document cannot be read or decoded.
    pub fn pages(&self) -> CoreResult<Vec<PageSummary>> {
        let head = self.root()?.and_then(|root| root.head_page_id);
        Ok(self.walk(head)?.pages)
    }

    /// Checks the chain against the root without modifying anything.
    ///
    /// # Errors
    ///
    /// Returns an error if a document cannot be read or decoded. Broken
    /// invariants are reported in the [`IndexReport`], not as errors.
    pub fn verify(&self) -> CoreResult<IndexReport> {
        let mut report = IndexReport {
            name: self.name.clone(),
            ..IndexReport::default()
        };
        let Some(root) = self.root()? else {
            return Ok(report);
        };

        report.root_present = true;
        report.page_size = root.page_size;
        report.total_count = root.total_count;

        match (&root.head_page_id, &root.tail_page_id) {
            (None, None) if root.total_count != 0 => report.violations.push(format!(
                "root has no pages but total_count is {}",
                root.total_count
            )),
            (Some(_), None) => report
                .violations
                .push("root has a head page but no tail page".to_string()),
            (None, Some(_)) => report
                .violations
                .push("root has a tail page but no head page".to_string()),
            _ => {}
        }

        let walk = self.walk(root.head_page_id.clone())?;
        if let Some(missing) = &walk.missing {
            report
                .violations
                .push(format!("page {missing} is linked but missing"));
        }
        if let Some(cycle_at) = &walk.cycle_at {
            report
                .violations
                .push(format!("page chain loops back to {cycle_at}"));
        }

        for page in &walk.pages {
            if page.len > root.page_size {
                report.violations.push(format!(
                    "page {} holds {} items, page size is {}",
                    page.id, page.len, root.page_size
                ));
            }
            if page.len == 0 {
                report.empty_pages += 1;
            }
            report.counted_items += page.len as u64;
        }
        report.pages = walk.pages.len();

        if walk.missing.is_none() && walk.cycle_at.is_none() {
            let last = walk.pages.last().map(|page| &page.id);
            if last != root.tail_page_id.as_ref() {
                report.violations.push(format!(
                    "last reachable page {:?} is not the tail {:?}",
                    last, root.tail_page_id
                ));
            }
        }
        if report.counted_items != root.total_count {
            report.violations.push(format!(
                "pages hold {} items but total_count is {}",
                report.counted_items, root.total_count
            ));
        }

        Ok(report)
    }

    fn ensure_root(&self) -> CoreResult<()> {
        if self.store.has(&self.root_key)? {
            return Ok(());
        }
        let outcome = self.store.cas_put(
            &self.root_key,
            0,
            &IndexRoot::empty(self.name.clone(), self.page_size),
        )?;
        if outcome.ok {
            tracing::debug!(index = %self.name, page_size = self.page_size, "created index root");
        }
        Ok(())
    }

    /// Appends a prefix of `remaining` in one transaction and returns its
    /// length: the head page when there is none, else as much as fits in
    /// the tail, else one newly linked page.
    fn append_step(&self, remaining: &[T]) -> CoreResult<usize> {
        self.store.transaction(|txn| {
            let root = txn
                .get::<IndexRoot>(&self.root_key)?
                .ok_or_else(|| CoreError::index_root_missing(self.root_key.clone()))?;
            let root_version = root.version;
            let mut state = root.data;
            let page_size = state.page_size.max(1);

            let Some(tail_id) = state.tail_page_id.clone() else {
                let head_id = new_page_id();
                let chunk = &remaining[..remaining.len().min(page_size)];
                txn.put(
                    &page_key(&self.root_key, &head_id),
                    &Document::new(1, IndexPage::tail(chunk.to_vec())),
                )?;
                state.head_page_id = Some(head_id.clone());
                state.tail_page_id = Some(head_id);
                state.total_count += chunk.len() as u64;
                txn.put(&self.root_key, &Document::new(root_version + 1, state))?;
                return Ok(chunk.len());
            };

            let tail_key = page_key(&self.root_key, &tail_id);
            let (tail_version, mut tail) = match txn.get::<IndexPage<T>>(&tail_key)? {
                Some(doc) => (doc.version, doc.data),
                None => (0, IndexPage::tail(Vec::new())),
            };

            let capacity = page_size.saturating_sub(tail.items.len());
            if capacity > 0 {
                let chunk = &remaining[..remaining.len().min(capacity)];
                tail.items.extend_from_slice(chunk);
                txn.put(&tail_key, &Document::new(tail_version + 1, tail))?;
                state.total_count += chunk.len() as u64;
                txn.put(&self.root_key, &Document::new(root_version + 1, state))?;
                return Ok(chunk.len());
            }

            let page_id = new_page_id();
            let chunk = &remaining[..remaining.len().min(page_size)];
            txn.put(
                &page_key(&self.root_key, &page_id),
                &Document::new(1, IndexPage::tail(chunk.to_vec())),
            )?;
            tail.next = Some(page_id.clone());
            txn.put(&tail_key, &Document::new(tail_version + 1, tail))?;
            tracing::trace!(index = %self.name, page = %page_id, "linked index page");

            state.tail_page_id = Some(page_id);
            state.total_count += chunk.len() as u64;
            txn.put(&self.root_key, &Document::new(root_version + 1, state))?;
            Ok(chunk.len())
        })
    }

    fn walk(&self, head: Option<String>) -> CoreResult<Walk> {
        let mut walk = Walk {
            pages: Vec::new(),
            missing: None,
            cycle_at: None,
        };
        let mut seen = HashSet::new();
        let mut current = head;

        while let Some(page_id) = current {
            if !seen.insert(page_id.clone()) {
                walk.cycle_at = Some(page_id);
                break;
            }
            let Some(page) = self
                .store
                .get::<IndexPage<IgnoredAny>>(&page_key(&self.root_key, &page_id))?
            else {
                walk.missing = Some(page_id);
                break;
            };
            current = page.data.next.clone();
            walk.pages.push(PageSummary {
                id: page_id,
                len: page.data.items.len(),
                next: page.data.next,
            });
        }
        Ok(walk)
    }
}
