//! Lazy page-by-page iteration.

use crate::document::DocumentStore;
use crate::error::CoreResult;
use crate::index::keys::page_key;
use crate::index::page::{IndexPage, IndexRoot};
use serde::de::DeserializeOwned;
use std::vec;

/// Iterator over the items of an index.
///
/// Reads the root on the first call to `next`, then one page at a time
/// following `next` links. There is no snapshot: writes that land during
/// the scan may or may not be observed. A read error is yielded once and
/// ends the scan. A fresh scan starts again from the current root.
#[derive(Debug)]
pub struct IndexScan<T> {
    store: DocumentStore,
    root_key: String,
    started: bool,
    finished: bool,
    next_page: Option<String>,
    buffer: vec::IntoIter<T>,
}

impl<T: DeserializeOwned> IndexScan<T> {
    pub(crate) fn new(store: DocumentStore, root_key: String) -> Self {
        Self {
            store,
            root_key,
            started: false,
            finished: false,
            next_page: None,
            buffer: Vec::new().into_iter(),
        }
    }

    fn advance(&mut self) -> CoreResult<()> {
        if !self.started {
            self.started = true;
            self.next_page = self
                .store
                .get::<IndexRoot>(&self.root_key)?
                .and_then(|root| root.data.head_page_id);
            return Ok(());
        }

        let Some(page_id) = self.next_page.take() else {
            self.finished = true;
            return Ok(());
        };

        match self
            .store
            .get::<IndexPage<T>>(&page_key(&self.root_key, &page_id))?
        {
            Some(page) => {
                self.buffer = page.data.items.into_iter();
                self.next_page = page.data.next;
            }
            None => self.finished = true,
        }
        Ok(())
    }
}

impl<T: DeserializeOwned> Iterator for IndexScan<T> {
    type Item = CoreResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.next() {
                return Some(Ok(item));
            }
            if self.finished {
                return None;
            }
            if let Err(e) = self.advance() {
                self.finished = true;
                return Some(Err(e));
            }
        }
    }
}
