//! Root and page documents.

use serde::{Deserialize, Serialize};

/// The root document of an index.
///
/// `head_page_id`, `tail_page_id` are both `None` exactly when
/// `total_count` is 0 and no page has been linked since the last clear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRoot {
    /// First page of the chain.
    pub head_page_id: Option<String>,
    /// Last page of the chain; appends go here.
    pub tail_page_id: Option<String>,
    /// Number of live items across all pages.
    pub total_count: u64,
    /// Index name.
    pub name: String,
    /// Maximum items per page, fixed when the root is created.
    pub page_size: usize,
}

impl IndexRoot {
    /// An empty root.
    #[must_use]
    pub fn empty(name: impl Into<String>, page_size: usize) -> Self {
        Self {
            head_page_id: None,
            tail_page_id: None,
            total_count: 0,
            name: name.into(),
            page_size,
        }
    }

    /// Returns this root with its chain detached and count reset.
    #[must_use]
    pub fn cleared(self) -> Self {
        Self {
            head_page_id: None,
            tail_page_id: None,
            total_count: 0,
            ..self
        }
    }
}

/// One page of an index chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexPage<T> {
    /// Items in insertion order. Never more than the root's page size.
    pub items: Vec<T>,
    /// The following page, `None` on the tail.
    pub next: Option<String>,
}

impl<T> IndexPage<T> {
    /// A tail page holding `items`.
    #[must_use]
    pub fn tail(items: Vec<T>) -> Self {
        Self { items, next: None }
    }
}

/// Shape of one page, for inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageSummary {
    /// Page id.
    pub id: String,
    /// Number of items on the page.
    pub len: usize,
    /// Following page id.
    pub next: Option<String>,
}

/// Result of [`Index::verify`](crate::Index::verify).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    /// Index name.
    pub name: String,
    /// Whether the root document exists.
    pub root_present: bool,
    /// Page size recorded in the root.
    pub page_size: usize,
    /// `total_count` recorded in the root.
    pub total_count: u64,
    /// Items actually found on reachable pages.
    pub counted_items: u64,
    /// Reachable pages.
    pub pages: usize,
    /// Reachable pages holding no items.
    pub empty_pages: usize,
    /// Broken invariants, one line each.
    pub violations: Vec<String>,
}

impl IndexReport {
    /// Returns true if no invariant is broken.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }
}
