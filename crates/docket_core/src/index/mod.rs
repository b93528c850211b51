//! Paginated linked-list indexes.
//!
//! An index is a root document plus a singly linked chain of page
//! documents, all stored in the same keyspace as the entities they list:
//!
//! ```text
//! index:<name>                 root  {head, tail, total_count, name, page_size}
//! index:<name>:node:<page id>  page  {items, next}
//! ```
//!
//! Appends fill the tail page and link new pages one short transaction at
//! a time. Removal rewrites pages in place and never unlinks a page, so a
//! chain may contain empty pages until the index is cleared.

mod keys;
mod list;
mod page;
mod scan;

pub use list::Index;
pub use page::{IndexPage, IndexReport, IndexRoot, PageSummary};
pub use scan::IndexScan;
