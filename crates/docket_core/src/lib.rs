//! # Docket Core
//!
//! Optimistic-concurrency documents and paginated indexes over a
//! transactional key-value backend.
//!
//! This crate provides:
//! - [`DocumentStore`]: versioned documents with compare-and-swap writes
//! - [`Entity`]: a typed document with load/mutate/save and bounded retry
//! - [`Index`]: a named, paginated linked list of items
//! - [`IndexedEntity`]: entities whose creation and deletion are mirrored
//!   into an index for enumeration
//!
//! ## Keyspace
//!
//! All types share one keyspace:
//!
//! | Key                          | Holds                   |
//! |------------------------------|-------------------------|
//! | `<entity>:<id>`              | an entity document      |
//! | `index:<name>`               | an index root           |
//! | `index:<name>:node:<page>`   | one page of an index    |
//!
//! ## Example
//!
//! ```rust
//! use docket_core::{DocumentStore, Index};
//! use docket_storage::InMemoryBackend;
//! use std::sync::Arc;
//!
//! let store = DocumentStore::new(Arc::new(InMemoryBackend::new()));
//! let index: Index<String> = Index::with_page_size(store, "users", 2);
//!
//! index.add_batch(&["a".to_string(), "b".into(), "c".into()]).unwrap();
//! assert_eq!(index.list().unwrap(), vec!["a", "b", "c"]);
//! assert_eq!(index.pages().unwrap().len(), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod config;
mod document;
mod entity;
mod error;
mod index;
mod indexed;

pub use codec::{decode, encode, merge_fields};
pub use config::StoreConfig;
pub use document::{CasOutcome, DocTransaction, Document, DocumentStore};
pub use entity::{Entity, EntityKind};
pub use error::{CoreError, CoreResult};
pub use index::{Index, IndexPage, IndexReport, IndexRoot, IndexScan, PageSummary};
pub use indexed::{Identified, IndexedEntity, IndexedKind, ReconcileReport};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
