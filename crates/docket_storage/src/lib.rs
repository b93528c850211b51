//! # Docket Storage
//!
//! Transactional key-value backends for docket.
//!
//! This crate provides the lowest-level storage abstraction. Backends are
//! **opaque byte stores** keyed by strings - they do not interpret the
//! values they hold. Versioning, documents and indexes live in
//! `docket_core`.
//!
//! ## Design Principles
//!
//! - Backends expose `get`, `put`, `delete` and a `transaction` primitive
//! - A transaction body either commits all of its writes or none of them
//! - Transactions are isolated from each other (serializable)
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral storage
//! - [`FileBackend`] - Durable storage on an append-only commit log
//!
//! ## Example
//!
//! ```rust
//! use docket_storage::{InMemoryBackend, KvBackend, TxnOutcome};
//!
//! let backend = InMemoryBackend::new();
//! backend.put("greeting", b"hello".to_vec()).unwrap();
//!
//! backend
//!     .transaction(&mut |txn| {
//!         let mut next = txn.get("greeting").ok().flatten().unwrap_or_default();
//!         next.extend_from_slice(b" world");
//!         let _ = txn.put("greeting", next);
//!         TxnOutcome::Commit
//!     })
//!     .unwrap();
//!
//! assert_eq!(backend.get("greeting").unwrap().unwrap(), b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod checksum;
mod error;
mod file;
mod memory;
mod record;

pub use backend::{KvBackend, KvTransaction, TxnOutcome};
pub use checksum::compute_crc32;
pub use error::{StorageError, StorageResult};
pub use file::{FileBackend, FileBackendOptions};
pub use memory::InMemoryBackend;
pub use record::{LogOp, LogRecord, RECORD_HEADER_SIZE, RECORD_MAGIC};
