//! # Docket Testkit
//!
//! Test utilities for docket.
//!
//! This crate provides:
//! - Store fixtures over in-memory and file backends
//! - A fault-injecting backend wrapper
//! - Property-based test generators using proptest
//! - Concurrency stress harnesses
//!
//! ## Usage
//!
//! ```rust
//! use docket_core::Index;
//! use docket_testkit::prelude::*;
//!
//! with_temp_store(|store| {
//!     let index: Index<String> = Index::new(store.clone(), "tags");
//!     index.add("rust".to_string()).unwrap();
//!     assert_eq!(index.count().unwrap(), 1);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fault;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fault::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fault::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
