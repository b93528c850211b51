//! Versioned documents over a transactional backend.

mod store;

pub use store::{CasOutcome, DocTransaction, Document, DocumentStore};
