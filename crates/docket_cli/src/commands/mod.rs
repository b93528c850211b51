//! CLI command implementations.

pub mod compact;
pub mod doc;
pub mod index;
pub mod keys;

use docket_core::DocumentStore;
use docket_storage::FileBackend;
use std::path::Path;
use std::sync::Arc;

/// Result type shared by every command.
pub type CommandResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Opens the log at `path`, which must already exist.
pub fn open_store(path: &Path) -> CommandResult<(Arc<FileBackend>, DocumentStore)> {
    if !path.exists() {
        return Err(format!("No commit log found at {:?}", path).into());
    }
    let backend = Arc::new(FileBackend::open(path)?);
    let store = DocumentStore::new(backend.clone());
    Ok((backend, store))
}

/// Opens the log at `path`, creating it if needed.
pub fn open_or_create_store(path: &Path) -> CommandResult<DocumentStore> {
    let backend = FileBackend::open(path)?;
    Ok(DocumentStore::new(Arc::new(backend)))
}
