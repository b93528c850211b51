//! Store fixtures and helpers.
//!
//! Provides ready-made document stores over the in-memory and file
//! backends, with temporary directories cleaned up on drop.

use crate::fault::FlakyBackend;
use docket_core::{DocumentStore, StoreConfig};
use docket_storage::{FileBackend, InMemoryBackend, KvBackend};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A test document store with automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: DocumentStore,
    path: Option<PathBuf>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates a store over a fresh in-memory backend.
    pub fn memory() -> Self {
        Self::memory_with(StoreConfig::default())
    }

    /// Creates an in-memory store with `config`.
    pub fn memory_with(config: StoreConfig) -> Self {
        Self {
            store: DocumentStore::with_config(Arc::new(InMemoryBackend::new()), config),
            path: None,
            _temp_dir: None,
        }
    }

    /// Creates a store over a file backend in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("docket.log");
        let backend = FileBackend::open(&path).expect("Failed to open file backend");

        Self {
            store: DocumentStore::new(Arc::new(backend)),
            path: Some(path),
            _temp_dir: Some(temp_dir),
        }
    }

    /// Creates an in-memory store behind a [`FlakyBackend`], returning
    /// the wrapper so the test can schedule failures.
    pub fn flaky(config: StoreConfig) -> (Self, Arc<FlakyBackend>) {
        let flaky = Arc::new(FlakyBackend::new(Arc::new(InMemoryBackend::new())));
        let backend: Arc<dyn KvBackend> = flaky.clone();
        let fixture = Self {
            store: DocumentStore::with_config(backend, config),
            path: None,
            _temp_dir: None,
        };
        (fixture, flaky)
    }

    /// Returns the log file path if file-based, None if in-memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl std::ops::Deref for TestStore {
    type Target = DocumentStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Runs a test with a temporary in-memory store.
///
/// # Example
///
/// ```rust
/// use docket_testkit::with_temp_store;
///
/// with_temp_store(|store| {
///     assert!(!store.has("missing").unwrap());
/// });
/// ```
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&DocumentStore) -> R,
{
    let test_store = TestStore::memory();
    f(&test_store.store)
}

/// Runs a test with a temporary file-backed store.
pub fn with_file_store<F, R>(f: F) -> R
where
    F: FnOnce(&DocumentStore, &Path) -> R,
{
    let test_store = TestStore::file();
    let path = test_store
        .path()
        .expect("File store should have a path")
        .to_path_buf();
    f(&test_store.store, &path)
}

/// Installs a `tracing` subscriber that writes through the test harness.
///
/// Honours `RUST_LOG`. Safe to call from every test; only the first call
/// installs anything.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
