//! File-based storage backend on an append-only commit log.

use crate::backend::{KvBackend, KvTransaction, TxnOutcome};
use crate::error::{StorageError, StorageResult};
use crate::memory::{apply_pending, prefixed_keys, OverlayTxn};
use crate::record::{read_frame, Frame, LogOp, LogRecord};
use fs2::FileExt;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Options for opening a [`FileBackend`].
#[derive(Debug, Clone)]
pub struct FileBackendOptions {
    /// Whether to `fsync` after every committed record (safer but slower).
    pub sync_on_commit: bool,
}

impl Default for FileBackendOptions {
    fn default() -> Self {
        Self {
            sync_on_commit: true,
        }
    }
}

impl FileBackendOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to sync on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }
}

#[derive(Debug)]
struct FileState {
    map: BTreeMap<String, Vec<u8>>,
    file: File,
    records: usize,
    /// Length of the committed prefix of the log.
    size: u64,
    /// Set when a failed append could not be rolled back.
    poisoned: bool,
}

/// A durable storage backend.
///
/// Every committed transaction is appended to a single log file as one
/// checksummed record; the live keyspace is rebuilt in memory by
/// replaying the log on open. Reads are served from memory.
///
/// # Durability
///
/// - A transaction is durable once its record is written (and synced
///   when `sync_on_commit` is set)
/// - A torn record at the end of the log is discarded on open
/// - A failed append is cut back off the log before the error is
///   returned; if that fails too, every later write is refused with
///   [`StorageError::Poisoned`] until [`FileBackend::compact`] succeeds
/// - Corruption anywhere else fails the open
///
/// # Locking
///
/// The log file is locked exclusively while the backend is open. A second
/// open of the same path fails with [`StorageError::Locked`].
///
/// # Example
///
/// ```no_run
/// use docket_storage::{FileBackend, KvBackend};
/// use std::path::Path;
///
/// let backend = FileBackend::open(Path::new("store.log")).unwrap();
/// backend.put("k", b"persistent".to_vec()).unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    options: FileBackendOptions,
    state: RwLock<FileState>,
}

impl FileBackend {
    /// Opens or creates a log at `path` with default options.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, is locked by
    /// another handle, or is corrupted.
    pub fn open(path: &Path) -> StorageResult<Self> {
        Self::open_with(path, FileBackendOptions::default())
    }

    /// Opens or creates a log at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, is locked by
    /// another handle, or is corrupted.
    pub fn open_with(path: &Path, options: FileBackendOptions) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.try_lock_exclusive()
            .map_err(|_| StorageError::Locked)?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let (map, records, good_len) = replay(&bytes)?;
        if good_len < bytes.len() {
            tracing::warn!(
                path = %path.display(),
                discarded = bytes.len() - good_len,
                "discarding torn record at end of commit log"
            );
            file.set_len(good_len as u64)?;
            file.sync_all()?;
        }
        file.seek(SeekFrom::End(0))?;

        tracing::info!(
            path = %path.display(),
            records,
            keys = map.len(),
            "opened file backend"
        );

        Ok(Self {
            path: path.to_path_buf(),
            options,
            state: RwLock::new(FileState {
                map,
                file,
                records,
                size: good_len as u64,
                poisoned: false,
            }),
        })
    }

    /// Returns the path to the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the options this backend was opened with.
    #[must_use]
    pub fn options(&self) -> &FileBackendOptions {
        &self.options
    }

    /// Returns the number of records in the log.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.state.read().records
    }

    /// Returns the size of the log in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.state.read().size
    }

    /// Returns the number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().map.len()
    }

    /// Returns true if no keys are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().map.is_empty()
    }

    /// Rewrites the log as a single snapshot record of the live keyspace.
    ///
    /// The snapshot is written to a sibling file and renamed over the log,
    /// so a crash leaves either the old or the new log in place. The
    /// snapshot comes from the in-memory keyspace, so a successful
    /// compaction also clears a poisoned backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written or installed.
    pub fn compact(&self) -> StorageResult<()> {
        let mut state = self.state.write();
        let before = state.size;

        let ops: Vec<LogOp> = state
            .map
            .iter()
            .map(|(key, value)| LogOp::Put {
                key: key.clone(),
                value: value.clone(),
            })
            .collect();
        let bytes = if ops.is_empty() {
            Vec::new()
        } else {
            LogRecord::new(ops).encode()?
        };

        let tmp_path = self.path.with_extension("compact");
        let mut tmp = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        tmp.try_lock_exclusive()
            .map_err(|_| StorageError::Locked)?;
        tmp.write_all(&bytes)?;
        tmp.sync_all()?;
        std::fs::rename(&tmp_path, &self.path)?;
        tmp.seek(SeekFrom::End(0))?;

        state.file = tmp;
        state.records = usize::from(!bytes.is_empty());
        state.size = bytes.len() as u64;
        state.poisoned = false;

        tracing::info!(
            path = %self.path.display(),
            before,
            after = state.size,
            "compacted commit log"
        );
        Ok(())
    }

    fn writable(&self, state: &FileState) -> StorageResult<()> {
        if state.poisoned {
            return Err(StorageError::Poisoned(self.path.display().to_string()));
        }
        Ok(())
    }

    fn append(&self, state: &mut FileState, ops: Vec<LogOp>) -> StorageResult<()> {
        if ops.is_empty() {
            return Ok(());
        }
        self.writable(state)?;
        let bytes = LogRecord::new(ops).encode()?;

        let written = state.file.write_all(&bytes).and_then(|()| {
            if self.options.sync_on_commit {
                state.file.sync_data()
            } else {
                Ok(())
            }
        });
        if let Err(e) = written {
            self.roll_back(state);
            return Err(e.into());
        }

        state.records += 1;
        state.size += bytes.len() as u64;
        Ok(())
    }

    /// Cuts the log back to its committed prefix after a failed append.
    fn roll_back(&self, state: &mut FileState) {
        let size = state.size;
        let restored = state
            .file
            .set_len(size)
            .and_then(|()| state.file.seek(SeekFrom::Start(size)))
            .and_then(|_| state.file.sync_data());

        match restored {
            Ok(()) => tracing::warn!(
                path = %self.path.display(),
                size,
                "rolled back failed append"
            ),
            Err(e) => {
                state.poisoned = true;
                tracing::error!(
                    path = %self.path.display(),
                    size,
                    error = %e,
                    "could not roll back failed append; refusing further writes"
                );
            }
        }
    }
}

/// Replays `bytes`, returning the keyspace, the record count and the
/// length of the valid prefix.
fn replay(bytes: &[u8]) -> StorageResult<(BTreeMap<String, Vec<u8>>, usize, usize)> {
    let mut map = BTreeMap::new();
    let mut records = 0;
    let mut offset = 0;

    while offset < bytes.len() {
        match read_frame(&bytes[offset..])? {
            Frame::Record { record, len } => {
                for op in record.ops {
                    match op {
                        LogOp::Put { key, value } => {
                            map.insert(key, value);
                        }
                        LogOp::Delete { key } => {
                            map.remove(&key);
                        }
                    }
                }
                records += 1;
                offset += len;
            }
            Frame::Incomplete => break,
            Frame::BadChecksum { len } => {
                if offset + len < bytes.len() {
                    return Err(StorageError::Corrupted(format!(
                        "checksum mismatch in record at offset {offset}"
                    )));
                }
                break;
            }
        }
    }

    Ok((map, records, offset))
}

impl KvBackend for FileBackend {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.state.read().map.get(key).cloned())
    }

    fn put(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        let mut state = self.state.write();
        self.append(
            &mut state,
            vec![LogOp::Put {
                key: key.to_string(),
                value: value.clone(),
            }],
        )?;
        state.map.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        let mut state = self.state.write();
        self.writable(&state)?;
        if !state.map.contains_key(key) {
            return Ok(false);
        }
        self.append(
            &mut state,
            vec![LogOp::Delete {
                key: key.to_string(),
            }],
        )?;
        state.map.remove(key);
        Ok(true)
    }

    fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(prefixed_keys(&self.state.read().map, prefix))
    }

    fn transaction(
        &self,
        body: &mut dyn FnMut(&mut dyn KvTransaction) -> TxnOutcome,
    ) -> StorageResult<()> {
        let mut state = self.state.write();
        self.writable(&state)?;
        let (outcome, pending) = {
            let mut txn = OverlayTxn::new(&state.map);
            let outcome = body(&mut txn);
            (outcome, txn.into_pending())
        };

        if outcome == TxnOutcome::Abort || pending.is_empty() {
            return Ok(());
        }

        let ops = pending
            .iter()
            .map(|(key, value)| match value {
                Some(value) => LogOp::Put {
                    key: key.clone(),
                    value: value.clone(),
                },
                None => LogOp::Delete { key: key.clone() },
            })
            .collect();
        self.append(&mut state, ops)?;
        apply_pending(&mut state.map, pending);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_data_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");

        {
            let backend = FileBackend::open(&path).unwrap();
            backend.put("a", b"1".to_vec()).unwrap();
            backend.put("b", b"2".to_vec()).unwrap();
            assert!(backend.delete("a").unwrap());
            assert_eq!(backend.record_count(), 3);
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.get("a").unwrap(), None);
        assert_eq!(backend.get("b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(backend.record_count(), 3);
    }

    #[test]
    fn file_transaction_is_one_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");

        {
            let backend = FileBackend::open(&path).unwrap();
            backend
                .transaction(&mut |txn| {
                    txn.put("x", b"1".to_vec()).unwrap();
                    txn.put("y", b"2".to_vec()).unwrap();
                    TxnOutcome::Commit
                })
                .unwrap();
            backend
                .transaction(&mut |txn| {
                    txn.put("z", b"3".to_vec()).unwrap();
                    TxnOutcome::Abort
                })
                .unwrap();
            assert_eq!(backend.record_count(), 1);
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.keys_with_prefix("").unwrap(), vec!["x", "y"]);
    }

    #[test]
    fn file_delete_missing_writes_nothing() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(&dir.path().join("store.log")).unwrap();
        assert!(!backend.delete("missing").unwrap());
        assert_eq!(backend.record_count(), 0);
        assert_eq!(backend.size(), 0);
    }

    #[test]
    fn file_second_open_is_locked() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");
        let _first = FileBackend::open(&path).unwrap();
        assert!(matches!(
            FileBackend::open(&path),
            Err(StorageError::Locked)
        ));
    }

    #[test]
    fn file_torn_tail_is_discarded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");

        let good_len = {
            let backend = FileBackend::open(&path).unwrap();
            backend.put("a", b"1".to_vec()).unwrap();
            backend.size()
        };

        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(b"DKTL\x40\x00").unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.get("a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(backend.size(), good_len);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), good_len);
    }

    #[test]
    fn file_bad_checksum_on_last_record_is_discarded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");

        {
            let backend = FileBackend::open(&path).unwrap();
            backend.put("a", b"1".to_vec()).unwrap();
            backend.put("b", b"2".to_vec()).unwrap();
        }

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.get("a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(backend.get("b").unwrap(), None);
        assert_eq!(backend.record_count(), 1);
    }

    #[test]
    fn file_corruption_before_tail_fails_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");

        let first_len = {
            let backend = FileBackend::open(&path).unwrap();
            backend.put("a", b"1".to_vec()).unwrap();
            let first = backend.size();
            backend.put("b", b"2".to_vec()).unwrap();
            first
        };

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[first_len as usize - 1] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            FileBackend::open(&path),
            Err(StorageError::Corrupted(_))
        ));
    }

    #[test]
    fn file_compact_keeps_live_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");

        {
            let backend = FileBackend::open(&path).unwrap();
            for i in 0..10u8 {
                backend.put("counter", vec![i]).unwrap();
            }
            backend.put("other", b"x".to_vec()).unwrap();
            backend.delete("other").unwrap();
            let before = backend.size();

            backend.compact().unwrap();
            assert_eq!(backend.record_count(), 1);
            assert!(backend.size() < before);

            backend.put("after", b"y".to_vec()).unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.get("counter").unwrap(), Some(vec![9]));
        assert_eq!(backend.get("other").unwrap(), None);
        assert_eq!(backend.get("after").unwrap(), Some(b"y".to_vec()));
        assert_eq!(backend.record_count(), 2);
    }

    #[test]
    fn file_torn_append_is_cut_before_next_commit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");

        {
            let backend = FileBackend::open(&path).unwrap();
            backend.put("a", b"1".to_vec()).unwrap();
            let committed = backend.size();

            // Half a record left behind by a write that failed midway.
            let mut torn = OpenOptions::new().append(true).open(&path).unwrap();
            torn.write_all(b"DKTL\xff\x00\x00\x00partial").unwrap();
            drop(torn);

            backend.roll_back(&mut backend.state.write());
            assert_eq!(std::fs::metadata(&path).unwrap().len(), committed);

            backend.put("c", b"3".to_vec()).unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.get("a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(backend.get("c").unwrap(), Some(b"3".to_vec()));
        assert_eq!(backend.record_count(), 2);
    }

    #[test]
    fn file_unrecoverable_append_poisons_until_compaction() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");

        {
            let backend = FileBackend::open(&path).unwrap();
            backend.put("a", b"1".to_vec()).unwrap();

            // A handle that can neither write nor truncate.
            let writable = std::mem::replace(
                &mut backend.state.write().file,
                File::open(&path).unwrap(),
            );
            drop(writable);

            assert!(matches!(
                backend.put("b", b"2".to_vec()),
                Err(StorageError::Io(_))
            ));
            assert_eq!(backend.get("b").unwrap(), None);
            assert!(matches!(
                backend.put("c", b"3".to_vec()),
                Err(StorageError::Poisoned(_))
            ));
            assert!(matches!(
                backend.delete("a"),
                Err(StorageError::Poisoned(_))
            ));
            assert!(matches!(
                backend.transaction(&mut |_| TxnOutcome::Commit),
                Err(StorageError::Poisoned(_))
            ));

            backend.compact().unwrap();
            backend.put("d", b"4".to_vec()).unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.keys_with_prefix("").unwrap(), vec!["a", "d"]);
    }

    #[test]
    fn file_options_builder() {
        let options = FileBackendOptions::new().sync_on_commit(false);
        assert!(!options.sync_on_commit);
        assert!(FileBackendOptions::default().sync_on_commit);
    }
}
