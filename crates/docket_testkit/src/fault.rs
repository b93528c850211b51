//! Fault injection.
//!
//! [`FlakyBackend`] wraps a real backend and refuses scheduled
//! transactions, by default with [`StorageError::Conflict`], the error a
//! contended backend would report. Refused transactions never run their
//! body.

use docket_storage::{KvBackend, KvTransaction, StorageError, StorageResult, TxnOutcome};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// The error a refused transaction reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fault {
    /// A transient conflict, [`StorageError::Conflict`].
    #[default]
    Conflict,
    /// A disk failure, [`StorageError::Io`].
    Io,
}

impl Fault {
    fn error(self, attempt: usize) -> StorageError {
        match self {
            Self::Conflict => {
                StorageError::Conflict(format!("injected failure on transaction {attempt}"))
            }
            Self::Io => StorageError::Io(std::io::Error::other(format!(
                "injected failure on transaction {attempt}"
            ))),
        }
    }
}

/// A backend whose transactions fail on a schedule.
///
/// The schedule is a queue of verdicts consumed one per transaction:
/// `true` refuses the transaction, `false` lets it through. Once the queue
/// is empty every transaction passes. Plain reads and writes outside a
/// transaction are never refused.
///
/// ```rust
/// use docket_storage::{InMemoryBackend, KvBackend, TxnOutcome};
/// use docket_testkit::FlakyBackend;
/// use std::sync::Arc;
///
/// let flaky = FlakyBackend::new(Arc::new(InMemoryBackend::new()));
/// flaky.fail_next_transactions(1);
///
/// assert!(flaky.transaction(&mut |_| TxnOutcome::Commit).is_err());
/// assert!(flaky.transaction(&mut |_| TxnOutcome::Commit).is_ok());
/// assert_eq!(flaky.transactions(), 2);
/// assert_eq!(flaky.injected_failures(), 1);
/// ```
pub struct FlakyBackend {
    inner: Arc<dyn KvBackend>,
    schedule: Mutex<VecDeque<bool>>,
    fault: Mutex<Fault>,
    transactions: AtomicUsize,
    failures: AtomicUsize,
}

impl FlakyBackend {
    /// Wraps `inner` with an empty schedule.
    pub fn new(inner: Arc<dyn KvBackend>) -> Self {
        Self {
            inner,
            schedule: Mutex::new(VecDeque::new()),
            fault: Mutex::new(Fault::default()),
            transactions: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        }
    }

    /// Refuses the next `n` transactions.
    pub fn fail_next_transactions(&self, n: usize) {
        self.script(std::iter::repeat_n(true, n));
    }

    /// Lets `skip` transactions through, then refuses `n`.
    pub fn fail_after(&self, skip: usize, n: usize) {
        self.script(
            std::iter::repeat_n(false, skip).chain(std::iter::repeat_n(true, n)),
        );
    }

    /// Replaces the schedule with `verdicts` (`true` refuses).
    pub fn script(&self, verdicts: impl IntoIterator<Item = bool>) {
        *self.schedule.lock() = verdicts.into_iter().collect();
    }

    /// Sets the error reported by refused transactions.
    pub fn set_fault(&self, fault: Fault) {
        *self.fault.lock() = fault;
    }

    /// Drops any remaining scheduled failures.
    pub fn heal(&self) {
        self.schedule.lock().clear();
    }

    /// Number of transactions attempted, refused ones included.
    pub fn transactions(&self) -> usize {
        self.transactions.load(Ordering::SeqCst)
    }

    /// Number of transactions refused so far.
    pub fn injected_failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    /// Returns the wrapped backend.
    pub fn inner(&self) -> &Arc<dyn KvBackend> {
        &self.inner
    }
}

impl KvBackend for FlakyBackend {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn put(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        self.inner.put(key, value)
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        self.inner.delete(key)
    }

    fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.inner.keys_with_prefix(prefix)
    }

    fn transaction(
        &self,
        body: &mut dyn FnMut(&mut dyn KvTransaction) -> TxnOutcome,
    ) -> StorageResult<()> {
        let attempt = self.transactions.fetch_add(1, Ordering::SeqCst) + 1;
        let refuse = self.schedule.lock().pop_front().unwrap_or(false);
        if refuse {
            self.failures.fetch_add(1, Ordering::SeqCst);
            let fault = *self.fault.lock();
            tracing::debug!(attempt, ?fault, "injecting transaction failure");
            return Err(fault.error(attempt));
        }
        self.inner.transaction(body)
    }
}
