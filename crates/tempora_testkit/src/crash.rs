//! Crash simulation for write log recovery tests.
//!
//! [`CrashableBackend`] wraps an in-memory backend and cuts writes off at a
//! byte budget, leaving exactly the torn tail a power loss would. Reopening
//! a store on [`CrashableBackend::survivor`] then exercises recovery.
//!
//! ```rust,ignore
//! use tempora_testkit::crash::CrashableBackend;
//!
//! let backend = CrashableBackend::new();
//! let limbo = DurableLimbo::open(Box::new(backend.clone()), &Config::default())?;
//! backend.crash_after(40);
//! // ... inserts fail part way
//! let recovered = DurableLimbo::open(Box::new(backend.survivor()), &Config::default())?;
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempora_storage::{InMemoryBackend, StorageBackend, StorageError, StorageResult};

#[derive(Debug)]
struct CrashPlan {
    budget: AtomicUsize,
    crashed: AtomicBool,
    fail_on_sync: AtomicBool,
}

/// A storage backend that can simulate crashes mid-append.
///
/// Clones share the bytes and the crash plan.
#[derive(Debug, Clone)]
pub struct CrashableBackend {
    inner: InMemoryBackend,
    plan: Arc<CrashPlan>,
}

impl Default for CrashableBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CrashableBackend {
    /// Creates an empty backend that never crashes.
    pub fn new() -> Self {
        Self {
            inner: InMemoryBackend::new(),
            plan: Arc::new(CrashPlan {
                budget: AtomicUsize::new(usize::MAX),
                crashed: AtomicBool::new(false),
                fail_on_sync: AtomicBool::new(false),
            }),
        }
    }

    /// Lets `bytes` more bytes through; the append that crosses the budget
    /// is written partially and fails, and every later append fails.
    pub fn crash_after(&self, bytes: usize) {
        self.plan.budget.store(bytes, Ordering::SeqCst);
    }

    /// Sets whether flush and sync fail.
    pub fn set_fail_on_sync(&self, fail: bool) {
        self.plan.fail_on_sync.store(fail, Ordering::SeqCst);
    }

    /// Returns whether the backend has crashed.
    pub fn has_crashed(&self) -> bool {
        self.plan.crashed.load(Ordering::SeqCst)
    }

    /// The bytes that made it to "disk", as a fresh backend.
    pub fn survivor(&self) -> InMemoryBackend {
        InMemoryBackend::with_data(self.inner.data())
    }

    fn crash(&self, what: &str) -> StorageError {
        self.plan.crashed.store(true, Ordering::SeqCst);
        StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("simulated crash during {what}"),
        ))
    }
}

impl StorageBackend for CrashableBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        if self.has_crashed() {
            return Err(self.crash("append after crash"));
        }
        let budget = self.plan.budget.load(Ordering::SeqCst);
        if data.len() > budget {
            if budget > 0 {
                self.inner.append(&data[..budget])?;
            }
            self.plan.budget.store(0, Ordering::SeqCst);
            return Err(self.crash("partial append"));
        }
        if budget != usize::MAX {
            self.plan.budget.store(budget - data.len(), Ordering::SeqCst);
        }
        self.inner.append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        if self.plan.fail_on_sync.load(Ordering::SeqCst) {
            return Err(self.crash("flush"));
        }
        self.inner.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.plan.fail_on_sync.load(Ordering::SeqCst) {
            return Err(self.crash("sync"));
        }
        self.inner.sync()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.inner.truncate(new_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_operation() {
        let mut backend = CrashableBackend::new();
        backend.append(b"hello").unwrap();
        backend.flush().unwrap();
        assert!(!backend.has_crashed());
        assert_eq!(backend.survivor().data(), b"hello");
    }

    #[test]
    fn crash_leaves_a_torn_tail() {
        let mut backend = CrashableBackend::new();
        backend.append(b"first").unwrap();
        backend.crash_after(3);
        assert!(backend.append(b"second").is_err());
        assert!(backend.has_crashed());
        assert!(backend.append(b"third").is_err());
        assert_eq!(backend.survivor().data(), b"firstsec");
    }

    #[test]
    fn crash_on_sync() {
        let mut backend = CrashableBackend::new();
        backend.set_fail_on_sync(true);
        assert!(backend.sync().is_err());
        assert!(backend.has_crashed());
    }
}
