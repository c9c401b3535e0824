//! Engine facade: a buffer Limbo in front of a permanent store.
//!
//! Writes land in the buffer; transport moves them into the permanent store
//! in version order. Reads replay the permanent store's writes for the
//! record or key in question into a prior context and let the buffer replay
//! its newer writes on top.
//!
//! ```text
//!  add/remove/set ──► buffer (Limbo) ──transport──► permanent store
//!                        │                               │
//!  read ◄── buffer.read_with(t, ◄── replay(record/key writes, t)
//! ```
//!
//! An engine-level gate serializes mutations and per-write transport steps
//! against merged reads, so no read sees half a commit or a write counted
//! in both stores.

pub(crate) mod mutate;
mod transporter;

pub use transporter::Transporter;

use crate::clock::VersionClock;
use crate::config::Config;
use crate::dir::EngineDir;
use crate::error::CoreResult;
use crate::limbo::{
    AuditLog, BrowseContext, Chronology, DurableLimbo, InMemoryLimbo, Limbo, RecordContext,
    RecordValues, Replay,
};
use crate::operator::Criterion;
use crate::permanent::{IndexedStore, PermanentStore};
use crate::search::SearchQuery;
use crate::tokens::TokenRegistry;
use crate::transaction::Transaction;
use crate::types::{RecordId, TransactionId, Version};
use crate::write::{Action, Key, Write};
use mutate::Mutable;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tempora_codec::Value;
use tempora_storage::FileBackend;

/// The shared storage engine.
///
/// Cheap to clone; clones share the same buffer, store and token registry.
///
/// ```rust,ignore
/// use tempora_core::Engine;
///
/// let engine = Engine::open_in_memory()?;
/// engine.add("name", "jeff", 1)?;
/// assert!(engine.verify("name", &"jeff".into(), 1));
///
/// let mut txn = engine.begin();
/// txn.set("name", "jeffery", 1)?;
/// txn.commit()?;
/// ```
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

pub(crate) struct EngineInner {
    config: Config,
    buffer: Box<dyn Limbo>,
    store: Box<dyn PermanentStore>,
    registry: Arc<TokenRegistry>,
    clock: VersionClock,
    gate: RwLock<()>,
    transport_lock: Mutex<()>,
    next_txn: AtomicU64,
    dir: Option<EngineDir>,
}

impl Engine {
    /// Opens (or creates) an engine in the directory at `path`.
    ///
    /// Staged writes in `buffer.log` and accepted writes in `archive.log`
    /// are recovered.
    ///
    /// # Errors
    ///
    /// - [`crate::CoreError::EngineLocked`] if another handle has the
    ///   directory open
    /// - [`crate::CoreError::NotFound`] if the directory is missing and
    ///   `create_if_missing` is off
    /// - log corruption or I/O errors from recovery
    pub fn open(path: &Path, config: Config) -> CoreResult<Self> {
        let dir = EngineDir::open(path, config.create_if_missing)?;
        let buffer = DurableLimbo::open(
            Box::new(FileBackend::open(&dir.buffer_path())?),
            &config,
        )?;
        let store = IndexedStore::open(Box::new(FileBackend::open(&dir.archive_path())?))?;
        let archived = store.len();
        let engine = Self::assemble(config, Box::new(buffer), Box::new(store), Some(dir))?;
        tracing::info!(
            path = %path.display(),
            buffered = engine.buffered(),
            archived,
            "engine opened"
        );
        Ok(engine)
    }

    /// Assembles an engine from caller-supplied stores.
    ///
    /// # Errors
    ///
    /// Returns an error if writes the permanent store already holds cannot
    /// be dropped from the buffer.
    pub fn open_with(
        config: Config,
        buffer: Box<dyn Limbo>,
        store: Box<dyn PermanentStore>,
    ) -> CoreResult<Self> {
        Self::assemble(config, buffer, store, None)
    }

    /// Opens a volatile engine.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the signature matches the other openers.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open_with(
            Config::default(),
            Box::new(InMemoryLimbo::new()),
            Box::new(IndexedStore::new()),
        )
    }

    fn assemble(
        config: Config,
        buffer: Box<dyn Limbo>,
        store: Box<dyn PermanentStore>,
        dir: Option<EngineDir>,
    ) -> CoreResult<Self> {
        // A crash between accept and the buffer's consume leaves a write in
        // both stores.
        if let Some(archived) = store.newest_version() {
            let mut dropped = 0usize;
            while buffer.front().is_some_and(|w| w.version() <= archived) {
                buffer.pop_front()?;
                dropped += 1;
            }
            if dropped > 0 {
                tracing::warn!(dropped, "dropped buffered writes already archived");
            }
        }
        let floor = buffer
            .newest_version()
            .max(store.newest_version())
            .unwrap_or(Version::MIN);

        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                buffer,
                store,
                registry: Arc::new(TokenRegistry::new()),
                clock: VersionClock::starting_after(floor),
                gate: RwLock::new(()),
                transport_lock: Mutex::new(()),
                next_txn: AtomicU64::new(1),
                dir,
            }),
        })
    }

    /// The configuration the engine was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The engine directory, if the engine is persistent.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.inner.dir.as_ref().map(EngineDir::path)
    }

    /// Number of writes waiting for transport.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.inner.buffer.len()
    }

    /// The registry transactions record their interest in.
    #[must_use]
    pub fn registry(&self) -> &Arc<TokenRegistry> {
        &self.inner.registry
    }

    /// Starts a transaction.
    #[must_use]
    pub fn begin(&self) -> Transaction {
        let id = TransactionId::new(self.inner.next_txn.fetch_add(1, Ordering::Relaxed));
        Transaction::new(id, self.clone())
    }

    /// Makes every buffered and accepted write durable.
    ///
    /// # Errors
    ///
    /// Returns an error if either log cannot be synced.
    pub fn sync(&self) -> CoreResult<()> {
        self.inner.sync()
    }

    /// Transports every buffered write into the permanent store.
    ///
    /// # Errors
    ///
    /// Stops at the first write the store refuses; it and everything after
    /// it stay buffered.
    pub fn transport(&self) -> CoreResult<usize> {
        self.inner.transport_batch(usize::MAX)
    }

    /// Starts a background thread that keeps the buffer drained.
    ///
    /// The thread stops when the returned handle is stopped or dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn start_transporter(&self) -> CoreResult<Transporter> {
        Transporter::spawn(Arc::clone(&self.inner))
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// value -> records for `key` now.
    #[must_use]
    pub fn browse(&self, key: &str) -> BrowseContext {
        self.browse_at(key, Version::LATEST)
    }

    /// value -> records for `key` at `timestamp`.
    #[must_use]
    pub fn browse_at(&self, key: &str, timestamp: Version) -> BrowseContext {
        let _gate = self.inner.gate.read();
        self.inner.browse_at(key, timestamp)
    }

    /// Keys populated in `record` now.
    #[must_use]
    pub fn describe(&self, record: RecordId) -> BTreeSet<Key> {
        self.describe_at(record, Version::LATEST)
    }

    /// Keys populated in `record` at `timestamp`.
    #[must_use]
    pub fn describe_at(&self, record: RecordId, timestamp: Version) -> BTreeSet<Key> {
        self.select_record_at(record, timestamp).into_keys().collect()
    }

    /// key -> values in `record` now.
    #[must_use]
    pub fn select_record(&self, record: RecordId) -> RecordContext {
        self.select_record_at(record, Version::LATEST)
    }

    /// key -> values in `record` at `timestamp`.
    #[must_use]
    pub fn select_record_at(&self, record: RecordId, timestamp: Version) -> RecordContext {
        let _gate = self.inner.gate.read();
        self.inner.select_record_at(record, timestamp)
    }

    /// Values of `key` in `record` now.
    #[must_use]
    pub fn select(&self, key: &str, record: RecordId) -> BTreeSet<Value> {
        self.select_at(key, record, Version::LATEST)
    }

    /// Values of `key` in `record` at `timestamp`.
    #[must_use]
    pub fn select_at(&self, key: &str, record: RecordId, timestamp: Version) -> BTreeSet<Value> {
        let _gate = self.inner.gate.read();
        self.inner.select_at(key, record, timestamp)
    }

    /// record -> values of `key` satisfying `criterion` now.
    #[must_use]
    pub fn explore(&self, key: &str, criterion: &Criterion) -> RecordValues {
        self.explore_at(key, criterion, Version::LATEST)
    }

    /// record -> values of `key` satisfying `criterion` at `timestamp`.
    #[must_use]
    pub fn explore_at(&self, key: &str, criterion: &Criterion, timestamp: Version) -> RecordValues {
        let _gate = self.inner.gate.read();
        let prior = self
            .inner
            .store
            .key_writes(key)
            .as_slice()
            .explore_at(key, criterion, timestamp);
        self.inner
            .buffer
            .explore_with(key, criterion, timestamp, prior)
    }

    /// Whether `key` maps to `value` in `record` now.
    #[must_use]
    pub fn verify(&self, key: &str, value: &Value, record: RecordId) -> bool {
        self.verify_at(key, value, record, Version::LATEST)
    }

    /// Whether `key` maps to `value` in `record` at `timestamp`.
    #[must_use]
    pub fn verify_at(&self, key: &str, value: &Value, record: RecordId, timestamp: Version) -> bool {
        let _gate = self.inner.gate.read();
        let prior = self
            .inner
            .store
            .record_writes(record)
            .as_slice()
            .verify_at(key, value, record, timestamp);
        let mapping = Write::add(key, value.clone(), record, timestamp);
        self.inner.buffer.verify_with(&mapping, timestamp, prior)
    }

    /// Every write ever made to `record`, by version.
    #[must_use]
    pub fn audit(&self, record: RecordId) -> AuditLog {
        let _gate = self.inner.gate.read();
        let prior = self.inner.store.record_writes(record).as_slice().audit(record);
        self.inner.buffer.audit_with(record, prior)
    }

    /// Every write ever made to `key` in `record`, by version.
    #[must_use]
    pub fn audit_key(&self, key: &str, record: RecordId) -> AuditLog {
        let _gate = self.inner.gate.read();
        let prior = self
            .inner
            .store
            .record_writes(record)
            .as_slice()
            .audit_key(key, record);
        self.inner.buffer.audit_key_with(key, record, prior)
    }

    /// Snapshots of `key` in `record` after each write ever made to it.
    #[must_use]
    pub fn chronologize(&self, key: &str, record: RecordId) -> Chronology {
        let _gate = self.inner.gate.read();
        let prior = self
            .inner
            .store
            .record_writes(record)
            .as_slice()
            .chronologize(key, record);
        self.inner.buffer.chronologize_with(key, record, prior)
    }

    /// Whether `record` currently holds any data.
    #[must_use]
    pub fn ping(&self, record: RecordId) -> bool {
        !self.select_record(record).is_empty()
    }

    /// Whether any write ever mentioned `record`.
    #[must_use]
    pub fn contains(&self, record: RecordId) -> bool {
        let _gate = self.inner.gate.read();
        !self.inner.store.record_writes(record).is_empty() || self.inner.buffer.contains(record)
    }

    /// Records whose current text value for `key` matches `query`, in
    /// ascending record order.
    #[must_use]
    pub fn search(&self, key: &str, query: &str) -> BTreeSet<RecordId> {
        self.search_values(key, &SearchQuery::new(query))
            .into_keys()
            .collect()
    }

    pub(crate) fn search_values(&self, key: &str, query: &SearchQuery) -> RecordValues {
        let _gate = self.inner.gate.read();
        let prior = self.inner.store.key_writes(key).as_slice().search_with(
            key,
            query,
            RecordValues::new(),
        );
        self.inner.buffer.search_with(key, query, prior)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Adds `value` to `key` in `record`. Returns false if it was already
    /// there.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty or the buffer cannot log the
    /// write.
    pub fn add(&self, key: &str, value: impl Into<Value>, record: RecordId) -> CoreResult<bool> {
        let value = value.into();
        self.mutate(|t| mutate::add(t, key, value, record))
    }

    /// Removes `value` from `key` in `record`. Returns false if it was not
    /// there.
    ///
    /// # Errors
    ///
    /// Same as [`Engine::add`].
    pub fn remove(&self, key: &str, value: impl Into<Value>, record: RecordId) -> CoreResult<bool> {
        let value = value.into();
        self.mutate(|t| mutate::remove(t, key, value, record))
    }

    /// Makes `value` the only value of `key` in `record`.
    ///
    /// # Errors
    ///
    /// Same as [`Engine::add`].
    pub fn set(&self, key: &str, value: impl Into<Value>, record: RecordId) -> CoreResult<()> {
        let value = value.into();
        self.mutate(|t| mutate::set(t, key, value, record).map(|_| ()))
    }

    /// Removes every value of `key` in `record`, returning how many.
    ///
    /// # Errors
    ///
    /// Same as [`Engine::add`].
    pub fn clear_key(&self, key: &str, record: RecordId) -> CoreResult<usize> {
        self.mutate(|t| mutate::clear_key(t, key, record))
    }

    /// Removes every value of every key in `record`, returning how many.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer cannot log a write.
    pub fn clear_record(&self, record: RecordId) -> CoreResult<usize> {
        self.mutate(|t| mutate::clear_record(t, record))
    }

    /// Atomically replaces `expected` with `replacement` in `key` of
    /// `record`. Returns false, changing nothing, unless `expected` is
    /// present and `replacement` is not.
    ///
    /// # Errors
    ///
    /// Same as [`Engine::add`].
    pub fn verify_and_swap(
        &self,
        key: &str,
        expected: impl Into<Value>,
        record: RecordId,
        replacement: impl Into<Value>,
    ) -> CoreResult<bool> {
        let expected = expected.into();
        let replacement = replacement.into();
        self.mutate(|t| mutate::verify_and_swap(t, key, expected, record, replacement))
    }

    /// Brings `key` in `record` back to its values at `timestamp`,
    /// returning how many writes that took.
    ///
    /// # Errors
    ///
    /// Same as [`Engine::add`].
    pub fn revert(&self, key: &str, record: RecordId, timestamp: Version) -> CoreResult<usize> {
        self.mutate(|t| mutate::revert(t, key, record, timestamp))
    }

    /// Atomically ensures `value` is the only value of `key` in `record`.
    /// Returns false if that already held.
    ///
    /// # Errors
    ///
    /// Same as [`Engine::add`].
    pub fn verify_or_set(
        &self,
        key: &str,
        value: impl Into<Value>,
        record: RecordId,
    ) -> CoreResult<bool> {
        let value = value.into();
        self.mutate(|t| mutate::set(t, key, value, record))
    }

    fn mutate<T>(&self, op: impl FnOnce(&mut Direct<'_>) -> CoreResult<T>) -> CoreResult<T> {
        let _gate = self.inner.gate.write();
        let mut direct = Direct {
            inner: &self.inner,
            staged: Vec::new(),
        };
        let result = op(&mut direct)?;
        self.inner.publish(direct.staged, None)?;
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Transaction support
    // ------------------------------------------------------------------

    pub(crate) fn next_version(&self) -> Version {
        self.inner.clock.next()
    }

    /// Publishes a transaction's writes once `check` passes, all under the
    /// gate.
    pub(crate) fn commit_writes(
        &self,
        source: TransactionId,
        writes: Vec<Write>,
        check: impl FnOnce() -> CoreResult<()>,
    ) -> CoreResult<usize> {
        let _gate = self.inner.gate.write();
        check()?;
        self.inner.publish(writes, Some(source))
    }
}

impl EngineInner {
    fn browse_at(&self, key: &str, timestamp: Version) -> BrowseContext {
        let prior = self.store.key_writes(key).as_slice().browse_at(key, timestamp);
        self.buffer.browse_with(key, timestamp, prior)
    }

    fn select_record_at(&self, record: RecordId, timestamp: Version) -> RecordContext {
        let prior = self
            .store
            .record_writes(record)
            .as_slice()
            .select_record_at(record, timestamp);
        self.buffer.select_record_with(record, timestamp, prior)
    }

    fn select_at(&self, key: &str, record: RecordId, timestamp: Version) -> BTreeSet<Value> {
        let prior = self
            .store
            .record_writes(record)
            .as_slice()
            .select_at(key, record, timestamp);
        self.buffer.select_with(key, record, timestamp, prior)
    }

    /// Stamps, buffers and announces `writes` as one unit: if the buffer
    /// refuses them, none is visible and nothing is announced. Callers hold
    /// the gate.
    fn publish(&self, writes: Vec<Write>, source: Option<TransactionId>) -> CoreResult<usize> {
        if writes.is_empty() {
            return Ok(0);
        }
        let stamped: Vec<Write> = writes
            .into_iter()
            .map(|write| write.restamped(self.clock.next()))
            .collect();
        let tokens: Vec<_> = stamped.iter().flat_map(Write::tokens).collect();
        let count = stamped.len();
        self.buffer.insert_all(stamped, self.config.sync_on_insert)?;
        for token in &tokens {
            self.registry.announce(token, source);
        }
        Ok(count)
    }

    fn transport_batch(&self, limit: usize) -> CoreResult<usize> {
        let _transport = self.transport_lock.lock();
        let mut moved = 0;
        while moved < limit {
            let _gate = self.gate.write();
            match self
                .buffer
                .transport_one(self.store.as_ref(), self.config.sync_on_transport)?
            {
                Some(_) => moved += 1,
                None => break,
            }
        }
        if moved > 0 {
            tracing::debug!(moved, remaining = self.buffer.len(), "transport run");
        }
        Ok(moved)
    }

    fn sync(&self) -> CoreResult<()> {
        self.buffer.sync()?;
        self.store.sync()
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        if let Err(e) = self.sync() {
            tracing::warn!(error = %e, "final sync failed");
        }
        tracing::info!(buffered = self.buffer.len(), "engine closed");
    }
}

/// Direct engine writes, staged under the gate and published together.
struct Direct<'a> {
    inner: &'a EngineInner,
    staged: Vec<Write>,
}

impl Mutable for Direct<'_> {
    fn values_at(&self, key: &str, record: RecordId, timestamp: Version) -> BTreeSet<Value> {
        self.inner.select_at(key, record, timestamp)
    }

    fn current_record(&self, record: RecordId) -> RecordContext {
        self.inner.select_record_at(record, Version::LATEST)
    }

    fn stage(&mut self, action: Action, key: &Key, value: Value, record: RecordId) -> CoreResult<()> {
        // publish assigns the real version
        self.staged
            .push(Write::new(action, key, value, record, Version::MIN));
        Ok(())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("path", &self.path())
            .field("buffered", &self.buffered())
            .field("registry", &self.inner.registry)
            .finish_non_exhaustive()
    }
}
