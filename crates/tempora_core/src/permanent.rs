//! The permanent store contract and a reference implementation.

use crate::error::{CoreError, CoreResult};
use crate::log::{LogRecord, WriteLog};
use crate::types::{RecordId, Version};
use crate::write::{Key, Write};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use tempora_storage::StorageBackend;

/// Where transport delivers writes.
///
/// Lookups return writes in version order so callers can replay them
/// (through [`crate::limbo::Replay`] on slices) into the prior context a
/// Limbo read builds on.
pub trait PermanentStore: Send + Sync {
    /// Takes ownership of `write`. With `sync`, the write is durable before
    /// this returns.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Rejected`] (or a storage error) when the write
    /// cannot be accepted; transport then leaves it in the buffer.
    fn accept(&self, write: &Write, sync: bool) -> CoreResult<()>;

    /// Makes every accepted write durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot sync.
    fn sync(&self) -> CoreResult<()>;

    /// Every write for `record`, oldest first.
    fn record_writes(&self, record: RecordId) -> Vec<Write>;

    /// Every write for `key`, oldest first.
    fn key_writes(&self, key: &str) -> Vec<Write>;

    /// Version of the newest accepted write, if the store tracks it.
    fn newest_version(&self) -> Option<Version> {
        None
    }
}

#[derive(Debug, Default)]
struct Index {
    by_record: HashMap<RecordId, Vec<Write>>,
    by_key: HashMap<Key, Vec<Write>>,
    newest: Option<Version>,
    count: usize,
}

impl Index {
    fn insert(&mut self, write: Write) {
        self.newest = Some(write.version());
        self.count += 1;
        self.by_key
            .entry(write.key().clone())
            .or_default()
            .push(write.clone());
        self.by_record.entry(write.record()).or_default().push(write);
    }
}

/// Writes indexed by record and by key, optionally mirrored to a write log.
///
/// Accepts writes only in non-decreasing version order, which is what
/// transport delivers; anything older than the newest accepted write is
/// rejected.
#[derive(Debug, Default)]
pub struct IndexedStore {
    index: RwLock<Index>,
    log: Option<Mutex<WriteLog>>,
}

impl IndexedStore {
    /// Creates a volatile store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a store persisted on `backend`, replaying its log.
    ///
    /// # Errors
    ///
    /// Returns an error if the log is corrupt or unreadable.
    pub fn open(backend: Box<dyn StorageBackend>) -> CoreResult<Self> {
        let mut log = WriteLog::new(backend);
        let mut index = Index::default();
        for record in log.recover()? {
            match record {
                LogRecord::Append(write) => index.insert(write),
                LogRecord::Batch(writes) => writes.into_iter().for_each(|write| index.insert(write)),
                LogRecord::Consume(version) => {
                    return Err(CoreError::log_corruption(format!(
                        "permanent store log holds a consume of {version}"
                    )))
                }
            }
        }
        tracing::debug!(writes = index.count, "indexed store opened");
        Ok(Self {
            index: RwLock::new(index),
            log: Some(Mutex::new(log)),
        })
    }

    /// Number of accepted writes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.read().count
    }

    /// Whether no write was accepted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PermanentStore for IndexedStore {
    fn accept(&self, write: &Write, sync: bool) -> CoreResult<()> {
        let mut index = self.index.write();
        if let Some(newest) = index.newest {
            if write.version() < newest {
                return Err(CoreError::rejected(
                    write.version(),
                    format!("older than newest accepted write {newest}"),
                ));
            }
        }
        if let Some(log) = &self.log {
            log.lock().append(&LogRecord::Append(write.clone()), sync)?;
        }
        index.insert(write.clone());
        Ok(())
    }

    fn sync(&self) -> CoreResult<()> {
        match &self.log {
            Some(log) => log.lock().sync(),
            None => Ok(()),
        }
    }

    fn record_writes(&self, record: RecordId) -> Vec<Write> {
        self.index
            .read()
            .by_record
            .get(&record)
            .cloned()
            .unwrap_or_default()
    }

    fn key_writes(&self, key: &str) -> Vec<Write> {
        self.index
            .read()
            .by_key
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    fn newest_version(&self) -> Option<Version> {
        self.index.read().newest
    }
}
