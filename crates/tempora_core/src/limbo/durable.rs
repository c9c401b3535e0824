//! Limbo mirrored to a write log.

use super::{check_order, Limbo, Replay};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::log::{LogRecord, WriteLog};
use crate::types::Version;
use crate::write::Write;
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::time::Duration;
use tempora_storage::StorageBackend;

/// A Limbo whose writes survive restart.
///
/// Writes are served from memory; every insert appends an `Append` record
/// (or one `Batch` record for several writes) to the write log and every transported write appends a `Consume`
/// record. Once transport empties the store the log is truncated to zero.
///
/// Lock order: `log`, then `writes`.
pub struct DurableLimbo {
    writes: RwLock<VecDeque<Write>>,
    log: Mutex<WriteLog>,
    signal: Mutex<()>,
    ready: Condvar,
    wait: Duration,
    pause: Duration,
}

impl DurableLimbo {
    /// Opens the store on `backend`, replaying whatever the log holds.
    ///
    /// # Errors
    ///
    /// Returns an error if the log is corrupt or unreadable.
    pub fn open(backend: Box<dyn StorageBackend>, config: &Config) -> CoreResult<Self> {
        let mut log = WriteLog::new(backend);
        let mut writes = VecDeque::new();
        for record in log.recover()? {
            match record {
                LogRecord::Append(write) => writes.push_back(write),
                LogRecord::Batch(batch) => writes.extend(batch),
                LogRecord::Consume(version) => match writes.pop_front() {
                    Some(front) if front.version() == version => {}
                    Some(front) => {
                        return Err(CoreError::log_corruption(format!(
                            "consume of {version} but oldest write is {}",
                            front.version()
                        )))
                    }
                    None => {
                        return Err(CoreError::log_corruption(format!(
                            "consume of {version} from an empty buffer"
                        )))
                    }
                },
            }
        }
        if writes.is_empty() && log.size()? > 0 {
            log.reset()?;
        }
        tracing::debug!(recovered = writes.len(), "durable limbo opened");
        Ok(Self {
            writes: RwLock::new(writes),
            log: Mutex::new(log),
            signal: Mutex::new(()),
            ready: Condvar::new(),
            wait: config.transport_wait,
            pause: config.transport_pause,
        })
    }
}

impl Replay for DurableLimbo {
    fn scan(&self, visit: &mut dyn FnMut(&Write) -> ControlFlow<()>) {
        let writes = self.writes.read();
        for write in writes.iter() {
            if visit(write).is_break() {
                break;
            }
        }
    }

    fn oldest_version(&self) -> Version {
        self.writes
            .read()
            .front()
            .map_or(Version::LATEST, Write::version)
    }
}

impl Limbo for DurableLimbo {
    fn insert_all(&self, mut writes: Vec<Write>, sync: bool) -> CoreResult<()> {
        if writes.is_empty() {
            return Ok(());
        }
        {
            let mut log = self.log.lock();
            check_order(self.newest_version(), &writes)?;
            let record = if writes.len() == 1 {
                LogRecord::Append(writes.remove(0))
            } else {
                LogRecord::Batch(writes)
            };
            log.append(&record, sync)?;
            let mut staged = self.writes.write();
            match record {
                LogRecord::Append(write) => staged.push_back(write),
                LogRecord::Batch(batch) => staged.extend(batch),
                LogRecord::Consume(_) => {}
            }
        }
        let _signal = self.signal.lock();
        self.ready.notify_all();
        Ok(())
    }

    fn front(&self) -> Option<Write> {
        self.writes.read().front().cloned()
    }

    fn pop_front(&self) -> CoreResult<Option<Write>> {
        let mut log = self.log.lock();
        let Some(version) = self.writes.read().front().map(Write::version) else {
            return Ok(None);
        };
        log.append(&LogRecord::Consume(version), false)?;
        let mut writes = self.writes.write();
        let popped = writes.pop_front();
        if writes.is_empty() {
            log.reset()?;
        }
        Ok(popped)
    }

    fn len(&self) -> usize {
        self.writes.read().len()
    }

    fn newest_version(&self) -> Option<Version> {
        self.writes.read().back().map(Write::version)
    }

    fn sync(&self) -> CoreResult<()> {
        self.log.lock().sync()
    }

    fn wait_until_transportable(&self) {
        let mut signal = self.signal.lock();
        if self.is_empty() {
            let _ = self.ready.wait_for(&mut signal, self.wait);
        }
    }

    fn interrupt_wait(&self) {
        let _signal = self.signal.lock();
        self.ready.notify_all();
    }

    fn transport_pause(&self) -> Duration {
        self.pause
    }
}

impl std::fmt::Debug for DurableLimbo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableLimbo")
            .field("writes", &self.len())
            .field("wait", &self.wait)
            .field("pause", &self.pause)
            .finish()
    }
}
