//! Volatile Limbo.

use super::{check_order, Limbo, Replay};
use crate::error::CoreResult;
use crate::types::Version;
use crate::write::Write;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::ops::ControlFlow;

/// A Limbo kept entirely in memory.
///
/// Backs ephemeral engines and every transaction's private overlay. A scan
/// holds the read lock for its whole duration, so it never observes a write
/// inserted after it began.
#[derive(Debug, Default)]
pub struct InMemoryLimbo {
    writes: RwLock<VecDeque<Write>>,
}

impl InMemoryLimbo {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `writes`, which must be in version order.
    pub fn from_writes(writes: impl IntoIterator<Item = Write>) -> Self {
        Self {
            writes: RwLock::new(writes.into_iter().collect()),
        }
    }

    /// Removes and returns every write, oldest first.
    pub fn drain(&self) -> Vec<Write> {
        self.writes.write().drain(..).collect()
    }

    /// Discards every write.
    pub fn clear(&self) {
        self.writes.write().clear();
    }
}

impl Replay for InMemoryLimbo {
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

impl Limbo for InMemoryLimbo {
    fn insert_all(&self, writes: Vec<Write>, _sync: bool) -> CoreResult<()> {
        let mut staged = self.writes.write();
        check_order(staged.back().map(Write::version), &writes)?;
        staged.extend(writes);
        Ok(())
    }

    fn front(&self) -> Option<Write> {
        self.writes.read().front().cloned()
    }

    fn pop_front(&self) -> CoreResult<Option<Write>> {
        Ok(self.writes.write().pop_front())
    }

    fn len(&self) -> usize {
        self.writes.read().len()
    }

    fn newest_version(&self) -> Option<Version> {
        self.writes.read().back().map(Write::version)
    }
}
