//! Scripted permanent stores for transport tests.

use parking_lot::Mutex;
use std::sync::Arc;
use tempora_core::{CoreError, CoreResult, PermanentStore, RecordId, Replay, Version, Write};

/// A permanent store that records every write it accepts and can be told
/// to refuse the Kth one.
///
/// Clones share state, so a test can hand one clone to an engine and keep
/// another to inspect what arrived.
#[derive(Debug, Clone, Default)]
pub struct ScriptedStore {
    state: Arc<Mutex<ScriptState>>,
}

#[derive(Debug, Default)]
struct ScriptState {
    accepted: Vec<Write>,
    attempts: usize,
    fail_on: Option<usize>,
    syncs: usize,
}

impl ScriptedStore {
    /// Creates a store that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that refuses the `k`th accept (1-based) and every
    /// retry of it until [`ScriptedStore::heal`] is called.
    pub fn failing_on(k: usize) -> Self {
        let store = Self::new();
        store.state.lock().fail_on = Some(k);
        store
    }

    /// Stops refusing writes.
    pub fn heal(&self) {
        self.state.lock().fail_on = None;
    }

    /// Every accepted write, in arrival order.
    pub fn accepted(&self) -> Vec<Write> {
        self.state.lock().accepted.clone()
    }

    /// Number of accept calls, refused ones included.
    pub fn attempts(&self) -> usize {
        self.state.lock().attempts
    }

    /// Number of sync requests, explicit or through `accept(.., true)`.
    pub fn syncs(&self) -> usize {
        self.state.lock().syncs
    }
}

impl PermanentStore for ScriptedStore {
    fn accept(&self, write: &Write, sync: bool) -> CoreResult<()> {
        let mut state = self.state.lock();
        state.attempts += 1;
        if let Some(k) = state.fail_on {
            if state.accepted.len() + 1 >= k {
                return Err(CoreError::rejected(write.version(), "scripted refusal"));
            }
        }
        state.accepted.push(write.clone());
        if sync {
            state.syncs += 1;
        }
        Ok(())
    }

    fn sync(&self) -> CoreResult<()> {
        self.state.lock().syncs += 1;
        Ok(())
    }

    fn record_writes(&self, record: RecordId) -> Vec<Write> {
        self.state
            .lock()
            .accepted
            .iter()
            .filter(|w| w.record() == record)
            .cloned()
            .collect()
    }

    fn key_writes(&self, key: &str) -> Vec<Write> {
        self.state
            .lock()
            .accepted
            .iter()
            .filter(|w| w.key().as_str() == key)
            .cloned()
            .collect()
    }

    fn newest_version(&self) -> Option<Version> {
        self.state.lock().accepted.last().map(Write::version)
    }
}

/// Whether `writes` replay to the same record view as `expected`.
pub fn same_record_view(writes: &[Write], expected: &[Write], record: RecordId) -> bool {
    writes.select_record(record) == expected.select_record(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempora_core::{InMemoryLimbo, Limbo};

    #[test]
    fn refuses_the_kth_write_until_healed() {
        let store = ScriptedStore::failing_on(3);
        let source = InMemoryLimbo::from_writes(crate::fixtures::scenarios::numbered("n", 5));

        let err = source.transport(&store, true).unwrap_err();
        assert!(matches!(err, CoreError::Rejected { .. }));
        assert_eq!(store.accepted().len(), 2);
        assert_eq!(source.len(), 3);
        assert_eq!(store.syncs(), 2);

        assert!(source.transport(&store, false).is_err());
        store.heal();
        assert_eq!(source.transport(&store, false).unwrap(), 3);
        assert_eq!(store.attempts(), 7);
        assert!(source.is_empty());
    }

    #[test]
    fn lookups_filter_accepted_writes() {
        let store = ScriptedStore::new();
        for write in crate::fixtures::scenarios::toggles() {
            store.accept(&write, false).unwrap();
        }
        assert_eq!(store.record_writes(1).len(), 3);
        assert_eq!(store.key_writes("foo").len(), 3);
        assert!(store.key_writes("bar").is_empty());
        assert_eq!(store.newest_version(), Some(Version::new(3)));
        assert!(same_record_view(
            &store.record_writes(1),
            &crate::fixtures::scenarios::toggles(),
            1
        ));
    }
}
