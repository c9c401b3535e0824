//! Limbo: unindexed staging stores answered by replay.
//!
//! A Limbo holds writes in version order and answers every read by
//! scanning them and replaying toggles up to a timestamp on top of a
//! caller-supplied prior context. Higher layers build that context from the
//! permanent store (or, for transactions, from the shared engine) and let
//! the Limbo apply its newer writes on top.
//!
//! ```text
//!  prior context ──► replay(writes with version <= t) ──► result
//!                     ADD inserts, REMOVE removes,
//!                     stop at first version > t
//! ```
//!
//! [`Replay`] provides every read from two primitives (`scan` and
//! `oldest_version`); [`Limbo`] adds the staging side (insert, front, pop)
//! and [`Limbo::transport`]. Write slices implement [`Replay`] too, so
//! writes fetched from a permanent store replay through the same code.

mod durable;
mod memory;

pub use durable::DurableLimbo;
pub use memory::InMemoryLimbo;

use crate::error::{CoreError, CoreResult};
use crate::operator::Criterion;
use crate::permanent::PermanentStore;
use crate::search::SearchQuery;
use crate::types::{RecordId, Version};
use crate::write::{Action, Key, Write};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::ControlFlow;
use std::time::Duration;
use tempora_codec::Value;

/// `browse` accumulator: value -> records holding it.
pub type BrowseContext = BTreeMap<Value, BTreeSet<RecordId>>;

/// `select_record` accumulator: key -> values.
pub type RecordContext = BTreeMap<Key, BTreeSet<Value>>;

/// `explore` and `search` accumulator: record -> values.
pub type RecordValues = BTreeMap<RecordId, BTreeSet<Value>>;

/// `audit` accumulator: version -> description of the write.
pub type AuditLog = BTreeMap<Version, String>;

/// `chronologize` accumulator: version -> values of one key right after
/// the write at that version.
pub type Chronology = BTreeMap<Version, BTreeSet<Value>>;

fn toggle<T: Ord>(set: &mut BTreeSet<T>, item: T, action: Action) {
    match action {
        Action::Add => {
            set.insert(item);
        }
        Action::Remove => {
            set.remove(&item);
        }
    }
}

/// Rejects `writes` unless their versions never go backwards, starting
/// from `newest`.
pub(crate) fn check_order(newest: Option<Version>, writes: &[Write]) -> CoreResult<()> {
    let mut floor = newest;
    for write in writes {
        if let Some(floor) = floor.filter(|floor| write.version() < *floor) {
            return Err(CoreError::invalid_argument(format!(
                "write at {} is older than staged write at {floor}",
                write.version()
            )));
        }
        floor = Some(write.version());
    }
    Ok(())
}

fn without_empty<K: Ord, T>(map: BTreeMap<K, BTreeSet<T>>) -> BTreeMap<K, BTreeSet<T>> {
    map.into_iter().filter(|(_, set)| !set.is_empty()).collect()
}

/// Visits every write with `version <= timestamp`, in store order.
///
/// With `early_exit` the scan stops at the first later write; without it
/// later writes are skipped. Both give the same result on version-ordered
/// stores.
pub(crate) fn replay<R: Replay + ?Sized>(
    store: &R,
    timestamp: Version,
    early_exit: bool,
    visit: &mut dyn FnMut(&Write),
) {
    store.scan(&mut |write| {
        if write.version() <= timestamp {
            visit(write);
            ControlFlow::Continue(())
        } else if early_exit {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });
}

/// Point-in-time reads over a version-ordered sequence of writes.
///
/// Implementors supply [`Replay::scan`] and [`Replay::oldest_version`];
/// every read is provided. Each read has three forms: `read(..)` at
/// [`Version::LATEST`], `read_at(.., timestamp)`, and
/// `read_with(.., timestamp, context)` which replays on top of `context`.
/// A timestamp older than [`Replay::oldest_version`] returns the context
/// untouched without scanning.
pub trait Replay {
    /// Calls `visit` on each write in non-decreasing version order until it
    /// breaks. `visit` must not mutate this store.
    fn scan(&self, visit: &mut dyn FnMut(&Write) -> ControlFlow<()>);

    /// Version of the oldest retained write, or [`Version::LATEST`] when
    /// there is none.
    fn oldest_version(&self) -> Version;

    /// value -> records for `key`, replayed onto `context`.
    fn browse_with(&self, key: &str, timestamp: Version, context: BrowseContext) -> BrowseContext {
        if timestamp < self.oldest_version() {
            return context;
        }
        let mut context = context;
        replay(self, timestamp, true, &mut |write| {
            if write.key().as_str() == key {
                let records = context.entry(write.value().clone()).or_default();
                toggle(records, write.record(), write.action());
            }
        });
        without_empty(context)
    }

    /// value -> records for `key` at `timestamp`.
    fn browse_at(&self, key: &str, timestamp: Version) -> BrowseContext {
        self.browse_with(key, timestamp, BrowseContext::new())
    }

    /// value -> records for `key` now.
    fn browse(&self, key: &str) -> BrowseContext {
        self.browse_at(key, Version::LATEST)
    }

    /// key -> values in `record`, replayed onto `context`.
    fn select_record_with(
        &self,
        record: RecordId,
        timestamp: Version,
        context: RecordContext,
    ) -> RecordContext {
        if timestamp < self.oldest_version() {
            return context;
        }
        let mut context = context;
        replay(self, timestamp, true, &mut |write| {
            if write.record() == record {
                let values = context.entry(write.key().clone()).or_default();
                toggle(values, write.value().clone(), write.action());
            }
        });
        without_empty(context)
    }

    /// key -> values in `record` at `timestamp`.
    fn select_record_at(&self, record: RecordId, timestamp: Version) -> RecordContext {
        self.select_record_with(record, timestamp, RecordContext::new())
    }

    /// key -> values in `record` now.
    fn select_record(&self, record: RecordId) -> RecordContext {
        self.select_record_at(record, Version::LATEST)
    }

    /// Keys with at least one value in `record`, replayed onto `context`.
    fn describe_with(
        &self,
        record: RecordId,
        timestamp: Version,
        context: RecordContext,
    ) -> BTreeSet<Key> {
        self.select_record_with(record, timestamp, context)
            .into_keys()
            .collect()
    }

    /// Keys with at least one value in `record` at `timestamp`.
    fn describe_at(&self, record: RecordId, timestamp: Version) -> BTreeSet<Key> {
        self.describe_with(record, timestamp, RecordContext::new())
    }

    /// Keys with at least one value in `record` now.
    fn describe(&self, record: RecordId) -> BTreeSet<Key> {
        self.describe_at(record, Version::LATEST)
    }

    /// Values of `key` in `record`, replayed onto `context`.
    fn select_with(
        &self,
        key: &str,
        record: RecordId,
        timestamp: Version,
        context: BTreeSet<Value>,
    ) -> BTreeSet<Value> {
        if timestamp < self.oldest_version() {
            return context;
        }
        let mut context = context;
        replay(self, timestamp, true, &mut |write| {
            if write.record() == record && write.key().as_str() == key {
                toggle(&mut context, write.value().clone(), write.action());
            }
        });
        context
    }

    /// Values of `key` in `record` at `timestamp`.
    fn select_at(&self, key: &str, record: RecordId, timestamp: Version) -> BTreeSet<Value> {
        self.select_with(key, record, timestamp, BTreeSet::new())
    }

    /// Values of `key` in `record` now.
    fn select(&self, key: &str, record: RecordId) -> BTreeSet<Value> {
        self.select_at(key, record, Version::LATEST)
    }

    /// record -> values of `key` satisfying `criterion`, replayed onto
    /// `context`.
    fn explore_with(
        &self,
        key: &str,
        criterion: &Criterion,
        timestamp: Version,
        context: RecordValues,
    ) -> RecordValues {
        if timestamp < self.oldest_version() {
            return context;
        }
        let mut context = context;
        replay(self, timestamp, true, &mut |write| {
            if write.key().as_str() == key && criterion.matches(write.value()) {
                let values = context.entry(write.record()).or_default();
                toggle(values, write.value().clone(), write.action());
            }
        });
        without_empty(context)
    }

    /// record -> values of `key` satisfying `criterion` at `timestamp`.
    fn explore_at(&self, key: &str, criterion: &Criterion, timestamp: Version) -> RecordValues {
        self.explore_with(key, criterion, timestamp, RecordValues::new())
    }

    /// record -> values of `key` satisfying `criterion` now.
    fn explore(&self, key: &str, criterion: &Criterion) -> RecordValues {
        self.explore_at(key, criterion, Version::LATEST)
    }

    /// Whether the mapping `write` names exists at `timestamp`, starting
    /// from `prior_exists`.
    fn verify_with(&self, write: &Write, timestamp: Version, prior_exists: bool) -> bool {
        if timestamp < self.oldest_version() {
            return prior_exists;
        }
        let mut exists = prior_exists;
        replay(self, timestamp, true, &mut |stored| {
            if stored == write {
                exists = !exists;
            }
        });
        exists
    }

    /// Whether `key` maps to `value` in `record` at `timestamp`.
    fn verify_at(&self, key: &str, value: &Value, record: RecordId, timestamp: Version) -> bool {
        let mapping = Write::add(key, value.clone(), record, timestamp);
        self.verify_with(&mapping, timestamp, false)
    }

    /// Whether `key` maps to `value` in `record` now.
    fn verify(&self, key: &str, value: &Value, record: RecordId) -> bool {
        self.verify_at(key, value, record, Version::LATEST)
    }

    /// Every write touching `record`, added to `context`.
    fn audit_with(&self, record: RecordId, context: AuditLog) -> AuditLog {
        let mut context = context;
        replay(self, Version::LATEST, false, &mut |write| {
            if write.record() == record {
                context.insert(write.version(), write.to_string());
            }
        });
        context
    }

    /// Every write touching `record`.
    fn audit(&self, record: RecordId) -> AuditLog {
        self.audit_with(record, AuditLog::new())
    }

    /// Every write touching `key` in `record`, added to `context`.
    fn audit_key_with(&self, key: &str, record: RecordId, context: AuditLog) -> AuditLog {
        let mut context = context;
        replay(self, Version::LATEST, false, &mut |write| {
            if write.record() == record && write.key().as_str() == key {
                context.insert(write.version(), write.to_string());
            }
        });
        context
    }

    /// Every write touching `key` in `record`.
    fn audit_key(&self, key: &str, record: RecordId) -> AuditLog {
        self.audit_key_with(key, record, AuditLog::new())
    }

    /// Snapshots of `key` in `record` after each write touching it, added to
    /// `context`. Replay starts from the newest snapshot already in
    /// `context`. A write that empties the key leaves an empty snapshot.
    fn chronologize_with(&self, key: &str, record: RecordId, context: Chronology) -> Chronology {
        let mut context = context;
        let mut values = context
            .last_key_value()
            .map(|(_, values)| values.clone())
            .unwrap_or_default();
        replay(self, Version::LATEST, false, &mut |write| {
            if write.record() == record && write.key().as_str() == key {
                toggle(&mut values, write.value().clone(), write.action());
                context.insert(write.version(), values.clone());
            }
        });
        context
    }

    /// Snapshots of `key` in `record` after each write touching it.
    fn chronologize(&self, key: &str, record: RecordId) -> Chronology {
        self.chronologize_with(key, record, Chronology::new())
    }

    /// Whether any write mentions `record`.
    fn contains(&self, record: RecordId) -> bool {
        let mut found = false;
        self.scan(&mut |write| {
            if write.record() == record {
                found = true;
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        found
    }

    /// record -> current text values of `key` matching `query`, replayed
    /// onto `context`.
    fn search_with(&self, key: &str, query: &SearchQuery, context: RecordValues) -> RecordValues {
        if query.is_empty() {
            return context;
        }
        let mut context = context;
        replay(self, Version::LATEST, true, &mut |write| {
            if write.key().as_str() != key {
                return;
            }
            if let Value::Text(text) = write.value() {
                if query.matches(text) {
                    let values = context.entry(write.record()).or_default();
                    toggle(values, write.value().clone(), write.action());
                }
            }
        });
        without_empty(context)
    }

    /// Records whose current text value for `key` matches `query`, in
    /// ascending record order.
    fn search(&self, key: &str, query: &str) -> BTreeSet<RecordId> {
        self.search_with(key, &SearchQuery::new(query), RecordValues::new())
            .into_keys()
            .collect()
    }
}

impl Replay for [Write] {
    fn scan(&self, visit: &mut dyn FnMut(&Write) -> ControlFlow<()>) {
        for write in self {
            if visit(write).is_break() {
                break;
            }
        }
    }

    fn oldest_version(&self) -> Version {
        self.first().map_or(Version::LATEST, Write::version)
    }
}

/// A staging store: [`Replay`] plus the queue operations transport needs.
///
/// Writes must be inserted in non-decreasing version order.
pub trait Limbo: Replay + Send + Sync {
    /// Appends `writes` as one unit: either all of them become visible or
    /// none do. With `sync`, durable stores make them crash-safe before
    /// returning.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if any write is older than the
    /// newest staged write or than a write before it in `writes`, or an
    /// error if a durable store cannot log the batch.
    fn insert_all(&self, writes: Vec<Write>, sync: bool) -> CoreResult<()>;

    /// Appends `write`. See [`Limbo::insert_all`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if `write` is older than the
    /// newest staged write, or an error if a durable store cannot log it.
    fn insert(&self, write: Write, sync: bool) -> CoreResult<()> {
        self.insert_all(vec![write], sync)
    }

    /// The oldest write, if any.
    fn front(&self) -> Option<Write>;

    /// Removes and returns the oldest write.
    ///
    /// # Errors
    ///
    /// Returns an error if a durable store cannot log the removal.
    fn pop_front(&self) -> CoreResult<Option<Write>>;

    /// Number of staged writes.
    fn len(&self) -> usize;

    /// Whether nothing is staged.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Version of the newest staged write.
    fn newest_version(&self) -> Option<Version> {
        let mut newest = None;
        self.scan(&mut |write| {
            newest = Some(write.version());
            ControlFlow::Continue(())
        });
        newest
    }

    /// A snapshot of every staged write, oldest first.
    fn writes(&self) -> Vec<Write> {
        let mut writes = Vec::with_capacity(self.len());
        self.scan(&mut |write| {
            writes.push(write.clone());
            ControlFlow::Continue(())
        });
        writes
    }

    /// Makes every staged write durable. A no-op for volatile stores.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable log cannot be synced.
    fn sync(&self) -> CoreResult<()> {
        Ok(())
    }

    /// Blocks until there is probably something to transport. The default
    /// returns immediately.
    fn wait_until_transportable(&self) {}

    /// Releases threads blocked in [`Limbo::wait_until_transportable`].
    fn interrupt_wait(&self) {}

    /// Pause a background transporter should take between runs.
    fn transport_pause(&self) -> Duration {
        Duration::ZERO
    }

    /// Moves the oldest write into `destination`, returning its version,
    /// or `None` when the store is empty.
    ///
    /// The write leaves this store only after `destination` accepted it.
    ///
    /// # Errors
    ///
    /// Propagates the destination's refusal; the write stays here.
    fn transport_one(
        &self,
        destination: &dyn PermanentStore,
        sync: bool,
    ) -> CoreResult<Option<Version>> {
        let Some(write) = self.front() else {
            return Ok(None);
        };
        destination.accept(&write, sync).inspect_err(|e| {
            tracing::warn!(version = %write.version(), error = %e, "transport rejected");
        })?;
        self.pop_front()?;
        Ok(Some(write.version()))
    }

    /// Moves every write into `destination` in version order and returns
    /// how many moved.
    ///
    /// # Errors
    ///
    /// Stops at the first refused write, which stays in this store along
    /// with everything after it.
    fn transport(&self, destination: &dyn PermanentStore, sync: bool) -> CoreResult<usize> {
        let mut moved = 0;
        while self.transport_one(destination, sync)?.is_some() {
            moved += 1;
        }
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::Operator;
    use proptest::prelude::*;

    fn v(n: i64) -> Version {
        Version::new(n as u64)
    }

    /// ADD(foo,bar,1)@1, ADD(foo,baz,1)@2, REMOVE(foo,bar,1)@3
    fn scenario() -> InMemoryLimbo {
        InMemoryLimbo::from_writes([
            Write::add("foo", "bar", 1, v(1)),
            Write::add("foo", "baz", 1, v(2)),
            Write::remove("foo", "bar", 1, v(3)),
        ])
    }

    fn set(values: &[&str]) -> BTreeSet<Value> {
        values.iter().map(|s| Value::from(*s)).collect()
    }

    #[test]
    fn select_replays_toggles_up_to_the_timestamp() {
        let limbo = scenario();
        assert_eq!(limbo.select("foo", 1), set(&["baz"]));
        assert_eq!(limbo.select_at("foo", 1, v(2)), set(&["bar", "baz"]));
        assert_eq!(limbo.select_at("foo", 1, v(1)), set(&["bar"]));
        assert!(limbo.select("foo", 2).is_empty());
    }

    #[test]
    fn audit_lists_every_write() {
        let audit = scenario().audit(1);
        assert_eq!(audit.keys().copied().collect::<Vec<_>>(), vec![v(1), v(2), v(3)]);
        assert_eq!(audit[&v(3)], "REMOVE foo AS bar IN 1");
        assert_eq!(scenario().audit_key("foo", 1).len(), 3);
        assert!(scenario().audit_key("bar", 1).is_empty());
    }

    #[test]
    fn chronologize_snapshots_each_change() {
        let limbo = InMemoryLimbo::from_writes([
            Write::add("foo", "bar", 1, v(1)),
            Write::add("other", "x", 1, v(2)),
            Write::add("foo", "baz", 1, v(3)),
            Write::remove("foo", "bar", 1, v(4)),
            Write::remove("foo", "baz", 1, v(5)),
        ]);
        let chronology = limbo.chronologize("foo", 1);
        assert_eq!(
            chronology.keys().copied().collect::<Vec<_>>(),
            vec![v(1), v(3), v(4), v(5)]
        );
        assert_eq!(chronology[&v(3)], set(&["bar", "baz"]));
        assert_eq!(chronology[&v(4)], set(&["baz"]));
        assert!(chronology[&v(5)].is_empty());
        assert!(limbo.chronologize("foo", 2).is_empty());

        // replay continues from the newest snapshot it is handed
        let newer = InMemoryLimbo::from_writes([Write::add("foo", "qux", 1, v(9))]);
        let prior = Chronology::from([(v(0), set(&["old"]))]);
        assert_eq!(
            newer.chronologize_with("foo", 1, prior)[&v(9)],
            set(&["old", "qux"])
        );
    }

    #[test]
    fn timestamps_before_the_oldest_write_return_the_context() {
        let limbo = InMemoryLimbo::from_writes([Write::add("foo", "new", 1, v(10))]);
        let prior = set(&["old"]);
        assert_eq!(limbo.select_with("foo", 1, v(5), prior.clone()), prior);
        assert!(limbo.verify_with(&Write::add("foo", "old", 1, v(0)), v(5), true));
        assert_eq!(
            limbo.select_with("foo", 1, Version::LATEST, prior),
            set(&["old", "new"])
        );
    }

    #[test]
    fn replay_builds_on_the_prior_context() {
        let limbo = InMemoryLimbo::from_writes([Write::remove("foo", "old", 1, v(10))]);
        let after = limbo.select_with("foo", 1, Version::LATEST, set(&["old"]));
        assert!(after.is_empty());

        let mut prior = RecordContext::new();
        prior.insert(Key::new("foo"), set(&["old"]));
        assert!(limbo.describe_with(1, Version::LATEST, prior).is_empty());
    }

    #[test]
    fn browse_and_describe() {
        let limbo = InMemoryLimbo::from_writes([
            Write::add("name", "jeff", 1, v(1)),
            Write::add("name", "jeff", 2, v(2)),
            Write::add("age", 30, 1, v(3)),
            Write::remove("name", "jeff", 1, v(4)),
        ]);
        let browse = limbo.browse("name");
        assert_eq!(browse.len(), 1);
        assert_eq!(browse[&Value::from("jeff")], BTreeSet::from([2]));
        assert_eq!(limbo.browse_at("name", v(3))[&Value::from("jeff")].len(), 2);

        assert_eq!(limbo.describe(1), BTreeSet::from([Key::new("age")]));
        assert_eq!(limbo.describe_at(1, v(3)).len(), 2);
        assert_eq!(limbo.select_record(2)[&Key::new("name")], set(&["jeff"]));
        assert!(limbo.contains(1));
        assert!(!limbo.contains(3));
    }

    #[test]
    fn explore_filters_by_operator() {
        let limbo = InMemoryLimbo::from_writes([
            Write::add("age", 30, 1, v(1)),
            Write::add("age", 40, 2, v(2)),
            Write::add("age", 50, 3, v(3)),
            Write::remove("age", 40, 2, v(4)),
        ]);
        let between = Criterion::new(Operator::Between, vec![30.into(), 50.into()]).unwrap();
        let found = limbo.explore("age", &between);
        assert_eq!(found.keys().copied().collect::<Vec<_>>(), vec![1]);
        assert_eq!(limbo.explore_at("age", &between, v(3)).len(), 2);

        let gt = Criterion::new(Operator::GreaterThan, vec![Value::Integer(0)]).unwrap();
        assert_eq!(limbo.explore("age", &gt).len(), 2);
    }

    #[test]
    fn search_matches_current_text_only() {
        let limbo = InMemoryLimbo::from_writes([
            Write::add("bio", "A quick brown fox jumps", 1, v(1)),
            Write::add("bio", "quick thinking", 2, v(2)),
            Write::add("bio", "the fox was quick", 3, v(3)),
            Write::remove("bio", "quick thinking", 2, v(4)),
            Write::add("title", "quick fox", 4, v(5)),
            Write::add("bio", 42, 5, v(6)),
        ]);
        assert_eq!(limbo.search("bio", "the quick fox"), BTreeSet::from([1]));
        assert_eq!(limbo.search("bio", "quick"), BTreeSet::from([1, 3]));
        assert!(limbo.search("bio", "fox quick").contains(&3));
        assert!(limbo.search("bio", "zzz").is_empty());
        assert!(limbo.search("bio", "the").is_empty());
    }

    #[test]
    fn slices_replay_like_stores() {
        let writes = scenario().writes();
        assert_eq!(writes.as_slice().select("foo", 1), set(&["baz"]));
        assert_eq!(writes.as_slice().oldest_version(), v(1));
        let empty: &[Write] = &[];
        assert_eq!(empty.oldest_version(), Version::LATEST);
    }

    fn toggles() -> impl Strategy<Value = Vec<(u8, u8)>> {
        prop::collection::vec((0u8..3, 0u8..3), 0..64)
    }

    fn build(ops: &[(u8, u8)]) -> Vec<Write> {
        let mut present = std::collections::HashSet::new();
        ops.iter()
            .enumerate()
            .map(|(i, &(value, record))| {
                let key = (value, record);
                let version = v(i as i64 + 1);
                if present.insert(key) {
                    Write::add("k", i64::from(value), u64::from(record), version)
                } else {
                    present.remove(&key);
                    Write::remove("k", i64::from(value), u64::from(record), version)
                }
            })
            .collect()
    }

    proptest! {
        #[test]
        fn verify_is_true_iff_the_toggle_count_is_odd(n in 0usize..20) {
            let writes: Vec<Write> = (0..n)
                .map(|i| Write::new(
                    if i % 2 == 0 { Action::Add } else { Action::Remove },
                    "foo", "bar", 1, v(i as i64 + 1),
                ))
                .collect();
            let limbo = InMemoryLimbo::from_writes(writes);
            prop_assert_eq!(limbo.verify("foo", &Value::from("bar"), 1), n % 2 == 1);
        }

        #[test]
        fn early_exit_changes_nothing(ops in toggles(), cut in 0i64..70) {
            let limbo = InMemoryLimbo::from_writes(build(&ops));
            let mut fast = Vec::new();
            let mut slow = Vec::new();
            replay(&limbo, v(cut), true, &mut |w| fast.push(w.version()));
            replay(&limbo, v(cut), false, &mut |w| slow.push(w.version()));
            prop_assert_eq!(fast, slow);
        }

        #[test]
        fn later_writes_never_change_earlier_reads(ops in toggles(), extra in toggles(), cut in 0i64..64) {
            let writes = build(&ops);
            let before = InMemoryLimbo::from_writes(writes.clone());
            let after = InMemoryLimbo::from_writes(writes);
            let offset = ops.len() as i64 + 100;
            for (i, &(value, record)) in extra.iter().enumerate() {
                after.insert(
                    Write::add("k", i64::from(value), u64::from(record), v(offset + i as i64)),
                    false,
                ).unwrap();
            }
            for r in 0..3u64 {
                prop_assert_eq!(after.select_record_at(r, v(cut)), before.select_record_at(r, v(cut)));
            }
        }
    }
}
