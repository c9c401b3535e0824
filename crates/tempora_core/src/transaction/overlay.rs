//! The transaction handle.

use super::state::{TransactionState, Watch};
use crate::engine::mutate::{self, Mutable};
use crate::engine::Engine;
use crate::error::{CoreError, CoreResult};
use crate::limbo::{
    AuditLog, BrowseContext, Chronology, InMemoryLimbo, Limbo, RecordContext, RecordValues, Replay,
};
use crate::operator::Criterion;
use crate::search::SearchQuery;
use crate::tokens::{Token, VersionChangeListener};
use crate::types::{RecordId, TransactionId, Version};
use crate::write::{Action, Key, Write};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tempora_codec::Value;

/// A unit of optimistic work against an [`Engine`].
///
/// Operations take `&mut self`; a transaction belongs to one caller at a
/// time. Dropping an unfinished transaction aborts it.
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    engine: Engine,
    overlay: InMemoryLimbo,
    watch: Arc<Watch>,
    registered: HashSet<Token>,
    state: TransactionState,
}

impl Transaction {
    pub(crate) fn new(id: TransactionId, engine: Engine) -> Self {
        Self {
            id,
            engine,
            overlay: InMemoryLimbo::new(),
            watch: Arc::new(Watch::default()),
            registered: HashSet::new(),
            state: TransactionState::Unstarted,
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Number of staged writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.overlay.len()
    }

    /// Publishes the staged writes. Returns false if the transaction never
    /// ran an operation.
    ///
    /// # Errors
    ///
    /// - [`CoreError::TransactionConflict`] if another actor changed data
    ///   this transaction depends on; nothing is published
    /// - [`CoreError::TransactionClosed`] after commit or abort
    /// - a storage error if the buffer cannot log the writes
    pub fn commit(&mut self) -> CoreResult<bool> {
        match self.state {
            TransactionState::Unstarted => {
                self.state = TransactionState::Committed;
                return Ok(false);
            }
            TransactionState::Committed | TransactionState::Aborted => {
                return Err(CoreError::TransactionClosed)
            }
            TransactionState::Conflicted => return Err(self.conflict_error()),
            TransactionState::Active => {}
        }

        let writes = self.overlay.drain();
        let watch = Arc::clone(&self.watch);
        let result = self.engine.commit_writes(self.id, writes, || {
            watch.conflict().map_or(Ok(()), |token| Err(CoreError::conflict(token)))
        });
        match result {
            Ok(published) => {
                self.release();
                self.state = TransactionState::Committed;
                tracing::debug!(txn = %self.id, published, "transaction committed");
                Ok(true)
            }
            Err(CoreError::TransactionConflict { token }) => {
                self.fail(&token);
                Err(CoreError::conflict(token))
            }
            Err(e) => {
                self.release();
                self.state = TransactionState::Aborted;
                Err(e)
            }
        }
    }

    /// Discards the staged writes and releases every registration.
    pub fn abort(&mut self) {
        if self.state.is_closed() {
            return;
        }
        self.overlay.clear();
        self.release();
        self.state = TransactionState::Aborted;
        tracing::debug!(txn = %self.id, "transaction aborted");
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// value -> records for `key` now.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is closed or conflicted.
    pub fn browse(&mut self, key: &str) -> CoreResult<BrowseContext> {
        self.browse_at(key, Version::LATEST)
    }

    /// value -> records for `key` at `timestamp`.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is closed or conflicted.
    pub fn browse_at(&mut self, key: &str, timestamp: Version) -> CoreResult<BrowseContext> {
        self.enter(&[Token::key(key)])?;
        let prior = self.engine.browse_at(key, timestamp);
        Ok(self.overlay.browse_with(key, timestamp, prior))
    }

    /// Keys populated in `record` now.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is closed or conflicted.
    pub fn describe(&mut self, record: RecordId) -> CoreResult<BTreeSet<Key>> {
        self.describe_at(record, Version::LATEST)
    }

    /// Keys populated in `record` at `timestamp`.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is closed or conflicted.
    pub fn describe_at(&mut self, record: RecordId, timestamp: Version) -> CoreResult<BTreeSet<Key>> {
        self.enter(&[Token::record(record)])?;
        let prior = self.engine.select_record_at(record, timestamp);
        Ok(self.overlay.describe_with(record, timestamp, prior))
    }

    /// key -> values in `record` now.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is closed or conflicted.
    pub fn select_record(&mut self, record: RecordId) -> CoreResult<RecordContext> {
        self.select_record_at(record, Version::LATEST)
    }

    /// key -> values in `record` at `timestamp`.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is closed or conflicted.
    pub fn select_record_at(
        &mut self,
        record: RecordId,
        timestamp: Version,
    ) -> CoreResult<RecordContext> {
        self.enter(&[Token::record(record)])?;
        let prior = self.engine.select_record_at(record, timestamp);
        Ok(self.overlay.select_record_with(record, timestamp, prior))
    }

    /// Values of `key` in `record` now.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is closed or conflicted.
    pub fn select(&mut self, key: &str, record: RecordId) -> CoreResult<BTreeSet<Value>> {
        self.select_at(key, record, Version::LATEST)
    }

    /// Values of `key` in `record` at `timestamp`.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is closed or conflicted.
    pub fn select_at(
        &mut self,
        key: &str,
        record: RecordId,
        timestamp: Version,
    ) -> CoreResult<BTreeSet<Value>> {
        self.enter(&[Token::cell(key, record)])?;
        let prior = self.engine.select_at(key, record, timestamp);
        Ok(self.overlay.select_with(key, record, timestamp, prior))
    }

    /// record -> values of `key` satisfying `criterion` now.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is closed or conflicted.
    pub fn explore(&mut self, key: &str, criterion: &Criterion) -> CoreResult<RecordValues> {
        self.explore_at(key, criterion, Version::LATEST)
    }

    /// record -> values of `key` satisfying `criterion` at `timestamp`.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is closed or conflicted.
    pub fn explore_at(
        &mut self,
        key: &str,
        criterion: &Criterion,
        timestamp: Version,
    ) -> CoreResult<RecordValues> {
        self.enter(&[Token::key(key)])?;
        let prior = self.engine.explore_at(key, criterion, timestamp);
        Ok(self.overlay.explore_with(key, criterion, timestamp, prior))
    }

    /// Whether `key` maps to `value` in `record` now.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is closed or conflicted.
    pub fn verify(&mut self, key: &str, value: &Value, record: RecordId) -> CoreResult<bool> {
        self.verify_at(key, value, record, Version::LATEST)
    }

    /// Whether `key` maps to `value` in `record` at `timestamp`.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is closed or conflicted.
    pub fn verify_at(
        &mut self,
        key: &str,
        value: &Value,
        record: RecordId,
        timestamp: Version,
    ) -> CoreResult<bool> {
        self.enter(&[Token::cell(key, record)])?;
        let prior = self.engine.verify_at(key, value, record, timestamp);
        let mapping = Write::add(key, value.clone(), record, timestamp);
        Ok(self.overlay.verify_with(&mapping, timestamp, prior))
    }

    /// Every write made to `record`, staged ones included.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is closed or conflicted.
    pub fn audit(&mut self, record: RecordId) -> CoreResult<AuditLog> {
        self.enter(&[Token::record(record)])?;
        let prior = self.engine.audit(record);
        Ok(self.overlay.audit_with(record, prior))
    }

    /// Every write made to `key` in `record`, staged ones included.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is closed or conflicted.
    pub fn audit_key(&mut self, key: &str, record: RecordId) -> CoreResult<AuditLog> {
        self.enter(&[Token::cell(key, record)])?;
        let prior = self.engine.audit_key(key, record);
        Ok(self.overlay.audit_key_with(key, record, prior))
    }

    /// Snapshots of `key` in `record` after each write, staged ones
    /// included.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is closed or conflicted.
    pub fn chronologize(&mut self, key: &str, record: RecordId) -> CoreResult<Chronology> {
        self.enter(&[Token::cell(key, record)])?;
        let prior = self.engine.chronologize(key, record);
        Ok(self.overlay.chronologize_with(key, record, prior))
    }

    /// Whether `record` holds any data, staged writes included.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is closed or conflicted.
    pub fn ping(&mut self, record: RecordId) -> CoreResult<bool> {
        Ok(!self.describe(record)?.is_empty())
    }

    /// Whether any write, staged or shared, mentions `record`.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is closed or conflicted.
    pub fn contains(&mut self, record: RecordId) -> CoreResult<bool> {
        self.enter(&[Token::record(record)])?;
        Ok(self.engine.contains(record) || self.overlay.contains(record))
    }

    /// Records whose current text value for `key` matches `query`.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is closed or conflicted.
    pub fn search(&mut self, key: &str, query: &str) -> CoreResult<BTreeSet<RecordId>> {
        self.enter(&[Token::key(key)])?;
        let query = SearchQuery::new(query);
        let prior = self.engine.search_values(key, &query);
        Ok(self
            .overlay
            .search_with(key, &query, prior)
            .into_keys()
            .collect())
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Stages adding `value` to `key` in `record`. Returns false if it is
    /// already there.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is closed or conflicted, or the key is
    /// empty.
    pub fn add(&mut self, key: &str, value: impl Into<Value>, record: RecordId) -> CoreResult<bool> {
        self.enter(&[Token::cell(key, record)])?;
        mutate::add(&mut self.staging(), key, value.into(), record)
    }

    /// Stages removing `value` from `key` in `record`. Returns false if it
    /// is not there.
    ///
    /// # Errors
    ///
    /// Same as [`Transaction::add`].
    pub fn remove(
        &mut self,
        key: &str,
        value: impl Into<Value>,
        record: RecordId,
    ) -> CoreResult<bool> {
        self.enter(&[Token::cell(key, record)])?;
        mutate::remove(&mut self.staging(), key, value.into(), record)
    }

    /// Stages making `value` the only value of `key` in `record`.
    ///
    /// # Errors
    ///
    /// Same as [`Transaction::add`].
    pub fn set(&mut self, key: &str, value: impl Into<Value>, record: RecordId) -> CoreResult<()> {
        self.enter(&[Token::cell(key, record)])?;
        mutate::set(&mut self.staging(), key, value.into(), record).map(|_| ())
    }

    /// Stages removing every value of `key` in `record`.
    ///
    /// # Errors
    ///
    /// Same as [`Transaction::add`].
    pub fn clear_key(&mut self, key: &str, record: RecordId) -> CoreResult<usize> {
        self.enter(&[Token::cell(key, record)])?;
        mutate::clear_key(&mut self.staging(), key, record)
    }

    /// Stages removing everything in `record`.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is closed or conflicted.
    pub fn clear_record(&mut self, record: RecordId) -> CoreResult<usize> {
        self.enter(&[Token::record(record)])?;
        mutate::clear_record(&mut self.staging(), record)
    }

    /// Stages replacing `expected` with `replacement` if `expected` is
    /// present and `replacement` is not.
    ///
    /// # Errors
    ///
    /// Same as [`Transaction::add`].
    pub fn verify_and_swap(
        &mut self,
        key: &str,
        expected: impl Into<Value>,
        record: RecordId,
        replacement: impl Into<Value>,
    ) -> CoreResult<bool> {
        self.enter(&[Token::cell(key, record)])?;
        mutate::verify_and_swap(
            &mut self.staging(),
            key,
            expected.into(),
            record,
            replacement.into(),
        )
    }

    /// Stages the writes that bring `key` in `record` back to its values at
    /// `timestamp`, returning how many.
    ///
    /// # Errors
    ///
    /// Same as [`Transaction::add`].
    pub fn revert(&mut self, key: &str, record: RecordId, timestamp: Version) -> CoreResult<usize> {
        self.enter(&[Token::cell(key, record)])?;
        mutate::revert(&mut self.staging(), key, record, timestamp)
    }

    /// Stages making `value` the only value of `key` in `record`. Returns
    /// false if that already held.
    ///
    /// # Errors
    ///
    /// Same as [`Transaction::add`].
    pub fn verify_or_set(
        &mut self,
        key: &str,
        value: impl Into<Value>,
        record: RecordId,
    ) -> CoreResult<bool> {
        self.enter(&[Token::cell(key, record)])?;
        mutate::set(&mut self.staging(), key, value.into(), record)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Gate for every operation: rejects closed or conflicted transactions
    /// and registers interest in `tokens` before anything is read.
    fn enter(&mut self, tokens: &[Token]) -> CoreResult<()> {
        match self.state {
            TransactionState::Committed | TransactionState::Aborted => {
                return Err(CoreError::TransactionClosed)
            }
            TransactionState::Conflicted => return Err(self.conflict_error()),
            TransactionState::Unstarted | TransactionState::Active => {}
        }
        if let Some(token) = self.watch.conflict() {
            self.fail(&token);
            return Err(CoreError::conflict(token));
        }
        let listener: Arc<dyn VersionChangeListener> = self.watch.clone();
        for token in tokens {
            if self.registered.insert(token.clone()) {
                self.engine
                    .registry()
                    .register(token.clone(), self.id, Arc::clone(&listener));
            }
        }
        self.state = TransactionState::Active;
        Ok(())
    }

    fn conflict_error(&self) -> CoreError {
        self.watch
            .conflict()
            .map_or(CoreError::TransactionClosed, CoreError::conflict)
    }

    fn fail(&mut self, token: &Token) {
        tracing::warn!(
            txn = %self.id,
            %token,
            discarded = self.overlay.len(),
            "transaction conflict"
        );
        self.overlay.clear();
        self.release();
        self.state = TransactionState::Conflicted;
    }

    fn release(&mut self) {
        let registry = self.engine.registry();
        for token in self.registered.drain() {
            registry.unregister(&token, self.id);
        }
    }

    fn staging(&self) -> Staging<'_> {
        Staging {
            engine: &self.engine,
            overlay: &self.overlay,
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Checked writes into the overlay, read through the overlay's view.
struct Staging<'a> {
    engine: &'a Engine,
    overlay: &'a InMemoryLimbo,
}

impl Mutable for Staging<'_> {
    fn values_at(&self, key: &str, record: RecordId, timestamp: Version) -> BTreeSet<Value> {
        let prior = self.engine.select_at(key, record, timestamp);
        self.overlay.select_with(key, record, timestamp, prior)
    }

    fn current_record(&self, record: RecordId) -> RecordContext {
        let prior = self.engine.select_record(record);
        self.overlay
            .select_record_with(record, Version::LATEST, prior)
    }

    fn stage(&mut self, action: Action, key: &Key, value: Value, record: RecordId) -> CoreResult<()> {
        let version = self.engine.next_version();
        self.overlay
            .insert(Write::new(action, key, value, record, version), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::Operator;

    fn engine() -> Engine {
        Engine::open_in_memory().unwrap()
    }

    #[test]
    fn staged_writes_stay_private_until_commit() {
        let engine = engine();
        let mut txn = engine.begin();
        assert_eq!(txn.state(), TransactionState::Unstarted);
        assert!(txn.add("name", "jeff", 1).unwrap());
        assert_eq!(txn.state(), TransactionState::Active);
        assert!(txn.verify("name", &"jeff".into(), 1).unwrap());
        assert!(!engine.verify("name", &"jeff".into(), 1));
        assert_eq!(txn.write_count(), 1);

        assert!(txn.commit().unwrap());
        assert_eq!(txn.state(), TransactionState::Committed);
        assert!(engine.verify("name", &"jeff".into(), 1));
        assert!(engine.registry().is_empty());
    }

    #[test]
    fn reads_overlay_the_engine() {
        let engine = engine();
        engine.add("tag", "a", 1).unwrap();
        engine.add("tag", "b", 1).unwrap();
        engine.transport().unwrap();

        let mut txn = engine.begin();
        txn.remove("tag", "a", 1).unwrap();
        txn.add("tag", "c", 1).unwrap();
        txn.add("bio", "quick brown fox", 1).unwrap();
        assert_eq!(
            txn.select("tag", 1).unwrap(),
            BTreeSet::from([Value::from("b"), Value::from("c")])
        );
        assert_eq!(txn.describe(1).unwrap().len(), 2);
        assert_eq!(txn.browse("tag").unwrap().len(), 2);
        assert_eq!(txn.audit(1).unwrap().len(), 5);
        assert_eq!(txn.audit_key("tag", 1).unwrap().len(), 4);
        assert!(txn.contains(1).unwrap());
        assert_eq!(txn.search("bio", "fox").unwrap(), BTreeSet::from([1]));

        let any = Criterion::new(Operator::NotEquals, vec!["zzz".into()]).unwrap();
        assert_eq!(txn.explore("tag", &any).unwrap()[&1].len(), 2);
        txn.abort();
        assert_eq!(engine.select("tag", 1).len(), 2);
    }

    #[test]
    fn a_commit_to_a_watched_cell_conflicts() {
        let engine = engine();
        let mut a = engine.begin();
        a.add("foo", "mine", 1).unwrap();

        let mut b = engine.begin();
        b.add("foo", "theirs", 1).unwrap();
        assert!(b.commit().unwrap());

        let err = a.select("foo", 1).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(a.state(), TransactionState::Conflicted);
        assert_eq!(a.write_count(), 0);
        assert!(a.commit().unwrap_err().is_conflict());
        assert!(a.add("x", 1, 2).unwrap_err().is_conflict());

        assert_eq!(engine.select("foo", 1), BTreeSet::from([Value::from("theirs")]));
        assert!(engine.registry().is_empty());
    }

    #[test]
    fn direct_writes_conflict_at_commit() {
        let engine = engine();
        let mut txn = engine.begin();
        txn.browse("name").unwrap();
        txn.add("age", 30, 1).unwrap();
        engine.add("name", "jeff", 9).unwrap();

        assert!(matches!(
            txn.commit(),
            Err(CoreError::TransactionConflict { token }) if token == Token::key("name")
        ));
        assert!(!engine.verify("age", &30.into(), 1));
    }

    #[test]
    fn unrelated_transactions_are_independent() {
        let engine = engine();
        let mut a = engine.begin();
        let mut b = engine.begin();
        a.add("k", 1, 1).unwrap();
        b.add("k", 1, 2).unwrap();
        assert!(a.commit().unwrap());
        assert!(b.commit().unwrap());
        assert_eq!(engine.browse("k")[&Value::Integer(1)].len(), 2);
    }

    #[test]
    fn own_writes_do_not_conflict() {
        let engine = engine();
        let mut txn = engine.begin();
        txn.add("k", 1, 1).unwrap();
        txn.set("k", 2, 1).unwrap();
        assert!(txn.verify_and_swap("k", 2, 1, 3).unwrap());
        assert!(!txn.verify_or_set("k", 3, 1).unwrap());
        assert_eq!(txn.clear_key("k", 1).unwrap(), 1);
        txn.add("j", 1, 1).unwrap();
        assert_eq!(txn.clear_record(1).unwrap(), 1);
        assert!(txn.commit().unwrap());
        assert!(engine.select_record(1).is_empty());
        assert!(engine.contains(1));
    }

    #[test]
    fn commit_without_operations_is_a_no_op() {
        let engine = engine();
        let mut txn = engine.begin();
        assert!(!txn.commit().unwrap());
        assert!(matches!(
            txn.select("k", 1),
            Err(CoreError::TransactionClosed)
        ));
        assert_eq!(engine.buffered(), 0);
    }

    #[test]
    fn abort_and_drop_release_registrations() {
        let engine = engine();
        let mut txn = engine.begin();
        txn.select("k", 1).unwrap();
        txn.describe(1).unwrap();
        assert_eq!(engine.registry().len(), 2);
        txn.abort();
        txn.abort();
        assert!(engine.registry().is_empty());
        assert!(matches!(txn.commit(), Err(CoreError::TransactionClosed)));

        {
            let mut dropped = engine.begin();
            dropped.add("k", 1, 1).unwrap();
            assert_eq!(engine.registry().len(), 1);
        }
        assert!(engine.registry().is_empty());
        assert!(engine.select("k", 1).is_empty());
    }

    #[test]
    fn revert_chronologize_and_ping_see_staged_writes() {
        let engine = engine();
        engine.add("tag", "a", 1).unwrap();
        let then = *engine.audit(1).keys().last().unwrap();
        engine.add("tag", "b", 1).unwrap();

        let mut txn = engine.begin();
        assert!(!txn.ping(2).unwrap());
        txn.add("tag", "x", 2).unwrap();
        assert!(txn.ping(2).unwrap());
        assert!(!engine.ping(2));

        txn.add("tag", "c", 1).unwrap();
        let chronology = txn.chronologize("tag", 1).unwrap();
        assert_eq!(chronology.len(), 3);
        assert_eq!(chronology.values().last().unwrap().len(), 3);

        assert_eq!(txn.revert("tag", 1, then).unwrap(), 2);
        assert_eq!(txn.select("tag", 1).unwrap(), BTreeSet::from([Value::from("a")]));
        assert_eq!(engine.select("tag", 1).len(), 2);
        assert!(txn.commit().unwrap());
        assert_eq!(engine.select("tag", 1), BTreeSet::from([Value::from("a")]));
        assert!(engine.ping(2));
    }

    #[test]
    fn committed_writes_are_later_than_everything_shared() {
        let engine = engine();
        let mut txn = engine.begin();
        txn.add("k", "staged", 1).unwrap();
        engine.add("k", "direct", 2).unwrap();
        txn.commit().unwrap();

        let staged = engine.audit(1).into_keys().next().unwrap();
        let direct = engine.audit(2).into_keys().next().unwrap();
        assert!(staged > direct);
    }
}
