//! Checked writes shared by the engine and transactions.
//!
//! Each operation reads the current state through a [`Mutable`] target and
//! stages only the toggles that change it, so a mapping is never added
//! twice or removed when absent.

use crate::error::{CoreError, CoreResult};
use crate::limbo::RecordContext;
use crate::types::{RecordId, Version};
use crate::write::{Action, Key};
use std::collections::BTreeSet;
use tempora_codec::Value;

/// Where checked writes land: the engine buffer or a transaction overlay.
pub(crate) trait Mutable {
    /// Values of `key` in `record` at `timestamp`.
    fn values_at(&self, key: &str, record: RecordId, timestamp: Version) -> BTreeSet<Value>;

    /// Current values of `key` in `record`.
    fn current(&self, key: &str, record: RecordId) -> BTreeSet<Value> {
        self.values_at(key, record, Version::LATEST)
    }

    /// Current key -> values of `record`.
    fn current_record(&self, record: RecordId) -> RecordContext;

    /// Stages one toggle.
    fn stage(&mut self, action: Action, key: &Key, value: Value, record: RecordId)
        -> CoreResult<()>;
}

pub(crate) fn validate_key(key: &str) -> CoreResult<Key> {
    if key.is_empty() {
        return Err(CoreError::invalid_argument("key must not be empty"));
    }
    Ok(Key::new(key))
}

pub(crate) fn add<M: Mutable>(
    target: &mut M,
    key: &str,
    value: Value,
    record: RecordId,
) -> CoreResult<bool> {
    let key = validate_key(key)?;
    if target.current(key.as_str(), record).contains(&value) {
        return Ok(false);
    }
    target.stage(Action::Add, &key, value, record)?;
    Ok(true)
}

pub(crate) fn remove<M: Mutable>(
    target: &mut M,
    key: &str,
    value: Value,
    record: RecordId,
) -> CoreResult<bool> {
    let key = validate_key(key)?;
    if !target.current(key.as_str(), record).contains(&value) {
        return Ok(false);
    }
    target.stage(Action::Remove, &key, value, record)?;
    Ok(true)
}

/// Leaves `value` as the only value of `key` in `record`. Returns whether
/// anything was staged.
pub(crate) fn set<M: Mutable>(
    target: &mut M,
    key: &str,
    value: Value,
    record: RecordId,
) -> CoreResult<bool> {
    let key = validate_key(key)?;
    let current = target.current(key.as_str(), record);
    let mut changed = false;
    for stale in current.iter().filter(|v| **v != value) {
        target.stage(Action::Remove, &key, stale.clone(), record)?;
        changed = true;
    }
    if !current.contains(&value) {
        target.stage(Action::Add, &key, value, record)?;
        changed = true;
    }
    Ok(changed)
}

pub(crate) fn clear_key<M: Mutable>(
    target: &mut M,
    key: &str,
    record: RecordId,
) -> CoreResult<usize> {
    let key = validate_key(key)?;
    let current = target.current(key.as_str(), record);
    for value in &current {
        target.stage(Action::Remove, &key, value.clone(), record)?;
    }
    Ok(current.len())
}

pub(crate) fn clear_record<M: Mutable>(target: &mut M, record: RecordId) -> CoreResult<usize> {
    let mut removed = 0;
    for (key, values) in target.current_record(record) {
        for value in values {
            target.stage(Action::Remove, &key, value, record)?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Replaces `expected` with `replacement` if `expected` is present and
/// `replacement` is not.
pub(crate) fn verify_and_swap<M: Mutable>(
    target: &mut M,
    key: &str,
    expected: Value,
    record: RecordId,
    replacement: Value,
) -> CoreResult<bool> {
    let key = validate_key(key)?;
    let current = target.current(key.as_str(), record);
    if !current.contains(&expected) {
        return Ok(false);
    }
    if expected == replacement {
        return Ok(true);
    }
    if current.contains(&replacement) {
        return Ok(false);
    }
    target.stage(Action::Remove, &key, expected, record)?;
    target.stage(Action::Add, &key, replacement, record)?;
    Ok(true)
}

/// Stages the toggles that bring `key` in `record` back to its values at
/// `timestamp`. Returns how many were staged.
pub(crate) fn revert<M: Mutable>(
    target: &mut M,
    key: &str,
    record: RecordId,
    timestamp: Version,
) -> CoreResult<usize> {
    let key = validate_key(key)?;
    let current = target.current(key.as_str(), record);
    let past = target.values_at(key.as_str(), record, timestamp);
    let mut staged = 0;
    for value in current.difference(&past) {
        target.stage(Action::Remove, &key, value.clone(), record)?;
        staged += 1;
    }
    for value in past.difference(&current) {
        target.stage(Action::Add, &key, value.clone(), record)?;
        staged += 1;
    }
    Ok(staged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limbo::{InMemoryLimbo, Limbo, Replay};
    use crate::write::Write;

    #[derive(Default)]
    struct Scratch {
        limbo: InMemoryLimbo,
        next: u64,
    }

    impl Mutable for Scratch {
        fn values_at(&self, key: &str, record: RecordId, timestamp: Version) -> BTreeSet<Value> {
            self.limbo.select_at(key, record, timestamp)
        }

        fn current_record(&self, record: RecordId) -> RecordContext {
            self.limbo.select_record(record)
        }

        fn stage(
            &mut self,
            action: Action,
            key: &Key,
            value: Value,
            record: RecordId,
        ) -> CoreResult<()> {
            self.next += 1;
            self.limbo.insert(
                Write::new(action, key, value, record, Version::new(self.next)),
                false,
            )
        }
    }

    #[test]
    fn add_and_remove_only_toggle_when_needed() {
        let mut s = Scratch::default();
        assert!(add(&mut s, "name", "jeff".into(), 1).unwrap());
        assert!(!add(&mut s, "name", "jeff".into(), 1).unwrap());
        assert!(!remove(&mut s, "name", "bob".into(), 1).unwrap());
        assert!(remove(&mut s, "name", "jeff".into(), 1).unwrap());
        assert_eq!(s.limbo.len(), 2);
    }

    #[test]
    fn set_leaves_a_single_value() {
        let mut s = Scratch::default();
        add(&mut s, "tag", "a".into(), 1).unwrap();
        add(&mut s, "tag", "b".into(), 1).unwrap();
        assert!(set(&mut s, "tag", "b".into(), 1).unwrap());
        assert_eq!(s.current("tag", 1), BTreeSet::from([Value::from("b")]));
        assert!(!set(&mut s, "tag", "b".into(), 1).unwrap());
    }

    #[test]
    fn clearing_removes_everything_named() {
        let mut s = Scratch::default();
        add(&mut s, "a", 1.into(), 7).unwrap();
        add(&mut s, "a", 2.into(), 7).unwrap();
        add(&mut s, "b", 3.into(), 7).unwrap();
        assert_eq!(clear_key(&mut s, "a", 7).unwrap(), 2);
        assert_eq!(s.current_record(7).len(), 1);
        assert_eq!(clear_record(&mut s, 7).unwrap(), 1);
        assert!(s.current_record(7).is_empty());
        assert_eq!(clear_record(&mut s, 7).unwrap(), 0);
    }

    #[test]
    fn swap_requires_expected_and_free_replacement() {
        let mut s = Scratch::default();
        assert!(!verify_and_swap(&mut s, "k", 1.into(), 1, 2.into()).unwrap());
        add(&mut s, "k", 1.into(), 1).unwrap();
        add(&mut s, "k", 2.into(), 1).unwrap();
        assert!(!verify_and_swap(&mut s, "k", 1.into(), 1, 2.into()).unwrap());
        assert!(verify_and_swap(&mut s, "k", 1.into(), 1, 3.into()).unwrap());
        assert_eq!(
            s.current("k", 1),
            BTreeSet::from([Value::Integer(2), Value::Integer(3)])
        );
        assert!(verify_and_swap(&mut s, "k", 3.into(), 1, 3.into()).unwrap());
    }

    #[test]
    fn revert_restores_the_values_at_a_timestamp() {
        let mut s = Scratch::default();
        add(&mut s, "tag", "a".into(), 1).unwrap();
        add(&mut s, "tag", "b".into(), 1).unwrap();
        let then = Version::new(s.next);
        remove(&mut s, "tag", "a".into(), 1).unwrap();
        add(&mut s, "tag", "c".into(), 1).unwrap();

        assert_eq!(revert(&mut s, "tag", 1, then).unwrap(), 2);
        assert_eq!(
            s.current("tag", 1),
            BTreeSet::from([Value::from("a"), Value::from("b")])
        );
        assert_eq!(revert(&mut s, "tag", 1, then).unwrap(), 0);
        assert_eq!(revert(&mut s, "tag", 1, Version::MIN).unwrap(), 2);
        assert!(s.current("tag", 1).is_empty());
    }

    #[test]
    fn empty_keys_are_rejected() {
        let mut s = Scratch::default();
        let err = add(&mut s, "", 1.into(), 1).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument { .. }));
    }
}
