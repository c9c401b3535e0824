//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data that maintains the
//! invariants stores rely on: keys are non-empty, floats are never NaN and
//! write histories are in version order with toggles that alternate per
//! mapping.

use proptest::prelude::*;
use std::collections::HashSet;
use tempora_core::{Action, RecordId, Value, Version, Write};

/// Strategy for generating valid keys.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,11}").expect("Invalid regex")
}

/// Strategy for generating values of every kind.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        any::<f64>()
            .prop_filter("NaN is not a value", |f| !f.is_nan())
            .prop_map(Value::Float),
        "[a-zA-Z ]{0,24}".prop_map(Value::Text),
        any::<u64>().prop_map(Value::Link),
    ]
}

/// Strategy for short lowercase sentences, for search tests.
pub fn sentence_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop::sample::select(vec![
            "the", "quick", "brown", "fox", "jumps", "over", "lazy", "dog", "a", "and",
        ]),
        0..8,
    )
    .prop_map(|words| words.join(" "))
}

/// Builds a valid history from `(key, value, record)` picks: each pick
/// toggles its mapping, so it becomes an ADD if the mapping is absent and a
/// REMOVE if present. Versions run `1..`.
pub fn history_from(picks: &[(u8, u8, u8)]) -> Vec<Write> {
    let mut present = HashSet::new();
    picks
        .iter()
        .enumerate()
        .map(|(i, &(key, value, record))| {
            let mapping = (key, value, record);
            let action = if present.insert(mapping) {
                Action::Add
            } else {
                present.remove(&mapping);
                Action::Remove
            };
            Write::new(
                action,
                format!("k{key}").as_str(),
                i64::from(value),
                RecordId::from(record),
                Version::new(i as u64 + 1),
            )
        })
        .collect()
}

/// Strategy for valid histories over a small space of keys, values and
/// records, so mappings are toggled repeatedly.
pub fn history_strategy(max_len: usize) -> impl Strategy<Value = Vec<Write>> {
    prop::collection::vec((0u8..3, 0u8..4, 0u8..4), 0..max_len)
        .prop_map(|picks| history_from(&picks))
}
