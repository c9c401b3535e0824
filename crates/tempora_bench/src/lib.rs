//! Benchmark utilities.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;
use tempora_core::{Action, InMemoryLimbo, RecordId, Value, Version, Write};

const WORDS: &[&str] = &[
    "river", "granite", "lantern", "copper", "meadow", "harbor", "quartz", "willow", "ember",
    "signal", "orchard", "falcon",
];

/// A random sentence of `words` words.
pub fn random_sentence(words: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..words)
        .filter_map(|_| WORDS.choose(&mut rng).copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// A valid toggle history of `count` writes spread over `records` records
/// and `keys` keys. Versions run `1..=count`.
pub fn random_history(count: usize, records: u64, keys: usize) -> Vec<Write> {
    let mut rng = rand::thread_rng();
    let mut present = HashSet::new();
    (0..count)
        .map(|i| {
            let key = format!("k{}", rng.gen_range(0..keys.max(1)));
            let value = Value::from(rng.gen_range(0..16i64));
            let record: RecordId = rng.gen_range(0..records.max(1));
            let mapping = (key.clone(), value.clone(), record);
            let action = if present.insert(mapping.clone()) {
                Action::Add
            } else {
                present.remove(&mapping);
                Action::Remove
            };
            Write::new(action, key, value, record, Version::new(i as u64 + 1))
        })
        .collect()
}

/// An in-memory Limbo holding `random_history(count, records, keys)`.
pub fn populated_limbo(count: usize, records: u64, keys: usize) -> InMemoryLimbo {
    InMemoryLimbo::from_writes(random_history(count, records, keys))
}
