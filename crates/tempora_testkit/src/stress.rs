//! Concurrent transaction stress helpers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tempora_core::{CoreResult, Engine, Value};

/// Result of a stress run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Transactions that committed.
    pub committed: usize,
    /// Attempts that ended in a conflict and were retried.
    pub conflicts: usize,
    /// Total duration.
    pub duration: Duration,
}

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of concurrent threads.
    pub threads: usize,
    /// Committed transactions each thread performs.
    pub per_thread: usize,
    /// Number of distinct counters contended for.
    pub counters: u64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            per_thread: 50,
            counters: 2,
        }
    }
}

/// Reads counter `record`'s `count` inside a transaction and writes back
/// one more, retrying on conflict until it commits.
///
/// # Errors
///
/// Returns any error other than a conflict.
pub fn increment(engine: &Engine, record: u64) -> CoreResult<usize> {
    let mut conflicts = 0;
    loop {
        let mut txn = engine.begin();
        let attempt = (|| {
            let current = txn
                .select("count", record)?
                .iter()
                .find_map(Value::as_integer)
                .unwrap_or(0);
            txn.set("count", current + 1, record)?;
            txn.commit()
        })();
        match attempt {
            Ok(_) => return Ok(conflicts),
            Err(e) if e.is_conflict() => conflicts += 1,
            Err(e) => return Err(e),
        }
    }
}

/// Runs `config.threads` threads each committing `config.per_thread`
/// increments spread over `config.counters` records.
///
/// # Panics
///
/// Panics if an increment fails with anything but a conflict.
pub fn stress_counters(engine: &Engine, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let conflicts = AtomicUsize::new(0);
    thread::scope(|scope| {
        for t in 0..config.threads {
            let conflicts = &conflicts;
            scope.spawn(move || {
                for i in 0..config.per_thread {
                    let record = ((t + i) as u64) % config.counters.max(1);
                    let retried = increment(engine, record).expect("increment failed");
                    conflicts.fetch_add(retried, Ordering::Relaxed);
                }
            });
        }
    });
    StressTestResult {
        committed: config.threads * config.per_thread,
        conflicts: conflicts.into_inner(),
        duration: start.elapsed(),
    }
}

/// Sum of every counter's current value.
pub fn counter_total(engine: &Engine, counters: u64) -> i64 {
    (0..counters)
        .flat_map(|record| engine.select("count", record))
        .filter_map(|v| v.as_integer())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestEngine;

    #[test]
    fn single_thread_never_conflicts() {
        let test_engine = TestEngine::memory();
        for _ in 0..10 {
            assert_eq!(increment(&test_engine, 0).unwrap(), 0);
        }
        assert_eq!(counter_total(&test_engine, 1), 10);
    }

    #[test]
    fn contended_counters_lose_no_increment() {
        let test_engine = TestEngine::memory();
        let config = StressConfig::default();
        let result = stress_counters(&test_engine, &config);
        assert_eq!(result.committed, 200);
        assert_eq!(counter_total(&test_engine, config.counters), 200);
    }
}
