//! Engine fixtures and test logging.

use std::path::Path;
use std::sync::Once;
use tempfile::TempDir;
use tempora_core::{Config, Engine, Version, Write};
use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber filtered by `RUST_LOG` (default `warn`).
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// An engine with automatic cleanup.
pub struct TestEngine {
    /// The engine instance.
    pub engine: Engine,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestEngine {
    /// Creates a volatile engine.
    pub fn memory() -> Self {
        init_tracing();
        Self {
            engine: Engine::open_in_memory().expect("Failed to open in-memory engine"),
            temp_dir: None,
        }
    }

    /// Creates an engine in a fresh temporary directory.
    pub fn file() -> Self {
        Self::file_with(Config::default())
    }

    /// Creates an engine in a fresh temporary directory with `config`.
    pub fn file_with(config: Config) -> Self {
        init_tracing();
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let engine = Engine::open(&temp_dir.path().join("engine"), config)
            .expect("Failed to open file engine");
        Self {
            engine,
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the engine directory if file-based, None if in-memory.
    pub fn path(&self) -> Option<&Path> {
        self.engine.path()
    }

    /// Closes and reopens a file-based engine in the same directory.
    ///
    /// # Panics
    ///
    /// Panics on an in-memory engine.
    pub fn reopen(self) -> Self {
        let config = self.engine.config().clone();
        let temp_dir = self.temp_dir.expect("Only file engines can be reopened");
        drop(self.engine);
        let engine = Engine::open(&temp_dir.path().join("engine"), config)
            .expect("Failed to reopen file engine");
        Self {
            engine,
            temp_dir: Some(temp_dir),
        }
    }
}

impl std::ops::Deref for TestEngine {
    type Target = Engine;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

/// Runs a test with a temporary in-memory engine.
pub fn with_temp_engine<F, R>(f: F) -> R
where
    F: FnOnce(&Engine) -> R,
{
    let test_engine = TestEngine::memory();
    f(&test_engine.engine)
}

/// Runs a test with a temporary file-based engine.
pub fn with_file_engine<F, R>(f: F) -> R
where
    F: FnOnce(&Engine) -> R,
{
    let test_engine = TestEngine::file();
    f(&test_engine.engine)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// `ADD(foo,bar,1)@1`, `ADD(foo,baz,1)@2`, `REMOVE(foo,bar,1)@3`.
    pub fn toggles() -> Vec<Write> {
        vec![
            Write::add("foo", "bar", 1, Version::new(1)),
            Write::add("foo", "baz", 1, Version::new(2)),
            Write::remove("foo", "bar", 1, Version::new(3)),
        ]
    }

    /// `count` ADD writes of `key -> i` into record `i`, versions `1..=count`.
    pub fn numbered(key: &str, count: u64) -> Vec<Write> {
        (1..=count)
            .map(|i| {
                let value = i64::try_from(i).expect("count fits in i64");
                Write::add(key, value, i, Version::new(i))
            })
            .collect()
    }

    /// An engine holding a few people, half of them transported.
    pub fn people() -> TestEngine {
        let test_engine = TestEngine::memory();
        let engine = &test_engine.engine;
        for (record, name, age) in [(1, "jeff", 30), (2, "ashleah", 28), (3, "jeff", 41)] {
            engine.add("name", name, record).expect("Failed to add name");
            engine.add("age", age, record).expect("Failed to add age");
            if record == 2 {
                engine.transport().expect("Failed to transport");
            }
        }
        test_engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_engine() {
        let test_engine = TestEngine::memory();
        assert!(test_engine.path().is_none());
        assert!(test_engine.add("k", 1, 1).unwrap());
    }

    #[test]
    fn file_engine_survives_reopen() {
        let test_engine = TestEngine::file();
        test_engine.add("k", 1, 1).unwrap();
        assert!(test_engine.path().is_some());
        let test_engine = test_engine.reopen();
        assert!(test_engine.verify("k", &1.into(), 1));
    }

    #[test]
    fn people_scenario_spans_both_stores() {
        let test_engine = scenarios::people();
        assert_eq!(test_engine.buffered(), 2);
        assert_eq!(test_engine.browse("name").len(), 2);
        with_temp_engine(|engine| assert!(engine.browse("name").is_empty()));
    }

    #[test]
    fn numbered_writes_are_version_ordered() {
        let writes = scenarios::numbered("n", 5);
        assert!(writes.windows(2).all(|w| w[0].version() < w[1].version()));
    }
}
