//! What survives a restart, a clean one or a crash.

use std::collections::BTreeSet;
use tempora_core::{
    Config, CoreResult, DurableLimbo, Engine, EngineDir, IndexedStore, Limbo, PermanentStore,
    Replay, Value, Write,
};
use tempora_storage::{FileBackend, InMemoryBackend};
use tempora_testkit::prelude::*;

#[test]
fn buffered_and_transported_writes_survive_reopen() {
    let test_engine = TestEngine::file();
    test_engine.add("name", "jeff", 1).unwrap();
    test_engine.transport().unwrap();
    test_engine.add("name", "bob", 2).unwrap();
    test_engine.remove("name", "jeff", 1).unwrap();
    let before = test_engine.audit(1);

    let test_engine = test_engine.reopen();
    assert_eq!(test_engine.buffered(), 2);
    assert!(test_engine.select("name", 1).is_empty());
    assert_eq!(test_engine.select("name", 2), BTreeSet::from([Value::from("bob")]));
    assert_eq!(test_engine.audit(1), before);
}

#[test]
fn versions_keep_rising_across_reopen() {
    let test_engine = TestEngine::file();
    test_engine.add("n", 1, 1).unwrap();
    let first = test_engine.audit(1).into_keys().last().unwrap();

    let test_engine = test_engine.reopen();
    test_engine.add("n", 2, 1).unwrap();
    let second = test_engine.audit(1).into_keys().last().unwrap();
    assert!(second > first);
}

#[test]
fn a_torn_append_loses_only_the_torn_write() -> CoreResult<()> {
    init_tracing();
    let backend = CrashableBackend::new();
    let limbo = DurableLimbo::open(Box::new(backend.clone()), &Config::default())?;
    for write in scenarios::numbered("n", 3) {
        limbo.insert(write, true)?;
    }
    backend.crash_after(10);
    let lost = Write::add("n", 4, 4, tempora_core::Version::new(4));
    assert!(limbo.insert(lost, true).is_err());
    assert!(backend.has_crashed());
    drop(limbo);

    let recovered = DurableLimbo::open(Box::new(backend.survivor()), &Config::default())?;
    assert_eq!(recovered.writes(), scenarios::numbered("n", 3));
    assert!(!recovered.verify("n", &Value::from(4), 4));
    Ok(())
}

#[test]
fn a_torn_batch_is_lost_whole() -> CoreResult<()> {
    let backend = CrashableBackend::new();
    let limbo = DurableLimbo::open(Box::new(backend.clone()), &Config::default())?;
    let mut writes = scenarios::numbered("n", 4);
    let batch = writes.split_off(1);
    limbo.insert(writes[0].clone(), true)?;
    backend.crash_after(40);
    assert!(limbo.insert_all(batch, true).is_err());
    assert_eq!(limbo.writes(), writes);
    drop(limbo);

    let recovered = DurableLimbo::open(Box::new(backend.survivor()), &Config::default())?;
    assert_eq!(recovered.writes(), writes);
    Ok(())
}

#[test]
fn a_torn_consume_replays_the_write_again() -> CoreResult<()> {
    let backend = CrashableBackend::new();
    let limbo = DurableLimbo::open(Box::new(backend.clone()), &Config::default())?;
    for write in scenarios::numbered("n", 2) {
        limbo.insert(write, true)?;
    }
    let store = IndexedStore::new();
    backend.crash_after(3);
    assert!(limbo.transport(&store, true).is_err());
    assert_eq!(store.len(), 1);
    drop(limbo);

    let recovered = DurableLimbo::open(Box::new(backend.survivor()), &Config::default())?;
    assert_eq!(recovered.len(), 2);
    Ok(())
}

#[test]
fn reopening_drops_writes_the_archive_already_holds() -> CoreResult<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("engine");
    let writes = scenarios::numbered("n", 4);
    {
        let engine_dir = EngineDir::open(&path, true)?;
        let buffer = DurableLimbo::open(
            Box::new(FileBackend::open(&engine_dir.buffer_path())?),
            &Config::default(),
        )?;
        let archive = IndexedStore::open(Box::new(FileBackend::open(&engine_dir.archive_path())?))?;
        for write in &writes {
            buffer.insert(write.clone(), true)?;
        }
        // Archived without consuming, as after a crash between the two.
        for write in &writes[..2] {
            archive.accept(write, true)?;
        }
    }

    let engine = Engine::open(&path, Config::default())?;
    assert_eq!(engine.buffered(), 2);
    for record in 1..=4 {
        assert_eq!(engine.select("n", record).len(), 1);
        assert_eq!(engine.audit(record).len(), 1);
    }
    Ok(())
}

#[test]
fn an_in_memory_durable_buffer_feeds_an_engine() -> CoreResult<()> {
    let buffer = DurableLimbo::open(Box::new(InMemoryBackend::new()), &Config::default())?;
    let engine = Engine::open_with(
        Config::default(),
        Box::new(buffer),
        Box::new(IndexedStore::new()),
    )?;
    engine.add("name", "jeff", 1)?;
    assert_eq!(engine.transport()?, 1);
    assert!(engine.verify("name", &Value::from("jeff"), 1));
    Ok(())
}
