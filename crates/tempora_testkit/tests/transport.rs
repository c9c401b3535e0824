//! Transport moves every write exactly once, in order.

use std::time::{Duration, Instant};
use tempora_core::{
    Config, CoreError, Engine, InMemoryLimbo, Limbo, PermanentStore, Replay, Version,
};
use tempora_testkit::prelude::*;

#[test]
fn transport_drains_the_source_in_version_order() {
    let writes = scenarios::numbered("n", 20);
    let source = InMemoryLimbo::from_writes(writes.clone());
    let store = ScriptedStore::new();

    assert_eq!(source.transport(&store, true).unwrap(), 20);
    assert!(source.is_empty());
    assert_eq!(store.accepted(), writes);
    let versions: Vec<Version> = store.accepted().iter().map(|w| w.version()).collect();
    assert!(versions.windows(2).all(|v| v[0] < v[1]));
}

#[test]
fn refusal_on_the_kth_write_keeps_the_rest() {
    for k in 1..=5 {
        let source = InMemoryLimbo::from_writes(scenarios::numbered("n", 5));
        let store = ScriptedStore::failing_on(k);
        let err = source.transport(&store, true).unwrap_err();
        assert!(matches!(err, CoreError::Rejected { .. }));
        assert_eq!(store.accepted().len(), k - 1);
        assert_eq!(source.len(), 5 - (k - 1));
        assert_eq!(source.front().map(|w| w.version()), Some(Version::new(k as u64)));
    }
}

#[test]
fn engine_reads_stay_whole_across_a_refused_transport() {
    init_tracing();
    let store = ScriptedStore::failing_on(3);
    let engine = Engine::open_with(
        Config::default(),
        Box::new(InMemoryLimbo::new()),
        Box::new(store.clone()),
    )
    .unwrap();
    for i in 0..5 {
        engine.add("n", i, 1).unwrap();
    }
    assert!(engine.transport().is_err());
    assert_eq!(engine.buffered(), 3);
    assert_eq!(engine.select("n", 1).len(), 5);

    store.heal();
    assert_eq!(engine.transport().unwrap(), 3);
    assert_eq!(engine.buffered(), 0);
    assert_eq!(engine.select("n", 1).len(), 5);
    assert_eq!(store.record_writes(1).as_slice().select("n", 1).len(), 5);
}

#[test]
fn background_transporter_recovers_after_refusals() {
    init_tracing();
    let store = ScriptedStore::failing_on(2);
    let config = Config::default().transport_wait(Duration::from_millis(5));
    let engine = Engine::open_with(
        config,
        Box::new(InMemoryLimbo::new()),
        Box::new(store.clone()),
    )
    .unwrap();
    let transporter = engine.start_transporter().unwrap();
    for i in 0..4 {
        engine.add("n", i, 1).unwrap();
    }

    let start = Instant::now();
    while store.attempts() < 3 && start.elapsed() < Duration::from_secs(10) {
        std::thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(store.accepted().len(), 1);
    store.heal();

    let start = Instant::now();
    while engine.buffered() > 0 && start.elapsed() < Duration::from_secs(10) {
        std::thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(engine.buffered(), 0);
    assert_eq!(store.accepted().len(), 4);
    drop(transporter);
}
