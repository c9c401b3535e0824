//! Reads spanning the buffer and the permanent store.

use std::collections::BTreeSet;
use tempora_core::{Criterion, Operator, Value, Version};
use tempora_testkit::prelude::*;

#[test]
fn explore_spans_both_stores() {
    let test_engine = scenarios::people();
    let over_29 = Criterion::new(Operator::GreaterThan, vec![Value::from(29)]).unwrap();
    let found = test_engine.explore("age", &over_29);
    assert_eq!(found.keys().copied().collect::<Vec<_>>(), vec![1, 3]);

    let jeffs = Criterion::new(Operator::Equals, vec![Value::from("jeff")]).unwrap();
    assert_eq!(test_engine.explore("name", &jeffs).len(), 2);

    let not_jeff = Criterion::new(Operator::NotEquals, vec![Value::from("jeff")]).unwrap();
    assert_eq!(
        test_engine.explore("name", &not_jeff).into_keys().collect::<Vec<_>>(),
        vec![2]
    );
}

#[test]
fn browse_groups_records_by_value() {
    let test_engine = scenarios::people();
    let names = test_engine.browse("name");
    assert_eq!(names[&Value::from("jeff")], BTreeSet::from([1, 3]));
    assert_eq!(names[&Value::from("ashleah")], BTreeSet::from([2]));
}

#[test]
fn reads_travel_back_past_a_transport() {
    with_temp_engine(|engine| {
        engine.set("status", "draft", 5).unwrap();
        let draft = engine.audit(5).into_keys().last().unwrap();
        engine.transport().unwrap();
        engine.set("status", "final", 5).unwrap();

        assert_eq!(
            engine.select_at("status", 5, draft),
            BTreeSet::from([Value::from("draft")])
        );
        assert_eq!(
            engine.select("status", 5),
            BTreeSet::from([Value::from("final")])
        );
        assert!(engine.describe_at(5, Version::MIN).is_empty());
        assert_eq!(engine.audit_key("status", 5).len(), 3);
    });
}

#[test]
fn search_matches_ordered_infixes() {
    with_temp_engine(|engine| {
        engine.add("bio", "The quick brown fox jumps", 1).unwrap();
        engine.add("bio", "A lazy dog sleeps", 2).unwrap();
        engine.transport().unwrap();
        engine.add("bio", "Quick thinking, brown shoes", 3).unwrap();

        assert_eq!(engine.search("bio", "quick brown"), BTreeSet::from([1, 3]));
        assert_eq!(engine.search("bio", "uic row"), BTreeSet::from([1, 3]));
        assert_eq!(engine.search("bio", "brown quick"), BTreeSet::new());
        assert_eq!(engine.search("bio", "DOG"), BTreeSet::from([2]));
        assert!(engine.search("bio", "the a of").is_empty());
        assert!(engine.search("bio", "").is_empty());
    });
}

#[test]
fn search_forgets_removed_text() {
    with_temp_engine(|engine| {
        engine.add("bio", "gardening and chess", 1).unwrap();
        engine.transport().unwrap();
        engine.remove("bio", "gardening and chess", 1).unwrap();
        assert!(engine.search("bio", "chess").is_empty());
    });
}
