//! Tests for the transient (single-owner, batch-mutation) variants.
//!
//! Every batch of transient edits must land on exactly the collection the
//! same edits would produce persistently, and no source collection may
//! ever observe a transient's writes.

use rstest::rstest;
use seqtrie::contract::Metadata;
use seqtrie::hashmap::{PersistentHashMap, TransientHashMap};
use seqtrie::value::Value;
use seqtrie::vector::{PersistentVector, TransientVector};

// =============================================================================
// Vector transients
// =============================================================================

#[rstest]
fn test_transient_build_matches_persistent_build() {
    let mut transient = TransientVector::new();
    let mut persistent = PersistentVector::new();
    for index in 0..10_000 {
        transient.push_back(Value::Int(index));
        persistent = persistent.push_back(Value::Int(index));
    }
    assert_eq!(transient.persistent(), persistent);
}

#[rstest]
fn test_transient_assoc_matches_persistent_assoc() {
    let source: PersistentVector = (0..2_000).map(Value::Int).collect();

    let mut transient = source.transient();
    let mut persistent = source.clone();
    for index in (0..2_000).step_by(3) {
        transient.assoc(index, Value::Int(-1)).unwrap();
        persistent = persistent.assoc(index, Value::Int(-1)).unwrap();
    }

    assert_eq!(transient.persistent(), persistent);
    // the source saw none of it
    for index in 0..2_000 {
        assert_eq!(
            source.get(index),
            Some(&Value::Int(i64::try_from(index).unwrap()))
        );
    }
}

#[rstest]
fn test_transient_pop_matches_persistent_pop() {
    let source: PersistentVector = (0..1_100).map(Value::Int).collect();

    let mut transient = source.transient();
    let mut persistent = source.clone();
    for _ in 0..600 {
        transient.pop().unwrap();
        persistent = persistent.pop().unwrap();
    }
    assert_eq!(transient.persistent(), persistent);
    assert_eq!(source.len(), 1_100);
}

#[rstest]
fn test_interleaved_transient_edits() {
    let mut transient = TransientVector::new();
    for index in 0..100 {
        transient.push_back(Value::Int(index));
    }
    for _ in 0..50 {
        transient.pop().unwrap();
    }
    for index in 0..25 {
        transient.assoc(index, Value::Int(-1)).unwrap();
    }
    let vector = transient.persistent();

    assert_eq!(vector.len(), 50);
    assert_eq!(vector.get(10), Some(&Value::Int(-1)));
    assert_eq!(vector.get(30), Some(&Value::Int(30)));
}

#[rstest]
fn test_vector_meta_survives_the_transient_round_trip() {
    let meta = PersistentHashMap::new().insert(Value::from("tag"), Value::Int(1));
    let source: PersistentVector = (0..5).map(Value::Int).collect();
    let tagged = source.with_meta(Some(meta.clone()));

    let mut transient = tagged.transient();
    transient.push_back(Value::Int(5));
    let result = transient.persistent();

    assert_eq!(result.meta(), Some(&meta));
    assert_eq!(result.len(), 6);
}

// =============================================================================
// Map transients
// =============================================================================

#[rstest]
fn test_transient_map_build_matches_persistent_build() {
    let mut transient = TransientHashMap::new();
    let mut persistent = PersistentHashMap::new();
    for index in 0..5_000 {
        transient.insert(Value::Int(index), Value::Int(index * 2));
        persistent = persistent.insert(Value::Int(index), Value::Int(index * 2));
    }
    assert_eq!(transient.persistent(), persistent);
}

#[rstest]
fn test_transient_map_removals_match_persistent() {
    let source: PersistentHashMap = (0..1_000)
        .map(|index| (Value::Int(index), Value::Int(index)))
        .collect();

    let mut transient = source.transient();
    let mut persistent = source.clone();
    for index in (0..1_000).step_by(2) {
        transient.remove(&Value::Int(index));
        persistent = persistent.remove(&Value::Int(index));
    }

    assert_eq!(transient.persistent(), persistent);
    assert_eq!(source.len(), 1_000);
}

#[rstest]
fn test_transient_map_handles_nil_key() {
    let mut transient = TransientHashMap::new();
    transient.insert(Value::Nil, Value::Int(1));
    transient.insert(Value::Int(1), Value::Int(10));
    assert_eq!(transient.len(), 2);
    assert_eq!(transient.get(&Value::Nil), Some(&Value::Int(1)));

    transient.insert(Value::Nil, Value::Int(2));
    assert_eq!(transient.len(), 2);
    transient.remove(&Value::Nil);
    assert_eq!(transient.len(), 1);

    let map = transient.persistent();
    assert_eq!(map.get(&Value::Nil), None);
    assert_eq!(map.get(&Value::Int(1)), Some(&Value::Int(10)));
}

#[rstest]
fn test_transient_overwrite_keeps_count() {
    let mut transient = TransientHashMap::new();
    transient.insert(Value::Int(1), Value::Int(1));
    transient.insert(Value::Int(1), Value::Int(2));
    assert_eq!(transient.len(), 1);
    assert_eq!(transient.get(&Value::Int(1)), Some(&Value::Int(2)));
}

#[rstest]
fn test_map_meta_survives_the_transient_round_trip() {
    let meta = PersistentHashMap::new().insert(Value::from("tag"), Value::Int(1));
    let tagged = PersistentHashMap::new()
        .insert(Value::Int(1), Value::Int(10))
        .with_meta(Some(meta.clone()));

    let mut transient = tagged.transient();
    transient.insert(Value::Int(2), Value::Int(20));
    let result = transient.persistent();

    assert_eq!(result.meta(), Some(&meta));
    assert_eq!(result.len(), 2);
}

// =============================================================================
// Reuse of a frozen transient's structure
// =============================================================================

#[rstest]
fn test_second_transient_cannot_disturb_the_first_result() {
    let mut first = TransientVector::new();
    for index in 0..100 {
        first.push_back(Value::Int(index));
    }
    let frozen = first.persistent();

    // A fresh transient over the frozen vector carries a new token, so the
    // frozen vector's nodes are copied before any write lands.
    let mut second = frozen.transient();
    for index in 0..100 {
        second.assoc(index, Value::Int(-1)).unwrap();
    }
    let edited = second.persistent();

    for index in 0..100 {
        assert_eq!(
            frozen.get(index),
            Some(&Value::Int(i64::try_from(index).unwrap()))
        );
        assert_eq!(edited.get(index), Some(&Value::Int(-1)));
    }
}
