//! Unit tests for the sequence abstraction.

use rstest::rstest;
use seqtrie::contract::{Counted, Reduce, Seqable};
use seqtrie::hashmap::PersistentHashMap;
use seqtrie::seq::Seq;
use seqtrie::value::Value;
use seqtrie::vector::PersistentVector;

fn int_sum(seq: &Seq) -> i64 {
    seq.reduce(0_i64, |accumulator, element| match element {
        Value::Int(value) => accumulator + value,
        _ => accumulator,
    })
}

fn cursor_sum(seq: &Seq) -> i64 {
    let mut total = 0;
    let mut cursor = Some(seq.clone());
    while let Some(current) = cursor {
        if let Value::Int(value) = current.first() {
            total += value;
        }
        cursor = current.next();
    }
    total
}

// =============================================================================
// Cursor behavior per variant
// =============================================================================

#[rstest]
fn test_chunk_seq_walks_all_elements() {
    let seq = Seq::from_values((0..10).map(Value::Int)).unwrap();
    let collected: Vec<Value> = seq.iter().collect();
    assert_eq!(collected.len(), 10);
    assert_eq!(collected[3], Value::Int(3));
}

#[rstest]
fn test_string_seq_yields_characters() {
    let seq = Seq::from_str("abc").unwrap();
    assert_eq!(seq.first(), Value::Char('a'));
    assert_eq!(seq.count(), 3);
    assert_eq!(Seq::from_str(""), None);
}

#[rstest]
fn test_range_with_negative_step() {
    let collected: Vec<Value> = Seq::range(5, 0, -2).unwrap().iter().collect();
    assert_eq!(
        collected,
        vec![Value::Int(5), Value::Int(3), Value::Int(1)]
    );
}

#[rstest]
fn test_range_rejects_zero_step_and_empty_spans() {
    assert!(Seq::range(0, 10, 0).is_none());
    assert!(Seq::range(3, 3, 1).is_none());
    assert!(Seq::range(0, 5, -1).is_none());
}

#[rstest]
fn test_cons_is_constant_time_layering() {
    let base = Seq::from_values((0..3).map(Value::Int)).unwrap();
    let layered = base.cons(Value::Int(-1)).cons(Value::Int(-2));
    assert_eq!(layered.count(), 5);
    assert_eq!(layered.first(), Value::Int(-2));
    // the base cursor is untouched
    assert_eq!(base.first(), Value::Int(0));
}

#[rstest]
fn test_indexed_seq_from_vector() {
    let vector: PersistentVector = (0..100).map(Value::Int).collect();
    let seq = vector.seq().unwrap();
    assert_eq!(seq.count(), 100);

    let fifth = seq.next().unwrap().next().unwrap().next().unwrap().next().unwrap();
    assert_eq!(fifth.first(), Value::Int(4));
    assert_eq!(fifth.count(), 96);
}

// =============================================================================
// Reduce/cursor agreement
// =============================================================================

#[rstest]
fn test_reduce_agrees_with_cursor_on_every_variant() {
    let vector: PersistentVector = (0..200).map(Value::Int).collect();
    let cases: Vec<Seq> = vec![
        Seq::from_values((0..50).map(Value::Int)).unwrap(),
        Seq::range(0, 100, 7).unwrap(),
        Seq::singleton(Value::Int(3)).cons(Value::Int(2)).cons(Value::Int(1)),
        vector.seq().unwrap(),
        vector.rseq().unwrap(),
    ];
    for seq in &cases {
        assert_eq!(int_sum(seq), cursor_sum(seq));
    }
}

// =============================================================================
// Map entry seqs
// =============================================================================

#[rstest]
fn test_map_seq_yields_two_element_vectors() {
    let map = PersistentHashMap::new()
        .insert(Value::Int(1), Value::Int(10))
        .insert(Value::Int(2), Value::Int(20));
    let mut cursor = map.seq();
    let mut entries = Vec::new();
    while let Some(seq) = cursor {
        entries.push(seq.first());
        cursor = seq.next();
    }
    assert_eq!(entries.len(), 2);
    for entry in entries {
        match entry {
            Value::Vector(pair) => {
                assert_eq!(pair.len(), 2);
                match (pair.get(0), pair.get(1)) {
                    (Some(Value::Int(key)), Some(Value::Int(value))) => {
                        assert_eq!(*value, key * 10);
                    }
                    other => panic!("unexpected entry contents {other:?}"),
                }
            }
            other => panic!("expected a vector entry, found {other}"),
        }
    }
}

#[rstest]
fn test_empty_map_has_no_seq() {
    assert!(PersistentHashMap::new().seq().is_none());
}

// =============================================================================
// Value-level seq dispatch
// =============================================================================

#[rstest]
fn test_value_seq_dispatches_by_type() {
    let vector: PersistentVector = (0..3).map(Value::Int).collect();
    assert_eq!(Value::from(vector).seq().unwrap().count(), 3);
    assert_eq!(Value::from("xy").seq().unwrap().count(), 2);
    assert!(Value::from(PersistentVector::new()).seq().is_none());
    assert!(Value::Bool(true).seq().is_none());
}
