//! Structural equality and hashing shared by every collection.
//!
//! The engine defines one equivalence for the whole crate:
//!
//! - scalars are type-strict (`Int` never equals `Float`; `0.0 == -0.0`;
//!   NaN equals nothing, itself included),
//! - sequential collections compare element-wise in iteration order across
//!   concrete types, so a vector, a cons chain, and a string's character
//!   seq with the same elements are all equal,
//! - maps compare by count plus per-key lookup, independent of entry order,
//! - external scalars delegate to their own
//!   [`ExtValue`](crate::value::ExtValue) equality.
//!
//! Hashes agree with the equivalence: equal values hash equally. Sequential
//! collections combine element hashes order-sensitively; maps combine entry
//! hashes order-insensitively. Every traversal is finite: the crate has no
//! lazy or infinite sequences.
//!
//! The hasher behind [`hash_value`] is selected at compile time: the
//! standard `DefaultHasher` by default, `FxHasher` with the `fxhash`
//! feature, `AHasher` with the `ahash` feature.

use std::hash::{Hash, Hasher};

use crate::contract::Seqable;
use crate::hashmap::PersistentHashMap;
use crate::seq::Seq;
use crate::value::Value;
use crate::vector::PersistentVector;

// =============================================================================
// Hasher selection
// =============================================================================

#[cfg(all(feature = "fxhash", not(feature = "ahash")))]
type ValueHasher = rustc_hash::FxHasher;

#[cfg(feature = "ahash")]
type ValueHasher = ahash::AHasher;

#[cfg(not(any(feature = "fxhash", feature = "ahash")))]
type ValueHasher = std::collections::hash_map::DefaultHasher;

/// Hashes one `Hash` value with the configured hasher.
fn hash_one<T: Hash>(value: &T) -> u64 {
    let mut hasher = ValueHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}

// Discriminant tags keep scalars of different types from colliding trivially.
const TAG_NIL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_FLOAT: u8 = 3;
const TAG_CHAR: u8 = 4;
const TAG_STR: u8 = 5;

// =============================================================================
// Hashing
// =============================================================================

/// Computes the hash of a value. Total: hashing never fails.
///
/// # Examples
///
/// ```rust
/// use seqtrie::equality::hash_value;
/// use seqtrie::value::Value;
///
/// assert_eq!(hash_value(&Value::Int(7)), hash_value(&Value::Int(7)));
/// assert_ne!(hash_value(&Value::Int(7)), hash_value(&Value::Int(8)));
/// ```
#[must_use]
pub fn hash_value(value: &Value) -> u64 {
    match value {
        Value::Nil => hash_one(&TAG_NIL),
        Value::Bool(b) => hash_one(&(TAG_BOOL, b)),
        Value::Int(i) => hash_one(&(TAG_INT, i)),
        // 0.0 and -0.0 are equal and must hash together.
        Value::Float(f) => {
            let bits = if *f == 0.0 { 0 } else { f.to_bits() };
            hash_one(&(TAG_FLOAT, bits))
        }
        Value::Char(c) => hash_one(&(TAG_CHAR, c)),
        Value::Str(s) => hash_one(&(TAG_STR, &**s)),
        Value::Vector(vector) => hash_ordered(vector.iter().map(hash_value)),
        Value::Seq(seq) => hash_ordered(seq.iter().map(|element| hash_value(&element))),
        Value::Map(map) => hash_map_entries(map),
        Value::Ext(ext) => ext.ext_hash(),
    }
}

/// Combines element hashes order-sensitively.
///
/// Used by every sequential collection, which is what makes a vector and a
/// seq of the same elements hash identically.
#[must_use]
pub fn hash_ordered<I: IntoIterator<Item = u64>>(element_hashes: I) -> u64 {
    let mut hash: u64 = 1;
    let mut count: u64 = 0;
    for element_hash in element_hashes {
        hash = hash.wrapping_mul(31).wrapping_add(element_hash);
        count += 1;
    }
    mix_collection_hash(hash, count)
}

/// Combines element hashes order-insensitively.
///
/// Used by maps, whose iteration order is not part of their identity.
#[must_use]
pub fn hash_unordered<I: IntoIterator<Item = u64>>(element_hashes: I) -> u64 {
    let mut hash: u64 = 0;
    let mut count: u64 = 0;
    for element_hash in element_hashes {
        hash = hash.wrapping_add(element_hash);
        count += 1;
    }
    mix_collection_hash(hash, count)
}

/// Hash of one key/value entry: ordered over the pair, matching the hash of
/// the two-element vector the entry presents as.
pub(crate) fn hash_entry(key: &Value, value: &Value) -> u64 {
    hash_ordered([hash_value(key), hash_value(value)])
}

fn hash_map_entries(map: &PersistentHashMap) -> u64 {
    hash_unordered(map.iter().map(|(key, value)| hash_entry(key, value)))
}

/// Folds the element count into a combined hash so collections of different
/// lengths with coinciding prefixes separate.
fn mix_collection_hash(hash: u64, count: u64) -> u64 {
    hash_one(&(hash, count))
}

// =============================================================================
// Equivalence
// =============================================================================

/// Structural equivalence over values.
///
/// # Examples
///
/// ```rust
/// use seqtrie::equality::equiv;
/// use seqtrie::seq::Seq;
/// use seqtrie::value::Value;
/// use seqtrie::vector::PersistentVector;
///
/// let vector: PersistentVector = (1..=3).map(Value::Int).collect();
/// let seq = Seq::from_values((1..=3).map(Value::Int)).unwrap();
///
/// assert!(equiv(&Value::from(vector), &Value::from(seq)));
/// ```
#[must_use]
pub fn equiv(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Nil, Value::Nil) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Char(x), Value::Char(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Ext(x), Value::Ext(y)) => x.ext_eq(y.as_ref()),
        (Value::Map(x), Value::Map(y)) => maps_equiv(x, y),
        (Value::Vector(x), Value::Vector(y)) => vectors_equiv(x, y),
        (Value::Vector(x), Value::Seq(y)) => seqs_equiv(x.seq(), Some(y.as_ref().clone())),
        (Value::Seq(x), Value::Vector(y)) => seqs_equiv(Some(x.as_ref().clone()), y.seq()),
        (Value::Seq(x), Value::Seq(y)) => {
            seqs_equiv(Some(x.as_ref().clone()), Some(y.as_ref().clone()))
        }
        _ => false,
    }
}

/// Element-wise vector comparison without going through cursors.
pub(crate) fn vectors_equiv(a: &PersistentVector, b: &PersistentVector) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| equiv(x, y))
}

/// Walks two cursors in lockstep; equal when both end together with equal
/// elements throughout.
pub(crate) fn seqs_equiv(a: Option<Seq>, b: Option<Seq>) -> bool {
    let mut left = a;
    let mut right = b;
    loop {
        match (left, right) {
            (None, None) => return true,
            (Some(x), Some(y)) => {
                if !equiv(&x.first(), &y.first()) {
                    return false;
                }
                left = x.next();
                right = y.next();
            }
            _ => return false,
        }
    }
}

/// Count plus per-key lookup; entry order never matters.
pub(crate) fn maps_equiv(a: &PersistentHashMap, b: &PersistentHashMap) -> bool {
    a.len() == b.len()
        && a.iter()
            .all(|(key, value)| b.get(key).is_some_and(|found| equiv(value, found)))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_float_zero_signs_equal_and_hash_together() {
        let positive = Value::Float(0.0);
        let negative = Value::Float(-0.0);
        assert!(equiv(&positive, &negative));
        assert_eq!(hash_value(&positive), hash_value(&negative));
    }

    #[rstest]
    fn test_nan_is_not_equiv_to_itself() {
        let nan = Value::Float(f64::NAN);
        assert!(!equiv(&nan, &nan));
    }

    #[rstest]
    fn test_ordered_hash_is_order_sensitive() {
        let forward = hash_ordered([hash_value(&Value::Int(1)), hash_value(&Value::Int(2))]);
        let backward = hash_ordered([hash_value(&Value::Int(2)), hash_value(&Value::Int(1))]);
        assert_ne!(forward, backward);
    }

    #[rstest]
    fn test_unordered_hash_is_order_insensitive() {
        let forward = hash_unordered([hash_value(&Value::Int(1)), hash_value(&Value::Int(2))]);
        let backward = hash_unordered([hash_value(&Value::Int(2)), hash_value(&Value::Int(1))]);
        assert_eq!(forward, backward);
    }

    #[rstest]
    fn test_prefix_collections_hash_apart() {
        let short = hash_ordered([hash_value(&Value::Int(1))]);
        let long = hash_ordered([hash_value(&Value::Int(1)), hash_value(&Value::Int(2))]);
        assert_ne!(short, long);
    }
}
