//! The contracts collections expose to the surrounding runtime.
//!
//! An interpreter consuming this crate programs against these traits rather
//! than concrete types: anything `Counted + Seqable + Reduce` can be
//! iterated, folded, and compared by the engine; anything `Invoke` can sit
//! in call position.
//!
//! # Reduce/cursor agreement
//!
//! [`Reduce::reduce`] is free to fold over internal structure directly
//! (leaf arrays, ranges) without materializing a cursor, but it must produce
//! the same result as folding over the [`Seqable::seq`] cursor with
//! `first`/`next`. That agreement is a correctness requirement of the
//! engine, not an optimization detail, and is what lets callers pick
//! whichever traversal is convenient.

use crate::error::Error;
use crate::hashmap::PersistentHashMap;
use crate::seq::Seq;
use crate::value::Value;

/// Collections that know their size without walking themselves.
///
/// O(1) for every collection in the crate except cons chains, which count
/// their spine.
pub trait Counted {
    /// The number of elements (for maps, entries; for seqs, remaining
    /// elements).
    fn count(&self) -> usize;
}

/// Collections that produce a sequence cursor.
pub trait Seqable {
    /// A cursor over the elements, or `None` when there are no elements.
    fn seq(&self) -> Option<Seq>;
}

/// Left fold without materializing an intermediate sequence.
pub trait Reduce {
    /// Folds `function` over the elements from left to right.
    ///
    /// Must agree with folding over the [`Seqable::seq`] cursor.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use seqtrie::contract::Reduce;
    /// use seqtrie::value::Value;
    /// use seqtrie::vector::PersistentVector;
    ///
    /// let vector: PersistentVector = (1..=4).map(Value::Int).collect();
    /// let sum = vector.reduce(0_i64, |accumulator, element| match element {
    ///     Value::Int(i) => accumulator + i,
    ///     _ => accumulator,
    /// });
    /// assert_eq!(sum, 10);
    /// ```
    fn reduce<B, F>(&self, init: B, function: F) -> B
    where
        F: FnMut(B, Value) -> B;
}

/// The opaque companion value every collection can carry.
///
/// Metadata never participates in equality or hashing. Producing operations
/// (append, update, pop, `empty()`, transient round-trips) carry the
/// source's metadata into the result unless it is explicitly replaced.
pub trait Metadata: Sized {
    /// The companion map, if any.
    fn meta(&self) -> Option<&PersistentHashMap>;

    /// The same collection carrying `meta` instead of the current companion.
    #[must_use]
    fn with_meta(&self, meta: Option<PersistentHashMap>) -> Self;
}

/// Collections that can be invoked as functions.
///
/// A vector invoked with one numeric-like argument behaves as `nth`; a map
/// invoked with one argument behaves as lookup (missing keys yield
/// [`Value::Nil`]) and with two as lookup-with-default. Every other
/// argument count is an arity error.
pub trait Invoke {
    /// Applies the collection to `args`.
    ///
    /// # Errors
    ///
    /// [`Error::Arity`] on a wrong argument count; [`Error::KeyType`] and
    /// [`Error::IndexOutOfBounds`] from indexed lookup.
    fn invoke(&self, args: &[Value]) -> Result<Value, Error>;
}
