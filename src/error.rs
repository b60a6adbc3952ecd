//! Error taxonomy for collection operations.
//!
//! Every failure in this crate is a local, synchronous error: an operation
//! either returns a new, fully consistent collection or fails without
//! touching any existing one. There is no partial-failure state and nothing
//! to retry.
//!
//! Operations where absence is an ordinary outcome (`get`, `peek`,
//! [`PersistentHashMap::get`](crate::hashmap::PersistentHashMap::get))
//! return `Option` instead and never construct an [`Error`].

use thiserror::Error;

use crate::value::Value;

/// The failure modes of the collection engine.
///
/// # Examples
///
/// ```rust
/// use seqtrie::error::Error;
/// use seqtrie::vector::PersistentVector;
///
/// let vector = PersistentVector::new();
/// assert_eq!(
///     vector.nth(3),
///     Err(Error::IndexOutOfBounds { index: 3, count: 0 })
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// An index outside the valid range of an indexed collection.
    ///
    /// `index` is reported as received, so negative values produced by
    /// numeric coercion stay visible to the caller.
    #[error("index {index} out of bounds for collection of {count} elements")]
    IndexOutOfBounds {
        /// The offending index.
        index: i64,
        /// The element count of the collection at the time of the call.
        count: usize,
    },

    /// A stack-style operation on an empty collection.
    #[error("cannot {operation} an empty collection")]
    EmptyCollection {
        /// The rejected operation, e.g. `"pop"`.
        operation: &'static str,
    },

    /// A key of the wrong type used against an indexed collection's
    /// associative view.
    #[error("key of type {found} cannot be used here, expected {expected}")]
    KeyType {
        /// What the operation accepts, e.g. `"integer index"`.
        expected: &'static str,
        /// The runtime type name of the rejected key.
        found: &'static str,
    },

    /// An insert that requires the key to be absent found it present.
    #[error("key {key} is already present")]
    KeyConflict {
        /// The conflicting key.
        key: Value,
    },

    /// A collection invoked as a function with the wrong argument count.
    #[error("{callee} invoked with {got} arguments, accepts {accepted}")]
    Arity {
        /// What was invoked, e.g. `"vector"`.
        callee: &'static str,
        /// Human-readable accepted arity, e.g. `"1 or 2"`.
        accepted: &'static str,
        /// The argument count actually supplied.
        got: usize,
    },
}

// =============================================================================
// Tests
// =============================================================================
