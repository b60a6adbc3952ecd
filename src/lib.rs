//! # seqtrie
//!
//! Persistent trie-based collections and a unified sequence abstraction
//! for hosted-language runtimes.
//!
//! ## Overview
//!
//! This crate is the collection engine a dynamic-language runtime sits on:
//!
//! - [`vector::PersistentVector`]: an indexed, ordered collection over a
//!   32-way branching trie with a tail buffer (O(1) amortized append)
//! - [`hashmap::PersistentHashMap`]: a key/value collection over a
//!   Hash-Array-Mapped Trie with bitmap, dense, and collision nodes
//! - [`seq::Seq`]: the first/rest cursor unifying iteration over every
//!   collection and over strings
//! - [`equality`]: the structural equality and hashing shared by all of
//!   the above, which makes a vector compare equal to any sequence holding
//!   the same elements in the same order
//!
//! Every mutating operation returns a new collection; old versions remain
//! valid and share all untouched structure with new ones. Concurrent
//! readers need no locks: a root is published only after every node below
//! it is in place. For batch construction, both collections offer a
//! single-owner transient variant that edits in place behind an ownership
//! token.
//!
//! ## Feature Flags
//!
//! - `arc`: share structure with `Arc` instead of `Rc` (thread-safe)
//! - `fxhash` / `ahash`: alternative hashers behind the hash engine
//!
//! ## Example
//!
//! ```rust
//! use seqtrie::prelude::*;
//!
//! let vector: PersistentVector = (1..=3).map(Value::Int).collect();
//! let longer = vector.push_back(Value::Int(4));
//!
//! assert_eq!(vector.len(), 3);  // original unchanged
//! assert_eq!(longer.len(), 4);  // new version
//!
//! let seq = Seq::range(1, 4, 1).unwrap();
//! assert_eq!(Value::from(vector), Value::from(seq));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Prelude module for convenient imports.
///
/// # Usage
///
/// ```rust
/// use seqtrie::prelude::*;
/// ```
pub mod prelude {
    pub use crate::contract::{Counted, Invoke, Metadata, Reduce, Seqable};
    pub use crate::error::Error;
    pub use crate::hashmap::{PersistentHashMap, TransientHashMap};
    pub use crate::seq::Seq;
    pub use crate::value::{ExtValue, Value};
    pub use crate::vector::{PersistentVector, TransientVector};
}

pub mod contract;
pub mod equality;
pub mod error;
pub mod hashmap;
pub mod seq;
pub mod value;
pub mod vector;

// =============================================================================
// Reference Counter Type Alias
// =============================================================================

/// Reference-counted smart pointer type.
///
/// When the `arc` feature is enabled, this is `std::sync::Arc`,
/// which is thread-safe but has slightly higher overhead.
///
/// When the `arc` feature is disabled (default), this is `std::rc::Rc`,
/// which is faster but not thread-safe.
#[cfg(feature = "arc")]
pub(crate) type ReferenceCounter<T> = std::sync::Arc<T>;

#[cfg(not(feature = "arc"))]
pub(crate) type ReferenceCounter<T> = std::rc::Rc<T>;

// =============================================================================
// Edit Token
// =============================================================================

/// The opaque ownership token of a transient.
///
/// Tokens have identity, not content: two tokens are the same only when
/// they are the same allocation. Trie nodes created by a transient carry a
/// clone of its token; a node whose token is absent or foreign must be
/// copied before mutation, which is what protects structure shared with
/// published roots.
#[derive(Clone, Debug)]
pub(crate) struct EditToken(ReferenceCounter<()>);

impl EditToken {
    pub(crate) fn new() -> Self {
        Self(ReferenceCounter::new(()))
    }

    /// Identity comparison.
    pub(crate) fn is(&self, other: &Self) -> bool {
        ReferenceCounter::ptr_eq(&self.0, &other.0)
    }
}

// =============================================================================
// Tests
// =============================================================================
