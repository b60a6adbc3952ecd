//! Dynamically typed runtime values.
//!
//! This module provides [`Value`], the element/key type shared by every
//! collection in the crate. A hosted-language runtime needs more from its
//! collection engine than a generic `<T>` container can express: nil keys,
//! equality across structurally different collections, arity-checked
//! invocation, and numeric index coercion all depend on knowing the runtime
//! type of an element.
//!
//! Scalars owned by other parts of the runtime (interned symbols and
//! keywords, the big-number tower) enter through a single seam: the
//! [`ExtValue`] trait object variant, which carries its own equality and
//! hash so the engine never needs to know the concrete type.
//!
//! # Examples
//!
//! ```rust
//! use seqtrie::value::Value;
//!
//! let values = [Value::Nil, Value::from(42), Value::from("text")];
//! assert_eq!(values[1].to_string(), "42");
//! assert_eq!(values[2].type_name(), "string");
//! ```

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::contract::Seqable;
use crate::equality;
use crate::hashmap::PersistentHashMap;
use crate::seq::Seq;
use crate::vector::PersistentVector;
use crate::ReferenceCounter;

// =============================================================================
// External scalar seam
// =============================================================================

/// A scalar supplied by the surrounding runtime.
///
/// Implementations provide their own equality and hash; the collection
/// engine treats them as opaque. `Send + Sync` is required so the `arc`
/// feature can share values across threads.
pub trait ExtValue: fmt::Debug + Send + Sync + 'static {
    /// Runtime type name, used in error messages and printing.
    fn type_name(&self) -> &'static str;

    /// Equality against another external scalar.
    ///
    /// Implementations typically downcast `other` via [`ExtValue::as_any`]
    /// and return `false` on a type mismatch.
    fn ext_eq(&self, other: &dyn ExtValue) -> bool;

    /// Hash consistent with [`ExtValue::ext_eq`].
    fn ext_hash(&self) -> u64;

    /// Downcasting support for implementations of [`ExtValue::ext_eq`].
    fn as_any(&self) -> &dyn Any;
}

// =============================================================================
// Value Definition
// =============================================================================

/// A runtime value: scalar, string, collection, or external.
///
/// Values are cheap to clone: scalars are copied, everything else is a
/// reference-counted pointer.
///
/// Equality (`==`) is the engine's structural `equiv`: type-strict on
/// scalars, element-wise in order across sequential collections (a vector
/// equals a seq of the same elements), count-and-lookup for maps. `Hash`
/// agrees with it.
#[derive(Clone, Debug)]
pub enum Value {
    /// The absence of a value. Valid as a map key.
    Nil,
    /// A boolean.
    Bool(bool),
    /// A 64-bit integer.
    Int(i64),
    /// A 64-bit float. Distinct from `Int` under equality.
    Float(f64),
    /// A character.
    Char(char),
    /// An immutable string.
    Str(ReferenceCounter<str>),
    /// A persistent vector.
    Vector(ReferenceCounter<PersistentVector>),
    /// A persistent hash map.
    Map(ReferenceCounter<PersistentHashMap>),
    /// A sequence cursor.
    Seq(ReferenceCounter<Seq>),
    /// An external scalar (interned symbol, big number, ...).
    Ext(ReferenceCounter<dyn ExtValue>),
}

impl Value {
    /// Wraps an external scalar.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::any::Any;
    /// use seqtrie::value::{ExtValue, Value};
    ///
    /// #[derive(Debug)]
    /// struct Symbol(&'static str);
    ///
    /// impl ExtValue for Symbol {
    ///     fn type_name(&self) -> &'static str { "symbol" }
    ///     fn ext_eq(&self, other: &dyn ExtValue) -> bool {
    ///         other.as_any().downcast_ref::<Self>().is_some_and(|s| s.0 == self.0)
    ///     }
    ///     fn ext_hash(&self) -> u64 { self.0.len() as u64 }
    ///     fn as_any(&self) -> &dyn Any { self }
    /// }
    ///
    /// let symbol = Value::ext(Symbol("name"));
    /// assert_eq!(symbol.type_name(), "symbol");
    /// ```
    #[must_use]
    pub fn ext<E: ExtValue>(ext: E) -> Self {
        Self::Ext(ReferenceCounter::new(ext))
    }

    /// Returns the runtime type name of this value.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use seqtrie::value::Value;
    ///
    /// assert_eq!(Value::Nil.type_name(), "nil");
    /// assert_eq!(Value::Float(0.5).type_name(), "float");
    /// ```
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Char(_) => "character",
            Self::Str(_) => "string",
            Self::Vector(_) => "vector",
            Self::Map(_) => "map",
            Self::Seq(_) => "seq",
            Self::Ext(ext) => ext.type_name(),
        }
    }

    /// Returns `true` for [`Value::Nil`].
    #[inline]
    #[must_use]
    pub const fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Produces a sequence cursor over this value, or `None` when the value
    /// is empty or not sequence-producing.
    ///
    /// Strings yield their characters; vectors and maps yield elements and
    /// entries; an existing seq yields itself. `Nil` and scalars yield
    /// `None`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use seqtrie::value::Value;
    ///
    /// let chars = Value::from("ab").seq().unwrap();
    /// assert_eq!(chars.first(), Value::Char('a'));
    /// assert_eq!(Value::Nil.seq(), None);
    /// ```
    #[must_use]
    pub fn seq(&self) -> Option<Seq> {
        match self {
            Self::Str(text) => Seq::from_str(text),
            Self::Vector(vector) => vector.seq(),
            Self::Map(map) => map.seq(),
            Self::Seq(seq) => Some(seq.as_ref().clone()),
            _ => None,
        }
    }
}

// =============================================================================
// Equality and Hashing
// =============================================================================

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        equality::equiv(self, other)
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(equality::hash_value(self));
    }
}

// =============================================================================
// Display
// =============================================================================

impl fmt::Display for Value {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => formatter.write_str("nil"),
            Self::Bool(value) => write!(formatter, "{value}"),
            Self::Int(value) => write!(formatter, "{value}"),
            Self::Float(value) => write!(formatter, "{value:?}"),
            Self::Char(value) => write!(formatter, "\\{value}"),
            Self::Str(value) => write!(formatter, "{value:?}"),
            Self::Vector(vector) => write!(formatter, "{vector}"),
            Self::Map(map) => write!(formatter, "{map}"),
            Self::Seq(seq) => write!(formatter, "{seq}"),
            Self::Ext(ext) => write!(formatter, "{ext:?}"),
        }
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<bool> for Value {
    #[inline]
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    #[inline]
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    #[inline]
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<char> for Value {
    #[inline]
    fn from(value: char) -> Self {
        Self::Char(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(ReferenceCounter::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(ReferenceCounter::from(value.as_str()))
    }
}

impl From<PersistentVector> for Value {
    fn from(vector: PersistentVector) -> Self {
        Self::Vector(ReferenceCounter::new(vector))
    }
}

impl From<PersistentHashMap> for Value {
    fn from(map: PersistentHashMap) -> Self {
        Self::Map(ReferenceCounter::new(map))
    }
}

impl From<Seq> for Value {
    fn from(seq: Seq) -> Self {
        Self::Seq(ReferenceCounter::new(seq))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Value::Nil, "nil")]
    #[case(Value::Bool(true), "true")]
    #[case(Value::Int(-3), "-3")]
    #[case(Value::Float(1.0), "1.0")]
    #[case(Value::Char('x'), "\\x")]
    #[case(Value::from("hi"), "\"hi\"")]
    fn test_display(#[case] value: Value, #[case] expected: &str) {
        assert_eq!(value.to_string(), expected);
    }

    #[rstest]
    fn test_scalar_equality_is_type_strict() {
        assert_eq!(Value::Int(1), Value::Int(1));
        assert_ne!(Value::Int(1), Value::Float(1.0));
        assert_ne!(Value::Nil, Value::Bool(false));
    }

    #[rstest]
    fn test_seq_on_scalars_is_none() {
        assert_eq!(Value::Int(7).seq(), None);
        assert_eq!(Value::Nil.seq(), None);
    }

    #[derive(Debug)]
    struct Token(u32);

    impl ExtValue for Token {
        fn type_name(&self) -> &'static str {
            "token"
        }

        fn ext_eq(&self, other: &dyn ExtValue) -> bool {
            other
                .as_any()
                .downcast_ref::<Self>()
                .is_some_and(|token| token.0 == self.0)
        }

        fn ext_hash(&self) -> u64 {
            u64::from(self.0)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[rstest]
    fn test_ext_values_compare_through_the_seam() {
        let first = Value::ext(Token(1));
        let same = Value::ext(Token(1));
        let other = Value::ext(Token(2));

        assert_eq!(first, same);
        assert_ne!(first, other);
        assert_eq!(first.type_name(), "token");
    }
}
