//! The sequence abstraction: a polymorphic first/rest cursor.
//!
//! [`Seq`] unifies iteration over every collection in the crate and over
//! character data. A seq is a cursor, not an owner: it wraps a reference
//! into its source plus a position, never mutates the source, and is cheap
//! to re-derive.
//!
//! A `Seq` value always has at least one element. Emptiness is represented
//! by `Option<Seq>`: constructors and [`Seq::next`] return `None` instead
//! of an empty cursor, so `first` never has a missing-element case.
//!
//! # Variants
//!
//! - cons cell: O(1) [`Seq::cons`] onto any sequence,
//! - array-backed chunk: string characters, map entry seqs, explicit
//!   element lists,
//! - integer range: O(1) count, nothing materialized,
//! - indexed cursor (forward and reverse) over a persistent vector; the
//!   reverse cursor walks indices backward directly rather than reversing
//!   a forward sequence.
//!
//! # Examples
//!
//! ```rust
//! use seqtrie::seq::Seq;
//! use seqtrie::value::Value;
//!
//! let range = Seq::range(0, 3, 1).unwrap();
//! assert_eq!(range.first(), Value::Int(0));
//!
//! let rest = range.next().unwrap();
//! assert_eq!(rest.first(), Value::Int(1));
//!
//! // cons never copies the source
//! let extended = range.cons(Value::Int(-1));
//! assert_eq!(extended.first(), Value::Int(-1));
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::contract::{Counted, Metadata, Reduce, Seqable};
use crate::equality;
use crate::hashmap::PersistentHashMap;
use crate::value::Value;
use crate::vector::PersistentVector;
use crate::ReferenceCounter;

// =============================================================================
// Seq Definition
// =============================================================================

/// A non-empty sequence cursor over some source of values.
///
/// See the [module documentation](self) for the variant inventory and the
/// emptiness convention.
#[derive(Clone)]
pub struct Seq {
    kind: SeqKind,
    meta: Option<ReferenceCounter<PersistentHashMap>>,
}

#[derive(Clone)]
enum SeqKind {
    /// A cons cell: one element plus the rest of the sequence.
    Cons(ReferenceCounter<ConsCell>),
    /// A cursor into a shared array of elements.
    Chunk(ChunkSeq),
    /// An arithmetic progression of integers. Always finite.
    Range(RangeSeq),
    /// A forward cursor over a persistent vector.
    Indexed(IndexedSeq),
    /// A backward cursor over a persistent vector.
    IndexedRev(IndexedSeq),
}

#[derive(Clone)]
struct ConsCell {
    first: Value,
    rest: Option<Seq>,
}

#[derive(Clone)]
struct ChunkSeq {
    items: ReferenceCounter<[Value]>,
    index: usize,
}

#[derive(Clone)]
struct RangeSeq {
    next: i64,
    end: i64,
    step: i64,
}

impl RangeSeq {
    /// Elements not yet consumed. The constructor guarantees step != 0.
    fn remaining(&self) -> usize {
        let span = if self.step > 0 {
            self.end.saturating_sub(self.next).max(0)
        } else {
            self.next.saturating_sub(self.end).max(0)
        }
        .unsigned_abs();
        let step = self.step.unsigned_abs();
        usize::try_from(span.div_ceil(step)).unwrap_or(usize::MAX)
    }

    /// The state one element further on. Saturation near the integer
    /// boundary only ever drops elements past `end`.
    fn advanced(&self) -> Self {
        Self {
            next: self.next.saturating_add(self.step),
            end: self.end,
            step: self.step,
        }
    }
}

#[derive(Clone)]
struct IndexedSeq {
    source: ReferenceCounter<PersistentVector>,
    index: usize,
}

// =============================================================================
// Construction
// =============================================================================

impl Seq {
    fn from_kind(kind: SeqKind) -> Self {
        Self { kind, meta: None }
    }

    /// A one-element sequence.
    #[must_use]
    pub fn singleton(value: Value) -> Self {
        Self::from_kind(SeqKind::Cons(ReferenceCounter::new(ConsCell {
            first: value,
            rest: None,
        })))
    }

    /// An array-backed sequence over the given elements, or `None` when
    /// there are none.
    pub fn from_values<I: IntoIterator<Item = Value>>(values: I) -> Option<Self> {
        let items: Vec<Value> = values.into_iter().collect();
        if items.is_empty() {
            None
        } else {
            Some(Self::from_kind(SeqKind::Chunk(ChunkSeq {
                items: ReferenceCounter::from(items),
                index: 0,
            })))
        }
    }

    /// The character sequence of a string, or `None` for the empty string.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use seqtrie::seq::Seq;
    /// use seqtrie::value::Value;
    ///
    /// let chars = Seq::from_str("ab").unwrap();
    /// assert_eq!(chars.first(), Value::Char('a'));
    /// assert_eq!(Seq::from_str(""), None);
    /// ```
    #[must_use]
    pub fn from_str(text: &str) -> Option<Self> {
        Self::from_values(text.chars().map(Value::Char))
    }

    /// The integers from `start` (inclusive) to `end` (exclusive) advancing
    /// by `step`, or `None` when the range holds no elements.
    ///
    /// A zero step yields `None`: every sequence in this crate is finite.
    #[must_use]
    pub fn range(start: i64, end: i64, step: i64) -> Option<Self> {
        let produces_elements = match step {
            0 => false,
            s if s > 0 => start < end,
            _ => start > end,
        };
        produces_elements.then(|| {
            Self::from_kind(SeqKind::Range(RangeSeq {
                next: start,
                end,
                step,
            }))
        })
    }

    /// Forward cursor over `source` starting at `index`.
    pub(crate) fn indexed(source: ReferenceCounter<PersistentVector>, index: usize) -> Option<Self> {
        (index < source.len())
            .then(|| Self::from_kind(SeqKind::Indexed(IndexedSeq { source, index })))
    }

    /// Backward cursor over `source` starting at its last element.
    pub(crate) fn indexed_rev(source: ReferenceCounter<PersistentVector>) -> Option<Self> {
        let count = source.len();
        (count > 0).then(|| {
            Self::from_kind(SeqKind::IndexedRev(IndexedSeq {
                source,
                index: count - 1,
            }))
        })
    }
}

// =============================================================================
// The cursor operations
// =============================================================================

impl Seq {
    /// The element at the front of the sequence.
    #[must_use]
    pub fn first(&self) -> Value {
        match &self.kind {
            SeqKind::Cons(cell) => cell.first.clone(),
            SeqKind::Chunk(chunk) => chunk
                .items
                .get(chunk.index)
                .cloned()
                .unwrap_or(Value::Nil),
            SeqKind::Range(range) => Value::Int(range.next),
            SeqKind::Indexed(cursor) | SeqKind::IndexedRev(cursor) => cursor
                .source
                .get(cursor.index)
                .cloned()
                .unwrap_or(Value::Nil),
        }
    }

    /// The sequence past the first element, or `None` when this was the
    /// last one.
    #[must_use]
    pub fn next(&self) -> Option<Self> {
        match &self.kind {
            SeqKind::Cons(cell) => cell.rest.clone(),
            SeqKind::Chunk(chunk) => {
                let index = chunk.index + 1;
                (index < chunk.items.len()).then(|| {
                    Self::from_kind(SeqKind::Chunk(ChunkSeq {
                        items: chunk.items.clone(),
                        index,
                    }))
                })
            }
            SeqKind::Range(range) => {
                let advanced = range.advanced();
                (advanced.remaining() > 0).then(|| Self::from_kind(SeqKind::Range(advanced)))
            }
            SeqKind::Indexed(cursor) => {
                Self::indexed(cursor.source.clone(), cursor.index + 1)
            }
            SeqKind::IndexedRev(cursor) => (cursor.index > 0).then(|| {
                Self::from_kind(SeqKind::IndexedRev(IndexedSeq {
                    source: cursor.source.clone(),
                    index: cursor.index - 1,
                }))
            }),
        }
    }

    /// A new sequence with `value` in front and this sequence as the rest.
    ///
    /// O(1): the source is referenced, never copied. The result carries
    /// this sequence's metadata.
    #[must_use]
    pub fn cons(&self, value: Value) -> Self {
        Self {
            kind: SeqKind::Cons(ReferenceCounter::new(ConsCell {
                first: value,
                rest: Some(self.clone()),
            })),
            meta: self.meta.clone(),
        }
    }

    /// An iterator over the remaining elements.
    #[must_use]
    pub fn iter(&self) -> Iter {
        Iter {
            cursor: Some(self.clone()),
        }
    }
}

impl Counted for Seq {
    /// Remaining elements. Structural (O(1)) for chunk, range, and indexed
    /// cursors; cons spines are walked.
    fn count(&self) -> usize {
        let mut total = 0;
        let mut cursor = self.clone();
        loop {
            match &cursor.kind {
                SeqKind::Cons(cell) => {
                    total += 1;
                    match &cell.rest {
                        Some(rest) => cursor = rest.clone(),
                        None => return total,
                    }
                }
                SeqKind::Chunk(chunk) => return total + (chunk.items.len() - chunk.index),
                SeqKind::Range(range) => return total + range.remaining(),
                SeqKind::Indexed(ix) => return total + (ix.source.len() - ix.index),
                SeqKind::IndexedRev(ix) => return total + ix.index + 1,
            }
        }
    }
}

impl Reduce for Seq {
    fn reduce<B, F>(&self, init: B, mut function: F) -> B
    where
        F: FnMut(B, Value) -> B,
    {
        match &self.kind {
            // Chunks fold over the backing array directly.
            SeqKind::Chunk(chunk) => chunk.items[chunk.index..]
                .iter()
                .fold(init, |accumulator, element| {
                    function(accumulator, element.clone())
                }),
            // Ranges fold arithmetically, nothing materialized.
            SeqKind::Range(range) => {
                let mut accumulator = init;
                let mut state = range.clone();
                while state.remaining() > 0 {
                    accumulator = function(accumulator, Value::Int(state.next));
                    state = state.advanced();
                }
                accumulator
            }
            // Indexed cursors fold over the vector's leaf arrays.
            SeqKind::Indexed(cursor) => cursor
                .source
                .iter_from(cursor.index)
                .fold(init, |accumulator, element| {
                    function(accumulator, element.clone())
                }),
            SeqKind::IndexedRev(cursor) => {
                let mut accumulator = init;
                for index in (0..=cursor.index).rev() {
                    if let Some(element) = cursor.source.get(index) {
                        accumulator = function(accumulator, element.clone());
                    }
                }
                accumulator
            }
            SeqKind::Cons(_) => self
                .iter()
                .fold(init, |accumulator, element| function(accumulator, element)),
        }
    }
}

impl Seqable for Seq {
    fn seq(&self) -> Option<Seq> {
        Some(self.clone())
    }
}

impl Metadata for Seq {
    fn meta(&self) -> Option<&PersistentHashMap> {
        self.meta.as_deref()
    }

    fn with_meta(&self, meta: Option<PersistentHashMap>) -> Self {
        Self {
            kind: self.kind.clone(),
            meta: meta.map(ReferenceCounter::new),
        }
    }
}

// =============================================================================
// Iterator
// =============================================================================

/// An iterator driving a [`Seq`] cursor, yielding owned values.
pub struct Iter {
    cursor: Option<Seq>,
}

impl Iterator for Iter {
    type Item = Value;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.cursor.take()?;
        let element = current.first();
        self.cursor = current.next();
        Some(element)
    }
}

impl IntoIterator for &Seq {
    type Item = Value;
    type IntoIter = Iter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl PartialEq for Seq {
    fn eq(&self, other: &Self) -> bool {
        equality::seqs_equiv(Some(self.clone()), Some(other.clone()))
    }
}

impl Hash for Seq {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(equality::hash_ordered(
            self.iter().map(|element| equality::hash_value(&element)),
        ));
    }
}

impl fmt::Display for Seq {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("(")?;
        for (position, element) in self.iter().enumerate() {
            if position > 0 {
                formatter.write_str(" ")?;
            }
            write!(formatter, "{element}")?;
        }
        formatter.write_str(")")
    }
}

impl fmt::Debug for Seq {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_list().entries(self.iter()).finish()
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
    fn test_singleton_has_no_next() {
        let seq = Seq::singleton(Value::Int(1));
        assert_eq!(seq.first(), Value::Int(1));
        assert!(seq.next().is_none());
        assert_eq!(seq.count(), 1);
    }

    #[rstest]
    fn test_from_values_empty_is_none() {
        assert!(Seq::from_values(std::iter::empty()).is_none());
    }

    #[rstest]
    #[case(0, 10, 3, 4)]
    #[case(0, 10, 1, 10)]
    #[case(10, 0, -2, 5)]
    #[case(5, 5, 1, 0)]
    #[case(0, 5, 0, 0)]
    fn test_range_count(
        #[case] start: i64,
        #[case] end: i64,
        #[case] step: i64,
        #[case] expected: usize,
    ) {
        match Seq::range(start, end, step) {
            Some(seq) => assert_eq!(seq.count(), expected),
            None => assert_eq!(expected, 0),
        }
    }

    #[rstest]
    fn test_range_walks_to_exclusive_end() {
        let collected: Vec<Value> = Seq::range(0, 7, 3).unwrap().iter().collect();
        assert_eq!(
            collected,
            vec![Value::Int(0), Value::Int(3), Value::Int(6)]
        );
    }

    #[rstest]
    fn test_cons_chain_counts_spine() {
        let seq = Seq::singleton(Value::Int(3))
            .cons(Value::Int(2))
            .cons(Value::Int(1));
        assert_eq!(seq.count(), 3);
        assert_eq!(seq.first(), Value::Int(1));
    }

    #[rstest]
    fn test_cons_onto_range_mixes_kinds() {
        let seq = Seq::range(1, 3, 1).unwrap().cons(Value::Int(0));
        let collected: Vec<Value> = seq.iter().collect();
        assert_eq!(
            collected,
            vec![Value::Int(0), Value::Int(1), Value::Int(2)]
        );
    }

    #[rstest]
    fn test_reduce_matches_cursor_fold_for_ranges() {
        let seq = Seq::range(0, 100, 7).unwrap();
        let direct = seq.reduce(0_i64, |accumulator, element| match element {
            Value::Int(i) => accumulator + i,
            _ => accumulator,
        });
        let cursor = seq.iter().fold(0_i64, |accumulator, element| match element {
            Value::Int(i) => accumulator + i,
            _ => accumulator,
        });
        assert_eq!(direct, cursor);
    }

    #[rstest]
    fn test_display() {
        let seq = Seq::from_values([Value::Int(1), Value::Int(2)]).unwrap();
        assert_eq!(seq.to_string(), "(1 2)");
    }

    #[rstest]
    fn test_with_meta_round_trip() {
        let seq = Seq::singleton(Value::Int(1));
        assert!(seq.meta().is_none());

        let tagged = seq.with_meta(Some(PersistentHashMap::new()));
        assert!(tagged.meta().is_some());
        assert_eq!(tagged, seq);
    }
}
