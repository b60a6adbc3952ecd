//! Persistent (immutable) vector over a 32-way branching trie.
//!
//! This module provides [`PersistentVector`], the indexed, ordered
//! collection of the engine, and [`TransientVector`], its single-owner
//! batch-mutation counterpart.
//!
//! # Overview
//!
//! The vector is a shallow, wide trie (fanout 32) with a tail buffer:
//!
//! - O(log32 N) random access (effectively O(1) for practical sizes)
//! - O(1) amortized append via the tail buffer
//! - O(log32 N) update and pop with structural sharing
//! - O(1) count
//!
//! Every mutating operation returns a new vector and leaves the original
//! fully intact; untouched subtrees are shared between versions. Concurrent
//! readers need no coordination: a new root is published only after all of
//! its nodes are in place.
//!
//! # Internal Structure
//!
//! Elements live in leaf arrays of up to 32 values. Interior nodes hold up
//! to 32 children; an index is resolved by consuming five bits per level.
//! The last `count % 32` elements (or 32, when count is a positive multiple
//! of 32) stay in the tail buffer and never touch the trie until it fills,
//! which is what makes append O(1) amortized.
//!
//! # Examples
//!
//! ```rust
//! use seqtrie::value::Value;
//! use seqtrie::vector::PersistentVector;
//!
//! let vector = PersistentVector::new()
//!     .push_back(Value::Int(1))
//!     .push_back(Value::Int(2));
//!
//! let updated = vector.assoc(0, Value::Int(10)).unwrap();
//! assert_eq!(vector.get(0), Some(&Value::Int(1)));   // original unchanged
//! assert_eq!(updated.get(0), Some(&Value::Int(10))); // new version
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::FromIterator;

use arrayvec::ArrayVec;
use static_assertions::const_assert;
use static_assertions::const_assert_eq;

use crate::contract::{Counted, Invoke, Metadata, Reduce, Seqable};
use crate::equality;
use crate::error::Error;
use crate::hashmap::PersistentHashMap;
use crate::seq::Seq;
use crate::value::Value;
use crate::{EditToken, ReferenceCounter};

// =============================================================================
// Constants
// =============================================================================

/// Trie fanout (2^5 = 32)
const FANOUT: usize = 32;

/// Bits of the index consumed per trie level
const BITS: u32 = 5;

/// Mask extracting the within-node part of an index
const MASK: usize = FANOUT - 1;

const_assert!(FANOUT == 1 << BITS);
const_assert_eq!(MASK, FANOUT - 1);

// =============================================================================
// Node Definition
// =============================================================================

/// One level of the vector trie.
///
/// The `edit` tag is `None` on every node reachable from a published
/// (persistent) root. A transient stamps the nodes it creates with its own
/// token and may mutate in place only nodes carrying that token.
#[derive(Clone)]
enum VectorNode {
    /// Interior level: up to 32 children.
    Branch {
        edit: Option<EditToken>,
        children: [Option<ReferenceCounter<VectorNode>>; FANOUT],
    },
    /// Leaf level: up to 32 elements.
    Leaf {
        edit: Option<EditToken>,
        elements: Vec<Value>,
    },
}

impl VectorNode {
    fn empty_branch() -> Self {
        Self::Branch {
            edit: None,
            children: std::array::from_fn(|_| None),
        }
    }

    /// Builds a chain of single-child branches of height `level` ending in
    /// `node`.
    fn new_path(level: u32, node: Self, edit: Option<&EditToken>) -> Self {
        if level == 0 {
            node
        } else {
            let mut children: [Option<ReferenceCounter<Self>>; FANOUT] =
                std::array::from_fn(|_| None);
            children[0] = Some(ReferenceCounter::new(Self::new_path(
                level - BITS,
                node,
                edit,
            )));
            Self::Branch {
                edit: edit.cloned(),
                children,
            }
        }
    }

    /// Whether a transient holding `edit` may mutate this node in place.
    fn owned_by(&self, edit: &EditToken) -> bool {
        let (Self::Branch { edit: tag, .. } | Self::Leaf { edit: tag, .. }) = self;
        tag.as_ref().is_some_and(|token| token.is(edit))
    }

    /// A shallow copy stamped with `edit`; children stay shared until they
    /// are touched themselves.
    fn claimed(&self, edit: &EditToken) -> Self {
        match self {
            Self::Branch { children, .. } => Self::Branch {
                edit: Some(edit.clone()),
                children: children.clone(),
            },
            Self::Leaf { elements, .. } => Self::Leaf {
                edit: Some(edit.clone()),
                elements: elements.clone(),
            },
        }
    }
}

/// In-place access to a node for the transient holding `edit`.
///
/// Nodes owned by another root (foreign or no token, or shared) are
/// replaced by a claimed copy first, so shared structure is never mutated.
fn editable_mut<'a>(
    node: &'a mut ReferenceCounter<VectorNode>,
    edit: &EditToken,
) -> &'a mut VectorNode {
    if !node.owned_by(edit) {
        *node = ReferenceCounter::new(node.claimed(edit));
    }
    ReferenceCounter::make_mut(node)
}

// =============================================================================
// PersistentVector Definition
// =============================================================================

/// A persistent vector of [`Value`]s over a 32-way trie with a tail buffer.
///
/// # Time Complexity
///
/// | Operation   | Complexity                |
/// |-------------|---------------------------|
/// | `new`       | O(1)                      |
/// | `get`/`nth` | O(log32 N)                |
/// | `push_back` | O(log32 N), amortized O(1)|
/// | `assoc`     | O(log32 N)                |
/// | `pop`       | O(log32 N)                |
/// | `len`       | O(1)                      |
///
/// # Examples
///
/// ```rust
/// use seqtrie::value::Value;
/// use seqtrie::vector::PersistentVector;
///
/// let vector: PersistentVector = (0..100).map(Value::Int).collect();
/// assert_eq!(vector.len(), 100);
/// assert_eq!(vector.get(50), Some(&Value::Int(50)));
/// ```
#[derive(Clone)]
pub struct PersistentVector {
    /// Total number of elements.
    count: usize,
    /// Bits consumed by the root level: 5 * (trie depth).
    shift: u32,
    /// Root of the trie. An empty branch for vectors of up to 32 elements.
    root: ReferenceCounter<VectorNode>,
    /// The most recently appended elements, not yet pushed into the trie.
    tail: ReferenceCounter<[Value]>,
    /// Opaque companion map.
    meta: Option<ReferenceCounter<PersistentHashMap>>,
}

impl PersistentVector {
    /// Creates a new empty vector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            count: 0,
            shift: BITS,
            root: ReferenceCounter::new(VectorNode::empty_branch()),
            tail: ReferenceCounter::from(Vec::new()),
            meta: None,
        }
    }

    /// Creates a vector from a slice of values.
    #[must_use]
    pub fn from_slice(elements: &[Value]) -> Self {
        elements.iter().cloned().collect()
    }

    /// Returns the number of elements.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Returns `true` if the vector holds no elements.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// First index held by the tail buffer.
    #[inline]
    const fn tail_offset(&self) -> usize {
        if self.count < FANOUT {
            0
        } else {
            ((self.count - 1) >> BITS) << BITS
        }
    }

    /// The leaf array containing `index`: the tail for trailing indices,
    /// otherwise the trie leaf reached by consuming five bits per level.
    fn leaf_for(&self, index: usize) -> Option<&[Value]> {
        if index >= self.tail_offset() {
            return Some(&self.tail[..]);
        }

        let mut node = self.root.as_ref();
        let mut level = self.shift;
        while level > 0 {
            match node {
                VectorNode::Branch { children, .. } => {
                    node = children[(index >> level) & MASK].as_ref()?;
                    level -= BITS;
                }
                VectorNode::Leaf { .. } => break,
            }
        }

        match node {
            VectorNode::Leaf { elements, .. } => Some(elements),
            VectorNode::Branch { .. } => None,
        }
    }

    /// Returns a reference to the element at `index`, or `None` out of
    /// bounds.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use seqtrie::value::Value;
    /// use seqtrie::vector::PersistentVector;
    ///
    /// let vector: PersistentVector = (0..5).map(Value::Int).collect();
    /// assert_eq!(vector.get(2), Some(&Value::Int(2)));
    /// assert_eq!(vector.get(9), None);
    /// ```
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        if index >= self.count {
            return None;
        }
        self.leaf_for(index)?.get(index & MASK)
    }

    /// Returns the element at `index`.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] when `index >= len()`.
    pub fn nth(&self, index: usize) -> Result<&Value, Error> {
        self.get(index).ok_or(Error::IndexOutOfBounds {
            index: i64::try_from(index).unwrap_or(i64::MAX),
            count: self.count,
        })
    }

    /// Returns the first element, if any.
    #[inline]
    #[must_use]
    pub fn first(&self) -> Option<&Value> {
        self.get(0)
    }

    /// Returns the last element, if any. O(1): the last element is always
    /// in the tail.
    #[inline]
    #[must_use]
    pub fn peek(&self) -> Option<&Value> {
        self.tail.last()
    }

    /// Returns an iterator over the elements, walking leaf arrays directly.
    #[must_use]
    pub fn iter(&self) -> Iter<'_> {
        self.iter_from(0)
    }

    /// Iterator starting at `index`; used by indexed sequence cursors.
    pub(crate) fn iter_from(&self, index: usize) -> Iter<'_> {
        Iter {
            vector: self,
            index,
            chunk: &[],
            position: 0,
        }
    }

    /// Appends an element, returning the new vector.
    ///
    /// While the tail has room the trie is untouched. A full tail is pushed
    /// into the trie as one leaf via path copying; when the root is
    /// saturated at its current height, a new root one level taller is
    /// allocated with the old root as its first child.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use seqtrie::value::Value;
    /// use seqtrie::vector::PersistentVector;
    ///
    /// let vector = PersistentVector::new().push_back(Value::Int(1));
    /// let longer = vector.push_back(Value::Int(2));
    /// assert_eq!(vector.len(), 1);
    /// assert_eq!(longer.len(), 2);
    /// ```
    #[must_use]
    pub fn push_back(&self, element: Value) -> Self {
        if self.tail.len() < FANOUT {
            let mut new_tail = self.tail.to_vec();
            new_tail.push(element);
            return Self {
                count: self.count + 1,
                shift: self.shift,
                root: self.root.clone(),
                tail: ReferenceCounter::from(new_tail),
                meta: self.meta.clone(),
            };
        }

        // Tail is full: it becomes the rightmost trie leaf.
        let leaf = VectorNode::Leaf {
            edit: None,
            elements: self.tail.to_vec(),
        };
        let tail_offset = self.count - FANOUT;
        let root_overflow = (self.count >> BITS) > (1 << self.shift);

        let (new_root, new_shift) = if root_overflow {
            let mut children: [Option<ReferenceCounter<VectorNode>>; FANOUT] =
                std::array::from_fn(|_| None);
            children[0] = Some(self.root.clone());
            children[1] = Some(ReferenceCounter::new(VectorNode::new_path(
                self.shift, leaf, None,
            )));
            (
                VectorNode::Branch {
                    edit: None,
                    children,
                },
                self.shift + BITS,
            )
        } else {
            (
                Self::push_tail(&self.root, self.shift, tail_offset, leaf),
                self.shift,
            )
        };

        Self {
            count: self.count + 1,
            shift: new_shift,
            root: ReferenceCounter::new(new_root),
            tail: ReferenceCounter::from(vec![element]),
            meta: self.meta.clone(),
        }
    }

    /// Path-copies from `node` down to the insertion point of the new leaf,
    /// sharing every untouched sibling.
    fn push_tail(node: &VectorNode, level: u32, tail_offset: usize, leaf: VectorNode) -> VectorNode {
        match node {
            VectorNode::Branch { children, .. } => {
                let sub = (tail_offset >> level) & MASK;
                let mut new_children = children.clone();
                let child = if level == BITS {
                    leaf
                } else {
                    match &children[sub] {
                        Some(existing) => Self::push_tail(existing, level - BITS, tail_offset, leaf),
                        None => VectorNode::new_path(level - BITS, leaf, None),
                    }
                };
                new_children[sub] = Some(ReferenceCounter::new(child));
                VectorNode::Branch {
                    edit: None,
                    children: new_children,
                }
            }
            VectorNode::Leaf { .. } => leaf,
        }
    }

    /// Replaces the element at `index`, returning the new vector. An index
    /// equal to `len()` appends.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] when `index > len()`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use seqtrie::value::Value;
    /// use seqtrie::vector::PersistentVector;
    ///
    /// let vector: PersistentVector = (0..3).map(Value::Int).collect();
    /// let updated = vector.assoc(1, Value::Int(100)).unwrap();
    /// assert_eq!(updated.get(1), Some(&Value::Int(100)));
    /// assert_eq!(vector.get(1), Some(&Value::Int(1)));
    /// ```
    pub fn assoc(&self, index: usize, element: Value) -> Result<Self, Error> {
        if index == self.count {
            return Ok(self.push_back(element));
        }
        if index > self.count {
            return Err(Error::IndexOutOfBounds {
                index: i64::try_from(index).unwrap_or(i64::MAX),
                count: self.count,
            });
        }

        if index >= self.tail_offset() {
            let mut new_tail = self.tail.to_vec();
            new_tail[index & MASK] = element;
            return Ok(Self {
                count: self.count,
                shift: self.shift,
                root: self.root.clone(),
                tail: ReferenceCounter::from(new_tail),
                meta: self.meta.clone(),
            });
        }

        Ok(Self {
            count: self.count,
            shift: self.shift,
            root: ReferenceCounter::new(Self::assoc_in_node(
                &self.root, self.shift, index, element,
            )),
            tail: self.tail.clone(),
            meta: self.meta.clone(),
        })
    }

    /// Copies the path from `node` to the leaf holding `index` and writes
    /// the element into the copied leaf.
    fn assoc_in_node(node: &VectorNode, level: u32, index: usize, element: Value) -> VectorNode {
        match node {
            VectorNode::Branch { children, .. } => {
                let sub = (index >> level) & MASK;
                let mut new_children = children.clone();
                if let Some(child) = &children[sub] {
                    new_children[sub] = Some(ReferenceCounter::new(Self::assoc_in_node(
                        child,
                        level - BITS,
                        index,
                        element,
                    )));
                }
                VectorNode::Branch {
                    edit: None,
                    children: new_children,
                }
            }
            VectorNode::Leaf { elements, .. } => {
                let mut new_elements = elements.clone();
                if let Some(slot) = new_elements.get_mut(index & MASK) {
                    *slot = element;
                }
                VectorNode::Leaf {
                    edit: None,
                    elements: new_elements,
                }
            }
        }
    }

    /// Removes the last element, returning the new vector.
    ///
    /// When the tail empties, the rightmost trie leaf is promoted to be the
    /// new tail; emptied ancestors are pruned and a single-child
    /// pass-through root drops one level of height.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyCollection`] when the vector is empty.
    pub fn pop(&self) -> Result<Self, Error> {
        if self.count == 0 {
            return Err(Error::EmptyCollection { operation: "pop" });
        }
        if self.count == 1 {
            return Ok(self.empty());
        }

        if self.tail.len() > 1 {
            let new_tail = self.tail[..self.tail.len() - 1].to_vec();
            return Ok(Self {
                count: self.count - 1,
                shift: self.shift,
                root: self.root.clone(),
                tail: ReferenceCounter::from(new_tail),
                meta: self.meta.clone(),
            });
        }

        // The tail empties: promote the rightmost trie leaf.
        let promoted = self
            .leaf_for(self.count - 2)
            .map(<[Value]>::to_vec)
            .unwrap_or_default();

        let (new_root, new_shift) = match Self::pop_tail(&self.root, self.shift, self.count - 2) {
            None => (ReferenceCounter::new(VectorNode::empty_branch()), BITS),
            Some(pruned) => {
                // Single pass-through root: drop a level.
                if self.shift > BITS
                    && let VectorNode::Branch { children, .. } = &pruned
                    && children[1].is_none()
                    && let Some(only_child) = &children[0]
                {
                    (only_child.clone(), self.shift - BITS)
                } else {
                    (ReferenceCounter::new(pruned), self.shift)
                }
            }
        };

        Ok(Self {
            count: self.count - 1,
            shift: new_shift,
            root: new_root,
            tail: ReferenceCounter::from(promoted),
            meta: self.meta.clone(),
        })
    }

    /// Removes the rightmost leaf below `node`. `None` means the subtree
    /// became empty and the parent must drop its slot.
    fn pop_tail(node: &VectorNode, level: u32, tail_offset: usize) -> Option<VectorNode> {
        let VectorNode::Branch { children, .. } = node else {
            return None;
        };
        let sub = (tail_offset >> level) & MASK;

        if level > BITS {
            let replacement = children[sub]
                .as_ref()
                .and_then(|child| Self::pop_tail(child, level - BITS, tail_offset));
            if replacement.is_none() && sub == 0 {
                return None;
            }
            let mut new_children = children.clone();
            new_children[sub] = replacement.map(ReferenceCounter::new);
            Some(VectorNode::Branch {
                edit: None,
                children: new_children,
            })
        } else if sub == 0 {
            None
        } else {
            let mut new_children = children.clone();
            new_children[sub] = None;
            Some(VectorNode::Branch {
                edit: None,
                children: new_children,
            })
        }
    }

    /// The canonical empty vector carrying this vector's metadata.
    #[must_use]
    pub fn empty(&self) -> Self {
        Self {
            count: 0,
            shift: BITS,
            root: ReferenceCounter::new(VectorNode::empty_branch()),
            tail: ReferenceCounter::from(Vec::new()),
            meta: self.meta.clone(),
        }
    }

    /// A reversed sequence cursor walking indices backward, or `None` when
    /// empty. Never materializes a forward sequence.
    #[must_use]
    pub fn rseq(&self) -> Option<Seq> {
        Seq::indexed_rev(ReferenceCounter::new(self.clone()))
    }

    /// A single-owner transient for batching many edits.
    #[must_use]
    pub fn transient(&self) -> TransientVector {
        TransientVector {
            count: self.count,
            shift: self.shift,
            root: self.root.clone(),
            tail: self.tail.iter().cloned().collect(),
            meta: self.meta.clone(),
            edit: EditToken::new(),
        }
    }
}

impl Seqable for PersistentVector {
    fn seq(&self) -> Option<Seq> {
        Seq::indexed(ReferenceCounter::new(self.clone()), 0)
    }
}

impl Counted for PersistentVector {
    #[inline]
    fn count(&self) -> usize {
        self.count
    }
}

impl Reduce for PersistentVector {
    fn reduce<B, F>(&self, init: B, mut function: F) -> B
    where
        F: FnMut(B, Value) -> B,
    {
        // Folds over leaf arrays and the tail directly; no cursor is built.
        self.iter().fold(init, |accumulator, element| {
            function(accumulator, element.clone())
        })
    }
}

impl Metadata for PersistentVector {
    fn meta(&self) -> Option<&PersistentHashMap> {
        self.meta.as_deref()
    }

    fn with_meta(&self, meta: Option<PersistentHashMap>) -> Self {
        Self {
            count: self.count,
            shift: self.shift,
            root: self.root.clone(),
            tail: self.tail.clone(),
            meta: meta.map(ReferenceCounter::new),
        }
    }
}

/// Coerces a numeric-like key to an index: integers directly, floats only
/// with a zero fractional part.
fn index_from_value(key: &Value) -> Result<i64, Error> {
    match key {
        Value::Int(index) => Ok(*index),
        #[allow(clippy::cast_possible_truncation)]
        Value::Float(index) if index.fract() == 0.0 => Ok(*index as i64),
        other => Err(Error::KeyType {
            expected: "integer index",
            found: other.type_name(),
        }),
    }
}

impl Invoke for PersistentVector {
    /// `vector(i)` behaves as `nth(i)` with numeric coercion of the index.
    fn invoke(&self, args: &[Value]) -> Result<Value, Error> {
        match args {
            [key] => {
                let index = index_from_value(key)?;
                let valid = usize::try_from(index)
                    .ok()
                    .filter(|candidate| *candidate < self.count);
                match valid {
                    Some(index) => self.nth(index).cloned(),
                    None => Err(Error::IndexOutOfBounds {
                        index,
                        count: self.count,
                    }),
                }
            }
            _ => Err(Error::Arity {
                callee: "vector",
                accepted: "1",
                got: args.len(),
            }),
        }
    }
}

// =============================================================================
// Iterator Implementation
// =============================================================================

/// An iterator over references to a vector's elements.
///
/// Walks one leaf array at a time: a fresh chunk is fetched every 32
/// elements, so iteration is O(N) overall.
pub struct Iter<'a> {
    vector: &'a PersistentVector,
    /// Next overall index to yield.
    index: usize,
    /// Current leaf (or tail) chunk.
    chunk: &'a [Value],
    /// Position inside the current chunk.
    position: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Value;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.vector.count {
            return None;
        }
        if self.position >= self.chunk.len() {
            self.chunk = self.vector.leaf_for(self.index)?;
            self.position = self.index & MASK;
        }
        let element = self.chunk.get(self.position)?;
        self.position += 1;
        self.index += 1;
        Some(element)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.vector.count.saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Iter<'_> {
    fn len(&self) -> usize {
        self.vector.count.saturating_sub(self.index)
    }
}

impl<'a> IntoIterator for &'a PersistentVector {
    type Item = &'a Value;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl Default for PersistentVector {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<Value> for PersistentVector {
    /// Bulk construction routes through a transient: one allocation pass.
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        let mut transient = TransientVector::new();
        for element in iter {
            transient.push_back(element);
        }
        transient.persistent()
    }
}

impl PartialEq for PersistentVector {
    fn eq(&self, other: &Self) -> bool {
        equality::vectors_equiv(self, other)
    }
}

impl Hash for PersistentVector {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(equality::hash_ordered(
            self.iter().map(equality::hash_value),
        ));
    }
}

impl fmt::Display for PersistentVector {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("[")?;
        for (position, element) in self.iter().enumerate() {
            if position > 0 {
                formatter.write_str(" ")?;
            }
            write!(formatter, "{element}")?;
        }
        formatter.write_str("]")
    }
}

impl fmt::Debug for PersistentVector {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_list().entries(self.iter()).finish()
    }
}

// =============================================================================
// TransientVector
// =============================================================================

/// A single-owner, temporarily mutable view of a [`PersistentVector`].
///
/// Transients batch many edits into one allocation pass. Every node created
/// by this transient is stamped with its [`EditToken`]; nodes carrying any
/// other tag (or none) belong to published roots and are copied before the
/// first write, so no published vector can ever observe a change.
///
/// The handle must stay with one logical owner. `&mut self` receivers make
/// shared mutation unrepresentable, and [`TransientVector::persistent`]
/// consumes the handle, so mutation after freezing is a compile error.
///
/// # Examples
///
/// ```rust
/// use seqtrie::value::Value;
/// use seqtrie::vector::TransientVector;
///
/// let mut transient = TransientVector::new();
/// for index in 0..100 {
///     transient.push_back(Value::Int(index));
/// }
/// let vector = transient.persistent();
/// assert_eq!(vector.len(), 100);
/// ```
pub struct TransientVector {
    count: usize,
    shift: u32,
    root: ReferenceCounter<VectorNode>,
    /// Mutable tail workspace, bounded by the fanout.
    tail: ArrayVec<Value, FANOUT>,
    meta: Option<ReferenceCounter<PersistentHashMap>>,
    edit: EditToken,
}

impl TransientVector {
    /// A transient over the empty vector.
    #[must_use]
    pub fn new() -> Self {
        PersistentVector::new().transient()
    }

    /// Returns the number of elements.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Returns `true` if no elements are present.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Reads the element at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        if index >= self.count {
            return None;
        }
        let tail_offset = self.count - self.tail.len();
        if index >= tail_offset {
            return self.tail.get(index - tail_offset);
        }

        let mut node = self.root.as_ref();
        let mut level = self.shift;
        while level > 0 {
            match node {
                VectorNode::Branch { children, .. } => {
                    node = children[(index >> level) & MASK].as_ref()?;
                    level -= BITS;
                }
                VectorNode::Leaf { .. } => break,
            }
        }
        match node {
            VectorNode::Leaf { elements, .. } => elements.get(index & MASK),
            VectorNode::Branch { .. } => None,
        }
    }

    /// Appends an element in place.
    pub fn push_back(&mut self, element: Value) {
        if self.tail.len() < FANOUT {
            self.tail.push(element);
            self.count += 1;
            return;
        }

        // Full tail moves into the trie as a leaf owned by this transient.
        let elements: Vec<Value> = self.tail.take().into_iter().collect();
        let leaf = VectorNode::Leaf {
            edit: Some(self.edit.clone()),
            elements,
        };
        let tail_offset = self.count - FANOUT;

        if (self.count >> BITS) > (1 << self.shift) {
            let mut children: [Option<ReferenceCounter<VectorNode>>; FANOUT] =
                std::array::from_fn(|_| None);
            children[0] = Some(self.root.clone());
            children[1] = Some(ReferenceCounter::new(VectorNode::new_path(
                self.shift,
                leaf,
                Some(&self.edit),
            )));
            self.root = ReferenceCounter::new(VectorNode::Branch {
                edit: Some(self.edit.clone()),
                children,
            });
            self.shift += BITS;
        } else {
            Self::push_tail_mut(&mut self.root, self.shift, tail_offset, leaf, &self.edit);
        }

        self.tail.push(element);
        self.count += 1;
    }

    fn push_tail_mut(
        node: &mut ReferenceCounter<VectorNode>,
        level: u32,
        tail_offset: usize,
        leaf: VectorNode,
        edit: &EditToken,
    ) {
        if let VectorNode::Branch { children, .. } = editable_mut(node, edit) {
            let sub = (tail_offset >> level) & MASK;
            if level == BITS {
                children[sub] = Some(ReferenceCounter::new(leaf));
            } else if let Some(child) = &mut children[sub] {
                Self::push_tail_mut(child, level - BITS, tail_offset, leaf, edit);
            } else {
                children[sub] = Some(ReferenceCounter::new(VectorNode::new_path(
                    level - BITS,
                    leaf,
                    Some(edit),
                )));
            }
        }
    }

    /// Replaces the element at `index` in place; `index == len()` appends.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfBounds`] when `index > len()`.
    pub fn assoc(&mut self, index: usize, element: Value) -> Result<(), Error> {
        if index == self.count {
            self.push_back(element);
            return Ok(());
        }
        if index > self.count {
            return Err(Error::IndexOutOfBounds {
                index: i64::try_from(index).unwrap_or(i64::MAX),
                count: self.count,
            });
        }

        let tail_offset = self.count - self.tail.len();
        if index >= tail_offset {
            self.tail[index - tail_offset] = element;
        } else {
            Self::assoc_mut(&mut self.root, self.shift, index, element, &self.edit);
        }
        Ok(())
    }

    fn assoc_mut(
        node: &mut ReferenceCounter<VectorNode>,
        level: u32,
        index: usize,
        element: Value,
        edit: &EditToken,
    ) {
        match editable_mut(node, edit) {
            VectorNode::Branch { children, .. } => {
                if let Some(child) = &mut children[(index >> level) & MASK] {
                    Self::assoc_mut(child, level - BITS, index, element, edit);
                }
            }
            VectorNode::Leaf { elements, .. } => {
                if let Some(slot) = elements.get_mut(index & MASK) {
                    *slot = element;
                }
            }
        }
    }

    /// Removes the last element in place.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyCollection`] when no elements remain.
    pub fn pop(&mut self) -> Result<(), Error> {
        if self.count == 0 {
            return Err(Error::EmptyCollection { operation: "pop" });
        }
        if self.count == 1 {
            self.tail.clear();
            self.count = 0;
            return Ok(());
        }
        if self.tail.len() > 1 {
            self.tail.pop();
            self.count -= 1;
            return Ok(());
        }

        // Promote the rightmost trie leaf into the tail workspace.
        let promoted = self.trie_leaf(self.count - 2);
        let still_occupied =
            Self::pop_tail_mut(&mut self.root, self.shift, self.count - 2, &self.edit);

        self.tail = promoted;
        if still_occupied {
            self.collapse_root();
        } else {
            self.root = ReferenceCounter::new(VectorNode::empty_branch());
            self.shift = BITS;
        }
        self.count -= 1;
        Ok(())
    }

    /// Clones the trie leaf containing `index` into a tail workspace.
    fn trie_leaf(&self, index: usize) -> ArrayVec<Value, FANOUT> {
        let mut node = self.root.as_ref();
        let mut level = self.shift;
        while level > 0 {
            match node {
                VectorNode::Branch { children, .. } => {
                    match children[(index >> level) & MASK].as_ref() {
                        Some(child) => {
                            node = child;
                            level -= BITS;
                        }
                        None => return ArrayVec::new(),
                    }
                }
                VectorNode::Leaf { .. } => break,
            }
        }
        match node {
            VectorNode::Leaf { elements, .. } => elements.iter().cloned().collect(),
            VectorNode::Branch { .. } => ArrayVec::new(),
        }
    }

    /// Removes the rightmost leaf in place. Returns `false` when the whole
    /// subtree below `node` became empty.
    fn pop_tail_mut(
        node: &mut ReferenceCounter<VectorNode>,
        level: u32,
        tail_offset: usize,
        edit: &EditToken,
    ) -> bool {
        let VectorNode::Branch { children, .. } = editable_mut(node, edit) else {
            return false;
        };
        let sub = (tail_offset >> level) & MASK;

        if level > BITS {
            let keep = match &mut children[sub] {
                Some(child) => Self::pop_tail_mut(child, level - BITS, tail_offset, edit),
                None => false,
            };
            if !keep {
                children[sub] = None;
            }
        } else {
            children[sub] = None;
        }
        children.iter().any(Option::is_some)
    }

    /// Drops one level of height when the root passes through a single
    /// child.
    fn collapse_root(&mut self) {
        if self.shift <= BITS {
            return;
        }
        let replacement = match self.root.as_ref() {
            VectorNode::Branch { children, .. } if children[1].is_none() => children[0].clone(),
            _ => None,
        };
        if let Some(only_child) = replacement {
            self.root = only_child;
            self.shift -= BITS;
        }
    }

    /// Freezes this transient into a persistent vector, consuming the
    /// handle.
    ///
    /// The token dies with the handle: nodes still carrying it can never
    /// match a future transient's token, so the result is as immutable as
    /// any other persistent vector.
    #[must_use]
    pub fn persistent(self) -> PersistentVector {
        let tail: Vec<Value> = self.tail.into_iter().collect();
        PersistentVector {
            count: self.count,
            shift: self.shift,
            root: self.root,
            tail: ReferenceCounter::from(tail),
            meta: self.meta,
        }
    }
}

impl Default for TransientVector {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn vector_of(range: std::ops::Range<i64>) -> PersistentVector {
        range.map(Value::Int).collect()
    }

    #[rstest]
    fn test_empty_vector_shape() {
        let vector = PersistentVector::new();
        assert_eq!(vector.len(), 0);
        assert_eq!(vector.shift, BITS);
        assert!(vector.get(0).is_none());
    }

    #[rstest]
    fn test_tail_stays_full_at_multiples_of_fanout() {
        let vector = vector_of(0..32);
        assert_eq!(vector.tail.len(), 32);
        assert_eq!(vector.tail_offset(), 0);

        let pushed = vector.push_back(Value::Int(32));
        assert_eq!(pushed.tail.len(), 1);
        assert_eq!(pushed.tail_offset(), 32);
    }

    #[rstest]
    fn test_push_back_shares_untouched_root() {
        let vector = vector_of(0..100);
        let pushed = vector.push_back(Value::Int(100));
        // Appending into tail space must not copy the trie.
        assert!(ReferenceCounter::ptr_eq(&vector.root, &pushed.root));
    }

    #[rstest]
    fn test_assoc_in_tail_shares_root() {
        let vector = vector_of(0..100);
        let updated = vector.assoc(99, Value::Int(-1)).unwrap();
        assert!(ReferenceCounter::ptr_eq(&vector.root, &updated.root));
        assert_eq!(updated.get(99), Some(&Value::Int(-1)));
        assert_eq!(vector.get(99), Some(&Value::Int(99)));
    }

    #[rstest]
    fn test_assoc_in_trie_shares_tail() {
        let vector = vector_of(0..100);
        let updated = vector.assoc(10, Value::Int(-1)).unwrap();
        assert!(ReferenceCounter::ptr_eq(&vector.tail, &updated.tail));
        assert_eq!(updated.get(10), Some(&Value::Int(-1)));
        assert_eq!(vector.get(10), Some(&Value::Int(10)));
    }

    #[rstest]
    fn test_height_grows_and_collapses_around_1024() {
        let vector = vector_of(0..1057);
        assert_eq!(vector.shift, 2 * BITS);

        let mut popped = vector.clone();
        for _ in 0..33 {
            popped = popped.pop().unwrap();
        }
        assert_eq!(popped.shift, BITS);
        for index in 0..popped.len() {
            assert_eq!(popped.get(index), Some(&Value::Int(i64::try_from(index).unwrap())));
        }
    }

    #[rstest]
    fn test_pop_to_empty_yields_canonical_empty() {
        let mut vector = vector_of(0..5);
        for _ in 0..5 {
            vector = vector.pop().unwrap();
        }
        assert!(vector.is_empty());
        assert_eq!(vector.shift, BITS);
        assert_eq!(
            vector.pop(),
            Err(Error::EmptyCollection { operation: "pop" })
        );
    }

    #[rstest]
    fn test_iter_from_starts_mid_leaf() {
        let vector = vector_of(0..100);
        let collected: Vec<i64> = vector
            .iter_from(37)
            .map(|element| match element {
                Value::Int(i) => *i,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(collected, (37..100).collect::<Vec<i64>>());
    }

    #[rstest]
    fn test_invoke_coerces_and_checks() {
        let vector = vector_of(0..4);
        assert_eq!(vector.invoke(&[Value::Int(2)]), Ok(Value::Int(2)));
        assert_eq!(vector.invoke(&[Value::Float(2.0)]), Ok(Value::Int(2)));
        assert_eq!(
            vector.invoke(&[Value::Float(2.5)]),
            Err(Error::KeyType {
                expected: "integer index",
                found: "float",
            })
        );
        assert_eq!(
            vector.invoke(&[Value::Int(-1)]),
            Err(Error::IndexOutOfBounds { index: -1, count: 4 })
        );
        assert_eq!(
            vector.invoke(&[]),
            Err(Error::Arity {
                callee: "vector",
                accepted: "1",
                got: 0,
            })
        );
    }

    #[rstest]
    fn test_transient_copies_shared_nodes_before_writing() {
        let source = vector_of(0..100);
        let mut transient = source.transient();
        for index in 0..100 {
            transient.assoc(index, Value::Int(-1)).unwrap();
        }
        let edited = transient.persistent();

        for index in 0..100 {
            assert_eq!(source.get(index), Some(&Value::Int(i64::try_from(index).unwrap())));
            assert_eq!(edited.get(index), Some(&Value::Int(-1)));
        }
    }

    #[rstest]
    fn test_transient_pop_through_leaf_boundary() {
        let mut transient = vector_of(0..70).transient();
        for _ in 0..40 {
            transient.pop().unwrap();
        }
        let vector = transient.persistent();
        assert_eq!(vector.len(), 30);
        for index in 0..30 {
            assert_eq!(vector.get(index), Some(&Value::Int(i64::try_from(index).unwrap())));
        }
    }
}
