//! Persistent (immutable) hash map over a Hash-Array-Mapped Trie.
//!
//! This module provides [`PersistentHashMap`], the key/value collection of
//! the engine, and [`TransientHashMap`], its single-owner batch-mutation
//! counterpart.
//!
//! # Overview
//!
//! Keys are hashed once and the trie is descended five bits of the hash at
//! a time:
//!
//! - O(log32 N) lookup, insert, and remove (effectively O(1))
//! - O(1) count
//! - structural sharing between versions; removal of an absent key returns
//!   the same structure without allocating a single node
//!
//! # Internal Structure
//!
//! Three node shapes cover the density spectrum:
//!
//! - bitmap nodes: a 32-bit presence bitmap plus a densely packed child
//!   array in population-count order; the workhorse for sparse levels,
//! - array nodes: a dense 32-slot array used once a bitmap node would
//!   exceed 16 occupied slots, avoiding repeated repacking; removal packs
//!   back to bitmap form at 8 occupied slots,
//! - collision nodes: a linear entry list for keys sharing a full hash.
//!
//! A nil key never enters the trie: the map itself carries one nil slot.
//!
//! # Examples
//!
//! ```rust
//! use seqtrie::value::Value;
//! use seqtrie::hashmap::PersistentHashMap;
//!
//! let map = PersistentHashMap::new()
//!     .insert(Value::from("one"), Value::Int(1))
//!     .insert(Value::from("two"), Value::Int(2));
//!
//! let updated = map.insert(Value::from("one"), Value::Int(100));
//! assert_eq!(map.get(&Value::from("one")), Some(&Value::Int(1)));
//! assert_eq!(updated.get(&Value::from("one")), Some(&Value::Int(100)));
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::FromIterator;

use smallvec::{smallvec, SmallVec};
use static_assertions::const_assert;

use crate::contract::{Counted, Invoke, Metadata, Reduce, Seqable};
use crate::equality;
use crate::error::Error;
use crate::seq::Seq;
use crate::value::Value;
use crate::vector::PersistentVector;
use crate::{EditToken, ReferenceCounter};

// =============================================================================
// Constants
// =============================================================================

/// Trie fanout (2^5 = 32)
const FANOUT: usize = 32;

/// Bits of the hash consumed per trie level
const BITS: u32 = 5;

/// Mask extracting one hash chunk
const MASK: u64 = (FANOUT - 1) as u64;

/// A bitmap node exceeding this many occupied slots becomes an array node.
const PROMOTE_THRESHOLD: usize = 16;

/// An array node dropping to this many occupied slots packs back to a
/// bitmap node.
const PACK_THRESHOLD: usize = 8;

const_assert!(FANOUT == 1 << BITS);
const_assert!(PACK_THRESHOLD < PROMOTE_THRESHOLD);

/// The five-bit hash chunk selected at `shift`.
#[inline]
const fn chunk(hash: u64, shift: u32) -> usize {
    ((hash >> shift) & MASK) as usize
}

// =============================================================================
// Node Definition
// =============================================================================

/// One level of the hash trie. The `edit` tag works exactly as in the
/// vector trie: `None` on everything reachable from a published root.
#[derive(Clone)]
enum MapNode {
    /// Sparse level: presence bitmap plus packed children.
    Bitmap {
        edit: Option<EditToken>,
        bitmap: u32,
        children: Vec<MapChild>,
    },
    /// Dense level: direct 32-slot child array.
    Array {
        edit: Option<EditToken>,
        occupied: usize,
        children: Box<[Option<ReferenceCounter<MapNode>>; FANOUT]>,
    },
    /// Entries whose full hashes coincide.
    Collision {
        edit: Option<EditToken>,
        hash: u64,
        entries: SmallVec<[(Value, Value); 2]>,
    },
}

/// A slot in a bitmap node: an inline entry or a deeper node.
#[derive(Clone)]
enum MapChild {
    Entry(Value, Value),
    Node(ReferenceCounter<MapNode>),
}

impl MapNode {
    /// A bitmap node holding one entry, placed by its hash chunk at
    /// `shift`.
    fn single_entry(shift: u32, hash: u64, key: Value, value: Value) -> Self {
        Self::Bitmap {
            edit: None,
            bitmap: 1 << chunk(hash, shift),
            children: vec![MapChild::Entry(key, value)],
        }
    }

    fn owned_by(&self, edit: &EditToken) -> bool {
        let (Self::Bitmap { edit: tag, .. }
        | Self::Array { edit: tag, .. }
        | Self::Collision { edit: tag, .. }) = self;
        tag.as_ref().is_some_and(|token| token.is(edit))
    }

    fn claimed(&self, edit: &EditToken) -> Self {
        match self {
            Self::Bitmap {
                bitmap, children, ..
            } => Self::Bitmap {
                edit: Some(edit.clone()),
                bitmap: *bitmap,
                children: children.clone(),
            },
            Self::Array {
                occupied, children, ..
            } => Self::Array {
                edit: Some(edit.clone()),
                occupied: *occupied,
                children: children.clone(),
            },
            Self::Collision { hash, entries, .. } => Self::Collision {
                edit: Some(edit.clone()),
                hash: *hash,
                entries: entries.clone(),
            },
        }
    }
}

/// In-place access for the transient holding `edit`; foreign or shared
/// nodes are copied first.
fn editable_mut<'a>(
    node: &'a mut ReferenceCounter<MapNode>,
    edit: &EditToken,
) -> &'a mut MapNode {
    if !node.owned_by(edit) {
        *node = ReferenceCounter::new(node.claimed(edit));
    }
    ReferenceCounter::make_mut(node)
}

// =============================================================================
// Shared trie algorithms
// =============================================================================

/// Locates the entry for `key`, if present.
fn find<'a>(node: &'a MapNode, shift: u32, hash: u64, key: &Value) -> Option<(&'a Value, &'a Value)> {
    match node {
        MapNode::Bitmap {
            bitmap, children, ..
        } => {
            let bit = 1u32 << chunk(hash, shift);
            if bitmap & bit == 0 {
                return None;
            }
            let position = (bitmap & (bit - 1)).count_ones() as usize;
            match &children[position] {
                MapChild::Entry(entry_key, entry_value) => {
                    (entry_key == key).then_some((entry_key, entry_value))
                }
                MapChild::Node(subnode) => find(subnode, shift + BITS, hash, key),
            }
        }
        MapNode::Array { children, .. } => children[chunk(hash, shift)]
            .as_ref()
            .and_then(|child| find(child, shift + BITS, hash, key)),
        MapNode::Collision {
            hash: collision_hash,
            entries,
            ..
        } => {
            if *collision_hash != hash {
                return None;
            }
            entries
                .iter()
                .find(|(entry_key, _)| entry_key == key)
                .map(|(entry_key, entry_value)| (entry_key, entry_value))
        }
    }
}

/// Combines two entries with distinct hashes into the smallest subtree
/// separating them, recursing while their chunks coincide.
fn merge_entries(
    shift: u32,
    first_hash: u64,
    first_key: Value,
    first_value: Value,
    second_hash: u64,
    second_key: Value,
    second_value: Value,
) -> MapNode {
    if first_hash == second_hash {
        return MapNode::Collision {
            edit: None,
            hash: first_hash,
            entries: smallvec![(first_key, first_value), (second_key, second_value)],
        };
    }

    let first_chunk = chunk(first_hash, shift);
    let second_chunk = chunk(second_hash, shift);
    if first_chunk == second_chunk {
        let subnode = merge_entries(
            shift + BITS,
            first_hash,
            first_key,
            first_value,
            second_hash,
            second_key,
            second_value,
        );
        return MapNode::Bitmap {
            edit: None,
            bitmap: 1 << first_chunk,
            children: vec![MapChild::Node(ReferenceCounter::new(subnode))],
        };
    }

    let children = if first_chunk < second_chunk {
        vec![
            MapChild::Entry(first_key, first_value),
            MapChild::Entry(second_key, second_value),
        ]
    } else {
        vec![
            MapChild::Entry(second_key, second_value),
            MapChild::Entry(first_key, first_value),
        ]
    };
    MapNode::Bitmap {
        edit: None,
        bitmap: (1 << first_chunk) | (1 << second_chunk),
        children,
    }
}

/// Unpacks an overflowing bitmap node into a dense array node and adds the
/// new entry. The new entry's bit is known absent from `bitmap`.
fn promote_bitmap(
    bitmap: u32,
    children: &[MapChild],
    shift: u32,
    hash: u64,
    key: Value,
    value: Value,
) -> MapNode {
    let mut slots: Box<[Option<ReferenceCounter<MapNode>>; FANOUT]> =
        Box::new(std::array::from_fn(|_| None));
    let mut packed = children.iter();

    for (index, slot) in slots.iter_mut().enumerate() {
        if bitmap & (1 << index) != 0
            && let Some(child) = packed.next()
        {
            *slot = Some(match child {
                MapChild::Entry(entry_key, entry_value) => {
                    let entry_hash = equality::hash_value(entry_key);
                    ReferenceCounter::new(MapNode::single_entry(
                        shift + BITS,
                        entry_hash,
                        entry_key.clone(),
                        entry_value.clone(),
                    ))
                }
                MapChild::Node(subnode) => subnode.clone(),
            });
        }
    }

    let occupied = children.len() + 1;
    slots[chunk(hash, shift)] = Some(ReferenceCounter::new(MapNode::single_entry(
        shift + BITS,
        hash,
        key,
        value,
    )));
    MapNode::Array {
        edit: None,
        occupied,
        children: slots,
    }
}

/// Packs a thinned-out array node back into bitmap form, skipping
/// `without_slot` (pass the fanout when no slot is to be skipped).
/// Single-entry children flatten back to inline entries.
fn pack_array(
    children: &[Option<ReferenceCounter<MapNode>>; FANOUT],
    without_slot: usize,
) -> MapNode {
    let mut bitmap = 0u32;
    let mut packed: Vec<MapChild> = Vec::new();

    for (index, slot) in children.iter().enumerate() {
        if index == without_slot {
            continue;
        }
        if let Some(subnode) = slot {
            bitmap |= 1 << index;
            let child = match subnode.as_ref() {
                MapNode::Bitmap { children, .. } if children.len() == 1 => match &children[0] {
                    MapChild::Entry(key, value) => MapChild::Entry(key.clone(), value.clone()),
                    MapChild::Node(_) => MapChild::Node(subnode.clone()),
                },
                _ => MapChild::Node(subnode.clone()),
            };
            packed.push(child);
        }
    }

    MapNode::Bitmap {
        edit: None,
        bitmap,
        children: packed,
    }
}

// =============================================================================
// Persistent insertion
// =============================================================================

/// Returns the node with the entry added or replaced; `added` reports
/// whether the map grew.
fn assoc_node(
    node: &MapNode,
    shift: u32,
    hash: u64,
    key: Value,
    value: Value,
    added: &mut bool,
) -> MapNode {
    match node {
        MapNode::Bitmap {
            bitmap, children, ..
        } => {
            let index = chunk(hash, shift);
            let bit = 1u32 << index;
            let position = (bitmap & (bit - 1)).count_ones() as usize;

            if bitmap & bit == 0 {
                *added = true;
                if children.len() >= PROMOTE_THRESHOLD {
                    return promote_bitmap(*bitmap, children, shift, hash, key, value);
                }
                let mut new_children = children.clone();
                new_children.insert(position, MapChild::Entry(key, value));
                return MapNode::Bitmap {
                    edit: None,
                    bitmap: bitmap | bit,
                    children: new_children,
                };
            }

            let replacement = match &children[position] {
                MapChild::Entry(entry_key, entry_value) => {
                    if entry_key == &key {
                        MapChild::Entry(key, value)
                    } else {
                        *added = true;
                        let entry_hash = equality::hash_value(entry_key);
                        MapChild::Node(ReferenceCounter::new(merge_entries(
                            shift + BITS,
                            entry_hash,
                            entry_key.clone(),
                            entry_value.clone(),
                            hash,
                            key,
                            value,
                        )))
                    }
                }
                MapChild::Node(subnode) => MapChild::Node(ReferenceCounter::new(assoc_node(
                    subnode,
                    shift + BITS,
                    hash,
                    key,
                    value,
                    added,
                ))),
            };
            let mut new_children = children.clone();
            new_children[position] = replacement;
            MapNode::Bitmap {
                edit: None,
                bitmap: *bitmap,
                children: new_children,
            }
        }

        MapNode::Array {
            occupied, children, ..
        } => {
            let index = chunk(hash, shift);
            let mut new_children = children.clone();
            let new_occupied = match &children[index] {
                Some(child) => {
                    new_children[index] = Some(ReferenceCounter::new(assoc_node(
                        child,
                        shift + BITS,
                        hash,
                        key,
                        value,
                        added,
                    )));
                    *occupied
                }
                None => {
                    *added = true;
                    new_children[index] = Some(ReferenceCounter::new(MapNode::single_entry(
                        shift + BITS,
                        hash,
                        key,
                        value,
                    )));
                    occupied + 1
                }
            };
            MapNode::Array {
                edit: None,
                occupied: new_occupied,
                children: new_children,
            }
        }

        MapNode::Collision {
            hash: collision_hash,
            entries,
            ..
        } => {
            if hash == *collision_hash {
                let mut new_entries = entries.clone();
                match new_entries.iter_mut().find(|(entry_key, _)| entry_key == &key) {
                    Some(entry) => entry.1 = value,
                    None => {
                        *added = true;
                        new_entries.push((key, value));
                    }
                }
                return MapNode::Collision {
                    edit: None,
                    hash: *collision_hash,
                    entries: new_entries,
                };
            }

            // The new hash diverges: push the collision node one level down
            // and insert into the wrapper.
            let wrapped = MapNode::Bitmap {
                edit: None,
                bitmap: 1 << chunk(*collision_hash, shift),
                children: vec![MapChild::Node(ReferenceCounter::new(node.clone()))],
            };
            assoc_node(&wrapped, shift, hash, key, value, added)
        }
    }
}

// =============================================================================
// Persistent removal
// =============================================================================

/// Outcome of removing a key below a node.
enum Removed {
    /// Key absent: the caller keeps its structure untouched.
    NotFound,
    /// The subtree lost its last entry.
    Empty,
    /// The subtree collapsed to a single entry; the parent inlines it.
    Entry(Value, Value),
    /// The subtree persists in a new form.
    Node(MapNode),
}

fn without_node(node: &MapNode, shift: u32, hash: u64, key: &Value) -> Removed {
    match node {
        MapNode::Bitmap {
            bitmap, children, ..
        } => {
            let bit = 1u32 << chunk(hash, shift);
            if bitmap & bit == 0 {
                return Removed::NotFound;
            }
            let position = (bitmap & (bit - 1)).count_ones() as usize;

            match &children[position] {
                MapChild::Entry(entry_key, _) => {
                    if entry_key != key {
                        return Removed::NotFound;
                    }
                    drop_bitmap_slot(*bitmap, children, position, bit)
                }
                MapChild::Node(subnode) => {
                    match without_node(subnode, shift + BITS, hash, key) {
                        Removed::NotFound => Removed::NotFound,
                        Removed::Empty => drop_bitmap_slot(*bitmap, children, position, bit),
                        Removed::Entry(entry_key, entry_value) => {
                            if children.len() == 1 {
                                // This node was a pure pass-through.
                                Removed::Entry(entry_key, entry_value)
                            } else {
                                let mut new_children = children.clone();
                                new_children[position] = MapChild::Entry(entry_key, entry_value);
                                Removed::Node(MapNode::Bitmap {
                                    edit: None,
                                    bitmap: *bitmap,
                                    children: new_children,
                                })
                            }
                        }
                        Removed::Node(new_subnode) => {
                            let mut new_children = children.clone();
                            new_children[position] =
                                MapChild::Node(ReferenceCounter::new(new_subnode));
                            Removed::Node(MapNode::Bitmap {
                                edit: None,
                                bitmap: *bitmap,
                                children: new_children,
                            })
                        }
                    }
                }
            }
        }

        MapNode::Array {
            occupied, children, ..
        } => {
            let index = chunk(hash, shift);
            let Some(child) = &children[index] else {
                return Removed::NotFound;
            };
            match without_node(child, shift + BITS, hash, key) {
                Removed::NotFound => Removed::NotFound,
                Removed::Empty => {
                    let remaining = occupied - 1;
                    if remaining == 0 {
                        Removed::Empty
                    } else if remaining <= PACK_THRESHOLD {
                        Removed::Node(pack_array(children, index))
                    } else {
                        let mut new_children = children.clone();
                        new_children[index] = None;
                        Removed::Node(MapNode::Array {
                            edit: None,
                            occupied: remaining,
                            children: new_children,
                        })
                    }
                }
                Removed::Entry(entry_key, entry_value) => {
                    let entry_hash = equality::hash_value(&entry_key);
                    let mut new_children = children.clone();
                    new_children[index] = Some(ReferenceCounter::new(MapNode::single_entry(
                        shift + BITS,
                        entry_hash,
                        entry_key,
                        entry_value,
                    )));
                    Removed::Node(MapNode::Array {
                        edit: None,
                        occupied: *occupied,
                        children: new_children,
                    })
                }
                Removed::Node(new_subnode) => {
                    let mut new_children = children.clone();
                    new_children[index] = Some(ReferenceCounter::new(new_subnode));
                    Removed::Node(MapNode::Array {
                        edit: None,
                        occupied: *occupied,
                        children: new_children,
                    })
                }
            }
        }

        MapNode::Collision {
            hash: collision_hash,
            entries,
            ..
        } => {
            if *collision_hash != hash {
                return Removed::NotFound;
            }
            let Some(position) = entries.iter().position(|(entry_key, _)| entry_key == key)
            else {
                return Removed::NotFound;
            };
            let mut new_entries = entries.clone();
            new_entries.remove(position);
            match new_entries.len() {
                0 => Removed::Empty,
                1 => {
                    let (entry_key, entry_value) = new_entries.remove(0);
                    Removed::Entry(entry_key, entry_value)
                }
                _ => Removed::Node(MapNode::Collision {
                    edit: None,
                    hash: *collision_hash,
                    entries: new_entries,
                }),
            }
        }
    }
}

/// Removes an inline entry (or an emptied child) from a bitmap node,
/// collapsing to a bare entry when one inline entry remains.
fn drop_bitmap_slot(bitmap: u32, children: &[MapChild], position: usize, bit: u32) -> Removed {
    let remaining_bitmap = bitmap & !bit;
    if remaining_bitmap == 0 {
        return Removed::Empty;
    }

    let mut new_children = children.to_vec();
    new_children.remove(position);
    if new_children.len() == 1
        && let MapChild::Entry(entry_key, entry_value) = &new_children[0]
    {
        return Removed::Entry(entry_key.clone(), entry_value.clone());
    }
    Removed::Node(MapNode::Bitmap {
        edit: None,
        bitmap: remaining_bitmap,
        children: new_children,
    })
}

// =============================================================================
// PersistentHashMap Definition
// =============================================================================

/// A persistent hash map from [`Value`] keys to [`Value`] values.
///
/// # Time Complexity
///
/// | Operation      | Complexity |
/// |----------------|------------|
/// | `new`          | O(1)       |
/// | `get`          | O(log32 N) |
/// | `insert`       | O(log32 N) |
/// | `remove`       | O(log32 N) |
/// | `contains_key` | O(log32 N) |
/// | `len`          | O(1)       |
///
/// Hashing is total, so no associative operation on well-formed input can
/// fail; the only fallible operations are [`PersistentHashMap::insert_new`]
/// (key conflicts), [`PersistentHashMap::conj`] (malformed entries), and
/// invocation (arity).
#[derive(Clone)]
pub struct PersistentHashMap {
    /// Number of entries, the nil entry included.
    count: usize,
    /// Root of the hash trie; `None` when the trie holds nothing.
    root: Option<ReferenceCounter<MapNode>>,
    /// The entry for the nil key. Lives outside the trie.
    nil_entry: Option<(Value, Value)>,
    /// Opaque companion map.
    meta: Option<ReferenceCounter<PersistentHashMap>>,
}

impl PersistentHashMap {
    /// Creates a new empty map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            count: 0,
            root: None,
            nil_entry: None,
            meta: None,
        }
    }

    /// Returns the number of entries.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Returns `true` if the map holds no entries.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns the value for `key`, or `None` when absent.
    ///
    /// A nil key reads the map-level slot and never touches the trie.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use seqtrie::value::Value;
    /// use seqtrie::hashmap::PersistentHashMap;
    ///
    /// let map = PersistentHashMap::new().insert(Value::Nil, Value::Int(0));
    /// assert_eq!(map.get(&Value::Nil), Some(&Value::Int(0)));
    /// assert_eq!(map.get(&Value::Int(1)), None);
    /// ```
    #[must_use]
    pub fn get(&self, key: &Value) -> Option<&Value> {
        if key.is_nil() {
            return self.nil_entry.as_ref().map(|(_, value)| value);
        }
        let root = self.root.as_ref()?;
        find(root, 0, equality::hash_value(key), key).map(|(_, value)| value)
    }

    /// Returns the value for `key`, or `default` when absent.
    #[must_use]
    pub fn get_or<'a>(&'a self, key: &Value, default: &'a Value) -> &'a Value {
        self.get(key).unwrap_or(default)
    }

    /// Returns `true` if `key` has an entry.
    #[must_use]
    pub fn contains_key(&self, key: &Value) -> bool {
        self.get(key).is_some()
    }

    /// Returns the full entry for `key`, or `None` when absent.
    #[must_use]
    pub fn entry_at(&self, key: &Value) -> Option<(Value, Value)> {
        if key.is_nil() {
            return self.nil_entry.clone();
        }
        let root = self.root.as_ref()?;
        find(root, 0, equality::hash_value(key), key)
            .map(|(entry_key, entry_value)| (entry_key.clone(), entry_value.clone()))
    }

    /// Associates `key` with `value`, returning the new map. An existing
    /// entry is replaced; the count grows only for new keys.
    #[must_use]
    pub fn insert(&self, key: Value, value: Value) -> Self {
        if key.is_nil() {
            if self
                .nil_entry
                .as_ref()
                .is_some_and(|(_, existing)| existing == &value)
            {
                return self.clone();
            }
            let grew = self.nil_entry.is_none();
            return Self {
                count: if grew { self.count + 1 } else { self.count },
                root: self.root.clone(),
                nil_entry: Some((Value::Nil, value)),
                meta: self.meta.clone(),
            };
        }

        let hash = equality::hash_value(&key);
        let mut added = false;
        let new_root = match &self.root {
            Some(root) => assoc_node(root, 0, hash, key, value, &mut added),
            None => {
                added = true;
                MapNode::single_entry(0, hash, key, value)
            }
        };
        Self {
            count: if added { self.count + 1 } else { self.count },
            root: Some(ReferenceCounter::new(new_root)),
            nil_entry: self.nil_entry.clone(),
            meta: self.meta.clone(),
        }
    }

    /// Associates `key` with `value`, requiring the key to be absent.
    ///
    /// # Errors
    ///
    /// [`Error::KeyConflict`] when `key` already has an entry, whatever its
    /// value.
    pub fn insert_new(&self, key: Value, value: Value) -> Result<Self, Error> {
        if self.contains_key(&key) {
            return Err(Error::KeyConflict { key });
        }
        Ok(self.insert(key, value))
    }

    /// Removes `key`, returning the new map.
    ///
    /// Removing an absent key returns this map itself: the result shares
    /// the root pointer and no node is allocated, which callers use for
    /// cheap no-op detection.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use seqtrie::value::Value;
    /// use seqtrie::hashmap::PersistentHashMap;
    ///
    /// let map = PersistentHashMap::new().insert(Value::Int(1), Value::Int(10));
    /// let removed = map.remove(&Value::Int(1));
    /// assert!(!removed.contains_key(&Value::Int(1)));
    /// assert_eq!(map.len(), 1); // original unchanged
    /// ```
    #[must_use]
    pub fn remove(&self, key: &Value) -> Self {
        if key.is_nil() {
            if self.nil_entry.is_none() {
                return self.clone();
            }
            return Self {
                count: self.count - 1,
                root: self.root.clone(),
                nil_entry: None,
                meta: self.meta.clone(),
            };
        }

        let Some(root) = &self.root else {
            return self.clone();
        };
        match without_node(root, 0, equality::hash_value(key), key) {
            Removed::NotFound => self.clone(),
            Removed::Empty => Self {
                count: self.count - 1,
                root: None,
                nil_entry: self.nil_entry.clone(),
                meta: self.meta.clone(),
            },
            Removed::Entry(entry_key, entry_value) => {
                let entry_hash = equality::hash_value(&entry_key);
                Self {
                    count: self.count - 1,
                    root: Some(ReferenceCounter::new(MapNode::single_entry(
                        0, entry_hash, entry_key, entry_value,
                    ))),
                    nil_entry: self.nil_entry.clone(),
                    meta: self.meta.clone(),
                }
            }
            Removed::Node(new_root) => Self {
                count: self.count - 1,
                root: Some(ReferenceCounter::new(new_root)),
                nil_entry: self.nil_entry.clone(),
                meta: self.meta.clone(),
            },
        }
    }

    /// Adds an entry-shaped value: a two-element vector as one entry, a map
    /// as a merge, or a seq of two-element vectors entry by entry.
    ///
    /// # Errors
    ///
    /// [`Error::KeyType`] for anything that is not entry-shaped.
    pub fn conj(&self, entry: &Value) -> Result<Self, Error> {
        match entry {
            Value::Map(other) => Ok(self.merge(other)),
            Value::Vector(pair) if pair.len() == 2 => {
                let key = pair.get(0).cloned().unwrap_or(Value::Nil);
                let value = pair.get(1).cloned().unwrap_or(Value::Nil);
                Ok(self.insert(key, value))
            }
            Value::Seq(entries) => {
                let mut transient = self.transient();
                for element in entries.iter() {
                    match element {
                        Value::Vector(pair) if pair.len() == 2 => {
                            let key = pair.get(0).cloned().unwrap_or(Value::Nil);
                            let value = pair.get(1).cloned().unwrap_or(Value::Nil);
                            transient.insert(key, value);
                        }
                        other => {
                            return Err(Error::KeyType {
                                expected: "two-element entry",
                                found: other.type_name(),
                            });
                        }
                    }
                }
                Ok(transient.persistent())
            }
            other => Err(Error::KeyType {
                expected: "map entry",
                found: other.type_name(),
            }),
        }
    }

    /// Merges `other` into this map; its values win on shared keys.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut transient = self.transient();
        for (key, value) in other.iter() {
            transient.insert(key.clone(), value.clone());
        }
        transient.persistent()
    }

    /// Returns an iterator over entries. The nil entry, when present,
    /// comes first; trie entries follow in left-to-right trie order.
    #[must_use]
    pub fn iter(&self) -> Iter<'_> {
        let mut entries = Vec::with_capacity(self.count);
        if let Some((key, value)) = &self.nil_entry {
            entries.push((key, value));
        }
        if let Some(root) = &self.root {
            collect_entries(root, &mut entries);
        }
        Iter { entries, position: 0 }
    }

    /// Returns an iterator over keys.
    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.iter().map(|(key, _)| key)
    }

    /// Returns an iterator over values.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.iter().map(|(_, value)| value)
    }

    /// The canonical empty map carrying this map's metadata.
    #[must_use]
    pub fn empty(&self) -> Self {
        Self {
            count: 0,
            root: None,
            nil_entry: None,
            meta: self.meta.clone(),
        }
    }

    /// A single-owner transient for batching many edits.
    #[must_use]
    pub fn transient(&self) -> TransientHashMap {
        TransientHashMap {
            count: self.count,
            root: self.root.clone(),
            nil_entry: self.nil_entry.clone(),
            meta: self.meta.clone(),
            edit: EditToken::new(),
        }
    }

    /// Builds the two-element vector an entry presents as.
    fn entry_vector(key: &Value, value: &Value) -> Value {
        Value::from(PersistentVector::from_slice(&[key.clone(), value.clone()]))
    }
}

/// Gathers entries left to right.
fn collect_entries<'a>(node: &'a MapNode, entries: &mut Vec<(&'a Value, &'a Value)>) {
    match node {
        MapNode::Bitmap { children, .. } => {
            for child in children {
                match child {
                    MapChild::Entry(key, value) => entries.push((key, value)),
                    MapChild::Node(subnode) => collect_entries(subnode, entries),
                }
            }
        }
        MapNode::Array { children, .. } => {
            for slot in children.iter().flatten() {
                collect_entries(slot, entries);
            }
        }
        MapNode::Collision {
            entries: colliding, ..
        } => {
            for (key, value) in colliding {
                entries.push((key, value));
            }
        }
    }
}

impl Seqable for PersistentHashMap {
    /// Entries as two-element vectors, so each one deconstructs as a 2-slot
    /// indexed collection.
    fn seq(&self) -> Option<Seq> {
        Seq::from_values(
            self.iter()
                .map(|(key, value)| Self::entry_vector(key, value)),
        )
    }
}

impl Counted for PersistentHashMap {
    #[inline]
    fn count(&self) -> usize {
        self.count
    }
}

impl Reduce for PersistentHashMap {
    fn reduce<B, F>(&self, init: B, mut function: F) -> B
    where
        F: FnMut(B, Value) -> B,
    {
        self.iter().fold(init, |accumulator, (key, value)| {
            function(accumulator, Self::entry_vector(key, value))
        })
    }
}

impl Metadata for PersistentHashMap {
    fn meta(&self) -> Option<&PersistentHashMap> {
        self.meta.as_deref()
    }

    fn with_meta(&self, meta: Option<PersistentHashMap>) -> Self {
        Self {
            count: self.count,
            root: self.root.clone(),
            nil_entry: self.nil_entry.clone(),
            meta: meta.map(ReferenceCounter::new),
        }
    }
}

impl Invoke for PersistentHashMap {
    /// `map(k)` looks `k` up (missing keys yield nil); `map(k, default)`
    /// substitutes `default` on a miss.
    fn invoke(&self, args: &[Value]) -> Result<Value, Error> {
        match args {
            [key] => Ok(self.get(key).cloned().unwrap_or(Value::Nil)),
            [key, default] => Ok(self.get(key).cloned().unwrap_or_else(|| default.clone())),
            _ => Err(Error::Arity {
                callee: "map",
                accepted: "1 or 2",
                got: args.len(),
            }),
        }
    }
}

// =============================================================================
// Iterator Implementation
// =============================================================================

/// An iterator over entry references of a [`PersistentHashMap`].
pub struct Iter<'a> {
    entries: Vec<(&'a Value, &'a Value)>,
    position: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a Value, &'a Value);

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.entries.get(self.position).copied()?;
        self.position += 1;
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.entries.len().saturating_sub(self.position);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Iter<'_> {
    fn len(&self) -> usize {
        self.entries.len().saturating_sub(self.position)
    }
}

impl<'a> IntoIterator for &'a PersistentHashMap {
    type Item = (&'a Value, &'a Value);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl Default for PersistentHashMap {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<(Value, Value)> for PersistentHashMap {
    /// Bulk construction routes through a transient: one allocation pass.
    fn from_iter<I: IntoIterator<Item = (Value, Value)>>(iter: I) -> Self {
        let mut transient = TransientHashMap::new();
        for (key, value) in iter {
            transient.insert(key, value);
        }
        transient.persistent()
    }
}

impl PartialEq for PersistentHashMap {
    fn eq(&self, other: &Self) -> bool {
        equality::maps_equiv(self, other)
    }
}

impl Hash for PersistentHashMap {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(equality::hash_unordered(
            self.iter()
                .map(|(key, value)| equality::hash_entry(key, value)),
        ));
    }
}

impl fmt::Display for PersistentHashMap {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("{")?;
        for (position, (key, value)) in self.iter().enumerate() {
            if position > 0 {
                formatter.write_str(", ")?;
            }
            write!(formatter, "{key} {value}")?;
        }
        formatter.write_str("}")
    }
}

impl fmt::Debug for PersistentHashMap {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_map().entries(self.iter()).finish()
    }
}

// =============================================================================
// TransientHashMap
// =============================================================================

/// A single-owner, temporarily mutable view of a [`PersistentHashMap`].
///
/// Same ownership discipline as
/// [`TransientVector`](crate::vector::TransientVector): nodes stamped with
/// this transient's token may be edited in place, everything else is copied
/// before the first write, and [`TransientHashMap::persistent`] consumes
/// the handle.
pub struct TransientHashMap {
    count: usize,
    root: Option<ReferenceCounter<MapNode>>,
    nil_entry: Option<(Value, Value)>,
    meta: Option<ReferenceCounter<PersistentHashMap>>,
    edit: EditToken,
}

/// What a transient removal did to the subtree below a node.
enum Trim {
    /// Entry removed; the node keeps its shape.
    Removed,
    /// The subtree lost its last entry.
    Empty,
    /// The subtree collapsed to a single entry.
    Collapsed(Value, Value),
}

impl TransientHashMap {
    /// A transient over the empty map.
    #[must_use]
    pub fn new() -> Self {
        PersistentHashMap::new().transient()
    }

    /// Returns the number of entries.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Returns `true` if no entries are present.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Reads the value for `key`.
    #[must_use]
    pub fn get(&self, key: &Value) -> Option<&Value> {
        if key.is_nil() {
            return self.nil_entry.as_ref().map(|(_, value)| value);
        }
        let root = self.root.as_ref()?;
        find(root, 0, equality::hash_value(key), key).map(|(_, value)| value)
    }

    /// Associates `key` with `value` in place.
    pub fn insert(&mut self, key: Value, value: Value) {
        if key.is_nil() {
            if self.nil_entry.is_none() {
                self.count += 1;
            }
            self.nil_entry = Some((Value::Nil, value));
            return;
        }

        let hash = equality::hash_value(&key);
        let mut added = false;
        match &mut self.root {
            Some(root) => Self::assoc_mut(root, 0, hash, key, value, &self.edit, &mut added),
            None => {
                added = true;
                self.root = Some(ReferenceCounter::new(MapNode::single_entry(
                    0, hash, key, value,
                )));
            }
        }
        if added {
            self.count += 1;
        }
    }

    fn assoc_mut(
        node: &mut ReferenceCounter<MapNode>,
        shift: u32,
        hash: u64,
        key: Value,
        value: Value,
        edit: &EditToken,
        added: &mut bool,
    ) {
        // A collision node for a different hash is pushed one level down
        // behind a fresh bitmap wrapper before inserting.
        let wrap_chunk = match node.as_ref() {
            MapNode::Collision {
                hash: collision_hash,
                ..
            } if *collision_hash != hash => Some(chunk(*collision_hash, shift)),
            _ => None,
        };
        if let Some(collision_chunk) = wrap_chunk {
            let collision = node.clone();
            *node = ReferenceCounter::new(MapNode::Bitmap {
                edit: Some(edit.clone()),
                bitmap: 1 << collision_chunk,
                children: vec![MapChild::Node(collision)],
            });
        }

        let promoted = {
            let node_mut = editable_mut(node, edit);
            match node_mut {
                MapNode::Bitmap {
                    bitmap, children, ..
                } => {
                    let index = chunk(hash, shift);
                    let bit = 1u32 << index;
                    let position = (*bitmap & (bit - 1)).count_ones() as usize;

                    if *bitmap & bit == 0 {
                        *added = true;
                        if children.len() >= PROMOTE_THRESHOLD {
                            Some(promote_bitmap(*bitmap, children, shift, hash, key, value))
                        } else {
                            children.insert(position, MapChild::Entry(key, value));
                            *bitmap |= bit;
                            None
                        }
                    } else {
                        let split = match &mut children[position] {
                            MapChild::Entry(entry_key, entry_value) => {
                                if *entry_key == key {
                                    *entry_value = value;
                                    None
                                } else {
                                    *added = true;
                                    let entry_hash = equality::hash_value(entry_key);
                                    Some(merge_entries(
                                        shift + BITS,
                                        entry_hash,
                                        entry_key.clone(),
                                        entry_value.clone(),
                                        hash,
                                        key,
                                        value,
                                    ))
                                }
                            }
                            MapChild::Node(subnode) => {
                                Self::assoc_mut(
                                    subnode,
                                    shift + BITS,
                                    hash,
                                    key,
                                    value,
                                    edit,
                                    added,
                                );
                                None
                            }
                        };
                        if let Some(subnode) = split {
                            children[position] = MapChild::Node(ReferenceCounter::new(subnode));
                        }
                        None
                    }
                }

                MapNode::Array {
                    occupied, children, ..
                } => {
                    let index = chunk(hash, shift);
                    match &mut children[index] {
                        Some(child) => {
                            Self::assoc_mut(child, shift + BITS, hash, key, value, edit, added);
                        }
                        slot => {
                            *added = true;
                            *slot = Some(ReferenceCounter::new(MapNode::single_entry(
                                shift + BITS,
                                hash,
                                key,
                                value,
                            )));
                            *occupied += 1;
                        }
                    }
                    None
                }

                MapNode::Collision { entries, .. } => {
                    match entries.iter_mut().find(|(entry_key, _)| entry_key == &key) {
                        Some(entry) => entry.1 = value,
                        None => {
                            *added = true;
                            entries.push((key, value));
                        }
                    }
                    None
                }
            }
        };

        if let Some(mut promoted) = promoted {
            if let MapNode::Array { edit: tag, .. } = &mut promoted {
                *tag = Some(edit.clone());
            }
            *node = ReferenceCounter::new(promoted);
        }
    }

    /// Removes `key` in place. Removing an absent key is a no-op.
    pub fn remove(&mut self, key: &Value) {
        if key.is_nil() {
            if self.nil_entry.take().is_some() {
                self.count -= 1;
            }
            return;
        }
        // Presence is checked up front so the claim-on-descent below only
        // runs for removals that will happen.
        if self.get(key).is_none() {
            return;
        }

        let hash = equality::hash_value(key);
        let outcome = match &mut self.root {
            Some(root) => Self::without_mut(root, 0, hash, key, &self.edit),
            None => return,
        };
        self.count -= 1;
        match outcome {
            Trim::Removed => {}
            Trim::Empty => self.root = None,
            Trim::Collapsed(entry_key, entry_value) => {
                let entry_hash = equality::hash_value(&entry_key);
                self.root = Some(ReferenceCounter::new(MapNode::single_entry(
                    0,
                    entry_hash,
                    entry_key,
                    entry_value,
                )));
            }
        }
    }

    fn without_mut(
        node: &mut ReferenceCounter<MapNode>,
        shift: u32,
        hash: u64,
        key: &Value,
        edit: &EditToken,
    ) -> Trim {
        let mut pack_needed = false;
        let trim = {
            let node_mut = editable_mut(node, edit);
            match node_mut {
                MapNode::Bitmap {
                    bitmap, children, ..
                } => {
                    let bit = 1u32 << chunk(hash, shift);
                    if *bitmap & bit == 0 {
                        return Trim::Removed;
                    }
                    let position = (*bitmap & (bit - 1)).count_ones() as usize;

                    let child_gone = match &mut children[position] {
                        MapChild::Entry(entry_key, _) => {
                            if &*entry_key != key {
                                return Trim::Removed;
                            }
                            true
                        }
                        MapChild::Node(subnode) => {
                            match Self::without_mut(subnode, shift + BITS, hash, key, edit) {
                                Trim::Removed => false,
                                Trim::Empty => true,
                                Trim::Collapsed(entry_key, entry_value) => {
                                    if children.len() == 1 {
                                        return Trim::Collapsed(entry_key, entry_value);
                                    }
                                    children[position] = MapChild::Entry(entry_key, entry_value);
                                    false
                                }
                            }
                        }
                    };

                    if child_gone {
                        children.remove(position);
                        *bitmap &= !bit;
                        if children.is_empty() {
                            return Trim::Empty;
                        }
                        if children.len() == 1
                            && let MapChild::Entry(entry_key, entry_value) = &children[0]
                        {
                            return Trim::Collapsed(entry_key.clone(), entry_value.clone());
                        }
                    }
                    Trim::Removed
                }

                MapNode::Array {
                    occupied, children, ..
                } => {
                    let index = chunk(hash, shift);
                    let outcome = match &mut children[index] {
                        Some(child) => Self::without_mut(child, shift + BITS, hash, key, edit),
                        None => return Trim::Removed,
                    };
                    match outcome {
                        Trim::Removed => {}
                        Trim::Empty => {
                            children[index] = None;
                            *occupied -= 1;
                            if *occupied == 0 {
                                return Trim::Empty;
                            }
                            pack_needed = *occupied <= PACK_THRESHOLD;
                        }
                        Trim::Collapsed(entry_key, entry_value) => {
                            let entry_hash = equality::hash_value(&entry_key);
                            children[index] = Some(ReferenceCounter::new(MapNode::single_entry(
                                shift + BITS,
                                entry_hash,
                                entry_key,
                                entry_value,
                            )));
                        }
                    }
                    Trim::Removed
                }

                MapNode::Collision { entries, .. } => {
                    let Some(position) =
                        entries.iter().position(|(entry_key, _)| entry_key == key)
                    else {
                        return Trim::Removed;
                    };
                    entries.remove(position);
                    match entries.len() {
                        0 => return Trim::Empty,
                        1 => {
                            let (entry_key, entry_value) = entries[0].clone();
                            return Trim::Collapsed(entry_key, entry_value);
                        }
                        _ => Trim::Removed,
                    }
                }
            }
        };

        if pack_needed
            && let MapNode::Array { children, .. } = node.as_ref()
        {
            let mut packed = pack_array(children, FANOUT);
            if let MapNode::Bitmap { edit: tag, .. } = &mut packed {
                *tag = Some(edit.clone());
            }
            *node = ReferenceCounter::new(packed);
        }
        trim
    }

    /// Freezes this transient into a persistent map, consuming the handle.
    #[must_use]
    pub fn persistent(self) -> PersistentHashMap {
        PersistentHashMap {
            count: self.count,
            root: self.root,
            nil_entry: self.nil_entry,
            meta: self.meta,
        }
    }
}

impl Default for TransientHashMap {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
