//! Open-addressing hash map with intra-array collision chains.
//!
//! Slots live in one flat arena. A slot's `next` field is the arena index
//! of the following node in its collision chain, or [`LAST_NODE`]. Every
//! occupied main position holds a node whose own main position it is
//! (colliding squatters are moved out on insert), so a lookup only walks
//! the chain starting at `hash % size`.
//!
//! Consumers rebuild the same topology from the raw `next` integers, so
//! [`Map::compact`] must run before a table is dumped.

use core::{fmt, mem};

#[cfg(not(feature = "std"))]
use alloc::{rc::Rc, vec, vec::Vec};
#[cfg(feature = "std")]
use std::{rc::Rc, vec, vec::Vec};

use crate::value::Value;

/// End-of-chain marker stored in `next` (24-bit field).
pub const LAST_NODE: u32 = 0xFF_FFFF;

/// One slot of the arena.
#[derive(Debug, Clone)]
pub struct MapNode {
    /// Key; `Nil` marks an unused slot.
    pub key: Value,
    /// Index of the next node in the chain, or [`LAST_NODE`].
    pub next: u32,
    /// Associated value.
    pub value: Value,
}

impl MapNode {
    fn empty() -> Self { Self { key: Value::Nil, next: LAST_NODE, value: Value::Nil } }

    /// True if the slot holds a key.
    pub fn is_used(&self) -> bool { !self.key.is_nil() }

    /// Next chain index, if any.
    pub fn next_index(&self) -> Option<usize> {
        (self.next != LAST_NODE).then_some(self.next as usize)
    }
}

/// Errors raised by map mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    /// `nil` cannot be used as a key.
    NilKey,
    /// NaN never compares equal and cannot be found again.
    NanKey,
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapError::NilKey => write!(f, "map key cannot be nil"),
            MapError::NanKey => write!(f, "map key cannot be NaN"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for MapError {}

/// Hash map stored as a slot arena.
#[derive(Debug, Clone, Default)]
pub struct Map {
    slots: Vec<MapNode>,
    count: usize,
    // free-slot search walks down from here (exclusive)
    lastfree: usize,
    compact: bool,
}

impl Map {
    /// Empty map (no slots allocated).
    pub fn new() -> Self { Self::default() }

    /// Builds a map from key/value pairs, in order.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, MapError>
    where
        I: IntoIterator<Item = (Value, Value)>,
    {
        let mut map = Self::new();
        for (k, v) in pairs {
            map.insert(k, v)?;
        }
        Ok(map)
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize { self.count }

    /// True if no slot is occupied.
    pub fn is_empty(&self) -> bool { self.count == 0 }

    /// Size of the backing arena.
    pub fn size(&self) -> usize { self.slots.len() }

    /// Raw arena, including unused slots.
    pub fn slots(&self) -> &[MapNode] { &self.slots }

    /// True if the arena has been packed by [`Map::compact`] and not modified since.
    pub fn is_compact(&self) -> bool { self.compact }

    /// Occupied slots in arena order, with their index.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &MapNode)> + '_ {
        self.slots.iter().enumerate().filter(|(_, n)| n.is_used())
    }

    /// Looks a key up.
    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.find(key, hashcode(key)).map(|i| &self.slots[i].value)
    }

    /// Inserts or replaces; returns the previous value if the key existed.
    pub fn insert(&mut self, key: Value, value: Value) -> Result<Option<Value>, MapError> {
        match &key {
            Value::Nil => return Err(MapError::NilKey),
            Value::Real(r) if r.is_nan() => return Err(MapError::NanKey),
            _ => {}
        }
        let hash = hashcode(&key);
        if let Some(i) = self.find(&key, hash) {
            return Ok(Some(mem::replace(&mut self.slots[i].value, value)));
        }
        if self.count >= self.slots.len() {
            self.resize(next_size(self.slots.len()));
        }
        let i = self.insert_node(key, hash);
        self.slots[i].value = value;
        self.count += 1;
        self.compact = false;
        Ok(None)
    }

    /// Removes a key; returns its value if it was present.
    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        if self.slots.is_empty() {
            return None;
        }
        let mut slot = self.main_position(hashcode(key));
        let mut prev = None;
        loop {
            let node = &self.slots[slot];
            if !node.is_used() {
                return None;
            }
            if keys_equal(&node.key, key) {
                break;
            }
            prev = Some(slot);
            slot = node.next_index()?;
        }

        let (removed, freed) = match (prev, self.slots[slot].next_index()) {
            // head of its chain: pull the successor into the main position
            (None, Some(next)) => {
                let moved = mem::replace(&mut self.slots[next], MapNode::empty());
                (mem::replace(&mut self.slots[slot], moved), next)
            }
            (None, None) => (mem::replace(&mut self.slots[slot], MapNode::empty()), slot),
            (Some(p), _) => {
                self.slots[p].next = self.slots[slot].next;
                (mem::replace(&mut self.slots[slot], MapNode::empty()), slot)
            }
        };
        if self.lastfree <= freed {
            self.lastfree = freed + 1;
        }
        self.count -= 1;
        self.compact = false;
        Some(removed.value)
    }

    /// Rehashes into an arena of exactly `max(len, 1)` slots.
    ///
    /// Occupied slots are re-inserted in the old arena order; insertion order
    /// is not preserved. Runs at most once until the map is modified again.
    pub fn compact(&mut self) {
        if self.compact {
            return;
        }
        self.resize(self.count.max(1));
        self.compact = true;
    }

    fn main_position(&self, hash: u32) -> usize { hash as usize % self.slots.len() }

    fn find(&self, key: &Value, hash: u32) -> Option<usize> {
        if self.slots.is_empty() {
            return None;
        }
        let mut i = self.main_position(hash);
        loop {
            let node = &self.slots[i];
            if !node.is_used() {
                return None;
            }
            if keys_equal(&node.key, key) {
                return Some(i);
            }
            i = node.next_index()?;
        }
    }

    fn next_free(&mut self) -> Option<usize> {
        while self.lastfree > 0 {
            let i = self.lastfree - 1;
            if !self.slots[i].is_used() {
                return Some(i);
            }
            self.lastfree -= 1;
        }
        None
    }

    // Places a new key (value left nil) and returns its slot. Does not touch `count`.
    fn insert_node(&mut self, key: Value, hash: u32) -> usize {
        let main = self.main_position(hash);
        if !self.slots[main].is_used() {
            self.slots[main] = MapNode { key, next: LAST_NODE, value: Value::Nil };
            return main;
        }
        let Some(free) = self.next_free() else {
            self.resize(next_size(self.slots.len()));
            return self.insert_node(key, hash);
        };
        let squatter_main = self.main_position(hashcode(&self.slots[main].key));
        if squatter_main == main {
            // colliding node owns the slot: chain the new key right after it
            self.slots[free] = MapNode { key, next: self.slots[main].next, value: Value::Nil };
            self.slots[main].next = free as u32;
            free
        } else {
            // colliding node belongs to another chain: move it out
            let mut prev = squatter_main;
            while self.slots[prev].next as usize != main {
                prev = self.slots[prev].next as usize;
            }
            self.slots[prev].next = free as u32;
            self.slots[free] =
                mem::replace(&mut self.slots[main], MapNode { key, next: LAST_NODE, value: Value::Nil });
            main
        }
    }

    fn resize(&mut self, size: usize) {
        let old = mem::replace(&mut self.slots, vec![MapNode::empty(); size]);
        self.lastfree = size;
        for node in old.into_iter().filter(MapNode::is_used) {
            let hash = hashcode(&node.key);
            let i = self.insert_node(node.key, hash);
            self.slots[i].value = node.value;
        }
    }
}

fn next_size(size: usize) -> usize { (size * 2).max(2) }

/* ─────────────────────────── Hashing ─────────────────────────── */

/// FNV-1a (32 bits), the runtime's string hash.
pub fn str_hash(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 2_166_136_261;
    for &b in bytes {
        hash = (hash ^ u32::from(b)).wrapping_mul(16_777_619);
    }
    hash
}

fn fold64(v: u64) -> u32 { (v ^ (v >> 32)) as u32 }

fn hash_ptr<T>(p: *const T) -> u32 { ((p as usize) >> 2) as u32 }

/// Hash code of a key, as used to pick its main position.
pub fn hashcode(key: &Value) -> u32 {
    match key {
        Value::Nil | Value::ComPtr | Value::NtvFunc { .. } => 0,
        Value::Bool(b) => u32::from(*b),
        Value::Int(i) | Value::Index(i) => fold64(*i as u64),
        // -0.0 and 0.0 are the same key
        Value::Real(r) if r.as_f64() == 0.0 => 0,
        Value::Real(r) => fold64(r.to_bits()),
        Value::Str(s) => str_hash(s.as_bytes()),
        Value::Closure { closure, .. } => hash_ptr(Rc::as_ptr(closure)),
        Value::Class(c) => hash_ptr(Rc::as_ptr(c)),
        Value::Instance(i) => hash_ptr(Rc::as_ptr(i)),
        Value::Map(m) => hash_ptr(Rc::as_ptr(m)),
        Value::List(l) => hash_ptr(Rc::as_ptr(l)),
        Value::Module(m) => hash_ptr(Rc::as_ptr(m)),
    }
}

fn keys_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) | (Value::Index(x), Value::Index(y)) => x == y,
        (Value::Real(x), Value::Real(y)) => x.as_f64() == y.as_f64(),
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Closure { closure: x, .. }, Value::Closure { closure: y, .. }) => Rc::ptr_eq(x, y),
        (Value::Class(x), Value::Class(y)) => Rc::ptr_eq(x, y),
        (Value::Instance(x), Value::Instance(y)) => Rc::ptr_eq(x, y),
        (Value::Map(x), Value::Map(y)) => Rc::ptr_eq(x, y),
        (Value::List(x), Value::List(y)) => Rc::ptr_eq(x, y),
        (Value::Module(x), Value::Module(y)) => Rc::ptr_eq(x, y),
        (Value::ComPtr, Value::ComPtr) | (Value::NtvFunc { .. }, Value::NtvFunc { .. }) => true,
        _ => false,
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */
