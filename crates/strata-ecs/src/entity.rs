//! Entity handles and the entry table.
//!
//! An [`EntityId`] is a 64-bit handle packing a *generation* counter in the
//! high 32 bits and a *slot* index in the low 32 bits. The slot indexes the
//! [`Entries`] table, which indirects to the entity's current
//! `(archetype, row)` location and survives swap-remove compaction.
//!
//! Freed slots are recycled through a free list threaded through the entries
//! themselves: a free entry's `row` field stores the index of the next free
//! entry, and the tail of the chain stores its own index (a self-loop). The
//! generation of a slot is bumped (wrapping) when the slot is freed, so every
//! outstanding handle to it goes stale immediately; reuse does not bump
//! again. After 2^32 recycles of one slot a stale handle would collide with a
//! live one; that is accepted as vanishingly rare.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// A generational entity handle.
///
/// Layout: `[generation: u32 | slot: u32]`. Callers treat it as an opaque
/// token; equality and copying are the only meaningful operations.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Construct from a slot index and generation.
    #[inline]
    pub(crate) fn new(slot: u32, generation: u32) -> Self {
        Self((generation as u64) << 32 | slot as u64)
    }

    /// The slot portion (low 32 bits).
    #[inline]
    pub fn slot(self) -> u32 {
        self.0 as u32
    }

    /// The generation portion (high 32 bits).
    #[inline]
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Raw `u64` representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Reconstruct from a raw `u64`.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({}v{})", self.slot(), self.generation())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.slot(), self.generation())
    }
}

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

/// One record of the entry table.
///
/// While the slot is live, `(archetype, row)` locate the entity and
/// `generation` matches every valid handle to it. While the slot is free,
/// `archetype` is meaningless and `row` is the free-list link.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Entry {
    pub archetype: u32,
    pub row: u32,
    pub generation: u32,
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// Grow-only entry table with an embedded free list.
#[derive(Debug, Default)]
pub(crate) struct Entries {
    entries: Vec<Entry>,
    /// Most recently freed slot, head of the free chain.
    free_head: Option<u32>,
    /// Number of live slots.
    live: u32,
}

impl Entries {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            free_head: None,
            live: 0,
        }
    }

    /// Pop a slot from the free list, or push a fresh entry (generation 0).
    ///
    /// The returned slot keeps whatever generation it carried; `delete`
    /// already bumped it when the slot was freed. The caller must follow up
    /// with [`set_location`](Self::set_location).
    pub fn alloc(&mut self) -> u32 {
        self.live += 1;
        match self.free_head {
            Some(head) => {
                let next = self.entries[head as usize].row;
                // A self-loop marks the tail of the chain.
                self.free_head = if next == head { None } else { Some(next) };
                head
            }
            None => {
                let slot = self.entries.len() as u32;
                self.entries.push(Entry {
                    archetype: 0,
                    row: 0,
                    generation: 0,
                });
                slot
            }
        }
    }

    /// Free a live slot: bump its generation (wrapping) and link it at the
    /// head of the free list.
    pub fn free(&mut self, slot: u32) {
        let entry = &mut self.entries[slot as usize];
        entry.generation = entry.generation.wrapping_add(1);
        entry.row = self.free_head.unwrap_or(slot);
        self.free_head = Some(slot);
        self.live -= 1;
    }

    /// Whether `id` refers to a currently live entity.
    #[inline]
    pub fn is_live(&self, id: EntityId) -> bool {
        match self.entries.get(id.slot() as usize) {
            Some(entry) => entry.generation == id.generation(),
            None => false,
        }
    }

    #[inline]
    pub fn get(&self, slot: u32) -> Entry {
        self.entries[slot as usize]
    }

    /// Point a slot at a new `(archetype, row)` location, keeping its
    /// generation.
    #[inline]
    pub fn set_location(&mut self, slot: u32, archetype: u32, row: u32) {
        let entry = &mut self.entries[slot as usize];
        entry.archetype = archetype;
        entry.row = row;
    }

    /// Patch only the row of a slot (after a swap-remove moved it).
    #[inline]
    pub fn set_row(&mut self, slot: u32, row: u32) {
        self.entries[slot as usize].row = row;
    }

    #[inline]
    pub fn generation(&self, slot: u32) -> u32 {
        self.entries[slot as usize].generation
    }

    /// Number of live slots.
    #[inline]
    pub fn live_count(&self) -> u32 {
        self.live
    }

    /// Total number of slots ever allocated (live + free).
    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_roundtrip() {
        let id = EntityId::new(42, 7);
        assert_eq!(id.slot(), 42);
        assert_eq!(id.generation(), 7);
        assert_eq!(EntityId::from_raw(id.to_raw()), id);
    }

    #[test]
    fn fresh_slots_start_at_generation_zero() {
        let mut entries = Entries::new();
        let s0 = entries.alloc();
        let s1 = entries.alloc();
        assert_eq!(s0, 0);
        assert_eq!(s1, 1);
        assert_eq!(entries.generation(s0), 0);
        assert_eq!(entries.live_count(), 2);
    }

    #[test]
    fn free_bumps_generation_and_reuse_does_not() {
        let mut entries = Entries::new();
        let s = entries.alloc();
        assert_eq!(entries.generation(s), 0);
        entries.free(s);
        assert_eq!(entries.generation(s), 1);
        let reused = entries.alloc();
        assert_eq!(reused, s);
        assert_eq!(entries.generation(reused), 1);
    }

    #[test]
    fn free_list_is_lifo_with_self_loop_tail() {
        let mut entries = Entries::new();
        let a = entries.alloc();
        let b = entries.alloc();
        let c = entries.alloc();

        entries.free(a); // tail: a.row == a (self-loop)
        assert_eq!(entries.get(a).row, a);
        entries.free(b); // b.row -> a
        entries.free(c); // c.row -> b
        assert_eq!(entries.get(c).row, b);

        assert_eq!(entries.alloc(), c);
        assert_eq!(entries.alloc(), b);
        assert_eq!(entries.alloc(), a);
        // Chain drained: the next alloc pushes a fresh entry.
        assert_eq!(entries.alloc(), 3);
        assert_eq!(entries.capacity(), 4);
    }

    #[test]
    fn stale_handle_detected() {
        let mut entries = Entries::new();
        let s = entries.alloc();
        let id = EntityId::new(s, entries.generation(s));
        assert!(entries.is_live(id));
        entries.free(s);
        assert!(!entries.is_live(id));
        let _ = entries.alloc(); // recycles the slot
        assert!(!entries.is_live(id), "stale handle still dead after reuse");
    }

    #[test]
    fn generation_wraps() {
        let mut entries = Entries::new();
        let s = entries.alloc();
        entries.entries[s as usize].generation = u32::MAX;
        entries.free(s);
        assert_eq!(entries.generation(s), 0);
    }

    #[test]
    fn out_of_range_slot_is_dead() {
        let entries = Entries::new();
        assert!(!entries.is_live(EntityId::new(99, 0)));
    }
}
