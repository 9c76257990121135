//! Fixed-width bitset over component IDs.
//!
//! A [`Mask`] identifies an archetype: bit `i` is set iff the archetype has a
//! column for [`ComponentId`] `i`. The width is [`MAX_COMPONENTS`] (64), so
//! the whole set fits in one machine word and subset tests are a single
//! AND-compare.

use std::fmt;

use crate::component::{ComponentId, MAX_COMPONENTS};

/// Bitset of component IDs. Equality is bitwise.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Mask(u64);

const _: () = assert!(MAX_COMPONENTS <= u64::BITS as usize);

impl Mask {
    /// The empty set.
    pub const EMPTY: Mask = Mask(0);

    /// A mask with exactly one bit set.
    #[inline]
    pub fn single(id: ComponentId) -> Mask {
        Mask(1 << id.0)
    }

    /// Whether `id`'s bit is set.
    #[inline]
    pub fn contains(self, id: ComponentId) -> bool {
        self.0 & (1 << id.0) != 0
    }

    /// Set `id`'s bit in place.
    #[inline]
    pub fn insert(&mut self, id: ComponentId) {
        self.0 |= 1 << id.0;
    }

    /// This mask with `id`'s bit set.
    #[inline]
    pub fn with(self, id: ComponentId) -> Mask {
        Mask(self.0 | (1 << id.0))
    }

    /// This mask with `id`'s bit cleared.
    #[inline]
    pub fn without(self, id: ComponentId) -> Mask {
        Mask(self.0 & !(1 << id.0))
    }

    /// Superset test: every bit of `other` is set in `self`.
    #[inline]
    pub fn contains_all(self, other: Mask) -> bool {
        self.0 & other.0 == other.0
    }

    /// Bits set in both masks.
    #[inline]
    pub fn intersection(self, other: Mask) -> Mask {
        Mask(self.0 & other.0)
    }

    /// Whether no bit is set.
    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of set bits.
    #[inline]
    pub fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Iterate the set IDs in ascending order.
    #[inline]
    pub fn iter(self) -> MaskIter {
        MaskIter(self.0)
    }
}

/// Iterator over the set bits of a [`Mask`], ascending.
pub struct MaskIter(u64);

impl Iterator for MaskIter {
    type Item = ComponentId;

    #[inline]
    fn next(&mut self) -> Option<ComponentId> {
        if self.0 == 0 {
            return None;
        }
        let id = self.0.trailing_zeros() as u8;
        self.0 &= self.0 - 1; // clear lowest set bit
        Some(ComponentId(id))
    }
}

impl fmt::Debug for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mask{{")?;
        let mut first = true;
        for id in self.iter() {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}", id.0)?;
            first = false;
        }
        write!(f, "}}")
    }
}
