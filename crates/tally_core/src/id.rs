//! # Identifiers
//!
//! Handles are plain 64-bit values consisting of:
//! - An index into sparse pages (lower 32 bits)
//! - A generation counter for safe reuse (upper 32 bits)
//!
//! Pairs reuse the same 64 bits: bit 63 marks the id as a pair, the
//! relationship index occupies bits 32..63 and the target index the lower
//! 32 bits. Pairs never enter a sparse set.

use bytemuck::{Pod, Zeroable};

/// Bit that marks an id as a `(relationship, target)` pair.
const PAIR_FLAG: u64 = 1 << 63;

/// Mask of the relationship index inside a pair.
const PAIR_FIRST_MASK: u64 = 0x7FFF_FFFF;

/// Unique, recyclable identifier.
///
/// The ID is split into two parts:
/// - Lower 32 bits: Index into the sparse pages
/// - Upper 32 bits: Generation counter for detecting stale references
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Pod, Zeroable)]
#[repr(transparent)]
pub struct Id(u64);

impl Id {
    /// Matches any relationship or target when used inside a pair.
    pub const WILDCARD: Self = Self(u32::MAX as u64);

    /// Creates a new id from index and generation.
    ///
    /// # Arguments
    ///
    /// * `index` - The sparse index (1 to 2^32-1, 0 is reserved)
    /// * `generation` - The generation counter (0 to 2^32-1)
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Wraps a raw 64-bit value.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw 64-bit value.
    #[inline]
    #[must_use]
    pub const fn to_raw(self) -> u64 {
        self.0
    }

    /// Returns the index portion of the id.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Returns the generation portion of the id.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Returns the same index with a different generation.
    #[inline]
    #[must_use]
    pub const fn with_generation(self, generation: u32) -> Self {
        Self::new(self.index(), generation)
    }

    /// Returns the id with its generation cleared.
    #[inline]
    #[must_use]
    pub const fn strip_generation(self) -> Self {
        Self(self.0 & 0xFFFF_FFFF)
    }

    /// Returns the id of the next generation for the same index.
    #[inline]
    #[must_use]
    pub const fn next_generation(self) -> Self {
        self.with_generation(self.generation().wrapping_add(1))
    }

    /// Builds a `(relationship, target)` pair id.
    ///
    /// Only the indices of both ids are kept.
    #[inline]
    #[must_use]
    pub const fn pair(relationship: Self, target: Self) -> Self {
        Self(
            PAIR_FLAG
                | (((relationship.index() as u64) & PAIR_FIRST_MASK) << 32)
                | target.index() as u64,
        )
    }

    /// Checks if this id is a pair.
    #[inline]
    #[must_use]
    pub const fn is_pair(self) -> bool {
        self.0 & PAIR_FLAG != 0
    }

    /// Relationship index of a pair, as an id with generation 0.
    #[inline]
    #[must_use]
    pub const fn first(self) -> Self {
        let index = (self.0 >> 32) & PAIR_FIRST_MASK;
        if index == PAIR_FIRST_MASK {
            Self::WILDCARD
        } else {
            Self(index)
        }
    }

    /// Target index of a pair, as an id with generation 0.
    #[inline]
    #[must_use]
    pub const fn second(self) -> Self {
        Self(self.0 & 0xFFFF_FFFF)
    }

    /// Checks if this id is the wildcard or a pair containing one.
    #[inline]
    #[must_use]
    pub const fn is_wildcard(self) -> bool {
        if self.is_pair() {
            self.first().0 == Self::WILDCARD.0 || self.second().0 == Self::WILDCARD.0
        } else {
            self.0 == Self::WILDCARD.0
        }
    }

    /// Checks if this (concrete) id is matched by `pattern`.
    ///
    /// Plain ids match themselves. Pair patterns may use [`Id::WILDCARD`] on
    /// either side.
    #[must_use]
    pub fn matches(self, pattern: Self) -> bool {
        if self == pattern {
            return true;
        }
        if !pattern.is_pair() {
            return pattern == Self::WILDCARD;
        }
        if !self.is_pair() {
            return false;
        }
        let first_ok = pattern.first() == Self::WILDCARD || pattern.first() == self.first();
        let second_ok = pattern.second() == Self::WILDCARD || pattern.second() == self.second();
        first_ok && second_ok
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_pair() {
            write!(f, "({}, {})", self.first().index(), self.second().index())
        } else {
            write!(f, "#{}v{}", self.index(), self.generation())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_roundtrip() {
        let id = Id::new(12345, 67890);
        assert_eq!(id.index(), 12345);
        assert_eq!(id.generation(), 67890);
        assert_eq!(id.strip_generation(), Id::new(12345, 0));
    }

    #[test]
    fn test_next_generation_wraps() {
        let id = Id::new(7, u32::MAX);
        assert_eq!(id.next_generation(), Id::new(7, 0));
        assert_eq!(Id::new(7, 3).next_generation().generation(), 4);
    }

    #[test]
    fn test_pair_encoding() {
        let rel = Id::new(10, 2);
        let tgt = Id::new(42, 9);
        let pair = Id::pair(rel, tgt);
        assert!(pair.is_pair());
        assert_eq!(pair.first(), Id::new(10, 0));
        assert_eq!(pair.second(), Id::new(42, 0));
        assert!(!rel.is_pair());
    }

    #[test]
    fn test_wildcard_matching() {
        let rel = Id::new(10, 0);
        let a = Id::pair(rel, Id::new(1, 0));
        let b = Id::pair(Id::new(11, 0), Id::new(1, 0));
        let any_target = Id::pair(rel, Id::WILDCARD);
        assert!(any_target.is_wildcard());
        assert!(a.matches(any_target));
        assert!(!b.matches(any_target));
        assert!(b.matches(Id::pair(Id::WILDCARD, Id::new(1, 0))));
        assert!(!Id::new(5, 0).matches(any_target));
    }
}
