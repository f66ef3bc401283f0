//! # Sparse Set Identity Index
//!
//! Allocates, recycles and validates generational ids, and keeps an optional
//! payload per id at a stable location.
//!
//! ## Design Philosophy
//!
//! - Ids are indices with generation counters, never pointers
//! - Sparse pages are allocated lazily, one per `PAGE_SIZE` indices
//! - The dense array is partitioned into alive and recycled ids
//! - Index 0 and dense slot 0 are permanent sentinels

mod page;
mod set;

pub use page::{page_index, page_offset, SlotState, PAGE_BITS, PAGE_SIZE};
pub use set::SparseSet;
