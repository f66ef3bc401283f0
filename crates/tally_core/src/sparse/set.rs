//! # Sparse Set
//!
//! Generational identity index with colocated payloads.
//!
//! ```text
//! dense:  [ 0 | A  B  C | D' E' ]      count = 4
//!           ^   alive     free (recycled, generation already bumped)
//!
//! pages:  [page 0] -> sparse[offset] = Occupied(dense slot)
//!                     data[offset]   = payload
//! ```
//!
//! Removing an alive id swaps it with the last alive dense slot and moves the
//! boundary down. Allocating reuses the slot right at the boundary, so ids
//! are recycled in LIFO order before `max_id` advances.

use super::page::{page_index, page_offset, Page, SlotState, PAGE_SIZE};
use crate::config::SparseConfig;
use crate::id::Id;

/// Paged sparse set mapping generational ids to payloads of type `T`.
///
/// Use `SparseSet<()>` for a pure id allocator.
///
/// # Example
///
/// ```rust
/// use tally_core::SparseSet;
///
/// let mut ids: SparseSet<()> = SparseSet::new();
/// let a = ids.new_id();
/// ids.remove(a);
/// let b = ids.new_id();
/// assert_eq!(a.index(), b.index());
/// assert!(!ids.is_alive(a));
/// assert!(ids.is_alive(b));
/// ```
#[derive(Clone)]
pub struct SparseSet<T> {
    /// Lazily allocated pages, indexed by `index >> PAGE_BITS`.
    pages: Vec<Option<Box<Page<T>>>>,
    /// Dense ids. Slot 0 is a permanent sentinel.
    dense: Vec<Id>,
    /// Alive boundary, including the sentinel slot.
    count: usize,
    /// Highest index handed out so far.
    max_id: u32,
}

impl<T: Default> Default for SparseSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for SparseSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparseSet")
            .field("count", &self.count())
            .field("size", &self.size())
            .field("max_id", &self.max_id)
            .field("pages", &self.pages.iter().filter(|p| p.is_some()).count())
            .finish()
    }
}

impl<T: Default> SparseSet<T> {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty set with room for `capacity` dense ids.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let mut dense = Vec::with_capacity(capacity + 1);
        dense.push(Id::default());
        Self {
            pages: Vec::new(),
            dense,
            count: 1,
            max_id: 0,
        }
    }

    /// Creates an empty set sized from configuration.
    #[must_use]
    pub fn from_config(config: &SparseConfig) -> Self {
        Self::with_capacity(config.dense_capacity)
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Returns a new alive id.
    ///
    /// Recycles the first free dense slot if there is one, otherwise mints
    /// `max_id + 1`. O(1) amortized.
    pub fn new_id(&mut self) -> Id {
        if self.count < self.dense.len() {
            let id = self.dense[self.count];
            self.count += 1;
            return id;
        }

        debug_assert!(self.max_id < u32::MAX, "sparse set ran out of indices");
        self.max_id += 1;
        let id = Id::new(self.max_id, 0);
        let slot = self.dense.len();
        debug_assert_eq!(slot, self.count);
        debug_assert!(
            self.slot_of(id.index()).is_none(),
            "minted index already paired"
        );
        self.dense.push(id);
        self.assign(id, slot);
        self.count += 1;
        id
    }

    /// Returns `n` new alive ids.
    ///
    /// The returned slice is a view of the dense array and stays valid until
    /// the set is next modified.
    pub fn new_ids(&mut self, n: usize) -> &[Id] {
        let start = self.count;
        let recyclable = self.dense.len() - self.count;
        self.dense.reserve(n.saturating_sub(recyclable));
        for _ in 0..n {
            self.new_id();
        }
        &self.dense[start..start + n]
    }

    /// Allocates a new id and returns it with its (default) payload.
    pub fn add(&mut self) -> (Id, &mut T) {
        let id = self.new_id();
        let value = self.payload_mut(id.index());
        (id, value)
    }

    /// Gets or creates the payload for an explicit id.
    ///
    /// The generation is stripped for the lookup. A dead slot is swapped to
    /// the alive boundary and reactivated; a non-zero supplied generation
    /// replaces the stored one, a stripped id keeps it. An index that was
    /// never paired is registered, raising `max_id` when needed.
    ///
    /// Returns the payload and whether the id was not alive before the call.
    pub fn ensure(&mut self, id: Id) -> (&mut T, bool) {
        let index = id.index();
        debug_assert!(index != 0, "index 0 is reserved");
        let generation = id.generation();

        let is_new = match self.slot_of(index) {
            Some(slot) if slot < self.count => {
                debug_assert!(
                    generation == 0 || self.dense[slot] == id,
                    "ensure called with stale generation for {id}"
                );
                false
            }
            Some(slot) => {
                let boundary = self.count;
                if slot != boundary {
                    self.swap_dense(slot, boundary);
                }
                self.count += 1;
                if generation != 0 {
                    self.dense[boundary] = id;
                }
                true
            }
            None => {
                self.dense.push(Id::default());
                let last = self.dense.len() - 1;
                let boundary = self.count;
                self.count += 1;

                if index > self.max_id {
                    self.max_id = index;
                }

                if boundary < last {
                    // Move the recycled id sitting at the boundary to the end.
                    let unused = self.dense[boundary];
                    self.assign(unused, last);
                }
                self.assign(id, boundary);
                true
            }
        };

        (self.payload_mut(index), is_new)
    }

    /// Like [`SparseSet::ensure`], without any generation bookkeeping.
    ///
    /// For callers that track liveness themselves. The id is stored exactly
    /// as given.
    pub fn ensure_fast(&mut self, id: Id) -> &mut T {
        let index = id.index();
        debug_assert!(index != 0, "index 0 is reserved");

        match self.slot_of(index) {
            Some(slot) if slot < self.count => {}
            Some(slot) => {
                let boundary = self.count;
                if slot != boundary {
                    self.swap_dense(slot, boundary);
                }
                self.count += 1;
            }
            None => {
                let boundary = self.count;
                self.count += 1;
                if boundary == self.dense.len() {
                    self.dense.push(id);
                } else {
                    let unused = self.dense[boundary];
                    self.dense.push(unused);
                    let last = self.dense.len() - 1;
                    self.assign(unused, last);
                }
                if index > self.max_id {
                    self.max_id = index;
                }
                self.assign(id, boundary);
            }
        }

        self.payload_mut(index)
    }

    // =========================================================================
    // Removal
    // =========================================================================

    /// Removes an alive id, returning its payload.
    ///
    /// The slot moves past the alive boundary, its generation is bumped and
    /// its payload is reset to the default value. Removing an id whose
    /// generation does not match, or that is already dead, does nothing.
    pub fn remove(&mut self, id: Id) -> Option<T> {
        let slot = self.alive_slot(id)?;
        self.dense[slot] = id.next_generation();
        self.release_slot(slot);
        Some(std::mem::take(self.payload_mut(id.index())))
    }

    /// Removes an alive index without touching its generation.
    pub fn remove_fast(&mut self, id: Id) -> Option<T> {
        let slot = self.slot_of(id.index())?;
        if slot >= self.count {
            return None;
        }
        self.release_slot(slot);
        Some(std::mem::take(self.payload_mut(id.index())))
    }

    /// Removes every id and frees all pages.
    ///
    /// Indices start over at 1 afterwards.
    pub fn clear(&mut self) {
        self.pages.clear();
        self.dense.truncate(1);
        self.count = 1;
        self.max_id = 0;
    }

    /// Clears the set and returns its memory to the allocator.
    pub fn release(&mut self) {
        self.clear();
        self.pages.shrink_to_fit();
        self.dense.shrink_to_fit();
    }

    /// Overwrites the stored generation of a paired index.
    ///
    /// Does nothing for an index that was never paired.
    pub fn set_generation(&mut self, id: Id) {
        if let Some(slot) = self.slot_of(id.index()) {
            self.dense[slot] = id;
        }
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Returns the payload of an alive id.
    ///
    /// Passing a stale handle (index alive with another generation) is a
    /// programmer error and asserts in debug builds.
    #[must_use]
    pub fn get(&self, id: Id) -> Option<&T> {
        debug_assert!(!self.is_stale(id), "stale handle {id}");
        self.try_get(id)
    }

    /// Mutable variant of [`SparseSet::get`].
    #[must_use]
    pub fn get_mut(&mut self, id: Id) -> Option<&mut T> {
        debug_assert!(!self.is_stale(id), "stale handle {id}");
        self.try_get_mut(id)
    }

    /// Returns the payload of an alive id, or `None`.
    #[must_use]
    pub fn try_get(&self, id: Id) -> Option<&T> {
        self.alive_slot(id)?;
        self.payload(id.index())
    }

    /// Mutable variant of [`SparseSet::try_get`].
    #[must_use]
    pub fn try_get_mut(&mut self, id: Id) -> Option<&mut T> {
        self.alive_slot(id)?;
        Some(self.payload_mut(id.index()))
    }

    /// Returns the payload of an alive index, ignoring the generation.
    #[must_use]
    pub fn get_any(&self, id: Id) -> Option<&T> {
        let slot = self.slot_of(id.index())?;
        if slot >= self.count {
            return None;
        }
        self.payload(id.index())
    }

    /// Mutable variant of [`SparseSet::get_any`].
    #[must_use]
    pub fn get_any_mut(&mut self, id: Id) -> Option<&mut T> {
        let slot = self.slot_of(id.index())?;
        if slot >= self.count {
            return None;
        }
        Some(self.payload_mut(id.index()))
    }

    /// Returns the payload at a position of the alive range `0..count()`.
    #[must_use]
    pub fn get_dense(&self, position: usize) -> Option<&T> {
        let id = self.dense_id(position)?;
        self.payload(id.index())
    }

    /// Mutable variant of [`SparseSet::get_dense`].
    #[must_use]
    pub fn get_dense_mut(&mut self, position: usize) -> Option<&mut T> {
        let id = self.dense_id(position)?;
        Some(self.payload_mut(id.index()))
    }

    /// Iterates mutably over alive payloads, in index order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Id, &mut T)> + '_ {
        let dense = &self.dense;
        let count = self.count;
        self.pages.iter_mut().flatten().flat_map(move |page| {
            page.sparse
                .iter()
                .zip(page.data.iter_mut())
                .filter_map(move |(slot, value)| match *slot {
                    SlotState::Occupied(d) if (d as usize) < count => {
                        Some((dense[d as usize], value))
                    }
                    _ => None,
                })
        })
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Pairs `id` with dense slot `slot`, allocating its page if needed.
    #[allow(clippy::cast_possible_truncation)]
    fn assign(&mut self, id: Id, slot: usize) {
        let page = self.page_mut(page_index(id.index()));
        page.sparse[page_offset(id.index())] = SlotState::Occupied(slot as u32);
        self.dense[slot] = id;
    }

    /// Swaps two dense slots, keeping both sparse entries in sync.
    fn swap_dense(&mut self, a: usize, b: usize) {
        debug_assert_ne!(a, b);
        let id_a = self.dense[a];
        let id_b = self.dense[b];
        self.assign(id_a, b);
        self.assign(id_b, a);
    }

    /// Moves an alive slot just past the alive boundary.
    fn release_slot(&mut self, slot: usize) {
        let last = self.count - 1;
        if slot != last {
            self.swap_dense(slot, last);
        }
        self.count -= 1;
    }

    fn page_mut(&mut self, index: usize) -> &mut Page<T> {
        if self.pages.len() <= index {
            self.pages.resize_with(index + 1, || None);
        }
        self.pages[index].get_or_insert_with(|| {
            tracing::debug!("allocated sparse page {} ({} slots)", index, PAGE_SIZE);
            Box::new(Page::new())
        })
    }

    fn payload_mut(&mut self, index: u32) -> &mut T {
        let page = self.page_mut(page_index(index));
        &mut page.data[page_offset(index)]
    }
}

impl<T> SparseSet<T> {
    /// Number of alive ids.
    #[inline]
    #[must_use]
    pub fn count(&self) -> usize {
        self.count - 1
    }

    /// Checks if no id is alive.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 1
    }

    /// Number of ids ever paired (alive and recycled).
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.dense.len() - 1
    }

    /// Number of recycled ids waiting for reuse.
    #[inline]
    #[must_use]
    pub fn not_alive_count(&self) -> usize {
        self.dense.len() - self.count
    }

    /// Highest index handed out so far.
    #[inline]
    #[must_use]
    pub fn max_id(&self) -> u32 {
        self.max_id
    }

    /// Most recently activated alive id.
    #[must_use]
    pub fn last_id(&self) -> Option<Id> {
        (self.count > 1).then(|| self.dense[self.count - 1])
    }

    /// Alive ids, in dense order.
    #[inline]
    #[must_use]
    pub fn ids(&self) -> &[Id] {
        &self.dense[1..self.count]
    }

    /// Alive ids as raw 64-bit values.
    #[inline]
    #[must_use]
    pub fn raw_ids(&self) -> &[u64] {
        bytemuck::cast_slice(self.ids())
    }

    /// Returns the id at a position of the alive range `0..count()`.
    #[must_use]
    pub fn dense_id(&self, position: usize) -> Option<Id> {
        debug_assert!(position < self.count(), "dense position out of range");
        self.ids().get(position).copied()
    }

    /// Checks if `id` is alive with exactly this generation.
    #[must_use]
    pub fn is_alive(&self, id: Id) -> bool {
        self.alive_slot(id).is_some()
    }

    /// Checks if the index of `id` is alive, whatever its generation.
    #[must_use]
    pub fn has(&self, id: Id) -> bool {
        self.slot_of(id.index()).is_some_and(|slot| slot < self.count)
    }

    /// Checks if the index of `id` was ever paired with a dense slot.
    #[must_use]
    pub fn exists(&self, id: Id) -> bool {
        self.slot_of(id.index()).is_some()
    }

    /// Returns the alive id (with its current generation) for an index.
    #[must_use]
    pub fn current(&self, id: Id) -> Option<Id> {
        let slot = self.slot_of(id.index())?;
        (slot < self.count).then(|| self.dense[slot])
    }

    /// Iterates over alive ids and payloads, in dense order.
    pub fn iter(&self) -> impl Iterator<Item = (Id, &T)> + '_ {
        self.ids()
            .iter()
            .filter_map(move |&id| self.payload(id.index()).map(|value| (id, value)))
    }

    /// Dense slot paired with an index, if any.
    fn slot_of(&self, index: u32) -> Option<usize> {
        let page = self.pages.get(page_index(index))?.as_ref()?;
        match page.sparse[page_offset(index)] {
            SlotState::Occupied(slot) => Some(slot as usize),
            SlotState::Free => None,
        }
    }

    /// Dense slot of `id` if it is alive with a matching generation.
    fn alive_slot(&self, id: Id) -> Option<usize> {
        let slot = self.slot_of(id.index())?;
        (slot < self.count && self.dense[slot] == id).then_some(slot)
    }

    fn is_stale(&self, id: Id) -> bool {
        self.has(id) && !self.is_alive(id)
    }

    fn payload(&self, index: u32) -> Option<&T> {
        let page = self.pages.get(page_index(index))?.as_ref()?;
        page.data.get(page_offset(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_id_is_index_one() {
        let mut set: SparseSet<()> = SparseSet::new();
        let a = set.new_id();
        assert_eq!(a, Id::new(1, 0));
        assert_eq!(set.count(), 1);
        assert_eq!(set.max_id(), 1);
    }

    #[test]
    fn test_recycle_bumps_generation() {
        let mut set: SparseSet<()> = SparseSet::new();
        let a = set.new_id();
        assert!(set.remove(a).is_some());
        assert!(!set.is_alive(a));

        let b = set.new_id();
        assert_eq!(b.index(), 1);
        assert_eq!(b.generation(), 1);
        assert_ne!(a, b);
        assert!(set.is_alive(b));
        assert!(!set.is_alive(a));
        assert_eq!(set.max_id(), 1);
    }

    #[test]
    fn test_recycle_order_is_lifo() {
        let mut set: SparseSet<()> = SparseSet::new();
        let ids: Vec<Id> = (0..5).map(|_| set.new_id()).collect();

        set.remove(ids[1]);
        set.remove(ids[3]);
        assert_eq!(set.not_alive_count(), 2);

        let r1 = set.new_id();
        let r2 = set.new_id();
        assert_eq!(r1.index(), ids[3].index());
        assert_eq!(r2.index(), ids[1].index());
        assert_eq!(set.max_id(), 5);

        let fresh = set.new_id();
        assert_eq!(fresh.index(), 6);
    }

    #[test]
    fn test_double_remove_is_noop() {
        let mut set: SparseSet<u32> = SparseSet::new();
        let (a, value) = set.add();
        *value = 7;
        assert_eq!(set.remove(a), Some(7));
        assert_eq!(set.remove(a), None);
        assert_eq!(set.count(), 0);
    }

    #[test]
    fn test_payload_is_reset_on_remove() {
        let mut set: SparseSet<u64> = SparseSet::new();
        let (a, value) = set.add();
        *value = 99;
        set.remove(a);
        let (b, value) = set.add();
        assert_eq!(b.index(), a.index());
        assert_eq!(*value, 0);
    }

    #[test]
    fn test_stale_lookups() {
        let mut set: SparseSet<u32> = SparseSet::new();
        let (a, value) = set.add();
        *value = 3;
        set.remove(a);
        let (b, value) = set.add();
        *value = 4;

        assert_eq!(set.try_get(a), None);
        assert_eq!(set.try_get(b), Some(&4));
        assert_eq!(set.get_any(a), Some(&4));
        assert!(set.has(a));
        assert_eq!(set.current(a), Some(b));
    }

    #[test]
    fn test_ensure_unused_index() {
        let mut set: SparseSet<u32> = SparseSet::new();
        let (value, is_new) = set.ensure(Id::new(5000, 0));
        *value = 11;
        assert!(is_new);
        assert_eq!(set.max_id(), 5000);
        assert!(set.is_alive(Id::new(5000, 0)));

        let (value, is_new) = set.ensure(Id::new(5000, 0));
        assert!(!is_new);
        assert_eq!(*value, 11);

        let next = set.new_id();
        assert_eq!(next.index(), 5001);
    }

    #[test]
    fn test_ensure_reactivates_dead_slot() {
        let mut set: SparseSet<()> = SparseSet::new();
        let a = set.new_id();
        let b = set.new_id();
        set.remove(a);

        let (_, is_new) = set.ensure(a.strip_generation());
        assert!(is_new);
        // A stripped id keeps the bumped generation.
        assert!(set.is_alive(a.next_generation()));
        assert!(set.is_alive(b));
        assert_eq!(set.count(), 2);
    }

    #[test]
    fn test_ensure_moves_recycled_id_out_of_the_way() {
        let mut set: SparseSet<()> = SparseSet::new();
        let a = set.new_id();
        set.remove(a);

        set.ensure(Id::new(10, 0));
        assert_eq!(set.count(), 1);
        assert_eq!(set.not_alive_count(), 1);

        // The recycled slot is still handed out next.
        let b = set.new_id();
        assert_eq!(b, a.next_generation());
        assert!(set.is_alive(Id::new(10, 0)));
    }

    #[test]
    fn test_ensure_with_generation() {
        let mut set: SparseSet<()> = SparseSet::new();
        let id = Id::new(3, 8);
        set.ensure(id);
        assert!(set.is_alive(id));
        assert!(!set.is_alive(Id::new(3, 0)));
    }

    #[test]
    fn test_fast_paths_skip_generation() {
        let mut set: SparseSet<u8> = SparseSet::new();
        let id = Id::new(4, 0);
        *set.ensure_fast(id) = 1;
        assert_eq!(set.remove_fast(id), Some(1));
        assert!(!set.has(id));

        *set.ensure_fast(id) = 2;
        assert!(set.is_alive(id));
        assert_eq!(set.try_get(id), Some(&2));
    }

    #[test]
    fn test_fast_paths_keep_invariant_with_recycled_slots() {
        let mut set: SparseSet<u8> = SparseSet::new();
        let a = set.new_id();
        set.remove(a);

        let b = Id::new(20, 0);
        *set.ensure_fast(b) = 5;
        assert!(set.is_alive(b));
        assert!(!set.has(a));
        assert_eq!(set.ids(), &[b]);
    }

    #[test]
    fn test_dense_iteration() {
        let mut set: SparseSet<u32> = SparseSet::new();
        for i in 0..10 {
            let (_, value) = set.add();
            *value = i;
        }
        let third = set.dense_id(2).unwrap();
        set.remove(third);

        assert_eq!(set.count(), 9);
        let sum: u32 = (0..set.count()).map(|i| *set.get_dense(i).unwrap()).sum();
        assert_eq!(sum, 45 - 2);
        assert_eq!(set.iter().count(), 9);
        assert_eq!(set.raw_ids().len(), 9);
    }

    #[test]
    fn test_iter_mut_visits_alive_only() {
        let mut set: SparseSet<u32> = SparseSet::new();
        let ids: Vec<Id> = (0..4).map(|_| set.new_id()).collect();
        set.remove(ids[0]);
        for (_, value) in set.iter_mut() {
            *value += 1;
        }
        assert_eq!(set.try_get(ids[1]), Some(&1));
        assert_eq!(set.get_any(ids[0]), None);
    }

    #[test]
    fn test_new_ids_bulk() {
        let mut set: SparseSet<()> = SparseSet::new();
        let a = set.new_id();
        set.remove(a);
        let ids = set.new_ids(3).to_vec();
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0], a.next_generation());
        assert_eq!(ids[1].index(), 2);
        assert_eq!(ids[2].index(), 3);
        assert_eq!(set.count(), 3);
    }

    #[test]
    fn test_ids_across_pages() {
        let mut set: SparseSet<u32> = SparseSet::new();
        let far = Id::new(3 * PAGE_SIZE as u32 + 17, 0);
        *set.ensure(far).0 = 1;
        let near = set.new_id();
        assert_eq!(near.index(), far.index() + 1);
        assert_eq!(set.try_get(far), Some(&1));
    }

    #[test]
    fn test_clear_and_snapshot() {
        let mut set: SparseSet<u32> = SparseSet::new();
        let (a, value) = set.add();
        *value = 5;
        let snapshot = set.clone();

        set.clear();
        assert!(set.is_empty());
        assert!(!set.is_alive(a));
        assert_eq!(set.new_id(), Id::new(1, 0));

        assert_eq!(snapshot.try_get(a), Some(&5));
        set.release();
        assert_eq!(set.size(), 0);
    }

    #[test]
    fn test_set_generation() {
        let mut set: SparseSet<()> = SparseSet::new();
        let a = set.new_id();
        set.set_generation(a.with_generation(9));
        assert!(set.is_alive(Id::new(a.index(), 9)));
        assert_eq!(set.last_id(), Some(Id::new(a.index(), 9)));
    }
}
