//! # Sparse Pages
//!
//! Fixed-size blocks mapping `index mod PAGE_SIZE` to a dense slot, with the
//! payload stored next to the mapping so that its location stays stable for
//! as long as the page lives.

/// Number of index bits covered by a single page.
pub const PAGE_BITS: u32 = 12;

/// Number of slots in a single page.
pub const PAGE_SIZE: usize = 1 << PAGE_BITS;

/// Mask extracting the in-page offset from an index.
const OFFSET_MASK: u32 = (PAGE_SIZE as u32) - 1;

/// Page that holds the given index.
#[inline]
#[must_use]
pub const fn page_index(index: u32) -> usize {
    (index >> PAGE_BITS) as usize
}

/// Offset of the given index inside its page.
#[inline]
#[must_use]
pub const fn page_offset(index: u32) -> usize {
    (index & OFFSET_MASK) as usize
}

/// Pairing state of a sparse slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SlotState {
    /// The index has never been paired with a dense slot.
    #[default]
    Free,
    /// The index is paired with this dense slot. The pairing survives
    /// removal; liveness is decided by the dense slot's position.
    Occupied(u32),
}

/// A lazily allocated block of the sparse array.
#[derive(Clone)]
pub(crate) struct Page<T> {
    /// Sparse slot per offset.
    pub(crate) sparse: Box<[SlotState]>,
    /// Payload per offset. Zero-sized payloads take no memory.
    pub(crate) data: Box<[T]>,
}

impl<T: Default> Page<T> {
    /// Creates a page with every slot free and every payload defaulted.
    pub(crate) fn new() -> Self {
        Self {
            sparse: vec![SlotState::Free; PAGE_SIZE].into_boxed_slice(),
            data: (0..PAGE_SIZE).map(|_| T::default()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_math() {
        assert_eq!(page_index(0), 0);
        assert_eq!(page_index(4095), 0);
        assert_eq!(page_index(4096), 1);
        assert_eq!(page_offset(4097), 1);
        assert_eq!(page_offset(u32::MAX), PAGE_SIZE - 1);
    }

    #[test]
    fn test_new_page_is_free() {
        let page: Page<u32> = Page::new();
        assert!(page.sparse.iter().all(|slot| *slot == SlotState::Free));
        assert!(page.data.iter().all(|value| *value == 0));
        assert_eq!(page.data.len(), PAGE_SIZE);
    }
}
