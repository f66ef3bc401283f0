//! # Block Pool Allocator
//!
//! Fixed-size block allocator for buffers that are frequently allocated and
//! freed by the same owner.

use crate::config::MonitorConfig;

/// A pool of equally sized blocks of `T`.
///
/// Blocks can be allocated and freed individually, but all blocks have the
/// same length. Storage grows by whole chunks of blocks; freed blocks are
/// reused first.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. Each owner holds its own pool.
///
/// # Example
///
/// ```rust
/// use tally_core::BlockAllocator;
///
/// let mut pool: BlockAllocator<u32> = BlockAllocator::new(4, 16);
/// let handle = pool.alloc();
/// pool.block_mut(handle)[0] = 7;
/// assert_eq!(pool.block(handle)[0], 7);
/// assert!(pool.free(handle));
/// ```
#[derive(Clone, Debug)]
pub struct BlockAllocator<T> {
    /// Length of every block, in elements.
    block_len: usize,
    /// Number of blocks reserved each time the pool grows.
    blocks_per_chunk: usize,
    /// Backing storage, `block_len` elements per block.
    storage: Vec<T>,
    /// Whether each block is currently handed out.
    live: Vec<bool>,
    /// Free list - indices of available blocks.
    free_list: Vec<u32>,
    /// Number of allocated blocks.
    allocated_count: usize,
}

/// Handle to a block allocated from a [`BlockAllocator`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockHandle {
    /// Index of the block in the pool.
    index: u32,
}

impl<T: Copy + Default> BlockAllocator<T> {
    /// Creates an empty pool.
    ///
    /// # Arguments
    ///
    /// * `block_len` - Number of elements per block
    /// * `blocks_per_chunk` - Number of blocks reserved per growth step
    ///
    /// # Panics
    ///
    /// Panics if `blocks_per_chunk` is zero.
    #[must_use]
    pub fn new(block_len: usize, blocks_per_chunk: usize) -> Self {
        assert!(blocks_per_chunk > 0, "blocks_per_chunk must be greater than zero");
        Self {
            block_len,
            blocks_per_chunk,
            storage: Vec::new(),
            live: Vec::new(),
            free_list: Vec::new(),
            allocated_count: 0,
        }
    }

    /// Creates an empty pool sized from configuration.
    #[must_use]
    pub fn from_config(block_len: usize, config: &MonitorConfig) -> Self {
        Self::new(block_len, config.blocks_per_chunk.max(1))
    }

    /// Returns the block length, in elements.
    #[inline]
    #[must_use]
    pub const fn block_len(&self) -> usize {
        self.block_len
    }

    /// Returns the number of blocks the pool can hold without growing.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.live.len()
    }

    /// Returns the number of currently allocated blocks.
    #[inline]
    #[must_use]
    pub const fn allocated_count(&self) -> usize {
        self.allocated_count
    }

    /// Returns the number of free blocks.
    #[inline]
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free_list.len()
    }

    /// Allocates a block with every element set to `T::default()`.
    ///
    /// O(1) unless the pool has to grow by a chunk.
    pub fn alloc(&mut self) -> BlockHandle {
        if self.free_list.is_empty() {
            self.grow();
        }
        let index = self.free_list.pop().unwrap_or_default();
        self.live[index as usize] = true;
        self.allocated_count += 1;
        BlockHandle { index }
    }

    /// Returns a block to the pool.
    ///
    /// Returns `false` if the handle was not allocated.
    pub fn free(&mut self, handle: BlockHandle) -> bool {
        let index = handle.index as usize;
        match self.live.get_mut(index) {
            Some(live) if *live => *live = false,
            _ => return false,
        }
        let range = self.range(handle);
        self.storage[range].fill(T::default());
        self.free_list.push(handle.index);
        self.allocated_count -= 1;
        true
    }

    /// Gets the elements of an allocated block.
    #[inline]
    #[must_use]
    pub fn block(&self, handle: BlockHandle) -> &[T] {
        debug_assert!(self.is_allocated(handle), "block is not allocated");
        &self.storage[self.range(handle)]
    }

    /// Gets the elements of an allocated block mutably.
    #[inline]
    pub fn block_mut(&mut self, handle: BlockHandle) -> &mut [T] {
        debug_assert!(self.is_allocated(handle), "block is not allocated");
        let range = self.range(handle);
        &mut self.storage[range]
    }

    /// Checks if a handle refers to an allocated block.
    #[must_use]
    pub fn is_allocated(&self, handle: BlockHandle) -> bool {
        self.live.get(handle.index as usize).copied().unwrap_or(false)
    }

    /// Frees every block without releasing memory.
    #[allow(clippy::cast_possible_truncation)]
    pub fn clear(&mut self) {
        self.storage.fill(T::default());
        self.live.fill(false);
        self.free_list.clear();
        self.free_list.extend((0..self.live.len() as u32).rev());
        self.allocated_count = 0;
    }

    #[allow(clippy::cast_possible_truncation)]
    fn grow(&mut self) {
        let first = self.live.len();
        let added = self.blocks_per_chunk;
        self.storage
            .resize((first + added) * self.block_len, T::default());
        self.live.resize(first + added, false);
        self.free_list
            .extend((first as u32..(first + added) as u32).rev());
        tracing::debug!(
            "block pool grew to {} blocks of {} elements",
            first + added,
            self.block_len
        );
    }

    fn range(&self, handle: BlockHandle) -> std::ops::Range<usize> {
        let start = handle.index as usize * self.block_len;
        start..start + self.block_len
    }
}
