//! # TALLY Core
//!
//! Identity and memory primitives for the TALLY ECS kernel:
//! - Generational 64-bit ids that recycle indefinitely and never leak
//! - A paged sparse set that stores payloads at stable locations
//! - A block pool allocator for fixed-size monitor buffers
//!
//! ## Architecture Rules
//!
//! 1. **Ids are indices** - a handle is validated, never dereferenced
//! 2. **Generations only grow** - a freed slot is bumped before reuse
//! 3. **No globals** - allocators and sets are owned values
//!
//! ## Example
//!
//! ```rust
//! use tally_core::SparseSet;
//!
//! let mut entities: SparseSet<u32> = SparseSet::new();
//! let (id, health) = entities.add();
//! *health = 100;
//! assert_eq!(entities.get(id), Some(&100));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod id;
pub mod memory;
pub mod sparse;

pub use config::{KernelConfig, MonitorConfig, SparseConfig};
pub use error::{ConfigError, ConfigResult};
pub use id::Id;
pub use memory::{BlockAllocator, BlockHandle};
pub use sparse::{SlotState, SparseSet, PAGE_BITS, PAGE_SIZE};
