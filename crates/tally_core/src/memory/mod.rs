//! # Memory Management
//!
//! Pooled block allocation for small, fixed-size buffers that live exactly
//! as long as their owner (for example change monitors of query matches).
//!
//! ## Design Philosophy
//!
//! - Allocators are explicit values owned by whoever needs them, never globals
//! - Freed blocks are recycled before new memory is reserved
//! - Handles are indices, so blocks may move when the pool grows

mod pool;

pub use pool::{BlockAllocator, BlockHandle};
