//! # TALLY Query
//!
//! Change detection for cached ECS queries:
//! - Tables count structural changes and per-column writes
//! - Every cached match remembers the counters it last observed
//! - Iteration marks written columns dirty and synchronizes what it read
//!
//! ## Architecture Rules
//!
//! 1. **Counters, not flags** - a change is a counter that moved
//! 2. **Lazy monitors** - nothing is tracked until someone asks
//! 3. **Owned pools** - monitor blocks come from the query's own allocator
//!
//! ## Example
//!
//! ```rust
//! use tally_query::{Query, QueryDesc, Term, World};
//!
//! let mut world = World::new();
//! let position = world.component();
//! let velocity = world.component();
//! let e = world.new_entity();
//! world.add(e, position);
//! world.add(e, velocity);
//!
//! let reads = QueryDesc::new().with(Term::new(position).read());
//! let writes = QueryDesc::new().with(Term::new(position).write());
//! let mut reader = Query::new(&world, reads).unwrap();
//! let mut writer = Query::new(&world, writes).unwrap();
//!
//! reader.changed(&world);
//! let mut iter = reader.iter(&mut world);
//! while iter.next_batch().is_some() {}
//! drop(iter);
//! assert!(!reader.changed(&world));
//!
//! let mut iter = writer.iter(&mut world);
//! while iter.next_batch().is_some() {}
//! drop(iter);
//! assert!(reader.changed(&world));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod change;
pub mod error;
pub mod iter;
pub mod query;
pub mod world;

pub use change::{FieldColumns, MonitorAllocator, TrackState};
pub use error::{QueryError, QueryResult};
pub use iter::{Batch, QueryIter};
pub use query::{
    CacheKind, ChangeScope, FieldSet, FieldSource, InOut, Match, Oper, Query, QueryCache,
    QueryDesc, Source, Term,
};
pub use world::{Record, Table, TableColumn, TableId, World};

pub use tally_core::{Id, KernelConfig};
