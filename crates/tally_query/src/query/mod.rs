//! # Queries
//!
//! A [`Query`] is compiled from a [`QueryDesc`]. Cached queries keep their
//! matches in a [`QueryCache`] and can answer whether anything they read has
//! changed since they were last iterated.
//!
//! ## Example
//!
//! ```rust
//! use tally_query::{Query, QueryDesc, Term, World};
//!
//! let mut world = World::new();
//! let position = world.component();
//! let e = world.new_entity();
//! world.add(e, position);
//!
//! let desc = QueryDesc::new().with(Term::new(position).read()).detect_changes();
//! let mut query = Query::new(&world, desc).unwrap();
//! assert!(query.changed(&world));
//!
//! let mut iter = query.iter(&mut world);
//! while iter.next_batch().is_some() {}
//! drop(iter);
//! assert!(!query.changed(&world));
//!
//! world.modified(e, position);
//! assert!(query.changed(&world));
//! ```

mod cache;
mod fields;
mod matcher;
mod term;

pub use cache::{Group, QueryCache};
pub use fields::{FieldSet, QueryShape, MAX_FIELDS};
pub use matcher::{FieldSource, Match};
pub use term::{CacheKind, InOut, Oper, QueryDesc, Source, Term};

pub(crate) use cache::MatchPos;
pub(crate) use matcher::{find_on, group_id, match_table};

use tally_core::Id;

use crate::change::{fixed::fixed_monitor, MonitorAllocator, TrackState};
use crate::error::{QueryError, QueryResult};
use crate::iter::QueryIter;
use crate::world::{TableId, World};

/// Part of a match to check for changes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChangeScope {
    /// Rows and every monitored field.
    #[default]
    All,
    /// Rows added or removed only.
    Structure,
    /// A single field.
    Field(usize),
}

/// A compiled query.
#[derive(Debug)]
pub struct Query {
    pub(crate) terms: Vec<Term>,
    pub(crate) shape: QueryShape,
    pub(crate) group_by: Option<Id>,
    detect_changes: bool,
    pub(crate) cache: Option<QueryCache>,
    /// Counters of read fields on fixed entities, seeded lazily.
    pub(crate) fixed_monitor: Option<Vec<TrackState>>,
}

impl Query {
    /// Compiles a query, drawing monitors from a pool sized by the world's
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the description is malformed or names a fixed
    /// source that is not alive.
    pub fn new(world: &World, desc: QueryDesc) -> QueryResult<Self> {
        let shape = QueryShape::compile(&desc.terms)?;
        let monitors =
            MonitorAllocator::from_config(shape.field_count() + 1, &world.config().monitors);
        Self::build(world, desc, shape, monitors)
    }

    /// Compiles a query that draws monitors from the given pool.
    ///
    /// # Errors
    ///
    /// Same as [`Query::new`], plus [`QueryError::MonitorLayout`] if the
    /// pool's blocks do not hold one entry per field plus one.
    pub fn with_allocator(
        world: &World,
        desc: QueryDesc,
        monitors: MonitorAllocator,
    ) -> QueryResult<Self> {
        let shape = QueryShape::compile(&desc.terms)?;
        let expected = shape.field_count() + 1;
        if monitors.block_len() != expected {
            return Err(QueryError::MonitorLayout {
                expected,
                found: monitors.block_len(),
            });
        }
        Self::build(world, desc, shape, monitors)
    }

    fn build(
        world: &World,
        desc: QueryDesc,
        shape: QueryShape,
        monitors: MonitorAllocator,
    ) -> QueryResult<Self> {
        for term in &desc.terms {
            if let Source::Entity(source) = term.src {
                if !world.is_alive(source) {
                    return Err(QueryError::DeadSource(source));
                }
            }
        }

        let cache = match desc.cache {
            CacheKind::Cached => Some(QueryCache::new(monitors)),
            CacheKind::Uncached => None,
        };
        let mut query = Self {
            terms: desc.terms,
            shape,
            group_by: desc.group_by,
            detect_changes: desc.detect_changes,
            cache,
            fixed_monitor: None,
        };

        if let Some(cache) = query.cache.as_mut() {
            cache.rematch(world, &query.terms, &query.shape, query.group_by);
            if query.detect_changes {
                cache.init_monitors(world, &query.shape);
            }
        }

        tracing::debug!(
            "compiled query: {} terms, {} fields, cached {}, change detection {}",
            query.terms.len(),
            query.shape.field_count(),
            query.cache.is_some(),
            query.detect_changes
        );
        Ok(query)
    }

    /// Terms, in order.
    #[inline]
    #[must_use]
    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Field layout and access masks.
    #[inline]
    #[must_use]
    pub fn shape(&self) -> &QueryShape {
        &self.shape
    }

    /// Number of fields.
    #[inline]
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.shape.field_count()
    }

    /// Whether matches are cached.
    #[inline]
    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    /// Whether change detection was requested at creation.
    #[inline]
    #[must_use]
    pub fn detects_changes(&self) -> bool {
        self.detect_changes
    }

    /// Relationship used for grouping.
    #[inline]
    #[must_use]
    pub fn group_by(&self) -> Option<Id> {
        self.group_by
    }

    /// Match cache, for cached queries.
    #[inline]
    #[must_use]
    pub fn cache(&self) -> Option<&QueryCache> {
        self.cache.as_ref()
    }

    /// Number of times tables were matched or unmatched; 0 for uncached
    /// queries.
    #[must_use]
    pub fn match_count(&self) -> u32 {
        self.cache.as_ref().map_or(0, QueryCache::match_count)
    }

    /// Refreshes the cache if the world's topology moved.
    ///
    /// Returns `true` if any match was added, replaced or removed.
    pub fn update(&mut self, world: &World) -> bool {
        match self.cache.as_mut() {
            Some(cache) => cache.rematch(world, &self.terms, &self.shape, self.group_by),
            None => false,
        }
    }

    /// Checks whether anything the query reads changed since its last full
    /// iteration.
    ///
    /// The first call enables change detection and reports `true`. Only
    /// cached queries track matches; for uncached ones only fixed sources
    /// are checked.
    pub fn changed(&mut self, world: &World) -> bool {
        debug_assert!(self.cache.is_some(), "change detection requires a cached query");

        let fixed = self.shape.read_fields() & self.shape.fixed_fields();
        if !fixed.is_empty() && self.fixed_monitor.is_none() {
            fixed_monitor(world, &self.terms, &self.shape, &mut self.fixed_monitor, false);
        }
        if self.fixed_monitor.is_some()
            && fixed_monitor(world, &self.terms, &self.shape, &mut self.fixed_monitor, true)
        {
            return true;
        }

        let Some(cache) = self.cache.as_mut() else {
            return false;
        };
        cache.rematch(world, &self.terms, &self.shape, self.group_by);
        if !cache.has_change_detection() {
            cache.init_monitors(world, &self.shape);
        }
        cache.check(world, &self.shape)
    }

    /// Checks the match of one table.
    ///
    /// Returns `false` if the table is not matched or the query is not
    /// cached.
    pub fn table_changed(&mut self, world: &World, table: TableId, scope: ChangeScope) -> bool {
        let Some(cache) = self.cache.as_mut() else {
            return false;
        };
        cache.rematch(world, &self.terms, &self.shape, self.group_by);
        cache.check_table(world, &self.shape, table, scope)
    }

    /// Starts a pass over all matched tables that have rows.
    pub fn iter<'a>(&'a mut self, world: &'a mut World) -> QueryIter<'a> {
        QueryIter::new(self, world)
    }
}
