//! # Query Iteration
//!
//! A pass yields one [`Batch`] per matched table that has rows (and one per
//! wildcard combination). When a batch is left, the columns it declares to
//! write are marked dirty and its match monitor is synchronized, unless the
//! batch was skipped. Dropping the iterator leaves the current batch the same
//! way. When the pass ends, written fixed-source columns are marked dirty and
//! the fixed-source monitor is refreshed; an abandoned pass does neither.

use tally_core::Id;

use crate::change::dirty::{mark_fields_dirty, mark_fixed_fields_dirty};
use crate::change::fixed::fixed_monitor;
use crate::change::{resolve_field, BatchView};
use crate::query::{
    group_id, match_table, FieldSet, FieldSource, Match, MatchPos, Query, QueryCache,
};
use crate::world::{Table, TableColumn, TableId, World};

/// One table's worth of results.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Batch {
    /// Matched table, `None` for queries without table terms.
    pub table: Option<TableId>,
    /// Number of rows.
    pub count: usize,
    /// Group of the table.
    pub group_id: u64,
    /// Fields that have a source in this batch.
    pub set_fields: FieldSet,
}

#[derive(Clone, Copy, Debug)]
struct Current {
    pos: MatchPos,
    batch: Batch,
}

/// Iterator over the batches of a query.
///
/// Holds the world mutably for the duration of the pass, since leaving a
/// batch writes dirty counters.
pub struct QueryIter<'a> {
    query: &'a mut Query,
    world: &'a mut World,
    /// Matches computed for this pass when the query is uncached.
    transient: Vec<(u64, Match)>,
    positions: Vec<MatchPos>,
    cursor: usize,
    current: Option<Current>,
    skipped: bool,
    skipped_any: bool,
    /// Fixed-source verdict, computed once per pass.
    fixed_changed: Option<bool>,
    finished: bool,
}

impl<'a> QueryIter<'a> {
    pub(crate) fn new(query: &'a mut Query, world: &'a mut World) -> Self {
        let (positions, transient) = match query.cache.as_mut() {
            Some(cache) => {
                cache.rematch(world, &query.terms, &query.shape, query.group_by);
                (cache.positions(world), Vec::new())
            }
            None => {
                let transient = transient_matches(world, query);
                let positions = (0..transient.len())
                    .map(|index| MatchPos {
                        group: 0,
                        index,
                        sub: None,
                    })
                    .collect();
                (positions, transient)
            }
        };

        Self {
            query,
            world,
            transient,
            positions,
            cursor: 0,
            current: None,
            skipped: false,
            skipped_any: false,
            fixed_changed: None,
            finished: false,
        }
    }

    /// Advances to the next batch.
    ///
    /// Leaving the current batch marks its written columns dirty and
    /// synchronizes its monitor, unless [`QueryIter::skip`] was called.
    pub fn next_batch(&mut self) -> Option<Batch> {
        if let Some(current) = self.current.take() {
            self.leave(current);
        }

        while self.cursor < self.positions.len() {
            let pos = self.positions[self.cursor];
            self.cursor += 1;

            let world: &World = &*self.world;
            let Some(matched) = locate(self.query.cache.as_ref(), &self.transient, pos) else {
                continue;
            };
            let count = match matched.table {
                Some(table) => world.table(table).map_or(0, Table::count),
                None => 1,
            };
            if count == 0 {
                continue;
            }
            let group_id = match self.query.cache.as_ref() {
                Some(cache) => cache.group_id_at(pos),
                None => self.transient.get(pos.index).map_or(0, |(group, _)| *group),
            };
            let batch = Batch {
                table: matched.table,
                count,
                group_id,
                set_fields: live_set_fields(world, matched),
            };

            self.current = Some(Current { pos, batch });
            self.skipped = false;
            return Some(batch);
        }

        if !self.finished {
            self.finished = true;
            self.finish_pass();
        }
        None
    }

    /// Checks whether data read by the current batch changed since the
    /// batch's table was last iterated.
    ///
    /// Uncached queries have no match monitors. Their batches report a
    /// fixed-source change if there is one and `true` otherwise, never
    /// `false`, so a caller gating work on this still sees every write.
    /// Outside of a batch this returns `false`.
    pub fn changed(&mut self) -> bool {
        let Some(current) = self.current else {
            return false;
        };

        let fixed = self.query.shape.read_fields() & self.query.shape.fixed_fields();
        if !fixed.is_empty() {
            let verdict = match self.fixed_changed {
                Some(verdict) => verdict,
                None => {
                    let verdict = fixed_monitor(
                        &*self.world,
                        &self.query.terms,
                        &self.query.shape,
                        &mut self.query.fixed_monitor,
                        true,
                    );
                    self.fixed_changed = Some(verdict);
                    verdict
                }
            };
            if verdict {
                return true;
            }
        }

        match self.query.cache.as_mut() {
            Some(cache) => cache.check_at(
                current.pos,
                &*self.world,
                &self.query.shape,
                current.batch.set_fields,
            ),
            None => true,
        }
    }

    /// Leaves the current batch untouched: no dirty marking, no monitor
    /// synchronization.
    pub fn skip(&mut self) {
        if self.current.is_some() {
            self.skipped = true;
            self.skipped_any = true;
        }
    }

    /// Current batch.
    #[must_use]
    pub fn batch(&self) -> Option<Batch> {
        self.current.map(|current| current.batch)
    }

    /// Entities of the current batch.
    #[must_use]
    pub fn entities(&self) -> &[Id] {
        self.current
            .and_then(|current| current.batch.table)
            .and_then(|table| self.world.table(table))
            .map(Table::entities)
            .unwrap_or_default()
    }

    /// Source of a field in the current batch.
    #[must_use]
    pub fn field_source(&self, field: usize) -> FieldSource {
        if !self.is_set(field) {
            return FieldSource::Unset;
        }
        self.current_match()
            .map_or(FieldSource::Unset, |matched| matched.field_source(field))
    }

    /// Whether a field has a source in the current batch.
    #[must_use]
    pub fn is_set(&self, field: usize) -> bool {
        self.current
            .is_some_and(|current| current.batch.set_fields.contains(field))
    }

    /// Physical column of a field in the current batch.
    #[must_use]
    pub fn column(&self, field: usize) -> Option<TableColumn> {
        let table = self.current?.batch.table;
        resolve_field(&*self.world, table, self.field_source(field))
    }

    /// The world being iterated.
    #[must_use]
    pub fn world(&self) -> &World {
        &*self.world
    }

    fn current_match(&self) -> Option<&Match> {
        let current = self.current?;
        locate(self.query.cache.as_ref(), &self.transient, current.pos)
    }

    fn leave(&mut self, current: Current) {
        if self.skipped {
            return;
        }

        if let Some(matched) = locate(self.query.cache.as_ref(), &self.transient, current.pos) {
            let view = BatchView {
                matched,
                set_fields: current.batch.set_fields,
            };
            mark_fields_dirty(self.world, &self.query.shape, &view);
        }

        if let Some(cache) = self.query.cache.as_mut() {
            cache.sync_at(current.pos, &*self.world, &self.query.shape);
        }
    }

    fn finish_pass(&mut self) {
        mark_fixed_fields_dirty(self.world, &self.query.terms, &self.query.shape);
        if self.query.fixed_monitor.is_some() {
            fixed_monitor(
                &*self.world,
                &self.query.terms,
                &self.query.shape,
                &mut self.query.fixed_monitor,
                false,
            );
        }
        if let Some(cache) = self.query.cache.as_mut() {
            cache.finish_pass(&*self.world, &self.query.shape, self.skipped_any);
        }
        tracing::trace!("query pass finished after {} batches", self.positions.len());
    }
}

impl Drop for QueryIter<'_> {
    fn drop(&mut self) {
        if let Some(current) = self.current.take() {
            self.leave(current);
        }
    }
}

fn locate<'m>(
    cache: Option<&'m QueryCache>,
    transient: &'m [(u64, Match)],
    pos: MatchPos,
) -> Option<&'m Match> {
    match cache {
        Some(cache) => cache.match_at(pos),
        None => transient.get(pos.index).map(|(_, matched)| matched),
    }
}

/// Set fields of a match, minus remote sources that lost their id.
fn live_set_fields(world: &World, matched: &Match) -> FieldSet {
    let mut set_fields = matched.set_fields();
    for field in matched.set_fields().iter() {
        if let Some((source, component)) = matched.field_source(field).remote() {
            if !world.has(source, component) {
                set_fields.remove(field);
            }
        }
    }
    set_fields
}

/// Matches of an uncached query, wildcard combinations flattened.
fn transient_matches(world: &World, query: &Query) -> Vec<(u64, Match)> {
    let mut flat = Vec::new();
    let mut push = |group: u64, mut matched: Match| {
        let subs = std::mem::take(&mut matched.wildcard_matches);
        flat.push((group, matched));
        flat.extend(subs.into_iter().map(|sub| (group, sub)));
    };

    if query.shape.has_table_terms() {
        for table in world.tables().filter(|table| !table.is_empty()) {
            if let Some(matched) = match_table(world, &query.terms, &query.shape, Some(table)) {
                push(group_id(Some(table), query.group_by), matched);
            }
        }
    } else if let Some(matched) = match_table(world, &query.terms, &query.shape, None) {
        push(0, matched);
    }

    flat.sort_by_key(|(group, _)| *group);
    flat
}
