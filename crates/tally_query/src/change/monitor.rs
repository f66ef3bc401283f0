//! # Match Monitors
//!
//! A match monitor is a block of `field_count + 1` tracked counters owned by
//! one cached match. Slot 0 mirrors the structural counter of the matched
//! table; slot `i + 1` mirrors the dirty counter of the column field `i`
//! resolved to when the monitor was last synchronized.
//!
//! A fresh monitor has an untracked structural slot, which keeps the match
//! reported as changed until its first synchronization. Fields on fixed
//! entities are left to the query's fixed-source monitor.

use tally_core::BlockAllocator;

use crate::query::{FieldSet, FieldSource, Match, QueryShape};
use crate::world::{TableColumn, TableId, World};

/// Last observed value of a dirty counter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TrackState {
    /// Not monitored (or, for the structural slot, never synchronized).
    #[default]
    Untracked,
    /// Counter value seen at the last synchronization.
    Tracked(u32),
}

/// Pool handing out monitor blocks.
pub type MonitorAllocator = BlockAllocator<TrackState>;

/// View of a table and its field sources, as seen by the monitor engine.
///
/// Implemented by cached matches and by the iterator's current batch, whose
/// set fields can be narrower than the match's.
pub trait FieldColumns {
    /// Matched table.
    fn table(&self) -> Option<TableId>;

    /// Fields that currently have a source.
    fn set_fields(&self) -> FieldSet;

    /// Source of a field.
    fn field_source(&self, field: usize) -> FieldSource;
}

impl FieldColumns for Match {
    fn table(&self) -> Option<TableId> {
        self.table
    }

    fn set_fields(&self) -> FieldSet {
        self.set_fields
    }

    fn field_source(&self, field: usize) -> FieldSource {
        Match::field_source(self, field)
    }
}

/// A match seen through a narrower set of fields.
pub(crate) struct BatchView<'a> {
    pub(crate) matched: &'a Match,
    pub(crate) set_fields: FieldSet,
}

impl FieldColumns for BatchView<'_> {
    fn table(&self) -> Option<TableId> {
        self.matched.table
    }

    fn set_fields(&self) -> FieldSet {
        self.set_fields
    }

    fn field_source(&self, field: usize) -> FieldSource {
        self.matched.field_source(field)
    }
}

/// Resolves a field to the physical column holding its data.
///
/// Returns `None` for unset fields, tags and sources that are gone.
pub fn resolve_field(
    world: &World,
    table: Option<TableId>,
    source: FieldSource,
) -> Option<TableColumn> {
    match source {
        FieldSource::Unset => None,
        FieldSource::Owned { type_index } => {
            let table = table?;
            let column = world.table(table)?.column(type_index)?;
            Some(TableColumn { table, column })
        }
        FieldSource::Shared { source, component } | FieldSource::Fixed { source, component } => {
            world.column_of(source, component)
        }
    }
}

fn structural_counter(world: &World, table: TableId) -> Option<u32> {
    world.dirty_state(table)?.first().copied()
}

/// Allocates the monitor of a match if it has none.
///
/// Returns `true` on allocation; a fresh monitor counts as changed.
pub(crate) fn ensure_monitor(
    monitors: &mut MonitorAllocator,
    shape: &QueryShape,
    world: &World,
    matched: &mut Match,
) -> bool {
    if matched.monitor.is_some() {
        return false;
    }

    let handle = monitors.alloc();
    let block = monitors.block_mut(handle);
    block[0] = TrackState::Untracked;
    for field in 0..shape.field_count() {
        let tracked = shape.read_fields().contains(field)
            && !shape.fixed_fields().contains(field)
            && matched.set_fields.contains(field)
            && resolve_field(world, matched.table, matched.field_source(field)).is_some();
        block[field + 1] = if tracked {
            TrackState::Tracked(0)
        } else {
            TrackState::Untracked
        };
    }
    matched.monitor = Some(handle);
    true
}

/// Compares one monitor slot against the live counter.
///
/// Slot 0 is the structural counter; slot `i + 1` is field `i`.
pub(crate) fn check_term(
    monitors: &mut MonitorAllocator,
    shape: &QueryShape,
    world: &World,
    matched: &mut Match,
    slot: usize,
) -> bool {
    if ensure_monitor(monitors, shape, world, matched) {
        return true;
    }
    let Some(handle) = matched.monitor else {
        return true;
    };
    let Some(&state) = monitors.block(handle).get(slot) else {
        return false;
    };

    if slot == 0 {
        return match (state, matched.table) {
            (TrackState::Untracked, _) => true,
            (_, None) => false,
            (TrackState::Tracked(seen), Some(table)) => {
                structural_counter(world, table) != Some(seen)
            }
        };
    }

    let TrackState::Tracked(seen) = state else {
        return false;
    };
    match resolve_field(world, matched.table, matched.field_source(slot - 1)) {
        Some(column) => world.column_counter(column) != Some(seen),
        None => true,
    }
}

/// Compares a whole monitor against the live counters of a view.
fn compare(
    monitors: &MonitorAllocator,
    shape: &QueryShape,
    world: &World,
    matched: &Match,
    view: &impl FieldColumns,
) -> bool {
    let Some(handle) = matched.monitor else {
        return true;
    };
    let block = monitors.block(handle);

    match (block[0], view.table()) {
        (TrackState::Untracked, _) => return true,
        (TrackState::Tracked(seen), Some(table)) => {
            if structural_counter(world, table) != Some(seen) {
                return true;
            }
        }
        (TrackState::Tracked(_), None) => {}
    }

    let set_fields = view.set_fields();
    for field in 0..shape.field_count() {
        let TrackState::Tracked(seen) = block[field + 1] else {
            continue;
        };
        if !set_fields.contains(field) {
            continue;
        }
        let source = view.field_source(field);
        match resolve_field(world, view.table(), source) {
            Some(column) => {
                if world.column_counter(column) != Some(seen) {
                    return true;
                }
            }
            None if matches!(source, FieldSource::Owned { .. }) => {}
            None => return true,
        }
    }
    false
}

/// Checks a match and all its wildcard sub-matches for changes.
///
/// `enabled` is set when a monitor gets allocated.
pub(crate) fn check_match(
    monitors: &mut MonitorAllocator,
    shape: &QueryShape,
    world: &World,
    matched: &mut Match,
    enabled: &mut bool,
) -> bool {
    if ensure_monitor(monitors, shape, world, matched) {
        *enabled = true;
        return true;
    }
    if compare(monitors, shape, world, &*matched, &*matched) {
        return true;
    }
    matched
        .wildcard_matches
        .iter_mut()
        .any(|sub| check_match(monitors, shape, world, sub, enabled))
}

/// Checks a single match as seen by an iterator batch.
///
/// Sibling wildcard combinations are separate batches and are not visited.
///
/// # Arguments
///
/// * `set_fields` - Set fields of the batch, possibly narrower than the
///   match's own
/// * `enabled` - Set when a monitor gets allocated
pub(crate) fn check_batch(
    monitors: &mut MonitorAllocator,
    shape: &QueryShape,
    world: &World,
    matched: &mut Match,
    set_fields: FieldSet,
    enabled: &mut bool,
) -> bool {
    if ensure_monitor(monitors, shape, world, matched) {
        *enabled = true;
        return true;
    }
    let view = BatchView {
        matched: &*matched,
        set_fields,
    };
    compare(monitors, shape, world, &*matched, &view)
}

/// Checks one slot of a match and all its wildcard sub-matches.
pub(crate) fn check_match_term(
    monitors: &mut MonitorAllocator,
    shape: &QueryShape,
    world: &World,
    matched: &mut Match,
    slot: usize,
    enabled: &mut bool,
) -> bool {
    if matched.monitor.is_none() {
        *enabled = true;
    }
    if check_term(monitors, shape, world, matched, slot) {
        return true;
    }
    matched
        .wildcard_matches
        .iter_mut()
        .any(|sub| check_match_term(monitors, shape, world, sub, slot, enabled))
}

/// Copies the live counters into the monitor of a match.
///
/// Matches without a monitor get one when `enabled` is set; otherwise they
/// are left alone. Slots that cannot be resolved keep their value.
pub(crate) fn sync_match(
    monitors: &mut MonitorAllocator,
    shape: &QueryShape,
    world: &World,
    matched: &mut Match,
    enabled: bool,
) {
    if matched.monitor.is_none() {
        if !enabled {
            return;
        }
        ensure_monitor(monitors, shape, world, matched);
    }
    let Some(handle) = matched.monitor else {
        return;
    };
    let block = monitors.block_mut(handle);

    let structural = matched
        .table
        .map_or(Some(0), |table| structural_counter(world, table));
    if let Some(value) = structural {
        block[0] = TrackState::Tracked(value);
    }

    for field in 0..shape.field_count() {
        if block[field + 1] == TrackState::Untracked {
            continue;
        }
        let counter = resolve_field(world, matched.table, matched.field_source(field))
            .and_then(|column| world.column_counter(column));
        if let Some(value) = counter {
            block[field + 1] = TrackState::Tracked(value);
        }
    }
}

/// Returns the monitors of a match and its sub-matches to the pool.
pub(crate) fn free_monitors(monitors: &mut MonitorAllocator, matched: &mut Match) {
    if let Some(handle) = matched.monitor.take() {
        monitors.free(handle);
    }
    for sub in &mut matched.wildcard_matches {
        free_monitors(monitors, sub);
    }
}

/// Current monitor contents of a match, if allocated.
#[must_use]
pub fn monitor_state<'a>(
    monitors: &'a MonitorAllocator,
    matched: &Match,
) -> Option<&'a [TrackState]> {
    matched.monitor.map(|handle| monitors.block(handle))
}
