//! # Query Cache
//!
//! Keeps the matches of a query between evaluations, grouped and ordered by
//! group id. The cache is refreshed whenever the world's topology version
//! moves: matches whose layout is unchanged keep their monitors, all others
//! are replaced and counted in the match count.

use std::collections::{BTreeMap, HashMap};

use tally_core::Id;

use super::fields::{FieldSet, QueryShape};
use super::matcher::{group_id, match_table, Match};
use super::term::Term;
use super::ChangeScope;
use crate::change::{
    check_batch, check_match, check_match_term, ensure_monitor, free_monitors, sync_match,
    MonitorAllocator,
};
use crate::world::{Table, TableId, World};

/// Matches sharing a group id.
#[derive(Clone, Debug, Default)]
pub struct Group {
    /// Group id (raw relationship target, 0 when ungrouped).
    id: u64,
    /// Number of times matches were added to or removed from the group.
    match_count: u32,
    /// Matches, in table order.
    matches: Vec<Match>,
}

impl Group {
    /// Group id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of times matches were added to or removed from the group.
    #[inline]
    #[must_use]
    pub fn match_count(&self) -> u32 {
        self.match_count
    }

    /// Matches of the group.
    #[inline]
    #[must_use]
    pub fn matches(&self) -> &[Match] {
        &self.matches
    }
}

/// Position of a match (or wildcard sub-match) inside the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct MatchPos {
    pub(crate) group: usize,
    pub(crate) index: usize,
    pub(crate) sub: Option<usize>,
}

/// Cached matches plus cache-level change state.
#[derive(Debug)]
pub struct QueryCache {
    /// Groups, ascending by id.
    groups: Vec<Group>,
    /// Number of times tables were matched or unmatched.
    match_count: u32,
    /// Match count at the last synchronization.
    prev_match_count: Option<u32>,
    /// Pool for match monitors.
    monitors: MonitorAllocator,
    /// Set once monitors are in use.
    change_detection: bool,
    /// Topology version the matches were computed for.
    topology_version: Option<u64>,
}

impl QueryCache {
    pub(crate) fn new(monitors: MonitorAllocator) -> Self {
        Self {
            groups: Vec::new(),
            match_count: 0,
            prev_match_count: None,
            monitors,
            change_detection: false,
            topology_version: None,
        }
    }

    /// Groups, ascending by id.
    #[inline]
    #[must_use]
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// All primary matches, in iteration order.
    pub fn matches(&self) -> impl Iterator<Item = &Match> + '_ {
        self.groups.iter().flat_map(|group| group.matches.iter())
    }

    /// Number of times tables were matched or unmatched.
    #[inline]
    #[must_use]
    pub fn match_count(&self) -> u32 {
        self.match_count
    }

    /// Match count at the last synchronization, `None` before the first.
    #[inline]
    #[must_use]
    pub fn prev_match_count(&self) -> Option<u32> {
        self.prev_match_count
    }

    /// Whether match monitors are in use.
    #[inline]
    #[must_use]
    pub fn has_change_detection(&self) -> bool {
        self.change_detection
    }

    /// Pool holding the match monitors.
    #[inline]
    #[must_use]
    pub fn monitors(&self) -> &MonitorAllocator {
        &self.monitors
    }

    /// Cached match for a table.
    #[must_use]
    pub fn match_for(&self, table: TableId) -> Option<&Match> {
        self.matches().find(|matched| matched.table == Some(table))
    }

    // =========================================================================
    // Matching
    // =========================================================================

    /// Recomputes matches if the world's topology moved.
    ///
    /// Returns `true` if any match was added, replaced or removed.
    pub(crate) fn rematch(
        &mut self,
        world: &World,
        terms: &[Term],
        shape: &QueryShape,
        group_by: Option<Id>,
    ) -> bool {
        let version = world.topology_version();
        if self.topology_version == Some(version) {
            return false;
        }
        self.topology_version = Some(version);

        let fresh: Vec<(u64, Match)> = if shape.has_table_terms() {
            world
                .tables()
                .filter_map(|table| {
                    match_table(world, terms, shape, Some(table))
                        .map(|matched| (group_id(Some(table), group_by), matched))
                })
                .collect()
        } else {
            match_table(world, terms, shape, None)
                .map(|matched| (0, matched))
                .into_iter()
                .collect()
        };

        let mut group_counts: HashMap<u64, u32> = HashMap::new();
        let mut previous: HashMap<Option<TableId>, (u64, Match)> = HashMap::new();
        for group in self.groups.drain(..) {
            group_counts.insert(group.id, group.match_count);
            for matched in group.matches {
                previous.insert(matched.table, (group.id, matched));
            }
        }

        let mut next: BTreeMap<u64, Vec<Match>> = BTreeMap::new();
        let mut changes = 0u32;
        for (group, matched) in fresh {
            let kept = match previous.remove(&matched.table) {
                Some((old_group, old)) if old_group == group && old.same_layout(&matched) => old,
                Some((old_group, mut old)) => {
                    free_monitors(&mut self.monitors, &mut old);
                    bump(&mut group_counts, old_group);
                    if old_group != group {
                        bump(&mut group_counts, group);
                    }
                    changes += 1;
                    matched
                }
                None => {
                    bump(&mut group_counts, group);
                    changes += 1;
                    matched
                }
            };
            next.entry(group).or_default().push(kept);
        }
        for (_, (old_group, mut old)) in previous {
            free_monitors(&mut self.monitors, &mut old);
            bump(&mut group_counts, old_group);
            changes += 1;
        }

        self.groups = next
            .into_iter()
            .map(|(id, matches)| Group {
                id,
                match_count: group_counts.get(&id).copied().unwrap_or(0),
                matches,
            })
            .collect();
        self.match_count = self.match_count.wrapping_add(changes);

        if changes > 0 {
            tracing::debug!(
                "query cache rematched: {} groups, {} changes, match count {}",
                self.groups.len(),
                changes,
                self.match_count
            );
        }
        changes > 0
    }

    /// Positions of all matches whose table has rows.
    pub(crate) fn positions(&self, world: &World) -> Vec<MatchPos> {
        let mut positions = Vec::new();
        for (group, entry) in self.groups.iter().enumerate() {
            for (index, matched) in entry.matches.iter().enumerate() {
                if is_empty(world, matched) {
                    continue;
                }
                positions.push(MatchPos { group, index, sub: None });
                positions.extend(
                    (0..matched.wildcard_matches.len()).map(|sub| MatchPos {
                        group,
                        index,
                        sub: Some(sub),
                    }),
                );
            }
        }
        positions
    }

    /// Match at a position.
    pub(crate) fn match_at(&self, pos: MatchPos) -> Option<&Match> {
        let matched = self.groups.get(pos.group)?.matches.get(pos.index)?;
        match pos.sub {
            Some(sub) => matched.wildcard_matches.get(sub),
            None => Some(matched),
        }
    }

    /// Group id of the match at a position.
    pub(crate) fn group_id_at(&self, pos: MatchPos) -> u64 {
        self.groups.get(pos.group).map_or(0, Group::id)
    }

    // =========================================================================
    // Change Detection
    // =========================================================================

    /// Allocates a monitor for every match and turns change detection on.
    pub(crate) fn init_monitors(&mut self, world: &World, shape: &QueryShape) {
        let Self {
            groups, monitors, ..
        } = self;
        for matched in groups.iter_mut().flat_map(|group| group.matches.iter_mut()) {
            ensure_monitor(monitors, shape, world, matched);
            for sub in &mut matched.wildcard_matches {
                ensure_monitor(monitors, shape, world, sub);
            }
        }
        self.change_detection = true;
    }

    /// Checks the match count and every match monitor.
    pub(crate) fn check(&mut self, world: &World, shape: &QueryShape) -> bool {
        if self.prev_match_count != Some(self.match_count) {
            return true;
        }
        let Self {
            groups,
            monitors,
            change_detection,
            ..
        } = self;
        groups
            .iter_mut()
            .flat_map(|group| group.matches.iter_mut())
            .any(|matched| check_match(monitors, shape, world, matched, change_detection))
    }

    /// Checks the match of one table.
    ///
    /// Returns `false` if the table is not matched.
    pub(crate) fn check_table(
        &mut self,
        world: &World,
        shape: &QueryShape,
        table: TableId,
        scope: ChangeScope,
    ) -> bool {
        let Self {
            groups,
            monitors,
            change_detection,
            ..
        } = self;
        let Some(matched) = groups
            .iter_mut()
            .flat_map(|group| group.matches.iter_mut())
            .find(|matched| matched.table == Some(table))
        else {
            return false;
        };
        match scope {
            ChangeScope::All => check_match(monitors, shape, world, matched, change_detection),
            ChangeScope::Structure => {
                check_match_term(monitors, shape, world, matched, 0, change_detection)
            }
            ChangeScope::Field(field) => {
                check_match_term(monitors, shape, world, matched, field + 1, change_detection)
            }
        }
    }

    /// Checks the match at a position, seen through a batch's set fields.
    ///
    /// Only the located match is compared, not its wildcard siblings.
    pub(crate) fn check_at(
        &mut self,
        pos: MatchPos,
        world: &World,
        shape: &QueryShape,
        batch_fields: FieldSet,
    ) -> bool {
        let Self {
            groups,
            monitors,
            change_detection,
            ..
        } = self;
        match locate_mut(groups, pos) {
            Some(matched) => check_batch(
                monitors,
                shape,
                world,
                matched,
                batch_fields,
                change_detection,
            ),
            None => false,
        }
    }

    /// Synchronizes the monitor of the match at a position.
    pub(crate) fn sync_at(&mut self, pos: MatchPos, world: &World, shape: &QueryShape) {
        let Self {
            groups,
            monitors,
            change_detection,
            ..
        } = self;
        if let Some(matched) = locate_mut(groups, pos) {
            sync_match(monitors, shape, world, matched, *change_detection);
        }
        if self.change_detection {
            self.prev_match_count = Some(self.match_count);
        }
    }

    /// Completes a full pass: matches of empty tables are synchronized too.
    ///
    /// The match count is only acknowledged if the pass synchronized
    /// something or skipped nothing, so a pass of skipped batches leaves an
    /// unmatched table pending.
    pub(crate) fn finish_pass(&mut self, world: &World, shape: &QueryShape, skipped_any: bool) {
        if !self.change_detection {
            return;
        }
        let Self {
            groups, monitors, ..
        } = self;
        let mut synced = false;
        for matched in groups.iter_mut().flat_map(|group| group.matches.iter_mut()) {
            if !is_empty(world, matched) {
                continue;
            }
            sync_match(monitors, shape, world, matched, true);
            for sub in &mut matched.wildcard_matches {
                sync_match(monitors, shape, world, sub, true);
            }
            synced = true;
        }
        if synced || !skipped_any {
            self.prev_match_count = Some(self.match_count);
        }
    }
}

fn bump(counts: &mut HashMap<u64, u32>, group: u64) {
    let count = counts.entry(group).or_default();
    *count = count.wrapping_add(1);
}

fn is_empty(world: &World, matched: &Match) -> bool {
    matched
        .table
        .is_some_and(|table| world.table(table).map_or(true, Table::is_empty))
}

fn locate_mut(groups: &mut [Group], pos: MatchPos) -> Option<&mut Match> {
    let matched = groups.get_mut(pos.group)?.matches.get_mut(pos.index)?;
    match pos.sub {
        Some(sub) => matched.wildcard_matches.get_mut(sub),
        None => Some(matched),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_for(shape: &QueryShape) -> QueryCache {
        QueryCache::new(MonitorAllocator::new(shape.field_count() + 1, 8))
    }

    #[test]
    fn test_rematch_is_lazy() {
        let mut world = World::new();
        let position = world.component();
        let e = world.new_entity();
        world.add(e, position);

        let terms = [Term::new(position)];
        let shape = QueryShape::compile(&terms).unwrap();
        let mut cache = cache_for(&shape);

        assert!(cache.rematch(&world, &terms, &shape, None));
        assert_eq!(cache.match_count(), 1);
        assert!(!cache.rematch(&world, &terms, &shape, None));
    }

    #[test]
    fn test_unchanged_matches_keep_monitors() {
        let mut world = World::new();
        let position = world.component();
        let tag = world.tag();
        let a = world.new_entity();
        world.add(a, position);

        let terms = [Term::new(position).read()];
        let shape = QueryShape::compile(&terms).unwrap();
        let mut cache = cache_for(&shape);
        cache.rematch(&world, &terms, &shape, None);
        cache.init_monitors(&world, &shape);
        assert_eq!(cache.monitors().allocated_count(), 1);

        let b = world.new_entity();
        world.add(b, position);
        world.add(b, tag);
        assert!(cache.rematch(&world, &terms, &shape, None));
        assert_eq!(cache.match_count(), 2);
        assert_eq!(cache.matches().filter(|m| m.has_monitor()).count(), 1);
    }

    #[test]
    fn test_unmatched_tables_free_monitors() {
        let mut world = World::new();
        let position = world.component();
        let e = world.new_entity();
        world.add(e, position);
        let table = world.table_of(e).unwrap();

        let terms = [Term::new(position)];
        let shape = QueryShape::compile(&terms).unwrap();
        let mut cache = cache_for(&shape);
        cache.rematch(&world, &terms, &shape, None);
        cache.init_monitors(&world, &shape);

        world.remove(e, position);
        assert!(world.delete_table(table));
        cache.rematch(&world, &terms, &shape, None);

        assert_eq!(cache.matches().count(), 0);
        assert_eq!(cache.match_count(), 2);
        assert_eq!(cache.monitors().allocated_count(), 0);
    }

    #[test]
    fn test_groups_are_ordered() {
        let mut world = World::new();
        let position = world.component();
        let in_zone = world.new_entity();
        let zone_b = world.new_entity();
        let zone_a = world.new_entity();

        let e1 = world.new_entity();
        world.add(e1, position);
        world.add_pair(e1, in_zone, zone_a);
        let e2 = world.new_entity();
        world.add(e2, position);
        world.add_pair(e2, in_zone, zone_b);
        let e3 = world.new_entity();
        world.add(e3, position);

        let terms = [Term::new(position)];
        let shape = QueryShape::compile(&terms).unwrap();
        let mut cache = cache_for(&shape);
        cache.rematch(&world, &terms, &shape, Some(in_zone));

        let ids: Vec<u64> = cache.groups().iter().map(Group::id).collect();
        assert_eq!(ids, vec![0, zone_b.to_raw(), zone_a.to_raw()]);
        assert!(cache.groups().iter().all(|group| group.match_count() >= 1));
    }
}
