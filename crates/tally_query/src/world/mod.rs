//! # World
//!
//! Owns the entity index and the tables. Entities live in exactly one table
//! (or none while their type is empty); adding or removing an id moves the
//! entity to the table of its new type.
//!
//! ## Change bookkeeping
//!
//! - Moving a row counts a structural change on both tables involved
//! - [`World::modified`] counts a write to one column
//! - Every table or row movement bumps the topology version, which caches
//!   use to decide when to rematch

mod table;

pub use table::{Table, TableColumn, TableId};

use std::collections::{HashMap, HashSet};

use tally_core::{Id, KernelConfig, SparseSet};

/// Where an entity is stored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Record {
    /// Table holding the entity, `None` while its type is empty.
    pub table: Option<TableId>,
    /// Row inside the table.
    pub row: usize,
}

/// Entity index plus table storage.
pub struct World {
    /// Generational entity index.
    entities: SparseSet<Record>,
    /// Generational table index.
    tables: SparseSet<Table>,
    /// Table per sorted type.
    table_index: HashMap<Vec<Id>, TableId>,
    /// Indices of ids registered as data components.
    data_ids: HashSet<u32>,
    /// Bumped whenever tables or table membership change.
    topology_version: u64,
    /// Kernel tuning.
    config: KernelConfig,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entities", &self.entities.count())
            .field("tables", &self.tables.count())
            .field("topology_version", &self.topology_version)
            .finish()
    }
}

impl World {
    /// Creates an empty world with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(KernelConfig::default())
    }

    /// Creates an empty world.
    ///
    /// # Arguments
    ///
    /// * `config` - Sizing for the entity index and the monitor pools
    #[must_use]
    pub fn with_config(config: KernelConfig) -> Self {
        tracing::info!(
            "creating world (dense capacity {}, monitor chunk {})",
            config.sparse.dense_capacity,
            config.monitors.blocks_per_chunk
        );
        Self {
            entities: SparseSet::from_config(&config.sparse),
            tables: SparseSet::new(),
            table_index: HashMap::new(),
            data_ids: HashSet::new(),
            topology_version: 0,
            config,
        }
    }

    /// Kernel configuration the world was created with.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    // =========================================================================
    // Entities
    // =========================================================================

    /// Creates an entity with an empty type.
    pub fn new_entity(&mut self) -> Id {
        self.entities.new_id()
    }

    /// Creates an entity that is registered as a data component.
    ///
    /// Tables give such ids (and pairs using them as relationship) a column.
    pub fn component(&mut self) -> Id {
        let id = self.entities.new_id();
        self.data_ids.insert(id.index());
        id
    }

    /// Creates an entity meant to be used as a tag.
    ///
    /// Tags never own a column, so writes to them are not counted.
    pub fn tag(&mut self) -> Id {
        self.new_entity()
    }

    /// Makes an explicit id alive.
    ///
    /// Returns `true` if the id was not alive before.
    pub fn make_alive(&mut self, id: Id) -> bool {
        self.entities.ensure(id).1
    }

    /// Checks if an id is alive with a matching generation.
    #[inline]
    #[must_use]
    pub fn is_alive(&self, id: Id) -> bool {
        self.entities.is_alive(id)
    }

    /// Alive id (with its current generation) for an index.
    #[must_use]
    pub fn current(&self, id: Id) -> Option<Id> {
        self.entities.current(id)
    }

    /// Number of alive entities.
    #[inline]
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.count()
    }

    /// Deletes an entity, removing it from its table.
    ///
    /// Returns `false` if the id was not alive.
    pub fn delete(&mut self, entity: Id) -> bool {
        let Some(record) = self.entities.try_get(entity).copied() else {
            return false;
        };
        self.move_entity(entity, record, None);
        self.data_ids.remove(&entity.index());
        self.entities.remove(entity);
        true
    }

    /// Where an entity is stored.
    #[must_use]
    pub fn record(&self, entity: Id) -> Option<Record> {
        self.entities.try_get(entity).copied()
    }

    /// Table of an entity, if it is alive and has a non-empty type.
    #[must_use]
    pub fn table_of(&self, entity: Id) -> Option<TableId> {
        self.record(entity)?.table
    }

    // =========================================================================
    // Type Changes
    // =========================================================================

    /// Adds an id to an entity.
    ///
    /// Returns `true` if the entity moved to a new table, `false` if it
    /// already had the id or is not alive.
    pub fn add(&mut self, entity: Id, id: Id) -> bool {
        let Some(record) = self.record(entity) else {
            return false;
        };
        let mut type_ids = self.type_of(record);
        let Err(position) = type_ids.binary_search(&id) else {
            return false;
        };
        type_ids.insert(position, id);
        let destination = self.table_for(&type_ids);
        self.move_entity(entity, record, Some(destination));
        true
    }

    /// Adds a `(relationship, target)` pair to an entity.
    pub fn add_pair(&mut self, entity: Id, relationship: Id, target: Id) -> bool {
        self.add(entity, Id::pair(relationship, target))
    }

    /// Removes an id from an entity.
    ///
    /// Returns `true` if the entity moved to a new table.
    pub fn remove(&mut self, entity: Id, id: Id) -> bool {
        let Some(record) = self.record(entity) else {
            return false;
        };
        let mut type_ids = self.type_of(record);
        let Ok(position) = type_ids.binary_search(&id) else {
            return false;
        };
        type_ids.remove(position);
        let destination = (!type_ids.is_empty()).then(|| self.table_for(&type_ids));
        self.move_entity(entity, record, destination);
        true
    }

    /// Checks if an entity has an exact id.
    #[must_use]
    pub fn has(&self, entity: Id, id: Id) -> bool {
        self.table_of(entity)
            .and_then(|table| self.tables.try_get(table.0))
            .is_some_and(|table| table.type_index_of(id).is_some())
    }

    /// Counts a write to the column of `id` in the entity's table.
    ///
    /// Returns `false` if the entity does not own a column for `id`.
    pub fn modified(&mut self, entity: Id, id: Id) -> bool {
        let Some(column) = self.column_of(entity, id) else {
            return false;
        };
        self.mark_column(column);
        true
    }

    // =========================================================================
    // Tables
    // =========================================================================

    /// Table by handle.
    #[must_use]
    pub fn table(&self, table: TableId) -> Option<&Table> {
        self.tables.try_get(table.0)
    }

    /// All tables, in creation order (modulo deletions).
    pub fn tables(&self) -> impl Iterator<Item = &Table> + '_ {
        self.tables.iter().map(|(_, table)| table)
    }

    /// Number of tables.
    #[inline]
    #[must_use]
    pub fn table_count(&self) -> usize {
        self.tables.count()
    }

    /// Dirty-state counters of a table.
    #[must_use]
    pub fn dirty_state(&self, table: TableId) -> Option<&[u32]> {
        self.table(table).map(Table::dirty_state)
    }

    /// Resolves the column holding `id` for an entity.
    #[must_use]
    pub fn column_of(&self, entity: Id, id: Id) -> Option<TableColumn> {
        let table = self.table_of(entity)?;
        let column = self.table(table)?.column_of(id)?;
        Some(TableColumn { table, column })
    }

    /// Current value of a column's dirty counter.
    #[must_use]
    pub fn column_counter(&self, column: TableColumn) -> Option<u32> {
        self.dirty_state(column.table)?.get(column.column + 1).copied()
    }

    /// Finds or creates the table for a type.
    ///
    /// The type is sorted and deduplicated before lookup.
    pub fn table_for(&mut self, type_ids: &[Id]) -> TableId {
        let mut key = type_ids.to_vec();
        key.sort_unstable();
        key.dedup();
        if let Some(&table) = self.table_index.get(&key) {
            return table;
        }

        let data_ids = &self.data_ids;
        let has_data = |id: Id| {
            let owner = if id.is_pair() { id.first() } else { id };
            data_ids.contains(&owner.index())
        };
        let (id, slot) = self.tables.add();
        let table_id = TableId(id);
        *slot = Table::new(table_id, key.clone(), has_data);

        tracing::debug!(
            "created {} with {} ids and {} columns",
            table_id,
            key.len(),
            slot.column_count()
        );
        self.table_index.insert(key, table_id);
        self.topology_version += 1;
        table_id
    }

    /// Deletes an empty table.
    ///
    /// Returns `false` if the table is not alive or still has rows.
    pub fn delete_table(&mut self, table: TableId) -> bool {
        match self.table(table) {
            Some(t) if t.is_empty() => {}
            _ => return false,
        }
        if let Some(t) = self.tables.remove(table.0) {
            self.table_index.remove(t.type_ids());
        }
        tracing::debug!("deleted {}", table);
        self.topology_version += 1;
        true
    }

    /// Version that changes whenever tables or table membership change.
    #[inline]
    #[must_use]
    pub fn topology_version(&self) -> u64 {
        self.topology_version
    }

    /// Counts a write to a resolved column.
    pub(crate) fn mark_column(&mut self, column: TableColumn) {
        if let Some(table) = self.tables.try_get_mut(column.table.0) {
            table.mark_column(column.column);
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn type_of(&self, record: Record) -> Vec<Id> {
        record
            .table
            .and_then(|table| self.table(table))
            .map(|table| table.type_ids().to_vec())
            .unwrap_or_default()
    }

    /// Moves an entity from its current table to `destination`.
    fn move_entity(&mut self, entity: Id, record: Record, destination: Option<TableId>) {
        if let Some(source) = record.table {
            if let Some(table) = self.tables.try_get_mut(source.0) {
                let moved = table.swap_remove(record.row);
                table.mark_structural();
                if let Some(moved) = moved {
                    if let Some(moved_record) = self.entities.try_get_mut(moved) {
                        moved_record.row = record.row;
                    }
                }
            }
        }

        let mut next = Record::default();
        if let Some(destination) = destination {
            if let Some(table) = self.tables.try_get_mut(destination.0) {
                next.row = table.push(entity);
                next.table = Some(destination);
                table.mark_structural();
            }
        }
        if let Some(slot) = self.entities.try_get_mut(entity) {
            *slot = next;
        }
        self.topology_version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_moves_between_tables() {
        let mut world = World::new();
        let position = world.component();
        let velocity = world.component();
        let e = world.new_entity();

        assert!(world.add(e, position));
        let first = world.table_of(e).unwrap();
        assert!(world.add(e, velocity));
        let second = world.table_of(e).unwrap();

        assert_ne!(first, second);
        assert!(world.table(first).unwrap().is_empty());
        assert_eq!(world.table(second).unwrap().entities(), &[e]);
        assert!(world.has(e, position));
        assert!(world.has(e, velocity));
        assert!(!world.add(e, position));
    }

    #[test]
    fn test_moves_count_structural_changes_on_both_tables() {
        let mut world = World::new();
        let position = world.component();
        let tag = world.tag();
        let e = world.new_entity();
        world.add(e, position);
        let first = world.table_of(e).unwrap();
        assert_eq!(world.dirty_state(first).unwrap()[0], 1);

        world.add(e, tag);
        let second = world.table_of(e).unwrap();
        assert_eq!(world.dirty_state(first).unwrap()[0], 2);
        assert_eq!(world.dirty_state(second).unwrap()[0], 1);
    }

    #[test]
    fn test_swap_remove_fixes_moved_record() {
        let mut world = World::new();
        let position = world.component();
        let a = world.new_entity();
        let b = world.new_entity();
        world.add(a, position);
        world.add(b, position);
        assert_eq!(world.record(b).unwrap().row, 1);

        assert!(world.delete(a));
        assert_eq!(world.record(b).unwrap().row, 0);
        assert!(!world.is_alive(a));
        assert!(!world.delete(a));
    }

    #[test]
    fn test_modified_bumps_only_its_column() {
        let mut world = World::new();
        let position = world.component();
        let velocity = world.component();
        let tag = world.tag();
        let e = world.new_entity();
        world.add(e, position);
        world.add(e, velocity);
        world.add(e, tag);
        let table = world.table_of(e).unwrap();
        let before = world.dirty_state(table).unwrap().to_vec();

        assert!(world.modified(e, velocity));
        assert!(!world.modified(e, tag));
        let after = world.dirty_state(table).unwrap();
        let column = world.column_of(e, velocity).unwrap().column;

        assert_eq!(after[0], before[0]);
        assert_eq!(after[column + 1], before[column + 1] + 1);
        assert_eq!(after.iter().sum::<u32>(), before.iter().sum::<u32>() + 1);
    }

    #[test]
    fn test_pairs_use_relationship_data() {
        let mut world = World::new();
        let likes = world.new_entity();
        let owes = world.component();
        let bob = world.new_entity();
        let e = world.new_entity();
        world.add_pair(e, likes, bob);
        world.add_pair(e, owes, bob);

        assert!(world.column_of(e, Id::pair(likes, bob)).is_none());
        assert!(world.column_of(e, Id::pair(owes, bob)).is_some());
    }

    #[test]
    fn test_delete_table_requires_empty() {
        let mut world = World::new();
        let position = world.component();
        let e = world.new_entity();
        world.add(e, position);
        let table = world.table_of(e).unwrap();

        assert!(!world.delete_table(table));
        world.remove(e, position);
        assert_eq!(world.table_of(e), None);
        let version = world.topology_version();
        assert!(world.delete_table(table));
        assert!(world.table(table).is_none());
        assert!(world.topology_version() > version);

        world.add(e, position);
        assert_ne!(world.table_of(e), Some(table));
    }
}
