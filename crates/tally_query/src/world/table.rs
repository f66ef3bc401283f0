//! # Tables
//!
//! A table stores every entity that has exactly the same set of ids. Ids
//! that carry data own a column; tags do not.
//!
//! Each table keeps a dirty-state vector: slot 0 counts structural changes
//! (rows added or removed), slot `c + 1` counts writes to column `c`.
//! Counters only move forward and wrap on overflow.

use tally_core::Id;

/// Generational handle of a table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableId(pub(crate) Id);

impl TableId {
    /// Returns the underlying id.
    #[inline]
    #[must_use]
    pub const fn id(self) -> Id {
        self.0
    }
}

impl std::fmt::Display for TableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "table {}", self.0)
    }
}

/// A physical column inside a specific table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TableColumn {
    /// Table owning the column.
    pub table: TableId,
    /// Column index inside the table.
    pub column: usize,
}

/// Storage for all entities of one type.
#[derive(Clone, Debug, Default)]
pub struct Table {
    /// Handle of this table.
    id: TableId,
    /// Sorted ids making up the type.
    type_ids: Vec<Id>,
    /// Column per type index; `None` for tags.
    column_map: Vec<Option<usize>>,
    /// Number of data columns.
    column_count: usize,
    /// Entity per row.
    entities: Vec<Id>,
    /// Structural counter followed by one counter per column.
    dirty_state: Vec<u32>,
}

impl Table {
    /// Creates an empty table for a sorted type.
    ///
    /// # Arguments
    ///
    /// * `id` - Handle of the new table
    /// * `type_ids` - Sorted, deduplicated ids of the type
    /// * `has_data` - Decides whether an id owns a column
    pub(crate) fn new(id: TableId, type_ids: Vec<Id>, has_data: impl Fn(Id) -> bool) -> Self {
        debug_assert!(type_ids.windows(2).all(|w| w[0] < w[1]), "type must be sorted");

        let mut column_count = 0;
        let column_map = type_ids
            .iter()
            .map(|&type_id| {
                has_data(type_id).then(|| {
                    column_count += 1;
                    column_count - 1
                })
            })
            .collect();

        Self {
            id,
            type_ids,
            column_map,
            column_count,
            entities: Vec::new(),
            dirty_state: vec![0; column_count + 1],
        }
    }

    /// Handle of this table.
    #[inline]
    #[must_use]
    pub fn id(&self) -> TableId {
        self.id
    }

    /// Sorted ids making up the type.
    #[inline]
    #[must_use]
    pub fn type_ids(&self) -> &[Id] {
        &self.type_ids
    }

    /// Number of rows.
    #[inline]
    #[must_use]
    pub fn count(&self) -> usize {
        self.entities.len()
    }

    /// Checks if the table has no rows.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entity per row.
    #[inline]
    #[must_use]
    pub fn entities(&self) -> &[Id] {
        &self.entities
    }

    /// Number of data columns.
    #[inline]
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.column_count
    }

    /// Column per type index, `None` for tags.
    #[inline]
    #[must_use]
    pub fn column_map(&self) -> &[Option<usize>] {
        &self.column_map
    }

    /// Dirty-state counters: structural first, then one per column.
    #[inline]
    #[must_use]
    pub fn dirty_state(&self) -> &[u32] {
        &self.dirty_state
    }

    /// Position of an exact id in the type.
    #[must_use]
    pub fn type_index_of(&self, id: Id) -> Option<usize> {
        self.type_ids.binary_search(&id).ok()
    }

    /// Positions of all type ids matched by `pattern`, in type order.
    pub fn type_indices_matching(&self, pattern: Id) -> impl Iterator<Item = usize> + '_ {
        self.type_ids
            .iter()
            .enumerate()
            .filter(move |(_, id)| id.matches(pattern))
            .map(|(index, _)| index)
    }

    /// Column of a type index, `None` for tags.
    #[inline]
    #[must_use]
    pub fn column(&self, type_index: usize) -> Option<usize> {
        self.column_map.get(type_index).copied().flatten()
    }

    /// Column of an exact id, `None` if absent or a tag.
    #[must_use]
    pub fn column_of(&self, id: Id) -> Option<usize> {
        self.type_index_of(id).and_then(|type_index| self.column(type_index))
    }

    /// Target of the first `(relationship, target)` pair in the type.
    ///
    /// The target comes back with generation 0.
    #[must_use]
    pub fn relationship_target(&self, relationship: Id) -> Option<Id> {
        self.type_ids
            .iter()
            .find(|id| id.is_pair() && id.first().index() == relationship.index())
            .map(|id| id.second())
    }

    // =========================================================================
    // Mutation (world only)
    // =========================================================================

    /// Counts a structural change.
    pub(crate) fn mark_structural(&mut self) {
        self.dirty_state[0] = self.dirty_state[0].wrapping_add(1);
    }

    /// Counts a write to a column.
    pub(crate) fn mark_column(&mut self, column: usize) {
        debug_assert!(column < self.column_count, "column {} out of range", column);
        if let Some(counter) = self.dirty_state.get_mut(column + 1) {
            *counter = counter.wrapping_add(1);
        }
    }

    /// Appends an entity and returns its row.
    pub(crate) fn push(&mut self, entity: Id) -> usize {
        self.entities.push(entity);
        self.entities.len() - 1
    }

    /// Removes a row by swapping in the last one.
    ///
    /// Returns the entity that now occupies `row`, if any moved.
    pub(crate) fn swap_remove(&mut self, row: usize) -> Option<Id> {
        self.entities.swap_remove(row);
        self.entities.get(row).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(ids: &[Id], data: &[Id]) -> Table {
        Table::new(TableId(Id::new(1, 0)), ids.to_vec(), |id| data.contains(&id))
    }

    #[test]
    fn test_column_map_skips_tags() {
        let a = Id::new(10, 0);
        let tag = Id::new(11, 0);
        let b = Id::new(12, 0);
        let t = table(&[a, tag, b], &[a, b]);

        assert_eq!(t.column_count(), 2);
        assert_eq!(t.column_of(a), Some(0));
        assert_eq!(t.column_of(tag), None);
        assert_eq!(t.column_of(b), Some(1));
        assert_eq!(t.dirty_state(), &[0, 0, 0]);
    }

    #[test]
    fn test_counters_wrap() {
        let a = Id::new(10, 0);
        let mut t = table(&[a], &[a]);
        t.dirty_state[1] = u32::MAX;
        t.mark_column(0);
        t.mark_structural();
        assert_eq!(t.dirty_state(), &[1, 0]);
    }

    #[test]
    fn test_swap_remove_reports_moved_entity() {
        let mut t = table(&[], &[]);
        let e1 = Id::new(1, 0);
        let e2 = Id::new(2, 0);
        let e3 = Id::new(3, 0);
        t.push(e1);
        t.push(e2);
        t.push(e3);

        assert_eq!(t.swap_remove(0), Some(e3));
        assert_eq!(t.entities(), &[e3, e2]);
        assert_eq!(t.swap_remove(1), None);
    }

    #[test]
    fn test_relationship_target() {
        let child_of = Id::new(20, 0);
        let parent = Id::new(30, 4);
        let pair = Id::pair(child_of, parent);
        let t = table(&[Id::new(5, 0), pair], &[]);

        assert_eq!(t.relationship_target(child_of), Some(Id::new(30, 0)));
        assert_eq!(t.relationship_target(Id::new(21, 0)), None);
        assert_eq!(t.type_indices_matching(Id::pair(child_of, Id::WILDCARD)).count(), 1);
    }
}
