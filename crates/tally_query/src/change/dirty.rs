//! # Dirty Marking
//!
//! Iteration counts writes on behalf of the query: every batch bumps the
//! counters of the columns it declares to write, and the end of a pass
//! bumps the columns written on fixed entities.

use super::monitor::{resolve_field, FieldColumns};
use crate::query::{find_on, FieldSet, FieldSource, QueryShape, Source, Term};
use crate::world::World;

/// Bumps the counter of every column a batch writes.
///
/// Fixed fields, unset fields, tags and read-only shared fields are skipped.
/// Each written field is counted once.
pub(crate) fn mark_fields_dirty(world: &mut World, shape: &QueryShape, view: &impl FieldColumns) {
    let written = shape.write_fields() & !shape.fixed_fields() & view.set_fields();
    for field in written.iter() {
        let source = view.field_source(field);
        let column = match source {
            FieldSource::Owned { .. } => resolve_field(world, view.table(), source),
            FieldSource::Shared { .. } if !shape.shared_readonly_fields().contains(field) => {
                resolve_field(world, view.table(), source)
            }
            FieldSource::Shared { .. } | FieldSource::Fixed { .. } | FieldSource::Unset => None,
        };
        if let Some(column) = column {
            tracing::trace!(
                "field {} marked {} column {} dirty",
                field,
                column.table,
                column.column
            );
            world.mark_column(column);
        }
    }
}

/// Bumps the counter of every written column on a fixed entity.
pub(crate) fn mark_fixed_fields_dirty(world: &mut World, terms: &[Term], shape: &QueryShape) {
    let written = shape.write_fields() & shape.fixed_fields();
    if written.is_empty() {
        return;
    }

    let mut marked = FieldSet::EMPTY;
    for (index, term) in terms.iter().enumerate() {
        let field = shape.term_field(index);
        if !written.contains(field) || marked.contains(field) {
            continue;
        }
        let Source::Entity(source) = term.src else {
            continue;
        };
        let column = find_on(world, source, term.id)
            .and_then(|component| world.column_of(source, component));
        if let Some(column) = column {
            world.mark_column(column);
            marked.insert(field);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{match_table, Match};
    use tally_core::Id;

    fn matched(world: &World, terms: &[Term], shape: &QueryShape, entity: Id) -> Match {
        let table = world.table(world.table_of(entity).unwrap()).unwrap();
        match_table(world, terms, shape, Some(table)).unwrap()
    }

    #[test]
    fn test_only_written_columns_are_marked() {
        let mut world = World::new();
        let read = world.component();
        let written = world.component();
        let entity = world.new_entity();
        world.add(entity, read);
        world.add(entity, written);

        let terms = [Term::new(read).read(), Term::new(written)];
        let shape = QueryShape::compile(&terms).unwrap();
        let m = matched(&world, &terms, &shape, entity);
        let before = world.dirty_state(m.table().unwrap()).unwrap().to_vec();

        mark_fields_dirty(&mut world, &shape, &m);
        let after = world.dirty_state(m.table().unwrap()).unwrap();
        let read_column = world.column_of(entity, read).unwrap().column;
        let written_column = world.column_of(entity, written).unwrap().column;

        assert_eq!(after[0], before[0]);
        assert_eq!(after[read_column + 1], before[read_column + 1]);
        assert_eq!(after[written_column + 1], before[written_column + 1] + 1);
    }

    #[test]
    fn test_shared_fields_need_explicit_write() {
        let mut world = World::new();
        let child_of = world.new_entity();
        let transform = world.component();
        let parent = world.new_entity();
        world.add(parent, transform);
        let child = world.new_entity();
        world.add_pair(child, child_of, parent);

        let column = world.column_of(parent, transform).unwrap();
        let readonly = [Term::new(transform).up(child_of)];
        let shape = QueryShape::compile(&readonly).unwrap();
        let m = matched(&world, &readonly, &shape, child);
        mark_fields_dirty(&mut world, &shape, &m);
        assert_eq!(world.column_counter(column), Some(0));

        let writing = [Term::new(transform).up(child_of).read_write()];
        let shape = QueryShape::compile(&writing).unwrap();
        let m = matched(&world, &writing, &shape, child);
        mark_fields_dirty(&mut world, &shape, &m);
        assert_eq!(world.column_counter(column), Some(1));
    }

    #[test]
    fn test_fixed_writes_are_marked_separately() {
        let mut world = World::new();
        let position = world.component();
        let counter = world.component();
        let stats = world.new_entity();
        world.add(stats, counter);
        let entity = world.new_entity();
        world.add(entity, position);

        let terms = [Term::new(position).read(), Term::new(counter).on(stats).write()];
        let shape = QueryShape::compile(&terms).unwrap();
        let m = matched(&world, &terms, &shape, entity);
        let column = world.column_of(stats, counter).unwrap();

        mark_fields_dirty(&mut world, &shape, &m);
        assert_eq!(world.column_counter(column), Some(0));

        mark_fixed_fields_dirty(&mut world, &terms, &shape);
        assert_eq!(world.column_counter(column), Some(1));
    }
}
