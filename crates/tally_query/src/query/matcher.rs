//! # Matching
//!
//! Evaluates a compiled query against a table. The result is a [`Match`]
//! recording, for every field, where its data lives. Wildcard terms can
//! produce several combinations: the first becomes the primary match, the
//! others its wildcard sub-matches.

use tally_core::{BlockHandle, Id};

use super::fields::{FieldSet, QueryShape};
use super::term::{Oper, Source, Term};
use crate::world::{Table, TableId, World};

/// Longest relationship chain followed when resolving upward terms.
const MAX_UP_DEPTH: usize = 32;

/// Where the data of one field lives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FieldSource {
    /// The field did not match (optional or negated term).
    #[default]
    Unset,
    /// Owned by the matched table, at this type index.
    Owned {
        /// Position of the matched id in the table type.
        type_index: usize,
    },
    /// Inherited from an ancestor entity.
    Shared {
        /// Ancestor holding the id.
        source: Id,
        /// Concrete id found on the ancestor.
        component: Id,
    },
    /// Held by a fixed entity named in the query.
    Fixed {
        /// The fixed entity.
        source: Id,
        /// Concrete id found on the entity.
        component: Id,
    },
}

impl FieldSource {
    /// Entity holding the data when it is not the matched table.
    #[must_use]
    pub fn remote(self) -> Option<(Id, Id)> {
        match self {
            Self::Shared { source, component } | Self::Fixed { source, component } => {
                Some((source, component))
            }
            Self::Unset | Self::Owned { .. } => None,
        }
    }
}

/// The evaluation of a query against one table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Match {
    /// Matched table; `None` for queries without table terms.
    pub(crate) table: Option<TableId>,
    /// Fields that resolved to a source.
    pub(crate) set_fields: FieldSet,
    /// Source per field.
    pub(crate) fields: Vec<FieldSource>,
    /// Change monitor, allocated lazily.
    pub(crate) monitor: Option<BlockHandle>,
    /// Additional wildcard combinations for the same table.
    pub(crate) wildcard_matches: Vec<Match>,
}

impl Match {
    fn new(table: Option<TableId>, fields: Vec<FieldSource>) -> Self {
        let mut set_fields = FieldSet::EMPTY;
        for (field, source) in fields.iter().enumerate() {
            if *source != FieldSource::Unset {
                set_fields.insert(field);
            }
        }
        Self {
            table,
            set_fields,
            fields,
            monitor: None,
            wildcard_matches: Vec::new(),
        }
    }

    /// Matched table.
    #[inline]
    #[must_use]
    pub fn table(&self) -> Option<TableId> {
        self.table
    }

    /// Fields that resolved to a source.
    #[inline]
    #[must_use]
    pub fn set_fields(&self) -> FieldSet {
        self.set_fields
    }

    /// Source of a field.
    #[inline]
    #[must_use]
    pub fn field_source(&self, field: usize) -> FieldSource {
        self.fields.get(field).copied().unwrap_or_default()
    }

    /// Whether a change monitor has been allocated.
    #[inline]
    #[must_use]
    pub fn has_monitor(&self) -> bool {
        self.monitor.is_some()
    }

    /// Additional wildcard combinations.
    #[inline]
    #[must_use]
    pub fn wildcard_matches(&self) -> &[Match] {
        &self.wildcard_matches
    }

    /// Checks if two matches resolve every field the same way.
    #[must_use]
    pub fn same_layout(&self, other: &Self) -> bool {
        self.table == other.table
            && self.set_fields == other.set_fields
            && self.fields == other.fields
            && self.wildcard_matches.len() == other.wildcard_matches.len()
            && self
                .wildcard_matches
                .iter()
                .zip(&other.wildcard_matches)
                .all(|(a, b)| a.same_layout(b))
    }
}

/// Evaluates the terms against a table.
///
/// # Arguments
///
/// * `world` - World providing fixed and upward sources
/// * `terms` - Compiled terms
/// * `shape` - Field layout of the terms
/// * `table` - Table to match, `None` for queries without table terms
///
/// Returns `None` if the table does not match.
pub(crate) fn match_table(
    world: &World,
    terms: &[Term],
    shape: &QueryShape,
    table: Option<&Table>,
) -> Option<Match> {
    let field_count = shape.field_count();
    let mut candidates: Vec<Vec<FieldSource>> = vec![Vec::new(); field_count];
    let mut resolved = vec![false; field_count];

    for (index, term) in terms.iter().enumerate() {
        let field = shape.term_field(index);
        if resolved[field] {
            continue;
        }
        let found = resolve_term(world, table, term);
        match term.oper {
            Oper::Not => {
                if !found.is_empty() {
                    return None;
                }
                resolved[field] = true;
            }
            Oper::Optional => {
                resolved[field] = true;
                candidates[field] = found;
            }
            Oper::And => {
                if found.is_empty() {
                    return None;
                }
                resolved[field] = true;
                candidates[field] = found;
            }
            Oper::Or => {
                if !found.is_empty() {
                    resolved[field] = true;
                    candidates[field] = found;
                }
            }
        }
    }

    let mut combinations: Vec<Vec<FieldSource>> = vec![Vec::with_capacity(field_count)];
    for options in candidates {
        let options = if options.is_empty() {
            vec![FieldSource::Unset]
        } else {
            options
        };
        combinations = combinations
            .into_iter()
            .flat_map(|prefix| {
                options.iter().map(move |option| {
                    let mut fields = prefix.clone();
                    fields.push(*option);
                    fields
                })
            })
            .collect();
    }

    let table_id = table.map(Table::id);
    let mut matches = combinations
        .into_iter()
        .map(|fields| Match::new(table_id, fields));
    let mut primary = matches.next()?;
    primary.wildcard_matches = matches.collect();
    Some(primary)
}

/// Group of a table: the raw target of `relationship`, or 0.
pub(crate) fn group_id(table: Option<&Table>, relationship: Option<Id>) -> u64 {
    match (table, relationship) {
        (Some(table), Some(relationship)) => table
            .relationship_target(relationship)
            .map_or(0, Id::to_raw),
        _ => 0,
    }
}

/// All sources a single term resolves to.
fn resolve_term(world: &World, table: Option<&Table>, term: &Term) -> Vec<FieldSource> {
    match term.src {
        Source::This => table
            .map(|table| {
                table
                    .type_indices_matching(term.id)
                    .map(|type_index| FieldSource::Owned { type_index })
                    .collect()
            })
            .unwrap_or_default(),
        Source::Entity(source) => find_on(world, source, term.id)
            .map(|component| FieldSource::Fixed { source, component })
            .into_iter()
            .collect(),
        Source::Up(relationship) => table
            .and_then(|table| find_up(world, table, relationship, term.id))
            .map(|(source, component)| FieldSource::Shared { source, component })
            .into_iter()
            .collect(),
    }
}

/// First id of an entity's type matched by `pattern`.
pub(crate) fn find_on(world: &World, entity: Id, pattern: Id) -> Option<Id> {
    let table = world.table(world.table_of(entity)?)?;
    let type_index = table.type_indices_matching(pattern).next()?;
    table.type_ids().get(type_index).copied()
}

/// Nearest ancestor along `relationship` that has an id matched by `pattern`.
fn find_up(world: &World, table: &Table, relationship: Id, pattern: Id) -> Option<(Id, Id)> {
    let mut current = table;
    for _ in 0..MAX_UP_DEPTH {
        let target = world.current(current.relationship_target(relationship)?)?;
        let next = world.table(world.table_of(target)?)?;
        if let Some(type_index) = next.type_indices_matching(pattern).next() {
            return Some((target, next.type_ids()[type_index]));
        }
        current = next;
    }
    tracing::warn!(
        "relationship chain deeper than {} while resolving {}",
        MAX_UP_DEPTH,
        pattern
    );
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(terms: &[Term]) -> QueryShape {
        QueryShape::compile(terms).unwrap()
    }

    fn table_of(world: &World, entity: Id) -> &Table {
        world.table(world.table_of(entity).unwrap()).unwrap()
    }

    #[test]
    fn test_and_not_optional() {
        let mut world = World::new();
        let a = world.component();
        let b = world.component();
        let c = world.component();
        let e = world.new_entity();
        world.add(e, a);
        world.add(e, b);

        let terms = [Term::new(a), Term::new(c).optional(), Term::new(b).negate()];
        assert!(match_table(&world, &terms, &compile(&terms), Some(table_of(&world, e))).is_none());

        let terms = [Term::new(a), Term::new(c).optional(), Term::new(b)];
        let m = match_table(&world, &terms, &compile(&terms), Some(table_of(&world, e))).unwrap();
        assert!(m.set_fields().contains(0));
        assert!(!m.set_fields().contains(1));
        assert_eq!(m.field_source(1), FieldSource::Unset);
        assert!(matches!(m.field_source(2), FieldSource::Owned { .. }));
    }

    #[test]
    fn test_or_takes_first_present() {
        let mut world = World::new();
        let a = world.component();
        let b = world.component();
        let e = world.new_entity();
        world.add(e, b);

        let terms = [Term::new(a).or(), Term::new(b)];
        let table = table_of(&world, e);
        let m = match_table(&world, &terms, &compile(&terms), Some(table)).unwrap();
        assert_eq!(
            m.field_source(0),
            FieldSource::Owned { type_index: table.type_index_of(b).unwrap() }
        );
    }

    #[test]
    fn test_wildcard_produces_sub_matches() {
        let mut world = World::new();
        let likes = world.new_entity();
        let alice = world.new_entity();
        let bob = world.new_entity();
        let e = world.new_entity();
        world.add_pair(e, likes, alice);
        world.add_pair(e, likes, bob);

        let terms = [Term::pair(likes, Id::WILDCARD)];
        let m = match_table(&world, &terms, &compile(&terms), Some(table_of(&world, e))).unwrap();
        assert_eq!(m.wildcard_matches().len(), 1);
        assert_ne!(m.field_source(0), m.wildcard_matches()[0].field_source(0));
    }

    #[test]
    fn test_up_walks_the_chain() {
        let mut world = World::new();
        let child_of = world.new_entity();
        let transform = world.component();
        let marker = world.component();
        let root = world.new_entity();
        world.add(root, transform);
        let middle = world.new_entity();
        world.add_pair(middle, child_of, root);
        let leaf = world.new_entity();
        world.add(leaf, marker);
        world.add_pair(leaf, child_of, middle);

        let terms = [Term::new(marker), Term::new(transform).up(child_of)];
        let table = table_of(&world, leaf);
        let m = match_table(&world, &terms, &compile(&terms), Some(table)).unwrap();
        assert_eq!(
            m.field_source(1),
            FieldSource::Shared { source: root, component: transform }
        );
    }

    #[test]
    fn test_fixed_source_without_table() {
        let mut world = World::new();
        let config = world.component();
        let settings = world.new_entity();
        world.add(settings, config);

        let terms = [Term::new(config).on(settings)];
        let m = match_table(&world, &terms, &compile(&terms), None).unwrap();
        assert_eq!(m.table(), None);
        assert_eq!(
            m.field_source(0),
            FieldSource::Fixed { source: settings, component: config }
        );

        world.remove(settings, config);
        assert!(match_table(&world, &terms, &compile(&terms), None).is_none());
    }
}
