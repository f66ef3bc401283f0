//! # Fixed-Source Monitor
//!
//! Fields resolved on fixed entities do not depend on the matched table, so
//! they are tracked once per query instead of once per match.

use super::monitor::TrackState;
use crate::query::{find_on, FieldSet, QueryShape, Source, Term};
use crate::world::World;

/// Seeds or checks the fixed-source monitor of a query.
///
/// A missing monitor is allocated and seeded, even when `check` is set.
/// Seeding returns `true`. Checking returns `true` as soon as one read
/// fixed field has a counter different from the recorded one. Fields whose
/// source no longer has the id are skipped.
pub(crate) fn fixed_monitor(
    world: &World,
    terms: &[Term],
    shape: &QueryShape,
    monitor: &mut Option<Vec<TrackState>>,
    check: bool,
) -> bool {
    let mut check = check;
    if monitor.is_none() {
        *monitor = Some(vec![TrackState::Untracked; shape.field_count()]);
        check = false;
    }
    let Some(block) = monitor.as_mut() else {
        return false;
    };

    let watched = shape.read_fields() & shape.fixed_fields();
    let mut visited = FieldSet::EMPTY;

    for (index, term) in terms.iter().enumerate() {
        let field = shape.term_field(index);
        if !watched.contains(field) || visited.contains(field) {
            continue;
        }
        let Source::Entity(source) = term.src else {
            continue;
        };
        let Some(counter) = find_on(world, source, term.id)
            .and_then(|component| world.column_of(source, component))
            .and_then(|column| world.column_counter(column))
        else {
            continue;
        };
        visited.insert(field);

        if !check {
            block[field] = TrackState::Tracked(counter);
        } else if block[field] != TrackState::Tracked(counter) {
            return true;
        }
    }

    !check
}
