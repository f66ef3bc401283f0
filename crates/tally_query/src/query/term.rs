//! # Terms
//!
//! A query is a list of terms. Each term names an id, where to look for it
//! (the matched table, a fixed entity, or up a relationship), how the query
//! accesses it, and how it combines with its neighbours.

use tally_core::Id;

/// How a term accesses its data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum InOut {
    /// Read-write for the matched table, read-only for other sources.
    #[default]
    Default,
    /// Not accessed; the term only filters.
    None,
    /// Read-only.
    In,
    /// Read-write.
    InOut,
    /// Write-only.
    Out,
}

impl InOut {
    /// Checks if the access reads data.
    #[inline]
    #[must_use]
    pub const fn reads(self) -> bool {
        matches!(self, Self::Default | Self::In | Self::InOut)
    }
}

/// Where a term finds its id.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Source {
    /// The table being matched.
    #[default]
    This,
    /// A fixed entity, independent of the matched table.
    Entity(Id),
    /// The nearest ancestor along a relationship that has the id.
    Up(Id),
}

/// How a term combines with the others.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Oper {
    /// Required.
    #[default]
    And,
    /// Matched when present, otherwise the field is unset.
    Optional,
    /// Either this term or the next one; both share a field.
    Or,
    /// Must not be present.
    Not,
}

/// One condition of a query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Term {
    /// Id to look for; pair ids may contain [`Id::WILDCARD`].
    pub id: Id,
    /// Where to look for it.
    pub src: Source,
    /// Access kind.
    pub inout: InOut,
    /// Operator.
    pub oper: Oper,
}

impl Term {
    /// Creates a required, default-access term on the matched table.
    #[must_use]
    pub const fn new(id: Id) -> Self {
        Self {
            id,
            src: Source::This,
            inout: InOut::Default,
            oper: Oper::And,
        }
    }

    /// Creates a term for a `(relationship, target)` pair.
    #[must_use]
    pub const fn pair(relationship: Id, target: Id) -> Self {
        Self::new(Id::pair(relationship, target))
    }

    /// Looks the id up on a fixed entity.
    #[must_use]
    pub const fn on(mut self, entity: Id) -> Self {
        self.src = Source::Entity(entity);
        self
    }

    /// Looks the id up on ancestors along `relationship`.
    #[must_use]
    pub const fn up(mut self, relationship: Id) -> Self {
        self.src = Source::Up(relationship);
        self
    }

    /// Sets the access kind.
    #[must_use]
    pub const fn inout(mut self, inout: InOut) -> Self {
        self.inout = inout;
        self
    }

    /// Read-only access.
    #[must_use]
    pub const fn read(self) -> Self {
        self.inout(InOut::In)
    }

    /// Write-only access.
    #[must_use]
    pub const fn write(self) -> Self {
        self.inout(InOut::Out)
    }

    /// Read-write access.
    #[must_use]
    pub const fn read_write(self) -> Self {
        self.inout(InOut::InOut)
    }

    /// Filter only, no data access.
    #[must_use]
    pub const fn filter(self) -> Self {
        self.inout(InOut::None)
    }

    /// Sets the operator.
    #[must_use]
    pub const fn oper(mut self, oper: Oper) -> Self {
        self.oper = oper;
        self
    }

    /// Marks the term optional.
    #[must_use]
    pub const fn optional(self) -> Self {
        self.oper(Oper::Optional)
    }

    /// Combines the term with the next one.
    #[must_use]
    pub const fn or(self) -> Self {
        self.oper(Oper::Or)
    }

    /// Negates the term.
    #[must_use]
    pub const fn negate(self) -> Self {
        self.oper(Oper::Not)
    }
}

/// Whether matches are kept between evaluations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CacheKind {
    /// Matches are cached and monitored.
    #[default]
    Cached,
    /// Matches are recomputed on every iteration.
    Uncached,
}

/// Description a query is compiled from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryDesc {
    /// Terms, in order.
    pub terms: Vec<Term>,
    /// Caching policy.
    pub cache: CacheKind,
    /// Enables change detection for iterators.
    pub detect_changes: bool,
    /// Groups matches by the target of this relationship.
    pub group_by: Option<Id>,
}

impl QueryDesc {
    /// Creates an empty, cached description.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a term.
    #[must_use]
    pub fn with(mut self, term: Term) -> Self {
        self.terms.push(term);
        self
    }

    /// Appends a required, default-access term for `id`.
    #[must_use]
    pub fn term(self, id: Id) -> Self {
        self.with(Term::new(id))
    }

    /// Turns change detection on.
    #[must_use]
    pub fn detect_changes(mut self) -> Self {
        self.detect_changes = true;
        self
    }

    /// Disables the match cache.
    #[must_use]
    pub fn uncached(mut self) -> Self {
        self.cache = CacheKind::Uncached;
        self
    }

    /// Groups matches by relationship target.
    #[must_use]
    pub fn group_by(mut self, relationship: Id) -> Self {
        self.group_by = Some(relationship);
        self
    }
}
