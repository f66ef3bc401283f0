//! # Fields
//!
//! Terms are grouped into fields: a term that carries [`Oper::Or`] shares its
//! field with the next term. Per-field access masks are computed once when a
//! query is compiled.

use std::ops::{BitAnd, BitOr, Not};

use super::term::{InOut, Oper, Source, Term};
use crate::error::{QueryError, QueryResult};

/// Largest number of fields a query may have.
pub const MAX_FIELDS: usize = 64;

/// Bit mask over field indices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FieldSet(u64);

impl FieldSet {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// Wraps raw bits.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Set containing fields `0..count`.
    #[must_use]
    pub const fn all(count: usize) -> Self {
        if count >= MAX_FIELDS {
            Self(u64::MAX)
        } else {
            Self((1 << count) - 1)
        }
    }

    /// Checks if a field is in the set.
    #[inline]
    #[must_use]
    pub const fn contains(self, field: usize) -> bool {
        field < MAX_FIELDS && self.0 & (1 << field) != 0
    }

    /// Adds a field.
    #[inline]
    pub fn insert(&mut self, field: usize) {
        debug_assert!(field < MAX_FIELDS);
        self.0 |= 1 << field;
    }

    /// Removes a field.
    #[inline]
    pub fn remove(&mut self, field: usize) {
        debug_assert!(field < MAX_FIELDS);
        self.0 &= !(1 << field);
    }

    /// Checks if the set is empty.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates over the fields in ascending order.
    pub fn iter(self) -> impl Iterator<Item = usize> {
        let mut bits = self.0;
        std::iter::from_fn(move || {
            if bits == 0 {
                return None;
            }
            let field = bits.trailing_zeros() as usize;
            bits &= bits - 1;
            Some(field)
        })
    }
}

impl BitAnd for FieldSet {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl BitOr for FieldSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl Not for FieldSet {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0)
    }
}

/// Compiled field layout and access masks of a query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryShape {
    /// Number of fields.
    field_count: usize,
    /// Field of each term.
    term_fields: Vec<usize>,
    /// Fields the query reads.
    read_fields: FieldSet,
    /// Fields the query writes.
    write_fields: FieldSet,
    /// Fields resolved on a fixed entity.
    fixed_fields: FieldSet,
    /// Fields with default access on a non-table source.
    shared_readonly_fields: FieldSet,
    /// Whether any term is evaluated against the matched table.
    has_table_terms: bool,
}

impl QueryShape {
    /// Compiles the field layout of a term list.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty list, a dangling `or`, malformed terms
    /// or more than [`MAX_FIELDS`] fields.
    pub fn compile(terms: &[Term]) -> QueryResult<Self> {
        if terms.is_empty() {
            return Err(QueryError::NoTerms);
        }

        let mut shape = Self::default();
        let mut previous_or = false;

        for (index, term) in terms.iter().enumerate() {
            validate_term(index, term)?;

            let field = if previous_or {
                let leader = terms[index - 1];
                if std::mem::discriminant(&leader.src) != std::mem::discriminant(&term.src) {
                    return Err(QueryError::InvalidTerm {
                        term: index,
                        reason: "terms of an `or` chain must share their source kind",
                    });
                }
                shape.field_count - 1
            } else {
                shape.field_count += 1;
                if shape.field_count > MAX_FIELDS {
                    return Err(QueryError::TooManyFields {
                        count: count_fields(terms),
                        max: MAX_FIELDS,
                    });
                }
                let field = shape.field_count - 1;
                shape.classify(field, term);
                field
            };

            shape.term_fields.push(field);
            shape.has_table_terms |= !matches!(term.src, Source::Entity(_));
            previous_or = term.oper == Oper::Or;
        }

        if previous_or {
            return Err(QueryError::DanglingOr(terms.len() - 1));
        }
        Ok(shape)
    }

    /// Sets the access masks of a field from its leading term.
    fn classify(&mut self, field: usize, term: &Term) {
        let this = term.src == Source::This;
        let accessed = term.oper != Oper::Not;

        if accessed && term.inout.reads() {
            self.read_fields.insert(field);
        }
        let writes = match term.inout {
            InOut::Out | InOut::InOut => true,
            InOut::Default => this,
            InOut::None | InOut::In => false,
        };
        if accessed && writes {
            self.write_fields.insert(field);
        }
        if matches!(term.src, Source::Entity(_)) {
            self.fixed_fields.insert(field);
        }
        if term.inout == InOut::Default && !this {
            self.shared_readonly_fields.insert(field);
        }
    }

    /// Number of fields.
    #[inline]
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.field_count
    }

    /// Field of a term.
    #[inline]
    #[must_use]
    pub fn term_field(&self, term: usize) -> usize {
        self.term_fields[term]
    }

    /// Fields the query reads.
    #[inline]
    #[must_use]
    pub fn read_fields(&self) -> FieldSet {
        self.read_fields
    }

    /// Fields the query writes.
    #[inline]
    #[must_use]
    pub fn write_fields(&self) -> FieldSet {
        self.write_fields
    }

    /// Fields resolved on a fixed entity.
    #[inline]
    #[must_use]
    pub fn fixed_fields(&self) -> FieldSet {
        self.fixed_fields
    }

    /// Fields with default access on a non-table source.
    #[inline]
    #[must_use]
    pub fn shared_readonly_fields(&self) -> FieldSet {
        self.shared_readonly_fields
    }

    /// Whether any term is evaluated against the matched table.
    #[inline]
    #[must_use]
    pub fn has_table_terms(&self) -> bool {
        self.has_table_terms
    }
}

fn validate_term(index: usize, term: &Term) -> QueryResult<()> {
    let reason = if term.id.index() == 0 && !term.id.is_pair() {
        Some("term id is empty")
    } else {
        match term.src {
            Source::Up(relationship) if relationship.index() == 0 => {
                Some("upward traversal needs a relationship")
            }
            Source::Entity(entity) if entity.index() == 0 => Some("fixed source is empty"),
            _ => None,
        }
    };
    match reason {
        Some(reason) => Err(QueryError::InvalidTerm { term: index, reason }),
        None => Ok(()),
    }
}

fn count_fields(terms: &[Term]) -> usize {
    1 + terms
        .iter()
        .take(terms.len().saturating_sub(1))
        .filter(|term| term.oper != Oper::Or)
        .count()
}
