//! # Query Errors
//!
//! Problems detected while compiling a query description.

use thiserror::Error;

use tally_core::Id;

/// Errors returned when building a [`crate::Query`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The description has no terms.
    #[error("query has no terms")]
    NoTerms,

    /// More fields than a field mask can hold.
    #[error("query has {count} fields, at most {max} are supported")]
    TooManyFields {
        /// Number of fields in the description.
        count: usize,
        /// Largest supported field count.
        max: usize,
    },

    /// The last term carries the `or` operator.
    #[error("term {0} ends the query with an `or` operator")]
    DanglingOr(usize),

    /// A term cannot be evaluated.
    #[error("term {term} is invalid: {reason}")]
    InvalidTerm {
        /// Index of the offending term.
        term: usize,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// A fixed source entity is not alive.
    #[error("fixed source {0} is not alive")]
    DeadSource(Id),

    /// A supplied monitor allocator hands out blocks of the wrong length.
    #[error("monitor blocks hold {found} entries, query needs {expected}")]
    MonitorLayout {
        /// Field count plus the structural slot.
        expected: usize,
        /// Block length of the allocator.
        found: usize,
    },
}

/// Result type for query construction.
pub type QueryResult<T> = Result<T, QueryError>;
