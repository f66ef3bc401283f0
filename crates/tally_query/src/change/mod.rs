//! # Change Detection
//!
//! Monitors remember the dirty counters a query last observed; comparing
//! them against the live counters tells whether data the query reads may
//! have changed since.
//!
//! Three layers are checked, cheapest first:
//! 1. The fixed-source monitor of the query
//! 2. The match count of the cache (tables matched or unmatched)
//! 3. The monitor of every cached match

pub(crate) mod dirty;
pub(crate) mod fixed;
mod monitor;

pub use monitor::{monitor_state, resolve_field, FieldColumns, MonitorAllocator, TrackState};

pub(crate) use monitor::{
    check_batch, check_match, check_match_term, ensure_monitor, free_monitors, sync_match,
    BatchView,
};
