//! Crossfade synchronization
//!
//! Keeps overlapping media handles phase-aligned while a crossfade is in
//! flight. Layered bottom-up:
//! - `ledger`: which handles are tracked, plus their cleanup hooks
//! - `scheduler`: the periodic loop and its active/idle polling period
//! - `drift`: the seek vs. rate-nudge correction policy
//! - `manager`: activation control and the check cycle tying them together

mod drift;
mod ledger;
mod manager;
mod scheduler;

pub use drift::{master_time, Correction, DriftPolicy, NOMINAL_RATE};
pub use manager::SyncManager;
pub use scheduler::SchedulerState;

/// Component name attached to every log record from this module
pub(crate) const COMPONENT: &str = "SyncManager";
