//! # Crossfade Sync
//!
//! Keeps two concurrently playing tracks aligned while a crossfade is in
//! progress. The manager activates on the runtime store's busy flag, tracks
//! registered media handles, and periodically corrects drift with a seek or a
//! short playback-rate nudge.
//!
//! Module map:
//! - [`sync`]: manager, ledger, adaptive scheduler, drift policy
//! - [`media`]: the handle capability trait consumed by the manager
//! - [`global`]: process-wide instance and convenience wrappers
//! - [`config`]: tuning constants and the bootstrap TOML file
//! - [`sim`]: in-memory handle for the demo binary and tests

pub mod config;
pub mod error;
pub mod global;
pub mod media;
pub mod sim;
pub mod sync;

pub use config::{SyncConfig, TomlConfig};
pub use error::{Error, Result};
pub use media::{MediaHandle, Preload, ReadyState, SharedHandle, TimeRange};
pub use sync::{Correction, DriftPolicy, SchedulerState, SyncManager};
