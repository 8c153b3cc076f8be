//! # Crossfade Sync Common Library
//!
//! Shared code for the crossfade synchronization workspace including:
//! - Error types
//! - Crossfade runtime store (the "crossfade busy" signal)
//! - Sync event types and the EventBus
//! - Crossfade timing helpers
//! - Configuration file resolution
//! - Time utilities

pub mod config;
pub mod crossfade;
pub mod error;
pub mod events;
pub mod runtime_state;
pub mod time;

pub use crossfade::CrossfadeTiming;
pub use error::{Error, Result};
pub use events::{EventBus, SyncEvent};
pub use runtime_state::{CrossfadeRuntime, RuntimeStore, Subscription};
