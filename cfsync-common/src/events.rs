//! Sync event definitions and EventBus
//!
//! The playback layer publishes `SyncEvent::TimeUpdate` at its own cadence;
//! the sync manager listens for it while running and publishes diagnostic
//! events about its own lifecycle and corrections on the same bus.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Timestamp type carried by diagnostic events
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Crossfade sync event types
///
/// Events are broadcast via EventBus and can be serialized for diagnostics output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// Playback layer time-update notification
    ///
    /// Emitted by whatever drives the media handles, at its own cadence.
    /// Triggers an immediate sync check while the manager is running.
    TimeUpdate,

    /// Synchronization loop activated
    SyncActivated {
        timestamp: Timestamp,
    },

    /// Synchronization loop deactivated (tracked elements cleared)
    SyncDeactivated {
        timestamp: Timestamp,
    },

    /// Element added to the registration ledger
    ElementRegistered {
        /// Tracked element count after registration
        element_count: usize,
        timestamp: Timestamp,
    },

    /// Element removed from the registration ledger
    ElementUnregistered {
        /// Tracked element count after removal
        element_count: usize,
        timestamp: Timestamp,
    },

    /// Polling period switched between active and idle
    IntervalChanged {
        interval_ms: u64,
        timestamp: Timestamp,
    },

    /// Element position set directly to close a large drift
    SeekCorrection {
        /// Drift in seconds (positive = element ahead of master time)
        drift: f64,
        /// Position the element was moved to (seconds)
        target_time: f64,
        timestamp: Timestamp,
    },

    /// Element playback rate nudged to close a small drift
    RateNudge {
        /// Drift in seconds (positive = element ahead of master time)
        drift: f64,
        /// Temporary playback rate applied
        rate: f64,
        timestamp: Timestamp,
    },
}

impl SyncEvent {
    /// Short event name for logging
    pub fn name(&self) -> &'static str {
        match self {
            SyncEvent::TimeUpdate => "TimeUpdate",
            SyncEvent::SyncActivated { .. } => "SyncActivated",
            SyncEvent::SyncDeactivated { .. } => "SyncDeactivated",
            SyncEvent::ElementRegistered { .. } => "ElementRegistered",
            SyncEvent::ElementUnregistered { .. } => "ElementUnregistered",
            SyncEvent::IntervalChanged { .. } => "IntervalChanged",
            SyncEvent::SeekCorrection { .. } => "SeekCorrection",
            SyncEvent::RateNudge { .. } => "RateNudge",
        }
    }
}

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use cfsync_common::events::{EventBus, SyncEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(SyncEvent::TimeUpdate);
/// assert_eq!(rx.try_recv().unwrap(), SyncEvent::TimeUpdate);
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: SyncEvent,
    ) -> Result<usize, broadcast::error::SendError<SyncEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
