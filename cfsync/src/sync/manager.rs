//! Sync manager: activation control and the check cycle
//!
//! One manager exists per process (see [`crate::global`]). It activates when
//! the runtime store reports a crossfade in progress and tears everything
//! down when the crossfade ends.
//!
//! # Concurrency
//!
//! All mutable state sits behind one mutex. Both triggers of the check cycle
//! (timer tick, time-update event) run on the loop task and take that mutex
//! for the whole cycle, so cycles never interleave. A cycle recomputes
//! everything from live handle state, so back-to-back cycles are harmless.

use cfsync_common::time::now;
use cfsync_common::{EventBus, RuntimeStore, Subscription, SyncEvent};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, trace, warn};

use super::drift::{master_time as mean_elapsed, Correction, DriftPolicy, NOMINAL_RATE};
use super::ledger::{handle_key, CleanupHooks, HandleKey, Ledger, Teardown, TrackedElement};
use super::scheduler::{Scheduler, SchedulerState};
use super::COMPONENT;
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::media::{buffered_ahead, is_position_buffered, MediaHandle, Preload, SharedHandle};

/// Crossfade synchronization manager
///
/// Cheap to clone; clones share one manager. Handles are tracked without
/// being kept alive.
///
/// # Examples
///
/// ```
/// use cfsync::sim::SimulatedMedia;
/// use cfsync::{SharedHandle, SyncManager};
/// use cfsync_common::RuntimeStore;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> cfsync::Result<()> {
/// let runtime = RuntimeStore::new();
/// let manager = SyncManager::with_runtime(runtime.clone())?;
///
/// // A crossfade starts: the manager activates itself
/// runtime.set_busy(true);
/// assert!(manager.is_currently_active());
///
/// let outgoing: SharedHandle = SimulatedMedia::playing(184.0);
/// let incoming: SharedHandle = SimulatedMedia::playing(0.0);
/// manager.register_element(&outgoing, 184.0);
/// manager.register_element(&incoming, 0.0);
/// assert_eq!(manager.tracked_count(), 2);
///
/// // Crossfade over: full teardown
/// runtime.set_busy(false);
/// assert_eq!(manager.tracked_count(), 0);
/// manager.destroy();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SyncManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: SyncConfig,
    runtime: RuntimeStore,
    events: EventBus,
    rt: Handle,
    state: Mutex<SyncState>,
    busy_subscription: Mutex<Option<Subscription>>,
    /// Check cycles that ran past the activity guard
    cycles: AtomicU64,
}

struct SyncState {
    is_active: bool,
    destroyed: bool,
    /// Mean elapsed time of progressing elements at the last cycle that had any
    master_time: f64,
    ledger: Ledger,
    scheduler: Scheduler,
}

impl SyncManager {
    /// Create a manager and subscribe it to the crossfade busy flag
    ///
    /// Must be called within a tokio runtime; timers and hook watchers are
    /// spawned onto it.
    pub fn new(config: SyncConfig, runtime: RuntimeStore, events: EventBus) -> Result<Self> {
        config.validate()?;
        let rt = Handle::try_current().map_err(|e| {
            Error::Runtime(format!("SyncManager requires a tokio runtime: {}", e))
        })?;

        let scheduler = Scheduler::new(&config);
        let manager = Self {
            inner: Arc::new(Inner {
                config,
                runtime,
                events,
                rt,
                state: Mutex::new(SyncState {
                    is_active: false,
                    destroyed: false,
                    master_time: 0.0,
                    ledger: Ledger::default(),
                    scheduler,
                }),
                busy_subscription: Mutex::new(None),
                cycles: AtomicU64::new(0),
            }),
        };
        manager.subscribe_to_crossfade_state();

        debug!(component = COMPONENT, "Created");
        Ok(manager)
    }

    /// Create a manager with default tuning and its own event bus
    pub fn with_runtime(runtime: RuntimeStore) -> Result<Self> {
        let config = SyncConfig::default();
        let events = EventBus::new(config.event_capacity);
        Self::new(config, runtime, events)
    }

    fn subscribe_to_crossfade_state(&self) {
        let weak = Arc::downgrade(&self.inner);
        let subscription = self.inner.runtime.subscribe(
            |state| state.busy,
            move |busy, _| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let manager = SyncManager { inner };
                if busy && !manager.is_currently_active() {
                    manager.activate();
                } else if !busy && manager.is_currently_active() {
                    manager.deactivate();
                }
            },
        );
        *self.inner.busy_subscription.lock() = Some(subscription);
    }

    // ========================================
    // Activation control
    // ========================================

    /// Start synchronizing (idempotent)
    pub fn activate(&self) {
        let mut st = self.inner.state.lock();
        if st.is_active || st.destroyed {
            return;
        }
        st.is_active = true;
        debug!(component = COMPONENT, "Activated");
        self.emit(SyncEvent::SyncActivated { timestamp: now() });
        self.start_sync_locked(&mut st);
    }

    /// Stop synchronizing and release every tracked element (idempotent)
    pub fn deactivate(&self) {
        let mut st = self.inner.state.lock();
        if !st.is_active {
            return;
        }
        st.is_active = false;
        debug!(component = COMPONENT, "Deactivated");
        self.emit(SyncEvent::SyncDeactivated { timestamp: now() });
        self.stop_sync_locked(&mut st);
        self.clear_all_locked(&mut st);
    }

    /// Deactivate, drop the busy-flag subscription and refuse further work
    pub fn destroy(&self) {
        self.deactivate();

        if let Some(mut subscription) = self.inner.busy_subscription.lock().take() {
            subscription.cancel();
        }

        let mut st = self.inner.state.lock();
        st.destroyed = true;
        self.stop_sync_locked(&mut st);
        self.clear_all_locked(&mut st);
        debug!(component = COMPONENT, "Destroyed");
    }

    // ========================================
    // Registration ledger
    // ========================================

    /// Track `handle`, measuring its elapsed time from `start_time` (seconds)
    ///
    /// Re-registering a tracked handle only updates its start time; no new
    /// cleanup hooks are attached.
    pub fn register_element(&self, handle: &SharedHandle, start_time: f64) {
        let mut st = self.inner.state.lock();
        if st.destroyed {
            debug!(component = COMPONENT, "Ignoring registration after destroy");
            return;
        }

        let key = handle_key(handle);
        if let Some(existing) = st.ledger.get_mut(key) {
            existing.start_time = start_time;
            trace!(component = COMPONENT, start_time, "Updated start time of tracked element");
            return;
        }

        let start_offset = handle.current_position() - start_time;
        handle.set_preload(Preload::Auto);

        let manager = Arc::downgrade(&self.inner);
        let tracked_handle = Arc::downgrade(handle);
        let cleanup = CleanupHooks::attach(&self.inner.rt, handle, move |reason| {
            if let Some(inner) = manager.upgrade() {
                SyncManager { inner }.unregister_from_hook(key, &tracked_handle, reason);
            }
        });

        st.ledger.insert(
            key,
            TrackedElement {
                handle: Arc::downgrade(handle),
                start_time,
                start_offset,
                cleanup,
            },
        );

        if st.is_active {
            self.start_sync_locked(&mut st);
        }

        let element_count = st.ledger.len();
        debug!(component = COMPONENT, element_count, start_offset, "Registered element");
        self.emit(SyncEvent::ElementRegistered {
            element_count,
            timestamp: now(),
        });
    }

    /// Stop tracking `handle`; no-op when it is not tracked
    pub fn unregister_element(&self, handle: &SharedHandle) {
        let mut st = self.inner.state.lock();
        self.unregister_locked(&mut st, handle_key(handle), "explicit");
    }

    /// Release every tracked element without touching activation state
    pub fn clear_all(&self) {
        let mut st = self.inner.state.lock();
        self.clear_all_locked(&mut st);
    }

    fn unregister_from_hook(&self, key: HandleKey, handle: &Weak<dyn MediaHandle>, reason: Teardown) {
        let mut st = self.inner.state.lock();
        // The key only names this handle while the ledger still holds it
        let same_handle = st
            .ledger
            .get(key)
            .is_some_and(|tracked| tracked.handle.ptr_eq(handle));
        if same_handle {
            self.unregister_locked(&mut st, key, reason.as_str());
        }
    }

    fn unregister_locked(&self, st: &mut SyncState, key: HandleKey, reason: &str) -> bool {
        if st.ledger.remove(key).is_none() {
            return false;
        }

        if st.ledger.is_empty() {
            self.stop_sync_locked(st);
        }

        let element_count = st.ledger.len();
        debug!(component = COMPONENT, element_count, reason, "Unregistered element");
        self.emit(SyncEvent::ElementUnregistered {
            element_count,
            timestamp: now(),
        });
        true
    }

    fn clear_all_locked(&self, st: &mut SyncState) {
        let released = st.ledger.len();
        st.ledger.clear();
        if released > 0 {
            debug!(component = COMPONENT, released, "Cleared tracked elements");
        }
    }

    // ========================================
    // Adaptive scheduler
    // ========================================

    /// Start the sync loop at the active interval; no-op when running
    pub fn start_sync(&self) {
        let mut st = self.inner.state.lock();
        if st.destroyed {
            return;
        }
        self.start_sync_locked(&mut st);
    }

    /// Stop the sync loop and its time-update listener
    ///
    /// No check cycle starts after this returns.
    pub fn stop_sync(&self) {
        let mut st = self.inner.state.lock();
        self.stop_sync_locked(&mut st);
    }

    fn start_sync_locked(&self, st: &mut SyncState) {
        let inner = Arc::downgrade(&self.inner);
        let events = &self.inner.events;
        let rt = &self.inner.rt;

        let started = st.scheduler.start(|generation, interval_rx| {
            let time_updates = events.subscribe();
            rt.spawn(run_sync_loop(inner, generation, interval_rx, time_updates))
        });

        if started {
            debug!(
                component = COMPONENT,
                interval_ms = st.scheduler.current_interval().as_millis() as u64,
                "Sync started"
            );
        }
    }

    fn stop_sync_locked(&self, st: &mut SyncState) {
        if st.scheduler.stop() {
            debug!(component = COMPONENT, "Sync stopped");
        }
    }

    // ========================================
    // Check cycle and drift correction
    // ========================================

    /// Run one check cycle immediately (no-op while inactive)
    pub fn check_now(&self) {
        self.run_cycle(None);
    }

    /// Returns false when the calling loop has been superseded and must exit
    fn run_cycle(&self, generation: Option<u64>) -> bool {
        let mut st = self.inner.state.lock();

        if let Some(generation) = generation {
            if !st.scheduler.is_current(generation) {
                return false;
            }
        }
        if !st.is_active {
            return true;
        }
        self.inner.cycles.fetch_add(1, Ordering::Relaxed);

        // A structural change invalidates the snapshot: drop the handle and
        // retry on the next trigger
        let mut live = Vec::with_capacity(st.ledger.len());
        for entry in st.ledger.snapshot() {
            match entry.handle.upgrade() {
                Some(handle) if handle.is_attached() => live.push((handle, entry.start_time)),
                _ => {
                    self.unregister_locked(&mut st, entry.key, "detached during sync check");
                    return true;
                }
            }
        }

        if let Err(e) = self.correct_drift_locked(&mut st, &live) {
            warn!(component = COMPONENT, error = %e, "Sync check failed");
        }
        true
    }

    fn correct_drift_locked(&self, st: &mut SyncState, live: &[(SharedHandle, f64)]) -> Result<()> {
        let policy = DriftPolicy::new(&self.inner.config);

        let progressing: Vec<(&SharedHandle, f64, f64)> = live
            .iter()
            .filter(|(handle, _)| policy.is_progressing(handle.as_ref()))
            .map(|(handle, start_time)| (handle, *start_time, handle.current_position() - start_time))
            .collect();

        if let Some(interval) = st.scheduler.record_active_count(progressing.len()) {
            let interval_ms = interval.as_millis() as u64;
            debug!(
                component = COMPONENT,
                interval_ms,
                active_count = progressing.len(),
                "Sync interval changed"
            );
            self.emit(SyncEvent::IntervalChanged {
                interval_ms,
                timestamp: now(),
            });
        }

        let elapsed: Vec<f64> = progressing.iter().map(|(_, _, elapsed)| *elapsed).collect();
        if let Some(master_time) = mean_elapsed(&elapsed) {
            st.master_time = master_time;
        }
        let master_time = st.master_time;
        let crossfading = self.inner.runtime.is_busy();

        for (handle, start_time, elapsed) in progressing {
            match policy.decide(handle.as_ref(), elapsed, start_time, master_time, crossfading)? {
                Correction::None => {}
                Correction::Seek { drift, target_time } => self.apply_seek(handle, drift, target_time),
                Correction::RateNudge { drift, rate } => self.apply_rate_nudge(handle, drift, rate),
                Correction::Deferred { drift } => {
                    trace!(component = COMPONENT, drift, crossfading, "Correction deferred");
                }
            }
        }
        Ok(())
    }

    fn apply_seek(&self, handle: &SharedHandle, drift: f64, target_time: f64) {
        match handle.seek(target_time) {
            Ok(()) => {
                debug!(component = COMPONENT, drift, target_time, "Seek correction");
                self.emit(SyncEvent::SeekCorrection {
                    drift,
                    target_time,
                    timestamp: now(),
                });
            }
            Err(e) => {
                warn!(component = COMPONENT, drift, target_time, error = %e, "Seek failed");
            }
        }
    }

    /// Apply a one-shot nudge and schedule the return to nominal rate
    ///
    /// The reset is not cancelled by deactivation; it only ever restores a
    /// rate still inside the nudge band.
    fn apply_rate_nudge(&self, handle: &SharedHandle, drift: f64, rate: f64) {
        handle.set_playback_rate(rate);
        debug!(component = COMPONENT, drift, rate, "Rate nudge");
        self.emit(SyncEvent::RateNudge {
            drift,
            rate,
            timestamp: now(),
        });

        let handle = Arc::downgrade(handle);
        let config = self.inner.config.clone();
        self.inner.rt.spawn(async move {
            tokio::time::sleep(config.rate_reset_delay()).await;
            let Some(handle) = handle.upgrade() else {
                return;
            };
            if DriftPolicy::new(&config).should_reset_rate(handle.playback_rate()) {
                handle.set_playback_rate(NOMINAL_RATE);
                trace!(component = COMPONENT, "Playback rate reset to nominal");
            }
        });
    }

    // ========================================
    // Introspection
    // ========================================

    pub fn tracked_count(&self) -> usize {
        self.inner.state.lock().ledger.len()
    }

    pub fn is_currently_active(&self) -> bool {
        self.inner.state.lock().is_active
    }

    pub fn master_time(&self) -> f64 {
        self.inner.state.lock().master_time
    }

    /// Seconds buffered ahead of the handle's position (0 when unknown)
    pub fn buffered_ahead(&self, handle: &SharedHandle) -> f64 {
        match handle.buffered() {
            Ok(ranges) => buffered_ahead(&ranges, handle.current_position()),
            Err(e) => {
                debug!(component = COMPONENT, error = %e, "Buffered ranges unavailable");
                0.0
            }
        }
    }

    /// Whether `target_time` lies inside the handle's buffered ranges
    pub fn is_position_buffered(&self, handle: &SharedHandle, target_time: f64) -> bool {
        match handle.buffered() {
            Ok(ranges) => is_position_buffered(&ranges, target_time),
            Err(e) => {
                debug!(component = COMPONENT, error = %e, "Buffered ranges unavailable");
                false
            }
        }
    }

    pub fn is_tracked(&self, handle: &SharedHandle) -> bool {
        self.inner.state.lock().ledger.contains(handle_key(handle))
    }

    /// Start time recorded for a tracked handle
    pub fn start_time_of(&self, handle: &SharedHandle) -> Option<f64> {
        let st = self.inner.state.lock();
        st.ledger.get(handle_key(handle)).map(|tracked| tracked.start_time)
    }

    /// Registration-time offset (position minus start time) of a tracked handle
    pub fn start_offset_of(&self, handle: &SharedHandle) -> Option<f64> {
        let st = self.inner.state.lock();
        st.ledger.get(handle_key(handle)).map(|tracked| tracked.start_offset)
    }

    /// Whether detachment of a tracked handle is observed directly
    pub fn is_observing_attachment(&self, handle: &SharedHandle) -> bool {
        let st = self.inner.state.lock();
        st.ledger
            .get(handle_key(handle))
            .is_some_and(|tracked| tracked.cleanup.observing_attachment())
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.inner.state.lock().scheduler.state()
    }

    /// Polling period currently in effect
    pub fn current_interval(&self) -> Duration {
        self.inner.state.lock().scheduler.current_interval()
    }

    /// Number of check cycles that ran while active
    pub fn cycle_count(&self) -> u64 {
        self.inner.cycles.load(Ordering::Relaxed)
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.lock().destroyed
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn runtime(&self) -> &RuntimeStore {
        &self.inner.runtime
    }

    fn emit(&self, event: SyncEvent) {
        self.inner.events.emit_lossy(event);
    }
}

impl std::fmt::Debug for SyncManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.inner.state.lock();
        f.debug_struct("SyncManager")
            .field("is_active", &st.is_active)
            .field("tracked", &st.ledger.len())
            .field("master_time", &st.master_time)
            .field("scheduler", &st.scheduler.state())
            .finish()
    }
}

/// Periodic sync loop: timer ticks and time-update events feed one check cycle
async fn run_sync_loop(
    inner: Weak<Inner>,
    generation: u64,
    mut interval_rx: watch::Receiver<Duration>,
    mut time_updates: broadcast::Receiver<SyncEvent>,
) {
    let mut ticker = new_ticker(*interval_rx.borrow_and_update());
    let mut updates_open = true;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = interval_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                // Fresh timer at the new period
                ticker = new_ticker(*interval_rx.borrow_and_update());
                continue;
            }
            received = time_updates.recv(), if updates_open => match received {
                Ok(SyncEvent::TimeUpdate) => {}
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    trace!(component = COMPONENT, skipped, "Time-update listener lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    updates_open = false;
                    continue;
                }
            },
        }

        let Some(inner) = inner.upgrade() else {
            break;
        };
        if !(SyncManager { inner }).run_cycle(Some(generation)) {
            break;
        }
    }

    trace!(component = COMPONENT, generation, "Sync loop exited");
}

fn new_ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
