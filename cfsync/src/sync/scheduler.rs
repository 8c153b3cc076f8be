//! Adaptive scheduler
//!
//! Owns the periodic sync loop. The loop wakes on either of two triggers,
//! a timer at the current polling period or a playback time-update event,
//! and both run the same check cycle.
//!
//! The polling period is the active interval while any element is
//! progressing and the idle interval otherwise. Switching periods replaces
//! the loop's timer outright, so no phase carries over from the old period.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::SyncConfig;

/// Scheduler lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    RunningActive,
    RunningIdle,
}

struct RunningLoop {
    task: JoinHandle<()>,
    interval_tx: watch::Sender<Duration>,
    generation: u64,
}

/// Periodic loop bookkeeping
///
/// Every start bumps a generation number. The loop task passes its generation
/// to each check cycle, and a cycle from a superseded generation is ignored,
/// so nothing can run after `stop()` returns even if the aborted task had
/// already woken.
pub(crate) struct Scheduler {
    running: Option<RunningLoop>,
    next_generation: u64,
    current_interval: Duration,
    /// Progressing count seen by the previous cycle (`None` right after start)
    active_element_count: Option<usize>,
    active_interval: Duration,
    idle_interval: Duration,
}

impl Scheduler {
    pub(crate) fn new(config: &SyncConfig) -> Self {
        Self {
            running: None,
            next_generation: 1,
            current_interval: config.active_interval(),
            active_element_count: None,
            active_interval: config.active_interval(),
            idle_interval: config.idle_interval(),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub(crate) fn state(&self) -> SchedulerState {
        match self.running {
            None => SchedulerState::Stopped,
            Some(_) if self.current_interval == self.idle_interval => SchedulerState::RunningIdle,
            Some(_) => SchedulerState::RunningActive,
        }
    }

    pub(crate) fn current_interval(&self) -> Duration {
        self.current_interval
    }

    /// Start the loop at the active interval
    ///
    /// `spawn` receives the new generation and the interval receiver and
    /// returns the loop task. No-op (returns false) when already running.
    pub(crate) fn start<F>(&mut self, spawn: F) -> bool
    where
        F: FnOnce(u64, watch::Receiver<Duration>) -> JoinHandle<()>,
    {
        if self.running.is_some() {
            return false;
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        self.current_interval = self.active_interval;
        self.active_element_count = None;

        let (interval_tx, interval_rx) = watch::channel(self.current_interval);
        let task = spawn(generation, interval_rx);
        self.running = Some(RunningLoop {
            task,
            interval_tx,
            generation,
        });
        true
    }

    /// Stop the loop and drop its time-update subscription
    ///
    /// Returns whether a loop was running.
    pub(crate) fn stop(&mut self) -> bool {
        match self.running.take() {
            Some(running) => {
                running.task.abort();
                true
            }
            None => false,
        }
    }

    /// Whether `generation` belongs to the loop currently running
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| running.generation == generation)
    }

    /// Record this cycle's progressing count
    ///
    /// Returns the new polling period when the count changed and the period
    /// switched as a result.
    pub(crate) fn record_active_count(&mut self, count: usize) -> Option<Duration> {
        if self.active_element_count == Some(count) {
            return None;
        }
        self.active_element_count = Some(count);
        self.update_interval(count)
    }

    fn update_interval(&mut self, count: usize) -> Option<Duration> {
        let running = self.running.as_ref()?;

        let target = if count > 0 {
            self.active_interval
        } else {
            self.idle_interval
        };
        if target == self.current_interval {
            return None;
        }

        self.current_interval = target;
        running.interval_tx.send_replace(target);
        Some(target)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
