//! In-memory media handle
//!
//! Drives the sync core without a platform media stack: the demo binary
//! plays two simulated tracks through a crossfade, and tests use it to set up
//! exact positions, buffering and lifecycle signals.

use crate::error::{Error, Result};
use crate::media::{MediaHandle, Preload, ReadyState, TimeRange};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// Seconds buffered past the starting position of a new handle
const DEFAULT_BUFFER_AHEAD: f64 = 60.0;

#[derive(Debug)]
struct SimState {
    position: f64,
    paused: bool,
    ready_state: ReadyState,
    playback_rate: f64,
    buffered: Vec<TimeRange>,
    attached: bool,
    observation_supported: bool,
    fail_seeks: bool,
    fail_buffered: bool,
    preload: Option<Preload>,
    seeks: Vec<f64>,
    rate_history: Vec<f64>,
}

/// Simulated playback element
///
/// Position only moves when [`SimulatedMedia::advance`] is called, scaled by
/// the current playback rate.
#[derive(Debug)]
pub struct SimulatedMedia {
    state: Mutex<SimState>,
    ended_tx: broadcast::Sender<()>,
    attached_tx: watch::Sender<bool>,
}

impl SimulatedMedia {
    /// A playing, fully ready handle at `position`
    pub fn playing(position: f64) -> Arc<Self> {
        let (ended_tx, _) = broadcast::channel(4);
        let (attached_tx, _) = watch::channel(true);
        Arc::new(Self {
            state: Mutex::new(SimState {
                position,
                paused: false,
                ready_state: ReadyState::HaveEnoughData,
                playback_rate: 1.0,
                buffered: vec![TimeRange::new(0.0, position + DEFAULT_BUFFER_AHEAD)],
                attached: true,
                observation_supported: true,
                fail_seeks: false,
                fail_buffered: false,
                preload: None,
                seeks: Vec::new(),
                rate_history: Vec::new(),
            }),
            ended_tx,
            attached_tx,
        })
    }

    /// A paused handle at `position`
    pub fn paused_at(position: f64) -> Arc<Self> {
        let media = Self::playing(position);
        media.set_paused(true);
        media
    }

    // ========================================
    // Playback simulation
    // ========================================

    /// Move the position forward by `secs` of wall time (no-op while paused)
    pub fn advance(&self, secs: f64) {
        let mut state = self.state.lock();
        if !state.paused && state.attached {
            state.position += secs * state.playback_rate;
        }
    }

    pub fn play(&self) {
        self.state.lock().paused = false;
    }

    pub fn set_position(&self, position: f64) {
        self.state.lock().position = position;
    }

    pub fn set_paused(&self, paused: bool) {
        self.state.lock().paused = paused;
    }

    pub fn set_ready_state(&self, ready_state: ReadyState) {
        self.state.lock().ready_state = ready_state;
    }

    pub fn set_buffered(&self, ranges: Vec<TimeRange>) {
        self.state.lock().buffered = ranges;
    }

    /// Make every following seek fail
    pub fn fail_seeks(&self, fail: bool) {
        self.state.lock().fail_seeks = fail;
    }

    /// Make every following buffered-range read fail
    pub fn fail_buffered(&self, fail: bool) {
        self.state.lock().fail_buffered = fail;
    }

    /// Toggle support for attachment observation (affects new observers only)
    pub fn set_observation_supported(&self, supported: bool) {
        self.state.lock().observation_supported = supported;
    }

    // ========================================
    // Lifecycle signals
    // ========================================

    /// Signal end of playback to every ended subscriber
    pub fn fire_ended(&self) {
        self.state.lock().paused = true;
        // No subscribers is fine
        let _ = self.ended_tx.send(());
    }

    /// Remove the handle from its container
    pub fn detach(&self) {
        self.state.lock().attached = false;
        self.attached_tx.send_replace(false);
    }

    // ========================================
    // Inspection
    // ========================================

    /// Seek targets accepted so far, oldest first
    pub fn seeks(&self) -> Vec<f64> {
        self.state.lock().seeks.clone()
    }

    pub fn seek_count(&self) -> usize {
        self.state.lock().seeks.len()
    }

    /// Every playback rate written, oldest first
    pub fn rate_history(&self) -> Vec<f64> {
        self.state.lock().rate_history.clone()
    }

    pub fn preload(&self) -> Option<Preload> {
        self.state.lock().preload
    }

    /// Live receivers of the ended signal
    pub fn ended_listener_count(&self) -> usize {
        self.ended_tx.receiver_count()
    }
}

impl MediaHandle for SimulatedMedia {
    fn current_position(&self) -> f64 {
        self.state.lock().position
    }

    fn seek(&self, position: f64) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_seeks {
            return Err(Error::Seek(format!("simulated failure seeking to {:.3}", position)));
        }
        state.position = position;
        state.seeks.push(position);
        Ok(())
    }

    fn paused(&self) -> bool {
        self.state.lock().paused
    }

    fn ready_state(&self) -> ReadyState {
        self.state.lock().ready_state
    }

    fn playback_rate(&self) -> f64 {
        self.state.lock().playback_rate
    }

    fn set_playback_rate(&self, rate: f64) {
        let mut state = self.state.lock();
        state.playback_rate = rate;
        state.rate_history.push(rate);
    }

    fn buffered(&self) -> Result<Vec<TimeRange>> {
        let state = self.state.lock();
        if state.fail_buffered {
            return Err(Error::Buffered("simulated buffered read failure".to_string()));
        }
        Ok(state.buffered.clone())
    }

    fn is_attached(&self) -> bool {
        self.state.lock().attached
    }

    fn subscribe_ended(&self) -> broadcast::Receiver<()> {
        self.ended_tx.subscribe()
    }

    fn observe_attachment(&self) -> Result<watch::Receiver<bool>> {
        let state = self.state.lock();
        if !state.observation_supported {
            return Err(Error::Observation("not supported by this handle".to_string()));
        }
        if !state.attached {
            return Err(Error::Observation("handle already detached".to_string()));
        }
        Ok(self.attached_tx.subscribe())
    }

    fn set_preload(&self, preload: Preload) {
        self.state.lock().preload = Some(preload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_scales_with_rate() {
        let media = SimulatedMedia::playing(10.0);
        media.advance(1.0);
        assert!((media.current_position() - 11.0).abs() < 1e-9);

        media.set_playback_rate(1.01);
        media.advance(1.0);
        assert!((media.current_position() - 12.01).abs() < 1e-9);
        assert_eq!(media.rate_history(), vec![1.01]);
    }

    #[test]
    fn test_paused_does_not_advance() {
        let media = SimulatedMedia::paused_at(5.0);
        media.advance(2.0);
        assert_eq!(media.current_position(), 5.0);

        media.play();
        media.advance(2.0);
        assert_eq!(media.current_position(), 7.0);
    }

    #[test]
    fn test_seek_failure_leaves_position() {
        let media = SimulatedMedia::playing(3.0);
        media.fail_seeks(true);
        assert!(matches!(media.seek(8.0), Err(Error::Seek(_))));
        assert_eq!(media.current_position(), 3.0);
        assert_eq!(media.seek_count(), 0);

        media.fail_seeks(false);
        media.seek(8.0).unwrap();
        assert_eq!(media.seeks(), vec![8.0]);
    }

    #[test]
    fn test_detached_handle_refuses_observation() {
        let media = SimulatedMedia::playing(0.0);
        let mut rx = media.observe_attachment().unwrap();
        assert!(*rx.borrow_and_update());

        media.detach();
        assert!(!media.is_attached());
        assert!(rx.has_changed().unwrap());
        assert!(!*rx.borrow());
        assert!(matches!(media.observe_attachment(), Err(Error::Observation(_))));
    }
}
