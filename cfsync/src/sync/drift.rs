//! Drift correction policy
//!
//! Pure decision logic: given one progressing element's elapsed time and the
//! master time, pick between doing nothing, seeking, or nudging the playback
//! rate. The manager applies the decision; keeping it here lets the policy be
//! tested without timers.

use crate::config::SyncConfig;
use crate::error::Result;
use crate::media::{buffered_ahead, is_position_buffered, MediaHandle};

/// Playback rate every nudge returns to
pub const NOMINAL_RATE: f64 = 1.0;

/// Float slack when comparing a nudged rate against the deviation band
const RATE_TOLERANCE: f64 = 1e-9;

/// Correction chosen for one element in one check cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Correction {
    /// Drift within tolerance
    None,

    /// Move the element straight to `target_time`
    Seek { drift: f64, target_time: f64 },

    /// Temporarily run the element at `rate`
    RateNudge { drift: f64, rate: f64 },

    /// Drift exceeds tolerance but no correction is safe this cycle
    Deferred { drift: f64 },
}

/// Drift policy bound to a sync configuration
pub struct DriftPolicy<'a> {
    config: &'a SyncConfig,
}

impl<'a> DriftPolicy<'a> {
    pub fn new(config: &'a SyncConfig) -> Self {
        Self { config }
    }

    /// Not paused and buffered enough to be playing smoothly right now
    pub fn is_progressing(&self, handle: &dyn MediaHandle) -> bool {
        !handle.paused() && handle.ready_state() >= self.config.ready_state_threshold
    }

    /// Rate close enough to nominal that a new nudge will not compound
    pub fn is_nominal_rate(&self, rate: f64) -> bool {
        (rate - NOMINAL_RATE).abs() < self.config.max_playback_rate_deviation / 2.0
    }

    /// Decide the correction for one progressing element
    ///
    /// Reads buffered ranges only when drift exceeds the tolerance; a failure
    /// to read them propagates so the whole cycle can be abandoned.
    pub fn decide(
        &self,
        handle: &dyn MediaHandle,
        elapsed: f64,
        start_time: f64,
        master_time: f64,
        crossfading: bool,
    ) -> Result<Correction> {
        let drift = elapsed - master_time;
        let magnitude = drift.abs();

        if magnitude <= self.config.drift_threshold {
            return Ok(Correction::None);
        }

        let target_time = master_time + start_time;

        if magnitude > self.config.seek_threshold {
            // Seeking mid-crossfade is audible, so it waits for a calmer cycle
            if crossfading {
                return Ok(Correction::Deferred { drift });
            }

            let ranges = handle.buffered()?;
            let ahead = buffered_ahead(&ranges, handle.current_position());
            if is_position_buffered(&ranges, target_time) && ahead > self.config.min_buffer_ahead {
                return Ok(Correction::Seek { drift, target_time });
            }
            return Ok(Correction::Deferred { drift });
        }

        if !self.is_nominal_rate(handle.playback_rate()) {
            return Ok(Correction::Deferred { drift });
        }

        // Ahead of master: slow down; behind: speed up
        let rate = if drift > 0.0 {
            NOMINAL_RATE - self.config.max_playback_rate_deviation
        } else {
            NOMINAL_RATE + self.config.max_playback_rate_deviation
        };
        Ok(Correction::RateNudge { drift, rate })
    }

    /// Whether a deferred reset should restore `rate` to nominal
    ///
    /// Only rates inside the nudge band are touched, so a rate set by someone
    /// else (e.g. a user speed change) survives the reset.
    pub fn should_reset_rate(&self, rate: f64) -> bool {
        rate != NOMINAL_RATE
            && (rate - NOMINAL_RATE).abs() <= self.config.max_playback_rate_deviation + RATE_TOLERANCE
    }
}

/// Mean elapsed time across progressing elements, `None` when there are none
pub fn master_time(elapsed: &[f64]) -> Option<f64> {
    if elapsed.is_empty() {
        return None;
    }
    Some(elapsed.iter().sum::<f64>() / elapsed.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{ReadyState, TimeRange};
    use crate::sim::SimulatedMedia;

    fn media_at(position: f64, buffered: Vec<TimeRange>) -> std::sync::Arc<SimulatedMedia> {
        let media = SimulatedMedia::playing(position);
        media.set_buffered(buffered);
        media
    }

    #[test]
    fn test_master_time_mean() {
        assert_eq!(master_time(&[]), None);
        assert_eq!(master_time(&[9.0, 11.0]), Some(10.0));
    }

    #[test]
    fn test_progressing_requires_play_and_data() {
        let config = SyncConfig::default();
        let policy = DriftPolicy::new(&config);
        let media = SimulatedMedia::playing(0.0);
        assert!(policy.is_progressing(media.as_ref()));

        media.set_ready_state(ReadyState::HaveMetadata);
        assert!(!policy.is_progressing(media.as_ref()));

        media.set_ready_state(ReadyState::HaveEnoughData);
        media.set_paused(true);
        assert!(!policy.is_progressing(media.as_ref()));
    }

    #[test]
    fn test_within_tolerance() {
        let config = SyncConfig::default();
        let policy = DriftPolicy::new(&config);
        let media = media_at(10.05, vec![TimeRange::new(0.0, 30.0)]);

        let decision = policy.decide(media.as_ref(), 10.05, 0.0, 10.025, false).unwrap();
        assert_eq!(decision, Correction::None);
    }

    #[test]
    fn test_large_drift_seeks_when_safe() {
        let config = SyncConfig::default();
        let policy = DriftPolicy::new(&config);
        let media = media_at(9.0, vec![TimeRange::new(0.0, 30.0)]);

        let decision = policy.decide(media.as_ref(), 9.0, 0.0, 10.0, false).unwrap();
        assert_eq!(decision, Correction::Seek { drift: -1.0, target_time: 10.0 });
    }

    #[test]
    fn test_large_drift_deferred_while_crossfading() {
        let config = SyncConfig::default();
        let policy = DriftPolicy::new(&config);
        let media = media_at(9.0, vec![TimeRange::new(0.0, 30.0)]);

        let decision = policy.decide(media.as_ref(), 9.0, 0.0, 10.0, true).unwrap();
        assert_eq!(decision, Correction::Deferred { drift: -1.0 });
    }

    #[test]
    fn test_large_drift_deferred_when_target_not_buffered() {
        let config = SyncConfig::default();
        let policy = DriftPolicy::new(&config);
        // Target 10.0 falls in the gap between ranges
        let media = media_at(9.0, vec![TimeRange::new(0.0, 9.5), TimeRange::new(12.0, 30.0)]);

        let decision = policy.decide(media.as_ref(), 9.0, 0.0, 10.0, false).unwrap();
        assert_eq!(decision, Correction::Deferred { drift: -1.0 });
    }

    #[test]
    fn test_large_drift_deferred_with_thin_buffer() {
        let config = SyncConfig::default();
        let policy = DriftPolicy::new(&config);
        // Only 1.5s buffered ahead of position 9.0
        let media = media_at(9.0, vec![TimeRange::new(0.0, 10.5)]);

        let decision = policy.decide(media.as_ref(), 9.0, 0.0, 10.0, false).unwrap();
        assert_eq!(decision, Correction::Deferred { drift: -1.0 });
    }

    #[test]
    fn test_small_drift_nudges_toward_master() {
        let config = SyncConfig::default();
        let policy = DriftPolicy::new(&config);
        let media = media_at(10.3, vec![]);

        let ahead = policy.decide(media.as_ref(), 10.3, 0.0, 10.0, true).unwrap();
        match ahead {
            Correction::RateNudge { rate, .. } => assert!((rate - 0.99).abs() < 1e-12),
            other => panic!("Expected RateNudge, got {:?}", other),
        }

        let behind = policy.decide(media.as_ref(), 9.7, 0.0, 10.0, true).unwrap();
        match behind {
            Correction::RateNudge { rate, .. } => assert!((rate - 1.01).abs() < 1e-12),
            other => panic!("Expected RateNudge, got {:?}", other),
        }
    }

    #[test]
    fn test_nudge_does_not_compound() {
        let config = SyncConfig::default();
        let policy = DriftPolicy::new(&config);
        let media = media_at(10.3, vec![]);
        media.set_playback_rate(0.99);

        let decision = policy.decide(media.as_ref(), 10.3, 0.0, 10.0, false).unwrap();
        assert!(matches!(decision, Correction::Deferred { .. }));
    }

    #[test]
    fn test_buffered_failure_propagates() {
        let config = SyncConfig::default();
        let policy = DriftPolicy::new(&config);
        let media = media_at(9.0, vec![TimeRange::new(0.0, 30.0)]);
        media.fail_buffered(true);

        assert!(policy.decide(media.as_ref(), 9.0, 0.0, 10.0, false).is_err());
    }

    #[test]
    fn test_should_reset_rate_band() {
        let config = SyncConfig::default();
        let policy = DriftPolicy::new(&config);
        assert!(policy.should_reset_rate(0.99));
        assert!(policy.should_reset_rate(1.01));
        assert!(!policy.should_reset_rate(1.0));
        assert!(!policy.should_reset_rate(1.5), "foreign rate changes are preserved");
    }
}
