//! Crossfade timing
//!
//! Derives fade-out and sustain lengths from the user's crossfade duration
//! and decides when the current track is close enough to its end that the
//! next crossfade should start.

/// Fade-out multiplier applied when checking for end of track
const TRIGGER_HEADROOM: f64 = 1.5;

/// Crossfade timing derived from a configured duration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossfadeTiming {
    /// Whether crossfading is enabled at all
    pub enabled: bool,
    /// Sustain period in seconds (both tracks at full level)
    pub sustain: f64,
    /// Fade-out length in seconds
    pub fade_out: f64,
}

impl CrossfadeTiming {
    /// Derive timing from a crossfade duration in seconds
    ///
    /// - Below 0.01s crossfading is disabled
    /// - Below 0.51s the fade-out equals the duration, sustain is half of it
    /// - Otherwise the fade-out doubles the duration and sustain is a twelfth
    pub fn from_duration(crossfade_duration: f64) -> Self {
        if !crossfade_duration.is_finite() || crossfade_duration < 0.01 {
            return Self {
                enabled: false,
                sustain: 0.0,
                fade_out: 0.0,
            };
        }

        if crossfade_duration < 0.51 {
            return Self {
                enabled: true,
                sustain: crossfade_duration / 2.0,
                fade_out: crossfade_duration,
            };
        }

        Self {
            enabled: true,
            sustain: crossfade_duration / 12.0,
            fade_out: crossfade_duration * 2.0,
        }
    }

    /// Whether the current track should start crossfading now
    ///
    /// # Arguments
    /// * `position` - Current playback position (seconds)
    /// * `duration` - Track duration (seconds)
    /// * `busy` - A crossfade is already in progress
    pub fn time_running_out(&self, position: f64, duration: f64, busy: bool) -> bool {
        if !duration.is_finite() || duration <= 0.0 {
            return false;
        }

        if !self.enabled || busy || position < self.fade_out {
            return false;
        }

        duration - position <= self.fade_out * TRIGGER_HEADROOM
    }
}

impl Default for CrossfadeTiming {
    fn default() -> Self {
        Self {
            enabled: true,
            sustain: 0.45,
            fade_out: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiny_duration_disables() {
        let timing = CrossfadeTiming::from_duration(0.005);
        assert!(!timing.enabled);
        assert_eq!(timing.fade_out, 0.0);
        assert_eq!(timing.sustain, 0.0);
    }

    #[test]
    fn test_short_duration() {
        let timing = CrossfadeTiming::from_duration(0.5);
        assert!(timing.enabled);
        assert_eq!(timing.fade_out, 0.5);
        assert_eq!(timing.sustain, 0.25);
    }

    #[test]
    fn test_long_duration() {
        let timing = CrossfadeTiming::from_duration(6.0);
        assert!(timing.enabled);
        assert_eq!(timing.fade_out, 12.0);
        assert_eq!(timing.sustain, 0.5);
    }

    #[test]
    fn test_time_running_out_window() {
        let timing = CrossfadeTiming::from_duration(2.0); // fade_out = 4s, window = 6s
        assert!(!timing.time_running_out(100.0, 200.0, false));
        assert!(timing.time_running_out(194.0, 200.0, false));
        assert!(timing.time_running_out(199.0, 200.0, false));
    }

    #[test]
    fn test_time_running_out_guards() {
        let timing = CrossfadeTiming::from_duration(2.0);
        assert!(!timing.time_running_out(199.0, 200.0, true), "busy suppresses");
        assert!(!timing.time_running_out(1.0, f64::INFINITY, false));
        assert!(!timing.time_running_out(1.0, 0.0, false));
        // Position before the first fade-out length never triggers
        assert!(!timing.time_running_out(3.0, 5.0, false));

        let disabled = CrossfadeTiming::from_duration(0.0);
        assert!(!disabled.time_running_out(199.0, 200.0, false));
    }
}
