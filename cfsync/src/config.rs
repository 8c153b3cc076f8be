//! Configuration for the crossfade sync core
//!
//! Two layers:
//! 1. **SyncConfig**: tuning constants for the sync loop (built-in defaults)
//! 2. **TomlConfig**: bootstrap file wrapping SyncConfig plus logging
//!
//! Every field has a built-in default; a missing config file is not an error.

use crate::error::{Error, Result};
use crate::media::ReadyState;
use cfsync_common::config::{load_toml_or_default, resolve_config_path, LoggingConfig, CONFIG_ENV_VAR};
use cfsync_common::time::millis_to_duration;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Sync loop tuning constants
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Polling period while at least one element is progressing
    pub active_interval_ms: u64,

    /// Polling period while no element is progressing
    pub idle_interval_ms: u64,

    /// Drift tolerated without any correction (seconds)
    pub drift_threshold: f64,

    /// Drift above which a seek is preferred over a rate nudge (seconds)
    pub seek_threshold: f64,

    /// Playback rate offset applied by a nudge
    pub max_playback_rate_deviation: f64,

    /// Delay before a nudged rate returns to nominal
    pub rate_reset_delay_ms: u64,

    /// Buffer required ahead of the current position before seeking (seconds)
    pub min_buffer_ahead: f64,

    /// Minimum buffering level for an element to count as progressing
    pub ready_state_threshold: ReadyState,

    /// EventBus capacity used when the manager creates its own bus
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            active_interval_ms: 100,
            idle_interval_ms: 1000,
            drift_threshold: 0.1,
            seek_threshold: 0.5,
            max_playback_rate_deviation: 0.01,
            rate_reset_delay_ms: 500,
            min_buffer_ahead: 2.0,
            ready_state_threshold: ReadyState::HaveCurrentData,
            event_capacity: 256,
        }
    }
}

impl SyncConfig {
    pub fn active_interval(&self) -> Duration {
        millis_to_duration(self.active_interval_ms)
    }

    pub fn idle_interval(&self) -> Duration {
        millis_to_duration(self.idle_interval_ms)
    }

    pub fn rate_reset_delay(&self) -> Duration {
        millis_to_duration(self.rate_reset_delay_ms)
    }

    /// Reject configurations that would break the sync loop
    pub fn validate(&self) -> Result<()> {
        if self.active_interval_ms == 0 || self.idle_interval_ms == 0 {
            return Err(Error::Config("Polling intervals must be positive".to_string()));
        }
        if self.active_interval_ms >= self.idle_interval_ms {
            return Err(Error::Config(format!(
                "active_interval_ms ({}) must be shorter than idle_interval_ms ({})",
                self.active_interval_ms, self.idle_interval_ms
            )));
        }
        if !(self.drift_threshold >= 0.0) || !(self.min_buffer_ahead >= 0.0) {
            return Err(Error::Config("Thresholds must be non-negative".to_string()));
        }
        if self.drift_threshold >= self.seek_threshold {
            return Err(Error::Config(format!(
                "drift_threshold ({}) must be below seek_threshold ({})",
                self.drift_threshold, self.seek_threshold
            )));
        }
        if !(self.max_playback_rate_deviation > 0.0 && self.max_playback_rate_deviation < 0.5) {
            return Err(Error::Config(format!(
                "max_playback_rate_deviation ({}) must be in (0, 0.5)",
                self.max_playback_rate_deviation
            )));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be positive".to_string()));
        }
        Ok(())
    }
}

/// Bootstrap configuration loaded from TOML file
///
/// ```toml
/// [sync]
/// active_interval_ms = 100
/// seek_threshold = 0.5
///
/// [logging]
/// level = "info"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TomlConfig {
    /// Resolve, load and validate the bootstrap configuration
    ///
    /// Path priority: `cli_path` → `CFSYNC_CONFIG` → platform config dir.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let path = resolve_config_path(cli_path, CONFIG_ENV_VAR);
        let config: TomlConfig = load_toml_or_default(path.as_deref())?;
        config.sync.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.active_interval(), Duration::from_millis(100));
        assert_eq!(config.idle_interval(), Duration::from_secs(1));
        assert_eq!(config.rate_reset_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_active_must_be_shorter_than_idle() {
        let config = SyncConfig {
            active_interval_ms: 1000,
            idle_interval_ms: 1000,
            ..SyncConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_drift_threshold_below_seek_threshold() {
        let config = SyncConfig {
            drift_threshold: 0.6,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rate_deviation_bounds() {
        for deviation in [0.0, -0.1, 0.5, f64::NAN] {
            let config = SyncConfig {
                max_playback_rate_deviation: deviation,
                ..SyncConfig::default()
            };
            assert!(config.validate().is_err(), "deviation {} accepted", deviation);
        }
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: TomlConfig = toml::from_str(
            "[sync]\nseek_threshold = 0.75\nready_state_threshold = \"have_enough_data\"\n",
        )
        .unwrap();
        assert_eq!(config.sync.seek_threshold, 0.75);
        assert_eq!(config.sync.ready_state_threshold, ReadyState::HaveEnoughData);
        assert_eq!(config.sync.active_interval_ms, 100);
        assert_eq!(config.logging.level, "debug");
    }
}
