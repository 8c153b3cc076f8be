//! Media handle abstraction
//!
//! The sync core never owns playback. It drives whatever implements
//! [`MediaHandle`]: a position that can be read and written, a paused flag,
//! a buffering level, a playback rate, buffered ranges, and two lifecycle
//! signals ("ended" and structural attachment).
//!
//! Attachment observation is a convenience. The owning playback layer is
//! expected to flip the attachment signal (or drop the handle) when it tears
//! a handle down; the one-shot "ended" signal remains the reliable fallback.

use crate::error::Result;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// Buffering level of a media handle
///
/// Numeric levels follow the usual media-element convention (0..=4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyState {
    HaveNothing = 0,
    HaveMetadata = 1,
    HaveCurrentData = 2,
    HaveFutureData = 3,
    HaveEnoughData = 4,
}

impl ReadyState {
    /// Numeric readiness level
    pub fn level(self) -> u8 {
        self as u8
    }

    /// Map a numeric level to a state, clamping anything above 4
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => ReadyState::HaveNothing,
            1 => ReadyState::HaveMetadata,
            2 => ReadyState::HaveCurrentData,
            3 => ReadyState::HaveFutureData,
            _ => ReadyState::HaveEnoughData,
        }
    }
}

/// Preload hint requested from a media handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preload {
    None,
    Metadata,
    Auto,
}

/// A contiguous buffered span, in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Inclusive containment check
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time <= self.end
    }
}

/// Playback handle capability set consumed by the sync manager
///
/// All reads are synchronous, non-blocking property accesses. Writes are
/// fire-and-forget; platform-level completion is not awaited.
pub trait MediaHandle: Send + Sync {
    /// Current playback position (seconds)
    fn current_position(&self) -> f64;

    /// Set the playback position (seconds); may legitimately fail
    fn seek(&self, position: f64) -> Result<()>;

    fn paused(&self) -> bool;

    fn ready_state(&self) -> ReadyState;

    fn playback_rate(&self) -> f64;

    fn set_playback_rate(&self, rate: f64);

    /// Buffered ranges in ascending order
    fn buffered(&self) -> Result<Vec<TimeRange>>;

    /// Whether the handle is still attached to its owning container
    fn is_attached(&self) -> bool;

    /// One receiver per call; a single send marks the handle as ended
    fn subscribe_ended(&self) -> broadcast::Receiver<()>;

    /// Attachment signal (`false` = detached); best effort
    fn observe_attachment(&self) -> Result<watch::Receiver<bool>>;

    /// Preload hint; handles without preload control ignore it
    fn set_preload(&self, _preload: Preload) {}
}

/// Shared reference to a media handle
pub type SharedHandle = Arc<dyn MediaHandle>;

/// Seconds buffered ahead of `position`, measured to the end of the last range
///
/// Returns 0 when no buffered ranges exist.
pub fn buffered_ahead(ranges: &[TimeRange], position: f64) -> f64 {
    match ranges.last() {
        Some(last) => last.end - position,
        None => 0.0,
    }
}

/// Whether `target` falls inside any buffered range
pub fn is_position_buffered(ranges: &[TimeRange], target: f64) -> bool {
    ranges.iter().any(|range| range.contains(target))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_state_levels() {
        assert_eq!(ReadyState::HaveCurrentData.level(), 2);
        assert_eq!(ReadyState::from_level(3), ReadyState::HaveFutureData);
        assert_eq!(ReadyState::from_level(9), ReadyState::HaveEnoughData);
        assert!(ReadyState::HaveEnoughData >= ReadyState::HaveCurrentData);
        assert!(ReadyState::HaveMetadata < ReadyState::HaveCurrentData);
    }

    #[test]
    fn test_buffered_ahead() {
        let ranges = [TimeRange::new(0.0, 4.0), TimeRange::new(6.0, 15.0)];
        assert_eq!(buffered_ahead(&ranges, 10.0), 5.0);
        assert_eq!(buffered_ahead(&[], 10.0), 0.0);
    }

    #[test]
    fn test_is_position_buffered() {
        let ranges = [TimeRange::new(0.0, 4.0), TimeRange::new(6.0, 15.0)];
        assert!(is_position_buffered(&ranges, 4.0), "end bound is inclusive");
        assert!(is_position_buffered(&ranges, 6.0));
        assert!(!is_position_buffered(&ranges, 5.0));
        assert!(!is_position_buffered(&[], 1.0));
    }
}
