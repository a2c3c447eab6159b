use chrono::{Duration, FixedOffset};

use crate::db::models::Granularity;

/// Tunable thresholds for working-period and break detection.
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// Minimum delta for a reading to count as active production
    pub activity_threshold: i64,

    /// Longest tolerated inactive gap inside a live-granularity period
    pub live_break_max: Duration,

    /// Longest tolerated inactive gap inside an hourly-granularity period
    pub hourly_break_max: Duration,

    /// Window scanned ahead for any reading before closing a period early
    pub lookahead: Duration,

    /// Minimum stall length reported as a production break
    pub stall_threshold_minutes: i64,

    /// Readings checked on each side of a stall for real production
    pub edge_window: usize,

    /// Silence after the newest reading before a no-data alert fires
    pub no_data: Duration,
}

impl DetectionConfig {
    pub fn break_max(&self, granularity: Granularity) -> Duration {
        match granularity {
            Granularity::Live => self.live_break_max,
            Granularity::Hourly => self.hourly_break_max,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            activity_threshold: 10,
            // Minute-level noise is expected, so live data gets the longer leash
            live_break_max: Duration::hours(4),
            hourly_break_max: Duration::hours(2),
            lookahead: Duration::hours(2),
            stall_threshold_minutes: 5,
            edge_window: 5,
            no_data: Duration::minutes(30),
        }
    }
}

/// Engine-wide settings for ingestion and daily bookkeeping.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Offset applied before slicing timestamps into production days
    pub day_offset: FixedOffset,

    pub detection: DetectionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            day_offset: FixedOffset::east_opt(0).unwrap(),
            detection: DetectionConfig::default(),
        }
    }
}
