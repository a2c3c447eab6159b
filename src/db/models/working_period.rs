use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Which reading granularity a working period was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Live,
    Hourly,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Live => "live",
            Granularity::Hourly => "hourly",
        }
    }
}

/// One contiguous span of sensor activity.
///
/// At most one period per sensor and granularity may be open (`end == None`)
/// at a time; it represents the currently ongoing production run. Periods are
/// regenerated wholesale by detection, except manually corrected ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingPeriod {
    pub id: String,
    pub sensor_id: i64,
    pub granularity: Granularity,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    /// Protects the period from automatic regeneration.
    pub is_manually_corrected: bool,
}

impl WorkingPeriod {
    pub fn duration(&self) -> Option<Duration> {
        self.end.map(|end| end - self.start)
    }
}
