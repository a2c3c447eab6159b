//! Counter reading data models.
//!
//! A sensor reports a cumulative counter value; the delta engine attributes
//! the production amount to each reading relative to its chronological
//! predecessor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One raw counter report after delta reconciliation (minute-level granularity).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub id: Option<i64>,
    pub sensor_id: i64,
    pub timestamp: DateTime<Utc>,
    /// Cumulative counter value as reported by the hardware. Decreases only
    /// when the physical counter was reset.
    pub value: i64,
    /// Production attributed to this reading.
    pub delta: i64,
}

/// One wall-clock hour of a sensor's readings, rolled up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyReading {
    pub id: Option<i64>,
    pub sensor_id: i64,
    /// Start of the UTC hour bucket.
    pub timestamp: DateTime<Utc>,
    /// Last raw counter value seen inside the bucket.
    pub value: i64,
    /// Last in-bucket delta; 0 when the bucket holds fewer than two readings.
    pub delta: i64,
    pub total: i64,
    pub average: f64,
    pub min: i64,
    pub max: i64,
}
