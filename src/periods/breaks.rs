use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::db::models::Reading;

/// A stalled sub-interval inside an otherwise active working period.
/// Derived on demand for alerting, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionBreak {
    pub sensor_id: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: i64,
}

/// Find maximal runs of readings with no production spanning at least
/// `threshold_minutes`.
///
/// With `group_by_sensor` the input may mix sensors and is partitioned
/// first; otherwise it is treated as a single sensor's series.
pub fn detect_breaks(
    readings: &[Reading],
    threshold_minutes: i64,
    edge_window: usize,
    group_by_sensor: bool,
) -> Vec<ProductionBreak> {
    if !group_by_sensor {
        return detect_in_series(readings, threshold_minutes, edge_window);
    }

    let mut by_sensor: BTreeMap<i64, Vec<Reading>> = BTreeMap::new();
    for reading in readings {
        by_sensor
            .entry(reading.sensor_id)
            .or_default()
            .push(reading.clone());
    }

    by_sensor
        .values()
        .flat_map(|series| detect_in_series(series, threshold_minutes, edge_window))
        .collect()
}

fn detect_in_series(
    readings: &[Reading],
    threshold_minutes: i64,
    edge_window: usize,
) -> Vec<ProductionBreak> {
    let mut sorted: Vec<&Reading> = readings.iter().collect();
    sorted.sort_by_key(|r| r.timestamp);

    let mut runs: Vec<(usize, usize)> = Vec::new();
    let mut run_start: Option<usize> = None;

    for (idx, reading) in sorted.iter().enumerate() {
        if reading.delta <= 0 {
            if run_start.is_none() {
                run_start = Some(idx);
            }
        } else if let Some(start) = run_start.take() {
            runs.push((start, idx - 1));
        }
    }
    if let Some(start) = run_start {
        runs.push((start, sorted.len() - 1));
    }

    runs.into_iter()
        .filter_map(|(first, last)| {
            let span = sorted[last].timestamp - sorted[first].timestamp;
            if span < Duration::minutes(threshold_minutes) {
                return None;
            }
            if !surrounded_by_production(&sorted, first, last, edge_window) {
                return None;
            }
            Some(ProductionBreak {
                sensor_id: sorted[first].sensor_id,
                start: sorted[first].timestamp,
                end: sorted[last].timestamp,
                duration_minutes: span.num_minutes(),
            })
        })
        .collect()
}

/// A run only counts as a break when real production sits close to both of
/// its sides; a stall hugging the edge of the data is ramp-up or ramp-down
/// of the shift, not a mid-shift stoppage.
fn surrounded_by_production(
    sorted: &[&Reading],
    first: usize,
    last: usize,
    edge_window: usize,
) -> bool {
    let before = &sorted[first.saturating_sub(edge_window)..first];
    let after = &sorted[(last + 1)..(last + 1 + edge_window).min(sorted.len())];

    before.iter().any(|r| r.delta > 0) && after.iter().any(|r| r.delta > 0)
}
