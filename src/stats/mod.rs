//! Read-only reporting helpers derived from the reconciled reading series
//! and the detected working periods.

use chrono::{DateTime, FixedOffset, NaiveDate, Timelike, Utc};
use serde::Serialize;

use crate::db::models::{Reading, WorkingPeriod};

/// One step of the growing-average curve: production so far against the
/// total a sensor running exactly on target would have reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowingAveragePoint {
    /// Hour of the production day, 0-23.
    pub hour: u32,
    pub actual_total: i64,
    pub target_total: i64,
}

/// Cumulative hour-by-hour production for one day, measured against an
/// hourly target supplied by the settings collaborator.
///
/// The curve runs from the first hour of the day through the last hour that
/// has any reading; an empty day yields an empty curve.
pub fn growing_average(
    readings: &[Reading],
    hourly_target: i64,
    day: NaiveDate,
    day_offset: FixedOffset,
) -> Vec<GrowingAveragePoint> {
    let mut by_hour = [0i64; 24];
    let mut last_hour: Option<u32> = None;

    for reading in readings {
        let local = reading.timestamp.with_timezone(&day_offset);
        if local.date_naive() != day {
            continue;
        }
        let hour = local.hour();
        by_hour[hour as usize] += reading.delta;
        last_hour = Some(last_hour.map_or(hour, |h| h.max(hour)));
    }

    let Some(last_hour) = last_hour else {
        return Vec::new();
    };

    let mut running = 0;
    (0..=last_hour)
        .map(|hour| {
            running += by_hour[hour as usize];
            GrowingAveragePoint {
                hour,
                actual_total: running,
                target_total: hourly_target * (hour as i64 + 1),
            }
        })
        .collect()
}

/// Month-level production and reliability aggregates in the style of
/// MTBF/MTTR reporting: runs play time-between-failures, the gaps between
/// them time-to-repair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlySummary {
    pub period_count: usize,
    pub active_minutes: i64,
    pub idle_minutes: i64,
    pub mean_run_minutes: i64,
    pub mean_gap_minutes: i64,
    pub total_production: i64,
}

/// Aggregate one sensor's month of periods and readings.
///
/// Open periods count toward `period_count` only; runs and gaps are
/// measured over closed periods, in chronological order.
pub fn monthly_summary(periods: &[WorkingPeriod], readings: &[Reading]) -> MonthlySummary {
    let total_production = readings.iter().map(|r| r.delta).sum();

    let mut closed: Vec<(DateTime<Utc>, DateTime<Utc>)> = periods
        .iter()
        .filter_map(|p| p.end.map(|end| (p.start, end)))
        .collect();
    closed.sort_by_key(|(start, _)| *start);

    let active_minutes: i64 = closed
        .iter()
        .map(|(start, end)| (*end - *start).num_minutes())
        .sum();

    let gaps: Vec<i64> = closed
        .windows(2)
        .map(|pair| (pair[1].0 - pair[0].1).num_minutes().max(0))
        .collect();
    let idle_minutes: i64 = gaps.iter().sum();

    MonthlySummary {
        period_count: periods.len(),
        active_minutes,
        idle_minutes,
        mean_run_minutes: if closed.is_empty() {
            0
        } else {
            active_minutes / closed.len() as i64
        },
        mean_gap_minutes: if gaps.is_empty() {
            0
        } else {
            idle_minutes / gaps.len() as i64
        },
        total_production,
    }
}
