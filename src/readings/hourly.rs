use std::collections::BTreeMap;

use chrono::{DateTime, Duration, DurationRound, Utc};

use crate::db::models::{HourlyReading, Reading};

use super::delta::compute_delta;

/// Start of the UTC hour containing `timestamp`.
pub fn hour_bucket(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp
        .duration_trunc(Duration::hours(1))
        .unwrap_or(timestamp)
}

/// Roll one sensor's readings up into one record per wall-clock hour.
///
/// Deltas are formed pairwise between consecutive raw values inside each
/// bucket, reset-aware. A bucket holding a single reading yields no delta at
/// all, so its stats are zero; that is a property of the data, not an error.
/// The input must belong to a single sensor; ordering does not matter.
pub fn aggregate_to_hourly(readings: &[Reading]) -> Vec<HourlyReading> {
    let mut sorted: Vec<&Reading> = readings.iter().collect();
    sorted.sort_by_key(|r| r.timestamp);

    let mut buckets: BTreeMap<DateTime<Utc>, Vec<&Reading>> = BTreeMap::new();
    for reading in sorted {
        buckets
            .entry(hour_bucket(reading.timestamp))
            .or_default()
            .push(reading);
    }

    buckets
        .into_iter()
        .map(|(bucket, rows)| {
            let deltas: Vec<i64> = rows
                .windows(2)
                .map(|pair| compute_delta(pair[1].value, Some(pair[0].value)))
                .collect();

            let total: i64 = deltas.iter().sum();
            let average = if deltas.is_empty() {
                0.0
            } else {
                total as f64 / deltas.len() as f64
            };

            HourlyReading {
                id: None,
                sensor_id: rows[0].sensor_id,
                timestamp: bucket,
                value: rows[rows.len() - 1].value,
                delta: deltas.last().copied().unwrap_or(0),
                total,
                average,
                min: deltas.iter().copied().min().unwrap_or(0),
                max: deltas.iter().copied().max().unwrap_or(0),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn reading(minute: u32, value: i64) -> Reading {
        Reading {
            id: None,
            sensor_id: 1,
            timestamp: Utc
                .with_ymd_and_hms(2025, 3, 10, 8 + minute / 60, minute % 60, 0)
                .unwrap(),
            value,
            delta: 0,
        }
    }

    #[test]
    fn buckets_by_utc_hour() {
        let readings = vec![
            reading(0, 100),
            reading(20, 130),
            reading(40, 160),
            reading(65, 200),
            reading(80, 250),
        ];

        let hourly = aggregate_to_hourly(&readings);
        assert_eq!(hourly.len(), 2);

        let first = &hourly[0];
        assert_eq!(first.timestamp, Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap());
        assert_eq!(first.total, 60);
        assert_eq!(first.min, 30);
        assert_eq!(first.max, 30);
        assert_eq!(first.average, 30.0);
        assert_eq!(first.value, 160);

        let second = &hourly[1];
        assert_eq!(second.timestamp, Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap());
        assert_eq!(second.total, 50);
        assert_eq!(second.value, 250);
    }

    #[test]
    fn single_reading_bucket_yields_zero_stats() {
        let hourly = aggregate_to_hourly(&[reading(5, 999)]);
        assert_eq!(hourly.len(), 1);
        assert_eq!(hourly[0].total, 0);
        assert_eq!(hourly[0].average, 0.0);
        assert_eq!(hourly[0].min, 0);
        assert_eq!(hourly[0].max, 0);
        assert_eq!(hourly[0].value, 999);
    }

    #[test]
    fn reset_inside_bucket_uses_new_value_as_delta() {
        let readings = vec![reading(0, 100), reading(10, 150), reading(20, 30)];

        let hourly = aggregate_to_hourly(&readings);
        assert_eq!(hourly.len(), 1);
        // deltas: 50, then reset to 30
        assert_eq!(hourly[0].total, 80);
        assert_eq!(hourly[0].min, 30);
        assert_eq!(hourly[0].max, 50);
        assert_eq!(hourly[0].value, 30);
    }

    #[test]
    fn unsorted_input_is_sorted_first() {
        let readings = vec![reading(40, 160), reading(0, 100), reading(20, 130)];

        let hourly = aggregate_to_hourly(&readings);
        assert_eq!(hourly.len(), 1);
        assert_eq!(hourly[0].total, 60);
    }
}
