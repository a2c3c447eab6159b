use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

/// Per-day production totals, keyed by sensor and calendar day.
///
/// The cache is advisory: it serves dashboard reads cheaply and is simply
/// empty after a restart; the persisted delta series stays the source of
/// truth. Days are sliced in a fixed utc offset so the "production day"
/// matches the plant clock rather than UTC midnight.
pub struct DailyTotalsCache {
    day_offset: FixedOffset,
    totals: Mutex<HashMap<(i64, NaiveDate), i64>>,
}

impl DailyTotalsCache {
    pub fn new(day_offset: FixedOffset) -> Self {
        Self {
            day_offset,
            totals: Mutex::new(HashMap::new()),
        }
    }

    /// Production day a timestamp belongs to.
    pub fn day_for(&self, timestamp: DateTime<Utc>) -> NaiveDate {
        timestamp.with_timezone(&self.day_offset).date_naive()
    }

    /// UTC half-open range `[start, end)` covering one production day.
    pub fn day_bounds(&self, day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self
            .day_offset
            .from_local_datetime(&day.and_time(NaiveTime::MIN))
            .single()
            .expect("fixed offsets have no ambiguous local times")
            .with_timezone(&Utc);
        (start, start + chrono::Duration::days(1))
    }

    /// Fold a (possibly negative) delta adjustment into the day holding
    /// `timestamp`.
    pub fn add(&self, sensor_id: i64, timestamp: DateTime<Utc>, delta: i64) {
        let day = self.day_for(timestamp);
        let mut totals = self.totals.lock().unwrap_or_else(|p| p.into_inner());
        *totals.entry((sensor_id, day)).or_insert(0) += delta;
    }

    pub fn get(&self, sensor_id: i64, day: NaiveDate) -> Option<i64> {
        let totals = self.totals.lock().unwrap_or_else(|p| p.into_inner());
        totals.get(&(sensor_id, day)).copied()
    }

    /// Overwrite a day's total, used when warming the cache from storage.
    pub fn set(&self, sensor_id: i64, day: NaiveDate, total: i64) {
        let mut totals = self.totals.lock().unwrap_or_else(|p| p.into_inner());
        totals.insert((sensor_id, day), total);
    }

    pub fn clear(&self) {
        let mut totals = self.totals.lock().unwrap_or_else(|p| p.into_inner());
        totals.clear();
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn cache_with_offset(hours: i32) -> DailyTotalsCache {
        DailyTotalsCache::new(FixedOffset::east_opt(hours * 3600).unwrap())
    }

    #[test]
    fn accumulates_per_sensor_and_day() {
        let cache = cache_with_offset(0);
        let ts = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();

        cache.add(1, ts, 50);
        cache.add(1, ts + chrono::Duration::hours(1), 30);
        cache.add(2, ts, 5);

        let day = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        assert_eq!(cache.get(1, day), Some(80));
        assert_eq!(cache.get(2, day), Some(5));
        assert_eq!(cache.get(3, day), None);
    }

    #[test]
    fn negative_adjustments_shrink_the_total() {
        let cache = cache_with_offset(0);
        let ts = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();

        cache.add(1, ts, 50);
        cache.add(1, ts, -20);
        assert_eq!(cache.get(1, day), Some(30));
    }

    #[test]
    fn day_boundary_follows_the_configured_offset() {
        let cache = cache_with_offset(2);
        // 23:30 UTC is already 01:30 the next day at +02:00
        let ts = Utc.with_ymd_and_hms(2025, 3, 10, 23, 30, 0).unwrap();

        assert_eq!(
            cache.day_for(ts),
            NaiveDate::from_ymd_opt(2025, 3, 11).unwrap()
        );

        let (start, end) = cache.day_bounds(NaiveDate::from_ymd_opt(2025, 3, 11).unwrap());
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 3, 10, 22, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 3, 11, 22, 0, 0).unwrap());
    }
}
