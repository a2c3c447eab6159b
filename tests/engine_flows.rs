use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{Duration, NaiveDate, TimeZone, Utc};

use prodwatch::{
    config::EngineConfig,
    db::models::{Granularity, WorkingPeriod},
    notify::{LogNotifier, Notifier},
    readings::{DailyTotalsCache, IngestStatus, RawReading, ReadingService, ReadingUpsert},
    Engine,
};

fn test_engine() -> Engine {
    Engine::new(
        PathBuf::from(":memory:"),
        Arc::new(LogNotifier),
        EngineConfig::default(),
    )
    .expect("in-memory engine")
}

fn raw(sensor_id: i64, timestamp_ms: i64, value: i64) -> RawReading {
    RawReading {
        sensor_id,
        timestamp: timestamp_ms,
        value,
    }
}

// ---------------------------------------------------------------------------
// Delta engine: ingestion, reset handling, neighbor repair
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ingest_applies_the_reset_rule_across_a_batch() {
    let engine = test_engine();

    let report = engine
        .readings
        .ingest_batch(vec![raw(1, 0, 0), raw(1, 60_000, 50), raw(1, 120_000, 30)])
        .await;
    assert_eq!(report.status, IngestStatus::Ok);
    assert_eq!(report.accepted, 3);

    let readings = engine.db.all_readings(1).await.unwrap();
    let deltas: Vec<i64> = readings.iter().map(|r| r.delta).collect();
    // 30 < 50 at t=120000: counter reset, delta is the new value
    assert_eq!(deltas, vec![0, 50, 30]);
}

#[tokio::test]
async fn ingest_sorts_and_deduplicates_within_the_batch() {
    let engine = test_engine();

    // Arrives out of order with a duplicate timestamp; last write wins
    let report = engine
        .readings
        .ingest_batch(vec![
            raw(1, 120_000, 90),
            raw(1, 0, 10),
            raw(1, 60_000, 45),
            raw(1, 60_000, 40),
        ])
        .await;
    assert_eq!(report.accepted, 3);
    assert_eq!(report.deduplicated, 1);

    let readings = engine.db.all_readings(1).await.unwrap();
    let values: Vec<i64> = readings.iter().map(|r| r.value).collect();
    assert_eq!(values, vec![10, 40, 90]);
    let deltas: Vec<i64> = readings.iter().map(|r| r.delta).collect();
    assert_eq!(deltas, vec![0, 30, 50]);
}

#[tokio::test]
async fn ingest_chains_against_the_latest_persisted_reading() {
    let engine = test_engine();

    engine.readings.ingest_batch(vec![raw(1, 0, 100)]).await;
    engine.readings.ingest_batch(vec![raw(1, 60_000, 160)]).await;

    let readings = engine.db.all_readings(1).await.unwrap();
    assert_eq!(readings[1].delta, 60);
}

#[tokio::test]
async fn empty_batch_is_a_successful_no_op() {
    let engine = test_engine();
    let report = engine.readings.ingest_batch(Vec::new()).await;
    assert_eq!(report.accepted, 0);
    assert_eq!(report.sensors, 0);
}

#[tokio::test]
async fn upsert_between_neighbors_repairs_the_successor() {
    let engine = test_engine();
    engine
        .readings
        .ingest_batch(vec![raw(1, 0, 0), raw(1, 60_000, 50), raw(1, 120_000, 30)])
        .await;

    // Insert at t=90000 with value 20: its own delta follows the reset rule
    // against value 50, and the reading at t=120000 must be re-chained.
    let saved = engine
        .readings
        .upsert_single(ReadingUpsert {
            id: None,
            sensor_id: 1,
            timestamp: Utc.timestamp_millis_opt(90_000).unwrap(),
            value: 20,
        })
        .await
        .unwrap();
    assert_eq!(saved.delta, 20);

    let readings = engine.db.all_readings(1).await.unwrap();
    let deltas: Vec<i64> = readings.iter().map(|r| r.delta).collect();
    assert_eq!(deltas, vec![0, 50, 20, 10]);

    // The daily totals cache tracked both the insert and the repair
    let day = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
    let total = engine.readings.daily_total(1, day).await.unwrap();
    assert_eq!(total, 80);
}

#[tokio::test]
async fn upsert_is_idempotent() {
    let engine = test_engine();
    engine
        .readings
        .ingest_batch(vec![raw(1, 0, 0), raw(1, 60_000, 50), raw(1, 120_000, 30)])
        .await;

    let correction = ReadingUpsert {
        id: None,
        sensor_id: 1,
        timestamp: Utc.timestamp_millis_opt(90_000).unwrap(),
        value: 20,
    };

    let first = engine.readings.upsert_single(correction.clone()).await.unwrap();
    let second = engine.readings.upsert_single(correction).await.unwrap();
    assert_eq!(first.delta, second.delta);

    let readings = engine.db.all_readings(1).await.unwrap();
    let deltas: Vec<i64> = readings.iter().map(|r| r.delta).collect();
    assert_eq!(deltas, vec![0, 50, 20, 10]);

    let day = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
    assert_eq!(engine.readings.daily_total(1, day).await.unwrap(), 80);
}

#[tokio::test]
async fn upsert_by_id_moves_and_rechains_a_reading() {
    let engine = test_engine();
    engine
        .readings
        .ingest_batch(vec![raw(1, 0, 10), raw(1, 60_000, 40), raw(1, 120_000, 70)])
        .await;

    let stored = engine.db.all_readings(1).await.unwrap();
    let edited = engine
        .readings
        .upsert_single(ReadingUpsert {
            id: stored[1].id,
            sensor_id: 1,
            timestamp: stored[1].timestamp,
            value: 55,
        })
        .await
        .unwrap();
    assert_eq!(edited.id, stored[1].id);
    assert_eq!(edited.delta, 45);

    let readings = engine.db.all_readings(1).await.unwrap();
    let deltas: Vec<i64> = readings.iter().map(|r| r.delta).collect();
    assert_eq!(deltas, vec![0, 45, 15]);
}

#[tokio::test]
async fn deleting_readings_with_no_ids_fails_fast() {
    let engine = test_engine();

    // An empty id list is a caller bug and must not be a silent no-op
    assert!(engine.db.delete_readings(&[]).await.is_err());

    engine.readings.ingest_batch(vec![raw(1, 0, 10)]).await;
    let stored = engine.db.all_readings(1).await.unwrap();
    let deleted = engine
        .db
        .delete_readings(&[stored[0].id.unwrap()])
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    assert!(engine.db.all_readings(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn daily_total_recomputes_from_storage_when_the_cache_is_cold() {
    let engine = test_engine();
    engine
        .readings
        .ingest_batch(vec![raw(1, 0, 0), raw(1, 60_000, 50), raw(1, 120_000, 80)])
        .await;

    // A fresh service over the same database simulates a restart: the cache
    // is empty, so the total must come from the persisted deltas.
    let cold = ReadingService::new(
        engine.db.clone(),
        Arc::new(DailyTotalsCache::new(
            chrono::FixedOffset::east_opt(0).unwrap(),
        )),
    );

    let day = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
    let warm_total = engine.readings.daily_total(1, day).await.unwrap();
    let cold_total = cold.daily_total(1, day).await.unwrap();
    assert_eq!(warm_total, 80);
    assert_eq!(cold_total, warm_total);
}

// ---------------------------------------------------------------------------
// Hourly aggregation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn hourly_aggregation_is_idempotent_without_new_readings() {
    let engine = test_engine();

    let base = Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap();
    let mut batch = Vec::new();
    for i in 0..90 {
        let ts = (base + Duration::minutes(i)).timestamp_millis();
        batch.push(raw(1, ts, i * 20));
    }
    engine.readings.ingest_batch(batch).await;

    let first_run = engine.readings.aggregate_hourly().await.unwrap();
    assert_eq!(first_run.buckets, 2);
    let first = engine.db.all_hourly(1).await.unwrap();

    let second_run = engine.readings.aggregate_hourly().await.unwrap();
    assert_eq!(second_run.buckets, 1);
    let second = engine.db.all_hourly(1).await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn hourly_aggregation_extends_the_newest_bucket() {
    let engine = test_engine();

    let base = Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap();
    let mut batch = Vec::new();
    for i in 0..30 {
        let ts = (base + Duration::minutes(i)).timestamp_millis();
        batch.push(raw(1, ts, i * 20));
    }
    engine.readings.ingest_batch(batch).await;
    engine.readings.aggregate_hourly().await.unwrap();

    // More readings land in the same hour after the first rollup
    let mut batch = Vec::new();
    for i in 30..60 {
        let ts = (base + Duration::minutes(i)).timestamp_millis();
        batch.push(raw(1, ts, i * 20));
    }
    engine.readings.ingest_batch(batch).await;
    engine.readings.aggregate_hourly().await.unwrap();

    let hourly = engine.db.all_hourly(1).await.unwrap();
    assert_eq!(hourly.len(), 1);
    assert_eq!(hourly[0].total, 59 * 20);
    assert_eq!(hourly[0].value, 59 * 20);
}

// ---------------------------------------------------------------------------
// Working-period detection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn long_reported_gap_splits_live_periods() {
    let engine = test_engine();

    // Two active stretches five hours apart: beyond the 4 hour live
    // tolerance, so they must become separate periods.
    let base = Utc.with_ymd_and_hms(2025, 3, 10, 6, 0, 0).unwrap();
    let mut batch = Vec::new();
    let mut value = 0;
    for i in 0..4 {
        value += 50;
        batch.push(raw(1, (base + Duration::minutes(i * 10)).timestamp_millis(), value));
    }
    let resume = base + Duration::hours(5);
    for i in 0..4 {
        value += 50;
        batch.push(raw(1, (resume + Duration::minutes(i * 10)).timestamp_millis(), value));
    }
    engine.readings.ingest_batch(batch).await;

    engine.periods.detect(Granularity::Live, None).await.unwrap();

    let periods = engine.db.periods_for_sensor(1, Granularity::Live).await.unwrap();
    assert_eq!(periods.len(), 2);
    // The very first reading carries no delta, so the period opens on the
    // second one; the outage closes it at the last reading before the gap.
    assert_eq!(periods[0].start, base + Duration::minutes(10));
    assert_eq!(periods[0].end, Some(base + Duration::minutes(30)));
    assert_eq!(periods[1].start, resume);
}

#[tokio::test]
async fn detection_preserves_manually_corrected_periods() {
    let engine = test_engine();

    let base = Utc.with_ymd_and_hms(2025, 3, 10, 6, 0, 0).unwrap();
    let mut batch = Vec::new();
    let mut value = 0;
    for i in 0..10 {
        value += 50;
        batch.push(raw(1, (base + Duration::minutes(i)).timestamp_millis(), value));
    }
    engine.readings.ingest_batch(batch).await;

    // An operator fixes up a period from last night and flags it protected
    let mut manual = WorkingPeriod {
        id: "manual-1".to_string(),
        sensor_id: 1,
        granularity: Granularity::Live,
        start: base - Duration::hours(8),
        end: Some(base - Duration::hours(6)),
        is_manually_corrected: false,
    };
    engine.db.insert_period(&manual).await.unwrap();
    engine.periods.mark_manually_corrected("manual-1").await.unwrap();
    manual.is_manually_corrected = true;

    engine.periods.detect(Granularity::Live, None).await.unwrap();
    engine.periods.detect(Granularity::Live, None).await.unwrap();

    let periods = engine.db.periods_for_sensor(1, Granularity::Live).await.unwrap();
    let preserved: Vec<&WorkingPeriod> =
        periods.iter().filter(|p| p.is_manually_corrected).collect();
    assert_eq!(preserved.len(), 1);
    assert_eq!(preserved[0], &manual);

    // Regeneration replaced the generated period each run without duplicating
    assert_eq!(periods.len(), 2);
}

#[tokio::test]
async fn find_latest_returns_the_most_recent_period_per_sensor() {
    let engine = test_engine();

    let base = Utc.with_ymd_and_hms(2025, 3, 10, 6, 0, 0).unwrap();
    let mut batch = Vec::new();
    let mut value = 0;
    for sensor in [1, 2] {
        for i in 0..4 {
            value += 50;
            batch.push(raw(
                sensor,
                (base + Duration::minutes(i * 10)).timestamp_millis(),
                value,
            ));
        }
        let resume = base + Duration::hours(5);
        for i in 0..4 {
            value += 50;
            batch.push(raw(
                sensor,
                (resume + Duration::minutes(i * 10)).timestamp_millis(),
                value,
            ));
        }
    }
    engine.readings.ingest_batch(batch).await;
    engine.periods.detect(Granularity::Live, None).await.unwrap();

    let latest = engine
        .periods
        .find_latest(Granularity::Live, None)
        .await
        .unwrap();
    assert_eq!(latest.len(), 2);
    for period in &latest {
        assert_eq!(period.start, base + Duration::hours(5));
    }

    let single = engine
        .periods
        .find_latest(Granularity::Live, Some(2))
        .await
        .unwrap();
    assert_eq!(single.len(), 1);
    assert_eq!(single[0].sensor_id, 2);
}

#[tokio::test]
async fn hourly_periods_use_bucket_totals_for_activity() {
    let engine = test_engine();

    // A steady morning of production, rolled up and detected at hourly
    // granularity.
    let base = Utc.with_ymd_and_hms(2025, 3, 10, 6, 0, 0).unwrap();
    let mut batch = Vec::new();
    let mut value = 0;
    for i in 0..180 {
        value += 5;
        batch.push(raw(1, (base + Duration::minutes(i)).timestamp_millis(), value));
    }
    engine.readings.ingest_batch(batch).await;
    engine.readings.aggregate_hourly().await.unwrap();

    engine
        .periods
        .detect(Granularity::Hourly, None)
        .await
        .unwrap();

    let periods = engine
        .db
        .periods_for_sensor(1, Granularity::Hourly)
        .await
        .unwrap();
    assert_eq!(periods.len(), 1);
    assert_eq!(periods[0].start, base);
}

// ---------------------------------------------------------------------------
// Break monitoring
// ---------------------------------------------------------------------------

struct RecordingNotifier {
    titles: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    fn new() -> Self {
        Self {
            titles: Mutex::new(Vec::new()),
        }
    }

    fn titles(&self) -> Vec<String> {
        self.titles.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, title: &str, _body: &str) {
        self.titles.lock().unwrap().push(title.to_string());
    }
}

#[tokio::test]
async fn break_monitor_notifies_once_per_break() {
    let recorder = Arc::new(RecordingNotifier::new());
    let engine = Engine::new(
        PathBuf::from(":memory:"),
        Arc::clone(&recorder) as Arc<dyn Notifier>,
        EngineConfig::default(),
    )
    .unwrap();

    // Recent data so the no-data alert stays quiet: production every minute
    // for ~2 hours with a ten-minute stall in the middle.
    let base = Utc::now() - Duration::minutes(115);
    let mut batch = Vec::new();
    let mut value = 0;
    for minute in 0..110 {
        if !(40..50).contains(&minute) {
            value += 50;
        }
        batch.push(raw(
            1,
            (base + Duration::minutes(minute)).timestamp_millis(),
            value,
        ));
    }
    engine.readings.ingest_batch(batch).await;
    engine.periods.detect(Granularity::Live, None).await.unwrap();

    engine.monitor.check_sensor(1).await.unwrap();
    engine.monitor.check_sensor(1).await.unwrap();

    let titles = recorder.titles();
    assert_eq!(titles.len(), 1, "duplicate break alerts: {titles:?}");
    assert!(titles[0].contains("Production break"));
}
