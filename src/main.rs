use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::{TimeZone, Utc};
use log::info;

use prodwatch::{
    config::EngineConfig,
    db::models::Granularity,
    notify::LogNotifier,
    readings::RawReading,
    stats::{growing_average, monthly_summary},
    Engine,
};

/// Drives one full cycle against a scratch database: ingest a synthetic
/// production day for two sensors, roll it up, detect periods and breaks,
/// and print the derived reports.
#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let db_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("prodwatch-demo.db"));

    let config = EngineConfig::default();
    let day_offset = config.day_offset;
    let engine = Engine::new(db_path, Arc::new(LogNotifier), config)?;

    let batch = synthetic_day();
    let report = engine.readings.ingest_batch(batch).await;
    info!(
        "ingest: {:?}, {} readings, {} duplicates dropped",
        report.status, report.accepted, report.deduplicated
    );

    let hourly = engine.readings.aggregate_hourly().await?;
    info!(
        "hourly rollup: {} buckets across {} sensors",
        hourly.buckets, hourly.sensors
    );

    let detection = engine.periods.detect_all().await?;
    info!(
        "period detection: {} periods across {} sensor scans",
        detection.periods, detection.sensors
    );

    engine.monitor.check_all().await?;

    for period in engine.periods.find_latest(Granularity::Live, None).await? {
        info!(
            "sensor {} latest period: {} -> {:?}",
            period.sensor_id, period.start, period.end
        );
    }

    let day = base_time().with_timezone(&day_offset).date_naive();
    for sensor_id in [1, 2] {
        let total = engine.readings.daily_total(sensor_id, day).await?;
        info!("sensor {sensor_id} produced {total} on {day}");

        let readings = engine.db.all_readings(sensor_id).await?;
        if let Some(point) = growing_average(&readings, 120, day, day_offset).last() {
            info!(
                "sensor {sensor_id} growing average at hour {}: {} actual vs {} target",
                point.hour, point.actual_total, point.target_total
            );
        }

        let month_start = base_time() - chrono::Duration::days(30);
        let periods = engine
            .db
            .periods_between(
                sensor_id,
                Granularity::Live,
                month_start,
                base_time() + chrono::Duration::days(1),
            )
            .await?;
        let summary = monthly_summary(&periods, &readings);
        info!(
            "sensor {sensor_id} summary: {} periods, {} active minutes, {} idle minutes",
            summary.period_count, summary.active_minutes, summary.idle_minutes
        );
    }

    Ok(())
}

fn base_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 6, 0, 0).unwrap()
}

/// One deterministic production day. Sensor 1 runs a morning and an
/// afternoon shift with a counter reset at the changeover; sensor 2 stalls
/// for half an hour mid-morning.
fn synthetic_day() -> Vec<RawReading> {
    let base = base_time();
    let mut batch = Vec::new();

    let mut value_1 = 0;
    let mut value_2 = 500;
    for minute in 0..600 {
        let timestamp = (base + chrono::Duration::minutes(minute)).timestamp_millis();

        // Shift changeover: the counter is reset by maintenance at minute 300
        if minute == 300 {
            value_1 = 0;
        } else if minute < 280 || minute >= 300 {
            value_1 += 25;
        }
        batch.push(RawReading {
            sensor_id: 1,
            timestamp,
            value: value_1,
        });

        if !(120..150).contains(&minute) {
            value_2 += 40;
        }
        batch.push(RawReading {
            sensor_id: 2,
            timestamp,
            value: value_2,
        });
    }

    batch
}
