use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex as StdMutex},
};

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::db::{models::Reading, Database};

use super::{
    batch::RawReading, daily_totals::DailyTotalsCache, delta::compute_delta,
    hourly::aggregate_to_hourly,
};

/// Grants exclusive access to one sensor's reading chain.
///
/// Delta repair reads a neighbor and writes back relative to it; two
/// in-flight writes for the same sensor must not interleave or both end up
/// chained against a stale neighbor.
#[derive(Default)]
struct SensorLocks {
    locks: StdMutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl SensorLocks {
    fn for_sensor(&self, sensor_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        Arc::clone(locks.entry(sensor_id).or_default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Ok,
    Failed,
}

/// Outcome of one batch ingestion. Ingestion never raises; storage failures
/// surface here so the caller can decide whether to retry the whole batch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub status: IngestStatus,
    pub accepted: usize,
    pub deduplicated: usize,
    pub sensors: usize,
}

impl IngestReport {
    fn failed() -> Self {
        Self {
            status: IngestStatus::Failed,
            accepted: 0,
            deduplicated: 0,
            sensors: 0,
        }
    }

    fn empty() -> Self {
        Self {
            status: IngestStatus::Ok,
            accepted: 0,
            deduplicated: 0,
            sensors: 0,
        }
    }
}

/// Manual insert-or-update of a single reading (the point-editor path).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingUpsert {
    pub id: Option<i64>,
    pub sensor_id: i64,
    pub timestamp: DateTime<Utc>,
    pub value: i64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyAggregationReport {
    pub sensors: usize,
    pub buckets: usize,
}

/// Delta engine: turns raw cumulative counter reports into an internally
/// consistent delta series, keeps the daily totals cache current, and rolls
/// live readings up into hourly records.
#[derive(Clone)]
pub struct ReadingService {
    db: Database,
    totals: Arc<DailyTotalsCache>,
    locks: Arc<SensorLocks>,
}

impl ReadingService {
    pub fn new(db: Database, totals: Arc<DailyTotalsCache>) -> Self {
        Self {
            db,
            totals,
            locks: Arc::new(SensorLocks::default()),
        }
    }

    /// Ingest a batch of raw reports, possibly spanning several sensors in
    /// arbitrary order. Per sensor the batch is sorted, deduplicated by
    /// timestamp (last write wins), and chained against the most recent
    /// persisted reading.
    ///
    /// This is the one boundary that must keep accepting data: failures are
    /// logged and reported as a status, never raised.
    pub async fn ingest_batch(&self, batch: Vec<RawReading>) -> IngestReport {
        if batch.is_empty() {
            return IngestReport::empty();
        }

        match self.ingest_batch_inner(batch).await {
            Ok(report) => report,
            Err(err) => {
                error!("batch ingestion failed: {err:?}");
                IngestReport::failed()
            }
        }
    }

    async fn ingest_batch_inner(&self, batch: Vec<RawReading>) -> Result<IngestReport> {
        let mut by_sensor: BTreeMap<i64, Vec<RawReading>> = BTreeMap::new();
        for raw in batch {
            by_sensor.entry(raw.sensor_id).or_default().push(raw);
        }

        // Locks are taken in ascending sensor order by every caller, so two
        // overlapping batches cannot deadlock.
        let mut guards = Vec::with_capacity(by_sensor.len());
        for sensor_id in by_sensor.keys() {
            guards.push(self.locks.for_sensor(*sensor_id).lock_owned().await);
        }

        let sensors = by_sensor.len();
        let mut rows: Vec<Reading> = Vec::new();
        let mut deduplicated = 0;

        for (sensor_id, mut entries) in by_sensor {
            entries.sort_by_key(|r| r.timestamp);

            let before = entries.len();
            entries.reverse();
            entries.dedup_by_key(|r| r.timestamp);
            entries.reverse();
            deduplicated += before - entries.len();

            let mut last_value = self.db.latest_reading(sensor_id).await?.map(|r| r.value);

            for raw in entries {
                let timestamp = raw.timestamp_utc()?;
                let delta = compute_delta(raw.value, last_value);
                last_value = Some(raw.value);
                rows.push(Reading {
                    id: None,
                    sensor_id,
                    timestamp,
                    value: raw.value,
                    delta,
                });
            }
        }

        let accepted = rows.len();
        self.db.insert_readings(&rows).await?;
        for row in &rows {
            self.totals.add(row.sensor_id, row.timestamp, row.delta);
        }

        if deduplicated > 0 {
            warn!("dropped {deduplicated} duplicate timestamps in batch (last write wins)");
        }
        info!("ingested {accepted} readings across {sensors} sensors");

        Ok(IngestReport {
            status: IngestStatus::Ok,
            accepted,
            deduplicated,
            sensors,
        })
    }

    /// Insert or correct a single reading, then repair the chronological
    /// successor whose delta depended on the old predecessor. Two
    /// persistence writes when a successor exists, one otherwise.
    pub async fn upsert_single(&self, input: ReadingUpsert) -> Result<Reading> {
        let lock = self.locks.for_sensor(input.sensor_id);
        let _guard = lock.lock().await;

        let existing = match input.id {
            Some(id) => self.db.reading_by_id(id).await?,
            None => self
                .db
                .readings_between(input.sensor_id, input.timestamp, input.timestamp)
                .await?
                .into_iter()
                .next(),
        };

        let prev = self
            .db
            .reading_before(
                input.sensor_id,
                input.timestamp,
                existing.as_ref().and_then(|r| r.id),
            )
            .await?;
        let delta = compute_delta(input.value, prev.map(|r| r.value));

        let saved = match existing {
            Some(old) => {
                self.totals.add(old.sensor_id, old.timestamp, -old.delta);
                let updated = Reading {
                    id: old.id,
                    sensor_id: input.sensor_id,
                    timestamp: input.timestamp,
                    value: input.value,
                    delta,
                };
                self.db.update_reading(&updated).await?;
                updated
            }
            None => {
                self.db
                    .upsert_reading(&Reading {
                        id: None,
                        sensor_id: input.sensor_id,
                        timestamp: input.timestamp,
                        value: input.value,
                        delta,
                    })
                    .await?
            }
        };
        self.totals.add(saved.sensor_id, saved.timestamp, delta);

        if let Some(mut next) = self
            .db
            .reading_after(input.sensor_id, input.timestamp, saved.id)
            .await?
        {
            let repaired = compute_delta(next.value, Some(input.value));
            if repaired != next.delta {
                self.totals
                    .add(next.sensor_id, next.timestamp, repaired - next.delta);
                next.delta = repaired;
                self.db.update_reading(&next).await?;
            }
        }

        Ok(saved)
    }

    /// Roll unaggregated live readings up into hourly records, per sensor.
    ///
    /// Readings at or after the latest persisted bucket are re-read, so the
    /// newest bucket is always recomputed from its complete contents; the
    /// keyed upsert makes repeat runs produce identical rows.
    pub async fn aggregate_hourly(&self) -> Result<HourlyAggregationReport> {
        let mut report = HourlyAggregationReport::default();

        for sensor_id in self.db.sensor_ids().await? {
            let live = match self.db.latest_hourly(sensor_id).await? {
                Some(latest) => self.db.readings_since(sensor_id, latest.timestamp).await?,
                None => self.db.all_readings(sensor_id).await?,
            };
            if live.is_empty() {
                continue;
            }

            let buckets = aggregate_to_hourly(&live);
            self.db.upsert_hourly(&buckets).await?;

            report.sensors += 1;
            report.buckets += buckets.len();
        }

        info!(
            "hourly aggregation wrote {} buckets for {} sensors",
            report.buckets, report.sensors
        );
        Ok(report)
    }

    /// A sensor's production total for one day, from the cache when warm,
    /// recomputed from the persisted delta series otherwise.
    pub async fn daily_total(&self, sensor_id: i64, day: NaiveDate) -> Result<i64> {
        if let Some(total) = self.totals.get(sensor_id, day) {
            return Ok(total);
        }

        let (from, to) = self.totals.day_bounds(day);
        let total = self.db.sum_deltas_between(sensor_id, from, to).await?;
        self.totals.set(sensor_id, day, total);
        Ok(total)
    }
}
