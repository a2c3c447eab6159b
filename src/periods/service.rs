use anyhow::Result;
use log::info;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    config::DetectionConfig,
    db::{
        models::{Granularity, WorkingPeriod},
        Database,
    },
};

use super::detector::{scan_periods, DetectionParams, SeriesPoint};

/// Totals for one detection run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionReport {
    pub sensors: usize,
    pub periods: usize,
}

/// Owns the working-period table: detection regenerates each sensor's
/// periods wholesale from its full reading history, so every run is
/// idempotent and restart-safe. Manually corrected periods are never
/// regenerated or deleted.
#[derive(Clone)]
pub struct WorkingPeriodService {
    db: Database,
    config: DetectionConfig,
}

impl WorkingPeriodService {
    pub fn new(db: Database, config: DetectionConfig) -> Self {
        Self { db, config }
    }

    /// Regenerate periods for every sensor at both granularities.
    pub async fn detect_all(&self) -> Result<DetectionReport> {
        let live = self.detect(Granularity::Live, None).await?;
        let hourly = self.detect(Granularity::Hourly, None).await?;
        Ok(DetectionReport {
            sensors: live.sensors + hourly.sensors,
            periods: live.periods + hourly.periods,
        })
    }

    /// Regenerate periods for one granularity, optionally narrowed to a
    /// single sensor (the manual re-detection entry point).
    pub async fn detect(
        &self,
        granularity: Granularity,
        sensor_id: Option<i64>,
    ) -> Result<DetectionReport> {
        let sensors = match sensor_id {
            Some(id) => vec![id],
            None => match granularity {
                Granularity::Live => self.db.sensor_ids().await?,
                Granularity::Hourly => self.db.hourly_sensor_ids().await?,
            },
        };

        let params = DetectionParams {
            activity_threshold: self.config.activity_threshold,
            break_max: self.config.break_max(granularity),
            lookahead: self.config.lookahead,
        };

        let mut report = DetectionReport::default();
        for sensor in sensors {
            let points = self.series_points(sensor, granularity).await?;
            let spans = scan_periods(&points, &params);

            let periods: Vec<WorkingPeriod> = spans
                .iter()
                .map(|span| WorkingPeriod {
                    id: Uuid::new_v4().to_string(),
                    sensor_id: sensor,
                    granularity,
                    start: span.start,
                    end: Some(span.end),
                    is_manually_corrected: false,
                })
                .collect();

            self.db
                .replace_generated_periods(sensor, granularity, &periods)
                .await?;

            report.sensors += 1;
            report.periods += periods.len();
        }

        info!(
            "{} period detection covered {} sensors, {} periods",
            granularity.as_str(),
            report.sensors,
            report.periods
        );
        Ok(report)
    }

    async fn series_points(
        &self,
        sensor_id: i64,
        granularity: Granularity,
    ) -> Result<Vec<SeriesPoint>> {
        match granularity {
            Granularity::Live => Ok(self
                .db
                .all_readings(sensor_id)
                .await?
                .into_iter()
                .map(|r| SeriesPoint {
                    timestamp: r.timestamp,
                    delta: r.delta,
                })
                .collect()),
            // The hour's production total is the activity signal; the row's
            // delta field only holds the final in-bucket pair.
            Granularity::Hourly => Ok(self
                .db
                .all_hourly(sensor_id)
                .await?
                .into_iter()
                .map(|r| SeriesPoint {
                    timestamp: r.timestamp,
                    delta: r.total,
                })
                .collect()),
        }
    }

    /// Per sensor (optionally one), the current or most recent period.
    pub async fn find_latest(
        &self,
        granularity: Granularity,
        sensor_id: Option<i64>,
    ) -> Result<Vec<WorkingPeriod>> {
        self.db.latest_periods(granularity, sensor_id).await
    }

    /// Flag a period so regeneration leaves it alone from now on.
    pub async fn mark_manually_corrected(&self, period_id: &str) -> Result<()> {
        self.db.mark_manually_corrected(period_id, true).await
    }
}
