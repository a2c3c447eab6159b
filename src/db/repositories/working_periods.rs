use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_granularity, parse_optional_datetime},
    models::{Granularity, WorkingPeriod},
};

fn period_from_row(row: &Row<'_>) -> Result<WorkingPeriod> {
    Ok(WorkingPeriod {
        id: row.get(0)?,
        sensor_id: row.get(1)?,
        granularity: parse_granularity(&row.get::<_, String>(2)?)?,
        start: parse_datetime(&row.get::<_, String>(3)?, "start_time")?,
        end: parse_optional_datetime(row.get::<_, Option<String>>(4)?, "end_time")?,
        is_manually_corrected: row.get::<_, i64>(5)? != 0,
    })
}

const PERIOD_COLUMNS: &str =
    "id, sensor_id, granularity, start_time, end_time, is_manually_corrected";

impl Database {
    /// Swap one sensor's generated periods for a freshly detected set.
    ///
    /// Delete and re-insert happen in a single transaction, so a crash never
    /// leaves the sensor with half its periods gone. Manually corrected
    /// periods are excluded from the delete and survive every run.
    pub async fn replace_generated_periods(
        &self,
        sensor_id: i64,
        granularity: Granularity,
        periods: &[WorkingPeriod],
    ) -> Result<()> {
        let periods = periods.to_vec();
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "DELETE FROM working_periods
                 WHERE sensor_id = ?1
                   AND granularity = ?2
                   AND is_manually_corrected = 0",
                params![sensor_id, granularity.as_str()],
            )?;

            for period in &periods {
                tx.execute(
                    "INSERT INTO working_periods
                        (id, sensor_id, granularity, start_time, end_time, is_manually_corrected)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        period.id,
                        period.sensor_id,
                        period.granularity.as_str(),
                        period.start.to_rfc3339(),
                        period.end.map(|dt| dt.to_rfc3339()),
                        period.is_manually_corrected as i64,
                    ],
                )?;
            }

            tx.commit()?;
            Ok(())
        })
        .await
    }

    pub async fn insert_period(&self, period: &WorkingPeriod) -> Result<()> {
        let period = period.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO working_periods
                    (id, sensor_id, granularity, start_time, end_time, is_manually_corrected)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    period.id,
                    period.sensor_id,
                    period.granularity.as_str(),
                    period.start.to_rfc3339(),
                    period.end.map(|dt| dt.to_rfc3339()),
                    period.is_manually_corrected as i64,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn periods_for_sensor(
        &self,
        sensor_id: i64,
        granularity: Granularity,
    ) -> Result<Vec<WorkingPeriod>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PERIOD_COLUMNS} FROM working_periods
                 WHERE sensor_id = ?1 AND granularity = ?2
                 ORDER BY start_time ASC"
            ))?;
            let mut rows = stmt.query(params![sensor_id, granularity.as_str()])?;
            let mut periods = Vec::new();
            while let Some(row) = rows.next()? {
                periods.push(period_from_row(row)?);
            }
            Ok(periods)
        })
        .await
    }

    /// Per sensor, the period with the maximum start: the current or most
    /// recent production run.
    pub async fn latest_periods(
        &self,
        granularity: Granularity,
        sensor_id: Option<i64>,
    ) -> Result<Vec<WorkingPeriod>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PERIOD_COLUMNS} FROM working_periods
                 WHERE granularity = ?1
                   AND (?2 IS NULL OR sensor_id = ?2)
                 ORDER BY sensor_id ASC, start_time DESC"
            ))?;
            let mut rows = stmt.query(params![granularity.as_str(), sensor_id])?;
            let mut latest: Vec<WorkingPeriod> = Vec::new();
            while let Some(row) = rows.next()? {
                let period = period_from_row(row)?;
                if latest.last().map(|p| p.sensor_id) != Some(period.sensor_id) {
                    latest.push(period);
                }
            }
            Ok(latest)
        })
        .await
    }

    /// Periods whose start falls inside `[from, to]`, ascending.
    pub async fn periods_between(
        &self,
        sensor_id: i64,
        granularity: Granularity,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<WorkingPeriod>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PERIOD_COLUMNS} FROM working_periods
                 WHERE sensor_id = ?1
                   AND granularity = ?2
                   AND start_time >= ?3
                   AND start_time <= ?4
                 ORDER BY start_time ASC"
            ))?;
            let mut rows = stmt.query(params![
                sensor_id,
                granularity.as_str(),
                from.to_rfc3339(),
                to.to_rfc3339()
            ])?;
            let mut periods = Vec::new();
            while let Some(row) = rows.next()? {
                periods.push(period_from_row(row)?);
            }
            Ok(periods)
        })
        .await
    }

    pub async fn mark_manually_corrected(&self, period_id: &str, flag: bool) -> Result<()> {
        let period_id = period_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE working_periods
                 SET is_manually_corrected = ?1
                 WHERE id = ?2",
                params![flag as i64, period_id],
            )?;
            Ok(())
        })
        .await
    }
}
