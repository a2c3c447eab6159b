use anyhow::Result;
use rusqlite::{params, Row};

use crate::db::{connection::Database, helpers::parse_datetime, models::HourlyReading};

fn hourly_from_row(row: &Row<'_>) -> Result<HourlyReading> {
    Ok(HourlyReading {
        id: Some(row.get::<_, i64>(0)?),
        sensor_id: row.get(1)?,
        timestamp: parse_datetime(&row.get::<_, String>(2)?, "timestamp")?,
        value: row.get(3)?,
        delta: row.get(4)?,
        total: row.get(5)?,
        average: row.get(6)?,
        min: row.get(7)?,
        max: row.get(8)?,
    })
}

const HOURLY_COLUMNS: &str =
    "id, sensor_id, timestamp, value, delta, total, average, min_delta, max_delta";

impl Database {
    /// Bulk write keyed on `(sensor_id, timestamp)`. Hourly buckets are
    /// re-derivable, so an existing bucket is overwritten, never duplicated.
    pub async fn upsert_hourly(&self, readings: &[HourlyReading]) -> Result<()> {
        let readings = readings.to_vec();
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            for reading in &readings {
                tx.execute(
                    "INSERT INTO hourly_readings
                        (sensor_id, timestamp, value, delta, total, average, min_delta, max_delta)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT (sensor_id, timestamp)
                     DO UPDATE SET value = excluded.value,
                                   delta = excluded.delta,
                                   total = excluded.total,
                                   average = excluded.average,
                                   min_delta = excluded.min_delta,
                                   max_delta = excluded.max_delta",
                    params![
                        reading.sensor_id,
                        reading.timestamp.to_rfc3339(),
                        reading.value,
                        reading.delta,
                        reading.total,
                        reading.average,
                        reading.min,
                        reading.max,
                    ],
                )?;
            }

            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// The sensor's most recent hourly bucket.
    pub async fn latest_hourly(&self, sensor_id: i64) -> Result<Option<HourlyReading>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {HOURLY_COLUMNS} FROM hourly_readings
                 WHERE sensor_id = ?1
                 ORDER BY timestamp DESC
                 LIMIT 1"
            ))?;
            let mut rows = stmt.query(params![sensor_id])?;
            match rows.next()? {
                Some(row) => Ok(Some(hourly_from_row(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    pub async fn all_hourly(&self, sensor_id: i64) -> Result<Vec<HourlyReading>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {HOURLY_COLUMNS} FROM hourly_readings
                 WHERE sensor_id = ?1
                 ORDER BY timestamp ASC"
            ))?;
            let mut rows = stmt.query(params![sensor_id])?;
            let mut readings = Vec::new();
            while let Some(row) = rows.next()? {
                readings.push(hourly_from_row(row)?);
            }
            Ok(readings)
        })
        .await
    }

    /// Every sensor that has at least one hourly bucket.
    pub async fn hourly_sensor_ids(&self) -> Result<Vec<i64>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT sensor_id FROM hourly_readings ORDER BY sensor_id ASC",
            )?;
            let mut rows = stmt.query([])?;
            let mut ids = Vec::new();
            while let Some(row) = rows.next()? {
                ids.push(row.get(0)?);
            }
            Ok(ids)
        })
        .await
    }
}
