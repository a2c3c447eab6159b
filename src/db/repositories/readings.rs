use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Row};

use crate::db::{connection::Database, helpers::parse_datetime, models::Reading};

fn reading_from_row(row: &Row<'_>) -> Result<Reading> {
    Ok(Reading {
        id: Some(row.get::<_, i64>(0)?),
        sensor_id: row.get(1)?,
        timestamp: parse_datetime(&row.get::<_, String>(2)?, "timestamp")?,
        value: row.get(3)?,
        delta: row.get(4)?,
    })
}

const READING_COLUMNS: &str = "id, sensor_id, timestamp, value, delta";

impl Database {
    /// Bulk write, keyed on `(sensor_id, timestamp)`. Re-ingesting a
    /// timestamp overwrites value and delta instead of failing.
    pub async fn insert_readings(&self, readings: &[Reading]) -> Result<()> {
        let readings = readings.to_vec();
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            for reading in &readings {
                tx.execute(
                    "INSERT INTO readings (sensor_id, timestamp, value, delta)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT (sensor_id, timestamp)
                     DO UPDATE SET value = excluded.value, delta = excluded.delta",
                    params![
                        reading.sensor_id,
                        reading.timestamp.to_rfc3339(),
                        reading.value,
                        reading.delta,
                    ],
                )?;
            }

            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Insert-or-update a single reading and return the stored row.
    pub async fn upsert_reading(&self, reading: &Reading) -> Result<Reading> {
        let reading = reading.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO readings (sensor_id, timestamp, value, delta)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (sensor_id, timestamp)
                 DO UPDATE SET value = excluded.value, delta = excluded.delta",
                params![
                    reading.sensor_id,
                    reading.timestamp.to_rfc3339(),
                    reading.value,
                    reading.delta,
                ],
            )?;

            let mut stmt = conn.prepare(&format!(
                "SELECT {READING_COLUMNS} FROM readings
                 WHERE sensor_id = ?1 AND timestamp = ?2"
            ))?;
            let mut rows = stmt.query(params![
                reading.sensor_id,
                reading.timestamp.to_rfc3339()
            ])?;
            match rows.next()? {
                Some(row) => reading_from_row(row),
                None => bail!("reading vanished immediately after upsert"),
            }
        })
        .await
    }

    pub async fn update_reading(&self, reading: &Reading) -> Result<()> {
        let Some(id) = reading.id else {
            bail!("cannot update a reading without an id");
        };
        let reading = reading.clone();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE readings
                 SET timestamp = ?1,
                     value = ?2,
                     delta = ?3
                 WHERE id = ?4",
                params![
                    reading.timestamp.to_rfc3339(),
                    reading.value,
                    reading.delta,
                    id,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn reading_by_id(&self, id: i64) -> Result<Option<Reading>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {READING_COLUMNS} FROM readings WHERE id = ?1"
            ))?;
            let mut rows = stmt.query(params![id])?;
            match rows.next()? {
                Some(row) => Ok(Some(reading_from_row(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    /// The sensor's single most recent reading.
    pub async fn latest_reading(&self, sensor_id: i64) -> Result<Option<Reading>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {READING_COLUMNS} FROM readings
                 WHERE sensor_id = ?1
                 ORDER BY timestamp DESC
                 LIMIT 1"
            ))?;
            let mut rows = stmt.query(params![sensor_id])?;
            match rows.next()? {
                Some(row) => Ok(Some(reading_from_row(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    /// Chronological predecessor: the latest reading strictly before
    /// `timestamp`, optionally excluding one row (the reading being edited).
    pub async fn reading_before(
        &self,
        sensor_id: i64,
        timestamp: DateTime<Utc>,
        exclude_id: Option<i64>,
    ) -> Result<Option<Reading>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {READING_COLUMNS} FROM readings
                 WHERE sensor_id = ?1
                   AND timestamp < ?2
                   AND (?3 IS NULL OR id != ?3)
                 ORDER BY timestamp DESC
                 LIMIT 1"
            ))?;
            let mut rows = stmt.query(params![
                sensor_id,
                timestamp.to_rfc3339(),
                exclude_id
            ])?;
            match rows.next()? {
                Some(row) => Ok(Some(reading_from_row(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    /// Chronological successor: the earliest reading strictly after
    /// `timestamp`, optionally excluding one row.
    pub async fn reading_after(
        &self,
        sensor_id: i64,
        timestamp: DateTime<Utc>,
        exclude_id: Option<i64>,
    ) -> Result<Option<Reading>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {READING_COLUMNS} FROM readings
                 WHERE sensor_id = ?1
                   AND timestamp > ?2
                   AND (?3 IS NULL OR id != ?3)
                 ORDER BY timestamp ASC
                 LIMIT 1"
            ))?;
            let mut rows = stmt.query(params![
                sensor_id,
                timestamp.to_rfc3339(),
                exclude_id
            ])?;
            match rows.next()? {
                Some(row) => Ok(Some(reading_from_row(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    pub async fn all_readings(&self, sensor_id: i64) -> Result<Vec<Reading>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {READING_COLUMNS} FROM readings
                 WHERE sensor_id = ?1
                 ORDER BY timestamp ASC"
            ))?;
            let mut rows = stmt.query(params![sensor_id])?;
            let mut readings = Vec::new();
            while let Some(row) = rows.next()? {
                readings.push(reading_from_row(row)?);
            }
            Ok(readings)
        })
        .await
    }

    /// Readings at or after `since`, ascending.
    pub async fn readings_since(
        &self,
        sensor_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<Reading>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {READING_COLUMNS} FROM readings
                 WHERE sensor_id = ?1 AND timestamp >= ?2
                 ORDER BY timestamp ASC"
            ))?;
            let mut rows = stmt.query(params![sensor_id, since.to_rfc3339()])?;
            let mut readings = Vec::new();
            while let Some(row) = rows.next()? {
                readings.push(reading_from_row(row)?);
            }
            Ok(readings)
        })
        .await
    }

    /// Readings inside `[from, to]`, ascending.
    pub async fn readings_between(
        &self,
        sensor_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Reading>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {READING_COLUMNS} FROM readings
                 WHERE sensor_id = ?1 AND timestamp >= ?2 AND timestamp <= ?3
                 ORDER BY timestamp ASC"
            ))?;
            let mut rows = stmt.query(params![
                sensor_id,
                from.to_rfc3339(),
                to.to_rfc3339()
            ])?;
            let mut readings = Vec::new();
            while let Some(row) = rows.next()? {
                readings.push(reading_from_row(row)?);
            }
            Ok(readings)
        })
        .await
    }

    /// Sum of deltas over the half-open range `[from, to)`.
    pub async fn sum_deltas_between(
        &self,
        sensor_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64> {
        self.execute(move |conn| {
            let total = conn.query_row(
                "SELECT COALESCE(SUM(delta), 0) FROM readings
                 WHERE sensor_id = ?1 AND timestamp >= ?2 AND timestamp < ?3",
                params![sensor_id, from.to_rfc3339(), to.to_rfc3339()],
                |row| row.get(0),
            )?;
            Ok(total)
        })
        .await
    }

    /// Every sensor that has at least one live reading.
    pub async fn sensor_ids(&self) -> Result<Vec<i64>> {
        self.execute(|conn| {
            let mut stmt = conn
                .prepare("SELECT DISTINCT sensor_id FROM readings ORDER BY sensor_id ASC")?;
            let mut rows = stmt.query([])?;
            let mut ids = Vec::new();
            while let Some(row) = rows.next()? {
                ids.push(row.get(0)?);
            }
            Ok(ids)
        })
        .await
    }

    /// Delete readings by id. An empty id list is a caller bug, not a no-op.
    pub async fn delete_readings(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            bail!("refusing to delete readings with an empty id list");
        }
        let ids = ids.to_vec();
        self.execute(move |conn| {
            let placeholders = vec!["?"; ids.len()].join(", ");
            let deleted = conn.execute(
                &format!("DELETE FROM readings WHERE id IN ({placeholders})"),
                params_from_iter(ids.iter()),
            )?;
            Ok(deleted)
        })
        .await
    }
}
