use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// One counter report as received from a sensor gateway.
///
/// The wire format is strict: integer sensor id, integer epoch-millisecond
/// timestamp, integer cumulative counter value. Mixed representations
/// (stringly timestamps, float values) are rejected here instead of being
/// coerced somewhere downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawReading {
    pub sensor_id: i64,
    pub timestamp: i64,
    pub value: i64,
}

impl RawReading {
    pub fn timestamp_utc(&self) -> Result<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp)
            .single()
            .with_context(|| format!("timestamp {} ms is out of range", self.timestamp))
    }
}

/// Decode a JSON batch, failing fast on any malformed entry.
pub fn parse_batch(payload: &str) -> Result<Vec<RawReading>> {
    let batch: Vec<RawReading> =
        serde_json::from_str(payload).context("malformed reading batch")?;
    for raw in &batch {
        raw.timestamp_utc()?;
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_batch() {
        let payload = r#"[
            {"sensorId": 1, "timestamp": 1700000000000, "value": 42},
            {"sensorId": 2, "timestamp": 1700000060000, "value": 7}
        ]"#;

        let batch = parse_batch(payload).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].sensor_id, 1);
        assert_eq!(batch[1].value, 7);
    }

    #[test]
    fn rejects_string_timestamps() {
        let payload = r#"[{"sensorId": 1, "timestamp": "2023-11-14T00:00:00Z", "value": 42}]"#;
        assert!(parse_batch(payload).is_err());
    }

    #[test]
    fn rejects_unknown_fields() {
        let payload = r#"[{"sensorId": 1, "timestamp": 1700000000000, "value": 42, "extra": 1}]"#;
        assert!(parse_batch(payload).is_err());
    }

    #[test]
    fn rejects_fractional_values() {
        let payload = r#"[{"sensorId": 1, "timestamp": 1700000000000, "value": 42.5}]"#;
        assert!(parse_batch(payload).is_err());
    }
}
