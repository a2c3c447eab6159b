use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::{
    config::DetectionConfig,
    db::{models::Granularity, Database},
    notify::Notifier,
};

use super::{breaks::detect_breaks, service::WorkingPeriodService};

/// Watches recent live readings for stalls inside the current working
/// period and raises at most one notification per distinct break.
///
/// The dedup memory lives for the life of the process only; a restart
/// re-alerts at worst once per sensor, it never corrupts stored data.
pub struct BreakMonitor {
    db: Database,
    periods: WorkingPeriodService,
    notifier: Arc<dyn Notifier>,
    config: DetectionConfig,
    state: Mutex<MonitorState>,
}

#[derive(Default)]
struct MonitorState {
    last_notified_break: HashMap<i64, DateTime<Utc>>,
    silent_sensors: HashSet<i64>,
}

impl BreakMonitor {
    pub fn new(
        db: Database,
        periods: WorkingPeriodService,
        notifier: Arc<dyn Notifier>,
        config: DetectionConfig,
    ) -> Self {
        Self {
            db,
            periods,
            notifier,
            config,
            state: Mutex::new(MonitorState::default()),
        }
    }

    /// Run the break and no-data checks for every known sensor.
    pub async fn check_all(&self) -> Result<()> {
        for sensor_id in self.db.sensor_ids().await? {
            self.check_sensor(sensor_id).await?;
        }
        Ok(())
    }

    /// Scan one sensor's current period for fresh stalls. Storage failures
    /// propagate; the notifier is fire-and-forget.
    pub async fn check_sensor(&self, sensor_id: i64) -> Result<()> {
        self.check_data_silence(sensor_id).await?;

        let Some(period) = self
            .periods
            .find_latest(Granularity::Live, Some(sensor_id))
            .await?
            .into_iter()
            .next()
        else {
            return Ok(());
        };

        let window_end = period.end.unwrap_or_else(Utc::now);
        let readings = self
            .db
            .readings_between(sensor_id, period.start, window_end)
            .await?;

        let breaks = detect_breaks(
            &readings,
            self.config.stall_threshold_minutes,
            self.config.edge_window,
            false,
        );
        let Some(latest) = breaks.last() else {
            return Ok(());
        };

        {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            if state.last_notified_break.get(&sensor_id) == Some(&latest.end) {
                return Ok(());
            }
            state.last_notified_break.insert(sensor_id, latest.end);
        }

        self.notifier.notify(
            &format!("Production break on sensor {sensor_id}"),
            &format!(
                "No production for {} minutes ({} to {})",
                latest.duration_minutes, latest.start, latest.end
            ),
        );
        Ok(())
    }

    /// One-shot alert when a sensor stops reporting entirely. The flag
    /// clears as soon as data resumes, re-arming the alert.
    async fn check_data_silence(&self, sensor_id: i64) -> Result<()> {
        let Some(latest) = self.db.latest_reading(sensor_id).await? else {
            return Ok(());
        };

        let silent = Utc::now() - latest.timestamp > self.config.no_data;
        let newly_silent = {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            if silent {
                state.silent_sensors.insert(sensor_id)
            } else {
                state.silent_sensors.remove(&sensor_id);
                false
            }
        };

        if newly_silent {
            self.notifier.notify(
                &format!("Sensor {sensor_id} stopped reporting"),
                &format!("No readings since {}", latest.timestamp),
            );
        }
        Ok(())
    }
}
