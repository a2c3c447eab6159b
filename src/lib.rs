pub mod config;
pub mod db;
pub mod notify;
pub mod periods;
pub mod readings;
pub mod stats;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use config::EngineConfig;
use db::Database;
use notify::Notifier;
use periods::{BreakMonitor, WorkingPeriodService};
use readings::{DailyTotalsCache, ReadingService};

/// One long-lived engine instance owning every piece of process-local state
/// (daily totals, alert dedup memory). That state is advisory and resets on
/// restart; the persisted reading series stays the source of truth.
pub struct Engine {
    pub db: Database,
    pub readings: ReadingService,
    pub periods: WorkingPeriodService,
    pub monitor: BreakMonitor,
}

impl Engine {
    pub fn new(
        db_path: PathBuf,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Result<Self> {
        let db = Database::new(db_path)?;
        let totals = Arc::new(DailyTotalsCache::new(config.day_offset));
        let readings = ReadingService::new(db.clone(), totals);
        let periods = WorkingPeriodService::new(db.clone(), config.detection.clone());
        let monitor = BreakMonitor::new(
            db.clone(),
            periods.clone(),
            notifier,
            config.detection,
        );

        Ok(Self {
            db,
            readings,
            periods,
            monitor,
        })
    }
}
