pub mod batch;
pub mod daily_totals;
pub mod delta;
pub mod hourly;
pub mod service;

pub use batch::{parse_batch, RawReading};
pub use daily_totals::DailyTotalsCache;
pub use service::{
    HourlyAggregationReport, IngestReport, IngestStatus, ReadingService, ReadingUpsert,
};
