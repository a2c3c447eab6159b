pub mod breaks;
pub mod detector;
pub mod monitor;
pub mod service;

pub use breaks::{detect_breaks, ProductionBreak};
pub use monitor::BreakMonitor;
pub use service::{DetectionReport, WorkingPeriodService};
