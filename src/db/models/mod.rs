mod reading;
mod working_period;

pub use reading::{HourlyReading, Reading};
pub use working_period::{Granularity, WorkingPeriod};
