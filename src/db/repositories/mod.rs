mod hourly_readings;
mod readings;
mod working_periods;
