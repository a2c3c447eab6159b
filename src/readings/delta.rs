/// Production delta for a reading, given the chronologically previous raw
/// counter value.
///
/// A value below its predecessor means the hardware counter was reset; the
/// new value is then the production since the reset, never a negative delta.
/// A reading with no predecessor carries no delta.
pub fn compute_delta(value: i64, prev_value: Option<i64>) -> i64 {
    match prev_value {
        Some(prev) if value >= prev => value - prev,
        Some(_) => value,
        None => 0,
    }
}
