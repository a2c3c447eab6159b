use chrono::{DateTime, Duration, Utc};

/// A reading distilled to what period detection needs. For hourly series the
/// delta is the bucket's production total.
#[derive(Debug, Clone, Copy)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub delta: i64,
}

/// Thresholds for one detection scan.
#[derive(Debug, Clone, Copy)]
pub struct DetectionParams {
    pub activity_threshold: i64,
    pub break_max: Duration,
    pub lookahead: Duration,
}

/// A detected activity span. The scan always closes what it opens; the
/// terminal close lands on the last active reading, never on an idle tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodSpan {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

struct OpenPeriod {
    start: DateTime<Utc>,
    last_active: DateTime<Utc>,
}

/// Single forward scan over one sensor's chronologically sorted series.
///
/// A period opens on the first active reading (delta above threshold) and
/// tolerates inactivity up to `break_max`; a longer idle stretch closes it
/// at the last active reading. A reporting outage is handled separately:
/// when the gap to the next reading exceeds `break_max` and nothing at all
/// arrives within `lookahead`, the period closes at the current reading.
pub fn scan_periods(points: &[SeriesPoint], params: &DetectionParams) -> Vec<PeriodSpan> {
    let mut spans = Vec::new();
    let mut open: Option<OpenPeriod> = None;

    for (idx, point) in points.iter().enumerate() {
        let is_active = point.delta > params.activity_threshold;

        match &mut open {
            None if is_active => {
                open = Some(OpenPeriod {
                    start: point.timestamp,
                    last_active: point.timestamp,
                });
            }
            None => {}
            Some(period) if is_active => {
                period.last_active = point.timestamp;
            }
            Some(period) => {
                if point.timestamp - period.last_active > params.break_max {
                    spans.push(PeriodSpan {
                        start: period.start,
                        end: period.last_active,
                    });
                    open = None;
                }
            }
        }

        if let Some(period) = &open {
            if let Some(next) = points.get(idx + 1) {
                if next.timestamp - point.timestamp > params.break_max
                    && !any_reading_within(points, idx, params.lookahead)
                {
                    spans.push(PeriodSpan {
                        start: period.start,
                        end: point.timestamp,
                    });
                    open = None;
                }
            }
        }
    }

    if let Some(period) = open {
        spans.push(PeriodSpan {
            start: period.start,
            end: period.last_active,
        });
    }

    spans
}

fn any_reading_within(points: &[SeriesPoint], idx: usize, window: Duration) -> bool {
    let horizon = points[idx].timestamp + window;
    points[idx + 1..]
        .iter()
        .any(|point| point.timestamp <= horizon)
}
