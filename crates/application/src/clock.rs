use std::time::Duration;

use chrono::Utc;

/// Wall-clock time in milliseconds with microsecond precision, used as
/// sorted-set score.
pub(crate) fn unix_millis_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1000.0
}

pub(crate) fn duration_millis(duration: Duration) -> f64 {
    duration.as_micros() as f64 / 1000.0
}
