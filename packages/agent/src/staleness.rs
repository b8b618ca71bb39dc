use std::time::Duration;

use chrono::{DateTime, Utc};

/// Whether a job created at `timestamp` (unix seconds) is too old to print at `now`.
///
/// An unrepresentable timestamp counts as stale.
pub fn is_stale(timestamp: i64, now: DateTime<Utc>, max_age: Duration) -> bool {
    let Some(created) = DateTime::from_timestamp(timestamp, 0) else {
        return true;
    };
    let Ok(max_age) = chrono::Duration::from_std(max_age) else {
        return false;
    };
    match now.checked_sub_signed(max_age) {
        Some(cutoff) => created < cutoff,
        None => false,
    }
}
