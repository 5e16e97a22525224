//! Epoch-millisecond timestamp helpers.

use chrono::{DateTime, Duration, TimeZone, Utc};

/// Represents a point in time in UTC.
pub type Timestamp = DateTime<Utc>;

/// Returns the current time as epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Converts epoch milliseconds to a UTC timestamp.
///
/// Out-of-range values yield `None`.
#[must_use]
pub fn from_millis(millis: i64) -> Option<Timestamp> {
    Utc.timestamp_millis_opt(millis).single()
}

/// Returns true if `created_at_millis` lies more than `days` before `now`.
#[must_use]
pub fn is_older_than_days(created_at_millis: i64, days: u32, now: Timestamp) -> bool {
    match from_millis(created_at_millis) {
        Some(created_at) => now - created_at > Duration::days(i64::from(days)),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_millis_round_trips() {
        let now = now_millis();
        let ts = from_millis(now).unwrap();
        assert_eq!(ts.timestamp_millis(), now);
    }

    #[test]
    fn test_older_than_days() {
        let now = Utc::now();
        let day = Duration::days(1).num_milliseconds();
        let now_ms = now.timestamp_millis();

        assert!(!is_older_than_days(now_ms - day, 30, now));
        assert!(!is_older_than_days(now_ms - 29 * day, 30, now));
        assert!(is_older_than_days(now_ms - 31 * day, 30, now));
        assert!(is_older_than_days(i64::MAX, 30, now));
    }
}
