//! Timestamp utilities
//!
//! Timestamps are persisted as fixed-width RFC 3339 text (microsecond
//! precision, `Z` suffix) so that lexical order in SQLite equals
//! chronological order.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::{Error, Result};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a timestamp for storage
pub fn to_db(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time formatted for storage
pub fn now_db() -> String {
    to_db(now())
}

/// Parse a stored timestamp
pub fn from_db(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse timestamp '{}': {}", value, e)))
}

/// Parse an optional stored timestamp
pub fn from_db_opt(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(from_db).transpose()
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> std::time::Duration {
    std::time::Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_storage_format_is_fixed_width() {
        let a = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let b = a + chrono::Duration::microseconds(1_500);
        assert_eq!(to_db(a), "2024-01-02T03:04:05.000000Z");
        assert_eq!(to_db(a).len(), to_db(b).len());
        assert!(to_db(a) < to_db(b));
    }

    #[test]
    fn test_round_trip_preserves_micros() {
        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
            + chrono::Duration::microseconds(42);
        assert_eq!(from_db(&to_db(ts)).unwrap(), ts);
    }

    #[test]
    fn test_from_db_rejects_garbage() {
        assert!(from_db("yesterday").is_err());
    }

    #[test]
    fn test_from_db_opt_none() {
        assert!(from_db_opt(None).unwrap().is_none());
    }

    #[test]
    fn test_millis_to_duration_one_second() {
        assert_eq!(millis_to_duration(1000), std::time::Duration::from_secs(1));
    }
}
