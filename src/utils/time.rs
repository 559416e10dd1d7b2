//! Timestamp helpers
//!
//! All timestamps are stored as RFC 3339 text in UTC with microsecond
//! precision, so lexical order in SQLite matches chronological order.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a timestamp for storage
pub fn to_db(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp (RFC 3339 or SQLite `datetime('now')` form)
pub fn parse_db_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S") {
        return Some(DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc));
    }
    None
}

/// Parse a required column, falling back to the epoch on corrupt data
pub fn parse_db_timestamp_or_epoch(ts: &str) -> DateTime<Utc> {
    parse_db_timestamp(ts).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
