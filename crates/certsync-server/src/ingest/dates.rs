//! Date parsing for upstream feeds
//!
//! Both sources hand out dates as loosely formatted strings. Calendar dates
//! are interpreted as UTC midnight.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Parse a calendar date in `YYYY-MM-DD`, `MM/DD/YYYY` or `M/D/YY` form
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }

    let parts: Vec<&str> = raw.split('/').collect();
    if parts.len() != 3 {
        return None;
    }
    let format = if parts[2].len() <= 2 { "%m/%d/%y" } else { "%m/%d/%Y" };
    NaiveDate::parse_from_str(raw, format).ok()
}

/// Parse a point in time; bare dates resolve to UTC midnight
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in DATE_TIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts.and_utc());
        }
    }
    parse_date(raw).and_then(|d| d.and_hms_opt(0, 0, 0)).map(|ts| ts.and_utc())
}

/// Expiry as epoch milliseconds, 0 when unparsable
///
/// Calendar dates and naive date-times land on UTC midnight of their day;
/// RFC 3339 values keep their instant.
pub fn parse_expiry(raw: &str) -> i64 {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return ts.timestamp_millis();
    }
    let date = DATE_TIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
        .map(|ts| ts.date())
        .or_else(|| parse_date(raw));

    date.and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc().timestamp_millis())
        .unwrap_or(0)
}
