//! Creation/update timestamps carried by upstream rows

use crate::extract::normalize::field_ci;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

/// Fields that may carry a creation or update time
const TIMESTAMP_FIELDS: &[&str] = &[
    "created_at",
    "createdAt",
    "updated_at",
    "updatedAt",
    "date_created",
    "fecha_creacion",
    "fecha_alta",
    "created",
    "listed_at",
];

/// Epoch values above this are milliseconds
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Returns the latest creation/update time found in a raw row
pub fn source_timestamp(raw: &Map<String, Value>) -> Option<DateTime<Utc>> {
    TIMESTAMP_FIELDS
        .iter()
        .filter_map(|name| field_ci(raw, name))
        .filter_map(parse_timestamp)
        .max()
}

/// Same as [`source_timestamp`] for a row that may not be an object
pub fn row_timestamp(row: &Value) -> Option<DateTime<Utc>> {
    row.as_object().and_then(source_timestamp)
}

/// Parses RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DD` and epoch seconds or milliseconds
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => from_epoch(n.as_i64()?),
        Value::String(s) => parse_timestamp_str(s.trim()),
        _ => None,
    }
}

fn parse_timestamp_str(text: &str) -> Option<DateTime<Utc>> {
    if text.is_empty() {
        return None;
    }

    if text.chars().all(|c| c.is_ascii_digit()) {
        return from_epoch(text.parse().ok()?);
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn from_epoch(value: i64) -> Option<DateTime<Utc>> {
    if value >= EPOCH_MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(value)
    } else {
        DateTime::from_timestamp(value, 0)
    }
}
