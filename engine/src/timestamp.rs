//! Recency timestamps and the helpers that compare them.
//!
//! Records carry `updatedAt` either as an ISO-8601 string or as epoch
//! milliseconds. Both forms are reduced to milliseconds before comparison;
//! fractional numbers are truncated, and anything missing, unparseable or of
//! another JSON type counts as time zero so that any concrete timestamp
//! outranks it.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::Timestamp;

/// A timestamp as it appears in a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Stamp {
    /// Milliseconds since the Unix epoch
    Millis(i64),
    /// ISO-8601 / RFC 3339 text
    Text(String),
    /// Any other JSON value, kept verbatim
    Other(Value),
}

impl Stamp {
    /// The current UTC time as RFC 3339 text with millisecond precision.
    pub fn now() -> Self {
        Stamp::Text(now_rfc3339())
    }

    /// Milliseconds since the epoch, or 0 when the value cannot be read as
    /// a time.
    pub fn millis(&self) -> Timestamp {
        match self {
            Stamp::Millis(ms) => *ms,
            Stamp::Text(text) => parse_millis(text).unwrap_or(0),
            Stamp::Other(value) => value
                .as_f64()
                .filter(|ms| ms.is_finite())
                .map_or(0, |ms| ms as Timestamp),
        }
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stamp::Millis(ms) => write!(f, "{ms}"),
            Stamp::Text(text) => f.write_str(text),
            Stamp::Other(value) => write!(f, "{value}"),
        }
    }
}

impl From<&Stamp> for Value {
    fn from(stamp: &Stamp) -> Self {
        match stamp {
            Stamp::Millis(ms) => Value::from(*ms),
            Stamp::Text(text) => Value::String(text.clone()),
            Stamp::Other(value) => value.clone(),
        }
    }
}

impl From<&str> for Stamp {
    fn from(text: &str) -> Self {
        Stamp::Text(text.to_string())
    }
}

impl From<i64> for Stamp {
    fn from(ms: i64) -> Self {
        Stamp::Millis(ms)
    }
}

/// Milliseconds for an optional stamp; absent stamps are time zero.
pub fn stamp_millis(stamp: Option<&Stamp>) -> Timestamp {
    stamp.map_or(0, Stamp::millis)
}

/// Parse ISO-8601 text into epoch milliseconds.
///
/// Accepts full RFC 3339, minute precision (`2026-02-10T08:00Z`), naive
/// date-times (read as UTC) and bare dates (midnight UTC).
pub fn parse_millis(text: &str) -> Option<Timestamp> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let normalized = match text.strip_suffix(['Z', 'z']) {
        Some(head) => format!("{head}+00:00"),
        None => text.to_string(),
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt.timestamp_millis());
    }
    if let Ok(dt) = DateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M%:z") {
        return Some(dt.timestamp_millis());
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().timestamp_millis())
}

/// The current UTC time as RFC 3339 text.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// File name suggested for an exported container, e.g. `Sync_2026-02-10_0830.wlsync`.
pub fn suggested_filename(at: NaiveDateTime, extension: &str) -> String {
    format!("Sync_{}.{}", at.format("%Y-%m-%d_%H%M"), extension)
}
