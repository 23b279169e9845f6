//! Wall-clock timestamps for protocol payloads.
//!
//! Timestamps are RFC 3339 UTC strings with millisecond precision, matching
//! what browser and mobile clients produce with `toISOString()`. Within one
//! process they never go backwards, even if the system clock is stepped.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, SecondsFormat, Utc};

static LAST_ISSUED_MS: AtomicI64 = AtomicI64::new(i64::MIN);

/// Current time in milliseconds since the Unix epoch, clamped so it is never
/// lower than a value previously returned in this process.
pub fn now_millis() -> i64 {
    let now = Utc::now().timestamp_millis();
    let previous = LAST_ISSUED_MS.fetch_max(now, Ordering::AcqRel);
    previous.max(now)
}

/// Current time as an RFC 3339 string (e.g. `2024-05-01T12:00:00.000Z`).
pub fn now_rfc3339() -> String {
    format_millis(now_millis())
}

/// Format a Unix millisecond timestamp as RFC 3339 UTC.
pub fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}
