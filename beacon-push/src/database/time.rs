//! Timestamp helpers for the database layer.
//!
//! Timestamps are stored as `INTEGER` Unix epoch milliseconds (UTC).

use chrono::Utc;

/// Current time as Unix epoch milliseconds (UTC).
#[inline]
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Oldest creation timestamp still inside a trailing window of `window_ms`.
#[inline]
pub fn window_start_ms(now_ms: i64, window_ms: i64) -> i64 {
    now_ms.saturating_sub(window_ms)
}
