//! Epoch-millisecond helpers; every stored timestamp is `*_ms`.
use chrono::{TimeZone, Utc};

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn add_days_ms(start_ms: i64, days: i64) -> i64 {
    start_ms.saturating_add(days.saturating_mul(MS_PER_DAY))
}

pub fn epoch_ms_to_iso(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_default()
        .to_rfc3339()
}
