use chrono::{Local, NaiveDateTime, Timelike};

/// Returns the current Unix timestamp in milliseconds.
pub fn current_unix_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

/// Returns the local wall-clock time truncated to the minute.
///
/// Entry timestamps carry minute precision at most; the table date
/// column usually renders even less.
pub fn now_local_minute() -> NaiveDateTime {
    truncate_to_minute(Local::now().naive_local())
}

/// Drops seconds and sub-second precision from `value`.
pub fn truncate_to_minute(value: NaiveDateTime) -> NaiveDateTime {
    value
        .with_second(0)
        .and_then(|truncated| truncated.with_nanosecond(0))
        .unwrap_or(value)
}
