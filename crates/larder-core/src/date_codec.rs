//! Lenient short-date parsing and formatting for table date cells.
//!
//! Channel tables render dates through a configurable strftime format
//! that often omits the year (`%d.%m.`); decoding backfills omitted
//! fields from the reference time instead of failing.

use chrono::format::{Item, StrftimeItems};
use chrono::{Datelike, NaiveDate, NaiveDateTime};

/// Date format used when a channel does not configure its own.
pub const DEFAULT_DATE_FORMAT: &str = "%d.%m.%y";

/// Returns true when `format` is a well-formed strftime string.
pub fn is_valid_date_format(format: &str) -> bool {
    !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}

/// Formats `value` with `format`, falling back to [`DEFAULT_DATE_FORMAT`]
/// when the format string itself is malformed.
pub fn format_short_date(value: NaiveDateTime, format: &str) -> String {
    if is_valid_date_format(format) {
        value.format(format).to_string()
    } else {
        value.format(DEFAULT_DATE_FORMAT).to_string()
    }
}

/// Parses a date cell rendered with `format`.
///
/// Tried in order: full datetime, date-only, then date with the year
/// borrowed from `now` for year-less formats. Returns `None` when the
/// text matches none of these; callers default rather than fail.
pub fn parse_short_date(text: &str, format: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() || !is_valid_date_format(format) {
        return None;
    }
    if let Ok(value) = NaiveDateTime::parse_from_str(text, format) {
        return Some(value);
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, format) {
        return date.and_hms_opt(0, 0, 0);
    }
    let with_year = format!("{text}{}", now.year());
    let format_with_year = format!("{format}%Y");
    if let Ok(date) = NaiveDate::parse_from_str(&with_year, &format_with_year) {
        return date.and_hms_opt(0, 0, 0);
    }
    None
}
