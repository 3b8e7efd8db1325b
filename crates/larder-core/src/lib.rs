//! Foundational low-level utilities shared across Larder crates.
//!
//! Provides timestamp helpers and the lenient short-date codec used by
//! list entries and the published table format.

pub mod date_codec;
pub mod time_utils;

pub use date_codec::{
    format_short_date, is_valid_date_format, parse_short_date, DEFAULT_DATE_FORMAT,
};
pub use time_utils::{current_unix_timestamp_ms, now_local_minute, truncate_to_minute};
