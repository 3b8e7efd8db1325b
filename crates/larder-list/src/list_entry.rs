use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use larder_core::date_codec::{is_valid_date_format, DEFAULT_DATE_FORMAT};

/// Default wrap width for the item column.
pub const DEFAULT_MAX_CELL_WIDTH: usize = 20;
/// Default transport message character limit (Discord).
pub const DEFAULT_MESSAGE_LIMIT: usize = 2000;
/// Smallest message limit that still fits a table frame plus one row.
pub const MIN_MESSAGE_LIMIT: usize = 128;

#[derive(Debug, Error)]
/// Validation failures for channel list configuration.
pub enum ListError {
    #[error("channel id must not be empty")]
    EmptyChannelId,
    #[error("max cell width must be at least 1")]
    ZeroCellWidth,
    #[error("invalid date format '{0}'")]
    InvalidDateFormat(String),
    #[error("message limit {0} is below the minimum of {MIN_MESSAGE_LIMIT}")]
    MessageLimitTooSmall(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One line item of a channel list.
///
/// `position` is the dense 1..N index users type to remove the entry;
/// it is recomputed after every mutation and never has gaps.
pub struct ListEntry {
    pub position: u32,
    pub name: String,
    pub quantity: u32,
    pub added: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Per-channel list parameters.
pub struct ChannelListConfig {
    pub channel_id: String,
    pub name: String,
    pub max_cell_width: usize,
    pub date_format: String,
    pub message_limit: usize,
}

impl ChannelListConfig {
    /// Builds a config with default width, date format, and limit.
    pub fn new(channel_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            name: name.into(),
            max_cell_width: DEFAULT_MAX_CELL_WIDTH,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            message_limit: DEFAULT_MESSAGE_LIMIT,
        }
    }

    pub fn validate(&self) -> Result<(), ListError> {
        if self.channel_id.trim().is_empty() {
            return Err(ListError::EmptyChannelId);
        }
        if self.max_cell_width == 0 {
            return Err(ListError::ZeroCellWidth);
        }
        if !is_valid_date_format(&self.date_format) {
            return Err(ListError::InvalidDateFormat(self.date_format.clone()));
        }
        if self.message_limit < MIN_MESSAGE_LIMIT {
            return Err(ListError::MessageLimitTooSmall(self.message_limit));
        }
        Ok(())
    }
}
