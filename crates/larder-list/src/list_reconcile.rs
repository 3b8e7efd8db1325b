//! Reconciliation: rebuilds authoritative list state from channel
//! history and plans the republish.
//!
//! The channel is the database. The trailing run of bot-authored
//! messages is the live snapshot; every human message is unprocessed
//! input; one pass decodes, applies, re-encodes, and marks everything
//! but the retained snapshot for deletion.

use chrono::NaiveDateTime;

use crate::list_entry::{ChannelListConfig, ListEntry};
use crate::list_mutation::apply_batch;
use crate::list_table::{decode_table, encode_table_chunks};

#[derive(Debug, Clone, PartialEq, Eq)]
/// One message from channel history, transport-agnostic.
pub struct ChannelMessage {
    pub id: String,
    pub author_id: String,
    pub timestamp_unix_ms: u64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// How the reconciled table reaches the channel.
pub enum PublishPlan {
    /// Replace the retained snapshot message in place.
    Replace { message_id: String, text: String },
    /// Post fresh messages, one per chunk; nothing is retained.
    Create { texts: Vec<String> },
}

impl PublishPlan {
    /// The concatenated outgoing table text, chunk boundaries ignored.
    pub fn combined_text(&self) -> String {
        match self {
            Self::Replace { text, .. } => text.clone(),
            Self::Create { texts } => texts.join("\n"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Result of one reconciliation cycle.
pub struct ReconcileOutcome {
    pub entries: Vec<ListEntry>,
    pub plan: PublishPlan,
    pub delete_ids: Vec<String>,
    pub processed_lines: usize,
}

/// Rebuilds the authoritative list from `messages`.
///
/// Input order does not matter; processing is strictly chronological
/// (ties broken by message id). Human message lines apply oldest
/// message first, top line first. With no bot message in history the
/// list starts empty and the plan creates the initial snapshot.
pub fn reconcile(
    messages: &[ChannelMessage],
    bot_user_id: &str,
    config: &ChannelListConfig,
    now: NaiveDateTime,
) -> ReconcileOutcome {
    let mut ordered: Vec<&ChannelMessage> = messages.iter().collect();
    ordered.sort_by(|a, b| {
        a.timestamp_unix_ms
            .cmp(&b.timestamp_unix_ms)
            .then_with(|| a.id.cmp(&b.id))
    });

    // The live snapshot: the trailing contiguous run of bot messages
    // ending at the newest one. Several messages in that run mean the
    // previous publish was chunked.
    let mut snapshot_ids: Vec<&str> = Vec::new();
    let mut snapshot_text = String::new();
    if let Some(end) = ordered
        .iter()
        .rposition(|message| message.author_id == bot_user_id)
    {
        let mut start = end;
        while start > 0 && ordered[start - 1].author_id == bot_user_id {
            start -= 1;
        }
        for message in &ordered[start..=end] {
            if !snapshot_text.is_empty() {
                snapshot_text.push('\n');
            }
            snapshot_text.push_str(&message.text);
            snapshot_ids.push(&message.id);
        }
    }

    let mut entries = if snapshot_text.is_empty() {
        Vec::new()
    } else {
        decode_table(&snapshot_text, config, now)
    };

    let mut processed_lines = 0;
    for message in &ordered {
        if message.author_id == bot_user_id {
            continue;
        }
        processed_lines += apply_batch(&mut entries, message.text.lines(), now);
    }

    let mut texts = encode_table_chunks(&entries, config);
    let retained_id = if texts.len() == 1 {
        snapshot_ids.last().map(|id| id.to_string())
    } else {
        None
    };

    let delete_ids: Vec<String> = ordered
        .iter()
        .filter(|message| Some(&message.id) != retained_id.as_ref())
        .map(|message| message.id.clone())
        .collect();

    let plan = match retained_id {
        Some(message_id) => PublishPlan::Replace {
            message_id,
            text: texts.remove(0),
        },
        None => PublishPlan::Create { texts },
    };

    ReconcileOutcome {
        entries,
        plan,
        delete_ids,
        processed_lines,
    }
}
