//! End-to-end reconcile scenarios over a simulated channel: post,
//! reconcile, publish, repeat — the way the Discord runtime drives the
//! core.

use chrono::{NaiveDate, NaiveDateTime};

use larder_list::{
    apply_edited_lines, decode_table, reconcile, ChannelListConfig, ChannelMessage, PublishPlan,
    ReconcileOutcome,
};
use larder_store::{ListStore, SqliteListStore};

const BOT: &str = "bot-1";
const HUMAN: &str = "user-7";

// Midnight, matching the precision of the default date format, so
// published dates round-trip exactly.
fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 12, 27)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap()
}

/// Minimal channel stand-in: ordered messages plus id/clock counters.
struct ChannelSim {
    messages: Vec<ChannelMessage>,
    next_id: u64,
    clock: u64,
}

impl ChannelSim {
    fn new() -> Self {
        Self {
            messages: Vec::new(),
            next_id: 1,
            clock: 1_000,
        }
    }

    fn post(&mut self, author: &str, text: &str) {
        self.clock += 100;
        self.messages.push(ChannelMessage {
            id: format!("m{}", self.next_id),
            author_id: author.to_string(),
            timestamp_unix_ms: self.clock,
            text: text.to_string(),
        });
        self.next_id += 1;
    }

    fn run_cycle(&mut self, config: &ChannelListConfig) -> ReconcileOutcome {
        let outcome = reconcile(&self.messages, BOT, config, now());
        self.messages
            .retain(|message| !outcome.delete_ids.contains(&message.id));
        match &outcome.plan {
            PublishPlan::Replace { message_id, text } => {
                for message in &mut self.messages {
                    if &message.id == message_id {
                        message.text = text.clone();
                    }
                }
            }
            PublishPlan::Create { texts } => {
                for text in texts {
                    self.post(BOT, text);
                }
            }
        }
        outcome
    }

    fn bot_messages(&self) -> Vec<&ChannelMessage> {
        self.messages
            .iter()
            .filter(|message| message.author_id == BOT)
            .collect()
    }
}

#[test]
fn grocery_flow_across_cycles() {
    let config = ChannelListConfig::new("chan-1", "groceries");
    let mut channel = ChannelSim::new();

    channel.post(HUMAN, "bacon");
    channel.post(HUMAN, "13 eggs");
    channel.post(HUMAN, "milk 2");
    let outcome = channel.run_cycle(&config);
    assert_eq!(
        outcome
            .entries
            .iter()
            .map(|entry| (entry.position, entry.name.as_str(), entry.quantity))
            .collect::<Vec<_>>(),
        vec![(1, "bacon", 1), (2, "eggs", 13), (3, "milk", 2)]
    );
    // the channel now holds exactly the snapshot
    assert_eq!(channel.messages.len(), 1);
    assert_eq!(channel.bot_messages().len(), 1);

    channel.post(HUMAN, "2");
    let outcome = channel.run_cycle(&config);
    assert_eq!(
        outcome
            .entries
            .iter()
            .map(|entry| (entry.position, entry.name.as_str(), entry.quantity))
            .collect::<Vec<_>>(),
        vec![(1, "bacon", 1), (2, "milk", 2)]
    );
    assert_eq!(channel.messages.len(), 1);
}

#[test]
fn reconcile_without_new_input_is_idempotent() {
    let config = ChannelListConfig::new("chan-1", "groceries");
    let mut channel = ChannelSim::new();
    channel.post(HUMAN, "bacon");
    channel.post(HUMAN, "coffee 2");
    channel.run_cycle(&config);
    let snapshot = channel.bot_messages()[0].text.clone();

    let outcome = channel.run_cycle(&config);
    assert!(outcome.delete_ids.is_empty());
    assert_eq!(channel.bot_messages()[0].text, snapshot);
    assert_eq!(outcome.plan.combined_text(), snapshot);
}

#[test]
fn wrapped_names_survive_cycles_unchanged() {
    let config = ChannelListConfig::new("chan-1", "groceries");
    let mut channel = ChannelSim::new();
    let long_name = "1234512345123451234512345";
    channel.post(HUMAN, long_name);
    channel.post(HUMAN, "a very long shopping item name 3");
    let first = channel.run_cycle(&config);
    assert_eq!(first.entries[0].name, long_name);
    assert_eq!(first.entries[1].name, "a very long shopping item name");
    assert_eq!(first.entries[1].quantity, 3);

    // decode what was actually published, then run another no-op cycle
    let published = decode_table(&channel.bot_messages()[0].text, &config, now());
    assert_eq!(published, first.entries);
    let second = channel.run_cycle(&config);
    assert_eq!(second.entries, first.entries);
}

#[test]
fn lists_grow_into_chunks_and_shrink_back() {
    let mut config = ChannelListConfig::new("chan-1", "groceries");
    config.message_limit = 200;
    let mut channel = ChannelSim::new();

    for index in 1..=12 {
        channel.post(HUMAN, &format!("item number {index}"));
    }
    let grown = channel.run_cycle(&config);
    assert_eq!(grown.entries.len(), 12);
    let chunk_count = channel.bot_messages().len();
    assert!(chunk_count > 1, "expected a chunked snapshot");
    for message in channel.bot_messages() {
        assert!(message.text.chars().count() <= 200);
    }

    // a fresh cycle decodes the chunk run as one table
    let rebuilt = channel.run_cycle(&config);
    assert_eq!(rebuilt.entries, grown.entries);

    channel.post(HUMAN, "*");
    let cleared = channel.run_cycle(&config);
    assert!(cleared.entries.is_empty());
    assert_eq!(channel.bot_messages().len(), 1);
}

#[test]
fn edit_submission_flows_back_through_reconcile() {
    let config = ChannelListConfig::new("chan-1", "groceries");
    let mut channel = ChannelSim::new();
    channel.post(HUMAN, "bacon");
    channel.post(HUMAN, "eggs 4");
    let outcome = channel.run_cycle(&config);

    // the dialog submission rewrites the list wholesale
    let merged = apply_edited_lines(&outcome.entries, "[2] eggs, 6\nbutter", now());
    assert_eq!(
        merged
            .iter()
            .map(|entry| (entry.position, entry.name.as_str(), entry.quantity))
            .collect::<Vec<_>>(),
        vec![(1, "eggs", 6), (2, "butter", 1)]
    );
    // the updated entry keeps its original added date
    assert_eq!(merged[0].added, outcome.entries[1].added);
}

#[test]
fn published_lists_mirror_into_sqlite() {
    let config = ChannelListConfig::new("chan-1", "groceries");
    let mut channel = ChannelSim::new();
    channel.post(HUMAN, "bacon");
    channel.post(HUMAN, "13 eggs");
    let outcome = channel.run_cycle(&config);

    let tempdir = tempfile::tempdir().expect("tempdir");
    let store = SqliteListStore::open(tempdir.path().join("larder.sqlite")).expect("store");
    store
        .replace_all(&config.channel_id, &outcome.entries)
        .expect("mirror");
    assert_eq!(
        store.load(&config.channel_id).expect("load"),
        outcome.entries
    );
}
