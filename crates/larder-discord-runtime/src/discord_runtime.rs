//! Discord bridge runtime: consumes gateway events and republishes
//! reconciled list tables.
//!
//! Event handling is sequential: one dispatch is processed to
//! completion before the next is read from the socket, so reconcile
//! cycles for a channel never overlap. In-memory list state is adopted
//! only after a full cycle (history fetch, deletions, publish)
//! succeeds; a failed cycle leaves the previous state in place.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use larder_core::now_local_minute;
use larder_gateway::RuntimeMetrics;
use larder_list::{
    apply_edited_lines, encode_table, reconcile, render_edit_lines, ChannelListConfig,
    ChannelMessage, ListEntry, PublishPlan,
};
use larder_store::ListStore;

mod discord_api_client;
mod discord_helpers;

use discord_api_client::DiscordApiClient;
use discord_helpers::{
    is_retryable_discord_status, is_retryable_transport_error, parse_retry_after, retry_delay,
    truncate_for_error,
};

const EDIT_BUTTON: &str = "edit-button";
const DONE_BUTTON: &str = "done-button";
const EDIT_MODAL: &str = "edit-modal";
const EDIT_MODAL_INPUT: &str = "edit-modal-input";

// GUILD_MESSAGES | MESSAGE_CONTENT
const GATEWAY_INTENTS: u64 = (1 << 9) | (1 << 15);
const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 41_250;

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_RECONNECT: u8 = 7;
const OP_INVALID_SESSION: u8 = 9;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

// Interaction payload types.
const INTERACTION_MESSAGE_COMPONENT: u64 = 3;
const INTERACTION_MODAL_SUBMIT: u64 = 5;
// Interaction callback types.
const CALLBACK_UPDATE_MESSAGE: u64 = 7;
const CALLBACK_MODAL: u64 = 9;

#[derive(Clone)]
/// Runtime configuration for the Discord bridge transport loop.
pub struct DiscordRuntimeConfig {
    pub bot_token: String,
    pub bot_user_id: Option<String>,
    pub api_base: String,
    pub gateway_url: String,
    pub channels: Vec<ChannelListConfig>,
    pub history_fetch_limit: usize,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
    pub reconnect_delay: Duration,
    pub store: Option<Arc<dyn ListStore>>,
    pub metrics: Arc<RuntimeMetrics>,
}

#[derive(Debug, Clone, Deserialize)]
struct GatewayEnvelope {
    op: u8,
    #[serde(default)]
    d: Value,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    t: Option<String>,
}

struct ChannelState {
    config: ChannelListConfig,
    entries: Vec<ListEntry>,
}

/// Runs the Discord bridge until shutdown is requested.
pub async fn run_discord_bridge(config: DiscordRuntimeConfig) -> Result<()> {
    let mut runtime = DiscordBridgeRuntime::new(config).await?;
    runtime.run().await
}

struct DiscordBridgeRuntime {
    config: DiscordRuntimeConfig,
    client: DiscordApiClient,
    bot_user_id: String,
    channels: HashMap<String, ChannelState>,
}

impl DiscordBridgeRuntime {
    async fn new(config: DiscordRuntimeConfig) -> Result<Self> {
        if config.channels.is_empty() {
            bail!("discord bridge requires at least one channel");
        }
        for channel in &config.channels {
            channel
                .validate()
                .with_context(|| format!("invalid channel configuration for '{}'", channel.name))?;
        }

        let client = DiscordApiClient::new(
            config.api_base.clone(),
            config.bot_token.clone(),
            config.request_timeout_ms,
            config.retry_max_attempts,
            config.retry_base_delay_ms,
        )?;

        let bot_user_id = match config.bot_user_id.clone() {
            Some(user_id) if !user_id.trim().is_empty() => user_id.trim().to_string(),
            _ => client.resolve_bot_user().await?.id,
        };

        let channels = config
            .channels
            .iter()
            .map(|channel| {
                (
                    channel.channel_id.clone(),
                    ChannelState {
                        config: channel.clone(),
                        entries: Vec::new(),
                    },
                )
            })
            .collect();

        Ok(Self {
            config,
            client,
            bot_user_id,
            channels,
        })
    }

    async fn run(&mut self) -> Result<()> {
        loop {
            match self.run_gateway_session().await {
                Ok(()) => return Ok(()),
                Err(error) => {
                    self.config.metrics.record_transport_failure();
                    tracing::warn!(%error, "discord gateway session ended");
                }
            }
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("discord bridge shutdown requested");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }
    }

    async fn run_gateway_session(&mut self) -> Result<()> {
        let (stream, _response) = connect_async(self.config.gateway_url.as_str())
            .await
            .context("failed to connect discord gateway websocket")?;
        let (mut sink, mut source) = stream.split();

        let heartbeat_interval_ms = loop {
            let Some(message_result) = source.next().await else {
                bail!("gateway closed before hello");
            };
            let message = message_result.context("failed reading gateway message")?;
            if let Some(envelope) = parse_gateway_envelope(message)? {
                if envelope.op == OP_HELLO {
                    break envelope
                        .d
                        .get("heartbeat_interval")
                        .and_then(Value::as_u64)
                        .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_MS);
                }
            }
        };
        tracing::info!(heartbeat_interval_ms, "discord gateway connected");

        send_json(&mut sink, &identify_payload(&self.config.bot_token)).await?;

        let mut heartbeat =
            tokio::time::interval(Duration::from_millis(heartbeat_interval_ms.max(1_000)));
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_sequence: Option<u64> = None;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("discord bridge shutdown requested");
                    return Ok(());
                }
                _ = heartbeat.tick() => {
                    send_json(&mut sink, &json!({ "op": OP_HEARTBEAT, "d": last_sequence })).await?;
                }
                maybe_message = source.next() => {
                    let Some(message_result) = maybe_message else {
                        bail!("gateway stream ended");
                    };
                    let message = message_result.context("failed reading gateway message")?;
                    let Some(envelope) = parse_gateway_envelope(message)? else {
                        continue;
                    };
                    if let Some(sequence) = envelope.s {
                        last_sequence = Some(sequence);
                    }
                    match envelope.op {
                        OP_DISPATCH => self.handle_dispatch(envelope).await,
                        OP_HEARTBEAT => {
                            send_json(&mut sink, &json!({ "op": OP_HEARTBEAT, "d": last_sequence })).await?;
                        }
                        OP_RECONNECT | OP_INVALID_SESSION => bail!("gateway requested reconnect"),
                        OP_HEARTBEAT_ACK => {}
                        _ => {}
                    }
                }
            }
        }
    }

    /// Dispatch failures are contained here: a failed REST call aborts
    /// one reconcile cycle, never the gateway session.
    async fn handle_dispatch(&mut self, envelope: GatewayEnvelope) {
        match envelope.t.as_deref() {
            Some("READY") => {
                let channel_ids: Vec<String> = self.channels.keys().cloned().collect();
                for channel_id in channel_ids {
                    if let Err(error) = self.run_channel_cycle(&channel_id).await {
                        self.config.metrics.record_transport_failure();
                        tracing::warn!(%error, %channel_id, "startup reconcile failed");
                    }
                }
            }
            Some("MESSAGE_CREATE") => {
                let channel_id = envelope
                    .d
                    .get("channel_id")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                let author_id = envelope
                    .d
                    .pointer("/author/id")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                if !self.channels.contains_key(&channel_id) || author_id == self.bot_user_id {
                    return;
                }
                if let Err(error) = self.run_channel_cycle(&channel_id).await {
                    self.config.metrics.record_transport_failure();
                    tracing::warn!(%error, %channel_id, "reconcile cycle failed");
                }
            }
            Some("INTERACTION_CREATE") => {
                if let Err(error) = self.handle_interaction(&envelope.d).await {
                    self.config.metrics.record_transport_failure();
                    tracing::warn!(%error, "interaction handling failed");
                }
            }
            _ => {}
        }
    }

    /// One reconcile cycle: fetch history, rebuild the list, drop every
    /// superseded message, republish, and only then adopt the state.
    async fn run_channel_cycle(&mut self, channel_id: &str) -> Result<()> {
        let Some(state) = self.channels.get(channel_id) else {
            return Ok(());
        };
        let channel_config = state.config.clone();

        let history = self
            .client
            .list_messages(channel_id, self.config.history_fetch_limit)
            .await?;
        let messages: Vec<ChannelMessage> = history
            .iter()
            .map(|message| ChannelMessage {
                id: message.id.clone(),
                author_id: message.author.id.clone(),
                timestamp_unix_ms: message.timestamp_unix_ms(),
                text: message.content.clone(),
            })
            .collect();

        let outcome = reconcile(&messages, &self.bot_user_id, &channel_config, now_local_minute());

        if !outcome.delete_ids.is_empty() {
            self.client
                .delete_messages(channel_id, &outcome.delete_ids)
                .await?;
            self.config.metrics.record_deleted(outcome.delete_ids.len());
        }

        let published = match &outcome.plan {
            PublishPlan::Replace { message_id, text } => {
                let unchanged = history
                    .iter()
                    .any(|message| &message.id == message_id && &message.content == text);
                if unchanged {
                    0
                } else {
                    self.client
                        .edit_message(channel_id, message_id, text, Some(message_buttons()))
                        .await?;
                    1
                }
            }
            PublishPlan::Create { texts } => {
                for (index, text) in texts.iter().enumerate() {
                    // buttons ride on the final chunk only
                    let components = (index + 1 == texts.len()).then(message_buttons);
                    self.client
                        .create_message(channel_id, text, components)
                        .await?;
                }
                texts.len()
            }
        };

        self.config.metrics.record_cycle(outcome.processed_lines);
        self.config.metrics.record_published(published);
        self.mirror_to_store(channel_id, &outcome.entries);
        if let Some(state) = self.channels.get_mut(channel_id) {
            state.entries = outcome.entries;
        }
        Ok(())
    }

    async fn handle_interaction(&mut self, interaction: &Value) -> Result<()> {
        let channel_id = interaction
            .get("channel_id")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let Some(state) = self.channels.get(&channel_id) else {
            return Ok(());
        };
        let channel_config = state.config.clone();
        let entries = state.entries.clone();

        let interaction_id = interaction
            .get("id")
            .and_then(Value::as_str)
            .context("interaction without id")?
            .to_string();
        let interaction_token = interaction
            .get("token")
            .and_then(Value::as_str)
            .context("interaction without token")?
            .to_string();
        let interaction_type = interaction.get("type").and_then(Value::as_u64).unwrap_or(0);
        let custom_id = interaction
            .pointer("/data/custom_id")
            .and_then(Value::as_str)
            .unwrap_or("");

        match (interaction_type, custom_id) {
            (INTERACTION_MESSAGE_COMPONENT, EDIT_BUTTON) => {
                let payload = edit_modal_payload(&channel_config.name, &entries);
                self.client
                    .create_interaction_response(&interaction_id, &interaction_token, &payload)
                    .await?;
            }
            (INTERACTION_MESSAGE_COMPONENT, DONE_BUTTON) => {
                let cleared: Vec<ListEntry> = Vec::new();
                let payload = update_message_payload(&encode_table(&cleared, &channel_config));
                self.client
                    .create_interaction_response(&interaction_id, &interaction_token, &payload)
                    .await?;
                self.config.metrics.record_published(1);
                self.mirror_to_store(&channel_id, &cleared);
                if let Some(state) = self.channels.get_mut(&channel_id) {
                    state.entries = cleared;
                }
            }
            (INTERACTION_MODAL_SUBMIT, EDIT_MODAL) => {
                let submitted = interaction
                    .pointer("/data/components/0/components/0/value")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                let merged = apply_edited_lines(&entries, submitted, now_local_minute());
                let payload = update_message_payload(&encode_table(&merged, &channel_config));
                self.client
                    .create_interaction_response(&interaction_id, &interaction_token, &payload)
                    .await?;
                self.config.metrics.record_published(1);
                self.mirror_to_store(&channel_id, &merged);
                if let Some(state) = self.channels.get_mut(&channel_id) {
                    state.entries = merged;
                }
            }
            _ => {
                tracing::debug!(
                    interaction_type,
                    custom_id,
                    "unmapped interaction event"
                );
            }
        }
        Ok(())
    }

    /// Mirror failures are logged and never abort a cycle; the channel
    /// remains the authoritative store.
    fn mirror_to_store(&self, channel_id: &str, entries: &[ListEntry]) {
        if let Some(store) = &self.config.store {
            if let Err(error) = store.replace_all(channel_id, entries) {
                tracing::warn!(%error, channel_id, "failed to mirror list snapshot");
            }
        }
    }
}

fn parse_gateway_envelope(message: WsMessage) -> Result<Option<GatewayEnvelope>> {
    match message {
        WsMessage::Text(text) => {
            let envelope = serde_json::from_str::<GatewayEnvelope>(&text)
                .context("failed to parse gateway envelope")?;
            Ok(Some(envelope))
        }
        WsMessage::Binary(bytes) => {
            let text =
                String::from_utf8(bytes.to_vec()).context("invalid utf-8 gateway payload")?;
            let envelope = serde_json::from_str::<GatewayEnvelope>(&text)
                .context("failed to parse gateway envelope")?;
            Ok(Some(envelope))
        }
        WsMessage::Ping(_) | WsMessage::Pong(_) => Ok(None),
        WsMessage::Close(_) => Ok(None),
        WsMessage::Frame(_) => Ok(None),
    }
}

async fn send_json<S>(sink: &mut S, payload: &Value) -> Result<()>
where
    S: futures_util::Sink<WsMessage> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    sink.send(WsMessage::Text(payload.to_string().into()))
        .await
        .context("failed to send gateway payload")
}

fn identify_payload(bot_token: &str) -> Value {
    json!({
        "op": OP_IDENTIFY,
        "d": {
            "token": bot_token,
            "intents": GATEWAY_INTENTS,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "larder",
                "device": "larder",
            },
        },
    })
}

/// The two click targets attached to every published table.
fn message_buttons() -> Value {
    json!([
        {
            "type": 1,
            "components": [
                {
                    "type": 2,
                    "style": 2,
                    "emoji": { "name": "📝" },
                    "custom_id": EDIT_BUTTON,
                },
                {
                    "type": 2,
                    "style": 2,
                    "emoji": { "name": "🏁" },
                    "custom_id": DONE_BUTTON,
                },
            ],
        }
    ])
}

fn edit_modal_payload(list_name: &str, entries: &[ListEntry]) -> Value {
    json!({
        "type": CALLBACK_MODAL,
        "data": {
            "custom_id": EDIT_MODAL,
            "title": format!("Edit {list_name} list"),
            "components": [
                {
                    "type": 1,
                    "components": [
                        {
                            "type": 4,
                            "custom_id": EDIT_MODAL_INPUT,
                            "style": 2,
                            "label": "Items",
                            "required": false,
                            "value": render_edit_lines(entries),
                        }
                    ],
                }
            ],
        },
    })
}

fn update_message_payload(content: &str) -> Value {
    json!({
        "type": CALLBACK_UPDATE_MESSAGE,
        "data": {
            "content": content,
            "components": message_buttons(),
        },
    })
}
