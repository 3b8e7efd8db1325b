//! Discord REST client used by the bridge for message CRUD and
//! interaction callbacks.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::DateTime;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{
    is_retryable_discord_status, is_retryable_transport_error, parse_retry_after, retry_delay,
    truncate_for_error,
};

const BULK_DELETE_BATCH: usize = 100;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DiscordUser {
    pub(crate) id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DiscordMessage {
    pub(crate) id: String,
    pub(crate) author: DiscordUser,
    #[serde(default)]
    pub(crate) content: String,
    #[serde(default)]
    pub(crate) timestamp: String,
}

impl DiscordMessage {
    /// Message creation time in Unix milliseconds; unparseable
    /// timestamps sort to the epoch.
    pub(crate) fn timestamp_unix_ms(&self) -> u64 {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .map(|parsed| parsed.timestamp_millis().max(0) as u64)
            .unwrap_or(0)
    }
}

#[derive(Clone)]
pub(crate) struct DiscordApiClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl DiscordApiClient {
    pub(crate) fn new(
        api_base: String,
        bot_token: String,
        request_timeout_ms: u64,
        retry_max_attempts: usize,
        retry_base_delay_ms: u64,
    ) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("Larder-discord-bridge"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create discord api client")?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.trim().to_string(),
            retry_max_attempts: retry_max_attempts.max(1),
            retry_base_delay_ms: retry_base_delay_ms.max(1),
        })
    }

    fn authorization(&self) -> String {
        format!("Bot {}", self.bot_token)
    }

    pub(crate) async fn resolve_bot_user(&self) -> Result<DiscordUser> {
        self.request_json("get current user", || {
            self.http.get(format!("{}/users/@me", self.api_base))
        })
        .await
    }

    /// Fetches up to `limit` most recent channel messages (newest first,
    /// as the API returns them).
    pub(crate) async fn list_messages(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<DiscordMessage>> {
        self.request_json("list channel messages", || {
            self.http
                .get(format!(
                    "{}/channels/{channel_id}/messages",
                    self.api_base
                ))
                .query(&[("limit", limit.clamp(1, 100).to_string())])
        })
        .await
    }

    pub(crate) async fn create_message(
        &self,
        channel_id: &str,
        content: &str,
        components: Option<Value>,
    ) -> Result<DiscordMessage> {
        let payload = message_payload(content, components);
        self.request_json("create message", || {
            self.http
                .post(format!(
                    "{}/channels/{channel_id}/messages",
                    self.api_base
                ))
                .json(&payload)
        })
        .await
    }

    pub(crate) async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        content: &str,
        components: Option<Value>,
    ) -> Result<DiscordMessage> {
        let payload = message_payload(content, components);
        self.request_json("edit message", || {
            self.http
                .patch(format!(
                    "{}/channels/{channel_id}/messages/{message_id}",
                    self.api_base
                ))
                .json(&payload)
        })
        .await
    }

    /// Deletes `message_ids` from `channel_id`: a single id goes through
    /// the plain delete endpoint, more go through bulk-delete batches
    /// with per-id fallback when a batch is rejected (bulk-delete
    /// refuses messages older than two weeks).
    pub(crate) async fn delete_messages(
        &self,
        channel_id: &str,
        message_ids: &[String],
    ) -> Result<()> {
        match message_ids {
            [] => Ok(()),
            [message_id] => self.delete_single_message(channel_id, message_id).await,
            _ => {
                for batch in message_ids.chunks(BULK_DELETE_BATCH) {
                    if batch.len() == 1 {
                        self.delete_single_message(channel_id, &batch[0]).await?;
                        continue;
                    }
                    let result = self
                        .request_empty("bulk delete messages", || {
                            self.http
                                .post(format!(
                                    "{}/channels/{channel_id}/messages/bulk-delete",
                                    self.api_base
                                ))
                                .json(&json!({ "messages": batch }))
                        })
                        .await;
                    if let Err(error) = result {
                        tracing::warn!(%error, "bulk delete rejected, falling back to single deletes");
                        for message_id in batch {
                            self.delete_single_message(channel_id, message_id).await?;
                        }
                    }
                }
                Ok(())
            }
        }
    }

    async fn delete_single_message(&self, channel_id: &str, message_id: &str) -> Result<()> {
        self.request_empty("delete message", || {
            self.http.delete(format!(
                "{}/channels/{channel_id}/messages/{message_id}",
                self.api_base
            ))
        })
        .await
    }

    /// Answers an interaction (modal open, message update). The
    /// callback endpoint is unauthenticated; the token in the path is
    /// the credential.
    pub(crate) async fn create_interaction_response(
        &self,
        interaction_id: &str,
        interaction_token: &str,
        payload: &Value,
    ) -> Result<()> {
        self.request_empty("interaction callback", || {
            self.http
                .post(format!(
                    "{}/interactions/{interaction_id}/{interaction_token}/callback",
                    self.api_base
                ))
                .json(payload)
        })
        .await
    }

    async fn request_json<T, F>(&self, description: &str, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let response = self.send_with_retry(description, &build).await?;
        response
            .json::<T>()
            .await
            .with_context(|| format!("failed to decode discord {description} response"))
    }

    async fn request_empty<F>(&self, description: &str, build: F) -> Result<()>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        self.send_with_retry(description, &build).await?;
        Ok(())
    }

    async fn send_with_retry<F>(&self, description: &str, build: &F) -> Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let request = build().header(reqwest::header::AUTHORIZATION, self.authorization());
            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if is_retryable_discord_status(status.as_u16())
                        && attempt < self.retry_max_attempts
                    {
                        let retry_after = parse_retry_after(response.headers());
                        tokio::time::sleep(retry_delay(
                            self.retry_base_delay_ms,
                            attempt,
                            retry_after,
                        ))
                        .await;
                        continue;
                    }
                    let body = response.text().await.unwrap_or_default();
                    bail!(
                        "discord {description} failed: status={status} body={}",
                        truncate_for_error(&body)
                    );
                }
                Err(error) => {
                    if is_retryable_transport_error(&error) && attempt < self.retry_max_attempts {
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(error)
                        .with_context(|| format!("discord {description} request failed"));
                }
            }
        }
    }
}

fn message_payload(content: &str, components: Option<Value>) -> Value {
    match components {
        Some(components) => json!({ "content": content, "components": components }),
        None => json!({ "content": content, "components": [] }),
    }
}
