//! Slack Web API client.
//!
//! A thin authenticated wrapper: one method per API call, no state beyond
//! the HTTP client, the bot token, and the pacing policy. Every call is
//! preceded by a fixed sleep, and calls that hit the platform's rate limit
//! retry a bounded number of times honoring Retry-After.

pub mod wire;

use crate::archive::{ts_to_epoch, UserProfile};
use crate::config::{Config, PacingConfig};
use crate::error::{Error, Result, SlackError};
use anyhow::Context as _;
use chrono::{DateTime, Local};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use wire::{
    ApiResponse, AuthTestBody, ChannelInfo, ChannelListBody, EmptyBody, HistoryBody,
    MessageEnvelope, PostMessageBody, UploadUrlBody, UserInfoBody,
};

const SLACK_API_BASE: &str = "https://slack.com/api";

/// Slack caps conversations.history at 15 messages per request.
const HISTORY_PAGE_LIMIT: u16 = 15;

const LIST_PAGE_LIMIT: u16 = 200;

/// Platform limit on message text length.
const MAX_MESSAGE_LEN: usize = 4000;

/// Identity returned by auth.test.
#[derive(Debug, Clone)]
pub struct BotIdentity {
    pub user: String,
    pub team: String,
    pub user_id: String,
}

/// Authenticated Slack Web API client.
pub struct SlackClient {
    http: reqwest::Client,
    token: String,
    pacing: PacingConfig,
}

impl SlackClient {
    pub fn new(token: impl Into<String>, pacing: PacingConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            token: token.into(),
            pacing,
        })
    }

    /// Build a client from loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let token = config
            .slack
            .bot_token
            .as_deref()
            .ok_or(SlackError::MissingToken)?;
        Self::new(token, config.pacing)
    }

    /// Verify the token and report the bot's identity.
    pub async fn auth_test(&self) -> Result<BotIdentity> {
        self.pace(self.pacing.call_delay).await;
        let body: AuthTestBody = self.get_json("auth.test", &[]).await?;

        tracing::info!(
            bot = %body.user,
            team = %body.team,
            user_id = %body.user_id,
            "connected to slack"
        );

        Ok(BotIdentity {
            user: body.user,
            team: body.team,
            user_id: body.user_id,
        })
    }

    /// Public channels the bot is a member of.
    pub async fn list_channels(&self) -> Result<Vec<ChannelInfo>> {
        let channels = self.list_all_channels().await?;
        let accessible: Vec<ChannelInfo> =
            channels.into_iter().filter(|c| c.is_member).collect();

        tracing::info!(count = accessible.len(), "accessible channels listed");
        Ok(accessible)
    }

    /// Find a public channel by name, member or not.
    pub async fn find_channel(&self, name: &str) -> Result<ChannelInfo> {
        self.list_all_channels()
            .await?
            .into_iter()
            .find(|c| c.name == name)
            .ok_or_else(|| SlackError::ChannelNotFound(name.to_string()).into())
    }

    async fn list_all_channels(&self) -> Result<Vec<ChannelInfo>> {
        let mut channels = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            self.pace(self.pacing.call_delay).await;

            let mut query = vec![
                ("types", "public_channel".to_string()),
                ("limit", LIST_PAGE_LIMIT.to_string()),
            ];
            if let Some(c) = &cursor {
                query.push(("cursor", c.clone()));
            }

            let page: ChannelListBody = self.get_json("conversations.list", &query).await?;
            channels.extend(page.channels);

            match page.response_metadata.cursor() {
                Some(next) => cursor = Some(next.to_string()),
                None => break,
            }
        }

        Ok(channels)
    }

    /// Paginate a channel's history, newest first as the API returns it.
    ///
    /// With `oldest` set, pagination stops as soon as a page crosses the
    /// window bound and older messages are dropped. Without it, pagination
    /// follows the cursor to the beginning of the channel.
    pub async fn channel_history(
        &self,
        channel_id: &str,
        oldest: Option<DateTime<Local>>,
    ) -> Result<Vec<MessageEnvelope>> {
        let oldest_epoch = oldest.map(|t| t.timestamp() as f64);

        let mut collected: Vec<MessageEnvelope> = Vec::new();
        let mut cursor: Option<String> = None;
        let mut page_count = 0u32;

        loop {
            page_count += 1;
            self.pace(self.pacing.call_delay).await;

            let mut query = vec![
                ("channel", channel_id.to_string()),
                ("limit", HISTORY_PAGE_LIMIT.to_string()),
            ];
            if let Some(c) = &cursor {
                query.push(("cursor", c.clone()));
            }

            let page = self.history_page_with_retry(&query).await?;

            tracing::debug!(
                channel_id,
                page = page_count,
                count = page.messages.len(),
                "history page fetched"
            );

            for msg in page.messages {
                if let Some(bound) = oldest_epoch {
                    if ts_to_epoch(&msg.ts) < bound {
                        tracing::debug!(channel_id, "reached messages older than the window");
                        return Ok(collected);
                    }
                }
                collected.push(msg);
            }

            if !page.has_more {
                break;
            }
            match page.response_metadata.cursor() {
                Some(next) => cursor = Some(next.to_string()),
                None => break,
            }
        }

        Ok(collected)
    }

    async fn history_page_with_retry(&self, query: &[(&str, String)]) -> Result<HistoryBody> {
        for attempt in 1..=self.pacing.max_retries {
            match self.get_json("conversations.history", query).await {
                Ok(body) => return Ok(body),
                Err(Error::Slack(SlackError::RateLimited { retry_after, .. })) => {
                    let wait = retry_after.unwrap_or(self.pacing.history_retry_fallback);
                    tracing::warn!(
                        attempt,
                        max = self.pacing.max_retries,
                        wait_secs = wait.as_secs(),
                        "rate limited fetching history, backing off"
                    );
                    self.pace(wait).await;
                }
                Err(other) => return Err(other),
            }
        }

        Err(SlackError::RetriesExhausted {
            method: "conversations.history",
        }
        .into())
    }

    /// Replies under a thread parent, parent excluded. A thread that cannot
    /// be fetched degrades to an empty list rather than failing the channel.
    pub async fn thread_replies(&self, channel_id: &str, thread_ts: &str) -> Vec<MessageEnvelope> {
        self.pace(self.pacing.call_delay).await;

        let query = [
            ("channel", channel_id.to_string()),
            ("ts", thread_ts.to_string()),
        ];

        match self
            .get_json::<HistoryBody>("conversations.replies", &query)
            .await
        {
            Ok(body) => {
                let mut messages = body.messages;
                if messages.len() > 1 {
                    messages.split_off(1)
                } else {
                    Vec::new()
                }
            }
            Err(error) => {
                tracing::warn!(%error, channel_id, thread_ts, "failed to fetch thread replies");
                Vec::new()
            }
        }
    }

    /// Post a message to a channel. Returns the ts of the first chunk,
    /// which anchors any thread started from it.
    pub async fn post_message(&self, channel_id: &str, text: &str) -> Result<String> {
        self.post_paced(channel_id, text, None, self.pacing.call_delay)
            .await
    }

    /// Post a reply into an existing thread.
    pub async fn post_reply(
        &self,
        channel_id: &str,
        thread_ts: &str,
        text: &str,
    ) -> Result<String> {
        self.post_paced(channel_id, text, Some(thread_ts), self.pacing.reply_delay)
            .await
    }

    async fn post_paced(
        &self,
        channel_id: &str,
        text: &str,
        thread_ts: Option<&str>,
        delay: Duration,
    ) -> Result<String> {
        let mut first_ts: Option<String> = None;

        for chunk in split_message(text, MAX_MESSAGE_LEN) {
            self.pace(delay).await;
            let ts = self
                .post_chunk_with_retry(channel_id, &chunk, thread_ts)
                .await?;
            first_ts.get_or_insert(ts);
        }

        Ok(first_ts.unwrap_or_default())
    }

    async fn post_chunk_with_retry(
        &self,
        channel_id: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<String> {
        let mut payload = serde_json::json!({
            "channel": channel_id,
            "text": text,
        });
        if let Some(ts) = thread_ts {
            payload["thread_ts"] = ts.into();
        }

        for attempt in 1..=self.pacing.max_retries {
            match self
                .post_json::<PostMessageBody>("chat.postMessage", &payload)
                .await
            {
                Ok(body) => return Ok(body.ts),
                Err(Error::Slack(SlackError::RateLimited { retry_after, .. })) => {
                    let wait = retry_after.unwrap_or(self.pacing.post_retry_fallback);
                    tracing::warn!(
                        attempt,
                        wait_secs = wait.as_secs(),
                        "rate limited posting message, backing off"
                    );
                    self.pace(wait).await;
                }
                Err(error) if attempt < self.pacing.max_retries => {
                    tracing::warn!(%error, attempt, "post failed, retrying");
                    self.pace(self.pacing.post_retry_pause).await;
                }
                Err(error) => return Err(error),
            }
        }

        Err(SlackError::RetriesExhausted {
            method: "chat.postMessage",
        }
        .into())
    }

    /// Upload a file via the external upload flow: get an upload URL, POST
    /// the bytes to it, then complete the upload into the channel.
    pub async fn upload_file(
        &self,
        channel_id: &str,
        path: &Path,
        initial_comment: Option<&str>,
    ) -> Result<()> {
        self.pace(self.pacing.call_delay).await;

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;

        let query = [
            ("filename", filename.clone()),
            ("length", data.len().to_string()),
        ];
        let upload: UploadUrlBody = self.get_json("files.getUploadURLExternal", &query).await?;

        let response = self
            .http
            .post(&upload.upload_url)
            .body(data)
            .send()
            .await
            .context("file upload POST failed")?;
        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "file upload POST returned status {}",
                response.status()
            )
            .into());
        }

        let mut payload = serde_json::json!({
            "files": [{"id": upload.file_id, "title": filename}],
            "channel_id": channel_id,
        });
        if let Some(comment) = initial_comment {
            payload["initial_comment"] = comment.into();
        }

        let _: EmptyBody = self
            .post_json("files.completeUploadExternal", &payload)
            .await?;

        tracing::info!(channel_id, filename, "file uploaded");
        Ok(())
    }

    /// Resolve a user id to a profile. A failed lookup degrades to an
    /// "Unknown" profile so a single missing user never fails collection.
    pub async fn user_info(&self, user_id: &str) -> UserProfile {
        self.pace(self.pacing.call_delay).await;

        let query = [("user", user_id.to_string())];
        match self.get_json::<UserInfoBody>("users.info", &query).await {
            Ok(UserInfoBody { user: Some(record) }) => UserProfile {
                id: user_id.to_string(),
                name: non_empty_or(record.name, "Unknown"),
                real_name: non_empty_or(record.real_name, "Unknown"),
                display_name: record.profile.display_name,
            },
            Ok(UserInfoBody { user: None }) => {
                tracing::warn!(user_id, "users.info returned no user record");
                UserProfile::unknown(user_id)
            }
            Err(error) => {
                tracing::warn!(%error, user_id, "user lookup failed");
                UserProfile::unknown(user_id)
            }
        }
    }

    // -- Transport helpers --

    async fn pace(&self, delay: Duration) {
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        method: &'static str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = self
            .http
            .get(format!("{SLACK_API_BASE}/{method}"))
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .with_context(|| format!("{method} request failed"))?;

        self.decode(method, response).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        method: &'static str,
        payload: &serde_json::Value,
    ) -> Result<T> {
        let response = self
            .http
            .post(format!("{SLACK_API_BASE}/{method}"))
            .bearer_auth(&self.token)
            .json(payload)
            .send()
            .await
            .with_context(|| format!("{method} request failed"))?;

        self.decode(method, response).await
    }

    async fn decode<T: DeserializeOwned>(
        &self,
        method: &'static str,
        response: reqwest::Response,
    ) -> Result<T> {
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs);
            return Err(SlackError::RateLimited {
                method,
                retry_after,
            }
            .into());
        }

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .with_context(|| format!("failed to decode {method} response"))?;

        if !envelope.ok {
            let code = envelope.error.unwrap_or_else(|| "unknown_error".into());
            if code == "ratelimited" || code == "rate_limited" {
                return Err(SlackError::RateLimited {
                    method,
                    retry_after: None,
                }
                .into());
            }
            return Err(SlackError::Api { method, code }.into());
        }

        Ok(envelope.body)
    }
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

/// Split a message into chunks that fit within Slack's character limit.
/// Tries to split at newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let window_end = char_floor(remaining, max_len);
        let window = &remaining[..window_end];
        let split_at = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&at| at > 0)
            .unwrap_or(window_end);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

/// Largest index <= `index` that lands on a char boundary.
fn char_floor(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}
