//! Error types.

use std::time::Duration;

/// Errors from the Slack Web API client.
#[derive(Debug, thiserror::Error)]
pub enum SlackError {
    #[error("slack bot token is not configured")]
    MissingToken,

    /// The API returned `ok: false` with a named error code.
    #[error("slack api call {method} failed: {code}")]
    Api { method: &'static str, code: String },

    /// HTTP 429 or the named `ratelimited` error code.
    #[error("slack rate limited on {method}")]
    RateLimited {
        method: &'static str,
        retry_after: Option<Duration>,
    },

    #[error("rate limit retries exhausted on {method}")]
    RetriesExhausted { method: &'static str },

    #[error("channel \"{0}\" not found")]
    ChannelNotFound(String),
}

/// Errors from the LLM completion client.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("anthropic api key is not configured")]
    MissingApiKey,

    #[error("anthropic call failed with status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("anthropic response contained no text content")]
    EmptyResponse,
}

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Slack(#[from] SlackError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Crate-wide result type.
pub type Result<T, E = Error> = std::result::Result<T, E>;
