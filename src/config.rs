//! Configuration loading and validation.

use crate::error::Result;
use anyhow::Context as _;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level towncrier configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Instance root directory (~/.towncrier or TOWNCRIER_DIR).
    pub instance_dir: PathBuf,
    /// Slack credentials.
    pub slack: SlackConfig,
    /// LLM provider credentials and completion settings.
    pub llm: LlmConfig,
    /// External forward endpoint.
    pub forward: ForwardConfig,
    /// Channel selection and digest targeting.
    pub channels: ChannelsConfig,
    /// Fixed-delay pacing and retry policy for Slack calls.
    pub pacing: PacingConfig,
    /// Summarization prompt template file.
    pub prompt_path: PathBuf,
}

impl Config {
    /// Directory where collection archives are written.
    pub fn data_dir(&self) -> PathBuf {
        self.instance_dir.join("data")
    }

    /// Directory where channel digests are written.
    pub fn summaries_dir(&self) -> PathBuf {
        self.instance_dir.join("summaries")
    }
}

/// Slack credentials.
#[derive(Debug, Clone)]
pub struct SlackConfig {
    pub bot_token: Option<String>,
}

/// LLM provider credentials and completion settings.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub anthropic_key: Option<String>,
    /// Model id for summarization calls.
    pub model: String,
    /// Output token cap per summary.
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            anthropic_key: None,
            model: "claude-sonnet-4-20250514".into(),
            max_tokens: 1000,
        }
    }
}

/// External forward endpoint configuration. Both fields are required for
/// the forward step to run; the pipeline skips it otherwise.
#[derive(Debug, Clone, Default)]
pub struct ForwardConfig {
    pub endpoint: Option<String>,
    pub bearer_token: Option<String>,
}

impl ForwardConfig {
    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some() && self.bearer_token.is_some()
    }
}

/// Channel selection and digest targeting.
#[derive(Debug, Clone)]
pub struct ChannelsConfig {
    /// Name prefixes selecting channels for collection and summarization.
    pub prefixes: Vec<String>,
    /// Channel the digest is posted into.
    pub digest_channel: String,
    /// Collection window in days for the recent-history pass.
    pub history_days: i64,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            prefixes: vec!["lab-notes-".into(), "surface-area-".into()],
            digest_channel: "daily-overview".into(),
            history_days: 7,
        }
    }
}

/// Fixed-delay pacing and bounded retry policy for Slack API calls.
#[derive(Debug, Clone, Copy)]
pub struct PacingConfig {
    /// Sleep inserted before every API call.
    pub call_delay: Duration,
    /// Shorter sleep before posting thread replies.
    pub reply_delay: Duration,
    /// Attempts per call when rate limited.
    pub max_retries: u32,
    /// Wait when a history call is rate limited without a Retry-After.
    pub history_retry_fallback: Duration,
    /// Wait when a post is rate limited without a Retry-After.
    pub post_retry_fallback: Duration,
    /// Pause before retrying a post that failed for a non-rate-limit reason.
    pub post_retry_pause: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            call_delay: Duration::from_secs(30),
            reply_delay: Duration::from_secs(5),
            max_retries: 3,
            history_retry_fallback: Duration::from_secs(120),
            post_retry_fallback: Duration::from_secs(60),
            post_retry_pause: Duration::from_secs(10),
        }
    }
}

impl PacingConfig {
    /// Zero-delay pacing. Retry counts are kept.
    pub fn none() -> Self {
        Self {
            call_delay: Duration::ZERO,
            reply_delay: Duration::ZERO,
            max_retries: 3,
            history_retry_fallback: Duration::ZERO,
            post_retry_fallback: Duration::ZERO,
            post_retry_pause: Duration::ZERO,
        }
    }
}

// -- TOML shadow structs --

#[derive(Deserialize)]
struct TomlConfig {
    slack: Option<TomlSlack>,
    llm: Option<TomlLlm>,
    forward: Option<TomlForward>,
    channels: Option<TomlChannels>,
    pacing: Option<TomlPacing>,
    prompt_file: Option<PathBuf>,
}

#[derive(Deserialize)]
struct TomlSlack {
    bot_token: Option<String>,
}

#[derive(Deserialize)]
struct TomlLlm {
    anthropic_key: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct TomlForward {
    endpoint: Option<String>,
    bearer_token: Option<String>,
}

#[derive(Deserialize)]
struct TomlChannels {
    prefixes: Option<Vec<String>>,
    digest_channel: Option<String>,
    history_days: Option<i64>,
}

#[derive(Deserialize)]
struct TomlPacing {
    call_delay_secs: Option<u64>,
    reply_delay_secs: Option<u64>,
    max_retries: Option<u32>,
    history_retry_fallback_secs: Option<u64>,
    post_retry_fallback_secs: Option<u64>,
    post_retry_pause_secs: Option<u64>,
}

/// Resolve a value that might be an "env:VAR_NAME" reference.
fn resolve_env_value(value: &str) -> Option<String> {
    if let Some(var_name) = value.strip_prefix("env:") {
        std::env::var(var_name).ok()
    } else {
        Some(value.to_string())
    }
}

impl Config {
    /// Resolve the instance directory from env or default (~/.towncrier).
    pub fn default_instance_dir() -> PathBuf {
        std::env::var("TOWNCRIER_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .map(|d| d.join(".towncrier"))
                    .unwrap_or_else(|| PathBuf::from("./.towncrier"))
            })
    }

    /// Load configuration from the default config file, falling back to env vars.
    pub fn load() -> Result<Self> {
        let instance_dir = Self::default_instance_dir();

        let config_path = instance_dir.join("config.toml");
        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::load_from_env(&instance_dir)
        }
    }

    /// Load from a specific TOML config file.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let instance_dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;

        Ok(Self::from_toml(toml_config, instance_dir))
    }

    /// Load from environment variables only (no config file).
    pub fn load_from_env(instance_dir: &Path) -> Result<Self> {
        Ok(Self {
            instance_dir: instance_dir.to_path_buf(),
            slack: SlackConfig {
                bot_token: std::env::var("SLACK_BOT_TOKEN").ok(),
            },
            llm: LlmConfig {
                anthropic_key: std::env::var("ANTHROPIC_API_KEY").ok(),
                ..LlmConfig::default()
            },
            forward: ForwardConfig {
                endpoint: std::env::var("TOWNCRIER_FORWARD_URL").ok(),
                bearer_token: std::env::var("BEARER_TOKEN").ok(),
            },
            channels: ChannelsConfig::default(),
            pacing: PacingConfig::default(),
            prompt_path: instance_dir.join("summarization_prompt.txt"),
        })
    }

    /// Validate a raw TOML string as a valid towncrier config.
    pub fn validate_toml(content: &str) -> Result<()> {
        let toml_config: TomlConfig =
            toml::from_str(content).context("failed to parse config TOML")?;
        Self::from_toml(toml_config, Self::default_instance_dir());
        Ok(())
    }

    fn from_toml(toml: TomlConfig, instance_dir: PathBuf) -> Self {
        let slack = SlackConfig {
            bot_token: toml
                .slack
                .and_then(|s| s.bot_token)
                .and_then(|v| resolve_env_value(&v))
                .or_else(|| std::env::var("SLACK_BOT_TOKEN").ok()),
        };

        let llm_defaults = LlmConfig::default();
        let llm = match toml.llm {
            Some(t) => LlmConfig {
                anthropic_key: t
                    .anthropic_key
                    .and_then(|v| resolve_env_value(&v))
                    .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok()),
                model: t.model.unwrap_or(llm_defaults.model),
                max_tokens: t.max_tokens.unwrap_or(llm_defaults.max_tokens),
            },
            None => LlmConfig {
                anthropic_key: std::env::var("ANTHROPIC_API_KEY").ok(),
                ..llm_defaults
            },
        };

        let forward = match toml.forward {
            Some(t) => ForwardConfig {
                endpoint: t.endpoint,
                bearer_token: t
                    .bearer_token
                    .and_then(|v| resolve_env_value(&v))
                    .or_else(|| std::env::var("BEARER_TOKEN").ok()),
            },
            None => ForwardConfig {
                endpoint: std::env::var("TOWNCRIER_FORWARD_URL").ok(),
                bearer_token: std::env::var("BEARER_TOKEN").ok(),
            },
        };

        let channel_defaults = ChannelsConfig::default();
        let channels = match toml.channels {
            Some(t) => ChannelsConfig {
                prefixes: t.prefixes.unwrap_or(channel_defaults.prefixes),
                digest_channel: t.digest_channel.unwrap_or(channel_defaults.digest_channel),
                history_days: t.history_days.unwrap_or(channel_defaults.history_days),
            },
            None => channel_defaults,
        };

        let pacing_defaults = PacingConfig::default();
        let pacing = match toml.pacing {
            Some(t) => PacingConfig {
                call_delay: t
                    .call_delay_secs
                    .map(Duration::from_secs)
                    .unwrap_or(pacing_defaults.call_delay),
                reply_delay: t
                    .reply_delay_secs
                    .map(Duration::from_secs)
                    .unwrap_or(pacing_defaults.reply_delay),
                max_retries: t.max_retries.unwrap_or(pacing_defaults.max_retries),
                history_retry_fallback: t
                    .history_retry_fallback_secs
                    .map(Duration::from_secs)
                    .unwrap_or(pacing_defaults.history_retry_fallback),
                post_retry_fallback: t
                    .post_retry_fallback_secs
                    .map(Duration::from_secs)
                    .unwrap_or(pacing_defaults.post_retry_fallback),
                post_retry_pause: t
                    .post_retry_pause_secs
                    .map(Duration::from_secs)
                    .unwrap_or(pacing_defaults.post_retry_pause),
            },
            None => pacing_defaults,
        };

        let prompt_path = toml
            .prompt_file
            .map(|p| {
                if p.is_absolute() {
                    p
                } else {
                    instance_dir.join(p)
                }
            })
            .unwrap_or_else(|| instance_dir.join("summarization_prompt.txt"));

        Self {
            instance_dir,
            slack,
            llm,
            forward,
            channels,
            pacing,
            prompt_path,
        }
    }
}
