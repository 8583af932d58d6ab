//! Republishing: post the digest into Slack, forward archives externally.

use crate::archive;
use crate::config::Config;
use crate::error::Result;
use crate::slack::SlackClient;
use crate::summarizer;
use anyhow::Context as _;
use chrono::Local;
use std::path::Path;
use std::time::Duration;

/// Post the most recent digest into the configured digest channel: the
/// collection window's date range as the parent message, the digest itself
/// as a thread reply under it.
pub async fn post_digest(client: &SlackClient, config: &Config) -> Result<()> {
    let summary_path = summarizer::latest_summary(&config.summaries_dir())?;
    let summary = std::fs::read_to_string(&summary_path)
        .with_context(|| format!("failed to read {}", summary_path.display()))?;

    tracing::info!(path = %summary_path.display(), "posting digest");

    client.auth_test().await?;

    let target = client
        .find_channel(&config.channels.digest_channel)
        .await?;
    tracing::info!(channel = %target.name, channel_id = %target.id, "digest channel found");

    let range = date_range_header(config.channels.history_days);
    let thread_ts = client.post_message(&target.id, &range).await?;
    tracing::info!(%thread_ts, "date range posted");

    client.post_reply(&target.id, &thread_ts, &summary).await?;
    tracing::info!("digest posted as thread reply");

    Ok(())
}

/// Human-readable window covered by the digest, ending today.
fn date_range_header(days: i64) -> String {
    let end = Local::now();
    let start = end - chrono::Duration::days(days);
    format!("{} - {}", start.format("%B %d"), end.format("%B %d, %Y"))
}

/// POST the most recently modified archive to the external endpoint.
pub async fn forward_latest(config: &Config) -> Result<()> {
    let path = archive::latest_json_by_mtime(&config.data_dir())?;
    forward_file(config, &path).await
}

/// POST every archive, oldest first. Returns (succeeded, total).
pub async fn forward_all(config: &Config) -> Result<(usize, usize)> {
    let files = archive::json_files_by_mtime(&config.data_dir())?;
    let total = files.len();
    let mut succeeded = 0usize;

    for path in &files {
        match forward_file(config, path).await {
            Ok(()) => succeeded += 1,
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "forward failed");
            }
        }
    }

    tracing::info!(succeeded, total, "forward pass complete");
    Ok((succeeded, total))
}

async fn forward_file(config: &Config, path: &Path) -> Result<()> {
    let endpoint = config
        .forward
        .endpoint
        .as_deref()
        .context("forward endpoint is not configured")?;
    let bearer_token = config
        .forward
        .bearer_token
        .as_deref()
        .context("forward bearer token is not configured")?;

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let payload: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .context("failed to build HTTP client")?;

    let response = http
        .post(endpoint)
        .bearer_auth(bearer_token)
        .json(&payload)
        .send()
        .await
        .context("forward request failed")?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(anyhow::anyhow!(
            "forward endpoint returned status {status}: {body}"
        )
        .into());
    }

    tracing::info!(path = %path.display(), "archive forwarded");
    Ok(())
}
