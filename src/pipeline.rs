//! Four-step pipeline driver: collect → summarize → post → forward.
//!
//! Steps 1–3 abort the pipeline on failure. Step 4 is best-effort: it is
//! skipped when the forward endpoint is unconfigured and a failure there
//! only logs a warning.

use crate::archive::{self, Collection, CollectionKind};
use crate::collector;
use crate::config::Config;
use crate::error::Result;
use crate::llm::AnthropicClient;
use crate::publisher;
use crate::slack::SlackClient;
use crate::summarizer;
use anyhow::Context as _;
use std::time::Instant;

pub async fn run(config: &Config) -> Result<()> {
    let total_start = Instant::now();
    let days = config.channels.history_days;

    // Step 1: collect
    tracing::info!(days, "step 1/4: collecting messages");
    let step_start = Instant::now();
    let client = SlackClient::from_config(config)?;
    let kind = CollectionKind::Recent { days };
    let collection = collector::collect(&client, config, kind)
        .await
        .context("pipeline failed at step 1 (collect)")?;
    collection
        .save(&config.data_dir(), kind)
        .context("pipeline failed at step 1 (collect)")?;
    let collect_secs = step_start.elapsed().as_secs_f64();
    tracing::info!(elapsed_secs = format!("{collect_secs:.1}"), "step 1 complete");

    // Step 2: summarize
    tracing::info!("step 2/4: generating summaries");
    let step_start = Instant::now();
    let llm = AnthropicClient::new(&config.llm)?;
    let latest = archive::latest_archive(&config.data_dir())
        .context("pipeline failed at step 2 (summarize)")?;
    let collection = Collection::load(&latest).context("pipeline failed at step 2 (summarize)")?;
    summarizer::summarize_all(config, &llm, &collection)
        .await
        .context("pipeline failed at step 2 (summarize)")?;
    let summarize_secs = step_start.elapsed().as_secs_f64();
    tracing::info!(elapsed_secs = format!("{summarize_secs:.1}"), "step 2 complete");

    // Step 3: post to the digest channel
    tracing::info!("step 3/4: posting digest");
    let step_start = Instant::now();
    publisher::post_digest(&client, config)
        .await
        .context("pipeline failed at step 3 (post)")?;
    let post_secs = step_start.elapsed().as_secs_f64();
    tracing::info!(elapsed_secs = format!("{post_secs:.1}"), "step 3 complete");

    // Step 4: forward to the external endpoint, best-effort
    tracing::info!("step 4/4: forwarding latest archive");
    let step_start = Instant::now();
    if config.forward.is_configured() {
        match publisher::forward_latest(config).await {
            Ok(()) => {
                tracing::info!(
                    elapsed_secs = format!("{:.1}", step_start.elapsed().as_secs_f64()),
                    "step 4 complete"
                );
            }
            Err(error) => {
                tracing::warn!(%error, "step 4 failed, continuing");
            }
        }
    } else {
        tracing::info!("forward endpoint not configured, skipping step 4");
    }

    tracing::info!(
        collect_secs = format!("{collect_secs:.1}"),
        summarize_secs = format!("{summarize_secs:.1}"),
        post_secs = format!("{post_secs:.1}"),
        total_mins = format!("{:.1}", total_start.elapsed().as_secs_f64() / 60.0),
        "pipeline completed"
    );

    Ok(())
}
