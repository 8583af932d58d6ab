//! Towncrier CLI entry point.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use towncrier::archive::{self, Collection, CollectionKind};
use towncrier::config::Config;
use towncrier::llm::AnthropicClient;
use towncrier::slack::SlackClient;
use towncrier::{collector, pipeline, publisher, summarizer};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "towncrier")]
#[command(about = "Collects Slack channel history, summarizes it with Claude, and republishes the digest")]
struct Cli {
    /// Path to config file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Collect recent messages from channels matching the configured prefixes
    Collect {
        /// Collection window in days
        #[arg(long)]
        days: Option<i64>,
    },
    /// Collect the complete history of every accessible channel
    CollectAll {
        /// Confirm the full collection (it can take many hours of API calls)
        #[arg(long)]
        yes: bool,
    },
    /// Summarize a single channel from the latest archive and print it
    Summarize {
        /// Channel name as recorded in the archive
        channel: String,
    },
    /// Summarize every eligible channel and save the digest
    SummarizeAll,
    /// Post the latest digest into the digest channel
    PostSummary,
    /// Forward the latest archive JSON to the external endpoint
    Forward {
        /// Forward every archive instead of just the most recent
        #[arg(long)]
        all: bool,
    },
    /// Run the full pipeline: collect, summarize, post, forward
    Pipeline,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)
            .with_context(|| format!("failed to load config from {}", config_path.display()))?
    } else {
        Config::load().context("failed to load configuration")?
    };

    tracing::info!(instance_dir = %config.instance_dir.display(), "configuration loaded");

    match cli.command {
        Command::Collect { days } => {
            let days = days.unwrap_or(config.channels.history_days);
            let client = SlackClient::from_config(&config)?;
            let kind = CollectionKind::Recent { days };
            let collection = collector::collect(&client, &config, kind).await?;
            collection.save(&config.data_dir(), kind)?;
        }
        Command::CollectAll { yes } => {
            if !yes {
                anyhow::bail!(
                    "collecting complete history fetches every message from every \
                     accessible channel and can take many hours; re-run with --yes to confirm"
                );
            }
            let client = SlackClient::from_config(&config)?;
            let collection =
                collector::collect(&client, &config, CollectionKind::Complete).await?;
            collection.save(&config.data_dir(), CollectionKind::Complete)?;
        }
        Command::Summarize { channel } => {
            let latest = archive::latest_archive(&config.data_dir())?;
            tracing::info!(path = %latest.display(), "loading archive");
            let collection = Collection::load(&latest)?;

            let Some(target) = collection.channels.get(&channel) else {
                let available: Vec<&str> =
                    collection.channels.keys().map(String::as_str).collect();
                anyhow::bail!(
                    "channel \"{channel}\" not found in archive; available: {}",
                    available.join(", ")
                );
            };
            if let Some(error) = &target.error {
                anyhow::bail!("channel \"{channel}\" had a collection error: {error}");
            }

            let llm = AnthropicClient::new(&config.llm)?;
            let prompt = summarizer::load_prompt(&config.prompt_path)?;
            let summary = summarizer::summarize_channel(&llm, &prompt, target).await?;

            println!("{}", "=".repeat(60));
            println!("SUMMARY: #{channel}");
            println!("{}", "=".repeat(60));
            println!("{summary}");
            println!("{}", "=".repeat(60));
        }
        Command::SummarizeAll => {
            let latest = archive::latest_archive(&config.data_dir())?;
            tracing::info!(path = %latest.display(), "loading archive");
            let collection = Collection::load(&latest)?;
            let llm = AnthropicClient::new(&config.llm)?;
            summarizer::summarize_all(&config, &llm, &collection).await?;
        }
        Command::PostSummary => {
            let client = SlackClient::from_config(&config)?;
            publisher::post_digest(&client, &config).await?;
        }
        Command::Forward { all } => {
            if all {
                let (succeeded, total) = publisher::forward_all(&config).await?;
                if succeeded != total {
                    anyhow::bail!("forwarded {succeeded}/{total} archives");
                }
            } else {
                publisher::forward_latest(&config).await?;
            }
        }
        Command::Pipeline => {
            pipeline::run(&config).await?;
        }
    }

    Ok(())
}
