//! Channel summarization: transcript reconstruction and LLM calls.

use crate::archive::{ts_to_epoch, ChannelArchive, Collection};
use crate::config::Config;
use crate::error::Result;
use crate::llm::AnthropicClient;
use anyhow::Context as _;
use chrono::{Local, TimeZone};
use rand::seq::SliceRandom;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// Load the summarization prompt template.
pub fn load_prompt(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("summarization prompt not found at {}", path.display()))?;
    Ok(content.trim().to_string())
}

/// Render a channel archive as a chronological transcript, thread replies
/// nested under their parents.
pub fn render_transcript(channel: &ChannelArchive) -> String {
    if channel.messages.is_empty() {
        return "No messages found in this channel.".into();
    }

    let mut messages: Vec<_> = channel.messages.iter().collect();
    messages.sort_by(|a, b| {
        ts_to_epoch(&a.timestamp)
            .partial_cmp(&ts_to_epoch(&b.timestamp))
            .unwrap_or(Ordering::Equal)
    });

    let mut lines = Vec::new();

    for msg in messages {
        let text = msg.text.trim();
        if text.is_empty() {
            continue;
        }

        lines.push(format!(
            "[{}] {}: {}",
            format_ts(ts_to_epoch(&msg.timestamp)),
            msg.user_name,
            text
        ));

        let mut replies: Vec<_> = msg.replies.iter().collect();
        replies.sort_by(|a, b| {
            ts_to_epoch(&a.timestamp)
                .partial_cmp(&ts_to_epoch(&b.timestamp))
                .unwrap_or(Ordering::Equal)
        });

        for reply in replies {
            let reply_text = reply.text.trim();
            if reply_text.is_empty() {
                continue;
            }
            lines.push(format!(
                "  └─ [{}] {}: {}",
                format_ts(ts_to_epoch(&reply.timestamp)),
                reply.user_name,
                reply_text
            ));
        }

        // Blank line between threads
        lines.push(String::new());
    }

    lines.join("\n")
}

fn format_ts(epoch: f64) -> String {
    Local
        .timestamp_opt(epoch as i64, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown time".into())
}

/// Channels eligible for summarization: matching a configured prefix, no
/// recorded error, at least one message.
pub fn eligible_channels(collection: &Collection, prefixes: &[String]) -> Vec<String> {
    collection
        .channels
        .iter()
        .filter(|(name, archive)| {
            prefixes.iter().any(|p| name.starts_with(p))
                && archive.error.is_none()
                && archive.message_count > 0
        })
        .map(|(name, _)| name.clone())
        .collect()
}

/// Drop blank lines from a model response.
fn clean_summary(summary: &str) -> String {
    summary
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Header linking the summary back to its channel.
fn channel_header(name: &str, archive: &ChannelArchive) -> String {
    if archive.id.is_empty() {
        format!("#{name}")
    } else {
        format!("<#{}|{}>", archive.id, name)
    }
}

fn build_prompt(template: &str, transcript: &str) -> String {
    format!("{template}\n\n---\n\nChannel messages:\n\n{transcript}")
}

/// Summarize one channel from the collection.
pub async fn summarize_channel(
    llm: &AnthropicClient,
    prompt_template: &str,
    channel: &ChannelArchive,
) -> Result<String> {
    let transcript = render_transcript(channel);
    llm.complete(&build_prompt(prompt_template, &transcript))
        .await
}

/// Summarize every eligible channel in shuffled order, join the cleaned
/// summaries into a digest, and persist it under the summaries directory.
/// Returns the digest path.
pub async fn summarize_all(
    config: &Config,
    llm: &AnthropicClient,
    collection: &Collection,
) -> Result<PathBuf> {
    let prompt_template = load_prompt(&config.prompt_path)?;

    let mut targets = eligible_channels(collection, &config.channels.prefixes);
    if targets.is_empty() {
        return Err(anyhow::anyhow!(
            "no accessible channels with messages to summarize"
        )
        .into());
    }
    targets.shuffle(&mut rand::thread_rng());

    tracing::info!(count = targets.len(), "channels selected for summarization");

    let total = targets.len();
    let mut summaries = Vec::new();

    for (index, name) in targets.iter().enumerate() {
        let Some(archive) = collection.channels.get(name) else {
            continue;
        };
        tracing::info!(
            channel = %name,
            progress = format!("{}/{}", index + 1, total),
            "summarizing channel"
        );

        match summarize_channel(llm, &prompt_template, archive).await {
            Ok(summary) => {
                summaries.push(format!(
                    "{}\n{}",
                    channel_header(name, archive),
                    clean_summary(&summary)
                ));
            }
            Err(error) => {
                tracing::warn!(channel = %name, %error, "summarization failed, skipping channel");
            }
        }
    }

    if summaries.is_empty() {
        return Err(anyhow::anyhow!("no summaries were generated").into());
    }

    let digest = summaries.join("\n\n");
    let path = save_digest(&config.summaries_dir(), &digest)?;

    tracing::info!(
        path = %path.display(),
        channels = summaries.len(),
        "digest saved"
    );
    Ok(path)
}

fn save_digest(summaries_dir: &Path, digest: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(summaries_dir)
        .with_context(|| format!("failed to create {}", summaries_dir.display()))?;

    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let path = summaries_dir.join(format!("summary_{stamp}.txt"));
    std::fs::write(&path, digest)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

/// Most recent `summary_*.txt` digest by filename.
pub fn latest_summary(summaries_dir: &Path) -> Result<PathBuf> {
    let entries = std::fs::read_dir(summaries_dir)
        .with_context(|| format!("summaries directory {} not found", summaries_dir.display()))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to list {}", summaries_dir.display()))?;
        if let Ok(name) = entry.file_name().into_string() {
            if name.starts_with("summary_") && name.ends_with(".txt") {
                names.push(name);
            }
        }
    }
    names.sort();

    let latest = names
        .pop()
        .with_context(|| format!("no summary files found in {}", summaries_dir.display()))?;
    Ok(summaries_dir.join(latest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{CollectedMessage, CollectedReply};
    use chrono::DateTime;
    use std::collections::BTreeMap;

    fn message(ts: &str, user: &str, text: &str) -> CollectedMessage {
        CollectedMessage {
            timestamp: ts.into(),
            user_id: Some("U1".into()),
            user_name: user.into(),
            text: text.into(),
            kind: Some("message".into()),
            subtype: None,
            thread_ts: None,
            reply_count: 0,
            replies: Vec::new(),
        }
    }

    fn reply(ts: &str, user: &str, text: &str) -> CollectedReply {
        CollectedReply {
            timestamp: ts.into(),
            user_id: Some("U2".into()),
            user_name: user.into(),
            text: text.into(),
            kind: Some("message".into()),
            subtype: None,
            thread_ts: None,
        }
    }

    fn archive_of(messages: Vec<CollectedMessage>) -> ChannelArchive {
        ChannelArchive {
            id: "C1".into(),
            error: None,
            message_count: messages.len(),
            thread_replies_count: 0,
            messages,
        }
    }

    #[test]
    fn empty_channel_renders_placeholder() {
        let archive = archive_of(Vec::new());
        assert_eq!(
            render_transcript(&archive),
            "No messages found in this channel."
        );
    }

    #[test]
    fn transcript_is_chronological_regardless_of_input_order() {
        let archive = archive_of(vec![
            message("1700000200.000000", "grace", "second"),
            message("1700000100.000000", "ada", "first"),
        ]);

        let transcript = render_transcript(&archive);
        let first = transcript.find("ada: first").unwrap();
        let second = transcript.find("grace: second").unwrap();
        assert!(first < second);
    }

    #[test]
    fn replies_nest_under_their_parent_in_order() {
        let mut parent = message("1700000100.000000", "ada", "parent");
        parent.replies = vec![
            reply("1700000300.000000", "grace", "later reply"),
            reply("1700000200.000000", "ada", "earlier reply"),
        ];
        let archive = archive_of(vec![parent]);

        let transcript = render_transcript(&archive);
        let earlier = transcript.find("└─").unwrap();
        assert!(transcript[earlier..].starts_with("└─ ["));
        assert!(
            transcript.find("earlier reply").unwrap() < transcript.find("later reply").unwrap()
        );
    }

    #[test]
    fn empty_texts_are_skipped() {
        let archive = archive_of(vec![
            message("1700000100.000000", "ada", "   "),
            message("1700000200.000000", "grace", "kept"),
        ]);

        let transcript = render_transcript(&archive);
        assert!(!transcript.contains("ada"));
        assert!(transcript.contains("grace: kept"));
    }

    #[test]
    fn blank_lines_are_stripped_from_summaries() {
        assert_eq!(
            clean_summary("- point one\n\n\n- point two\n   \n- point three"),
            "- point one\n- point two\n- point three"
        );
    }

    #[test]
    fn channel_header_links_when_id_is_known() {
        let archive = archive_of(Vec::new());
        assert_eq!(
            channel_header("lab-notes-ada", &archive),
            "<#C1|lab-notes-ada>"
        );
    }

    #[test]
    fn eligible_channels_filter_by_prefix_error_and_count() {
        let mut channels = BTreeMap::new();
        channels.insert(
            "lab-notes-ada".to_string(),
            archive_of(vec![message("1700000100.000000", "ada", "hi")]),
        );
        channels.insert("general".to_string(), {
            archive_of(vec![message("1700000100.000000", "ada", "hi")])
        });
        channels.insert(
            "lab-notes-empty".to_string(),
            archive_of(Vec::new()),
        );
        channels.insert(
            "surface-area-locked".to_string(),
            ChannelArchive::errored("C9", "bot_not_in_channel"),
        );

        let collection = Collection {
            collection_time: DateTime::from_timestamp(1_700_000_000, 0)
                .unwrap()
                .with_timezone(&Local),
            collection_type: None,
            channels,
            user_cache: BTreeMap::new(),
        };

        let prefixes = vec!["lab-notes-".to_string(), "surface-area-".to_string()];
        let eligible = eligible_channels(&collection, &prefixes);
        assert_eq!(eligible, vec!["lab-notes-ada".to_string()]);
    }

    #[test]
    fn prompt_is_separated_from_the_transcript() {
        let prompt = build_prompt("Summarize this.", "[ts] ada: hi");
        assert_eq!(
            prompt,
            "Summarize this.\n\n---\n\nChannel messages:\n\n[ts] ada: hi"
        );
    }
}
