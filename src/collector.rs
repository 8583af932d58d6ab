//! Channel collection: paginate history, expand threads, resolve users.

use crate::archive::{
    ChannelArchive, CollectedMessage, CollectedReply, Collection, CollectionKind, UserProfile,
};
use crate::config::Config;
use crate::error::{Error, Result, SlackError};
use crate::slack::wire::{ChannelInfo, MessageEnvelope};
use crate::slack::SlackClient;
use chrono::Local;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@(U[A-Z0-9]+)>").expect("mention pattern is valid"));

/// Run a collection pass over the configured channels and return the
/// aggregate archive. Channels that cannot be read are recorded with an
/// error marker rather than aborting the run.
pub async fn collect(
    client: &SlackClient,
    config: &Config,
    kind: CollectionKind,
) -> Result<Collection> {
    client.auth_test().await?;

    let mut channels = client.list_channels().await?;
    if let CollectionKind::Recent { .. } = kind {
        channels.retain(|c| matches_prefixes(&c.name, &config.channels.prefixes));
        tracing::info!(count = channels.len(), "channels matched configured prefixes");
    }

    let mut collection = Collection {
        collection_time: Local::now(),
        collection_type: match kind {
            CollectionKind::Complete => Some("complete_history".into()),
            CollectionKind::Recent { .. } => None,
        },
        channels: BTreeMap::new(),
        user_cache: BTreeMap::new(),
    };

    let total = channels.len();
    let mut accessible = 0usize;
    let mut inaccessible = 0usize;
    let mut total_messages = 0usize;

    for (index, channel) in channels.iter().enumerate() {
        tracing::info!(
            channel = %channel.name,
            progress = format!("{}/{}", index + 1, total),
            "collecting channel"
        );

        match archive_channel(client, channel, kind, &mut collection.user_cache).await {
            Ok(archive) => {
                accessible += 1;
                total_messages += archive.message_count + archive.thread_replies_count;
                tracing::info!(
                    channel = %channel.name,
                    messages = archive.message_count,
                    replies = archive.thread_replies_count,
                    "channel collected"
                );
                collection.channels.insert(channel.name.clone(), archive);
            }
            Err(Error::Slack(SlackError::Api { code, .. })) if code == "not_in_channel" => {
                inaccessible += 1;
                tracing::warn!(channel = %channel.name, "bot not in channel");
                collection.channels.insert(
                    channel.name.clone(),
                    ChannelArchive::errored(&channel.id, "bot_not_in_channel"),
                );
            }
            Err(error) => {
                inaccessible += 1;
                tracing::warn!(channel = %channel.name, %error, "channel collection failed");
                collection.channels.insert(
                    channel.name.clone(),
                    ChannelArchive::errored(&channel.id, error.to_string()),
                );
            }
        }
    }

    tracing::info!(
        accessible,
        inaccessible,
        total_messages,
        users_resolved = collection.user_cache.len(),
        "collection complete"
    );

    Ok(collection)
}

async fn archive_channel(
    client: &SlackClient,
    channel: &ChannelInfo,
    kind: CollectionKind,
    user_cache: &mut BTreeMap<String, UserProfile>,
) -> Result<ChannelArchive> {
    let oldest = match kind {
        CollectionKind::Recent { days } => Some(Local::now() - chrono::Duration::days(days)),
        CollectionKind::Complete => None,
    };

    let history = client.channel_history(&channel.id, oldest).await?;
    let message_count = history.len();

    let mut messages = Vec::with_capacity(message_count);
    let mut thread_replies_count = 0usize;

    for msg in history {
        let user_name = resolve_author(client, user_cache, msg.user.as_deref()).await;
        let text = resolve_user_mentions(&msg.text, user_cache);

        let mut collected = CollectedMessage {
            timestamp: msg.ts.clone(),
            user_id: msg.user.clone(),
            user_name,
            text,
            kind: msg.kind.clone(),
            subtype: msg.subtype.clone(),
            thread_ts: msg.thread_ts.clone(),
            reply_count: msg.reply_count,
            replies: Vec::new(),
        };

        if msg.reply_count > 0 {
            tracing::debug!(
                channel = %channel.name,
                thread_ts = %msg.ts,
                expected = msg.reply_count,
                "fetching thread replies"
            );
            let replies = client.thread_replies(&channel.id, &msg.ts).await;
            for reply in replies {
                collected
                    .replies
                    .push(collect_reply(client, user_cache, reply).await);
            }
            thread_replies_count += collected.replies.len();
        }

        messages.push(collected);
    }

    Ok(ChannelArchive {
        id: channel.id.clone(),
        error: None,
        message_count,
        thread_replies_count,
        messages,
    })
}

async fn collect_reply(
    client: &SlackClient,
    user_cache: &mut BTreeMap<String, UserProfile>,
    reply: MessageEnvelope,
) -> CollectedReply {
    let user_name = resolve_author(client, user_cache, reply.user.as_deref()).await;
    let text = resolve_user_mentions(&reply.text, user_cache);

    CollectedReply {
        timestamp: reply.ts,
        user_id: reply.user,
        user_name,
        text,
        kind: reply.kind,
        subtype: reply.subtype,
        thread_ts: reply.thread_ts,
    }
}

/// Resolve an author id through the memoized user cache, fetching on a miss.
async fn resolve_author(
    client: &SlackClient,
    user_cache: &mut BTreeMap<String, UserProfile>,
    user_id: Option<&str>,
) -> String {
    let Some(user_id) = user_id else {
        return "Unknown".into();
    };

    if !user_cache.contains_key(user_id) {
        tracing::debug!(user_id, "looking up user");
        let profile = client.user_info(user_id).await;
        user_cache.insert(user_id.to_string(), profile);
    }

    user_cache
        .get(user_id)
        .and_then(|u| u.preferred_name())
        .unwrap_or("Unknown")
        .to_string()
}

/// Replace `<@USER_ID>` mention tokens with `@name` for users already in
/// the cache. Unresolved or unknown mentions are left verbatim.
pub fn resolve_user_mentions(text: &str, user_cache: &BTreeMap<String, UserProfile>) -> String {
    MENTION_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let user_id = &caps[1];
            match user_cache.get(user_id).and_then(|u| u.preferred_name()) {
                Some(name) if name != "Unknown" => format!("@{name}"),
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn matches_prefixes(name: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| name.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with(entries: &[(&str, &str)]) -> BTreeMap<String, UserProfile> {
        entries
            .iter()
            .map(|(id, display)| {
                (
                    id.to_string(),
                    UserProfile {
                        id: id.to_string(),
                        name: "user".into(),
                        real_name: "Real Name".into(),
                        display_name: display.to_string(),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn cached_mentions_are_substituted() {
        let cache = cache_with(&[("U123ABC", "ada")]);
        assert_eq!(
            resolve_user_mentions("ping <@U123ABC> please", &cache),
            "ping @ada please"
        );
    }

    #[test]
    fn uncached_mentions_are_left_verbatim() {
        let cache = cache_with(&[("U123ABC", "ada")]);
        assert_eq!(
            resolve_user_mentions("ping <@U999ZZZ>", &cache),
            "ping <@U999ZZZ>"
        );
    }

    #[test]
    fn unknown_users_are_not_substituted() {
        let mut cache = BTreeMap::new();
        cache.insert("U1".to_string(), UserProfile::unknown("U1"));
        assert_eq!(resolve_user_mentions("hey <@U1>", &cache), "hey <@U1>");
    }

    #[test]
    fn multiple_mentions_resolve_independently() {
        let cache = cache_with(&[("UAAA111", "ada"), ("UBBB222", "grace")]);
        assert_eq!(
            resolve_user_mentions("<@UAAA111> and <@UBBB222> and <@UCCC333>", &cache),
            "@ada and @grace and <@UCCC333>"
        );
    }

    #[test]
    fn lowercase_ids_are_not_mention_tokens() {
        let cache = cache_with(&[("U123ABC", "ada")]);
        assert_eq!(resolve_user_mentions("<@u123abc>", &cache), "<@u123abc>");
    }

    #[test]
    fn prefix_matching_selects_channels() {
        let prefixes = vec!["lab-notes-".to_string(), "surface-area-".to_string()];
        assert!(matches_prefixes("lab-notes-ada", &prefixes));
        assert!(matches_prefixes("surface-area-models", &prefixes));
        assert!(!matches_prefixes("general", &prefixes));
        assert!(!matches_prefixes("notes-lab", &prefixes));
    }
}
