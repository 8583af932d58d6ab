//! Artifact round-trip: a saved collection is what the summarize and
//! forward steps later locate and load.

use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use towncrier::archive::{
    self, ChannelArchive, CollectedMessage, CollectedReply, Collection, CollectionKind,
    UserProfile,
};
use towncrier::summarizer;

fn sample_collection(at_epoch: i64) -> Collection {
    let mut channels = BTreeMap::new();
    channels.insert(
        "lab-notes-ada".to_string(),
        ChannelArchive {
            id: "C001".into(),
            error: None,
            message_count: 1,
            thread_replies_count: 1,
            messages: vec![CollectedMessage {
                timestamp: "1722470400.000100".into(),
                user_id: Some("U1".into()),
                user_name: "ada".into(),
                text: "shipped the parser".into(),
                kind: Some("message".into()),
                subtype: None,
                thread_ts: Some("1722470400.000100".into()),
                reply_count: 1,
                replies: vec![CollectedReply {
                    timestamp: "1722470500.000200".into(),
                    user_id: Some("U2".into()),
                    user_name: "grace".into(),
                    text: "nice".into(),
                    kind: Some("message".into()),
                    subtype: None,
                    thread_ts: Some("1722470400.000100".into()),
                }],
            }],
        },
    );
    channels.insert(
        "lab-notes-locked".to_string(),
        ChannelArchive::errored("C002", "bot_not_in_channel"),
    );

    let mut user_cache = BTreeMap::new();
    user_cache.insert(
        "U1".to_string(),
        UserProfile {
            id: "U1".into(),
            name: "ada".into(),
            real_name: "Ada Lovelace".into(),
            display_name: "ada".into(),
        },
    );

    Collection {
        collection_time: DateTime::from_timestamp(at_epoch, 0)
            .unwrap()
            .with_timezone(&Local),
        collection_type: None,
        channels,
        user_cache,
    }
}

#[test]
fn saved_archives_are_located_and_reloaded() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");

    let older = sample_collection(1_722_470_400);
    let newer = sample_collection(1_722_556_800);
    older
        .save(&data_dir, CollectionKind::Recent { days: 7 })
        .unwrap();
    let newer_path = newer
        .save(&data_dir, CollectionKind::Recent { days: 7 })
        .unwrap();

    let located = archive::latest_archive(&data_dir).unwrap();
    assert_eq!(located, newer_path);

    let loaded = Collection::load(&located).unwrap();
    assert_eq!(loaded.channels.len(), 2);

    let ada = &loaded.channels["lab-notes-ada"];
    assert_eq!(ada.message_count, 1);
    assert_eq!(ada.messages[0].replies.len(), 1);
    assert_eq!(ada.messages[0].replies[0].user_name, "grace");

    let locked = &loaded.channels["lab-notes-locked"];
    assert_eq!(locked.error.as_deref(), Some("bot_not_in_channel"));
    assert!(locked.messages.is_empty());
}

#[test]
fn complete_history_archives_carry_their_type_marker() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");

    let mut collection = sample_collection(1_722_470_400);
    collection.collection_type = Some("complete_history".into());
    let path = collection.save(&data_dir, CollectionKind::Complete).unwrap();

    assert!(path
        .file_name()
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("complete_history_"));

    let loaded = Collection::load(&path).unwrap();
    assert_eq!(loaded.collection_type.as_deref(), Some("complete_history"));

    // The windowed locator must not pick up complete-history artifacts.
    assert!(archive::latest_archive(&data_dir).is_err());
}

#[test]
fn eligible_channels_skip_errored_ones_after_reload() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");

    let collection = sample_collection(1_722_470_400);
    let path = collection
        .save(&data_dir, CollectionKind::Recent { days: 7 })
        .unwrap();
    let loaded = Collection::load(&path).unwrap();

    let prefixes = vec!["lab-notes-".to_string()];
    let eligible = summarizer::eligible_channels(&loaded, &prefixes);
    assert_eq!(eligible, vec!["lab-notes-ada".to_string()]);
}

#[test]
fn latest_summary_picks_the_newest_digest() {
    let dir = tempfile::tempdir().unwrap();
    let summaries_dir = dir.path().join("summaries");
    std::fs::create_dir_all(&summaries_dir).unwrap();

    for name in [
        "summary_20250101_000000.txt",
        "summary_20250301_120000.txt",
        "summary_20250215_090000.txt",
    ] {
        std::fs::write(summaries_dir.join(name), "digest").unwrap();
    }

    let latest = summarizer::latest_summary(&summaries_dir).unwrap();
    assert_eq!(
        latest.file_name().unwrap().to_str().unwrap(),
        "summary_20250301_120000.txt"
    );
}
