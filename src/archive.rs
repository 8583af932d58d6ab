//! Collected-message archive model and JSON artifact I/O.
//!
//! The archive mirrors what the collector saw on the wire: per-channel
//! message lists with thread replies nested under their parents, plus the
//! user cache built during the run. Artifacts are pretty-printed JSON files
//! stamped with the collection time.

use crate::error::Result;
use anyhow::Context as _;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Which collection pass produced an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    /// Windowed collection of the last N days.
    Recent { days: i64 },
    /// Complete channel history, no time bound.
    Complete,
}

impl CollectionKind {
    /// Artifact filename prefix for this pass.
    pub fn file_prefix(self) -> &'static str {
        match self {
            CollectionKind::Recent { .. } => "messages",
            CollectionKind::Complete => "complete_history",
        }
    }
}

/// One collection run: every channel archive plus the resolved user cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub collection_time: DateTime<Local>,
    /// Set to "complete_history" by the unbounded pass.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub collection_type: Option<String>,
    pub channels: BTreeMap<String, ChannelArchive>,
    pub user_cache: BTreeMap<String, UserProfile>,
}

/// Messages collected from a single channel, or the error that prevented it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelArchive {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    pub message_count: usize,
    #[serde(default)]
    pub thread_replies_count: usize,
    pub messages: Vec<CollectedMessage>,
}

impl ChannelArchive {
    /// Placeholder archive for a channel that could not be read.
    pub fn errored(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            error: Some(error.into()),
            message_count: 0,
            thread_replies_count: 0,
            messages: Vec::new(),
        }
    }
}

/// A channel message with its thread replies attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectedMessage {
    /// Slack ts string ("seconds.micros"), the message's unique id.
    pub timestamp: String,
    pub user_id: Option<String>,
    pub user_name: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub subtype: Option<String>,
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub reply_count: usize,
    #[serde(default)]
    pub replies: Vec<CollectedReply>,
}

/// A thread reply. Same shape as a message minus the thread bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectedReply {
    pub timestamp: String,
    pub user_id: Option<String>,
    pub user_name: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub subtype: Option<String>,
    pub thread_ts: Option<String>,
}

/// A resolved user, memoized for the run and persisted with the archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub real_name: String,
    #[serde(default)]
    pub display_name: String,
}

impl UserProfile {
    /// Placeholder for a user whose lookup failed.
    pub fn unknown(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: "Unknown".into(),
            real_name: "Unknown".into(),
            display_name: String::new(),
        }
    }

    /// First non-empty of display name, real name, username.
    pub fn preferred_name(&self) -> Option<&str> {
        [
            self.display_name.as_str(),
            self.real_name.as_str(),
            self.name.as_str(),
        ]
        .into_iter()
        .find(|candidate| !candidate.is_empty())
    }
}

/// Parse a Slack ts string into epoch seconds for chronological ordering.
pub fn ts_to_epoch(ts: &str) -> f64 {
    ts.parse().unwrap_or(0.0)
}

impl Collection {
    /// Write the archive to a timestamped JSON file under `data_dir`.
    pub fn save(&self, data_dir: &Path, kind: CollectionKind) -> Result<PathBuf> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let stamp = self.collection_time.format("%Y%m%d_%H%M%S");
        let path = data_dir.join(format!("{}_{}.json", kind.file_prefix(), stamp));

        let json = serde_json::to_string_pretty(self).context("failed to serialize archive")?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;

        tracing::info!(path = %path.display(), "archive saved");
        Ok(path)
    }

    /// Load an archive from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let collection = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse archive {}", path.display()))?;
        Ok(collection)
    }
}

/// Most recent `messages_*.json` archive by filename (timestamps sort
/// lexicographically).
pub fn latest_archive(data_dir: &Path) -> Result<PathBuf> {
    let mut names: Vec<String> = list_dir(data_dir)?
        .into_iter()
        .filter(|name| name.starts_with("messages_") && name.ends_with(".json"))
        .collect();
    names.sort();

    let latest = names
        .pop()
        .with_context(|| format!("no message archives found in {}", data_dir.display()))?;
    Ok(data_dir.join(latest))
}

/// Most recently modified JSON file in the data directory, any prefix.
pub fn latest_json_by_mtime(data_dir: &Path) -> Result<PathBuf> {
    let mut files = json_files_by_mtime(data_dir)?;
    files
        .pop()
        .with_context(|| format!("no JSON files found in {}", data_dir.display()))
        .map_err(Into::into)
}

/// All JSON files in the data directory, oldest modification first.
pub fn json_files_by_mtime(data_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<(std::time::SystemTime, PathBuf)> = Vec::new();
    for name in list_dir(data_dir)? {
        if !name.ends_with(".json") {
            continue;
        }
        let path = data_dir.join(&name);
        let modified = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .with_context(|| format!("failed to stat {}", path.display()))?;
        files.push((modified, path));
    }
    files.sort_by_key(|(modified, _)| *modified);
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

fn list_dir(dir: &Path) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("data directory {} not found", dir.display()))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to list {}", dir.display()))?;
        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferred_name_falls_through_empty_fields() {
        let profile = UserProfile {
            id: "U1".into(),
            name: "ada".into(),
            real_name: "Ada Lovelace".into(),
            display_name: String::new(),
        };
        assert_eq!(profile.preferred_name(), Some("Ada Lovelace"));

        let bare = UserProfile {
            id: "U2".into(),
            name: "grace".into(),
            real_name: String::new(),
            display_name: String::new(),
        };
        assert_eq!(bare.preferred_name(), Some("grace"));
    }

    #[test]
    fn unknown_profile_prefers_the_unknown_real_name() {
        assert_eq!(UserProfile::unknown("U3").preferred_name(), Some("Unknown"));
    }

    #[test]
    fn ts_parsing_tolerates_garbage() {
        assert_eq!(ts_to_epoch("1722470400.123456"), 1722470400.123456);
        assert_eq!(ts_to_epoch("not-a-ts"), 0.0);
        assert_eq!(ts_to_epoch(""), 0.0);
    }

    #[test]
    fn latest_archive_picks_newest_by_name() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "messages_20250101_000000.json",
            "messages_20250301_120000.json",
            "messages_20250215_090000.json",
            "complete_history_20250401_000000.json",
            "notes.txt",
        ] {
            std::fs::write(dir.path().join(name), "{}").unwrap();
        }

        let latest = latest_archive(dir.path()).unwrap();
        assert_eq!(
            latest.file_name().unwrap().to_str().unwrap(),
            "messages_20250301_120000.json"
        );
    }

    #[test]
    fn latest_archive_errors_on_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(latest_archive(dir.path()).is_err());
    }

    #[test]
    fn mtime_ordering_ignores_filename_order() {
        use std::fs::File;
        use std::time::{Duration, SystemTime};

        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("zzz_newest_name.json");
        let new = dir.path().join("aaa_oldest_name.json");
        std::fs::write(&old, "{}").unwrap();
        std::fs::write(&new, "{}").unwrap();

        let base = SystemTime::now();
        File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(base - Duration::from_secs(3600))
            .unwrap();
        File::options()
            .write(true)
            .open(&new)
            .unwrap()
            .set_modified(base)
            .unwrap();

        let latest = latest_json_by_mtime(dir.path()).unwrap();
        assert_eq!(latest, new);

        let all = json_files_by_mtime(dir.path()).unwrap();
        assert_eq!(all, vec![old, new]);
    }
}
