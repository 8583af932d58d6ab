//! Serde models for the Slack Web API responses we consume.

use serde::Deserialize;

/// Every Web API response carries an `ok` flag and, on failure, a named
/// error code alongside whatever body fields the method defines.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(flatten)]
    pub body: T,
}

/// Cursor envelope for paginated methods. Slack sends an empty string when
/// the cursor is exhausted.
#[derive(Debug, Default, Deserialize)]
pub struct ResponseMetadata {
    #[serde(default)]
    pub next_cursor: String,
}

impl ResponseMetadata {
    pub fn cursor(&self) -> Option<&str> {
        if self.next_cursor.is_empty() {
            None
        } else {
            Some(&self.next_cursor)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AuthTestBody {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub team: String,
    #[serde(default)]
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ChannelListBody {
    #[serde(default)]
    pub channels: Vec<ChannelInfo>,
    #[serde(default)]
    pub response_metadata: ResponseMetadata,
}

/// A public channel as returned by `conversations.list`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_member: bool,
}

#[derive(Debug, Deserialize)]
pub struct HistoryBody {
    #[serde(default)]
    pub messages: Vec<MessageEnvelope>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub response_metadata: ResponseMetadata,
}

/// A raw message from `conversations.history` or `conversations.replies`.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageEnvelope {
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub text: String,
    pub user: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub subtype: Option<String>,
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub reply_count: usize,
    pub bot_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PostMessageBody {
    #[serde(default)]
    pub ts: String,
}

#[derive(Debug, Deserialize)]
pub struct UserInfoBody {
    pub user: Option<UserRecord>,
}

#[derive(Debug, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub real_name: String,
    #[serde(default)]
    pub profile: UserProfileRecord,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserProfileRecord {
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadUrlBody {
    #[serde(default)]
    pub upload_url: String,
    #[serde(default)]
    pub file_id: String,
}

/// `files.completeUploadExternal` returns only the envelope fields we
/// already check, so the body is empty.
#[derive(Debug, Deserialize)]
pub struct EmptyBody {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_response_parses_with_defaults() {
        let raw = r#"{
            "ok": true,
            "messages": [
                {"ts": "1722470400.000100", "text": "hello", "user": "U1", "type": "message", "reply_count": 2, "thread_ts": "1722470400.000100"},
                {"ts": "1722470500.000200", "text": ""}
            ],
            "has_more": true,
            "response_metadata": {"next_cursor": "dXNlcjpVMDYxTkZUVDI="}
        }"#;

        let parsed: ApiResponse<HistoryBody> = serde_json::from_str(raw).unwrap();
        assert!(parsed.ok);
        assert_eq!(parsed.body.messages.len(), 2);
        assert_eq!(parsed.body.messages[0].reply_count, 2);
        assert_eq!(parsed.body.messages[1].reply_count, 0);
        assert!(parsed.body.messages[1].user.is_none());
        assert!(parsed.body.has_more);
        assert_eq!(parsed.body.response_metadata.cursor(), Some("dXNlcjpVMDYxTkZUVDI="));
    }

    #[test]
    fn error_response_parses_without_body_fields() {
        let raw = r#"{"ok": false, "error": "not_in_channel"}"#;
        let parsed: ApiResponse<HistoryBody> = serde_json::from_str(raw).unwrap();
        assert!(!parsed.ok);
        assert_eq!(parsed.error.as_deref(), Some("not_in_channel"));
        assert!(parsed.body.messages.is_empty());
    }

    #[test]
    fn exhausted_cursor_reads_as_none() {
        let raw = r#"{"ok": true, "channels": [{"id": "C1", "name": "general", "is_member": true}], "response_metadata": {"next_cursor": ""}}"#;
        let parsed: ApiResponse<ChannelListBody> = serde_json::from_str(raw).unwrap();
        assert!(parsed.body.response_metadata.cursor().is_none());
        assert!(parsed.body.channels[0].is_member);
    }

    #[test]
    fn membership_defaults_to_false() {
        let raw = r#"{"ok": true, "channels": [{"id": "C2", "name": "random"}]}"#;
        let parsed: ApiResponse<ChannelListBody> = serde_json::from_str(raw).unwrap();
        assert!(!parsed.body.channels[0].is_member);
    }
}
