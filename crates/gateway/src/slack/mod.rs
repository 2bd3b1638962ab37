// Chat-platform adapter.
//
// All Slack Web API traffic flows through `ChatApi`: an HTTP client in
// production, an in-memory double in tests. Responses are narrowed at this
// boundary to the handful of fields the gateway interprets. Attachments keep
// their unrecognized fields so a lock rewrite never destroys content some
// other app put there.

pub mod http;
pub mod memory;

use serde::{Deserialize, Serialize};

use charta_common::protocol::lock_tag::LockTag;

pub use http::HttpChatApi;
pub use memory::{MemoryChatApi, RecordedMessage, RecordedUpload};

/// File metadata as returned by `files.info` and `files.sharedPublicURL`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub filetype: String,
    /// Creation time in epoch seconds.
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub permalink_public: Option<String>,
}

impl SlackFile {
    /// The conversation this file's message lives in: the first channel,
    /// else the first private group.
    pub fn home_conversation(&self) -> Option<&str> {
        self.channels.first().or_else(|| self.groups.first()).map(String::as_str)
    }

    /// Where edited content lands: the first private group, else the first
    /// channel.
    pub fn upload_conversation(&self) -> Option<&str> {
        self.groups.first().or_else(|| self.channels.first()).map(String::as_str)
    }
}

/// A message narrowed to what lock coordination needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSnapshot {
    pub ts: String,
    #[serde(default)]
    pub attachments: Vec<MessageAttachment>,
}

/// One entry of a message's attachment list. Unknown fields ride along in
/// `extra` and survive a rewrite untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageAttachment {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mrkdwn_in: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
    /// Plain-text summary; the lock tag hides in here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MessageAttachment {
    /// The visible banner carrying a durable lock tag in its fallback text.
    pub fn lock_banner(tag: &LockTag) -> Self {
        Self {
            mrkdwn_in: vec!["text".to_string()],
            color: Some("#a7f9ae".to_string()),
            author_name: Some("[ONLYOFFICE Application]".to_string()),
            title: Some("The file is being edited".to_string()),
            footer: Some(String::new()),
            fallback: Some(tag.render()),
            ..Self::default()
        }
    }

    /// `chat.update` rejects an empty attachment list; when the last real
    /// attachment goes away this blank entry takes its place.
    pub fn placeholder() -> Self {
        Self {
            mrkdwn_in: vec!["text".to_string()],
            color: Some(String::new()),
            author_name: Some(String::new()),
            author_icon: Some(String::new()),
            title: Some(String::new()),
            footer: Some(String::new()),
            fallback: Some(String::new()),
            extra: serde_json::Map::new(),
        }
    }

    /// Parse this attachment's fallback as a lock tag, if it carries one.
    pub fn lock_tag(&self) -> Option<LockTag> {
        self.fallback.as_deref().and_then(|text| LockTag::parse(text).ok())
    }
}

/// Find the durable lock tag among a message's attachments.
pub fn find_lock_tag(attachments: &[MessageAttachment]) -> Option<(usize, LockTag)> {
    attachments
        .iter()
        .enumerate()
        .find_map(|(index, attachment)| attachment.lock_tag().map(|tag| (index, tag)))
}

/// Parameters for uploading an edited document back into a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub channel: String,
    /// Thread the upload lands in (the conversation's root message).
    pub thread_ts: String,
    pub filename: String,
    pub filetype: String,
    pub content: Vec<u8>,
}

/// Chat backend used by the gateway. Every method takes the access token to
/// act under; token choice is the caller's concern.
#[derive(Clone)]
pub enum ChatApi {
    Http(HttpChatApi),
    Memory(MemoryChatApi),
}

impl ChatApi {
    pub async fn file_info(&self, token: &str, file_id: &str) -> anyhow::Result<SlackFile> {
        match self {
            Self::Http(api) => api.file_info(token, file_id).await,
            Self::Memory(api) => api.file_info(token, file_id).await,
        }
    }

    pub async fn share_public_link(&self, token: &str, file_id: &str) -> anyhow::Result<SlackFile> {
        match self {
            Self::Http(api) => api.share_public_link(token, file_id).await,
            Self::Memory(api) => api.share_public_link(token, file_id).await,
        }
    }

    pub async fn revoke_public_link(&self, token: &str, file_id: &str) -> anyhow::Result<()> {
        match self {
            Self::Http(api) => api.revoke_public_link(token, file_id).await,
            Self::Memory(api) => api.revoke_public_link(token, file_id).await,
        }
    }

    /// Look up the message with exactly `message_ts`, via the replies API
    /// for thread replies and the history API otherwise.
    pub async fn message_snapshot(
        &self,
        token: &str,
        channel: &str,
        message_ts: &str,
        is_reply: bool,
    ) -> anyhow::Result<Option<MessageSnapshot>> {
        match self {
            Self::Http(api) => api.message_snapshot(token, channel, message_ts, is_reply).await,
            Self::Memory(api) => api.message_snapshot(token, channel, message_ts, is_reply).await,
        }
    }

    pub async fn update_attachments(
        &self,
        token: &str,
        channel: &str,
        ts: &str,
        attachments: Vec<MessageAttachment>,
    ) -> anyhow::Result<()> {
        match self {
            Self::Http(api) => api.update_attachments(token, channel, ts, &attachments).await,
            Self::Memory(api) => api.update_attachments(token, channel, ts, attachments).await,
        }
    }

    pub async fn upload_file(&self, token: &str, upload: FileUpload) -> anyhow::Result<()> {
        match self {
            Self::Http(api) => api.upload_file(token, &upload).await,
            Self::Memory(api) => api.upload_file(token, upload).await,
        }
    }

    pub async fn open_view(
        &self,
        token: &str,
        trigger_id: &str,
        view: serde_json::Value,
    ) -> anyhow::Result<()> {
        match self {
            Self::Http(api) => api.open_view(token, trigger_id, &view).await,
            Self::Memory(api) => api.open_view(token, trigger_id, view).await,
        }
    }

    pub async fn post_message(
        &self,
        token: &str,
        channel: &str,
        text: &str,
        blocks: Option<&serde_json::Value>,
    ) -> anyhow::Result<()> {
        match self {
            Self::Http(api) => api.post_message(token, channel, text, blocks).await,
            Self::Memory(api) => api.post_message(token, channel, text, blocks).await,
        }
    }
}
