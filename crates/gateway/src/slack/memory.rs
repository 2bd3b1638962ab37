// In-memory chat double.
//
// Backs unit and integration tests: seeded files and messages, recorded
// outbound traffic, and failure toggles for the code paths that branch on
// Slack errors.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use tokio::sync::RwLock;

use super::{FileUpload, MessageAttachment, MessageSnapshot, SlackFile};

/// An upload recorded by the double, with the token that authorized it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUpload {
    pub token: String,
    pub upload: FileUpload,
}

/// A `chat.postMessage` recorded by the double.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedMessage {
    pub token: String,
    pub channel: String,
    pub text: String,
}

#[derive(Default)]
struct MemoryChatState {
    files: HashMap<String, SlackFile>,
    messages: HashMap<(String, String), MessageSnapshot>,
    uploads: Vec<RecordedUpload>,
    posted: Vec<RecordedMessage>,
    views: Vec<serde_json::Value>,
    revoked: Vec<String>,
    share_fails: bool,
    update_fails: bool,
}

#[derive(Clone, Default)]
pub struct MemoryChatApi {
    state: Arc<RwLock<MemoryChatState>>,
}

impl MemoryChatApi {
    // ── Seeding and inspection ──────────────────────────────────────────────

    pub async fn seed_file(&self, file: SlackFile) {
        self.state.write().await.files.insert(file.id.clone(), file);
    }

    pub async fn seed_message(&self, channel: &str, snapshot: MessageSnapshot) {
        self.state
            .write()
            .await
            .messages
            .insert((channel.to_string(), snapshot.ts.clone()), snapshot);
    }

    /// Make `files.sharedPublicURL` fail, as it does for already-public
    /// files or restricted workspaces.
    pub async fn fail_public_link_sharing(&self) {
        self.state.write().await.share_fails = true;
    }

    /// Make `chat.update` fail.
    pub async fn fail_attachment_updates(&self) {
        self.state.write().await.update_fails = true;
    }

    pub async fn message(&self, channel: &str, ts: &str) -> Option<MessageSnapshot> {
        self.state
            .read()
            .await
            .messages
            .get(&(channel.to_string(), ts.to_string()))
            .cloned()
    }

    pub async fn uploads(&self) -> Vec<RecordedUpload> {
        self.state.read().await.uploads.clone()
    }

    pub async fn posted_messages(&self) -> Vec<RecordedMessage> {
        self.state.read().await.posted.clone()
    }

    pub async fn opened_views(&self) -> Vec<serde_json::Value> {
        self.state.read().await.views.clone()
    }

    pub async fn revoked_files(&self) -> Vec<String> {
        self.state.read().await.revoked.clone()
    }

    // ── API surface mirrored from `HttpChatApi` ─────────────────────────────

    pub async fn file_info(&self, _token: &str, file_id: &str) -> Result<SlackFile> {
        self.state
            .read()
            .await
            .files
            .get(file_id)
            .cloned()
            .ok_or_else(|| anyhow!("slack `files.info` failed: file_not_found"))
    }

    pub async fn share_public_link(&self, _token: &str, file_id: &str) -> Result<SlackFile> {
        let mut state = self.state.write().await;
        if state.share_fails {
            bail!("slack `files.sharedPublicURL` failed: already_public");
        }
        let file = state
            .files
            .get_mut(file_id)
            .ok_or_else(|| anyhow!("slack `files.sharedPublicURL` failed: file_not_found"))?;
        if file.permalink_public.is_none() {
            file.permalink_public =
                Some(format!("https://slack-files.com/TMEM-{file_id}-memsecret"));
        }
        Ok(file.clone())
    }

    pub async fn revoke_public_link(&self, _token: &str, file_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(file) = state.files.get_mut(file_id) {
            file.permalink_public = None;
        }
        state.revoked.push(file_id.to_string());
        Ok(())
    }

    pub async fn message_snapshot(
        &self,
        _token: &str,
        channel: &str,
        message_ts: &str,
        _is_reply: bool,
    ) -> Result<Option<MessageSnapshot>> {
        Ok(self
            .state
            .read()
            .await
            .messages
            .get(&(channel.to_string(), message_ts.to_string()))
            .cloned())
    }

    pub async fn update_attachments(
        &self,
        _token: &str,
        channel: &str,
        ts: &str,
        attachments: Vec<MessageAttachment>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        if state.update_fails {
            bail!("slack `chat.update` failed: fatal_error");
        }
        match state.messages.get_mut(&(channel.to_string(), ts.to_string())) {
            Some(snapshot) => {
                snapshot.attachments = attachments;
                Ok(())
            }
            None => bail!("slack `chat.update` failed: message_not_found"),
        }
    }

    pub async fn upload_file(&self, token: &str, upload: FileUpload) -> Result<()> {
        self.state
            .write()
            .await
            .uploads
            .push(RecordedUpload { token: token.to_string(), upload });
        Ok(())
    }

    pub async fn open_view(
        &self,
        _token: &str,
        _trigger_id: &str,
        view: serde_json::Value,
    ) -> Result<()> {
        self.state.write().await.views.push(view);
        Ok(())
    }

    pub async fn post_message(
        &self,
        token: &str,
        channel: &str,
        text: &str,
        _blocks: Option<&serde_json::Value>,
    ) -> Result<()> {
        self.state.write().await.posted.push(RecordedMessage {
            token: token.to_string(),
            channel: channel.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeded_files_and_messages_can_be_read_back() {
        let chat = MemoryChatApi::default();
        chat.seed_file(SlackFile {
            id: "F1".to_string(),
            name: "notes.txt".to_string(),
            filetype: "txt".to_string(),
            created: 1,
            channels: vec!["C1".to_string()],
            groups: vec![],
            permalink_public: None,
        })
        .await;
        chat.seed_message("C1", MessageSnapshot { ts: "1.2".to_string(), attachments: vec![] })
            .await;

        let file = chat.file_info("token", "F1").await.expect("file should resolve");
        assert_eq!(file.name, "notes.txt");
        let snapshot = chat
            .message_snapshot("token", "C1", "1.2", false)
            .await
            .expect("lookup should succeed");
        assert!(snapshot.is_some());
    }

    #[tokio::test]
    async fn sharing_assigns_a_public_link_once() {
        let chat = MemoryChatApi::default();
        chat.seed_file(SlackFile {
            id: "F1".to_string(),
            name: "notes.txt".to_string(),
            filetype: "txt".to_string(),
            created: 1,
            channels: vec![],
            groups: vec![],
            permalink_public: Some("https://slack-files.com/T1-F1-existing".to_string()),
        })
        .await;

        let shared = chat.share_public_link("token", "F1").await.expect("share should succeed");
        assert_eq!(
            shared.permalink_public.as_deref(),
            Some("https://slack-files.com/T1-F1-existing")
        );
    }

    #[tokio::test]
    async fn update_failure_toggle_breaks_attachment_writes() {
        let chat = MemoryChatApi::default();
        chat.seed_message("C1", MessageSnapshot { ts: "1.2".to_string(), attachments: vec![] })
            .await;
        chat.fail_attachment_updates().await;

        let result = chat.update_attachments("token", "C1", "1.2", vec![]).await;
        assert!(result.is_err());
    }
}
