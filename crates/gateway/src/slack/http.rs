// Slack Web API over HTTP.
//
// A thin request shim: bearer-authed POSTs, envelope `ok`/`error` checks,
// and narrowing into the gateway's types. Which token to use for which call
// is decided by the callers.

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::{FileUpload, MessageAttachment, MessageSnapshot, SlackFile};

#[derive(Clone)]
pub struct HttpChatApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpChatApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }

    pub async fn file_info(&self, token: &str, file_id: &str) -> Result<SlackFile> {
        let envelope: FileEnvelope =
            self.post_form("files.info", token, &[("file", file_id)]).await?;
        envelope.into_file("files.info")
    }

    pub async fn share_public_link(&self, token: &str, file_id: &str) -> Result<SlackFile> {
        let envelope: FileEnvelope =
            self.post_form("files.sharedPublicURL", token, &[("file", file_id)]).await?;
        envelope.into_file("files.sharedPublicURL")
    }

    pub async fn revoke_public_link(&self, token: &str, file_id: &str) -> Result<()> {
        let envelope: PlainEnvelope =
            self.post_form("files.revokePublicURL", token, &[("file", file_id)]).await?;
        envelope.ensure("files.revokePublicURL")
    }

    pub async fn message_snapshot(
        &self,
        token: &str,
        channel: &str,
        message_ts: &str,
        is_reply: bool,
    ) -> Result<Option<MessageSnapshot>> {
        let (method, anchor) = if is_reply {
            ("conversations.replies", "ts")
        } else {
            ("conversations.history", "latest")
        };
        let envelope: MessagesEnvelope = self
            .post_form(
                method,
                token,
                &[("channel", channel), (anchor, message_ts), ("inclusive", "true"), ("limit", "1")],
            )
            .await?;
        if !envelope.ok {
            bail!("slack `{method}` failed: {}", envelope.error_label());
        }

        Ok(envelope
            .messages
            .into_iter()
            .find(|message| message.ts == message_ts)
            .map(|message| MessageSnapshot { ts: message.ts, attachments: message.attachments }))
    }

    pub async fn update_attachments(
        &self,
        token: &str,
        channel: &str,
        ts: &str,
        attachments: &[MessageAttachment],
    ) -> Result<()> {
        let envelope: PlainEnvelope = self
            .post_json(
                "chat.update",
                token,
                &json!({ "channel": channel, "ts": ts, "attachments": attachments }),
            )
            .await?;
        envelope.ensure("chat.update")
    }

    pub async fn upload_file(&self, token: &str, upload: &FileUpload) -> Result<()> {
        let form = reqwest::multipart::Form::new()
            .text("channels", upload.channel.clone())
            .text("thread_ts", upload.thread_ts.clone())
            .text("filename", upload.filename.clone())
            .text("filetype", upload.filetype.clone())
            .part(
                "file",
                reqwest::multipart::Part::bytes(upload.content.clone())
                    .file_name(upload.filename.clone()),
            );
        let response = self
            .client
            .post(format!("{}/files.upload", self.base_url))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .context("slack `files.upload` request failed")?;
        let envelope: PlainEnvelope = response
            .json()
            .await
            .context("slack `files.upload` returned an undecodable body")?;
        envelope.ensure("files.upload")
    }

    pub async fn open_view(
        &self,
        token: &str,
        trigger_id: &str,
        view: &serde_json::Value,
    ) -> Result<()> {
        let envelope: PlainEnvelope = self
            .post_json("views.open", token, &json!({ "trigger_id": trigger_id, "view": view }))
            .await?;
        envelope.ensure("views.open")
    }

    pub async fn post_message(
        &self,
        token: &str,
        channel: &str,
        text: &str,
        blocks: Option<&serde_json::Value>,
    ) -> Result<()> {
        let mut body = json!({ "channel": channel, "text": text });
        if let Some(blocks) = blocks {
            body["blocks"] = blocks.clone();
        }
        let envelope: PlainEnvelope = self.post_json("chat.postMessage", token, &body).await?;
        envelope.ensure("chat.postMessage")
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        method: &str,
        token: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        let response = self
            .client
            .post(format!("{}/{method}", self.base_url))
            .bearer_auth(token)
            .form(params)
            .send()
            .await
            .with_context(|| format!("slack `{method}` request failed"))?;
        response
            .json()
            .await
            .with_context(|| format!("slack `{method}` returned an undecodable body"))
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        method: &str,
        token: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let response = self
            .client
            .post(format!("{}/{method}", self.base_url))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .with_context(|| format!("slack `{method}` request failed"))?;
        response
            .json()
            .await
            .with_context(|| format!("slack `{method}` returned an undecodable body"))
    }
}

// ── Response envelopes ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PlainEnvelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

impl PlainEnvelope {
    fn error_label(&self) -> &str {
        self.error.as_deref().unwrap_or("unknown error")
    }

    fn ensure(&self, method: &str) -> Result<()> {
        if self.ok {
            Ok(())
        } else {
            bail!("slack `{method}` failed: {}", self.error_label())
        }
    }
}

#[derive(Debug, Deserialize)]
struct FileEnvelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    file: Option<SlackFile>,
}

impl FileEnvelope {
    fn into_file(self, method: &str) -> Result<SlackFile> {
        if !self.ok {
            bail!(
                "slack `{method}` failed: {}",
                self.error.as_deref().unwrap_or("unknown error")
            );
        }
        self.file
            .with_context(|| format!("slack `{method}` answered ok without a file"))
    }
}

#[derive(Debug, Deserialize)]
struct MessagesEnvelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    messages: Vec<RawMessage>,
}

impl MessagesEnvelope {
    fn error_label(&self) -> &str {
        self.error.as_deref().unwrap_or("unknown error")
    }
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    ts: String,
    #[serde(default)]
    attachments: Vec<MessageAttachment>,
}
