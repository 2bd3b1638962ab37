// Message-shortcut handling.
//
// Slack POSTs an interaction payload when someone runs the message shortcut
// on a file message. Users with a stored installation get a modal listing
// each file as an editor link; everyone else gets an installation prompt by
// DM. The interaction response itself is always a plain 200 ack.

use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Form;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::routes::AppState;
use crate::slack::SlackFile;
use crate::token::SessionClaims;

#[derive(Debug, Deserialize)]
pub struct ShortcutForm {
    /// JSON interaction payload, form-encoded by Slack.
    pub payload: String,
}

#[derive(Debug, Deserialize)]
struct ShortcutPayload {
    trigger_id: String,
    user: ShortcutUser,
    team: ShortcutTeam,
    /// Timestamp of the message the shortcut ran on.
    message_ts: String,
    message: ShortcutMessage,
}

#[derive(Debug, Deserialize)]
struct ShortcutUser {
    id: String,
    #[serde(default)]
    team_id: String,
}

#[derive(Debug, Deserialize)]
struct ShortcutTeam {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ShortcutMessage {
    /// User who posted the message.
    #[serde(default)]
    user: String,
    ts: String,
    #[serde(default)]
    thread_ts: Option<String>,
    #[serde(default)]
    files: Vec<SlackFile>,
}

/// `POST /slack/shortcut`
pub async fn shortcut_handler(
    State(state): State<AppState>,
    Form(form): Form<ShortcutForm>,
) -> StatusCode {
    if let Err(shortcut_error) = handle(&state, &form.payload, Utc::now()).await {
        error!(error = %shortcut_error, "shortcut handling failed");
    }
    StatusCode::OK
}

async fn handle(state: &AppState, raw_payload: &str, now: DateTime<Utc>) -> anyhow::Result<()> {
    let shortcut: ShortcutPayload =
        serde_json::from_str(raw_payload).context("undecodable interaction payload")?;
    if shortcut.message.files.is_empty() {
        debug!("shortcut ran on a message without files");
        return Ok(());
    }

    let thread_root =
        shortcut.message.thread_ts.clone().unwrap_or_else(|| shortcut.message_ts.clone());
    let is_reply = thread_root != shortcut.message.ts;
    let claims = SessionClaims::for_message(
        shortcut.message.user.clone(),
        shortcut.user.id.clone(),
        shortcut.team.id.clone(),
        thread_root,
        shortcut.message.ts.clone(),
        is_reply,
        now.timestamp(),
    );
    let token = state.codec.mint(&claims)?;

    let bot_token =
        state.config.bot_token.as_deref().context("no bot token configured for shortcuts")?;
    let credential_id = format!("{}{}", shortcut.user.id, shortcut.user.team_id);
    let installed = state.credentials.get_token(&credential_id, now).await?;

    if installed.ok {
        let view =
            file_picker_view(&state.config.public_base_url, &shortcut.message.files, &token);
        state.chat.open_view(bot_token, &shortcut.trigger_id, view).await?;
    } else {
        let base = &state.config.public_base_url;
        let blocks = json!([{
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": format!(
                    "*In order to use ONLYOFFICE in your chat, please go to* <{base}/|ONLYOFFICE Activation>"
                ),
            }
        }]);
        state
            .chat
            .post_message(
                bot_token,
                &shortcut.user.id,
                &format!("In order to use ONLYOFFICE in your chat, please go to {base}/"),
                Some(&blocks),
            )
            .await?;
    }
    Ok(())
}

/// Modal listing each file of the message as an editor link.
fn file_picker_view(base_url: &str, files: &[SlackFile], token: &str) -> Value {
    let blocks: Vec<Value> = files
        .iter()
        .map(|file| {
            json!({
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": format!("<{base_url}/editor?file={}&token={token}|{}>", file.id, file.name),
                }
            })
        })
        .collect();

    json!({
        "type": "modal",
        "title": { "type": "plain_text", "text": "ONLYOFFICE" },
        "blocks": blocks,
    })
}
