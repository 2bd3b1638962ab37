// Document-server callback processing.
//
// Contract: every request is answered `200 {"error": 0|1}` no matter what
// went wrong, because any other shape makes the document server retry
// forever. Status 2 (save) uploads the edited bytes back into the
// conversation; statuses 2 and 4 revoke the public link and try to release
// the lock; every other status is acknowledged without action.

use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, error, info};

use charta_common::protocol::callback::CallbackBody;

use crate::error::{CallbackAck, GatewayError};
use crate::lock::ReleaseRequest;
use crate::routes::AppState;
use crate::slack::{FileUpload, SlackFile};
use crate::token::SessionClaims;

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub file: String,
    pub token: String,
}

/// `POST /callback?file=&token=`
pub async fn callback_handler(
    State(state): State<AppState>,
    query: Result<Query<CallbackQuery>, QueryRejection>,
    body: Bytes,
) -> Json<CallbackAck> {
    let Ok(Query(query)) = query else {
        error!("callback rejected: missing file or token query parameter");
        return Json(CallbackAck::FAILED);
    };

    let callback: CallbackBody = match serde_json::from_slice(&body) {
        Ok(parsed) => parsed,
        Err(parse_error) => {
            error!(error = %parse_error, file_id = %query.file, "callback rejected: undecodable body");
            return Json(CallbackAck::FAILED);
        }
    };

    match process(&state, &query.file, &query.token, &callback, Utc::now()).await {
        Ok(()) => Json(CallbackAck::OK),
        Err(process_error) => {
            error!(
                error = %process_error,
                file_id = %query.file,
                status = ?callback.status,
                "callback processing failed"
            );
            Json(CallbackAck::FAILED)
        }
    }
}

async fn process(
    state: &AppState,
    file_id: &str,
    token: &str,
    callback: &CallbackBody,
    now: DateTime<Utc>,
) -> Result<(), GatewayError> {
    // The token is decoded without verification here; release entitlement is
    // cross-checked against the durable lock tag instead.
    let claims = state.codec.decode_unverified(token)?;

    let author = state.credentials.get_token(&claims.author_credential_id(), now).await?;
    if !author.ok {
        return Err(GatewayError::CredentialNotFound(claims.author_credential_id()));
    }

    let file = state
        .chat
        .file_info(&author.token, file_id)
        .await
        .map_err(|source| GatewayError::FileResolution { file_id: file_id.to_string(), source })?;

    if callback.status.requires_upload() {
        upload_edited_document(state, &claims, &file, callback, now).await?;
    }

    if callback.status.is_terminal() {
        let channel = file
            .home_conversation()
            .ok_or_else(|| GatewayError::FileResolution {
                file_id: file_id.to_string(),
                source: anyhow::anyhow!("file belongs to no conversation"),
            })?
            .to_string();

        state.chat.revoke_public_link(&author.token, file_id).await?;

        let released = state
            .locks
            .release(
                ReleaseRequest {
                    access_token: author.token.clone(),
                    channel,
                    file_id: file.id.clone(),
                    message_ts: claims.message_timestamp.clone(),
                    is_reply: claims.is_reply,
                    doc_key: claims.doc_key.clone(),
                    issued_at: claims.issued_at,
                    is_co_editor: claims.is_co_editor,
                },
                callback,
                now,
            )
            .await?;
        info!(file_id = %file.id, released, status = ?callback.status, "editing session ended");
    } else {
        debug!(file_id = %file_id, status = ?callback.status, "callback acknowledged without action");
    }

    Ok(())
}

/// Download the edited bytes and upload them as a new file under the
/// conversation's thread root, acting as the editing user. A user without
/// stored credentials simply gets no upload.
async fn upload_edited_document(
    state: &AppState,
    claims: &SessionClaims,
    file: &SlackFile,
    callback: &CallbackBody,
    now: DateTime<Utc>,
) -> Result<(), GatewayError> {
    let url = callback
        .url
        .as_deref()
        .ok_or_else(|| GatewayError::Upstream(anyhow::anyhow!("save callback carried no document url")))?;
    let content = state.fetcher.fetch(url).await?;

    let editor = state.credentials.get_token(&claims.user_credential_id(), now).await?;
    if !editor.ok {
        debug!(file_id = %file.id, "editing user has no stored credentials, skipping upload");
        return Ok(());
    }

    let target = file
        .upload_conversation()
        .ok_or_else(|| GatewayError::FileResolution {
            file_id: file.id.clone(),
            source: anyhow::anyhow!("file belongs to no conversation"),
        })?
        .to_string();

    debug!(file_id = %file.id, target = %target, "uploading edited document");
    state
        .chat
        .upload_file(
            &editor.token,
            FileUpload {
                channel: target,
                thread_ts: claims.timestamp.clone(),
                filename: file.name.clone(),
                filetype: file.filetype.clone(),
                content,
            },
        )
        .await?;
    Ok(())
}
