// Editor session initiation.
//
// `GET /editor?file=&token=` turns a verified session token into a complete
// editor configuration: resolved credentials, file metadata, a public
// download link, a session key from the lock coordinator, and a re-minted
// token inside the callback URL. Any failure redirects to the landing page;
// a partial configuration is never returned.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use charta_common::keygen::document_key;
use charta_common::link::download_url;
use charta_common::types::{file_extension, DocumentKind, EditorConfig, EditorSpec, FileSpec};

use crate::error::GatewayError;
use crate::lock::{LockRequest, LockRole};
use crate::routes::AppState;

#[derive(Debug, Deserialize)]
pub struct EditorQuery {
    pub file: String,
    pub token: String,
}

/// `GET /editor?file=&token=`
pub async fn editor_handler(
    State(state): State<AppState>,
    query: Result<Query<EditorQuery>, QueryRejection>,
) -> Response {
    let Ok(Query(query)) = query else {
        return Redirect::to("/").into_response();
    };

    match open_session(&state, &query.file, &query.token, Utc::now()).await {
        Ok(config) => Json(config).into_response(),
        Err(error) => {
            warn!(error = %error, file_id = %query.file, "editor session failed, redirecting");
            Redirect::to("/").into_response()
        }
    }
}

/// Build the full editor configuration for one opening of a file.
pub async fn open_session(
    state: &AppState,
    file_id: &str,
    token: &str,
    now: DateTime<Utc>,
) -> Result<EditorConfig, GatewayError> {
    let claims = state.codec.verify(token)?;

    let author = state.credentials.get_token(&claims.author_credential_id(), now).await?;
    if !author.ok {
        return Err(GatewayError::CredentialNotFound(claims.author_credential_id()));
    }

    let file = state
        .chat
        .file_info(&author.token, file_id)
        .await
        .map_err(|source| GatewayError::FileResolution { file_id: file_id.to_string(), source })?;
    let channel = file
        .home_conversation()
        .ok_or_else(|| GatewayError::FileResolution {
            file_id: file_id.to_string(),
            source: anyhow::anyhow!("file belongs to no conversation"),
        })?
        .to_string();

    // Ask for a public link; when sharing is refused (commonly because the
    // file is already public) fall back to whatever link the file carries.
    let permalink = match state.chat.share_public_link(&author.token, file_id).await {
        Ok(shared) => shared.permalink_public,
        Err(share_error) => {
            debug!(error = %share_error, file_id = %file_id, "public link sharing refused, re-reading file");
            state
                .chat
                .file_info(&author.token, file_id)
                .await
                .map_err(|source| GatewayError::FileResolution {
                    file_id: file_id.to_string(),
                    source,
                })?
                .permalink_public
        }
    };
    let permalink = permalink.ok_or_else(|| GatewayError::NoPublicLink(file_id.to_string()))?;
    let uri = download_url(&permalink, &file.name).map_err(|link_error| {
        debug!(error = %link_error, file_id = %file_id, "download link derivation failed");
        GatewayError::NoPublicLink(file_id.to_string())
    })?;

    let grant = state
        .locks
        .acquire_or_join(
            LockRequest {
                access_token: author.token.clone(),
                channel,
                file_id: file.id.clone(),
                message_ts: claims.message_timestamp.clone(),
                is_reply: claims.is_reply,
                candidate_key: document_key(&file.id, file.created, now.timestamp_millis()),
                requester_id: claims.user_id.clone(),
                issued_at: claims.issued_at,
            },
            now,
        )
        .await?;

    let session_token = state.codec.mint(&claims.clone().with_lock(
        &grant.doc_key,
        &grant.owner_id,
        grant.role == LockRole::CoEditor,
    ))?;

    let ext = file_extension(&file.name).to_string();
    Ok(EditorConfig {
        api_url: state.config.editor_api_url(),
        file: FileSpec { name: file.name.clone(), uri, ext: ext.clone() },
        editor: EditorSpec {
            document_type: DocumentKind::from_extension(&ext),
            key: grant.doc_key,
            callback_url: format!(
                "{}/callback?file={}&token={}",
                state.config.public_base_url, file.id, session_token
            ),
            user_id: claims.user_id,
        },
    })
}
