// HTTP surface assembly.
//
// Routes:
//   GET  /               landing page with the installation link
//   GET  /healthz        liveness probe
//   GET  /editor         editor session initiation
//   POST /callback       document-server callbacks
//   POST /slack/shortcut message-shortcut interactions

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tracing::{error, info};
use uuid::Uuid;

use crate::callback;
use crate::config::GatewayConfig;
use crate::credentials::CredentialResolver;
use crate::docserver::DocumentFetcher;
use crate::editor;
use crate::lock::{LockCoordinator, MemoryGuardStore};
use crate::shortcut;
use crate::slack::{ChatApi, HttpChatApi};
use crate::token::SessionTokenCodec;

const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared state every handler sees.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub codec: Arc<SessionTokenCodec>,
    pub locks: Arc<LockCoordinator>,
    pub chat: ChatApi,
    pub credentials: Arc<CredentialResolver>,
    pub fetcher: DocumentFetcher,
}

/// Assemble the production application from configuration.
pub fn build_app(config: &GatewayConfig) -> anyhow::Result<Router> {
    let codec = SessionTokenCodec::new(&config.jwt_secret, config.token_ttl_secs)
        .context("gateway session token configuration is invalid")?;
    let chat = ChatApi::Http(HttpChatApi::new(config.slack_api_base.clone()));
    let locks = LockCoordinator::new(chat.clone(), Box::new(MemoryGuardStore::default()));

    Ok(build_router(AppState {
        config: Arc::new(config.clone()),
        codec: Arc::new(codec),
        locks: Arc::new(locks),
        chat,
        credentials: Arc::new(CredentialResolver::over_http(
            config.credential_service_url.clone(),
        )),
        fetcher: DocumentFetcher::Http(reqwest::Client::new()),
    }))
}

/// Assemble the router around explicit state. Tests inject in-memory
/// backends through here.
pub fn build_router(state: AppState) -> Router {
    apply_middleware(
        Router::new()
            .route("/", get(landing))
            .route("/healthz", get(healthz))
            .route("/editor", get(editor::editor_handler))
            .route("/callback", post(callback::callback_handler))
            .route("/slack/shortcut", post(shortcut::shortcut_handler))
            .with_state(state),
    )
}

fn apply_middleware(router: Router) -> Router {
    router
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(middleware::from_fn(request_context_middleware))
        .layer(middleware::from_fn(panic_handler))
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn landing(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        concat!(
            "<!doctype html><html><head><meta charset=\"utf-8\">",
            "<title>Charta</title></head><body>",
            "<h1>ONLYOFFICE for Slack</h1>",
            "<p>Edit documents shared in your workspace without leaving the conversation.</p>",
            "<p><a href=\"{install_url}\">Add to Slack</a></p>",
            "</body></html>"
        ),
        install_url = state.config.install_url
    ))
}

/// Tag every request with an id, propagate it on the response, and log one
/// line per request with its latency.
async fn request_context_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let method = request.method().clone();
    let uri = request.uri().clone();
    let started = Instant::now();

    let mut response = next.run(request).await;

    let elapsed_ms = started.elapsed().as_millis();
    info!(
        %method,
        %uri,
        status = %response.status(),
        elapsed_ms,
        request_id = %request_id,
        "http request"
    );

    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header_value);
    }
    response
}

/// Convert handler panics into 500 responses instead of dropped connections.
async fn panic_handler(request: Request<Body>, next: Next) -> Response {
    match tokio::spawn(next.run(request)).await {
        Ok(response) => response,
        Err(join_error) => {
            error!(error = %join_error, "request handler panicked");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
