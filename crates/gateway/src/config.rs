// Gateway configuration.
//
// All settings come from environment variables with development-friendly
// defaults, so `cargo run` works against a local document server without a
// single exported variable.
//
// | Variable                                | Default                                    |
// |-----------------------------------------|--------------------------------------------|
// | `CHARTA_GATEWAY_HOST`                   | `0.0.0.0`                                  |
// | `CHARTA_GATEWAY_PORT`                   | `8080`                                     |
// | `CHARTA_GATEWAY_PUBLIC_BASE_URL`        | `http://{host}:{port}`                     |
// | `CHARTA_GATEWAY_JWT_SECRET`             | fixed development secret                   |
// | `CHARTA_GATEWAY_TOKEN_TTL_SECS`         | `86400`                                    |
// | `CHARTA_GATEWAY_DOCSERVER_URL`          | `http://localhost:8000`                    |
// | `CHARTA_GATEWAY_DOCSERVER_SDK_PATH`     | `/web-apps/apps/api/documents/api.js`      |
// | `CHARTA_GATEWAY_SLACK_API_BASE`         | `https://slack.com/api`                    |
// | `CHARTA_GATEWAY_SLACK_BOT_TOKEN`        | none                                       |
// | `CHARTA_GATEWAY_CREDENTIAL_SERVICE_URL` | `http://localhost:4700`                    |
// | `CHARTA_GATEWAY_INSTALL_URL`            | `https://slack.com/oauth/v2/authorize`     |
// | `CHARTA_GATEWAY_LOG_FILTER`             | `info`                                     |

use std::env;
use std::net::SocketAddr;

/// Development-only signing secret. Long enough to pass the codec's length
/// check, useless for anything but local testing.
pub const DEV_JWT_SECRET: &str = "charta_local_development_jwt_secret_must_be_32_chars";

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_TOKEN_TTL_SECS: i64 = 86_400;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address the HTTP listener binds to.
    pub listen_addr: SocketAddr,
    /// Externally reachable base URL, used when minting editor and callback
    /// links for Slack and the document server.
    pub public_base_url: String,
    /// HS256 secret for session tokens.
    pub jwt_secret: String,
    /// Session token lifetime in seconds.
    pub token_ttl_secs: i64,
    /// Document server the editor page loads its script from.
    pub docserver_url: String,
    /// Path of the editor SDK script on the document server.
    pub docserver_sdk_path: String,
    /// Slack Web API base.
    pub slack_api_base: String,
    /// Bot token used for shortcut responses (modals and DMs).
    pub bot_token: Option<String>,
    /// Credential service resolving user access tokens.
    pub credential_service_url: String,
    /// Workspace installation link shown on the landing page.
    pub install_url: String,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self::from_env_fn(|name| env::var(name))
    }

    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let host = env("CHARTA_GATEWAY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env("CHARTA_GATEWAY_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)));

        let public_base_url = env("CHARTA_GATEWAY_PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://{listen_addr}"));

        Self {
            listen_addr,
            public_base_url,
            jwt_secret: env("CHARTA_GATEWAY_JWT_SECRET")
                .unwrap_or_else(|_| DEV_JWT_SECRET.to_string()),
            token_ttl_secs: env("CHARTA_GATEWAY_TOKEN_TTL_SECS")
                .ok()
                .and_then(|value| value.parse::<i64>().ok())
                .filter(|ttl| *ttl > 0)
                .unwrap_or(DEFAULT_TOKEN_TTL_SECS),
            docserver_url: env("CHARTA_GATEWAY_DOCSERVER_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            docserver_sdk_path: env("CHARTA_GATEWAY_DOCSERVER_SDK_PATH")
                .unwrap_or_else(|_| "/web-apps/apps/api/documents/api.js".to_string()),
            slack_api_base: env("CHARTA_GATEWAY_SLACK_API_BASE")
                .unwrap_or_else(|_| "https://slack.com/api".to_string()),
            bot_token: env("CHARTA_GATEWAY_SLACK_BOT_TOKEN").ok(),
            credential_service_url: env("CHARTA_GATEWAY_CREDENTIAL_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:4700".to_string()),
            install_url: env("CHARTA_GATEWAY_INSTALL_URL")
                .unwrap_or_else(|_| "https://slack.com/oauth/v2/authorize".to_string()),
            log_filter: env("CHARTA_GATEWAY_LOG_FILTER").unwrap_or_else(|_| "info".to_string()),
        }
    }

    /// True when nothing replaced the built-in development secret.
    pub fn is_dev_jwt_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }

    /// Full URL of the editor SDK script the editor page must load.
    pub fn editor_api_url(&self) -> String {
        format!("{}{}", self.docserver_url, self.docserver_sdk_path)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::from_env_fn(|_| Err(env::VarError::NotPresent))
    }
}
