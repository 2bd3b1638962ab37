// Stored-credential lookup with a short read-through cache.
//
// Installation records and their encryption live in the credential service;
// the gateway only ever asks "give me a usable access token for this user in
// this workspace". Lookups are keyed by the concatenated user and team ids.
// Positive answers are cached for a few seconds to absorb callback bursts;
// negative answers are always re-fetched.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::error::GatewayError;

/// How long a resolved token may be served from cache, in seconds.
pub const CREDENTIAL_CACHE_TTL_SECS: i64 = 10;

/// A resolved user credential. `ok == false` means no installation exists
/// for the requested id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserToken {
    pub token: String,
    pub ok: bool,
}

impl UserToken {
    /// The stand-in answer for users with no stored installation.
    pub fn missing() -> Self {
        Self { token: String::new(), ok: false }
    }
}

struct CachedToken {
    value: UserToken,
    expires_at: DateTime<Utc>,
}

enum CredentialTransport {
    Http { client: reqwest::Client, base_url: String },
    Static(HashMap<String, UserToken>),
}

/// Resolves user access tokens against the credential service.
pub struct CredentialResolver {
    transport: CredentialTransport,
    cache: Mutex<HashMap<String, CachedToken>>,
}

impl CredentialResolver {
    pub fn over_http(base_url: impl Into<String>) -> Self {
        Self {
            transport: CredentialTransport::Http {
                client: reqwest::Client::new(),
                base_url: base_url.into(),
            },
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolver backed by a fixed credential table; unknown ids resolve to
    /// [`UserToken::missing`].
    pub fn from_static(entries: impl IntoIterator<Item = (String, UserToken)>) -> Self {
        Self {
            transport: CredentialTransport::Static(entries.into_iter().collect()),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the access token for `credential_id` (user id + team id).
    pub async fn get_token(
        &self,
        credential_id: &str,
        now: DateTime<Utc>,
    ) -> Result<UserToken, GatewayError> {
        if let Some(cached) = self.cached(credential_id, now) {
            return Ok(cached);
        }

        let fetched = match &self.transport {
            CredentialTransport::Http { client, base_url } => {
                let response = client
                    .post(format!("{base_url}/token"))
                    .json(&json!({ "id": credential_id }))
                    .send()
                    .await
                    .context("credential service request failed")?;
                response
                    .json::<UserToken>()
                    .await
                    .context("credential service returned an undecodable body")?
            }
            CredentialTransport::Static(entries) => {
                entries.get(credential_id).cloned().unwrap_or_else(UserToken::missing)
            }
        };

        if !fetched.ok {
            debug!(credential_id = %credential_id, "no stored credentials");
        }
        self.store(credential_id, fetched.clone(), now);
        Ok(fetched)
    }

    fn cached(&self, credential_id: &str, now: DateTime<Utc>) -> Option<UserToken> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        match cache.get(credential_id) {
            Some(entry) if entry.expires_at <= now => {
                cache.remove(credential_id);
                None
            }
            // Negative answers are never served from cache; an installation
            // may have completed since.
            Some(entry) if entry.value.ok => Some(entry.value.clone()),
            _ => None,
        }
    }

    fn store(&self, credential_id: &str, value: UserToken, now: DateTime<Utc>) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.insert(
            credential_id.to_string(),
            CachedToken { value, expires_at: now + Duration::seconds(CREDENTIAL_CACHE_TTL_SECS) },
        );
    }
}
