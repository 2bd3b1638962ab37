// Session token codec.
//
// One signed token carries the whole editing round trip: minted at the
// message shortcut, verified when the editor page opens, re-minted with the
// granted lock context, and decoded again when the document server calls
// back. There is no server-side session store.

use anyhow::{bail, Context};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Claims carried through an editing round trip.
///
/// `issued_at` doubles as the session identity: the durable lock tag records
/// it, and release compares it against the caller's token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User who shared the file into the conversation.
    pub author_id: String,
    /// User who asked to edit.
    pub user_id: String,
    pub team_id: String,
    /// Thread-root timestamp of the conversation the file lives in.
    pub timestamp: String,
    /// Timestamp of the message carrying the file.
    pub message_timestamp: String,
    /// Whether that message is a thread reply rather than the root.
    pub is_reply: bool,
    #[serde(rename = "iat")]
    pub issued_at: i64,
    #[serde(default)]
    pub exp: i64,
    /// Session key granted by the lock coordinator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_key: Option<String>,
    /// User the granted session belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_owner: Option<String>,
    /// True when this token joined a session it does not own.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_co_editor: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl SessionClaims {
    #[allow(clippy::too_many_arguments)]
    pub fn for_message(
        author_id: impl Into<String>,
        user_id: impl Into<String>,
        team_id: impl Into<String>,
        timestamp: impl Into<String>,
        message_timestamp: impl Into<String>,
        is_reply: bool,
        issued_at: i64,
    ) -> Self {
        Self {
            author_id: author_id.into(),
            user_id: user_id.into(),
            team_id: team_id.into(),
            timestamp: timestamp.into(),
            message_timestamp: message_timestamp.into(),
            is_reply,
            issued_at,
            exp: 0,
            doc_key: None,
            lock_owner: None,
            is_co_editor: false,
        }
    }

    /// Attach the lock context granted for this session. `issued_at` is kept
    /// as-is so the re-minted token still matches the durable tag.
    pub fn with_lock(mut self, doc_key: &str, lock_owner: &str, is_co_editor: bool) -> Self {
        self.doc_key = Some(doc_key.to_string());
        self.lock_owner = Some(lock_owner.to_string());
        self.is_co_editor = is_co_editor;
        self
    }

    /// A token is usable only when every identifying field is present.
    pub fn validate(&self) -> Result<(), GatewayError> {
        let complete = !self.author_id.is_empty()
            && !self.user_id.is_empty()
            && !self.team_id.is_empty()
            && !self.timestamp.is_empty()
            && !self.message_timestamp.is_empty()
            && self.issued_at > 0;
        if complete {
            Ok(())
        } else {
            Err(GatewayError::MalformedPayload)
        }
    }

    /// Credential lookup id for the file's author.
    pub fn author_credential_id(&self) -> String {
        format!("{}{}", self.author_id, self.team_id)
    }

    /// Credential lookup id for the editing user.
    pub fn user_credential_id(&self) -> String {
        format!("{}{}", self.user_id, self.team_id)
    }
}

pub struct SessionTokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    verified: Validation,
    unverified: Validation,
    ttl_secs: i64,
}

impl SessionTokenCodec {
    pub fn new(secret: &str, ttl_secs: i64) -> anyhow::Result<Self> {
        if secret.len() < 32 {
            bail!("session token secret must be at least 32 characters long");
        }
        if ttl_secs <= 0 {
            bail!("session token ttl must be positive, got {ttl_secs}");
        }

        let mut verified = Validation::new(Algorithm::HS256);
        verified.leeway = 0;
        verified.validate_exp = true;
        verified.set_required_spec_claims(&["exp"]);

        let mut unverified = Validation::new(Algorithm::HS256);
        unverified.insecure_disable_signature_validation();
        unverified.validate_exp = false;
        unverified.set_required_spec_claims::<&str>(&[]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            verified,
            unverified,
            ttl_secs,
        })
    }

    /// Sign claims, stamping `exp` from their `issued_at`. Minting again
    /// after [`SessionClaims::with_lock`] keeps the original `iat`.
    pub fn mint(&self, claims: &SessionClaims) -> anyhow::Result<String> {
        let mut claims = claims.clone();
        claims.exp = claims.issued_at + self.ttl_secs;
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("failed to encode session token")
    }

    /// Decode with full verification: signature, expiry, payload shape.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, GatewayError> {
        let data = decode::<SessionClaims>(token, &self.decoding_key, &self.verified)
            .map_err(classify_decode_error)?;
        data.claims.validate()?;
        Ok(data.claims)
    }

    /// Decode without signature or expiry checks. Callback handling runs on
    /// this path; release decisions are cross-checked against the durable
    /// lock tag rather than the token signature.
    pub fn decode_unverified(&self, token: &str) -> Result<SessionClaims, GatewayError> {
        let data = decode::<SessionClaims>(token, &self.decoding_key, &self.unverified)
            .map_err(|_| GatewayError::MalformedPayload)?;
        data.claims.validate()?;
        Ok(data.claims)
    }
}

fn classify_decode_error(error: jsonwebtoken::errors::Error) -> GatewayError {
    match error.kind() {
        ErrorKind::ExpiredSignature => GatewayError::Expired,
        ErrorKind::Json(_) => GatewayError::MalformedPayload,
        _ => GatewayError::InvalidSignature,
    }
}
