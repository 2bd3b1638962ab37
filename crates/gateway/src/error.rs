// Gateway error kinds.
//
// Neither public endpoint surfaces these over HTTP: the editor page answers
// failure with a redirect to the landing page and the callback endpoint
// always answers `200 {"error": 0|1}`. The kinds exist so logs and tests can
// tell failure modes apart.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// A token decoded but is missing fields the round trip depends on.
    #[error("session token payload is missing required fields")]
    MalformedPayload,

    /// A token's signature does not match the gateway secret.
    #[error("session token signature is invalid")]
    InvalidSignature,

    /// A token's `exp` lies in the past.
    #[error("session token has expired")]
    Expired,

    /// No stored installation for the user the token names.
    #[error("no stored credentials for `{0}`")]
    CredentialNotFound(String),

    /// The file could not be looked up or belongs to no conversation.
    #[error("could not resolve file `{file_id}`")]
    FileResolution {
        file_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// No usable public download link could be produced for the file.
    #[error("no usable public link for file `{0}`")]
    NoPublicLink(String),

    /// Rewriting the lock tag attachments failed. Soft on acquisition,
    /// hard on release.
    #[error("failed to rewrite lock tag attachments")]
    LockWrite(#[source] anyhow::Error),

    /// Anything upstream the gateway does not interpret.
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

/// Fixed acknowledgement envelope the document server expects from every
/// callback response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackAck {
    pub error: u8,
}

impl CallbackAck {
    pub const OK: Self = Self { error: 0 };
    pub const FAILED: Self = Self { error: 1 };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_serializes_to_the_wire_envelope() {
        let ok = serde_json::to_string(&CallbackAck::OK).expect("ack should serialize");
        assert_eq!(ok, r#"{"error":0}"#);
        let failed = serde_json::to_string(&CallbackAck::FAILED).expect("ack should serialize");
        assert_eq!(failed, r#"{"error":1}"#);
    }

    #[test]
    fn credential_error_names_the_missing_id() {
        let error = GatewayError::CredentialNotFound("U1T1".to_string());
        assert_eq!(error.to_string(), "no stored credentials for `U1T1`");
    }

    #[test]
    fn upstream_errors_convert_from_anyhow() {
        let error: GatewayError = anyhow::anyhow!("socket closed").into();
        assert!(matches!(error, GatewayError::Upstream(_)));
    }
}
