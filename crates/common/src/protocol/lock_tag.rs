// Durable lock tag wire format.
//
// An editing lock is persisted by embedding a specially formatted attachment
// in the chat message that carries the file. The attachment's fallback text
// holds exactly four ` : `-separated fields:
//
//   ONLYOFFICE Key : {document_key} : {issued_at} : {owner_id}
//
// Anything that does not parse cleanly is treated by callers as "no lock",
// never as an error: a garbled tag must not wedge a conversation.

use thiserror::Error;

/// Sentinel first field of every lock tag.
pub const LOCK_TAG_PREFIX: &str = "ONLYOFFICE Key";

const FIELD_SEPARATOR: &str = " : ";
const FIELD_COUNT: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LockTagError {
    #[error("missing `{LOCK_TAG_PREFIX}` prefix")]
    MissingPrefix,

    #[error("expected {FIELD_COUNT} fields, found {0}")]
    FieldCount(usize),

    #[error("issued_at `{0}` is not a unix timestamp")]
    BadIssuedAt(String),

    #[error("document key is empty")]
    EmptyKey,

    #[error("owner id is empty")]
    EmptyOwner,
}

/// A parsed durable lock tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockTag {
    /// Editing-session key every co-editor must open.
    pub doc_key: String,
    /// `iat` of the session token that created the lock, unix seconds.
    pub issued_at: i64,
    /// User who owns the editing session.
    pub owner_id: String,
}

impl LockTag {
    pub fn new(
        doc_key: impl Into<String>,
        issued_at: i64,
        owner_id: impl Into<String>,
    ) -> Self {
        Self { doc_key: doc_key.into(), issued_at, owner_id: owner_id.into() }
    }

    /// Render the tag in its wire form.
    pub fn render(&self) -> String {
        format!(
            "{LOCK_TAG_PREFIX}{FIELD_SEPARATOR}{}{FIELD_SEPARATOR}{}{FIELD_SEPARATOR}{}",
            self.doc_key, self.issued_at, self.owner_id
        )
    }

    /// Parse an attachment fallback text as a lock tag.
    ///
    /// Fields are trimmed before interpretation; the prefix must match
    /// exactly and all four fields must be present.
    pub fn parse(text: &str) -> Result<Self, LockTagError> {
        let fields: Vec<&str> = text.split(FIELD_SEPARATOR).collect();

        if fields.first().map(|field| field.trim()) != Some(LOCK_TAG_PREFIX) {
            return Err(LockTagError::MissingPrefix);
        }
        if fields.len() != FIELD_COUNT {
            return Err(LockTagError::FieldCount(fields.len()));
        }

        let doc_key = fields[1].trim();
        if doc_key.is_empty() {
            return Err(LockTagError::EmptyKey);
        }

        let issued_at_raw = fields[2].trim();
        let issued_at: i64 = issued_at_raw
            .parse()
            .map_err(|_| LockTagError::BadIssuedAt(issued_at_raw.to_string()))?;

        let owner_id = fields[3].trim();
        if owner_id.is_empty() {
            return Err(LockTagError::EmptyOwner);
        }

        Ok(Self { doc_key: doc_key.to_string(), issued_at, owner_id: owner_id.to_string() })
    }
}
