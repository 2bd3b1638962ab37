// Document-server callback body.
//
// The document server POSTs one of these every time an editing session
// changes state. Only two statuses end a session: save (2) and close (4).
// Everything else is informational and must be acknowledged without side
// effects.

use serde::{Deserialize, Serialize};

/// Editing-session status reported by the document server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum SessionStatus {
    /// Document is being edited.
    Editing,
    /// Document is ready for saving; `url` carries the edited content.
    Save,
    /// Saving failed on the document-server side.
    SaveError,
    /// Document closed with no changes.
    Closed,
    /// Force-save completed mid-session.
    ForceSave,
    /// Force-save failed.
    ForceSaveError,
    /// Any status code this gateway does not interpret.
    Other(i64),
}

impl SessionStatus {
    /// Save and close end the editing session and trigger lock release.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Save | Self::Closed)
    }

    /// Only a save carries edited content to upload.
    pub fn requires_upload(self) -> bool {
        matches!(self, Self::Save)
    }
}

impl From<i64> for SessionStatus {
    fn from(code: i64) -> Self {
        match code {
            1 => Self::Editing,
            2 => Self::Save,
            3 => Self::SaveError,
            4 => Self::Closed,
            6 => Self::ForceSave,
            7 => Self::ForceSaveError,
            other => Self::Other(other),
        }
    }
}

impl From<SessionStatus> for i64 {
    fn from(status: SessionStatus) -> Self {
        match status {
            SessionStatus::Editing => 1,
            SessionStatus::Save => 2,
            SessionStatus::SaveError => 3,
            SessionStatus::Closed => 4,
            SessionStatus::ForceSave => 6,
            SessionStatus::ForceSaveError => 7,
            SessionStatus::Other(other) => other,
        }
    }
}

/// Body of a document-server callback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallbackBody {
    /// Document key the session was opened under.
    pub key: String,
    pub status: SessionStatus,
    /// Download URL for the edited document, present on save statuses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Users still connected to the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<String>>,
}

impl CallbackBody {
    /// True when the users list is absent or names exactly one participant.
    /// An explicitly empty list does not count as solo.
    pub fn solo_participant(&self) -> bool {
        match &self.users {
            None => true,
            Some(users) => users.len() == 1,
        }
    }
}
