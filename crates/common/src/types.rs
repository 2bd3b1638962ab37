// Core domain types shared across the Charta crates.

use serde::{Deserialize, Serialize};

/// Editor family the document server should open for a given file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// Text documents.
    Word,
    /// Spreadsheets.
    Cell,
    /// Presentations.
    Slide,
}

const WORD_EXTENSIONS: &[&str] = &[
    "doc", "docx", "docm", "dot", "dotx", "dotm", "odt", "fodt", "ott", "rtf", "txt", "html",
    "htm", "mht", "xml", "pdf", "djvu", "fb2", "epub", "xps",
];

const CELL_EXTENSIONS: &[&str] =
    &["xls", "xlsx", "xlsm", "xlt", "xltx", "xltm", "ods", "fods", "ots", "csv"];

const SLIDE_EXTENSIONS: &[&str] = &[
    "pps", "ppsx", "ppsm", "ppt", "pptx", "pptm", "pot", "potx", "potm", "odp", "fodp", "otp",
];

impl DocumentKind {
    /// Classify a file extension. Unknown extensions open as text documents.
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.to_ascii_lowercase();
        if WORD_EXTENSIONS.contains(&ext.as_str()) {
            return Self::Word;
        }
        if CELL_EXTENSIONS.contains(&ext.as_str()) {
            return Self::Cell;
        }
        if SLIDE_EXTENSIONS.contains(&ext.as_str()) {
            return Self::Slide;
        }
        Self::Word
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Word => "word",
            Self::Cell => "cell",
            Self::Slide => "slide",
        }
    }
}

/// File extension as the editor understands it: the text after the final dot,
/// or empty when the name has none.
pub fn file_extension(name: &str) -> &str {
    name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("")
}

/// Everything the editor page needs to boot a document-server session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EditorConfig {
    /// URL of the document server's embeddable editor script.
    pub api_url: String,
    pub file: FileSpec,
    pub editor: EditorSpec,
}

/// The document being opened.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileSpec {
    pub name: String,
    /// Direct-download URL the document server fetches the content from.
    pub uri: String,
    pub ext: String,
}

/// Per-session editor parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EditorSpec {
    pub document_type: DocumentKind,
    /// Session key; co-editors must open the same key to share a session.
    pub key: String,
    /// Where the document server reports session progress.
    pub callback_url: String,
    pub user_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_documents_spreadsheets_and_presentations() {
        assert_eq!(DocumentKind::from_extension("docx"), DocumentKind::Word);
        assert_eq!(DocumentKind::from_extension("odt"), DocumentKind::Word);
        assert_eq!(DocumentKind::from_extension("xlsx"), DocumentKind::Cell);
        assert_eq!(DocumentKind::from_extension("csv"), DocumentKind::Cell);
        assert_eq!(DocumentKind::from_extension("pptx"), DocumentKind::Slide);
        assert_eq!(DocumentKind::from_extension("odp"), DocumentKind::Slide);
    }

    #[test]
    fn unknown_extension_defaults_to_word() {
        assert_eq!(DocumentKind::from_extension("zip"), DocumentKind::Word);
        assert_eq!(DocumentKind::from_extension(""), DocumentKind::Word);
    }

    #[test]
    fn classification_ignores_case() {
        assert_eq!(DocumentKind::from_extension("DOCX"), DocumentKind::Word);
        assert_eq!(DocumentKind::from_extension("Pptx"), DocumentKind::Slide);
    }

    #[test]
    fn extension_is_text_after_final_dot() {
        assert_eq!(file_extension("report.docx"), "docx");
        assert_eq!(file_extension("report.final.docx"), "docx");
        assert_eq!(file_extension("README"), "");
        assert_eq!(file_extension(".gitignore"), "gitignore");
    }

    #[test]
    fn document_kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&DocumentKind::Cell).expect("kind should serialize"),
            r#""cell""#
        );
    }

    #[test]
    fn editor_config_uses_camel_case_wire_names() {
        let config = EditorConfig {
            api_url: "https://docs.example/web-apps/apps/api/documents/api.js".to_string(),
            file: FileSpec {
                name: "report.docx".to_string(),
                uri: "https://files.example/report.docx".to_string(),
                ext: "docx".to_string(),
            },
            editor: EditorSpec {
                document_type: DocumentKind::Word,
                key: "abc123".to_string(),
                callback_url: "https://gateway.example/callback?file=F1&token=t".to_string(),
                user_id: "U1".to_string(),
            },
        };

        let rendered = serde_json::to_string(&config).expect("config should serialize");
        assert!(rendered.contains(r#""apiUrl""#));
        assert!(rendered.contains(r#""documentType":"word""#));
        assert!(rendered.contains(r#""callbackUrl""#));
        assert!(rendered.contains(r#""userId""#));
    }
}
