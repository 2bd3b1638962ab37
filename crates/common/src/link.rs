// Public-permalink to direct-download URL derivation.
//
// A public permalink looks like
// `https://slack-files.com/{team}-{file}-{pub_secret}`. The raw bytes live
// at `https://files.slack.com/files-pri/{team}-{file}/download/{name}`,
// guarded by the same `pub_secret` as a query parameter. The document server
// fetches file content through the derived URL without any further auth.

use thiserror::Error;
use url::Url;

const DOWNLOAD_BASE: &str = "https://files.slack.com/files-pri";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("public permalink `{0}` is not a valid url")]
    InvalidPermalink(String),

    #[error("public permalink slug `{0}` is missing team/file/secret parts")]
    MalformedSlug(String),

    #[error("derived download url for `{0}` is not valid")]
    InvalidDownloadUrl(String),
}

/// Derive the direct-download URL for a publicly shared file.
pub fn download_url(permalink_public: &str, file_name: &str) -> Result<String, LinkError> {
    let permalink = Url::parse(permalink_public)
        .map_err(|_| LinkError::InvalidPermalink(permalink_public.to_string()))?;

    let slug = permalink
        .path_segments()
        .and_then(|segments| segments.rev().find(|segment| !segment.is_empty()))
        .ok_or_else(|| LinkError::MalformedSlug(permalink_public.to_string()))?;

    // {team}-{file}-{pub_secret}; the secret is always the last part.
    let parts: Vec<&str> = slug.split('-').collect();
    if parts.len() < 3 {
        return Err(LinkError::MalformedSlug(slug.to_string()));
    }
    let team = parts[0];
    let file = parts[1];
    let secret = parts[parts.len() - 1];

    let raw = format!("{DOWNLOAD_BASE}/{team}-{file}/download/{file_name}?pub_secret={secret}");
    let url = Url::parse(&raw).map_err(|_| LinkError::InvalidDownloadUrl(file_name.to_string()))?;
    Ok(url.to_string())
}
