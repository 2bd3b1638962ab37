// Edited-document retrieval.
//
// After a save callback the document server exposes the edited file at a
// short-lived URL; the gateway downloads it there and pushes it back into
// the conversation.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::RwLock;

/// Fetches edited documents from the document server.
#[derive(Clone)]
pub enum DocumentFetcher {
    Http(reqwest::Client),
    Memory(MemoryDocumentFetcher),
}

impl DocumentFetcher {
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        match self {
            Self::Http(client) => {
                let response = client
                    .get(url)
                    .send()
                    .await
                    .with_context(|| format!("document fetch from `{url}` failed"))?
                    .error_for_status()
                    .with_context(|| format!("document fetch from `{url}` was refused"))?;
                let bytes = response
                    .bytes()
                    .await
                    .with_context(|| format!("document body read from `{url}` failed"))?;
                Ok(bytes.to_vec())
            }
            Self::Memory(memory) => memory.fetch(url).await,
        }
    }
}

/// In-memory fetcher for tests.
#[derive(Clone, Default)]
pub struct MemoryDocumentFetcher {
    documents: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryDocumentFetcher {
    pub async fn insert(&self, url: impl Into<String>, content: Vec<u8>) {
        self.documents.write().await.insert(url.into(), content);
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.documents
            .read()
            .await
            .get(url)
            .cloned()
            .with_context(|| format!("no document at `{url}`"))
    }
}
