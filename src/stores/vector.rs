//! Vector store adapter: dense-embedding similarity search over the
//! textbook chunk corpus. Embedding of the query text is an internal
//! concern of the backing service; this adapter only sends text and gets
//! back ranked chunks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::VectorStore;
use crate::domain::TextChunk;
use crate::error::StoreError;

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    k: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    chunks: Vec<TextChunk>,
}

pub struct HttpVectorStore {
    base_url: String,
    client: reqwest::Client,
    call_timeout: Duration,
}

impl HttpVectorStore {
    pub fn new(base_url: String, call_timeout: Duration, pool_max_idle_per_host: usize) -> Self {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(pool_max_idle_per_host)
            .build()
            .expect("reqwest client builder should never fail with static config");
        Self {
            base_url,
            client,
            call_timeout,
        }
    }
}

#[async_trait]
impl VectorStore for HttpVectorStore {
    async fn similarity_search(&self, query_text: &str, k: usize) -> Result<Vec<TextChunk>, StoreError> {
        if query_text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/search", self.base_url);
        let send = self
            .client
            .post(&url)
            .json(&SearchRequest { query: query_text, k })
            .send();

        let response = tokio::time::timeout(self.call_timeout, send)
            .await
            .map_err(|_| StoreError::Timeout(self.call_timeout))?
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Other(format!("vector store {status}: {body}")));
        }

        let mut parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Other(format!("failed to parse vector store response: {e}")))?;

        // Contract: descending relevance already holds from the backing
        // service, but tie-break deterministically by chunk id so repeated
        // queries are stable for cache replay.
        parsed.chunks.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(parsed.chunks)
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        matches!(self.client.get(&url).send().await, Ok(r) if r.status().is_success())
    }
}

/// In-memory vector store for tests: returns a fixed corpus slice.
pub struct MockVectorStore {
    chunks: Vec<TextChunk>,
}

impl MockVectorStore {
    pub fn new(chunks: Vec<TextChunk>) -> Self {
        Self { chunks }
    }

    pub fn empty() -> Self {
        Self { chunks: Vec::new() }
    }
}

#[async_trait]
impl VectorStore for MockVectorStore {
    async fn similarity_search(&self, _query_text: &str, k: usize) -> Result<Vec<TextChunk>, StoreError> {
        Ok(self.chunks.iter().take(k).cloned().collect())
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_query_returns_no_chunks_without_calling_out() {
        let store = MockVectorStore::empty();
        let chunks = store.similarity_search("", 5).await.unwrap();
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn respects_k() {
        let chunks: Vec<TextChunk> = (0..10)
            .map(|i| TextChunk {
                id: format!("c{i}"),
                text: "text".to_string(),
                source_document: "doc".to_string(),
                embedding: vec![0.0],
            })
            .collect();
        let store = MockVectorStore::new(chunks);
        let result = store.similarity_search("derivative", 3).await.unwrap();
        assert_eq!(result.len(), 3);
    }
}
