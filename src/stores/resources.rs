//! Resources store adapter: the educational-resource catalog, keyed by
//! canonical concept name. Upsert is idempotent by URL.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use super::ResourceStore;
use crate::domain::{Resource, ResourceFilter, ResourceKind};
use crate::error::StoreError;
use crate::normalize::ConceptKey;

#[derive(Debug, Serialize)]
struct GetRequest<'a> {
    concept_key: &'a str,
    types: Vec<ResourceKind>,
    difficulty: Option<u8>,
    min_quality: Option<f32>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    resources: Vec<Resource>,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

pub struct HttpResourceStore {
    base_url: String,
    client: reqwest::Client,
    call_timeout: Duration,
}

impl HttpResourceStore {
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
impl ResourceStore for HttpResourceStore {
    async fn get_by_concept_key(
        &self,
        key: &ConceptKey,
        filter: &ResourceFilter,
    ) -> Result<Vec<Resource>, StoreError> {
        let url = format!("{}/resources/search", self.base_url);
        let req = GetRequest {
            concept_key: key.as_str(),
            types: filter.types.iter().copied().collect(),
            difficulty: filter.difficulty,
            min_quality: filter.min_quality,
            limit: filter.limit,
        };
        let send = self.client.post(&url).json(&req).send();
        let response = tokio::time::timeout(self.call_timeout, send)
            .await
            .map_err(|_| StoreError::Timeout(self.call_timeout))?
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Other(format!("resources store {status}: {body}")));
        }

        let resp: GetResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Other(format!("failed to parse resources store response: {e}")))?;
        Ok(resp.resources)
    }

    async fn upsert(&self, resource: Resource) -> Result<(), StoreError> {
        let url = format!("{}/resources/upsert", self.base_url);
        let send = self.client.post(&url).json(&resource).send();
        let response = tokio::time::timeout(self.call_timeout, send)
            .await
            .map_err(|_| StoreError::Timeout(self.call_timeout))?
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Other(format!("resources store {status}: {body}")));
        }
        Ok(())
    }

    async fn count_by_concept_key(&self, key: &ConceptKey) -> Result<u64, StoreError> {
        let url = format!("{}/resources/count?concept_key={}", self.base_url, urlencoding::encode(key.as_str()));
        let send = self.client.get(&url).send();
        let response = tokio::time::timeout(self.call_timeout, send)
            .await
            .map_err(|_| StoreError::Timeout(self.call_timeout))?
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Other(format!("resources store {status}: {body}")));
        }

        let resp: CountResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Other(format!("failed to parse resources store response: {e}")))?;
        Ok(resp.count)
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        matches!(self.client.get(&url).send().await, Ok(r) if r.status().is_success())
    }
}

/// In-memory resources catalog for tests, keyed by URL (identity) and
/// indexed by concept key. Upsert is idempotent: a second call with the
/// same URL replaces, never duplicates.
pub struct MockResourceStore {
    by_url: RwLock<HashMap<String, Resource>>,
}

impl MockResourceStore {
    pub fn new() -> Self {
        Self {
            by_url: RwLock::new(HashMap::new()),
        }
    }

    pub fn seeded(resources: Vec<Resource>) -> Self {
        let mut map = HashMap::new();
        for r in resources {
            map.insert(r.url.clone(), r);
        }
        Self {
            by_url: RwLock::new(map),
        }
    }
}

impl Default for MockResourceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceStore for MockResourceStore {
    async fn get_by_concept_key(
        &self,
        key: &ConceptKey,
        filter: &ResourceFilter,
    ) -> Result<Vec<Resource>, StoreError> {
        let guard = self.by_url.read().unwrap();
        let mut matched: Vec<Resource> = guard
            .values()
            .filter(|r| &r.concept_key == key)
            .filter(|r| filter.types.is_empty() || filter.types.contains(&r.kind))
            .filter(|r| filter.difficulty.map_or(true, |d| r.difficulty == Some(d)))
            .filter(|r| filter.min_quality.map_or(true, |q| r.quality_score >= q))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn upsert(&self, resource: Resource) -> Result<(), StoreError> {
        let mut guard = self.by_url.write().unwrap();
        guard.insert(resource.url.clone(), resource);
        Ok(())
    }

    async fn count_by_concept_key(&self, key: &ConceptKey) -> Result<u64, StoreError> {
        let guard = self.by_url.read().unwrap();
        Ok(guard.values().filter(|r| &r.concept_key == key).count() as u64)
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn resource(url: &str, concept: &str, quality: f32) -> Resource {
        Resource {
            id: url.to_string(),
            concept_key: ConceptKey::new(concept),
            title: "title".to_string(),
            url: url.to_string(),
            kind: ResourceKind::Video,
            source_domain: "example.com".to_string(),
            difficulty: Some(2),
            quality_score: quality,
            timestamp: Utc::now(),
            preview_text: None,
            tags: None,
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent_by_url() {
        let store = MockResourceStore::new();
        store.upsert(resource("https://x.test/a", "derivatives", 0.5)).await.unwrap();
        store.upsert(resource("https://x.test/a", "derivatives", 0.9)).await.unwrap();

        let key = ConceptKey::new("derivatives");
        let results = store.get_by_concept_key(&key, &ResourceFilter::default()).await.unwrap();
        assert_eq!(results.len(), 1, "second upsert must replace, not duplicate");
        assert_eq!(results[0].quality_score, 0.9, "fields reflect the later scrape");
    }

    #[tokio::test]
    async fn count_reflects_concept_scoped_resources() {
        let store = MockResourceStore::new();
        store.upsert(resource("https://x.test/a", "derivatives", 0.5)).await.unwrap();
        store.upsert(resource("https://x.test/b", "derivatives", 0.5)).await.unwrap();
        store.upsert(resource("https://x.test/c", "limits", 0.5)).await.unwrap();

        let count = store.count_by_concept_key(&ConceptKey::new("derivatives")).await.unwrap();
        assert_eq!(count, 2);
    }
}
