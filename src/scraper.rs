//! The web scraper: out of scope as an implementation (site-specific HTML
//! parsers are a collaborator, not part of this crate), consumed here only
//! as a "fetch resources for concept name" black box that the enrichment
//! scheduler calls on a cache-miss concept. Never invoked from the
//! foreground query path — see `EnrichmentJob::ScrapeResources`.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::domain::{Resource, ResourceKind};

#[async_trait]
pub trait ResourceScraper: Send + Sync {
    async fn fetch_for_concept(&self, concept_name: &str) -> anyhow::Result<Vec<Resource>>;
}

#[derive(Debug, Deserialize)]
struct ScrapedResource {
    title: String,
    url: String,
    kind: ResourceKind,
    source_domain: String,
    quality_score: f32,
    preview_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScrapeResponse {
    resources: Vec<ScrapedResource>,
}

/// HTTP-backed scraper facade: delegates to an external scraping service
/// rather than embedding any site-specific HTML parsing in this crate.
pub struct HttpResourceScraper {
    base_url: String,
    client: reqwest::Client,
    call_timeout: Duration,
}

impl HttpResourceScraper {
    pub fn new(base_url: String, call_timeout: Duration) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
            call_timeout,
        }
    }
}

#[async_trait]
impl ResourceScraper for HttpResourceScraper {
    async fn fetch_for_concept(&self, concept_name: &str) -> anyhow::Result<Vec<Resource>> {
        let url = format!("{}/scrape", self.base_url);
        let send = self.client.post(&url).json(&serde_json::json!({ "concept_name": concept_name })).send();
        let response = tokio::time::timeout(self.call_timeout, send).await??;
        if !response.status().is_success() {
            anyhow::bail!("scraper returned {}", response.status());
        }
        let parsed: ScrapeResponse = response.json().await?;
        let now = chrono::Utc::now();
        Ok(parsed
            .resources
            .into_iter()
            .map(|r| Resource {
                id: r.url.clone(),
                concept_key: crate::normalize::ConceptKey::new(concept_name),
                title: r.title,
                url: r.url,
                kind: r.kind,
                source_domain: r.source_domain,
                difficulty: None,
                quality_score: r.quality_score.clamp(0.0, 1.0),
                timestamp: now,
                preview_text: r.preview_text,
                tags: None,
            })
            .collect())
    }
}

/// Deterministic mock for tests and local development: fabricates a single
/// plausible resource per concept rather than hitting a real site.
pub struct MockResourceScraper;

#[async_trait]
impl ResourceScraper for MockResourceScraper {
    async fn fetch_for_concept(&self, concept_name: &str) -> anyhow::Result<Vec<Resource>> {
        let now = chrono::Utc::now();
        Ok(vec![Resource {
            id: format!("https://example-scraped.test/{}", urlencoding::encode(concept_name)),
            concept_key: crate::normalize::ConceptKey::new(concept_name),
            title: format!("Introduction to {concept_name}"),
            url: format!("https://example-scraped.test/{}", urlencoding::encode(concept_name)),
            kind: ResourceKind::Article,
            source_domain: "example-scraped.test".to_string(),
            difficulty: None,
            quality_score: 0.6,
            timestamp: now,
            preview_text: None,
            tags: None,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_scraper_returns_one_resource_per_concept() {
        let scraper = MockResourceScraper;
        let found = scraper.fetch_for_concept("derivatives").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].concept_key, crate::normalize::ConceptKey::new("derivatives"));
    }
}
