//! Graph store adapter: batch concept lookup and prerequisite-path walk
//! over a knowledge graph exposing `Concept` nodes and `PREREQUISITE_FOR`
//! edges.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use super::GraphStore;
use crate::domain::Concept;
use crate::error::StoreError;
use crate::normalize::ConceptKey;

#[derive(Debug, Serialize)]
struct LookupRequest<'a> {
    names: &'a [String],
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    concepts: Vec<Concept>,
}

#[derive(Debug, Serialize)]
struct PathRequest<'a> {
    target_ids: &'a [String],
    max_depth: u32,
}

#[derive(Debug, Deserialize)]
struct PathResponse {
    concepts: Vec<Concept>,
}

/// HTTP-backed graph adapter with a shared, reused connection pool.
pub struct HttpGraphStore {
    base_url: String,
    client: reqwest::Client,
    call_timeout: Duration,
}

impl HttpGraphStore {
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

    async fn call<Req: Serialize + ?Sized, Resp: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp, StoreError> {
        let url = format!("{}{}", self.base_url, path);
        let send = self.client.post(&url).json(body).send();

        let response = tokio::time::timeout(self.call_timeout, send)
            .await
            .map_err(|_| StoreError::Timeout(self.call_timeout))?
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Other(format!("graph store {status}: {body}")));
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| StoreError::Other(format!("failed to parse graph store response: {e}")))
    }
}

#[async_trait]
impl GraphStore for HttpGraphStore {
    async fn lookup_by_names(&self, keys: &[ConceptKey]) -> Result<Vec<Concept>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let names: Vec<String> = keys.iter().map(|k| k.as_str().to_string()).collect();
        let resp: LookupResponse = self.call("/concepts/lookup", &LookupRequest { names: &names }).await?;
        Ok(resp.concepts)
    }

    async fn prerequisite_path(
        &self,
        target_ids: &[String],
        max_depth: u32,
    ) -> Result<Vec<Concept>, StoreError> {
        if target_ids.is_empty() {
            return Ok(Vec::new());
        }
        let resp: PathResponse = self
            .call(
                "/concepts/prerequisite-path",
                &PathRequest {
                    target_ids,
                    max_depth,
                },
            )
            .await?;
        Ok(resp.concepts)
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        matches!(self.client.get(&url).send().await, Ok(r) if r.status().is_success())
    }
}

/// In-memory graph for tests: a fixed concept set plus adjacency.
pub struct MockGraphStore {
    by_name: HashMap<String, Concept>,
    by_id: HashMap<String, Concept>,
}

impl MockGraphStore {
    pub fn new(concepts: Vec<Concept>) -> Self {
        let mut by_name = HashMap::new();
        let mut by_id = HashMap::new();
        for c in concepts {
            by_name.insert(crate::normalize::normalize(&c.name), c.clone());
            by_id.insert(c.id.clone(), c);
        }
        Self { by_name, by_id }
    }
}

#[async_trait]
impl GraphStore for MockGraphStore {
    async fn lookup_by_names(&self, keys: &[ConceptKey]) -> Result<Vec<Concept>, StoreError> {
        Ok(keys
            .iter()
            .filter_map(|k| self.by_name.get(k.as_str()).cloned())
            .collect())
    }

    async fn prerequisite_path(
        &self,
        target_ids: &[String],
        max_depth: u32,
    ) -> Result<Vec<Concept>, StoreError> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut ordered: Vec<Concept> = Vec::new();
        let mut frontier: Vec<(String, u32)> = target_ids.iter().map(|id| (id.clone(), 0)).collect();

        while let Some((id, depth)) = frontier.pop() {
            if depth > max_depth || !seen.insert(id.clone()) {
                continue;
            }
            if let Some(concept) = self.by_id.get(&id) {
                for prereq_id in &concept.prerequisite_ids {
                    frontier.push((prereq_id.clone(), depth + 1));
                }
                if depth > 0 {
                    ordered.push(concept.clone());
                }
            }
        }
        ordered.reverse();
        Ok(ordered)
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concept(id: &str, name: &str, prereqs: &[&str]) -> Concept {
        Concept {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            difficulty: 1,
            prerequisite_ids: prereqs.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn lookup_returns_only_found_names() {
        let store = MockGraphStore::new(vec![concept("c1", "derivatives", &[])]);
        let keys = vec![ConceptKey::new("derivatives"), ConceptKey::new("nonexistent thing")];
        let found = store.lookup_by_names(&keys).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "c1");
    }

    #[tokio::test]
    async fn prerequisite_path_walks_backward_and_dedupes() {
        let store = MockGraphStore::new(vec![
            concept("limits", "limits", &[]),
            concept("derivatives", "derivatives", &["limits"]),
            concept("chain-rule", "chain rule", &["derivatives", "limits"]),
        ]);
        let path = store
            .prerequisite_path(&["chain-rule".to_string()], 5)
            .await
            .unwrap();
        let ids: HashSet<_> = path.iter().map(|c| c.id.as_str()).collect();
        assert!(ids.contains("limits"));
        assert!(ids.contains("derivatives"));
        assert_eq!(path.len(), 2, "limits should only appear once despite two paths to it");
    }

    #[tokio::test]
    async fn depth_bound_stops_the_walk() {
        let store = MockGraphStore::new(vec![
            concept("a", "a", &[]),
            concept("b", "b", &["a"]),
            concept("c", "c", &["b"]),
        ]);
        let path = store.prerequisite_path(&["c".to_string()], 1).await.unwrap();
        let ids: HashSet<_> = path.iter().map(|c| c.id.as_str()).collect();
        assert!(ids.contains("b"));
        assert!(!ids.contains("a"), "a is two hops away and should be excluded at max_depth=1");
    }
}
