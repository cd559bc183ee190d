//! Thin typed facades over the graph, vector, and resources stores,
//! exposing only the operations the orchestrator needs. Each store is
//! reached through a trait so tests can substitute an in-memory mock for
//! the real HTTP-backed adapter.

pub mod graph;
pub mod resources;
pub mod vector;

pub use graph::{HttpGraphStore, MockGraphStore};
pub use resources::{HttpResourceStore, MockResourceStore};
pub use vector::{HttpVectorStore, MockVectorStore};

use async_trait::async_trait;

use crate::domain::{Concept, Resource, ResourceFilter, TextChunk};
use crate::error::StoreError;
use crate::normalize::ConceptKey;

/// Batch name lookup and depth-bounded prerequisite walk over the
/// knowledge graph's `PREREQUISITE_FOR` edges.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Returns only the concepts that were found; unmatched keys are
    /// simply absent from the result (never an error).
    async fn lookup_by_names(&self, keys: &[ConceptKey]) -> Result<Vec<Concept>, StoreError>;

    /// All concepts reachable by walking prerequisite edges backward from
    /// any of `target_ids`, depth-bounded, deduplicated, topologically
    /// ordered where possible.
    async fn prerequisite_path(
        &self,
        target_ids: &[String],
        max_depth: u32,
    ) -> Result<Vec<Concept>, StoreError>;

    async fn health_check(&self) -> bool;
}

/// Dense-vector nearest-neighbor search over the textbook chunk corpus.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Top-k chunks by descending relevance, ties broken by chunk id.
    async fn similarity_search(&self, query_text: &str, k: usize) -> Result<Vec<TextChunk>, StoreError>;

    async fn health_check(&self) -> bool;
}

/// Catalog of scraped educational resources, keyed by canonical concept name.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Most-recent-first within quality tier.
    async fn get_by_concept_key(
        &self,
        key: &ConceptKey,
        filter: &ResourceFilter,
    ) -> Result<Vec<Resource>, StoreError>;

    /// Idempotent by URL.
    async fn upsert(&self, resource: Resource) -> Result<(), StoreError>;

    async fn count_by_concept_key(&self, key: &ConceptKey) -> Result<u64, StoreError>;

    async fn health_check(&self) -> bool;
}
