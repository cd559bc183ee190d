//! mathrag-orchestrator — the query orchestrator for a student-facing
//! math RAG pipeline.
//!
//! Given a free-text question, identifies mathematical concepts, fans out
//! to a knowledge graph, a vector-indexed chunk corpus, and a resources
//! catalog, streams an LLM explanation token-by-token, persists the
//! session for analytics, and schedules background enrichment (resource
//! scraping, staging of unknown concepts for curator review).

pub mod analytics;
pub mod cache;
pub mod config;
pub mod domain;
pub mod enrichment;
pub mod error;
pub mod llm;
pub mod normalize;
pub mod notify;
pub mod orchestrator;
pub mod scraper;
pub mod server;
pub mod staged;
pub mod stores;
pub mod stream;

pub use cache::{CacheKey, ResponseCache};
pub use config::Config;
pub use domain::*;
pub use normalize::{normalize, ConceptKey};
pub use orchestrator::{Orchestrator, SyncAnswer};
pub use staged::StagedConceptStore;
