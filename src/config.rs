//! Process configuration, loaded once at startup and handed to every
//! component as an explicit constructor argument (composition root, no
//! globals).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// All tunables enumerated by the external-interface contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm_provider: String,
    pub llm_model: String,
    pub llm_max_tokens: u32,
    pub llm_temperature: f32,
    pub llm_retry_attempts: u32,
    pub llm_requests_per_second: u32,

    pub per_query_deadline_ms: u64,
    pub per_stage_deadline_graph_ms: u64,
    pub per_stage_deadline_vector_ms: u64,
    pub per_stage_deadline_resources_ms: u64,
    pub per_stage_deadline_llm_extract_ms: u64,
    pub per_stage_deadline_llm_stream_ms: u64,

    pub cache_ttl_s: u64,
    pub cache_max_entries: usize,

    pub enrichment_workers: usize,
    pub enrichment_queue_depth: usize,
    pub enrichment_shutdown_grace_ms: u64,

    pub stream_buffer_depth: usize,
    pub resources_min_count_before_scrape: u32,
    pub max_concepts_per_query: usize,

    pub graph_endpoint: String,
    pub vector_endpoint: String,
    pub resources_endpoint: String,
    pub http_pool_max_idle_per_host: usize,

    pub http_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_provider: "mock".to_string(),
            llm_model: "mock-explain-1".to_string(),
            llm_max_tokens: 1024,
            llm_temperature: 0.2,
            llm_retry_attempts: 3,
            llm_requests_per_second: 5,

            per_query_deadline_ms: 60_000,
            per_stage_deadline_graph_ms: 5_000,
            per_stage_deadline_vector_ms: 8_000,
            per_stage_deadline_resources_ms: 3_000,
            per_stage_deadline_llm_extract_ms: 10_000,
            per_stage_deadline_llm_stream_ms: 45_000,

            cache_ttl_s: 3600,
            cache_max_entries: 10_000,

            enrichment_workers: 4,
            enrichment_queue_depth: 512,
            enrichment_shutdown_grace_ms: 5_000,

            stream_buffer_depth: 64,
            resources_min_count_before_scrape: 3,
            max_concepts_per_query: 20,

            graph_endpoint: "http://127.0.0.1:8091".to_string(),
            vector_endpoint: "http://127.0.0.1:8092".to_string(),
            resources_endpoint: "http://127.0.0.1:8093".to_string(),
            http_pool_max_idle_per_host: 16,

            http_port: 8080,
        }
    }
}

impl Config {
    /// Loads layered configuration: built-in defaults, then an optional
    /// `mathrag.toml` in the current directory, then `MATHRAG_*` environment
    /// variable overrides (double-underscore nested, e.g.
    /// `MATHRAG_PER_QUERY_DEADLINE_MS=30000`).
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?)
            .add_source(config::File::with_name("mathrag").required(false))
            .add_source(config::Environment::with_prefix("MATHRAG").separator("__"));

        builder.build()?.try_deserialize()
    }

    pub fn per_query_deadline(&self) -> Duration {
        Duration::from_millis(self.per_query_deadline_ms)
    }

    pub fn per_stage_deadline_graph(&self) -> Duration {
        Duration::from_millis(self.per_stage_deadline_graph_ms)
    }

    pub fn per_stage_deadline_vector(&self) -> Duration {
        Duration::from_millis(self.per_stage_deadline_vector_ms)
    }

    pub fn per_stage_deadline_resources(&self) -> Duration {
        Duration::from_millis(self.per_stage_deadline_resources_ms)
    }

    pub fn per_stage_deadline_llm_extract(&self) -> Duration {
        Duration::from_millis(self.per_stage_deadline_llm_extract_ms)
    }

    pub fn per_stage_deadline_llm_stream(&self) -> Duration {
        Duration::from_millis(self.per_stage_deadline_llm_stream_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_self_consistent() {
        let cfg = Config::default();
        assert!(cfg.per_query_deadline_ms > cfg.per_stage_deadline_graph_ms);
        assert!(cfg.max_concepts_per_query > 0);
        assert!(cfg.cache_max_entries > 0);
    }
}
