//! mathrag-orchestrator server binary — composition root.
//!
//! Wires every adapter, the LLM facade, the cache, the enrichment
//! scheduler, and the orchestrator together explicitly at process start;
//! no globals or singletons. Pass `--use-real` to back the three stores
//! and the LLM by their HTTP adapters (endpoints from `Config`); otherwise
//! runs entirely against deterministic in-memory mocks, useful for local
//! development and smoke-testing the wire protocol.

use std::sync::Arc;

use mathrag_orchestrator::analytics::InMemoryAnalyticsSink;
use mathrag_orchestrator::enrichment::{DefaultEnrichmentHandlers, EnrichmentScheduler};
use mathrag_orchestrator::llm::{HttpLlmProvider, LlmProvider, MockLlmProvider};
use mathrag_orchestrator::notify::LoggingNotifier;
use mathrag_orchestrator::scraper::{HttpResourceScraper, MockResourceScraper, ResourceScraper};
use mathrag_orchestrator::server::{self, AppState};
use mathrag_orchestrator::staged::StagedConceptStore;
use mathrag_orchestrator::stores::{
    GraphStore, HttpGraphStore, HttpResourceStore, HttpVectorStore, MockGraphStore, MockResourceStore,
    MockVectorStore, ResourceStore, VectorStore,
};
use mathrag_orchestrator::{Config, Orchestrator, ResponseCache};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::load()?;
    let use_real = std::env::args().any(|arg| arg == "--use-real");

    tracing::info!(use_real, port = config.http_port, "starting mathrag-orchestrator");

    let graph: Arc<dyn GraphStore> = if use_real {
        Arc::new(HttpGraphStore::new(
            config.graph_endpoint.clone(),
            config.per_stage_deadline_graph(),
            config.http_pool_max_idle_per_host,
        ))
    } else {
        Arc::new(MockGraphStore::new(vec![]))
    };

    let vector: Arc<dyn VectorStore> = if use_real {
        Arc::new(HttpVectorStore::new(
            config.vector_endpoint.clone(),
            config.per_stage_deadline_vector(),
            config.http_pool_max_idle_per_host,
        ))
    } else {
        Arc::new(MockVectorStore::empty())
    };

    let resources: Arc<dyn ResourceStore> = if use_real {
        Arc::new(HttpResourceStore::new(
            config.resources_endpoint.clone(),
            config.per_stage_deadline_resources(),
            config.http_pool_max_idle_per_host,
        ))
    } else {
        Arc::new(MockResourceStore::new())
    };

    let llm: Arc<dyn LlmProvider> = if use_real && config.llm_provider != "mock" {
        Arc::new(HttpLlmProvider::new(
            config.llm_provider.clone(),
            config.llm_model.clone(),
            config.llm_max_tokens,
            config.llm_temperature,
            config.llm_requests_per_second,
        ))
    } else {
        Arc::new(MockLlmProvider::new())
    };

    let scraper: Arc<dyn ResourceScraper> = if use_real {
        Arc::new(HttpResourceScraper::new(
            config.resources_endpoint.clone(),
            config.per_stage_deadline_resources(),
        ))
    } else {
        Arc::new(MockResourceScraper)
    };

    let cache = Arc::new(ResponseCache::new(config.cache_max_entries, config.cache_ttl()));
    let analytics = Arc::new(InMemoryAnalyticsSink::new());
    let staged = Arc::new(StagedConceptStore::new());
    let notifier = Arc::new(LoggingNotifier);

    let handlers = Arc::new(DefaultEnrichmentHandlers::new(
        resources.clone(),
        scraper,
        staged.clone(),
        notifier,
    ));
    let enrichment = EnrichmentScheduler::spawn(
        handlers.clone(),
        config.enrichment_workers,
        config.enrichment_queue_depth,
        3,
    );

    let orchestrator = Arc::new(Orchestrator::new(
        graph.clone(),
        vector.clone(),
        resources.clone(),
        llm,
        cache,
        analytics,
        enrichment,
        config.clone(),
    ));
    handlers.bind_orchestrator(orchestrator.clone());

    let state = Arc::new(AppState {
        orchestrator,
        staged,
        graph,
        vector,
        resources,
    });

    server::run_server(state, config.http_port).await
}
