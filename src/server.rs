//! HTTP transport: axum router wiring the orchestrator, the staged-concept
//! store, and the store adapters' health probes onto the wire contract in
//! SPEC_FULL.md §6. Handlers are thin — JSON in, JSON or SSE out — with no
//! business logic beyond status-transition validation, which is delegated
//! to `StagedConcept::try_transition`.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::cache::CacheKey;
use crate::domain::{StagedConcept, StagedStatus};
use crate::normalize::ConceptKey;
use crate::orchestrator::{Orchestrator, SyncAnswer};
use crate::staged::StagedConceptStore;
use crate::stores::{GraphStore, ResourceStore, VectorStore};
use crate::stream;

/// Everything a handler needs, assembled once at the composition root and
/// shared (by `Arc`) across every request.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub staged: Arc<StagedConceptStore>,
    pub graph: Arc<dyn GraphStore>,
    pub vector: Arc<dyn VectorStore>,
    pub resources: Arc<dyn ResourceStore>,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConceptQueryRequest {
    pub concept_name: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// The sync-path response: the union of all event payloads, with sequenced
/// chunks concatenated into one `explanation` string.
#[derive(Debug, Serialize)]
pub struct SyncQueryResponse {
    pub query_id: String,
    pub concepts: Vec<String>,
    pub unknown_concepts: Vec<String>,
    pub prerequisites: Vec<crate::domain::PrerequisiteView>,
    pub context_chunks: Vec<String>,
    pub resources: Vec<crate::domain::ResourceView>,
    pub explanation: String,
    pub processing_time_ms: u64,
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct ConceptQueryResponse {
    #[serde(flatten)]
    pub answer: SyncQueryResponse,
    pub source: &'static str,
    pub cache_age_s: Option<u64>,
}

fn to_sync_response(answer: SyncAnswer) -> SyncQueryResponse {
    SyncQueryResponse {
        query_id: answer.query_id,
        concepts: answer.payload.concepts,
        unknown_concepts: answer.payload.unknown_concepts,
        prerequisites: answer.payload.prerequisites,
        context_chunks: answer.payload.context_chunks,
        resources: answer.payload.resources,
        explanation: answer.payload.explanation,
        processing_time_ms: answer.processing_time_ms,
        success: true,
    }
}

/// `POST /query/stream` — SSE, one message per `StreamEvent`, closed on the
/// terminal `complete`/`error` event.
async fn query_stream_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueryRequest>,
) -> impl axum::response::IntoResponse {
    info!(question = %req.question, "starting streamed query");
    let (rx, _handle) = state
        .orchestrator
        .clone()
        .process_stream(req.question, req.user_id)
        .await;
    stream::into_sse(rx)
}

/// `POST /query` — same pipeline, collected into one JSON object.
async fn query_sync_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<SyncQueryResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.orchestrator.clone().process_sync(req.question, req.user_id).await {
        Ok(answer) => Ok(Json(to_sync_response(answer))),
        Err(e) => {
            error!(error = %e, "sync query failed");
            Err((
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorResponse {
                    error: "query_failed".to_string(),
                    message: e.to_string(),
                }),
            ))
        }
    }
}

/// `POST /concept-query` — cache-first by normalized concept name, falling
/// back to a full run (and populating the cache) on miss.
async fn concept_query_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConceptQueryRequest>,
) -> Result<Json<ConceptQueryResponse>, (StatusCode, Json<ErrorResponse>)> {
    let key = CacheKey(ConceptKey::new(&req.concept_name).as_str().to_string());
    if let Some((payload, age)) = state.orchestrator.cache().get(&key).await {
        if state.orchestrator.cache().is_fresh(age).await {
            return Ok(Json(ConceptQueryResponse {
                answer: SyncQueryResponse {
                    query_id: String::new(),
                    concepts: payload.concepts,
                    unknown_concepts: payload.unknown_concepts,
                    prerequisites: payload.prerequisites,
                    context_chunks: payload.context_chunks,
                    resources: payload.resources,
                    explanation: payload.explanation,
                    processing_time_ms: 0,
                    success: true,
                },
                source: "cache",
                cache_age_s: Some(age.as_secs()),
            }));
        }
    }

    match state
        .orchestrator
        .clone()
        .process_sync(req.concept_name, req.user_id)
        .await
    {
        Ok(answer) => Ok(Json(ConceptQueryResponse {
            answer: to_sync_response(answer),
            source: "processed",
            cache_age_s: None,
        })),
        Err(e) => {
            error!(error = %e, "concept query failed");
            Err((
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorResponse {
                    error: "query_failed".to_string(),
                    message: e.to_string(),
                }),
            ))
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    graph: bool,
    vector: bool,
    resources: bool,
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let (graph, vector, resources) = tokio::join!(
        state.graph.health_check(),
        state.vector.health_check(),
        state.resources.health_check(),
    );
    Json(HealthResponse {
        status: if graph && vector && resources { "healthy" } else { "degraded" },
        graph,
        vector,
        resources,
    })
}

async fn list_staged_handler(State(state): State<Arc<AppState>>) -> Json<Vec<StagedConcept>> {
    Json(state.staged.list())
}

#[derive(Debug, Serialize)]
struct StagedStatsResponse {
    by_status: std::collections::HashMap<String, u64>,
    most_recent_pending: Option<StagedConcept>,
}

async fn staged_stats_handler(State(state): State<Arc<AppState>>) -> Json<StagedStatsResponse> {
    let stats = state.staged.stats();
    let by_status = stats
        .by_status
        .into_iter()
        .map(|(status, count)| (format!("{status:?}").to_lowercase(), count))
        .collect();
    Json(StagedStatsResponse {
        by_status,
        most_recent_pending: stats.most_recent_pending,
    })
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub reviewer_id: String,
    pub review_notes: Option<String>,
    pub approved_concept_id: Option<String>,
}

async fn review_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    to: StagedStatus,
    Json(req): Json<ReviewRequest>,
) -> Result<Json<StagedConcept>, (StatusCode, Json<ErrorResponse>)> {
    let Some(existing) = state.staged.get_by_id(&id) else {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "not_found".to_string(),
                message: format!("no staged concept with id {id}"),
            }),
        ));
    };
    if existing.status.is_terminal() {
        return Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: "illegal_transition".to_string(),
                message: format!("staged concept {id} already reviewed ({:?})", existing.status),
            }),
        ));
    }

    let now = chrono::Utc::now();
    let updated = state
        .staged
        .update(&id, |sc| {
            let _ = sc.try_transition(to, req.reviewer_id.clone(), req.review_notes.clone(), req.approved_concept_id.clone(), now);
        })
        .expect("existence checked above under the same lock-protected store");

    if updated.status != to {
        return Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: "illegal_transition".to_string(),
                message: format!("could not transition {id} to {to:?}"),
            }),
        ));
    }
    Ok(Json(updated))
}

async fn approve_handler(state: State<Arc<AppState>>, path: Path<String>, body: Json<ReviewRequest>) -> Result<Json<StagedConcept>, (StatusCode, Json<ErrorResponse>)> {
    if body.approved_concept_id.is_none() {
        warn!("approving staged concept without an approved_concept_id");
    }
    review_handler(state, path, StagedStatus::Approved, body).await
}

async fn reject_handler(state: State<Arc<AppState>>, path: Path<String>, body: Json<ReviewRequest>) -> Result<Json<StagedConcept>, (StatusCode, Json<ErrorResponse>)> {
    review_handler(state, path, StagedStatus::Rejected, body).await
}

async fn merge_handler(state: State<Arc<AppState>>, path: Path<String>, body: Json<ReviewRequest>) -> Result<Json<StagedConcept>, (StatusCode, Json<ErrorResponse>)> {
    if body.approved_concept_id.is_none() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "missing_field".to_string(),
                message: "merge requires approved_concept_id naming the existing concept".to_string(),
            }),
        ));
    }
    review_handler(state, path, StagedStatus::Merged, body).await
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/query/stream", post(query_stream_handler))
        .route("/query", post(query_sync_handler))
        .route("/concept-query", post(concept_query_handler))
        .route("/admin/staged", get(list_staged_handler))
        .route("/admin/staged/stats", get(staged_stats_handler))
        .route("/admin/staged/{id}/approve", post(approve_handler))
        .route("/admin/staged/{id}/reject", post(reject_handler))
        .route("/admin/staged/{id}/merge", post(merge_handler))
        .with_state(state)
}

pub async fn run_server(state: Arc<AppState>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    info!(%addr, "starting mathrag-orchestrator server");
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
