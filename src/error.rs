//! Typed error taxonomy. Each module owns a focused enum; the orchestrator
//! composes them into `anyhow::Error` at the point where a failure is
//! logged or turned into a wire response.

use thiserror::Error;

/// Uniform error surface exposed by all three store adapters.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("store returned an unexpected response: {0}")]
    Other(String),
}

impl StoreError {
    pub fn is_degradable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }
}

/// Errors from the LLM facade.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Transient provider failure; the facade retries internally up to
    /// `Config.llm_retry_attempts` before surfacing `Permanent`.
    #[error("LLM provider transient error: {0}")]
    Transient(String),

    /// Retries exhausted (non-streaming) or the facade gave up.
    #[error("LLM provider permanent error: {0}")]
    Permanent(String),

    /// Mid-stream failure after at least one fragment was emitted. Never
    /// retried — retrying would corrupt caller state.
    #[error("LLM stream broken after {fragments_emitted} fragments: {message}")]
    StreamBroken {
        fragments_emitted: usize,
        message: String,
    },

    /// The caller asked for more concepts than `Config.max_concepts_per_query`
    /// allows; the facade truncates rather than erroring, but surfaces this
    /// for logging.
    #[error("LLM returned {returned} concepts, truncated to {cap}")]
    ConceptCountExceeded { returned: usize, cap: usize },
}

/// Errors from the response cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache computation failed: {0}")]
    ComputeFailed(String),
}

/// Top-level orchestrator failures that fail a query outright.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("question must not be empty")]
    EmptyQuestion,

    #[error("LLM concept extraction failed: {0}")]
    ExtractionFailed(#[from] LlmError),

    #[error("client disconnected before the query completed")]
    ClientDisconnect,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
