//! Core domain types shared across the orchestrator and its adapters.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::normalize::ConceptKey;

/// A curriculum concept with a stable id and a position in the prerequisite graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concept {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub difficulty: u8,
    pub prerequisite_ids: Vec<String>,
}

/// Status of a proposed concept awaiting curator review.
///
/// Transitions are monotone: `Pending` may move to any other variant,
/// but non-pending states never revert to `Pending` and never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagedStatus {
    Pending,
    Approved,
    Rejected,
    Merged,
}

impl StagedStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, StagedStatus::Pending)
    }
}

/// A concept proposed by the LLM but not yet curator-approved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedConcept {
    pub id: String,
    pub concept_name: String,
    pub source_query_id: String,
    pub source_query_text: String,
    pub identified_at: chrono::DateTime<chrono::Utc>,
    pub suggested_prerequisites: Vec<String>,
    pub suggested_difficulty: Option<u8>,
    pub suggested_category: Option<String>,
    pub llm_reasoning: Option<String>,
    pub status: StagedStatus,
    pub reviewer_id: Option<String>,
    pub review_notes: Option<String>,
    pub reviewed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub approved_concept_id: Option<String>,
    pub occurrence_count: u32,
    pub related_query_ids: Vec<String>,
}

/// Error raised when an illegal status transition is attempted.
#[derive(Debug, thiserror::Error)]
#[error("illegal staged concept transition: {from:?} -> {to:?}")]
pub struct IllegalTransition {
    pub from: StagedStatus,
    pub to: StagedStatus,
}

impl StagedConcept {
    /// Applies a status transition, enforcing monotonicity: once a concept
    /// leaves `Pending` its status and reviewer are fixed forever.
    pub fn try_transition(
        &mut self,
        to: StagedStatus,
        reviewer_id: String,
        review_notes: Option<String>,
        approved_concept_id: Option<String>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), IllegalTransition> {
        if self.status.is_terminal() {
            return Err(IllegalTransition {
                from: self.status,
                to,
            });
        }
        if to == StagedStatus::Pending {
            return Err(IllegalTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.reviewer_id = Some(reviewer_id);
        self.review_notes = review_notes;
        self.reviewed_at = Some(now);
        if matches!(to, StagedStatus::Approved | StagedStatus::Merged) {
            self.approved_concept_id = approved_concept_id;
        }
        Ok(())
    }
}

/// A textbook passage with a dense embedding, read-only in the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextChunk {
    pub id: String,
    pub text: String,
    pub source_document: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Video,
    Article,
    Tutorial,
    Doc,
}

/// An educational artifact for one concept. Identity is its URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub concept_key: ConceptKey,
    pub title: String,
    pub url: String,
    pub kind: ResourceKind,
    pub source_domain: String,
    pub difficulty: Option<u8>,
    pub quality_score: f32,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub preview_text: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Filter applied when reading resources for a concept.
#[derive(Debug, Clone, Default)]
pub struct ResourceFilter {
    pub types: HashSet<ResourceKind>,
    pub difficulty: Option<u8>,
    pub min_quality: Option<f32>,
    pub limit: Option<usize>,
}

/// One record per completed query, append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRecord {
    pub query_id: String,
    pub question_text: String,
    pub identified_concepts: Vec<String>,
    pub prerequisite_path: Vec<String>,
    pub retrieved_context: Vec<String>,
    pub explanation: String,
    pub response_time_ms: u64,
    pub success: bool,
    pub error_message: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub llm_provider: String,
    pub llm_model: String,
    pub graph_hits: u32,
    pub vector_hits: u32,
    pub resource_hits: u32,
}

/// The structured payload a completed or cached answer is built from.
///
/// Must be replaced atomically in the cache: readers never observe a
/// torn mix of old and new fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerPayload {
    pub concepts: Vec<String>,
    pub unknown_concepts: Vec<String>,
    pub prerequisites: Vec<PrerequisiteView>,
    pub context_chunks: Vec<String>,
    pub resources: Vec<ResourceView>,
    pub explanation: String,
    pub degraded_stages: Vec<String>,
    pub partial: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrerequisiteView {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceView {
    pub title: String,
    pub url: String,
    pub kind: ResourceKind,
    pub description: Option<String>,
}

/// Entry stored by the response cache, keyed by normalized name or question.
#[derive(Debug, Clone)]
pub struct CachedAnswer {
    pub payload: AnswerPayload,
    pub created_at: std::time::Instant,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample() -> StagedConcept {
        StagedConcept {
            id: "sc-1".into(),
            concept_name: "topological data analysis".into(),
            source_query_id: "q-1".into(),
            source_query_text: "explain topological data analysis".into(),
            identified_at: Utc::now(),
            suggested_prerequisites: vec![],
            suggested_difficulty: None,
            suggested_category: None,
            llm_reasoning: None,
            status: StagedStatus::Pending,
            reviewer_id: None,
            review_notes: None,
            reviewed_at: None,
            approved_concept_id: None,
            occurrence_count: 1,
            related_query_ids: vec!["q-1".into()],
        }
    }

    #[test]
    fn pending_can_transition_to_approved() {
        let mut sc = sample();
        sc.try_transition(
            StagedStatus::Approved,
            "curator-1".into(),
            None,
            Some("concept-42".into()),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(sc.status, StagedStatus::Approved);
        assert_eq!(sc.approved_concept_id.as_deref(), Some("concept-42"));
        assert!(sc.reviewed_at.is_some());
    }

    #[test]
    fn terminal_status_cannot_transition_again() {
        let mut sc = sample();
        sc.try_transition(StagedStatus::Rejected, "curator-1".into(), None, None, Utc::now())
            .unwrap();
        let err = sc
            .try_transition(StagedStatus::Approved, "curator-2".into(), None, None, Utc::now())
            .unwrap_err();
        assert_eq!(err.from, StagedStatus::Rejected);
    }

    #[test]
    fn cannot_transition_back_to_pending() {
        let mut sc = sample();
        let err = sc
            .try_transition(StagedStatus::Pending, "curator-1".into(), None, None, Utc::now())
            .unwrap_err();
        assert_eq!(err.from, StagedStatus::Pending);
        assert_eq!(err.to, StagedStatus::Pending);
    }
}
