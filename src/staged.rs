//! Staged-concepts store: proposed concepts awaiting curator review.
//!
//! The increment race is real: two concurrent queries naming the same
//! unknown concept must not create two records. The store exposes a
//! single atomic upsert-with-increment operation; callers must never
//! read-then-write.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::{StagedConcept, StagedStatus};
use crate::normalize::ConceptKey;

/// Outcome of an upsert, used to decide whether this is the first
/// occurrence (and therefore whether to send an email notification).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Incremented,
}

pub struct StagedConceptStore {
    by_key: Mutex<HashMap<ConceptKey, StagedConcept>>,
}

impl StagedConceptStore {
    pub fn new() -> Self {
        Self {
            by_key: Mutex::new(HashMap::new()),
        }
    }

    /// Atomic upsert-with-increment: if a staged concept with this
    /// normalized name already exists, increments `occurrence_count` and
    /// appends `source_query_id` to `related_query_ids` (if not already
    /// present); otherwise creates a new `Pending` record. Implemented as
    /// a single critical section under one lock so no caller can observe
    /// or act on an intermediate state.
    pub fn upsert_occurrence(
        &self,
        name: &str,
        source_query_id: &str,
        source_query_text: &str,
        now: chrono::DateTime<chrono::Utc>,
        id_factory: impl FnOnce() -> String,
    ) -> UpsertOutcome {
        let key = ConceptKey::new(name);
        let mut guard = self.by_key.lock().unwrap();
        match guard.get_mut(&key) {
            Some(existing) => {
                if !existing.related_query_ids.iter().any(|q| q == source_query_id) {
                    existing.occurrence_count += 1;
                    existing.related_query_ids.push(source_query_id.to_string());
                }
                UpsertOutcome::Incremented
            }
            None => {
                guard.insert(
                    key,
                    StagedConcept {
                        id: id_factory(),
                        concept_name: name.to_string(),
                        source_query_id: source_query_id.to_string(),
                        source_query_text: source_query_text.to_string(),
                        identified_at: now,
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
                        related_query_ids: vec![source_query_id.to_string()],
                    },
                );
                UpsertOutcome::Created
            }
        }
    }

    pub fn get_by_key(&self, name: &str) -> Option<StagedConcept> {
        self.by_key.lock().unwrap().get(&ConceptKey::new(name)).cloned()
    }

    pub fn get_by_id(&self, id: &str) -> Option<StagedConcept> {
        self.by_key.lock().unwrap().values().find(|s| s.id == id).cloned()
    }

    pub fn update<F>(&self, id: &str, f: F) -> Option<StagedConcept>
    where
        F: FnOnce(&mut StagedConcept),
    {
        let mut guard = self.by_key.lock().unwrap();
        let entry = guard.values_mut().find(|s| s.id == id)?;
        f(entry);
        Some(entry.clone())
    }

    pub fn list(&self) -> Vec<StagedConcept> {
        self.by_key.lock().unwrap().values().cloned().collect()
    }

    pub fn stats(&self) -> StagedStats {
        let guard = self.by_key.lock().unwrap();
        let mut by_status: HashMap<StagedStatus, u64> = HashMap::new();
        let mut most_recent_pending: Option<StagedConcept> = None;
        for sc in guard.values() {
            *by_status.entry(sc.status).or_insert(0) += 1;
            if sc.status == StagedStatus::Pending {
                let newer = most_recent_pending
                    .as_ref()
                    .map_or(true, |current| sc.identified_at > current.identified_at);
                if newer {
                    most_recent_pending = Some(sc.clone());
                }
            }
        }
        StagedStats {
            by_status,
            most_recent_pending,
        }
    }
}

impl Default for StagedConceptStore {
    fn default() -> Self {
        Self::new()
    }
}

pub struct StagedStats {
    pub by_status: HashMap<StagedStatus, u64>,
    pub most_recent_pending: Option<StagedConcept>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[test]
    fn first_occurrence_is_created() {
        let store = StagedConceptStore::new();
        let outcome = store.upsert_occurrence(
            "topological data analysis",
            "q1",
            "explain tda",
            Utc::now(),
            || "sc-1".to_string(),
        );
        assert_eq!(outcome, UpsertOutcome::Created);
        let sc = store.get_by_key("topological data analysis").unwrap();
        assert_eq!(sc.occurrence_count, 1);
    }

    #[test]
    fn second_distinct_query_increments_without_duplicating() {
        let store = StagedConceptStore::new();
        store.upsert_occurrence("tda", "q1", "explain tda", Utc::now(), || "sc-1".to_string());
        let outcome = store.upsert_occurrence("tda", "q2", "what is tda", Utc::now(), || "sc-2".to_string());
        assert_eq!(outcome, UpsertOutcome::Incremented);

        let all = store.list();
        assert_eq!(all.len(), 1, "must not duplicate the staged concept record");
        assert_eq!(all[0].occurrence_count, 2);
        assert_eq!(all[0].related_query_ids, vec!["q1".to_string(), "q2".to_string()]);
    }

    #[test]
    fn concurrent_upserts_do_not_double_count() {
        let store = Arc::new(StagedConceptStore::new());
        let id_counter = Arc::new(AtomicU64::new(0));
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                let id_counter = id_counter.clone();
                std::thread::spawn(move || {
                    store.upsert_occurrence(
                        "topological data analysis",
                        &format!("q{i}"),
                        "explain tda",
                        Utc::now(),
                        || {
                            let n = id_counter.fetch_add(1, Ordering::SeqCst);
                            format!("sc-{n}")
                        },
                    );
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let all = store.list();
        assert_eq!(all.len(), 1, "16 concurrent first-sightings must collapse into one record");
        assert_eq!(all[0].occurrence_count, 16);
    }
}
