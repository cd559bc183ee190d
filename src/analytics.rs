//! Analytics sink: append-only record of completed queries. Best-effort —
//! the orchestrator never blocks or fails on a write here.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::domain::QueryRecord;

#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn record(&self, rec: QueryRecord);
}

/// In-memory append-only sink with a small read surface for dashboards.
/// Outside the hot path: reads take a shared lock and scan, which is fine
/// at dashboard query rates but would need a real store at scale.
pub struct InMemoryAnalyticsSink {
    records: RwLock<Vec<(Instant, QueryRecord)>>,
}

impl InMemoryAnalyticsSink {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }

    pub fn count_total(&self) -> usize {
        self.records.read().unwrap().len()
    }

    /// Snapshot of every record so far, oldest first. Mainly useful for
    /// tests and ad hoc inspection; dashboards should prefer the windowed
    /// aggregates below rather than scanning the full history themselves.
    pub fn all(&self) -> Vec<QueryRecord> {
        self.records.read().unwrap().iter().map(|(_, r)| r.clone()).collect()
    }

    pub fn success_rate(&self, window: Duration) -> f32 {
        let guard = self.records.read().unwrap();
        let in_window: Vec<_> = guard
            .iter()
            .filter(|(t, _)| t.elapsed() <= window)
            .collect();
        if in_window.is_empty() {
            return 0.0;
        }
        let successes = in_window.iter().filter(|(_, r)| r.success).count();
        successes as f32 / in_window.len() as f32
    }

    pub fn top_concepts(&self, window: Duration, limit: usize) -> Vec<(String, u64)> {
        let guard = self.records.read().unwrap();
        let mut counts: HashMap<String, u64> = HashMap::new();
        for (t, rec) in guard.iter() {
            if t.elapsed() > window {
                continue;
            }
            for concept in &rec.identified_concepts {
                *counts.entry(concept.clone()).or_insert(0) += 1;
            }
        }
        let mut ranked: Vec<(String, u64)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(limit);
        ranked
    }
}

impl Default for InMemoryAnalyticsSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnalyticsSink for InMemoryAnalyticsSink {
    async fn record(&self, rec: QueryRecord) {
        self.records.write().unwrap().push((Instant::now(), rec));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(success: bool, concepts: &[&str]) -> QueryRecord {
        QueryRecord {
            query_id: "q1".to_string(),
            question_text: "what is a derivative?".to_string(),
            identified_concepts: concepts.iter().map(|s| s.to_string()).collect(),
            prerequisite_path: vec![],
            retrieved_context: vec![],
            explanation: "x".to_string(),
            response_time_ms: 10,
            success,
            error_message: None,
            timestamp: Utc::now(),
            llm_provider: "mock".to_string(),
            llm_model: "mock-1".to_string(),
            graph_hits: 0,
            vector_hits: 0,
            resource_hits: 0,
        }
    }

    #[tokio::test]
    async fn records_accumulate_and_report_success_rate() {
        let sink = InMemoryAnalyticsSink::new();
        sink.record(record(true, &["derivatives"])).await;
        sink.record(record(false, &["limits"])).await;
        assert_eq!(sink.count_total(), 2);
        assert_eq!(sink.success_rate(Duration::from_secs(60)), 0.5);
    }

    #[tokio::test]
    async fn top_concepts_ranks_by_frequency() {
        let sink = InMemoryAnalyticsSink::new();
        sink.record(record(true, &["derivatives"])).await;
        sink.record(record(true, &["derivatives"])).await;
        sink.record(record(true, &["limits"])).await;
        sink.record(record(true, &["limits"])).await;
        sink.record(record(true, &["derivatives"])).await;
        let top = sink.top_concepts(Duration::from_secs(60), 2);
        assert_eq!(top[0].0, "derivatives");
        assert_eq!(top[0].1, 3);
    }
}
