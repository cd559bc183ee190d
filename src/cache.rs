//! Response cache: a keyed, time-aware store of completed answers with
//! single-flight deduplication so concurrent identical requests coalesce
//! into one downstream computation.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, Mutex, RwLock};

use crate::domain::{AnswerPayload, CachedAnswer};
use crate::error::CacheError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(pub String);

struct Inner {
    entries: HashMap<CacheKey, CachedAnswer>,
    insertion_order: VecDeque<CacheKey>,
}

pub struct ResponseCache {
    inner: RwLock<Inner>,
    max_entries: usize,
    ttl: Duration,
    in_flight: Mutex<HashMap<CacheKey, broadcast::Sender<()>>>,
}

impl ResponseCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                insertion_order: VecDeque::new(),
            }),
            max_entries: max_entries.max(1),
            ttl,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached payload and its age, if present, regardless of
    /// freshness. Callers decide whether a stale entry still qualifies as
    /// "fresh enough" or should be replayed while a refresh is scheduled.
    pub async fn get(&self, key: &CacheKey) -> Option<(AnswerPayload, Duration)> {
        let guard = self.inner.read().await;
        guard.entries.get(key).map(|e| (e.payload.clone(), e.created_at.elapsed()))
    }

    pub async fn is_fresh(&self, age: Duration) -> bool {
        age <= self.ttl
    }

    /// Whole-entry replace: readers never observe a torn value, because
    /// the map entry is swapped atomically under the write lock.
    pub async fn put(&self, key: CacheKey, payload: AnswerPayload) {
        let mut guard = self.inner.write().await;
        let is_new = !guard.entries.contains_key(&key);
        guard.entries.insert(
            key.clone(),
            CachedAnswer {
                payload,
                created_at: Instant::now(),
            },
        );
        if is_new {
            guard.insertion_order.push_back(key);
            if guard.insertion_order.len() > self.max_entries {
                if let Some(oldest) = guard.insertion_order.pop_front() {
                    guard.entries.remove(&oldest);
                }
            }
        }
    }

    /// Single-flight entry point: concurrent callers with the same key
    /// result in exactly one invocation of `compute`; later callers await
    /// the first's completion and then read the freshly-written entry.
    pub async fn get_or_compute<F, Fut>(&self, key: CacheKey, compute: F) -> Result<AnswerPayload, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AnswerPayload, CacheError>>,
    {
        if let Some((payload, age)) = self.get(&key).await {
            if self.is_fresh(age).await {
                return Ok(payload);
            }
        }

        let mut rx_existing = None;
        {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(tx) = in_flight.get(&key) {
                rx_existing = Some(tx.subscribe());
            } else {
                let (tx, _rx) = broadcast::channel(1);
                in_flight.insert(key.clone(), tx);
            }
        }

        if let Some(mut rx) = rx_existing {
            let _ = rx.recv().await;
            if let Some((payload, _age)) = self.get(&key).await {
                return Ok(payload);
            }
            return Err(CacheError::ComputeFailed(
                "leader computation finished without producing an entry".to_string(),
            ));
        }

        let result = compute().await;
        if let Ok(ref payload) = result {
            self.put(key.clone(), payload.clone()).await;
        }

        let mut in_flight = self.in_flight.lock().await;
        if let Some(tx) = in_flight.remove(&key) {
            let _ = tx.send(());
        }

        result
    }
}

pub type SharedResponseCache = Arc<ResponseCache>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn sample_payload(explanation: &str) -> AnswerPayload {
        AnswerPayload {
            concepts: vec!["derivatives".to_string()],
            unknown_concepts: vec![],
            prerequisites: vec![],
            context_chunks: vec![],
            resources: vec![],
            explanation: explanation.to_string(),
            degraded_stages: vec![],
            partial: false,
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let cache = ResponseCache::new(10, Duration::from_secs(60));
        let key = CacheKey("derivatives".to_string());
        cache.put(key.clone(), sample_payload("x")).await;
        let (payload, age) = cache.get(&key).await.unwrap();
        assert_eq!(payload.explanation, "x");
        assert!(age < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn eviction_drops_oldest_entry_over_capacity() {
        let cache = ResponseCache::new(2, Duration::from_secs(60));
        cache.put(CacheKey("a".to_string()), sample_payload("a")).await;
        cache.put(CacheKey("b".to_string()), sample_payload("b")).await;
        cache.put(CacheKey("c".to_string()), sample_payload("c")).await;

        assert!(cache.get(&CacheKey("a".to_string())).await.is_none());
        assert!(cache.get(&CacheKey("b".to_string())).await.is_some());
        assert!(cache.get(&CacheKey("c".to_string())).await.is_some());
    }

    #[tokio::test]
    async fn single_flight_runs_compute_exactly_once_for_concurrent_callers() {
        let cache = Arc::new(ResponseCache::new(10, Duration::from_secs(60)));
        let calls = Arc::new(AtomicU64::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute(CacheKey("derivatives".to_string()), || {
                        let calls = calls.clone();
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok(sample_payload("computed"))
                        }
                    })
                    .await
            }));
        }

        for h in handles {
            let payload = h.await.unwrap().unwrap();
            assert_eq!(payload.explanation, "computed");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1, "exactly one downstream computation");
    }
}
