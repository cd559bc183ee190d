//! LLM facade: concept extraction (batch, retried) and streamed
//! explanation (cancellable, never retried mid-stream).

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::LlmError;

pub type ExplanationStream = BoxStream<'static, Result<String, LlmError>>;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn extract_concepts_once(&self, question: &str) -> Result<Vec<String>, LlmError>;

    fn explain(
        &self,
        question: &str,
        prerequisite_names: &[String],
        context_chunks: &[String],
    ) -> ExplanationStream;

    fn provider_name(&self) -> &str;
    fn model_name(&self) -> &str;
}

/// Retries `extract_concepts_once` on transient failure with exponential
/// backoff, and caps the returned concept count. Streaming explanation is
/// never retried: once a fragment is emitted, retrying would corrupt
/// caller state (duplicated or interleaved partial output).
pub async fn extract_concepts(
    provider: &dyn LlmProvider,
    question: &str,
    max_concepts: usize,
    max_attempts: u32,
) -> Result<Vec<String>, LlmError> {
    let mut attempt = 0;
    let mut delay = Duration::from_millis(100);
    loop {
        attempt += 1;
        match provider.extract_concepts_once(question).await {
            Ok(mut names) => {
                names.retain(|n| !n.trim().is_empty());
                if names.len() > max_concepts {
                    let returned = names.len();
                    names.truncate(max_concepts);
                    tracing::warn!(returned, cap = max_concepts, "truncated concept extraction output");
                }
                return Ok(names);
            }
            Err(LlmError::Transient(msg)) if attempt < max_attempts => {
                tracing::warn!(attempt, %msg, "transient LLM error, retrying");
                let jitter = Duration::from_millis(rand::random::<u64>() % 50);
                tokio::time::sleep(delay + jitter).await;
                delay *= 2;
            }
            Err(LlmError::Transient(msg)) => {
                return Err(LlmError::Permanent(format!(
                    "exhausted {max_attempts} attempts: {msg}"
                )));
            }
            Err(other) => return Err(other),
        }
    }
}

/// True if the text looks truncated: no terminal punctuation, or ends
/// with a known dangling prefix. Logged, never re-invokes the provider.
pub fn looks_truncated(text: &str) -> bool {
    let trimmed = text.trim_end();
    if trimmed.is_empty() {
        return false;
    }
    const DANGLING_PREFIXES: &[&str] = &["and the", "as well as", "in order to", "such as"];
    if DANGLING_PREFIXES.iter().any(|p| trimmed.to_lowercase().ends_with(p)) {
        return true;
    }
    !matches!(trimmed.chars().last(), Some('.') | Some('!') | Some('?') | Some('"') | Some('\''))
}

/// Simple in-process token-bucket limiter pacing concurrent callers
/// against the provider's rate limit.
pub struct RateLimiter {
    permits: Mutex<u32>,
    refill_per_sec: u32,
    last_refill_nanos: AtomicU64,
    start: std::time::Instant,
}

impl RateLimiter {
    pub fn new(requests_per_second: u32) -> Self {
        Self {
            permits: Mutex::new(requests_per_second.max(1)),
            refill_per_sec: requests_per_second.max(1),
            last_refill_nanos: AtomicU64::new(0),
            start: std::time::Instant::now(),
        }
    }

    pub async fn acquire(&self) {
        loop {
            {
                let mut permits = self.permits.lock().await;
                self.maybe_refill(&mut permits);
                if *permits > 0 {
                    *permits -= 1;
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(1000 / self.refill_per_sec as u64)).await;
        }
    }

    fn maybe_refill(&self, permits: &mut u32) {
        let now = self.start.elapsed().as_nanos() as u64;
        let last = self.last_refill_nanos.load(Ordering::Relaxed);
        if now.saturating_sub(last) >= 1_000_000_000 {
            *permits = self.refill_per_sec;
            self.last_refill_nanos.store(now, Ordering::Relaxed);
        }
    }
}

/// HTTP-backed provider calling an OpenAI-compatible chat completions API:
/// a synchronous POST for concept extraction, and a newline-delimited-JSON
/// streaming POST (`stream: true`) for explanations, each line carrying one
/// `{"delta": "..."}` fragment and a final `{"done": true}` sentinel.
pub struct HttpLlmProvider {
    base_url: String,
    model: String,
    client: reqwest::Client,
    max_tokens: u32,
    temperature: f32,
    limiter: Arc<RateLimiter>,
}

#[derive(Debug, Serialize)]
struct ExtractPayload<'a> {
    model: &'a str,
    prompt: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    text: String,
}

#[derive(Debug, Serialize)]
struct ExplainPayload<'a> {
    model: &'a str,
    prompt: String,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct StreamLine {
    #[serde(default)]
    delta: Option<String>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

impl HttpLlmProvider {
    pub fn new(base_url: String, model: String, max_tokens: u32, temperature: f32, requests_per_second: u32) -> Self {
        Self {
            base_url,
            model,
            client: reqwest::Client::new(),
            max_tokens,
            temperature,
            limiter: Arc::new(RateLimiter::new(requests_per_second)),
        }
    }

    fn extraction_prompt(question: &str) -> String {
        format!(
            "List the core math concepts in this question as a comma-separated \
             list, no stop-words, no explanation: {question}"
        )
    }

    fn explanation_prompt(question: &str, prerequisite_names: &[String], context_chunks: &[String]) -> String {
        let mut prompt = String::new();
        if !prerequisite_names.is_empty() {
            prompt.push_str("Prerequisites: ");
            prompt.push_str(&prerequisite_names.join(", "));
            prompt.push('\n');
        }
        if !context_chunks.is_empty() {
            prompt.push_str("Context:\n");
            for chunk in context_chunks {
                prompt.push_str(chunk);
                prompt.push('\n');
            }
        }
        prompt.push_str("Question: ");
        prompt.push_str(question);
        prompt
    }
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
    async fn extract_concepts_once(&self, question: &str) -> Result<Vec<String>, LlmError> {
        self.limiter.acquire().await;
        let url = format!("{}/v1/complete", self.base_url);
        let body = ExtractPayload {
            model: &self.model,
            prompt: Self::extraction_prompt(question),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transient(e.to_string()))?;

        if response.status().is_server_error() {
            return Err(LlmError::Transient(format!("provider {} error", response.status())));
        }
        if !response.status().is_success() {
            return Err(LlmError::Permanent(format!("provider {} error", response.status())));
        }

        let parsed: ExtractResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Permanent(format!("malformed extraction response: {e}")))?;

        Ok(parsed
            .text
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    }

    fn explain(
        &self,
        question: &str,
        prerequisite_names: &[String],
        context_chunks: &[String],
    ) -> ExplanationStream {
        let url = format!("{}/v1/stream", self.base_url);
        let body = ExplainPayload {
            model: &self.model,
            prompt: Self::explanation_prompt(question, prerequisite_names, context_chunks),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream: true,
        };
        let client = self.client.clone();
        let body = serde_json::to_value(&body).unwrap_or_default();

        let byte_stream = async_stream::stream! {
            let response = match client.post(&url).json(&body).send().await {
                Ok(r) => r,
                Err(e) => {
                    yield Err(LlmError::Transient(e.to_string()));
                    return;
                }
            };
            if !response.status().is_success() {
                yield Err(LlmError::Transient(format!("provider {} error", response.status())));
                return;
            }

            let mut byte_stream = response.bytes_stream();
            let mut buf = String::new();
            let mut emitted_any = false;
            while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        if emitted_any {
                            yield Err(LlmError::StreamBroken { fragments_emitted: 0, message: e.to_string() });
                        } else {
                            yield Err(LlmError::Transient(e.to_string()));
                        }
                        return;
                    }
                };
                buf.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(pos) = buf.find('\n') {
                    let line = buf[..pos].trim().to_string();
                    buf.drain(..=pos);
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<StreamLine>(&line) {
                        Ok(parsed) => {
                            if let Some(err) = parsed.error {
                                yield Err(LlmError::StreamBroken { fragments_emitted: 0, message: err });
                                return;
                            }
                            if let Some(delta) = parsed.delta {
                                emitted_any = true;
                                yield Ok(delta);
                            }
                            if parsed.done {
                                return;
                            }
                        }
                        Err(e) => {
                            yield Err(LlmError::StreamBroken { fragments_emitted: 0, message: format!("malformed stream line: {e}") });
                            return;
                        }
                    }
                }
            }
        };

        byte_stream.boxed()
    }

    fn provider_name(&self) -> &str {
        "http"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Deterministic mock provider for tests: extracts concepts by simple
/// keyword matching and streams a canned explanation word-by-word.
pub struct MockLlmProvider {
    pub concepts_by_keyword: Vec<(String, String)>,
    pub explanation_template: String,
    pub extract_calls: std::sync::atomic::AtomicU64,
    pub explain_calls: std::sync::atomic::AtomicU64,
    pub fail_extraction: bool,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            concepts_by_keyword: vec![
                ("derivative".to_string(), "derivatives".to_string()),
                ("limit".to_string(), "limits".to_string()),
                ("chain rule".to_string(), "chain rule".to_string()),
            ],
            explanation_template: "A derivative measures the instantaneous rate of change of a function.".to_string(),
            extract_calls: std::sync::atomic::AtomicU64::new(0),
            explain_calls: std::sync::atomic::AtomicU64::new(0),
            fail_extraction: false,
        }
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ExtractRequest {
    question: String,
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn extract_concepts_once(&self, question: &str) -> Result<Vec<String>, LlmError> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_extraction {
            return Err(LlmError::Permanent("mock configured to fail".to_string()));
        }
        let lowered = question.to_lowercase();
        let mut found: Vec<String> = self
            .concepts_by_keyword
            .iter()
            .filter(|(kw, _)| lowered.contains(kw.as_str()))
            .map(|(_, name)| name.clone())
            .collect();
        if found.is_empty() {
            // Fall back to the most significant noun-ish token, mirroring
            // how a real model would still name *something* for an
            // unrecognized question rather than return nothing.
            if let Some(last_word) = lowered
                .split_whitespace()
                .map(|w| w.trim_matches(|c: char| c.is_ascii_punctuation()))
                .filter(|w| w.len() > 4)
                .last()
            {
                found.push(last_word.to_string());
            }
        }
        found.dedup();
        Ok(found)
    }

    fn explain(
        &self,
        _question: &str,
        _prerequisite_names: &[String],
        _context_chunks: &[String],
    ) -> ExplanationStream {
        self.explain_calls.fetch_add(1, Ordering::SeqCst);
        let words: Vec<String> = self
            .explanation_template
            .split(' ')
            .map(|w| format!("{w} "))
            .collect();
        stream::iter(words.into_iter().map(Ok)).boxed()
    }

    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        "mock-explain-1"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn extract_concepts_caps_at_max_and_dedupes() {
        let provider = MockLlmProvider::new();
        let names = extract_concepts(&provider, "derivatives and limits and chain rule", 2, 3)
            .await
            .unwrap();
        assert_eq!(names.len(), 2, "must cap at max_concepts_per_query");
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        struct FlakyOnce {
            calls: std::sync::atomic::AtomicU32,
        }
        #[async_trait]
        impl LlmProvider for FlakyOnce {
            async fn extract_concepts_once(&self, _q: &str) -> Result<Vec<String>, LlmError> {
                let n = self.calls.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(LlmError::Transient("temporary outage".to_string()))
                } else {
                    Ok(vec!["derivatives".to_string()])
                }
            }
            fn explain(&self, _q: &str, _p: &[String], _c: &[String]) -> ExplanationStream {
                stream::iter(vec![]).boxed()
            }
            fn provider_name(&self) -> &str {
                "flaky"
            }
            fn model_name(&self) -> &str {
                "flaky-1"
            }
        }

        let provider = FlakyOnce {
            calls: std::sync::atomic::AtomicU32::new(0),
        };
        let result = extract_concepts(&provider, "what is a derivative", 20, 3).await.unwrap();
        assert_eq!(result, vec!["derivatives".to_string()]);
    }

    #[test]
    fn truncation_heuristic_flags_missing_punctuation() {
        assert!(looks_truncated("and the derivative represents and the"));
        assert!(looks_truncated("the limit approaches zero"));
        assert!(!looks_truncated("the limit approaches zero."));
    }

    #[tokio::test]
    async fn explanation_stream_is_finite_and_concatenates() {
        let provider = MockLlmProvider::new();
        let mut stream = provider.explain("q", &[], &[]);
        let mut full = String::new();
        while let Some(chunk) = stream.next().await {
            full.push_str(&chunk.unwrap());
        }
        assert!(full.contains("derivative"));
    }
}
