//! The typed, ordered event bus between the orchestrator (producer) and
//! the transport (consumer), plus its SSE wire framing.
//!
//! One channel per query id, single-producer single-consumer, bounded so
//! the producer blocks rather than drops when the consumer is slow —
//! deliberate back-pressure that paces the LLM stream against the
//! client's ability to receive.

use serde::Serialize;
use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::domain::{PrerequisiteView, ResourceView};

/// One payload per wire variant in the SSE framing contract.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StreamEventPayload {
    Start {
        query_id: String,
        question: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    Progress {
        stage: String,
        percentage: u8,
        message: String,
        current_step: u32,
        total_steps: u32,
    },
    Concepts {
        concepts: Vec<String>,
        count: usize,
    },
    Prerequisites {
        prerequisites: Vec<PrerequisiteView>,
        count: usize,
    },
    Context {
        chunks: Vec<String>,
        count: usize,
    },
    Resources {
        resources: Vec<ResourceView>,
        count: usize,
    },
    ExplanationChunk {
        chunk: String,
        total_chars: usize,
    },
    ExplanationComplete {
        full_explanation: String,
        total_length: usize,
    },
    Error {
        error: String,
        message: String,
        code: Option<String>,
    },
    Complete {
        query_id: String,
        processing_time_ms: u64,
        total_concepts: usize,
        total_chunks: usize,
        success: bool,
        cache_hit: bool,
    },
}

impl StreamEventPayload {
    /// The SSE `event:` field — the variant's name.
    pub fn variant_name(&self) -> &'static str {
        match self {
            StreamEventPayload::Start { .. } => "start",
            StreamEventPayload::Progress { .. } => "progress",
            StreamEventPayload::Concepts { .. } => "concepts",
            StreamEventPayload::Prerequisites { .. } => "prerequisites",
            StreamEventPayload::Context { .. } => "context",
            StreamEventPayload::Resources { .. } => "resources",
            StreamEventPayload::ExplanationChunk { .. } => "explanation_chunk",
            StreamEventPayload::ExplanationComplete { .. } => "explanation_complete",
            StreamEventPayload::Error { .. } => "error",
            StreamEventPayload::Complete { .. } => "complete",
        }
    }

    /// Whether this variant is a terminal event: exactly one of these
    /// ends the stream for a query id.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEventPayload::Complete { .. } | StreamEventPayload::Error { .. }
        )
    }
}

/// A payload plus its position in the per-query sequence.
#[derive(Debug, Clone, Serialize)]
pub struct StreamEvent {
    pub query_id: String,
    pub seq: u64,
    #[serde(flatten)]
    pub payload: StreamEventPayload,
}

/// Producer handle. Assigns strictly increasing sequence numbers and
/// blocks (bounded channel) rather than drops when the consumer lags.
pub struct StreamSender {
    query_id: String,
    next_seq: u64,
    tx: mpsc::Sender<StreamEvent>,
    closed: bool,
}

/// Consumer handle, drained by the transport.
pub struct StreamReceiver {
    pub rx: mpsc::Receiver<StreamEvent>,
}

/// Creates a bounded single-producer single-consumer channel for one query id.
pub fn channel(query_id: String, buffer_depth: usize) -> (StreamSender, StreamReceiver) {
    let (tx, rx) = mpsc::channel(buffer_depth.max(1));
    (
        StreamSender {
            query_id,
            next_seq: 1,
            tx,
            closed: false,
        },
        StreamReceiver { rx },
    )
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("stream already closed by a terminal event")]
    AlreadyClosed,
    #[error("receiver dropped")]
    ReceiverGone,
}

impl StreamSender {
    /// Sends the next event in sequence. Returns an error if a terminal
    /// event has already been sent for this query id, or if the consumer
    /// has gone away (client disconnect).
    pub async fn emit(&mut self, payload: StreamEventPayload) -> Result<(), SendError> {
        if self.closed {
            return Err(SendError::AlreadyClosed);
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        let terminal = payload.is_terminal();
        let event = StreamEvent {
            query_id: self.query_id.clone(),
            seq,
            payload,
        };
        self.tx.send(event).await.map_err(|_| SendError::ReceiverGone)?;
        if terminal {
            self.closed = true;
        }
        Ok(())
    }

    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Adapts a `StreamReceiver` into an axum SSE response, per the external
/// wire contract: one SSE message per event, `event:` set to the variant
/// name, `data:` a single-line JSON object, keep-alive pings so idle
/// connections survive intermediary proxies.
pub fn into_sse(
    receiver: StreamReceiver,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let stream = ReceiverStream::new(receiver.rx).map(|event| {
        let variant = event.payload.variant_name();
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(SseEvent::default().event(variant).data(data))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequence_numbers_are_strictly_increasing() {
        let (mut tx, mut rx) = channel("q-1".to_string(), 8);
        tx.emit(StreamEventPayload::Start {
            query_id: "q-1".to_string(),
            question: "what is a derivative?".to_string(),
            timestamp: chrono::Utc::now(),
        })
        .await
        .unwrap();
        tx.emit(StreamEventPayload::Concepts {
            concepts: vec!["derivatives".to_string()],
            count: 1,
        })
        .await
        .unwrap();
        tx.emit(StreamEventPayload::Complete {
            query_id: "q-1".to_string(),
            processing_time_ms: 10,
            total_concepts: 1,
            total_chunks: 0,
            success: true,
            cache_hit: false,
        })
        .await
        .unwrap();

        let first = rx.rx.recv().await.unwrap();
        let second = rx.rx.recv().await.unwrap();
        let third = rx.rx.recv().await.unwrap();
        assert_eq!(first.seq, 1);
        assert_eq!(second.seq, 2);
        assert_eq!(third.seq, 3);
        assert!(third.payload.is_terminal());
    }

    #[tokio::test]
    async fn cannot_emit_after_terminal_event() {
        let (mut tx, _rx) = channel("q-1".to_string(), 8);
        tx.emit(StreamEventPayload::Complete {
            query_id: "q-1".to_string(),
            processing_time_ms: 1,
            total_concepts: 0,
            total_chunks: 0,
            success: true,
            cache_hit: false,
        })
        .await
        .unwrap();

        let err = tx
            .emit(StreamEventPayload::Progress {
                stage: "extract".to_string(),
                percentage: 50,
                message: "late".to_string(),
                current_step: 1,
                total_steps: 2,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::AlreadyClosed));
    }
}
