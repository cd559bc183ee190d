//! Email notification: out of scope as a templating/delivery system (see
//! spec Non-goals), consumed here only as a "notify someone a new concept
//! was staged" black box, invoked at most once per staged concept — on
//! first occurrence only. Subsequent occurrences of the same concept must
//! never re-notify.

use async_trait::async_trait;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_new_staged_concept(&self, concept_name: &str, source_query_text: &str) -> anyhow::Result<()>;
}

/// Logs instead of sending; the default until a real mail transport is
/// wired in by the deployment.
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify_new_staged_concept(&self, concept_name: &str, source_query_text: &str) -> anyhow::Result<()> {
        tracing::info!(concept_name, source_query_text, "new staged concept awaiting curator review");
        Ok(())
    }
}

/// Counts invocations instead of sending anything. Not behind `#[cfg(test)]`
/// because integration tests in `tests/` exercise it as an external crate,
/// where `cfg(test)` items of this library are not visible.
#[derive(Default)]
pub struct CountingNotifier {
    pub notify_count: std::sync::atomic::AtomicU64,
}

#[async_trait]
impl Notifier for CountingNotifier {
    async fn notify_new_staged_concept(&self, _concept_name: &str, _source_query_text: &str) -> anyhow::Result<()> {
        self.notify_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}
