//! # audit
//!
//! The [`ExecutionLogger`] capability: where terminal execution records go.
//!
//! ```text
//! ExecutionEngine ──record()──▶ FanoutLogger ─┬─▶ TracingLogger   (always)
//!                                             ├─▶ MemoryLogger    (GET /api/executions)
//!                                             ├─▶ CsvLogger       (AUDIT_CSV_PATH)
//!                                             └─▶ NotionLogger    (NOTION_API_KEY + NOTION_DATABASE_ID)
//! ```
//!
//! A failing sink never affects the others or the HTTP response; the engine
//! only logs the error.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::AuditConfig;
use crate::models::{ExecutionRecord, Outcome};

pub mod csv;
pub mod memory;
pub mod notion;

pub use memory::MemoryLogger;

#[async_trait]
pub trait ExecutionLogger: Send + Sync {
    fn name(&self) -> &'static str;

    async fn record(&self, record: &ExecutionRecord) -> anyhow::Result<()>;
}

// ─── Tracing Sink ─────────────────────────────────────────────────────────────

/// Writes one structured log line per execution.
#[derive(Debug, Default)]
pub struct TracingLogger;

#[async_trait]
impl ExecutionLogger for TracingLogger {
    fn name(&self) -> &'static str {
        "tracing"
    }

    async fn record(&self, record: &ExecutionRecord) -> anyhow::Result<()> {
        let instrument = record.signal.as_ref().map(|s| s.instrument.as_str()).unwrap_or("-");
        let side = record.signal.as_ref().map(|s| s.side.as_str()).unwrap_or("-");
        let status = record.result.as_ref().map(|r| r.broker_status);
        let attempts = record.result.as_ref().map(|r| r.attempts);

        match record.outcome {
            Outcome::Filled | Outcome::Deduplicated | Outcome::Ignored => info!(
                execution_id = %record.execution_id,
                outcome      = record.outcome.as_str(),
                instrument,
                side,
                status       = ?status,
                attempts     = ?attempts,
                reason       = ?record.reason,
                "📒 Execution recorded"
            ),
            _ => warn!(
                execution_id = %record.execution_id,
                outcome      = record.outcome.as_str(),
                instrument,
                side,
                status       = ?status,
                attempts     = ?attempts,
                reason       = ?record.reason,
                reconcile    = ?record.reconcile,
                "📒 Execution recorded"
            ),
        }
        Ok(())
    }
}

// ─── Fan-out ──────────────────────────────────────────────────────────────────

pub struct FanoutLogger {
    sinks: Vec<Arc<dyn ExecutionLogger>>,
}

impl FanoutLogger {
    pub fn new(sinks: Vec<Arc<dyn ExecutionLogger>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl ExecutionLogger for FanoutLogger {
    fn name(&self) -> &'static str {
        "fanout"
    }

    /// Always `Ok`: sink errors are logged here and swallowed.
    async fn record(&self, record: &ExecutionRecord) -> anyhow::Result<()> {
        for sink in &self.sinks {
            if let Err(e) = sink.record(record).await {
                warn!(
                    sink         = sink.name(),
                    execution_id = %record.execution_id,
                    error        = %e,
                    "Audit sink failed"
                );
            }
        }
        Ok(())
    }
}

/// Assemble the configured sinks. `history` is always included so the
/// monitor endpoints have something to show.
pub fn build_logger(
    config: &AuditConfig,
    client: reqwest::Client,
    history: Arc<MemoryLogger>,
) -> Arc<dyn ExecutionLogger> {
    let mut sinks: Vec<Arc<dyn ExecutionLogger>> = vec![
        Arc::new(TracingLogger) as Arc<dyn ExecutionLogger>,
        history as Arc<dyn ExecutionLogger>,
    ];

    if let Some(path) = &config.csv_path {
        info!(path = %path.display(), "Audit: CSV sink enabled");
        sinks.push(Arc::new(csv::CsvLogger::new(path.clone())));
    }

    if let Some(notion) = &config.notion {
        info!(database_id = %notion.database_id, "Audit: Notion sink enabled");
        sinks.push(Arc::new(notion::NotionLogger::new(client, notion.clone())));
    }

    Arc::new(FanoutLogger::new(sinks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingSink;

    #[async_trait]
    impl ExecutionLogger for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn record(&self, _record: &ExecutionRecord) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }
    }

    #[derive(Default)]
    struct CountingSink(AtomicUsize);

    #[async_trait]
    impl ExecutionLogger for CountingSink {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn record(&self, _record: &ExecutionRecord) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_block_others() {
        let counter = Arc::new(CountingSink::default());
        let fanout = FanoutLogger::new(vec![
            Arc::new(FailingSink),
            Arc::clone(&counter) as Arc<dyn ExecutionLogger>,
        ]);
        let record = ExecutionRecord::terminal(Utc::now(), Outcome::Invalid, None, "bad body");

        assert!(fanout.record(&record).await.is_ok());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_build_logger_always_feeds_history() {
        let history = Arc::new(MemoryLogger::new(10));
        let logger = build_logger(&AuditConfig::default(), reqwest::Client::new(), Arc::clone(&history));
        let record = ExecutionRecord::terminal(Utc::now(), Outcome::Deduplicated, None, "dup");
        logger.record(&record).await.unwrap();
        assert_eq!(history.recent(10).await.len(), 1);
    }
}
