//! # audit::csv
//!
//! Appends one row per execution to a local order-history CSV file. The
//! header is written when the file is first created.

use std::path::PathBuf;

use async_trait::async_trait;
use anyhow::Context;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::audit::ExecutionLogger;
use crate::models::ExecutionRecord;

const HEADER: &[&str] = &[
    "timestamp",
    "execution_id",
    "outcome",
    "signal",
    "instrument",
    "units",
    "success",
    "order_id",
    "status",
    "fill_price",
    "unrealized_pl",
    "error",
];

pub struct CsvLogger {
    path: PathBuf,
    /// Serializes appends so rows from concurrent requests never interleave.
    write_lock: Mutex<()>,
}

impl CsvLogger {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl ExecutionLogger for CsvLogger {
    fn name(&self) -> &'static str {
        "csv"
    }

    async fn record(&self, record: &ExecutionRecord) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;

        let is_new = tokio::fs::metadata(&self.path).await.is_err();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("open {}", self.path.display()))?;

        let mut out = String::new();
        if is_new {
            out.push_str(&HEADER.join(","));
            out.push('\n');
        }
        out.push_str(&row(record).iter().map(|f| escape(f)).collect::<Vec<_>>().join(","));
        out.push('\n');

        file.write_all(out.as_bytes())
            .await
            .with_context(|| format!("append to {}", self.path.display()))?;
        file.flush().await?;
        Ok(())
    }
}

fn row(record: &ExecutionRecord) -> Vec<String> {
    let result = record.result.as_ref();
    let error = match result {
        Some(r) if !r.accepted => r.raw_response.to_string(),
        _ => record.reason.clone().unwrap_or_default(),
    };

    vec![
        record.received_at.to_rfc3339(),
        record.execution_id.to_string(),
        record.outcome.as_str().to_string(),
        record.signal.as_ref().map(|s| s.side.to_string()).unwrap_or_default(),
        record.signal.as_ref().map(|s| s.instrument.clone()).unwrap_or_default(),
        record.order.as_ref().map(|o| o.units.to_string()).unwrap_or_default(),
        result.map(|r| r.accepted).unwrap_or(false).to_string(),
        result.and_then(|r| r.order_id.clone()).unwrap_or_default(),
        result.map(|r| r.broker_status.to_string()).unwrap_or_default(),
        result.and_then(|r| r.fill_price).map(|p| p.to_string()).unwrap_or_default(),
        record
            .reconcile
            .as_ref()
            .and_then(|r| r.unrealized_pl())
            .map(|p| p.to_string())
            .unwrap_or_default(),
        error,
    ]
}

/// RFC 4180 quoting.
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
