//! # audit::notion
//!
//! Creates one page in a Notion database per order that reached the broker.
//! Alerts that stopped earlier (invalid, duplicate, ignored) are skipped.

use async_trait::async_trait;
use anyhow::Context;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{json, Value};
use tracing::debug;

use crate::audit::ExecutionLogger;
use crate::config::NotionConfig;
use crate::models::{ExecutionRecord, RiskSpec};

const NOTION_URL: &str = "https://api.notion.com/v1/pages";
const NOTION_VERSION: &str = "2022-06-28";

pub struct NotionLogger {
    client: reqwest::Client,
    config: NotionConfig,
}

impl NotionLogger {
    pub fn new(client: reqwest::Client, config: NotionConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl ExecutionLogger for NotionLogger {
    fn name(&self) -> &'static str {
        "notion"
    }

    async fn record(&self, record: &ExecutionRecord) -> anyhow::Result<()> {
        let Some(payload) = page_payload(&self.config.database_id, record) else {
            return Ok(());
        };

        let resp = self
            .client
            .post(NOTION_URL)
            .bearer_auth(&self.config.api_key)
            .header("Notion-Version", NOTION_VERSION)
            .json(&payload)
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await
            .context("Notion unreachable")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Notion rejected page: HTTP {status}: {body}");
        }

        debug!(execution_id = %record.execution_id, "Audit: Notion page created");
        Ok(())
    }
}

/// Page body for `record`, or `None` when nothing was sent to the broker.
fn page_payload(database_id: &str, record: &ExecutionRecord) -> Option<Value> {
    if !record.outcome.reached_broker() {
        return None;
    }
    let order = record.order.as_ref()?;
    let result = record.result.as_ref()?;

    let order_type = if order.units >= 0 { "BUY" } else { "SELL" };
    let price = result
        .fill_price
        .or_else(|| record.signal.as_ref().map(|s| s.price))
        .and_then(|p| p.to_f64());
    let unrealized_pl = record
        .reconcile
        .as_ref()
        .and_then(|r| r.unrealized_pl())
        .and_then(|p| p.to_f64());
    let stop_loss = match &order.risk {
        RiskSpec::StopLoss { price } => price.to_f64(),
        RiskSpec::StopDistance { distance } | RiskSpec::TrailingStop { distance } => distance.to_f64(),
        RiskSpec::None => None,
    };

    Some(json!({
        "parent": { "database_id": database_id },
        "properties": {
            "DateTime": { "date":      { "start": record.received_at.to_rfc3339() } },
            "Type":     { "select":    { "name": order_type } },
            "Amount":   { "number":    order.units.unsigned_abs() },
            "Price":    { "number":    price },
            "Order ID": { "rich_text": [{ "text": { "content": result.order_id.clone().unwrap_or_default() } }] },
            "Stop Loss":{ "number":    stop_loss },
            "Unrealized PnL": { "number": unrealized_pl },
            "Outcome":  { "select":    { "name": record.outcome.as_str() } },
        }
    }))
}
