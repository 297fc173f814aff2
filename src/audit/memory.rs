//! # audit::memory
//!
//! Bounded in-memory execution history behind `GET /api/executions`.
//! Oldest records are dropped once `capacity` is reached; nothing survives a
//! restart.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::audit::ExecutionLogger;
use crate::models::ExecutionRecord;

pub struct MemoryLogger {
    records: RwLock<VecDeque<ExecutionRecord>>,
    capacity: usize,
}

impl MemoryLogger {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Up to `limit` records, newest first.
    pub async fn recent(&self, limit: usize) -> Vec<ExecutionRecord> {
        let records = self.records.read().await;
        records.iter().rev().take(limit).cloned().collect()
    }

    pub async fn find(&self, id: Uuid) -> Option<ExecutionRecord> {
        let records = self.records.read().await;
        records.iter().find(|r| r.execution_id == id).cloned()
    }
}

#[async_trait]
impl ExecutionLogger for MemoryLogger {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn record(&self, record: &ExecutionRecord) -> anyhow::Result<()> {
        let mut records = self.records.write().await;
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record.clone());
        Ok(())
    }
}
