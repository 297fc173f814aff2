//! # models::execution
//!
//! [`ExecutionRecord`] is the audit trail of one alert: what came in, what
//! was decided, and what the broker answered. Every alert produces exactly
//! one record, handed to the execution logger once it reaches a terminal
//! [`Outcome`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{OrderRequest, OrderResult, ReconcileOutcome, Signal};

// ─── Outcome ──────────────────────────────────────────────────────────────────

/// Terminal state of one alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// Broker accepted the order.
    Filled,
    /// Broker answered with a non-2xx status on the last attempt.
    Rejected,
    /// The broker could not be reached on the last attempt.
    ExhaustedRetries,
    /// Payload or risk parameters could not be turned into an order.
    Invalid,
    /// Signal text was understood syntactically but names no side.
    Ignored,
    /// Same key seen inside the cooldown window.
    Deduplicated,
    /// Reconciliation failed and policy forbids placing anyway.
    Aborted,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Filled => "FILLED",
            Outcome::Rejected => "REJECTED",
            Outcome::ExhaustedRetries => "EXHAUSTED_RETRIES",
            Outcome::Invalid => "INVALID",
            Outcome::Ignored => "IGNORED",
            Outcome::Deduplicated => "DEDUPLICATED",
            Outcome::Aborted => "ABORTED",
        }
    }

    /// Whether an order was submitted to the broker.
    pub fn reached_broker(self) -> bool {
        matches!(
            self,
            Outcome::Filled | Outcome::Rejected | Outcome::ExhaustedRetries
        )
    }
}

// ─── ExecutionRecord ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: Uuid,
    pub received_at: DateTime<Utc>,
    pub outcome: Outcome,
    pub signal: Option<Signal>,
    pub order: Option<OrderRequest>,
    pub reconcile: Option<ReconcileOutcome>,
    pub result: Option<OrderResult>,
    /// Human-readable failure or skip reason.
    pub reason: Option<String>,
}

impl ExecutionRecord {
    /// A record for an alert that stopped before reaching the broker.
    pub fn terminal(
        received_at: DateTime<Utc>,
        outcome: Outcome,
        signal: Option<Signal>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            received_at,
            outcome,
            signal,
            order: None,
            reconcile: None,
            result: None,
            reason: Some(reason.into()),
        }
    }
}
