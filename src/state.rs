//! # state
//!
//! Shared application state handed to every axum handler through
//! `State<SharedState>`.
//!
//! The engine owns everything that must be consistent across requests (dedup
//! map, per-instrument locks). The counters here are only for `/health`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::audit::MemoryLogger;
use crate::engine::normalizer::UnknownSignalPolicy;
use crate::engine::ExecutionEngine;
use crate::models::Outcome;

// ─── Counters ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct Counters {
    pub signals_received: AtomicU64,
    pub orders_placed: AtomicU64,
    pub orders_failed: AtomicU64,
    pub duplicates: AtomicU64,
}

impl Counters {
    /// Count one finished execution.
    pub fn observe(&self, outcome: Outcome) {
        self.signals_received.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            Outcome::Filled => &self.orders_placed,
            Outcome::Rejected | Outcome::ExhaustedRetries | Outcome::Aborted => &self.orders_failed,
            Outcome::Deduplicated => &self.duplicates,
            Outcome::Invalid | Outcome::Ignored => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

// ─── AppState ─────────────────────────────────────────────────────────────────

pub struct AppState {
    pub engine: ExecutionEngine,
    /// Same instance the engine's logger fans out to.
    pub history: Arc<MemoryLogger>,
    pub webhook_token: Option<String>,
    pub unknown_policy: UnknownSignalPolicy,
    pub counters: Counters,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        engine: ExecutionEngine,
        history: Arc<MemoryLogger>,
        webhook_token: Option<String>,
    ) -> Self {
        let unknown_policy = engine.config().unknown_signal;
        Self {
            engine,
            history,
            webhook_token,
            unknown_policy,
            counters: Counters::default(),
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<AppState>;

pub fn build_state(
    engine: ExecutionEngine,
    history: Arc<MemoryLogger>,
    webhook_token: Option<String>,
) -> SharedState {
    Arc::new(AppState::new(engine, history, webhook_token))
}
