//! # engine::executor
//!
//! **Execution Engine**: runs one alert end to end.
//!
//! ```text
//! Received ─▶ Normalized ─┬─▶ Invalid | Ignored                       (no broker calls)
//!                         ├─▶ Deduplicated                            (no broker calls)
//!                         └─▶ Reconciling ─▶ Placing ─┬─▶ Filled
//!                              │                      ├─▶ Rejected
//!                              └─▶ Aborted            └─▶ ExhaustedRetries
//! ```
//!
//! Reconciling and Placing form one critical section per instrument: two
//! opposite alerts on the same pair never observe the same position snapshot.
//! Different instruments run in parallel.
//!
//! Every terminal state is handed to the [`ExecutionLogger`] exactly once
//! before [`ExecutionEngine::execute`] returns.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::audit::ExecutionLogger;
use crate::broker::Broker;
use crate::config::EngineConfig;
use crate::engine::clock::Clock;
use crate::engine::dedup::{DedupGuard, DedupStore, TtlDedupStore};
use crate::engine::normalizer::{SignalError, SignalNormalizer};
use crate::engine::placer::{BackoffPolicy, FixedBackoff, OrderPlacer};
use crate::engine::reconciler::{PositionReconciler, ReconcileFailurePolicy};
use crate::engine::risk::RiskCalculator;
use crate::models::{ExecutionRecord, Outcome, Signal};

/// Upper bound on how long one audit write may hold up the response.
const AUDIT_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Instrument Locks ─────────────────────────────────────────────────────────

/// One async mutex per instrument, created on first use.
///
/// An entry whose only reference is the map itself has no holder and no
/// waiter; such entries are dropped on every lookup, so the map only ever
/// holds instruments with work in flight.
#[derive(Default)]
pub struct InstrumentLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl InstrumentLocks {
    pub fn lock_for(&self, instrument: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(
            locks
                .entry(instrument.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

// ─── Engine ───────────────────────────────────────────────────────────────────

pub struct ExecutionEngine {
    config: EngineConfig,
    normalizer: SignalNormalizer,
    dedup: DedupGuard,
    risk: RiskCalculator,
    reconciler: PositionReconciler,
    placer: OrderPlacer,
    logger: Arc<dyn ExecutionLogger>,
    clock: Arc<dyn Clock>,
    locks: InstrumentLocks,
}

impl ExecutionEngine {
    pub fn new(
        config: EngineConfig,
        broker: Arc<dyn Broker>,
        logger: Arc<dyn ExecutionLogger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store: Arc<dyn DedupStore> = Arc::new(TtlDedupStore::new(config.dedup_evict_factor));
        let backoff: Arc<dyn BackoffPolicy> = Arc::new(FixedBackoff(config.retry_delay));
        Self::with_parts(config, broker, logger, clock, store, backoff)
    }

    /// Full constructor with injectable dedup store and backoff policy.
    pub fn with_parts(
        config: EngineConfig,
        broker: Arc<dyn Broker>,
        logger: Arc<dyn ExecutionLogger>,
        clock: Arc<dyn Clock>,
        store: Arc<dyn DedupStore>,
        backoff: Arc<dyn BackoffPolicy>,
    ) -> Self {
        Self {
            normalizer: SignalNormalizer::new(config.default_instrument.clone()),
            dedup: DedupGuard::new(
                store,
                config.dedup_cooldown,
                config.dedup_key_mode,
                config.dedup_price_dp,
            ),
            risk: RiskCalculator::new(config.pip_table.clone()),
            reconciler: PositionReconciler::new(Arc::clone(&broker), config.settle_delay),
            placer: OrderPlacer::new(broker, config.max_attempts, backoff),
            logger,
            clock,
            locks: InstrumentLocks::default(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tracked_dedup_keys(&self) -> usize {
        self.dedup.tracked_keys()
    }

    /// Run one inbound body to a terminal state and report it.
    pub async fn execute(&self, body: &str) -> ExecutionRecord {
        let received_at = self.clock.now();

        let record = match self.normalizer.normalize_body(body, received_at) {
            Ok(signal) => self.run(signal, received_at).await,
            Err(SignalError::Unknown(text)) => {
                info!(signal = %text, "Alert ignored: unknown signal");
                ExecutionRecord::terminal(
                    received_at,
                    Outcome::Ignored,
                    None,
                    SignalError::Unknown(text).to_string(),
                )
            }
            Err(e) => {
                warn!(error = %e, "Alert rejected: malformed");
                ExecutionRecord::terminal(received_at, Outcome::Invalid, None, e.to_string())
            }
        };

        self.report(&record).await;
        record
    }

    async fn run(&self, signal: Signal, received_at: DateTime<Utc>) -> ExecutionRecord {
        info!(
            side       = %signal.side,
            instrument = %signal.instrument,
            price      = %signal.price,
            "📡 Alert normalized"
        );

        // ── 1. Risk parameters (validated before the dedup key is consumed) ──
        let risk = match self.risk.risk_spec(
            &signal,
            self.config.risk_mode,
            self.config.default_trail_pips,
        ) {
            Ok(r) => r,
            Err(e) => {
                let reason = format!("malformed signal: {e}");
                return ExecutionRecord::terminal(received_at, Outcome::Invalid, Some(signal), reason);
            }
        };

        // ── 2. Dedup gate ─────────────────────────────────────────────────────
        if !self.dedup.admit(&signal, received_at) {
            return ExecutionRecord::terminal(
                received_at,
                Outcome::Deduplicated,
                Some(signal),
                "duplicate signal inside cooldown window",
            );
        }

        // ── 3. Per-instrument critical section ────────────────────────────────
        let lock = self.locks.lock_for(&signal.instrument);
        let _guard = lock.lock().await;
        debug!(instrument = %signal.instrument, "Instrument lock acquired");

        // ── 4. Reconcile ──────────────────────────────────────────────────────
        let reconcile = self
            .reconciler
            .close_opposing(&signal.instrument, signal.side)
            .await;

        if reconcile.is_failure()
            && self.config.reconcile_on_failure == ReconcileFailurePolicy::Abort
        {
            let mut record = ExecutionRecord::terminal(
                received_at,
                Outcome::Aborted,
                Some(signal),
                "reconciliation failed; placement aborted by policy",
            );
            record.reconcile = Some(reconcile);
            return record;
        }

        if reconcile.is_failure() {
            warn!(instrument = %signal.instrument, "Reconciliation failed; placing anyway");
        }

        // ── 5. Place ──────────────────────────────────────────────────────────
        let placement = self
            .placer
            .place(signal.side, &signal.instrument, self.config.trade_units, risk)
            .await;

        let (outcome, reason) = if placement.result.accepted {
            (Outcome::Filled, None)
        } else if placement.result.is_transport_failure() {
            (
                Outcome::ExhaustedRetries,
                Some(format!(
                    "broker unavailable after {} attempts",
                    placement.result.attempts
                )),
            )
        } else {
            (
                Outcome::Rejected,
                Some(format!(
                    "broker rejected order with HTTP {} after {} attempts",
                    placement.result.broker_status, placement.result.attempts
                )),
            )
        };

        ExecutionRecord {
            execution_id: uuid::Uuid::new_v4(),
            received_at,
            outcome,
            signal: Some(signal),
            order: Some(placement.request),
            reconcile: Some(reconcile),
            result: Some(placement.result),
            reason,
        }
    }

    /// Hand the record to the logger; its failures never propagate.
    async fn report(&self, record: &ExecutionRecord) {
        match tokio::time::timeout(AUDIT_TIMEOUT, self.logger.record(record)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(
                execution_id = %record.execution_id,
                error        = %e,
                "Execution logger failed"
            ),
            Err(_) => warn!(
                execution_id = %record.execution_id,
                "Execution logger timed out"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryLogger;
    use crate::broker::stub::{rejected, BrokerCall, StubBroker};
    use crate::broker::BrokerError;
    use crate::engine::clock::ManualClock;
    use crate::engine::risk::RiskMode;
    use crate::models::{PositionSide, ReconcileOutcome, RiskSpec};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    const ALERT: &str = r#"{"signal":"anybuy","ticker":"GBP_JPY","price":150.00}"#;

    struct Harness {
        engine: ExecutionEngine,
        broker: Arc<StubBroker>,
        history: Arc<MemoryLogger>,
        clock: Arc<ManualClock>,
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            retry_delay: Duration::ZERO,
            settle_delay: Duration::ZERO,
            ..EngineConfig::default()
        }
    }

    fn harness(broker: StubBroker, config: EngineConfig) -> Harness {
        let broker = Arc::new(broker);
        let history = Arc::new(MemoryLogger::new(50));
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap(),
        ));
        let engine = ExecutionEngine::new(
            config,
            Arc::clone(&broker) as Arc<dyn Broker>,
            Arc::clone(&history) as Arc<dyn ExecutionLogger>,
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        Harness { engine, broker, history, clock }
    }

    #[tokio::test]
    async fn test_fresh_signal_fills() {
        let h = harness(StubBroker::new(), test_config());
        let record = h.engine.execute(ALERT).await;

        assert_eq!(record.outcome, Outcome::Filled);
        assert_eq!(
            record.reconcile,
            Some(ReconcileOutcome::NothingToClose { unrealized_pl: None })
        );

        let orders = h.broker.order_calls();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].units, 1000);
        assert_eq!(orders[0].instrument, "GBP_JPY");
        assert_eq!(orders[0].risk, RiskSpec::TrailingStop { distance: dec!(0.20) });
        assert!(h.broker.close_calls().is_empty());

        let logged = h.history.recent(10).await;
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].execution_id, record.execution_id);
    }

    #[tokio::test]
    async fn test_repeat_within_cooldown_is_deduplicated() {
        let h = harness(StubBroker::new(), test_config());
        assert_eq!(h.engine.execute(ALERT).await.outcome, Outcome::Filled);
        let calls_after_first = h.broker.calls().len();

        h.clock.advance(chrono::Duration::seconds(10));
        let second = h.engine.execute(ALERT).await;

        assert_eq!(second.outcome, Outcome::Deduplicated);
        assert_eq!(h.broker.calls().len(), calls_after_first);
        assert_eq!(h.history.recent(10).await.len(), 2);
    }

    #[tokio::test]
    async fn test_repeat_after_cooldown_executes_again() {
        let h = harness(StubBroker::new(), test_config());
        h.engine.execute(ALERT).await;
        h.clock.advance(chrono::Duration::seconds(60));
        assert_eq!(h.engine.execute(ALERT).await.outcome, Outcome::Filled);
        assert_eq!(h.broker.order_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_opposite_exposure_closed_before_placing() {
        let broker = StubBroker::new().with_position("GBP_JPY", 0, -5000);
        let h = harness(broker, test_config());
        let record = h.engine.execute(ALERT).await;

        assert_eq!(record.outcome, Outcome::Filled);
        let calls = h.broker.calls();
        assert_eq!(calls[0], BrokerCall::OpenPositions("GBP_JPY".into()));
        assert_eq!(calls[1], BrokerCall::Close("GBP_JPY".into(), PositionSide::Short));
        assert!(matches!(calls[2], BrokerCall::CreateOrder(_)));
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_make_no_broker_calls() {
        let h = harness(StubBroker::new(), test_config());

        assert_eq!(h.engine.execute("{oops").await.outcome, Outcome::Invalid);
        assert_eq!(h.engine.execute(r#"{"signal":"hold"}"#).await.outcome, Outcome::Ignored);
        assert!(h.broker.calls().is_empty());
        assert_eq!(h.history.recent(10).await.len(), 2);
    }

    #[tokio::test]
    async fn test_stop_loss_mode_requires_price() {
        let config = EngineConfig { risk_mode: RiskMode::StopLoss, ..test_config() };
        let h = harness(StubBroker::new(), config);

        let unpriced = h.engine.execute(r#"{"signal":"buy"}"#).await;
        assert_eq!(unpriced.outcome, Outcome::Invalid);
        assert!(h.broker.calls().is_empty());

        // The invalid alert did not consume the dedup key.
        let priced = h.engine.execute(ALERT).await;
        assert_eq!(priced.outcome, Outcome::Filled);
        assert_eq!(
            h.broker.order_calls()[0].risk,
            RiskSpec::StopLoss { price: dec!(149.800) }
        );
    }

    #[tokio::test]
    async fn test_rejected_after_retries() {
        let broker = StubBroker::new()
            .with_order_script((0..3).map(|_| Ok(rejected(400))).collect());
        let h = harness(broker, test_config());
        let record = h.engine.execute(ALERT).await;

        assert_eq!(record.outcome, Outcome::Rejected);
        assert_eq!(record.result.as_ref().map(|r| r.attempts), Some(3));
        assert_eq!(h.broker.order_calls().len(), 3);
    }

    #[tokio::test]
    async fn test_unreachable_broker_exhausts_retries() {
        let broker = StubBroker::new().with_order_script(
            (0..3).map(|_| Err(BrokerError::Timeout("10s".into()))).collect(),
        );
        let h = harness(broker, test_config());
        assert_eq!(h.engine.execute(ALERT).await.outcome, Outcome::ExhaustedRetries);
    }

    #[tokio::test]
    async fn test_query_failure_policy() {
        let proceed = harness(StubBroker::new().with_failing_query(), test_config());
        let record = proceed.engine.execute(ALERT).await;
        assert_eq!(record.outcome, Outcome::Filled);
        assert!(matches!(record.reconcile, Some(ReconcileOutcome::QueryFailed { .. })));

        let config = EngineConfig {
            reconcile_on_failure: ReconcileFailurePolicy::Abort,
            ..test_config()
        };
        let abort = harness(StubBroker::new().with_failing_query(), config);
        let record = abort.engine.execute(ALERT).await;
        assert_eq!(record.outcome, Outcome::Aborted);
        assert!(abort.broker.order_calls().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_place_once() {
        let h = Arc::new(harness(StubBroker::new(), test_config()));
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let h = Arc::clone(&h);
                tokio::spawn(async move { h.engine.execute(ALERT).await.outcome })
            })
            .collect();

        let mut filled = 0;
        for task in tasks {
            if task.await.unwrap() == Outcome::Filled {
                filled += 1;
            }
        }
        assert_eq!(filled, 1);
        assert_eq!(h.broker.order_calls().len(), 1);
    }

    /// One letter per broker call: Q = position query, C = close, O = order.
    fn call_trace(broker: &StubBroker) -> String {
        broker
            .calls()
            .iter()
            .map(|c| match c {
                BrokerCall::OpenPositions(_) => 'Q',
                BrokerCall::Close(..) => 'C',
                BrokerCall::CreateOrder(_) => 'O',
            })
            .collect()
    }

    async fn run_pair(h: &Arc<Harness>, first: &'static str, second: &'static str) {
        let tasks: Vec<_> = [first, second]
            .into_iter()
            .map(|body| {
                let h = Arc::clone(h);
                tokio::spawn(async move { h.engine.execute(body).await.outcome })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap(), Outcome::Filled);
        }
    }

    #[tokio::test]
    async fn test_opposite_signals_on_one_instrument_run_one_at_a_time() {
        let broker = StubBroker::new().with_query_delay(Duration::from_millis(20));
        let h = Arc::new(harness(broker, test_config()));

        run_pair(
            &h,
            r#"{"signal":"buy","ticker":"GBP_JPY","price":150.00}"#,
            r#"{"signal":"sell","ticker":"GBP_JPY","price":150.00}"#,
        )
        .await;

        // Each query is followed by its own order before the next query starts.
        assert_eq!(call_trace(&h.broker), "QOQO");
    }

    #[tokio::test]
    async fn test_different_instruments_overlap() {
        let broker = StubBroker::new().with_query_delay(Duration::from_millis(20));
        let h = Arc::new(harness(broker, test_config()));

        run_pair(
            &h,
            r#"{"signal":"buy","ticker":"GBP_JPY","price":150.00}"#,
            r#"{"signal":"buy","ticker":"EUR_USD","price":1.1000}"#,
        )
        .await;

        assert_eq!(call_trace(&h.broker), "QQOO");
    }

    #[test]
    fn test_idle_instrument_locks_are_pruned() {
        let locks = InstrumentLocks::default();
        for i in 0..100 {
            drop(locks.lock_for(&format!("RND{i}_USD")));
        }
        let held = locks.lock_for("GBP_JPY");
        assert_eq!(locks.len(), 1);

        drop(held);
        let _other = locks.lock_for("EUR_USD");
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn test_instrument_locks_are_shared_per_instrument() {
        let locks = InstrumentLocks::default();
        let a = locks.lock_for("GBP_JPY");
        let b = locks.lock_for("GBP_JPY");
        let c = locks.lock_for("EUR_USD");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
