//! # engine::placer
//!
//! **Order Placer**: submits a market order and retries until the broker
//! answers 2xx or the attempt budget runs out.
//!
//! ## Retry rules
//! * 2xx                           → accepted, stop immediately
//! * non-2xx / timeout / no route  → wait `backoff.delay(attempt)`, try again
//! * every attempt is kept in [`OrderResult::attempt_log`]
//! * budget exhausted              → last result returned with `accepted = false`
//!
//! Delays come from an injected [`BackoffPolicy`]; the default is a fixed
//! delay, not exponential.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{error, info, warn};

use crate::broker::{Broker, BrokerError, BrokerResponse};
use crate::models::{AttemptSummary, OrderRequest, OrderResult, RiskSpec, Side};

/// Reported for a broker answer whose body could not be decoded.
const UNREADABLE_RESPONSE_STATUS: u16 = 502;

// ─── Backoff ──────────────────────────────────────────────────────────────────

/// Delay to wait after failed attempt number `attempt` (1-based).
pub trait BackoffPolicy: Send + Sync {
    fn delay(&self, attempt: u32) -> Duration;
}

#[derive(Debug, Clone, Copy)]
pub struct FixedBackoff(pub Duration);

impl BackoffPolicy for FixedBackoff {
    #[inline]
    fn delay(&self, _attempt: u32) -> Duration {
        self.0
    }
}

// ─── Placement ────────────────────────────────────────────────────────────────

/// The order that was built and what became of it.
#[derive(Debug, Clone)]
pub struct Placement {
    pub request: OrderRequest,
    pub result: OrderResult,
}

pub struct OrderPlacer {
    broker: Arc<dyn Broker>,
    max_attempts: u32,
    backoff: Arc<dyn BackoffPolicy>,
}

impl OrderPlacer {
    pub fn new(broker: Arc<dyn Broker>, max_attempts: u32, backoff: Arc<dyn BackoffPolicy>) -> Self {
        Self {
            broker,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Build a market order of `units` in the direction of `side` and submit it.
    pub async fn place(&self, side: Side, instrument: &str, units: u64, risk: RiskSpec) -> Placement {
        let request = OrderRequest::market(side, instrument, units, risk);
        let result = self.submit(&request).await;
        Placement { request, result }
    }

    /// Submit `order` with bounded retry.
    pub async fn submit(&self, order: &OrderRequest) -> OrderResult {
        let mut attempt = 0;
        let mut attempt_log = Vec::new();

        loop {
            attempt += 1;

            let mut result = match self.broker.create_order(order).await {
                Ok(resp) => from_response(resp, attempt),
                Err(e) => from_error(e, attempt),
            };
            attempt_log.push(AttemptSummary {
                attempt,
                status: result.broker_status,
                raw_response: result.raw_response.clone(),
            });

            if result.accepted {
                info!(
                    attempt,
                    instrument = %order.instrument,
                    units      = order.units,
                    order_id   = ?result.order_id,
                    fill_price = ?result.fill_price,
                    "✅ Order accepted"
                );
                result.attempt_log = attempt_log;
                return result;
            }

            if result.broker_status != 0 {
                warn!(
                    attempt,
                    status = result.broker_status,
                    body   = %result.raw_response,
                    "Order: broker rejected attempt"
                );
            }

            if attempt >= self.max_attempts {
                error!(
                    attempts   = attempt,
                    instrument = %order.instrument,
                    status     = result.broker_status,
                    "❌ Order: retries exhausted"
                );
                result.attempt_log = attempt_log;
                return result;
            }

            let delay = self.backoff.delay(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

fn from_response(resp: BrokerResponse, attempt: u32) -> OrderResult {
    OrderResult {
        accepted: resp.is_success(),
        broker_status: resp.status,
        raw_response: resp.body,
        order_id: resp.order_id,
        fill_price: resp.fill_price,
        attempts: attempt,
        attempt_log: Vec::new(),
    }
}

/// Transient errors never reached the broker and carry status `0`. Anything
/// else is a definitive answer: its own status, or 502 when the body could
/// not be read.
fn from_error(e: BrokerError, attempt: u32) -> OrderResult {
    let (broker_status, raw_response) = if e.is_transient() {
        warn!(attempt, error = %e, "Order: broker unreachable");
        (0, json!({ "errorMessage": e.to_string() }))
    } else {
        match e {
            BrokerError::Status { status, body } => (status, body),
            other => (UNREADABLE_RESPONSE_STATUS, json!({ "errorMessage": other.to_string() })),
        }
    };

    OrderResult {
        accepted: false,
        broker_status,
        raw_response,
        order_id: None,
        fill_price: None,
        attempts: attempt,
        attempt_log: Vec::new(),
    }
}
