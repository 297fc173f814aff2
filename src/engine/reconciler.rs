//! # engine::reconciler
//!
//! **Position Reconciler**: before a new position opens, any exposure in the
//! opposite direction is closed in full.
//!
//! ```text
//! signal BUY  + short_units < 0  → close shortUnits=ALL
//! signal SELL + long_units  > 0  → close longUnits=ALL
//! otherwise                      → nothing to close
//! ```
//!
//! A failed lookup or close is reported, never retried here. Whether the
//! engine still places the order afterwards is [`ReconcileFailurePolicy`].

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::broker::Broker;
use crate::models::{PositionSide, ReconcileOutcome, Side};

/// What to do when reconciliation could not confirm the account is clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcileFailurePolicy {
    /// Log and place the order anyway (fail-open).
    #[default]
    Proceed,
    /// Stop and report `Aborted` (fail-closed).
    Abort,
}

impl FromStr for ReconcileFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "proceed" | "open" => Ok(Self::Proceed),
            "abort" | "closed" => Ok(Self::Abort),
            other => Err(format!("expected 'proceed' or 'abort', got '{other}'")),
        }
    }
}

pub struct PositionReconciler {
    broker: Arc<dyn Broker>,
    settle_delay: Duration,
}

impl PositionReconciler {
    pub fn new(broker: Arc<dyn Broker>, settle_delay: Duration) -> Self {
        Self {
            broker,
            settle_delay,
        }
    }

    /// Close exposure opposite to `side` on `instrument`.
    pub async fn close_opposing(&self, instrument: &str, side: Side) -> ReconcileOutcome {
        let positions = match self.broker.open_positions(instrument).await {
            Ok(p) => p,
            Err(e) => {
                warn!(instrument, error = %e, "Reconcile: position query failed");
                return ReconcileOutcome::QueryFailed {
                    error: e.to_string(),
                };
            }
        };

        let long_units: i64 = positions.iter().map(|p| p.long_units.max(0)).sum();
        let short_units: i64 = positions.iter().map(|p| p.short_units.min(0)).sum();
        let unrealized_pl = positions
            .iter()
            .filter_map(|p| p.unrealized_pl)
            .reduce(|a, b| a + b);

        let (target, units) = match side {
            Side::Buy if short_units < 0 => (PositionSide::Short, short_units),
            Side::Sell if long_units > 0 => (PositionSide::Long, long_units),
            _ => {
                info!(instrument, %side, long_units, short_units, "Reconcile: nothing opposing");
                return ReconcileOutcome::NothingToClose { unrealized_pl };
            }
        };

        info!(instrument, target = ?target, units, unrealized_pl = ?unrealized_pl, "Reconcile: closing opposing exposure");

        match self.broker.close_position(instrument, target).await {
            Ok(resp) if resp.is_success() => {
                if !self.settle_delay.is_zero() {
                    tokio::time::sleep(self.settle_delay).await;
                }
                ReconcileOutcome::Closed {
                    side: target,
                    units,
                    status: resp.status,
                    unrealized_pl,
                }
            }
            Ok(resp) => {
                warn!(instrument, status = resp.status, body = %resp.body, "Reconcile: close rejected");
                ReconcileOutcome::CloseFailed {
                    side: target,
                    status: Some(resp.status),
                    error: resp.body.to_string(),
                }
            }
            Err(e) => {
                warn!(instrument, error = %e, "Reconcile: close call failed");
                ReconcileOutcome::CloseFailed {
                    side: target,
                    status: None,
                    error: e.to_string(),
                }
            }
        }
    }
}
