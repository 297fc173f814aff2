//! # models::position
//!
//! Broker-reported exposure and the outcome of reconciling against it.
//!
//! `OpenPosition` is a read-only snapshot taken at query time; nothing here
//! is cached between requests.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Net exposure on one instrument as reported by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub instrument: String,
    /// Always `>= 0`.
    pub long_units: i64,
    /// Always `<= 0`.
    pub short_units: i64,
    #[serde(default)]
    pub unrealized_pl: Option<Decimal>,
}

/// Which side of a hedged position a close call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionSide {
    Long,
    Short,
}

/// What the reconciler did before placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconcileOutcome {
    /// No exposure opposite to the new signal.
    NothingToClose {
        #[serde(default)]
        unrealized_pl: Option<Decimal>,
    },
    /// Opposing exposure closed in full.
    Closed {
        side: PositionSide,
        units: i64,
        status: u16,
        /// Open P/L on the instrument just before the close.
        #[serde(default)]
        unrealized_pl: Option<Decimal>,
    },
    /// The close call failed; exposure may still be open.
    CloseFailed {
        side: PositionSide,
        status: Option<u16>,
        error: String,
    },
    /// The position lookup itself failed.
    QueryFailed { error: String },
}

impl ReconcileOutcome {
    /// Summed unrealized P/L seen by the position query, when it succeeded.
    pub fn unrealized_pl(&self) -> Option<Decimal> {
        match self {
            ReconcileOutcome::NothingToClose { unrealized_pl }
            | ReconcileOutcome::Closed { unrealized_pl, .. } => *unrealized_pl,
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ReconcileOutcome::CloseFailed { .. } | ReconcileOutcome::QueryFailed { .. }
        )
    }
}
