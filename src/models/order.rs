//! # models::order
//!
//! Order request sent to the broker and the result of one placement sequence.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
}

/// Risk attachment submitted together with the entry order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskSpec {
    /// Fixed stop-loss price.
    StopLoss { price: Decimal },
    /// Stop-loss expressed as a distance from the fill price.
    StopDistance { distance: Decimal },
    /// Trailing stop distance.
    TrailingStop { distance: Decimal },
    None,
}

/// A market order. The sign of `units` encodes direction (positive = long).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub instrument: String,
    pub units: i64,
    pub order_type: OrderType,
    pub risk: RiskSpec,
}

impl OrderRequest {
    /// Build a market order of `size` units in the direction of `side`.
    pub fn market(side: Side, instrument: &str, size: u64, risk: RiskSpec) -> Self {
        let magnitude = i64::try_from(size).unwrap_or(i64::MAX);
        Self {
            instrument: instrument.to_string(),
            units: side.sign() * magnitude,
            order_type: OrderType::Market,
            risk,
        }
    }
}

/// What one submission got back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptSummary {
    pub attempt: u32,
    /// `0` when the broker was unreachable.
    pub status: u16,
    pub raw_response: serde_json::Value,
}

/// Final artifact of one placement attempt sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub accepted: bool,

    /// HTTP status of the last attempt. `0` when the broker was unreachable.
    pub broker_status: u16,

    /// Body of the last broker response, or `{ "errorMessage": ... }` on
    /// transport failure.
    pub raw_response: serde_json::Value,

    pub order_id: Option<String>,
    pub fill_price: Option<Decimal>,

    /// How many submissions were made.
    pub attempts: u32,

    /// Every submission in order, the last one included.
    #[serde(default)]
    pub attempt_log: Vec<AttemptSummary>,
}

impl OrderResult {
    /// True when the last attempt never reached the broker.
    #[inline]
    pub fn is_transport_failure(&self) -> bool {
        self.broker_status == 0
    }
}
