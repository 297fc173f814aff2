//! # models::signal
//!
//! Defines [`Signal`], the canonical form of an inbound trading alert, and the
//! raw payload shapes it is normalized from.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ─── Side ─────────────────────────────────────────────────────────────────────

/// Trade direction carried by an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Sign applied to order units: `+1` long, `-1` short.
    #[inline]
    pub fn sign(self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Signal ───────────────────────────────────────────────────────────────────

/// A normalized alert. Immutable once built by the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub side: Side,

    /// Broker instrument name, e.g. `"GBP_JPY"`.
    pub instrument: String,

    /// Price quoted by the alert. `0` when the alert carried none.
    pub price: Decimal,

    /// When the alert was observed upstream (or received, if it had no time).
    pub observed_at: DateTime<Utc>,

    /// Trailing / stop width requested by the alert, in pips.
    #[serde(default)]
    pub trail_pips: Option<Decimal>,
}

// ─── Raw Payload ──────────────────────────────────────────────────────────────

/// JSON alert body as sent by charting platforms.
///
/// Numeric fields are kept as raw JSON values because senders mix numbers and
/// numeric strings (`"price": "150.02"`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertPayload {
    #[serde(default)]
    pub signal: Option<serde_json::Value>,
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default)]
    pub instrument: Option<String>,
    #[serde(default)]
    pub price: Option<serde_json::Value>,
    #[serde(default)]
    pub time: Option<serde_json::Value>,
    #[serde(default)]
    pub trail_pips: Option<serde_json::Value>,
}

/// Inbound alert before normalization.
#[derive(Debug, Clone)]
pub enum RawAlert {
    /// JSON object body.
    Structured(AlertPayload),
    /// Plain-text body (or a bare JSON string) holding only the signal text.
    Text(String),
}
