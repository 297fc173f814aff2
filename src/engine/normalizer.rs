//! # engine::normalizer
//!
//! **Signal Normalizer**: turns whatever the charting platform posted into a
//! canonical [`Signal`].
//!
//! ```text
//! body ──▶ RawAlert ──▶ side alias ──▶ instrument / price / time / trail ──▶ Signal
//!           (JSON | text)   buy+confirmed → buy → Buy
//! ```
//!
//! Two failure kinds are kept apart:
//! * [`SignalError::Malformed`]: the payload cannot be read at all.
//! * [`SignalError::Unknown`]: it can be read, but names no tradable side.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use thiserror::Error;

use crate::models::{AlertPayload, RawAlert, Side, Signal};

/// Epoch values above this are read as milliseconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalError {
    #[error("malformed signal: {0}")]
    Malformed(String),

    #[error("unknown signal: '{0}'")]
    Unknown(String),
}

/// How an unrecognized side is surfaced at the HTTP boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownSignalPolicy {
    /// Answer 200 and do nothing.
    #[default]
    Ignore,
    /// Answer 400.
    Reject,
}

impl FromStr for UnknownSignalPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "reject" => Ok(Self::Reject),
            other => Err(format!("expected 'ignore' or 'reject', got '{other}'")),
        }
    }
}

// ─── Raw Body ─────────────────────────────────────────────────────────────────

impl RawAlert {
    /// Read an HTTP body as either a JSON object, a JSON string, or plain text.
    pub fn parse(body: &str) -> Result<Self, SignalError> {
        let trimmed = body.trim();

        if trimmed.is_empty() {
            return Err(SignalError::Malformed("empty body".into()));
        }

        if trimmed.starts_with('{') {
            return serde_json::from_str::<AlertPayload>(trimmed)
                .map(RawAlert::Structured)
                .map_err(|e| SignalError::Malformed(format!("invalid JSON: {e}")));
        }

        if trimmed.starts_with('"') {
            return serde_json::from_str::<String>(trimmed)
                .map(RawAlert::Text)
                .map_err(|e| SignalError::Malformed(format!("invalid JSON string: {e}")));
        }

        if trimmed.starts_with('[') {
            return Err(SignalError::Malformed("expected an object, got an array".into()));
        }

        // Bare numbers, booleans and null are valid JSON but not an alert.
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            return Err(SignalError::Malformed(format!("expected an object, got {value}")));
        }

        Ok(RawAlert::Text(trimmed.to_string()))
    }
}

// ─── Normalizer ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SignalNormalizer {
    default_instrument: String,
}

impl SignalNormalizer {
    pub fn new(default_instrument: impl Into<String>) -> Self {
        Self {
            default_instrument: canonical_instrument(&default_instrument.into()),
        }
    }

    /// Parse and normalize an HTTP body in one step.
    pub fn normalize_body(&self, body: &str, now: DateTime<Utc>) -> Result<Signal, SignalError> {
        let raw = RawAlert::parse(body)?;
        self.normalize(raw, now)
    }

    /// `now` stands in for `observed_at` when the alert carries no time.
    pub fn normalize(&self, raw: RawAlert, now: DateTime<Utc>) -> Result<Signal, SignalError> {
        let payload = match raw {
            RawAlert::Text(text) => {
                return Ok(Signal {
                    side: parse_side(&text)?,
                    instrument: self.default_instrument.clone(),
                    price: Decimal::ZERO,
                    observed_at: now,
                    trail_pips: None,
                });
            }
            RawAlert::Structured(payload) => payload,
        };

        let signal_text = match payload.signal {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => {
                return Err(SignalError::Malformed("missing 'signal' field".into()))
            }
            Some(other) => {
                return Err(SignalError::Malformed(format!(
                    "'signal' must be a string, got {other}"
                )))
            }
        };
        let side = parse_side(&signal_text)?;

        let instrument = payload
            .instrument
            .or(payload.ticker)
            .map(|s| canonical_instrument(&s))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.default_instrument.clone());

        let price = match payload.price {
            Some(v) => parse_decimal("price", &v)?.unwrap_or(Decimal::ZERO),
            None => Decimal::ZERO,
        };

        let trail_pips = match payload.trail_pips {
            Some(v) => parse_decimal("trail_pips", &v)?,
            None => None,
        };

        let observed_at = match payload.time {
            Some(v) => parse_time(&v)?.unwrap_or(now),
            None => now,
        };

        Ok(Signal {
            side,
            instrument,
            price,
            observed_at,
            trail_pips,
        })
    }
}

// ─── Field Parsers ────────────────────────────────────────────────────────────

/// Map alert text to a side.
///
/// `"BUY+confirmed"` → `"buy"` → [`Side::Buy`]. Text mentioning both sides is
/// ambiguous and rejected as unknown.
pub fn parse_side(text: &str) -> Result<Side, SignalError> {
    let lowered = text.trim().to_lowercase();
    let base = lowered.split('+').next().unwrap_or("").trim();

    match base {
        "buy" | "anybuy" => return Ok(Side::Buy),
        "sell" | "anysell" => return Ok(Side::Sell),
        _ => {}
    }

    match (base.contains("buy"), base.contains("sell")) {
        (true, false) => Ok(Side::Buy),
        (false, true) => Ok(Side::Sell),
        _ => Err(SignalError::Unknown(text.trim().to_string())),
    }
}

/// `"gbp/jpy"` → `"GBP_JPY"`.
pub fn canonical_instrument(raw: &str) -> String {
    raw.trim()
        .to_ascii_uppercase()
        .chars()
        .map(|c| if c == '/' || c == '-' { '_' } else { c })
        .collect()
}

/// Non-negative decimal from a JSON number or numeric string. Empty strings
/// and nulls read as absent.
fn parse_decimal(field: &str, value: &Value) -> Result<Option<Decimal>, SignalError> {
    let text = match value {
        Value::Null => return Ok(None),
        Value::Number(n) => n.to_string(),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::String(s) => s.trim().to_string(),
        other => {
            return Err(SignalError::Malformed(format!(
                "'{field}' must be numeric, got {other}"
            )))
        }
    };

    let parsed = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| SignalError::Malformed(format!("'{field}' is not a number: '{text}'")))?;

    if parsed.is_sign_negative() && !parsed.is_zero() {
        return Err(SignalError::Malformed(format!(
            "'{field}' must not be negative: {parsed}"
        )));
    }

    Ok(Some(parsed))
}

/// RFC 3339 string, or epoch seconds / milliseconds (number or string).
fn parse_time(value: &Value) -> Result<Option<DateTime<Utc>>, SignalError> {
    let epoch = match value {
        Value::Null => return Ok(None),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s.trim()) {
                return Ok(Some(dt.with_timezone(&Utc)));
            }
            s.trim().parse::<i64>().ok()
        }
        Value::Number(n) => n.as_i64(),
        _ => None,
    };

    let ts = epoch.and_then(|n| {
        if n > EPOCH_MILLIS_THRESHOLD {
            DateTime::from_timestamp_millis(n)
        } else {
            DateTime::from_timestamp(n, 0)
        }
    });

    match ts {
        Some(ts) => Ok(Some(ts)),
        None => Err(SignalError::Malformed(format!("unreadable 'time': {value}"))),
    }
}
