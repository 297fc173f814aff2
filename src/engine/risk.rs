//! # engine::risk
//!
//! **Risk Calculator**: converts pip widths into price distances and stop
//! prices for a given instrument, and builds the risk attachment of an order.
//!
//! | Quote currency | Pip size | Quoted precision |
//! |----------------|----------|------------------|
//! | JPY            | 0.01     | 3 decimals       |
//! | most others    | 0.0001   | 5 decimals       |
//!
//! Everything here is pure: no I/O, no shared state.

use std::collections::HashMap;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

use crate::models::{RiskSpec, Side, Signal};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskError {
    #[error("invalid risk parameter: {0}")]
    InvalidRiskParameter(String),
}

// ─── Pip Table ────────────────────────────────────────────────────────────────

/// Pip size and number of decimals the broker quotes for one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstrumentSpec {
    pub pip_size: Decimal,
    pub precision: u32,
}

const JPY: InstrumentSpec = InstrumentSpec {
    pip_size: Decimal::from_parts(1, 0, 0, false, 2),
    precision: 3,
};

const MAJOR: InstrumentSpec = InstrumentSpec {
    pip_size: Decimal::from_parts(1, 0, 0, false, 4),
    precision: 5,
};

const BUILTIN: &[(&str, InstrumentSpec)] = &[
    ("USD_JPY", JPY),
    ("EUR_JPY", JPY),
    ("GBP_JPY", JPY),
    ("AUD_JPY", JPY),
    ("NZD_JPY", JPY),
    ("CAD_JPY", JPY),
    ("CHF_JPY", JPY),
    ("EUR_USD", MAJOR),
    ("GBP_USD", MAJOR),
    ("AUD_USD", MAJOR),
    ("NZD_USD", MAJOR),
    ("USD_CAD", MAJOR),
    ("USD_CHF", MAJOR),
    ("EUR_GBP", MAJOR),
    ("EUR_CHF", MAJOR),
    ("EUR_AUD", MAJOR),
    ("GBP_AUD", MAJOR),
];

/// Static `instrument → spec` map, built once at startup.
#[derive(Debug, Clone)]
pub struct PipTable {
    entries: HashMap<String, InstrumentSpec>,
    fallback: InstrumentSpec,
}

impl PipTable {
    /// Built-in majors and JPY crosses, with `fallback` for anything else.
    pub fn new(fallback: InstrumentSpec) -> Self {
        let entries = BUILTIN
            .iter()
            .map(|(name, spec)| ((*name).to_string(), *spec))
            .collect();
        Self { entries, fallback }
    }

    pub fn with_entry(mut self, instrument: &str, spec: InstrumentSpec) -> Self {
        self.entries.insert(instrument.to_string(), spec);
        self
    }

    pub fn spec(&self, instrument: &str) -> InstrumentSpec {
        self.entries.get(instrument).copied().unwrap_or(self.fallback)
    }

    /// Parse `"XAU_USD=0.01:2,EUR_USD=0.0001"` overrides. Precision defaults to
    /// one more decimal than the pip size.
    pub fn parse_overrides(raw: &str) -> Result<Vec<(String, InstrumentSpec)>, String> {
        raw.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| {
                let (name, value) = item
                    .split_once('=')
                    .ok_or_else(|| format!("expected INSTRUMENT=PIP[:DP], got '{item}'"))?;
                let (pip, dp) = match value.split_once(':') {
                    Some((pip, dp)) => (pip, Some(dp)),
                    None => (value, None),
                };
                let pip_size = Decimal::from_str(pip.trim())
                    .map_err(|_| format!("bad pip size '{pip}' for {name}"))?;
                if pip_size <= Decimal::ZERO {
                    return Err(format!("pip size for {name} must be positive"));
                }
                let precision = match dp {
                    Some(dp) => dp
                        .trim()
                        .parse::<u32>()
                        .map_err(|_| format!("bad precision '{dp}' for {name}"))?,
                    None => pip_size.scale() + 1,
                };
                Ok((
                    name.trim().to_ascii_uppercase(),
                    InstrumentSpec { pip_size, precision },
                ))
            })
            .collect()
    }
}

impl Default for PipTable {
    fn default() -> Self {
        Self::new(MAJOR)
    }
}

// ─── Risk Mode ────────────────────────────────────────────────────────────────

/// Which risk attachment every new order carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RiskMode {
    #[default]
    TrailingStop,
    /// Fixed stop price computed from the alert price; needs a non-zero price.
    StopLoss,
    /// Stop distance from the fill, computed by the broker.
    StopDistance,
    None,
}

impl FromStr for RiskMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trailing" | "trailing_stop" => Ok(Self::TrailingStop),
            "stop_loss" | "stoploss" => Ok(Self::StopLoss),
            "stop_distance" => Ok(Self::StopDistance),
            "none" => Ok(Self::None),
            other => Err(format!(
                "expected trailing | stop_loss | stop_distance | none, got '{other}'"
            )),
        }
    }
}

// ─── Calculator ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct RiskCalculator {
    table: PipTable,
}

impl RiskCalculator {
    pub fn new(table: PipTable) -> Self {
        Self { table }
    }

    pub fn pip_size(&self, instrument: &str) -> Decimal {
        self.table.spec(instrument).pip_size
    }

    /// `pips × pip_size`, rounded to the instrument's quoted precision.
    pub fn trailing_distance(&self, instrument: &str, pips: Decimal) -> Result<Decimal, RiskError> {
        check_pips(pips)?;
        let spec = self.table.spec(instrument);
        Ok(round_to(pips * spec.pip_size, spec.precision))
    }

    /// Stop price `pips` away from `entry`, on the losing side of `side`.
    pub fn stop_loss_price(
        &self,
        instrument: &str,
        entry: Decimal,
        side: Side,
        pips: Decimal,
    ) -> Result<Decimal, RiskError> {
        check_pips(pips)?;
        if entry <= Decimal::ZERO {
            return Err(RiskError::InvalidRiskParameter(format!(
                "entry price must be positive, got {entry}"
            )));
        }

        let spec = self.table.spec(instrument);
        let delta = pips * spec.pip_size;
        let stop = match side {
            Side::Buy => entry - delta,
            Side::Sell => entry + delta,
        };

        if stop <= Decimal::ZERO {
            return Err(RiskError::InvalidRiskParameter(format!(
                "stop of {pips} pips below {entry} crosses zero"
            )));
        }

        Ok(round_to(stop, spec.precision))
    }

    /// Risk attachment for `signal` under `mode`. Uses the alert's own
    /// `trail_pips` when present.
    pub fn risk_spec(
        &self,
        signal: &Signal,
        mode: RiskMode,
        default_pips: Decimal,
    ) -> Result<RiskSpec, RiskError> {
        let pips = signal.trail_pips.unwrap_or(default_pips);
        let spec = match mode {
            RiskMode::TrailingStop => RiskSpec::TrailingStop {
                distance: self.trailing_distance(&signal.instrument, pips)?,
            },
            RiskMode::StopDistance => RiskSpec::StopDistance {
                distance: self.trailing_distance(&signal.instrument, pips)?,
            },
            RiskMode::StopLoss => RiskSpec::StopLoss {
                price: self.stop_loss_price(&signal.instrument, signal.price, signal.side, pips)?,
            },
            RiskMode::None => RiskSpec::None,
        };
        Ok(spec)
    }
}

fn check_pips(pips: Decimal) -> Result<(), RiskError> {
    if pips.is_sign_negative() && !pips.is_zero() {
        return Err(RiskError::InvalidRiskParameter(format!(
            "pip width must not be negative, got {pips}"
        )));
    }
    Ok(())
}

#[inline]
fn round_to(value: Decimal, precision: u32) -> Decimal {
    value.round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero)
}
