//! # config: read configuration from environment variables
//!
//! `.env` is loaded by `main` through `dotenvy` before [`Config::from_env`]
//! runs. Everything has a default except the broker credential and account,
//! which are fatal when missing.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::broker::oanda::{LIVE_URL, PRACTICE_URL};
use crate::engine::dedup::DedupKeyMode;
use crate::engine::normalizer::UnknownSignalPolicy;
use crate::engine::reconciler::ReconcileFailurePolicy;
use crate::engine::risk::{InstrumentSpec, PipTable, RiskMode};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

// ─── Sections ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct BrokerConfig {
    pub access_token: String,
    pub account_id: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("access_token", &"<redacted>")
            .field("account_id", &self.account_id)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Everything the execution engine is parameterized by.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub default_instrument: String,
    pub trade_units: u64,
    pub dedup_cooldown: Duration,
    pub dedup_key_mode: DedupKeyMode,
    pub dedup_price_dp: u32,
    pub dedup_evict_factor: u32,
    pub default_trail_pips: Decimal,
    pub risk_mode: RiskMode,
    pub pip_table: PipTable,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub settle_delay: Duration,
    pub reconcile_on_failure: ReconcileFailurePolicy,
    pub unknown_signal: UnknownSignalPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_instrument: "GBP_JPY".into(),
            trade_units: 1000,
            dedup_cooldown: Duration::from_secs(60),
            dedup_key_mode: DedupKeyMode::Side,
            dedup_price_dp: 2,
            dedup_evict_factor: 5,
            default_trail_pips: Decimal::from(20),
            risk_mode: RiskMode::TrailingStop,
            pip_table: PipTable::default(),
            max_attempts: 3,
            retry_delay: Duration::from_secs(1),
            settle_delay: Duration::from_millis(300),
            reconcile_on_failure: ReconcileFailurePolicy::Proceed,
            unknown_signal: UnknownSignalPolicy::Ignore,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotionConfig {
    pub api_key: String,
    pub database_id: String,
}

#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub csv_path: Option<PathBuf>,
    pub notion: Option<NotionConfig>,
    pub history_size: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            csv_path: None,
            notion: None,
            history_size: 200,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// When set, inbound alerts must present it.
    pub webhook_token: Option<String>,
    pub broker: BrokerConfig,
    pub engine: EngineConfig,
    pub audit: AuditConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any `key → value` source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);
        let defaults = EngineConfig::default();

        // ── Broker ────────────────────────────────────────────────────────────
        let access_token = vars
            .first_of(&["OANDA_ACCESS_TOKEN", "ACCESS_TOKEN"])
            .ok_or(ConfigError::Missing("OANDA_ACCESS_TOKEN"))?;
        let account_id = vars
            .first_of(&["OANDA_ACCOUNT_ID", "ACCOUNT_ID"])
            .ok_or(ConfigError::Missing("OANDA_ACCOUNT_ID"))?;

        let base_url = match vars.get("OANDA_BASE_URL") {
            Some(url) => url,
            None => match vars.get("OANDA_ENV").as_deref().unwrap_or("practice") {
                "practice" => PRACTICE_URL.to_string(),
                "live" => LIVE_URL.to_string(),
                other => {
                    return Err(ConfigError::Invalid {
                        var: "OANDA_ENV",
                        value: other.to_string(),
                        reason: "expected 'practice' or 'live'".into(),
                    })
                }
            },
        };

        let broker = BrokerConfig {
            access_token,
            account_id,
            base_url,
            timeout: Duration::from_secs(vars.parse_or("BROKER_TIMEOUT_SECS", 10u64)?),
        };

        // ── Engine ────────────────────────────────────────────────────────────
        let fallback = InstrumentSpec {
            pip_size: vars.parse_or("PIP_SIZE_DEFAULT", Decimal::new(1, 4))?,
            precision: vars.parse_or("PRICE_PRECISION_DEFAULT", 5u32)?,
        };
        let mut pip_table = PipTable::new(fallback);
        if let Some(raw) = vars.get("PIP_TABLE") {
            let overrides = PipTable::parse_overrides(&raw).map_err(|reason| ConfigError::Invalid {
                var: "PIP_TABLE",
                value: raw.clone(),
                reason,
            })?;
            for (instrument, spec) in overrides {
                pip_table = pip_table.with_entry(&instrument, spec);
            }
        }

        let engine = EngineConfig {
            default_instrument: vars
                .get("DEFAULT_INSTRUMENT")
                .unwrap_or(defaults.default_instrument),
            trade_units: vars.parse_or("TRADE_UNITS", defaults.trade_units)?,
            dedup_cooldown: Duration::from_secs(vars.parse_or("DEDUP_COOLDOWN_SECS", 60u64)?),
            dedup_key_mode: vars.parse_or("DEDUP_KEY_MODE", defaults.dedup_key_mode)?,
            dedup_price_dp: vars.parse_or("DEDUP_PRICE_DP", defaults.dedup_price_dp)?,
            dedup_evict_factor: vars.parse_or("DEDUP_EVICT_FACTOR", defaults.dedup_evict_factor)?,
            default_trail_pips: vars.parse_or("DEFAULT_TRAIL_PIPS", defaults.default_trail_pips)?,
            risk_mode: vars.parse_or("RISK_MODE", defaults.risk_mode)?,
            pip_table,
            max_attempts: vars.parse_or("ORDER_MAX_ATTEMPTS", defaults.max_attempts)?,
            retry_delay: Duration::from_millis(vars.parse_or("ORDER_RETRY_DELAY_MS", 1000u64)?),
            settle_delay: Duration::from_millis(vars.parse_or("RECONCILE_SETTLE_MS", 300u64)?),
            reconcile_on_failure: vars
                .parse_or("RECONCILE_ON_FAILURE", defaults.reconcile_on_failure)?,
            unknown_signal: vars.parse_or("UNKNOWN_SIGNAL_POLICY", defaults.unknown_signal)?,
        };

        if engine.trade_units == 0 {
            return Err(ConfigError::Invalid {
                var: "TRADE_UNITS",
                value: "0".into(),
                reason: "must be positive".into(),
            });
        }
        if engine.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: "ORDER_MAX_ATTEMPTS",
                value: "0".into(),
                reason: "at least one attempt is required".into(),
            });
        }

        // ── Audit ─────────────────────────────────────────────────────────────
        let notion = match (vars.get("NOTION_API_KEY"), vars.get("NOTION_DATABASE_ID")) {
            (Some(api_key), Some(database_id)) => Some(NotionConfig {
                api_key,
                database_id,
            }),
            _ => None,
        };

        let audit = AuditConfig {
            csv_path: vars.get("AUDIT_CSV_PATH").map(PathBuf::from),
            notion,
            history_size: vars.parse_or("AUDIT_HISTORY_SIZE", 200usize)?,
        };

        Ok(Self {
            bind_addr: vars.parse_or("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?,
            webhook_token: vars.get("WEBHOOK_TOKEN"),
            broker,
            engine,
            audit,
        })
    }
}

// ─── Lookup Helpers ───────────────────────────────────────────────────────────

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed, non-empty value.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn first_of(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| self.get(k))
    }

    fn parse_or<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
                var: key,
                value: raw.clone(),
                reason: e.to_string(),
            }),
        }
    }
}
