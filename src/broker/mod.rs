//! # broker
//!
//! The [`Broker`] capability the engine depends on. Production uses
//! [`oanda::OandaBroker`]; tests use the recording stub in [`stub`].
//!
//! ## Contract
//! * `open_positions` returns `Err` for any non-2xx answer.
//! * `close_position` / `create_order` return `Ok(BrokerResponse)` for *every*
//!   HTTP answer (including 4xx/5xx) so the raw body stays auditable, and
//!   `Err` only when no usable answer came back.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{OpenPosition, OrderRequest, PositionSide};

pub mod oanda;

#[cfg(test)]
pub mod stub;

// ─── Error ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker unreachable: {0}")]
    Transport(String),

    #[error("broker request timed out: {0}")]
    Timeout(String),

    #[error("broker returned HTTP {status}: {body}")]
    Status { status: u16, body: serde_json::Value },

    #[error("broker response parse error: {0}")]
    Parse(String),
}

impl BrokerError {
    /// Worth retrying: the broker never gave a definitive answer.
    pub fn is_transient(&self) -> bool {
        matches!(self, BrokerError::Transport(_) | BrokerError::Timeout(_))
    }
}

impl From<reqwest::Error> for BrokerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BrokerError::Timeout(err.to_string())
        } else if err.is_decode() {
            BrokerError::Parse(err.to_string())
        } else {
            BrokerError::Transport(err.to_string())
        }
    }
}

// ─── Response ─────────────────────────────────────────────────────────────────

/// One HTTP answer from the broker, with fill details pre-extracted by the
/// implementation so the engine stays broker-agnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerResponse {
    pub status: u16,
    pub body: serde_json::Value,
    pub order_id: Option<String>,
    pub fill_price: Option<Decimal>,
}

impl BrokerResponse {
    pub fn new(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            body,
            order_id: None,
            fill_price: None,
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// ─── Capability ───────────────────────────────────────────────────────────────

#[async_trait]
pub trait Broker: Send + Sync {
    /// Open exposure for `instrument` (empty when flat).
    async fn open_positions(&self, instrument: &str) -> Result<Vec<OpenPosition>, BrokerError>;

    /// Close all units of one side of `instrument`.
    async fn close_position(
        &self,
        instrument: &str,
        side: PositionSide,
    ) -> Result<BrokerResponse, BrokerError>;

    /// Submit a new order.
    async fn create_order(&self, order: &OrderRequest) -> Result<BrokerResponse, BrokerError>;
}
