//! # broker::oanda
//!
//! [`Broker`] implementation for the OANDA v3 REST API.
//!
//! | Operation        | Request                                                 |
//! |------------------|---------------------------------------------------------|
//! | open positions   | `GET  /v3/accounts/{id}/openPositions`                  |
//! | close one side   | `PUT  /v3/accounts/{id}/positions/{instrument}/close`   |
//! | create order     | `POST /v3/accounts/{id}/orders`                         |
//!
//! Every call carries `Authorization: Bearer <token>` and the client-wide
//! timeout from [`BrokerConfig`].

use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::broker::{Broker, BrokerError, BrokerResponse};
use crate::config::BrokerConfig;
use crate::models::{OpenPosition, OrderRequest, OrderType, PositionSide, RiskSpec};

pub const PRACTICE_URL: &str = "https://api-fxpractice.oanda.com";
pub const LIVE_URL: &str = "https://api-fxtrade.oanda.com";

// ─── Wire Types ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PositionsEnvelope {
    #[serde(default)]
    positions: Vec<WirePosition>,
}

#[derive(Debug, Deserialize)]
struct WirePosition {
    instrument: String,
    #[serde(default)]
    long: Option<WireSide>,
    #[serde(default)]
    short: Option<WireSide>,
    #[serde(default, rename = "unrealizedPL")]
    unrealized_pl: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireSide {
    units: String,
}

// ─── Client ───────────────────────────────────────────────────────────────────

pub struct OandaBroker {
    client: reqwest::Client,
    base_url: String,
    account_id: String,
    access_token: String,
}

impl OandaBroker {
    pub fn new(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BrokerError::Transport(format!("HTTP client init failed: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            account_id: config.account_id.clone(),
            access_token: config.access_token.clone(),
        })
    }

    fn account_url(&self, path: &str) -> String {
        format!("{}/v3/accounts/{}/{}", self.base_url, self.account_id, path)
    }

    /// Send with auth and turn whatever comes back into a [`BrokerResponse`].
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<BrokerResponse, BrokerError> {
        let response = request
            .bearer_auth(&self.access_token)
            .header("Accept-Datetime-Format", "RFC3339")
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        let body = serde_json::from_str::<Value>(&text).unwrap_or_else(|_| json!({ "raw": text }));

        Ok(BrokerResponse::new(status, body))
    }
}

#[async_trait]
impl Broker for OandaBroker {
    async fn open_positions(&self, instrument: &str) -> Result<Vec<OpenPosition>, BrokerError> {
        let url = self.account_url("openPositions");
        let response = self.send(self.client.get(&url)).await?;

        if !response.is_success() {
            return Err(BrokerError::Status {
                status: response.status,
                body: response.body,
            });
        }

        let positions = parse_positions(&response.body, instrument)?;
        debug!(instrument, count = positions.len(), "OANDA: open positions fetched");
        Ok(positions)
    }

    async fn close_position(
        &self,
        instrument: &str,
        side: PositionSide,
    ) -> Result<BrokerResponse, BrokerError> {
        let url = self.account_url(&format!("positions/{instrument}/close"));
        let body = close_body(side);

        info!(instrument, side = ?side, "OANDA: closing position");
        let response = self.send(self.client.put(&url).json(&body)).await?;

        if !response.is_success() {
            warn!(instrument, status = response.status, body = %response.body, "OANDA: close rejected");
        }
        Ok(response)
    }

    async fn create_order(&self, order: &OrderRequest) -> Result<BrokerResponse, BrokerError> {
        let url = self.account_url("orders");
        let body = order_body(order);

        info!(
            instrument = %order.instrument,
            units      = order.units,
            risk       = ?order.risk,
            "OANDA: submitting order"
        );
        let mut response = self.send(self.client.post(&url).json(&body)).await?;

        let (order_id, fill_price) = fill_details(&response.body);
        response.order_id = order_id;
        response.fill_price = fill_price;
        Ok(response)
    }
}

// ─── Wire Mapping ─────────────────────────────────────────────────────────────

/// JSON body for `POST /orders`.
pub fn order_body(order: &OrderRequest) -> Value {
    let order_type = match order.order_type {
        OrderType::Market => "MARKET",
    };

    let mut inner = json!({
        "type":         order_type,
        "instrument":   order.instrument,
        "units":        order.units.to_string(),
        "timeInForce":  "FOK",
        "positionFill": "DEFAULT",
    });

    let attachment = match &order.risk {
        RiskSpec::StopLoss { price } => Some(("stopLossOnFill", json!({ "price": price.to_string() }))),
        RiskSpec::StopDistance { distance } => {
            Some(("stopLossOnFill", json!({ "distance": distance.to_string() })))
        }
        RiskSpec::TrailingStop { distance } => {
            Some(("trailingStopLossOnFill", json!({ "distance": distance.to_string() })))
        }
        RiskSpec::None => None,
    };

    if let (Some((key, value)), Some(map)) = (attachment, inner.as_object_mut()) {
        map.insert(key.to_string(), value);
    }

    json!({ "order": inner })
}

fn close_body(side: PositionSide) -> Value {
    match side {
        PositionSide::Long => json!({ "longUnits": "ALL" }),
        PositionSide::Short => json!({ "shortUnits": "ALL" }),
    }
}

/// Positions for `instrument` out of an `openPositions` body.
fn parse_positions(body: &Value, instrument: &str) -> Result<Vec<OpenPosition>, BrokerError> {
    let envelope: PositionsEnvelope = serde_json::from_value(body.clone())
        .map_err(|e| BrokerError::Parse(format!("openPositions: {e}")))?;

    envelope
        .positions
        .into_iter()
        .filter(|p| p.instrument == instrument)
        .map(|p| {
            let long_units = side_units(p.long.as_ref())?.max(0);
            let short_units = side_units(p.short.as_ref())?.min(0);
            let unrealized_pl = p
                .unrealized_pl
                .as_deref()
                .and_then(|s| Decimal::from_str(s).ok());
            Ok(OpenPosition {
                instrument: p.instrument,
                long_units,
                short_units,
                unrealized_pl,
            })
        })
        .collect()
}

fn side_units(side: Option<&WireSide>) -> Result<i64, BrokerError> {
    let Some(side) = side else { return Ok(0) };
    Decimal::from_str(&side.units)
        .ok()
        .and_then(|d| d.trunc().to_i64())
        .ok_or_else(|| BrokerError::Parse(format!("bad units '{}'", side.units)))
}

/// Order id and price from `orderFillTransaction`, when the order filled.
fn fill_details(body: &Value) -> (Option<String>, Option<Decimal>) {
    let Some(fill) = body.get("orderFillTransaction") else {
        return (None, None);
    };
    let order_id = fill.get("id").and_then(Value::as_str).map(str::to_string);
    let fill_price = fill
        .get("price")
        .and_then(Value::as_str)
        .and_then(|s| Decimal::from_str(s).ok());
    (order_id, fill_price)
}
