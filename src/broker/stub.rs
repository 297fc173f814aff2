//! Scripted, call-recording [`Broker`] for tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;

use crate::broker::{Broker, BrokerError, BrokerResponse};
use crate::models::{OpenPosition, OrderRequest, PositionSide};

#[derive(Debug, Clone, PartialEq)]
pub enum BrokerCall {
    OpenPositions(String),
    Close(String, PositionSide),
    CreateOrder(OrderRequest),
}

pub struct StubBroker {
    positions: Mutex<Option<Vec<OpenPosition>>>,
    close_status: u16,
    query_delay: Duration,
    orders: Mutex<VecDeque<Result<BrokerResponse, BrokerError>>>,
    pub calls: Mutex<Vec<BrokerCall>>,
}

impl StubBroker {
    /// Flat account; every order fills.
    pub fn new() -> Self {
        Self {
            positions: Mutex::new(Some(Vec::new())),
            close_status: 200,
            query_delay: Duration::ZERO,
            orders: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_position(self, instrument: &str, long_units: i64, short_units: i64) -> Self {
        self.push_position(instrument, long_units, short_units, None)
    }

    pub fn with_position_pl(
        self,
        instrument: &str,
        long_units: i64,
        short_units: i64,
        unrealized_pl: Decimal,
    ) -> Self {
        self.push_position(instrument, long_units, short_units, Some(unrealized_pl))
    }

    fn push_position(
        self,
        instrument: &str,
        long_units: i64,
        short_units: i64,
        unrealized_pl: Option<Decimal>,
    ) -> Self {
        self.positions.lock().unwrap().get_or_insert_with(Vec::new).push(OpenPosition {
            instrument: instrument.to_string(),
            long_units,
            short_units,
            unrealized_pl,
        });
        self
    }

    /// Position queries take `delay` before answering.
    pub fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = delay;
        self
    }

    /// Position queries answer HTTP 503.
    pub fn with_failing_query(self) -> Self {
        *self.positions.lock().unwrap() = None;
        self
    }

    pub fn with_close_status(mut self, status: u16) -> Self {
        self.close_status = status;
        self
    }

    /// Queue answers for successive `create_order` calls; once drained,
    /// orders fill.
    pub fn with_order_script(self, script: Vec<Result<BrokerResponse, BrokerError>>) -> Self {
        self.orders.lock().unwrap().extend(script);
        self
    }

    pub fn calls(&self) -> Vec<BrokerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn close_calls(&self) -> Vec<(String, PositionSide)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                BrokerCall::Close(instrument, side) => Some((instrument, side)),
                _ => None,
            })
            .collect()
    }

    pub fn order_calls(&self) -> Vec<OrderRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                BrokerCall::CreateOrder(order) => Some(order),
                _ => None,
            })
            .collect()
    }
}

pub fn filled(order_id: &str, price: &str) -> BrokerResponse {
    let mut response = BrokerResponse::new(
        201,
        json!({ "orderFillTransaction": { "id": order_id, "price": price } }),
    );
    response.order_id = Some(order_id.to_string());
    response.fill_price = price.parse().ok();
    response
}

pub fn rejected(status: u16) -> BrokerResponse {
    BrokerResponse::new(status, json!({ "errorMessage": "rejected by stub" }))
}

#[async_trait]
impl Broker for StubBroker {
    async fn open_positions(&self, instrument: &str) -> Result<Vec<OpenPosition>, BrokerError> {
        self.calls
            .lock()
            .unwrap()
            .push(BrokerCall::OpenPositions(instrument.to_string()));

        if !self.query_delay.is_zero() {
            tokio::time::sleep(self.query_delay).await;
        }

        match self.positions.lock().unwrap().as_ref() {
            Some(all) => Ok(all
                .iter()
                .filter(|p| p.instrument == instrument)
                .cloned()
                .collect()),
            None => Err(BrokerError::Status {
                status: 503,
                body: json!({ "errorMessage": "service unavailable" }),
            }),
        }
    }

    async fn close_position(
        &self,
        instrument: &str,
        side: PositionSide,
    ) -> Result<BrokerResponse, BrokerError> {
        self.calls
            .lock()
            .unwrap()
            .push(BrokerCall::Close(instrument.to_string(), side));
        Ok(BrokerResponse::new(self.close_status, json!({ "closed": true })))
    }

    async fn create_order(&self, order: &OrderRequest) -> Result<BrokerResponse, BrokerError> {
        self.calls
            .lock()
            .unwrap()
            .push(BrokerCall::CreateOrder(order.clone()));

        let scripted = self.orders.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(filled("1001", "150.010")))
    }
}
