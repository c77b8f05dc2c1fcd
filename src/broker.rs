// src/broker.rs
//! Broker collaborator as seen by the execution gate: market data, open
//! trade/position queries, and market-order placement. The gate depends only on
//! the [`Broker`] trait; [`RestBroker`] is a thin v20-style REST client with
//! exponential backoff on transient statuses.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::error::BrokerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
}

impl Quote {
    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub instrument: String,
    /// Signed units: positive buys, negative sells.
    pub units: i64,
    pub take_profit: f64,
    pub stop_loss: f64,
    /// Price decimal places for this instrument's wire format.
    pub precision: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderOutcome {
    Filled {
        order_id: Option<String>,
        fill_price: Option<f64>,
    },
    Rejected {
        status: u16,
        body: String,
    },
}

#[async_trait]
pub trait Broker: Send + Sync {
    async fn pricing(&self, instrument: &str) -> Result<Quote, BrokerError>;
    async fn open_trade_count(&self) -> Result<usize, BrokerError>;
    async fn has_open_position(&self, instrument: &str) -> Result<bool, BrokerError>;
    async fn place_market_order(&self, req: &OrderRequest) -> Result<OrderOutcome, BrokerError>;
}

/// Fixed-point price formatting per instrument precision.
pub fn fmt_price(x: f64, precision: u32) -> String {
    format!("{:.*}", precision as usize, x)
}

const RETRY_STATUSES: &[u16] = &[429, 500, 502, 503, 504];
const MAX_ATTEMPTS: u32 = 4;

pub struct RestBroker {
    api: String,
    account: String,
    token: String,
    client: reqwest::Client,
}

impl RestBroker {
    pub fn new(host: &str, account: &str, token: &str) -> Self {
        Self {
            api: format!("{}/v3", host.trim_end_matches('/')),
            account: account.to_string(),
            token: token.to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(20))
                .build()
                .unwrap_or_default(),
        }
    }

    /// GET with backoff on transient statuses: 0.5s, 1s, 2s between attempts.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, BrokerError> {
        let url = format!("{}{}", self.api, path);
        let mut last_status = 0u16;
        let mut last_body = String::new();
        for attempt in 0..MAX_ATTEMPTS {
            let resp = self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .query(query)
                .send()
                .await?;
            let status = resp.status().as_u16();
            if resp.status().is_success() {
                return resp
                    .json::<T>()
                    .await
                    .map_err(|e| BrokerError::Decode(e.to_string()));
            }
            let body = resp.text().await.unwrap_or_default();
            if !RETRY_STATUSES.contains(&status) {
                return Err(BrokerError::Status { status, body });
            }
            last_status = status;
            last_body = body;
            tokio::time::sleep(backoff(attempt)).await;
        }
        Err(BrokerError::Status {
            status: last_status,
            body: last_body,
        })
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(500 * 2u64.pow(attempt))
}

#[derive(Debug, Deserialize)]
struct PricingResponse {
    prices: Vec<PriceEntry>,
}

#[derive(Debug, Deserialize)]
struct PriceEntry {
    bids: Vec<PricePoint>,
    asks: Vec<PricePoint>,
}

#[derive(Debug, Deserialize)]
struct PricePoint {
    price: String,
}

#[derive(Debug, Deserialize)]
struct TradesResponse {
    #[serde(default)]
    trades: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct PositionsResponse {
    #[serde(default)]
    positions: Vec<PositionEntry>,
}

#[derive(Debug, Deserialize)]
struct PositionEntry {
    instrument: String,
    long: PositionSide,
    short: PositionSide,
}

#[derive(Debug, Deserialize)]
struct PositionSide {
    units: String,
}

#[async_trait]
impl Broker for RestBroker {
    async fn pricing(&self, instrument: &str) -> Result<Quote, BrokerError> {
        let resp: PricingResponse = self
            .get_json(
                &format!("/accounts/{}/pricing", self.account),
                &[("instruments", instrument)],
            )
            .await?;
        let entry = resp
            .prices
            .first()
            .ok_or_else(|| BrokerError::Decode("empty prices array".into()))?;
        let bid = entry
            .bids
            .first()
            .and_then(|p| p.price.parse::<f64>().ok())
            .ok_or_else(|| BrokerError::Decode("missing bid".into()))?;
        let ask = entry
            .asks
            .first()
            .and_then(|p| p.price.parse::<f64>().ok())
            .ok_or_else(|| BrokerError::Decode("missing ask".into()))?;
        Ok(Quote { bid, ask })
    }

    async fn open_trade_count(&self) -> Result<usize, BrokerError> {
        let resp: TradesResponse = self
            .get_json(&format!("/accounts/{}/trades", self.account), &[])
            .await?;
        Ok(resp.trades.len())
    }

    async fn has_open_position(&self, instrument: &str) -> Result<bool, BrokerError> {
        let resp: PositionsResponse = self
            .get_json(&format!("/accounts/{}/openPositions", self.account), &[])
            .await?;
        for p in resp.positions {
            if p.instrument == instrument {
                let long: i64 = p.long.units.parse().unwrap_or(0);
                let short: i64 = p.short.units.parse().unwrap_or(0);
                return Ok(long != 0 || short != 0);
            }
        }
        Ok(false)
    }

    async fn place_market_order(&self, req: &OrderRequest) -> Result<OrderOutcome, BrokerError> {
        let body = json!({
            "order": {
                "type": "MARKET",
                "instrument": req.instrument,
                "units": req.units.to_string(),
                "timeInForce": "FOK",
                "positionFill": "DEFAULT",
                "takeProfitOnFill": { "price": fmt_price(req.take_profit, req.precision), "timeInForce": "GTC" },
                "stopLossOnFill": { "price": fmt_price(req.stop_loss, req.precision), "timeInForce": "GTC" },
            }
        });

        let url = format!("{}/accounts/{}/orders", self.api, self.account);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        if !(status == 200 || status == 201) {
            return Ok(OrderOutcome::Rejected { status, body: text });
        }

        // Best effort: pull order id / fill price out of the transaction shapes.
        let mut order_id = None;
        let mut fill_price = None;
        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(v) => {
                if let Some(fill) = v.get("orderFillTransaction") {
                    order_id = fill
                        .get("orderID")
                        .and_then(|x| x.as_str())
                        .map(String::from);
                    fill_price = fill
                        .get("price")
                        .and_then(|x| x.as_str())
                        .and_then(|s| s.parse::<f64>().ok());
                } else if let Some(create) = v.get("orderCreateTransaction") {
                    order_id = create.get("id").and_then(|x| x.as_str()).map(String::from);
                }
            }
            Err(e) => warn!(error = %e, "order accepted but response body not parseable"),
        }

        Ok(OrderOutcome::Filled {
            order_id,
            fill_price,
        })
    }
}
