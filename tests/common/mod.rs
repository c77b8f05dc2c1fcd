// tests/common/mod.rs
// Shared mocks and config scaffolding for the integration suites.
#![allow(dead_code)] // not every suite uses every helper

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use news_gate_trader::broker::{Broker, OrderOutcome, OrderRequest, Quote};
use news_gate_trader::config::BotConfig;
use news_gate_trader::error::{BrokerError, FeedError};
use news_gate_trader::ingest::types::{FeedSource, RawItem};

pub fn test_cfg(seen_path: &Path) -> BotConfig {
    let toml = format!(
        r#"
[[feeds]]
name = "Reuters"
url = "https://example.test/rss"

[[feeds]]
name = "Fed"
url = "https://example.test/fed"

[pipeline]
default_max_age_hours = 12.0
default_min_relevance = 2
sentiment_threshold = 0.15
max_seen_headlines = 100

[gate]
cooldown_secs = 1800
max_concurrent_trades = 3
max_spread = 0.0002

[risk]
risk_usd = 500.0
tp_pips = 38.0
sl_pips = 25.0
default_instrument = "EUR_USD"

[risk.pip_size]
EUR_USD = 0.0001
USD_JPY = 0.01

[risk.precision]
EUR_USD = 5
USD_JPY = 3

[runtime]
interval_secs = 60
seen_path = "{seen}"

[broker]
host = "https://broker.example.test"
account = "test-account"
"#,
        seen = seen_path.display()
    );
    BotConfig::from_toml_str(&toml).expect("test config is valid")
}

/// Scriptable broker double. Defaults are fully permissive; each veto input can
/// be flipped independently. Records every order placement.
pub struct MockBroker {
    pub spread: f64,
    pub pricing_fails: bool,
    pub open_trades: usize,
    pub trades_query_fails: bool,
    pub has_position: bool,
    pub position_query_fails: bool,
    pub reject_orders: bool,
    pub orders: Mutex<Vec<OrderRequest>>,
}

impl Default for MockBroker {
    fn default() -> Self {
        Self {
            spread: 0.0001,
            pricing_fails: false,
            open_trades: 0,
            trades_query_fails: false,
            has_position: false,
            position_query_fails: false,
            reject_orders: false,
            orders: Mutex::new(Vec::new()),
        }
    }
}

impl MockBroker {
    pub fn order_count(&self) -> usize {
        self.orders.lock().unwrap().len()
    }
}

fn query_failed() -> BrokerError {
    BrokerError::Status {
        status: 503,
        body: "unavailable".to_string(),
    }
}

#[async_trait]
impl Broker for MockBroker {
    async fn pricing(&self, _instrument: &str) -> Result<Quote, BrokerError> {
        if self.pricing_fails {
            return Err(query_failed());
        }
        Ok(Quote {
            bid: 1.08620,
            ask: 1.08620 + self.spread,
        })
    }

    async fn open_trade_count(&self) -> Result<usize, BrokerError> {
        if self.trades_query_fails {
            return Err(query_failed());
        }
        Ok(self.open_trades)
    }

    async fn has_open_position(&self, _instrument: &str) -> Result<bool, BrokerError> {
        if self.position_query_fails {
            return Err(query_failed());
        }
        Ok(self.has_position)
    }

    async fn place_market_order(&self, req: &OrderRequest) -> Result<OrderOutcome, BrokerError> {
        self.orders.lock().unwrap().push(req.clone());
        if self.reject_orders {
            Ok(OrderOutcome::Rejected {
                status: 400,
                body: "rejected".to_string(),
            })
        } else {
            Ok(OrderOutcome::Filled {
                order_id: Some("42".to_string()),
                fill_price: Some(1.08630),
            })
        }
    }
}

/// Feed double yielding a fixed set of fresh items.
pub struct MockFeed {
    pub name: String,
    pub items: Vec<RawItem>,
    pub fails: bool,
}

impl MockFeed {
    pub fn with_headline(name: &str, title: &str) -> Self {
        Self {
            name: name.to_string(),
            items: vec![fresh_item(name, title)],
            fails: false,
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            items: Vec::new(),
            fails: true,
        }
    }
}

pub fn fresh_item(source: &str, title: &str) -> RawItem {
    RawItem {
        title: title.to_string(),
        source: source.to_string(),
        guid: format!("guid:{title}"),
        link: format!("https://example.test/{}", title.to_lowercase().replace(' ', "-")),
        published_at: Some(Utc::now() - Duration::hours(1)),
        ts_fallback: false,
    }
}

#[async_trait]
impl FeedSource for MockFeed {
    async fn fetch_latest(&self) -> Result<Vec<RawItem>, FeedError> {
        if self.fails {
            return Err(FeedError::Parse("synthetic failure".to_string()));
        }
        Ok(self.items.clone())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
