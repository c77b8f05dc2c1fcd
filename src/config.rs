// src/config.rs
//! One immutable, validated configuration object built once at startup and passed
//! by reference into every component. No component reads ambient globals.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "config/bot.toml";
pub const ENV_CONFIG_PATH: &str = "NEWS_GATE_CONFIG_PATH";

/// Ranking weight applied to |sentiment| when fused with the relevance score.
/// Fixed by design, not a tunable.
pub const SENTIMENT_WEIGHT: f64 = 10.0;

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    pub feeds: Vec<FeedCfg>,
    pub pipeline: PipelineCfg,
    pub gate: GateCfg,
    pub risk: RiskCfg,
    pub runtime: RuntimeCfg,
    pub broker: BrokerCfg,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedCfg {
    pub name: String,
    pub url: String,
    /// Per-feed override; falls back to `pipeline.default_max_age_hours`.
    #[serde(default)]
    pub max_age_hours: Option<f64>,
    /// Per-feed override; falls back to `pipeline.default_min_relevance`.
    #[serde(default)]
    pub min_relevance: Option<i32>,
    #[serde(default = "default_max_items")]
    pub max_items: usize,
}

fn default_max_items() -> usize {
    20
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineCfg {
    pub default_max_age_hours: f64,
    pub default_min_relevance: i32,
    pub sentiment_threshold: f64,
    pub max_seen_headlines: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct GateCfg {
    pub cooldown_secs: u64,
    pub max_concurrent_trades: usize,
    pub max_spread: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskCfg {
    pub risk_usd: f64,
    pub tp_pips: f64,
    pub sl_pips: f64,
    #[serde(default = "default_min_units")]
    pub min_units: i64,
    pub default_instrument: String,
    /// Pip size per instrument, e.g. EUR_USD -> 0.0001, USD_JPY -> 0.01.
    pub pip_size: HashMap<String, f64>,
    /// Price decimal places per instrument, e.g. EUR_USD -> 5, USD_JPY -> 3.
    pub precision: HashMap<String, u32>,
}

fn default_min_units() -> i64 {
    1000
}

impl RiskCfg {
    /// `None` when the instrument has no configured pip size. Sizing must not
    /// guess: an FX pip applied to a metal produces an absurd order.
    pub fn pip_for(&self, instrument: &str) -> Option<f64> {
        self.pip_size.get(instrument).copied()
    }

    pub fn precision_for(&self, instrument: &str) -> Option<u32> {
        self.precision.get(instrument).copied()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeCfg {
    pub interval_secs: u64,
    /// Floor on the idle gap between cycles, so a slow cycle never collapses it.
    #[serde(default = "default_min_sleep")]
    pub min_sleep_secs: u64,
    pub seen_path: PathBuf,
}

fn default_min_sleep() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerCfg {
    pub host: String,
    pub account: String,
}

impl BotConfig {
    /// Load from `$NEWS_GATE_CONFIG_PATH` or the default path, then validate.
    pub fn load() -> Result<Self> {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::from_path(&path)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: BotConfig = toml::from_str(s).context("parsing bot config TOML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.feeds.is_empty() {
            return Err(anyhow!("config: at least one feed is required"));
        }
        for f in &self.feeds {
            if f.name.trim().is_empty() || f.url.trim().is_empty() {
                return Err(anyhow!("config: feed name and url must be non-empty"));
            }
            if let Some(h) = f.max_age_hours {
                if h <= 0.0 {
                    return Err(anyhow!("config: feed `{}` max_age_hours must be > 0", f.name));
                }
            }
        }
        if self.pipeline.default_max_age_hours <= 0.0 {
            return Err(anyhow!("config: default_max_age_hours must be > 0"));
        }
        // Strictly positive: a zero threshold would let no-signal candidates
        // through to the gate, where a sign test would call them sells.
        if !(self.pipeline.sentiment_threshold > 0.0 && self.pipeline.sentiment_threshold <= 1.0) {
            return Err(anyhow!("config: sentiment_threshold must be in (0, 1]"));
        }
        if self.pipeline.max_seen_headlines == 0 {
            return Err(anyhow!("config: max_seen_headlines must be > 0"));
        }
        if self.gate.max_spread <= 0.0 {
            return Err(anyhow!("config: max_spread must be > 0"));
        }
        if self.risk.risk_usd <= 0.0 || self.risk.sl_pips <= 0.0 || self.risk.tp_pips <= 0.0 {
            return Err(anyhow!("config: risk_usd, tp_pips and sl_pips must be > 0"));
        }
        if !self.risk.pip_size.contains_key(&self.risk.default_instrument) {
            return Err(anyhow!(
                "config: no pip size configured for default instrument `{}`",
                self.risk.default_instrument
            ));
        }
        if !self.risk.precision.contains_key(&self.risk.default_instrument) {
            return Err(anyhow!(
                "config: no precision configured for default instrument `{}`",
                self.risk.default_instrument
            ));
        }
        // Pip size and precision must cover the same instruments; a one-sided
        // entry would stall a classified candidate at the gate for no reason.
        for inst in self.risk.pip_size.keys() {
            if !self.risk.precision.contains_key(inst) {
                return Err(anyhow!("config: instrument `{inst}` has pip_size but no precision"));
            }
        }
        for inst in self.risk.precision.keys() {
            if !self.risk.pip_size.contains_key(inst) {
                return Err(anyhow!("config: instrument `{inst}` has precision but no pip_size"));
            }
        }
        if self.runtime.interval_secs == 0 {
            return Err(anyhow!("config: interval_secs must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) const TEST_TOML: &str = r#"
[[feeds]]
name = "Reuters"
url = "https://example.test/rss"
max_age_hours = 6.0

[[feeds]]
name = "Fed"
url = "https://example.test/fed"
min_relevance = 3

[pipeline]
default_max_age_hours = 12.0
default_min_relevance = 2
sentiment_threshold = 0.15
max_seen_headlines = 500

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
GBP_USD = 0.0001
USD_JPY = 0.01

[risk.precision]
EUR_USD = 5
GBP_USD = 5
USD_JPY = 3

[runtime]
interval_secs = 60
seen_path = "runtime/seen_headlines.json"

[broker]
host = "https://api-fxpractice.example.test"
account = "001-001-0000000-001"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_parses_and_validates() {
        let cfg = BotConfig::from_toml_str(TEST_TOML).expect("valid test config");
        assert_eq!(cfg.feeds.len(), 2);
        assert_eq!(cfg.feeds[0].max_age_hours, Some(6.0));
        assert_eq!(cfg.feeds[1].min_relevance, Some(3));
        assert_eq!(cfg.pipeline.top_k, 5);
        assert_eq!(cfg.risk.min_units, 1000);
        assert_eq!(cfg.risk.pip_for("USD_JPY"), Some(0.01));
        assert_eq!(cfg.risk.precision_for("USD_JPY"), Some(3));
    }

    #[test]
    fn unconfigured_instrument_has_no_pip_or_precision() {
        let cfg = BotConfig::from_toml_str(TEST_TOML).expect("valid test config");
        assert_eq!(cfg.risk.pip_for("XAU_USD"), None);
        assert_eq!(cfg.risk.precision_for("XAU_USD"), None);
    }

    #[test]
    fn rejects_pip_without_matching_precision() {
        let bad = TEST_TOML.replace("[risk.pip_size]", "[risk.pip_size]\nXAU_USD = 0.1");
        assert!(BotConfig::from_toml_str(&bad).is_err());
        let bad = TEST_TOML.replace("[risk.precision]", "[risk.precision]\nXAU_USD = 2");
        assert!(BotConfig::from_toml_str(&bad).is_err());
    }

    #[test]
    fn rejects_zero_sentiment_threshold() {
        let bad = TEST_TOML.replace("sentiment_threshold = 0.15", "sentiment_threshold = 0.0");
        assert!(BotConfig::from_toml_str(&bad).is_err());
    }

    #[test]
    #[serial_test::serial]
    fn load_honors_env_path_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot.toml");
        fs::write(&path, TEST_TOML).unwrap();

        std::env::set_var(ENV_CONFIG_PATH, &path);
        let cfg = BotConfig::load().expect("loads from override path");
        std::env::remove_var(ENV_CONFIG_PATH);

        assert_eq!(cfg.broker.account, "001-001-0000000-001");
    }

    #[test]
    fn rejects_empty_feeds() {
        let bad = TEST_TOML.replacen("[[feeds]]", "[[unused]]", 2);
        assert!(BotConfig::from_toml_str(&bad).is_err());
    }

    #[test]
    fn rejects_out_of_range_sentiment_threshold() {
        let bad = TEST_TOML.replace("sentiment_threshold = 0.15", "sentiment_threshold = 1.5");
        assert!(BotConfig::from_toml_str(&bad).is_err());
    }

    #[test]
    fn rejects_missing_pip_for_default_instrument() {
        let bad = TEST_TOML.replace("default_instrument = \"EUR_USD\"", "default_instrument = \"XAU_USD\"");
        assert!(BotConfig::from_toml_str(&bad).is_err());
    }
}
