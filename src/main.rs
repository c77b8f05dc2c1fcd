//! News-gated trading loop — binary entrypoint.
//! Loads the immutable config, initializes tracing and the metrics exporter,
//! and hands off to the polling loop.

use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use news_gate_trader::config::BotConfig;
use news_gate_trader::cycle;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("news_gate_trader=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

/// Prometheus exporter on its own listener; failure to bind is non-fatal.
fn init_metrics() {
    if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new().install() {
        warn!(error = %e, "metrics exporter not installed; continuing without it");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();

    init_tracing();
    init_metrics();

    let cfg = BotConfig::load()?;
    cycle::run(cfg).await
}
