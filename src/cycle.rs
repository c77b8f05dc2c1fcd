// src/cycle.rs
//! Per-cycle orchestration and the fixed-interval polling loop. One cycle runs
//! to completion before the next begins; all feed sources are drained before
//! ranking, and ranking finishes before any broker query.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::info;

use crate::broker::{Broker, Side};
use crate::config::BotConfig;
use crate::dedup::{SeenSet, SeenStore};
use crate::gate::{ExecutionGate, GateDenial, GateOutcome, GateState};
use crate::ingest::{self, types::FeedSource};
use crate::rank;
use crate::sentiment::SentimentScorer;

#[derive(Debug)]
pub enum CycleOutcome {
    /// Nothing survived the filters, or everything was seen/flat.
    NoCandidate,
    Denied(GateDenial),
    Executed { instrument: String, side: Side },
    OrderRejected,
}

pub struct Pipeline {
    cfg: BotConfig,
    sources: Vec<Box<dyn FeedSource>>,
    scorer: Box<dyn SentimentScorer>,
    broker: Box<dyn Broker>,
    store: SeenStore,
    seen: SeenSet,
    state: GateState,
}

impl Pipeline {
    /// Loads the seen-set once at construction; a missing or corrupt record
    /// degrades to an empty set rather than refusing to start.
    pub fn new(
        cfg: BotConfig,
        sources: Vec<Box<dyn FeedSource>>,
        scorer: Box<dyn SentimentScorer>,
        broker: Box<dyn Broker>,
    ) -> Self {
        let store = SeenStore::new(
            cfg.runtime.seen_path.clone(),
            cfg.pipeline.max_seen_headlines,
        );
        let seen = store.load();
        Self {
            cfg,
            sources,
            scorer,
            broker,
            store,
            seen,
            state: GateState::default(),
        }
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    /// One full pass: fetch -> filter -> rank -> gate.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleOutcome {
        let (candidates, stats) = ingest::run_once(&self.sources, &self.cfg, now).await;
        info!(
            fetched = stats.fetched,
            kept = candidates.len(),
            no_timestamp = stats.no_timestamp,
            too_old = stats.too_old,
            low_relevance = stats.low_relevance,
            duplicate_url = stats.duplicate_url,
            source_errors = stats.source_errors,
            "ingest pass complete"
        );

        let ranking = rank::rank(
            candidates,
            &self.seen,
            self.scorer.as_ref(),
            self.cfg.pipeline.sentiment_threshold,
            self.cfg.pipeline.top_k,
        );
        for (i, rc) in ranking.slate.iter().enumerate() {
            info!(
                rank = i + 1,
                combined = rc.combined,
                relevance = rc.candidate.relevance,
                sentiment = rc.sentiment,
                instrument = %rc.candidate.instrument,
                title = %ingest::excerpt(&rc.candidate.item.title),
                "ranked candidate"
            );
        }

        let Some(top) = ranking.top else {
            info!(
                skipped_seen = ranking.skipped_seen,
                skipped_flat = ranking.skipped_flat,
                "no actionable candidate this cycle"
            );
            return CycleOutcome::NoCandidate;
        };

        let gate = ExecutionGate::new(&self.cfg, &self.store);
        let seen = std::mem::replace(&mut self.seen, SeenSet::empty(0));
        let (seen, outcome) = gate
            .try_execute(&top, seen, &mut self.state, self.broker.as_ref(), now)
            .await;
        self.seen = seen;

        match outcome {
            GateOutcome::Denied(d) => CycleOutcome::Denied(d),
            GateOutcome::Executed { side, order, order_id, fill_price } => {
                info!(
                    side = side.as_str(),
                    instrument = %order.instrument,
                    units = order.units,
                    order_id = order_id.as_deref().unwrap_or("-"),
                    fill_price = fill_price.unwrap_or_default(),
                    "order confirmed"
                );
                CycleOutcome::Executed {
                    instrument: order.instrument,
                    side,
                }
            }
            GateOutcome::OrderRejected { status } => {
                info!(status, "order rejected, will retry while the headline stays fresh");
                CycleOutcome::OrderRejected
            }
        }
    }

    /// Poll forever. The idle gap is measured from cycle start, so a slow cycle
    /// shortens the gap, floored at `min_sleep_secs` so it never hits zero.
    pub async fn run_loop(mut self) {
        let interval = Duration::from_secs(self.cfg.runtime.interval_secs);
        let floor = Duration::from_secs(self.cfg.runtime.min_sleep_secs.max(1));
        loop {
            let started = Instant::now();
            let outcome = self.run_cycle(Utc::now()).await;
            info!(outcome = ?outcome, "cycle finished");

            let elapsed = started.elapsed();
            let wait = interval.checked_sub(elapsed).unwrap_or(Duration::ZERO).max(floor);
            tokio::time::sleep(wait).await;
        }
    }
}

/// Wire the production collaborators (RSS sources, REST broker, lexicon
/// scorer) and run the polling loop until the process is stopped.
pub async fn run(cfg: BotConfig) -> anyhow::Result<()> {
    use crate::broker::RestBroker;
    use crate::ingest::providers::rss::RssFeedSource;
    use crate::sentiment::LexiconScorer;

    let token = std::env::var("BROKER_TOKEN")
        .map_err(|_| anyhow::anyhow!("BROKER_TOKEN must be set"))?;

    let sources: Vec<Box<dyn FeedSource>> = cfg
        .feeds
        .iter()
        .map(|f| {
            Box::new(RssFeedSource::from_url(&f.name, &f.url, f.max_items)) as Box<dyn FeedSource>
        })
        .collect();
    let broker = RestBroker::new(&cfg.broker.host, &cfg.broker.account, &token);

    info!(
        feeds = cfg.feeds.len(),
        interval_secs = cfg.runtime.interval_secs,
        instrument = %cfg.risk.default_instrument,
        "pipeline starting"
    );

    let pipeline = Pipeline::new(
        cfg,
        sources,
        Box::new(LexiconScorer::new()),
        Box::new(broker),
    );
    pipeline.run_loop().await;
    Ok(())
}
