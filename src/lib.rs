// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod broker;
pub mod canonical;
pub mod config;
pub mod cycle;
pub mod dedup;
pub mod error;
pub mod gate;
pub mod ingest;
pub mod rank;
pub mod relevance;
pub mod sentiment;

// ---- Re-exports for stable public API ----
pub use crate::broker::{Broker, OrderOutcome, OrderRequest, Quote, Side};
pub use crate::config::BotConfig;
pub use crate::cycle::{CycleOutcome, Pipeline};
pub use crate::dedup::{fingerprint, SeenSet, SeenStore};
pub use crate::gate::{ExecutionGate, GateDenial, GateOutcome, GateState};
pub use crate::ingest::types::{Candidate, FeedSource, RawItem};
pub use crate::sentiment::{LexiconScorer, SentimentScorer};
