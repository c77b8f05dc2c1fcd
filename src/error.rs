// src/error.rs
//! Typed errors at component boundaries. The cycle loop decides per-type whether
//! to skip a source, skip a check, or degrade a store; it never aborts the loop.

use thiserror::Error;

/// Fetch/parse failure of a single feed source. Isolated per source: one failing
/// feed yields nothing this cycle while the others are still drained.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("feed parse error: {0}")]
    Parse(String),
}

/// Broker collaborator failure. Safety-relevant checks map this to a denial
/// (fail-closed); informational queries map it to "unknown, skip".
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("broker returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("broker response decode error: {0}")]
    Decode(String),
}

/// Dedup store failure. Load degrades to an empty set with a warning; a failed
/// save keeps the in-memory set authoritative for the rest of the process.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("seen-store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("seen-store format error: {0}")]
    Format(#[from] serde_json::Error),
}
