// src/ingest/types.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::FeedError;

/// One syndication entry as produced by a feed adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawItem {
    pub title: String,
    /// Feed identifier, e.g. "Reuters".
    pub source: String,
    /// Feed-provided id; falls back to the link, then to the title.
    pub guid: String,
    /// May be empty when the feed omits it.
    pub link: String,
    /// Unresolved timestamps stay `None` and are discarded by the temporal gate.
    pub published_at: Option<DateTime<Utc>>,
    /// True when the timestamp came from the feed-level build date (last-resort
    /// fallback); surfaced in logs for observability.
    pub ts_fallback: bool,
}

/// A [`RawItem`] that survived the age and relevance gates.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub item: RawItem,
    pub relevance: i32,
    pub age_hours: f64,
    pub instrument: String,
    /// Position in feed-arrival order, the final ranking tie-break.
    pub arrival: usize,
}

#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<RawItem>, FeedError>;
    fn name(&self) -> &str;
}
