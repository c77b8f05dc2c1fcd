// src/ingest/mod.rs
pub mod providers;
pub mod types;

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::canonical::canonicalize;
use crate::config::BotConfig;
use crate::ingest::types::{Candidate, FeedSource, RawItem};
use crate::relevance;

/// One-time metrics registration (so series show up on the exporter).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_items_total", "Total items parsed from feed sources.");
        describe_counter!("ingest_kept_total", "Items that became ranking candidates.");
        describe_counter!(
            "ingest_discarded_total",
            "Items discarded by the age/relevance/duplicate filters."
        );
        describe_counter!("ingest_source_errors_total", "Feed fetch/parse errors.");
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!("ingest_last_run_ts", "Unix ts when ingest last ran.");
    });
}

/// Normalize a headline: entity-decode, strip tags, straighten quotes, collapse
/// whitespace, trim trailing sentence punctuation.
pub fn normalize_title(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    while let Some(last) = out.chars().last() {
        if matches!(last, '!' | '?' | '.' | ',') {
            out.pop();
        } else {
            break;
        }
    }

    if out.chars().count() > 500 {
        out = out.chars().take(500).collect();
    }
    out
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub fetched: usize,
    pub no_timestamp: usize,
    pub too_old: usize,
    pub low_relevance: usize,
    pub duplicate_url: usize,
    pub source_errors: usize,
}

/// Per-item filter verdict, applied against one source's thresholds.
/// Exposed for unit tests; `run_once` is the composed pipeline.
pub fn filter_item(
    item: &RawItem,
    now: DateTime<Utc>,
    max_age_hours: f64,
    min_relevance: i32,
) -> Result<(i32, f64), &'static str> {
    let Some(published) = item.published_at else {
        return Err("no_timestamp");
    };
    let age_hours = (now - published).num_seconds() as f64 / 3600.0;
    // Strictly-greater: an item exactly at the ceiling is kept.
    if age_hours > max_age_hours {
        return Err("too_old");
    }
    let score = relevance::score(&item.title);
    if score < min_relevance {
        return Err("low_relevance");
    }
    Ok((score, age_hours))
}

/// Drain every source, then normalize/age-gate/relevance-gate each item and
/// suppress same-story URLs across sources within this pass. One failing source
/// logs a warning and contributes nothing; the cycle goes on.
pub async fn run_once(
    sources: &[Box<dyn FeedSource>],
    cfg: &BotConfig,
    now: DateTime<Utc>,
) -> (Vec<Candidate>, IngestStats) {
    ensure_metrics_described();

    let mut stats = IngestStats::default();
    let mut raw: Vec<RawItem> = Vec::new();
    for src in sources {
        match src.fetch_latest().await {
            Ok(mut items) => raw.append(&mut items),
            Err(e) => {
                warn!(source = src.name(), error = %e, "feed source error, skipping this cycle");
                counter!("ingest_source_errors_total").increment(1);
                stats.source_errors += 1;
            }
        }
    }
    stats.fetched = raw.len();

    let mut seen_urls: HashSet<String> = HashSet::new();
    let mut candidates = Vec::new();

    for (arrival, item) in raw.into_iter().enumerate() {
        let feed = cfg.feeds.iter().find(|f| f.name == item.source);
        let max_age = feed
            .and_then(|f| f.max_age_hours)
            .unwrap_or(cfg.pipeline.default_max_age_hours);
        let min_rel = feed
            .and_then(|f| f.min_relevance)
            .unwrap_or(cfg.pipeline.default_min_relevance);

        let (score, age_hours) = match filter_item(&item, now, max_age, min_rel) {
            Ok(v) => v,
            Err(reason) => {
                match reason {
                    "no_timestamp" => stats.no_timestamp += 1,
                    "too_old" => stats.too_old += 1,
                    _ => stats.low_relevance += 1,
                }
                debug!(
                    source = %item.source,
                    reason,
                    max_age_hours = max_age,
                    min_relevance = min_rel,
                    title = %excerpt(&item.title),
                    "item discarded"
                );
                counter!("ingest_discarded_total").increment(1);
                continue;
            }
        };

        // Cross-source duplicate suppression within this pass only; the durable
        // dedup store works on headline fingerprints, not URLs.
        if !item.link.is_empty() && !seen_urls.insert(canonicalize(&item.link)) {
            stats.duplicate_url += 1;
            debug!(
                source = %item.source,
                title = %excerpt(&item.title),
                "item discarded: duplicate_url"
            );
            counter!("ingest_discarded_total").increment(1);
            continue;
        }

        if item.ts_fallback {
            debug!(
                source = %item.source,
                title = %excerpt(&item.title),
                "timestamp resolved from feed-level build date"
            );
        }

        let instrument = relevance::detect_instrument(&item.title, &cfg.risk.default_instrument);
        candidates.push(Candidate {
            item,
            relevance: score,
            age_hours,
            instrument,
            arrival,
        });
    }

    counter!("ingest_kept_total").increment(candidates.len() as u64);
    gauge!("ingest_last_run_ts").set(now.timestamp() as f64);

    (candidates, stats)
}

pub(crate) fn excerpt(s: &str) -> &str {
    let end = s
        .char_indices()
        .nth(80)
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    &s[..end]
}
