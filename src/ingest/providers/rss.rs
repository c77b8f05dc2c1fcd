// src/ingest/providers/rss.rs
//! Generic RSS feed adapter. One instance per configured source; fetch/parse
//! failures stay inside the adapter and surface as a per-source `FeedError`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::format_description::well_known::Rfc2822;
use time::OffsetDateTime;

use crate::error::FeedError;
use crate::ingest::normalize_title;
use crate::ingest::types::{FeedSource, RawItem};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<Item>,
    #[serde(rename = "lastBuildDate")]
    last_build_date: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<Guid>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    published: Option<String>,
    updated: Option<String>,
    created: Option<String>,
    date: Option<String>,
}

/// RSS guids may carry attributes (isPermaLink), so capture only the text node.
#[derive(Debug, Deserialize)]
struct Guid {
    #[serde(rename = "$text")]
    value: Option<String>,
}

pub struct RssFeedSource {
    name: String,
    max_items: usize,
    mode: Mode,
}

enum Mode {
    Http { url: String, client: reqwest::Client },
    Fixture(String),
}

impl RssFeedSource {
    pub fn from_url(name: impl Into<String>, url: impl Into<String>, max_items: usize) -> Self {
        Self {
            name: name.into(),
            max_items,
            mode: Mode::Http {
                url: url.into(),
                client: reqwest::Client::new(),
            },
        }
    }

    /// Parse from an in-memory XML document; used by tests and fixtures.
    pub fn from_fixture(name: impl Into<String>, xml: impl Into<String>, max_items: usize) -> Self {
        Self {
            name: name.into(),
            max_items,
            mode: Mode::Fixture(xml.into()),
        }
    }

    fn parse_items(&self, body: &str) -> Result<Vec<RawItem>, FeedError> {
        let t0 = std::time::Instant::now();
        let xml = scrub_html_entities_for_xml(body);
        let rss: Rss =
            from_str(&xml).map_err(|e| FeedError::Parse(format!("{}: {e}", self.name)))?;

        // Channel-level build/update timestamp, the last-resort fallback.
        let channel_ts = rss
            .channel
            .last_build_date
            .as_deref()
            .or(rss.channel.pub_date.as_deref())
            .and_then(parse_date_loose);

        let mut out = Vec::new();
        for it in rss.channel.items.into_iter().take(self.max_items) {
            let title = normalize_title(it.title.as_deref().unwrap_or_default());
            if title.is_empty() {
                continue;
            }
            let link = it.link.clone().unwrap_or_default().trim().to_string();
            let guid = it
                .guid
                .as_ref()
                .and_then(|g| g.value.clone())
                .map(|g| g.trim().to_string())
                .filter(|g| !g.is_empty())
                .unwrap_or_else(|| if link.is_empty() { title.clone() } else { link.clone() });

            let (published_at, ts_fallback) = resolve_timestamp(&it, channel_ts);

            out.push(RawItem {
                title,
                source: self.name.clone(),
                guid,
                link,
                published_at,
                ts_fallback,
            });
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms").record(ms);
        counter!("ingest_items_total").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl FeedSource for RssFeedSource {
    async fn fetch_latest(&self) -> Result<Vec<RawItem>, FeedError> {
        match &self.mode {
            Mode::Fixture(xml) => self.parse_items(xml),
            Mode::Http { url, client } => {
                let body = client.get(url).send().await?.text().await?;
                self.parse_items(&body)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Priority-ordered timestamp resolution. Never defaults to "now": an item with
/// no resolvable timestamp stays unresolved and is discarded downstream, so
/// stale items cannot be silently revived.
fn resolve_timestamp(
    it: &Item,
    channel_ts: Option<DateTime<Utc>>,
) -> (Option<DateTime<Utc>>, bool) {
    // 1) + 2) structured published/updated fields, strict formats first.
    for field in [&it.published, &it.updated] {
        if let Some(dt) = field.as_deref().and_then(parse_date_strict) {
            return (Some(dt), false);
        }
    }
    // 3) RFC-2822-style textual fields, loosest-effort.
    for field in [&it.published, &it.pub_date, &it.updated, &it.created, &it.date] {
        if let Some(dt) = field.as_deref().and_then(parse_date_loose) {
            return (Some(dt), false);
        }
    }
    // 4) feed-level build timestamp, flagged for observability.
    if let Some(dt) = channel_ts {
        return (Some(dt), true);
    }
    (None, false)
}

fn parse_date_strict(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_date_loose(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(odt) = OffsetDateTime::parse(s, &Rfc2822) {
        return DateTime::<Utc>::from_timestamp(odt.unix_timestamp(), 0);
    }
    parse_date_strict(s)
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
