// src/rank.rs
//! Fuses relevance and sentiment magnitude into one ordering key and selects
//! the best unseen candidate for the execution gate, plus a top-K slate for
//! observability.

use std::cmp::Ordering;

use tracing::debug;

use crate::config::SENTIMENT_WEIGHT;
use crate::dedup::{fingerprint, HeadlineId, SeenSet};
use crate::ingest::types::Candidate;
use crate::sentiment::SentimentScorer;

#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub candidate: Candidate,
    pub id: HeadlineId,
    pub sentiment: f64,
    pub combined: f64,
}

#[derive(Debug, Default)]
pub struct Ranking {
    /// Best candidate, if any cleared the seen and sentiment filters.
    pub top: Option<RankedCandidate>,
    /// Up to K best candidates, best first.
    pub slate: Vec<RankedCandidate>,
    pub skipped_seen: usize,
    pub skipped_flat: usize,
}

/// Rank the surviving candidates of one cycle.
///
/// Ordering: `combined = relevance + |sentiment| * 10` descending. Ties break on
/// higher raw relevance, then earlier publish time, then feed-arrival order, so
/// the result is deterministic for identical inputs.
pub fn rank(
    candidates: Vec<Candidate>,
    seen: &SeenSet,
    scorer: &dyn SentimentScorer,
    sentiment_threshold: f64,
    top_k: usize,
) -> Ranking {
    let mut out = Ranking::default();
    let mut scored: Vec<RankedCandidate> = Vec::with_capacity(candidates.len());

    for cand in candidates {
        let id = fingerprint(&cand.item.source, &cand.item.guid, &cand.item.title);
        if seen.contains(&id) {
            out.skipped_seen += 1;
            debug!(
                source = %cand.item.source,
                title = %crate::ingest::excerpt(&cand.item.title),
                "candidate skipped: already seen"
            );
            continue;
        }
        let sentiment = scorer.score(&cand.item.title);
        if sentiment.abs() < sentiment_threshold {
            out.skipped_flat += 1;
            debug!(
                sentiment,
                threshold = sentiment_threshold,
                title = %crate::ingest::excerpt(&cand.item.title),
                "candidate skipped: sentiment below threshold"
            );
            continue;
        }
        let combined = f64::from(cand.relevance) + sentiment.abs() * SENTIMENT_WEIGHT;
        scored.push(RankedCandidate {
            candidate: cand,
            id,
            sentiment,
            combined,
        });
    }

    scored.sort_by(|a, b| {
        b.combined
            .partial_cmp(&a.combined)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.candidate.relevance.cmp(&a.candidate.relevance))
            .then_with(|| {
                a.candidate
                    .item
                    .published_at
                    .cmp(&b.candidate.item.published_at)
            })
            .then_with(|| a.candidate.arrival.cmp(&b.candidate.arrival))
    });

    scored.truncate(top_k.max(1));
    out.top = scored.first().cloned();
    out.slate = scored;
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use crate::ingest::types::RawItem;

    /// Fixed-output scorer keyed by title, for deterministic ranking tests.
    struct TableScorer(Vec<(&'static str, f64)>);

    impl SentimentScorer for TableScorer {
        fn score(&self, text: &str) -> f64 {
            self.0
                .iter()
                .find(|(t, _)| *t == text)
                .map(|(_, s)| *s)
                .unwrap_or(0.0)
        }
    }

    fn cand(title: &'static str, relevance: i32, arrival: usize) -> Candidate {
        Candidate {
            item: RawItem {
                title: title.to_string(),
                source: "Reuters".to_string(),
                guid: title.to_string(),
                link: String::new(),
                published_at: Some(Utc::now() - Duration::minutes(arrival as i64)),
                ts_fallback: false,
            },
            relevance,
            age_hours: 0.1,
            instrument: "EUR_USD".to_string(),
            arrival,
        }
    }

    #[test]
    fn combined_score_arithmetic_is_exact() {
        // relevance 4 + |0.9|*10 = 13 beats relevance 6 + |0.4|*10 = 10.
        let scorer = TableScorer(vec![("high rel", 0.4), ("high sent", 0.9)]);
        let seen = SeenSet::empty(100);
        let r = rank(
            vec![cand("high rel", 6, 0), cand("high sent", 4, 1)],
            &seen,
            &scorer,
            0.1,
            5,
        );
        let top = r.top.unwrap();
        assert_eq!(top.candidate.item.title, "high sent");
        assert!((top.combined - 13.0).abs() < 1e-9);
        assert!((r.slate[1].combined - 10.0).abs() < 1e-9);
    }

    #[test]
    fn seen_candidates_are_skipped() {
        let scorer = TableScorer(vec![("a", 0.8), ("b", 0.5)]);
        let id_a = fingerprint("Reuters", "a", "a");
        let seen = SeenSet::empty(100).mark_seen(id_a);
        let r = rank(vec![cand("a", 5, 0), cand("b", 5, 1)], &seen, &scorer, 0.1, 5);
        assert_eq!(r.skipped_seen, 1);
        assert_eq!(r.top.unwrap().candidate.item.title, "b");
    }

    #[test]
    fn flat_sentiment_is_skipped() {
        let scorer = TableScorer(vec![("a", 0.05), ("b", -0.4)]);
        let seen = SeenSet::empty(100);
        let r = rank(vec![cand("a", 9, 0), cand("b", 2, 1)], &seen, &scorer, 0.15, 5);
        assert_eq!(r.skipped_flat, 1);
        // negative sentiment still ranks by magnitude
        assert_eq!(r.top.unwrap().candidate.item.title, "b");
    }

    #[test]
    fn tie_breaks_on_relevance_then_publish_time() {
        // Equal combined: relevance 6 + 0.4*10 == relevance 4 + 0.6*10 == 10.
        let scorer = TableScorer(vec![("older high rel", 0.4), ("newer low rel", 0.6)]);
        let seen = SeenSet::empty(100);
        let r = rank(
            vec![cand("newer low rel", 4, 0), cand("older high rel", 6, 1)],
            &seen,
            &scorer,
            0.1,
            5,
        );
        assert_eq!(r.top.unwrap().candidate.item.title, "older high rel");
    }

    #[test]
    fn slate_is_bounded_at_top_k() {
        let titles: Vec<&'static str> = vec!["t1", "t2", "t3", "t4", "t5", "t6", "t7"];
        let scorer = TableScorer(titles.iter().map(|t| (*t, 0.5)).collect());
        let seen = SeenSet::empty(100);
        let cands = titles
            .iter()
            .enumerate()
            .map(|(i, t)| cand(t, i as i32, i))
            .collect();
        let r = rank(cands, &seen, &scorer, 0.1, 5);
        assert_eq!(r.slate.len(), 5);
        // best first: highest relevance wins at equal sentiment
        assert_eq!(r.slate[0].candidate.item.title, "t7");
    }

    #[test]
    fn empty_input_yields_no_candidate() {
        let scorer = TableScorer(vec![]);
        let seen = SeenSet::empty(100);
        let r = rank(vec![], &seen, &scorer, 0.1, 5);
        assert!(r.top.is_none());
        assert!(r.slate.is_empty());
    }
}
