// src/sentiment.rs
//! Headline sentiment in [-1, 1]. The pipeline only depends on the
//! [`SentimentScorer`] trait, so the lexicon implementation is swappable.

use std::collections::HashMap;

use once_cell::sync::Lazy;

static LEXICON: Lazy<HashMap<String, i32>> = Lazy::new(|| {
    let raw = include_str!("sentiment_lexicon.json");
    serde_json::from_str::<HashMap<String, i32>>(raw).expect("valid sentiment lexicon")
});

/// Opaque polarity scorer: text in, bounded scalar out. Pure, no side effects.
pub trait SentimentScorer: Send + Sync {
    fn score(&self, text: &str) -> f64;
}

/// Lexicon scorer with short-range negation flipping, normalized to [-1, 1].
#[derive(Debug, Clone, Default)]
pub struct LexiconScorer;

impl LexiconScorer {
    pub fn new() -> Self {
        Self
    }

    #[inline]
    fn word_score(&self, w: &str) -> i32 {
        *LEXICON.get(w).unwrap_or(&0)
    }

    /// Raw integer sum over lexicon hits. A negator within the preceding
    /// 1..=3 tokens inverts the sign of the hit.
    fn raw_sum(&self, text: &str) -> i32 {
        let tokens: Vec<String> = tokenize(text).collect();
        let mut sum = 0i32;
        for i in 0..tokens.len() {
            let base = self.word_score(tokens[i].as_str());
            if base == 0 {
                continue;
            }
            let negated = (1..=3).any(|k| i >= k && is_negator(tokens[i - k].as_str()));
            sum += if negated { -base } else { base };
        }
        sum
    }
}

impl SentimentScorer for LexiconScorer {
    fn score(&self, text: &str) -> f64 {
        normalize(self.raw_sum(text))
    }
}

/// Map the unbounded integer sum into (-1, 1): x / sqrt(x^2 + 15).
fn normalize(sum: i32) -> f64 {
    let x = f64::from(sum);
    x / (x * x + 15.0).sqrt()
}

fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
}

fn is_negator(tok: &str) -> bool {
    matches!(
        tok,
        "not" | "no" | "never" | "isn" | "wasn" | "aren" | "doesn" | "didn" | "cannot" | "without"
    )
}
