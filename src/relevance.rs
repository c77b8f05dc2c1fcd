// src/relevance.rs
//! Keyword relevance scoring and instrument-hint inference over headline text.
//!
//! Scoring is a pure function of the title. Positive rule groups are
//! first-match-wins within the group; blocklist hits are cumulative, one penalty
//! per distinct blocked term.

use once_cell::sync::Lazy;
use regex::Regex;

pub const CENTRAL_BANK_POINTS: i32 = 3;
pub const POLICY_POINTS: i32 = 3;
pub const MACRO_POINTS: i32 = 2;
pub const HIGH_IMPACT_BONUS: i32 = 1;
pub const CURRENCY_POINTS: i32 = 2;
pub const BLOCK_PENALTY: i32 = -5;

const CENTRAL_BANK_TERMS: &[&str] = &[
    "ecb",
    "european central bank",
    "fed",
    "federal reserve",
    "fomc",
    "boe",
    "bank of england",
    "boj",
    "bank of japan",
    "snb",
    "rba",
    "central bank",
];

const POLICY_TERMS: &[&str] = &[
    "rate hike",
    "rate cut",
    "rate decision",
    "interest rate",
    "interest rates",
    "rates",
    "monetary policy",
    "hawkish",
    "dovish",
    "tightening",
    "easing",
    "quantitative easing",
];

const MACRO_TERMS: &[&str] = &[
    "cpi",
    "inflation",
    "gdp",
    "unemployment",
    "jobless",
    "payrolls",
    "nonfarm",
    "pmi",
    "retail sales",
    "trade balance",
    "consumer confidence",
];

/// Macro releases that historically move FX the most; worth an extra point.
const HIGH_IMPACT_TERMS: &[&str] = &["cpi", "inflation", "nonfarm", "payrolls"];

const CURRENCY_TERMS: &[&str] = &[
    "eur/usd",
    "eurusd",
    "gbp/usd",
    "gbpusd",
    "usd/jpy",
    "usdjpy",
    "euro",
    "eurozone",
    "dollar",
    "pound",
    "sterling",
    "yen",
    "gold",
];

const BLOCK_TERMS: &[&str] = &[
    "sports",
    "football",
    "celebrity",
    "movie",
    "film",
    "music",
    "royal family",
    "recipe",
    "fashion",
    "lottery",
    "museum",
    "cat",
    "dog",
    "birthday",
];

fn group_regex(terms: &[&str]) -> Regex {
    let alts = terms
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alts})\b")).expect("relevance group regex")
}

static RE_CENTRAL_BANK: Lazy<Regex> = Lazy::new(|| group_regex(CENTRAL_BANK_TERMS));
static RE_POLICY: Lazy<Regex> = Lazy::new(|| group_regex(POLICY_TERMS));
static RE_MACRO: Lazy<Regex> = Lazy::new(|| group_regex(MACRO_TERMS));
static RE_HIGH_IMPACT: Lazy<Regex> = Lazy::new(|| group_regex(HIGH_IMPACT_TERMS));
static RE_CURRENCY: Lazy<Regex> = Lazy::new(|| group_regex(CURRENCY_TERMS));
static RE_BLOCK: Lazy<Vec<(String, Regex)>> = Lazy::new(|| {
    BLOCK_TERMS
        .iter()
        .map(|t| (t.to_string(), group_regex(&[t])))
        .collect()
});

/// Net topical-relevance score for a headline. May be negative.
pub fn score(title: &str) -> i32 {
    score_verbose(title).0
}

/// Like [`score`], but also reports which rule groups and blocked terms fired.
/// The numeric result is identical to [`score`].
pub fn score_verbose(title: &str) -> (i32, Vec<String>) {
    let mut total = 0;
    let mut fired = Vec::new();

    if let Some(m) = RE_CENTRAL_BANK.find(title) {
        total += CENTRAL_BANK_POINTS;
        fired.push(format!("central_bank:{}", m.as_str().to_ascii_lowercase()));
    }
    if let Some(m) = RE_POLICY.find(title) {
        total += POLICY_POINTS;
        fired.push(format!("policy:{}", m.as_str().to_ascii_lowercase()));
    }
    if let Some(m) = RE_MACRO.find(title) {
        total += MACRO_POINTS;
        fired.push(format!("macro:{}", m.as_str().to_ascii_lowercase()));
        if RE_HIGH_IMPACT.is_match(title) {
            total += HIGH_IMPACT_BONUS;
            fired.push("macro:high_impact".to_string());
        }
    }
    if let Some(m) = RE_CURRENCY.find(title) {
        total += CURRENCY_POINTS;
        fired.push(format!("currency:{}", m.as_str().to_ascii_lowercase()));
    }

    // Unlike the positive groups, every distinct blocked term applies.
    for (term, re) in RE_BLOCK.iter() {
        if re.is_match(title) {
            total += BLOCK_PENALTY;
            fired.push(format!("block:{term}"));
        }
    }

    (total, fired)
}

/// Classify which instrument a headline is most likely about.
///
/// Priority order is significant: pair mentions are the most specific, then
/// single-currency / central-bank mentions, then the configured default (which
/// also covers generic USD/Fed headlines). Headlines mentioning several
/// currencies resolve to the first matching rule, not a union.
pub fn detect_instrument(title: &str, default: &str) -> String {
    static PAIR_RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
        vec![
            (group_regex(&["eur/usd", "eurusd"]), "EUR_USD"),
            (group_regex(&["gbp/usd", "gbpusd", "cable"]), "GBP_USD"),
            (group_regex(&["usd/jpy", "usdjpy"]), "USD_JPY"),
            (group_regex(&["xau/usd", "xauusd", "gold"]), "XAU_USD"),
        ]
    });
    static SINGLE_RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
        vec![
            (
                group_regex(&["euro", "eurozone", "ecb", "european central bank"]),
                "EUR_USD",
            ),
            (
                group_regex(&["pound", "sterling", "boe", "bank of england"]),
                "GBP_USD",
            ),
            (group_regex(&["yen", "boj", "bank of japan"]), "USD_JPY"),
        ]
    });
    for (re, inst) in PAIR_RULES.iter().chain(SINGLE_RULES.iter()) {
        if re.is_match(title) {
            return (*inst).to_string();
        }
    }
    default.to_string()
}
