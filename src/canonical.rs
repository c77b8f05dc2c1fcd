// src/canonical.rs
//! URL canonicalization for cross-source duplicate suppression within a single
//! ingestion pass. Not part of the durable headline fingerprint.

use url::Url;

/// Tracking query parameters stripped before comparison.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "utm_id",
    "fbclid",
    "gclid",
    "msclkid",
    "igshid",
    "ref",
    "source",
    "campaign",
];

/// Normalize a URL: strip tracking parameters and the fragment, re-serialize,
/// lowercase. Unparseable input returns a lowercased copy of the original.
pub fn canonicalize(raw: &str) -> String {
    let mut url = match Url::parse(raw) {
        Ok(u) => u,
        Err(_) => return raw.to_ascii_lowercase(),
    };

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAMS.iter().any(|t| k.eq_ignore_ascii_case(t)))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    url.set_fragment(None);

    url.to_string().to_ascii_lowercase()
}
