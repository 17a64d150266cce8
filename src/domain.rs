//! URL navigability, domain stemming and the search-term pattern shared by
//! the extractors, the aggregation engine and the anonymizer.

use once_cell::sync::Lazy;
use regex::Regex;

/// Host component after a scheme delimiter.
static HOST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"://([a-z0-9.\-:]+)").expect("host pattern"));

/// Token produced by the anonymizer: `anonymized-<hash>-<salt>[-<id>]`.
static ANONYMIZED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"anonymized-\w+-\w+").expect("anonymized pattern"));

/// Query parameters that carry search terms. The alternation is fixed and
/// case-insensitive; the value class accepts percent escapes and a handful
/// of accented characters.
pub static SEARCH_TERM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:\?q=|\?p=|\?query=|search\?q=|\?q\d=|&q\d=|\?k=|\?text=|&q=|key=|\?search=|&search=|&searchTerm=|\?searchTerm=)([a-zA-Z0-9äöüïéàèáÜÄÖ%+\-*\s.,]+)",
    )
    .expect("search term pattern")
});

/// Whether a stored value still looks like a navigable URL (has a scheme
/// delimiter and a host). Anonymized tokens and bare domains do not.
pub fn is_navigable(url: &str) -> bool {
    HOST_RE.is_match(url)
}

/// The host component of a navigable URL, if any.
pub fn host_of(url: &str) -> Option<&str> {
    HOST_RE
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Reduce a URL to its stemmed domain: host component with a leading `www.`
/// removed. Values with no scheme are inspected for the two shapes the store
/// can already contain — anonymized tokens and previously stemmed domains —
/// and returned unchanged, making the function idempotent.
pub fn stem_url(url: &str) -> String {
    if let Some(host) = host_of(url) {
        let host = host.strip_prefix("www.").unwrap_or(host);
        return host.to_string();
    }
    if let Some(m) = ANONYMIZED_RE.find(url) {
        return m.as_str().to_string();
    }
    if let Some(stripped) = url.strip_suffix("/***") {
        return stripped.to_string();
    }
    url.to_string()
}
