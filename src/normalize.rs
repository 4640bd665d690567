//! Name and URL normalization.
//!
//! ## Topic names
//!
//! ```text
//! normalize_topic_name(name) = collapse_whitespace(trim(name))
//! ```
//!
//! A normalized name is valid when it is non-empty and does not look like a
//! URL (URLs belong on links, not topics).
//!
//! ## URLs
//!
//! Links are deduplicated on the SHA-256 of their canonical URL. The canonical
//! form lowercases scheme and host (done by the URL parser), drops the
//! fragment, and strips tracking query parameters.

use sha2::{Digest, Sha256};
use std::sync::OnceLock;
use url::Url;
use xxhash_rust::xxh64::xxh64;

use crate::types::RepositoryId;

/// Query parameters removed during canonicalization.
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_cid", "mc_eid"];

/// Prefix of query parameters removed during canonicalization.
const TRACKING_PREFIX: &str = "utm_";

fn whitespace() -> &'static regex_lite::Regex {
    static RE: OnceLock<regex_lite::Regex> = OnceLock::new();
    RE.get_or_init(|| regex_lite::Regex::new(r"\s+").expect("static regex"))
}

/// Normalize a topic name.
///
/// Returns the normalized name and whether it is acceptable as a topic name.
///
/// # Example
///
/// ```rust
/// use digraph_kernel::normalize::normalize_topic_name;
///
/// assert_eq!(
///     normalize_topic_name("   Agricultural   revolution "),
///     ("Agricultural revolution".to_string(), true)
/// );
/// assert_eq!(
///     normalize_topic_name("http://www.google.com/"),
///     ("http://www.google.com/".to_string(), false)
/// );
/// ```
pub fn normalize_topic_name(name: &str) -> (String, bool) {
    let normalized = whitespace().replace_all(name.trim(), " ").to_string();
    if normalized.is_empty() || is_url(&normalized) {
        return (normalized, false);
    }
    (normalized, true)
}

/// Whether a string parses as an absolute http(s) URL with a host.
pub fn is_url(s: &str) -> bool {
    match Url::parse(s) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

/// Error type for URL canonicalization.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlError {
    /// The input is not a URL.
    #[error("Invalid url: {0}")]
    Parse(#[from] url::ParseError),
    /// Only http and https links are stored.
    #[error("Unsupported url scheme: {0}")]
    UnsupportedScheme(String),
}

/// A URL in canonical form, together with the input it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalUrl {
    input: String,
    canonical: String,
}

impl CanonicalUrl {
    /// Canonicalize a URL.
    pub fn parse(input: &str) -> Result<Self, UrlError> {
        let input = input.trim();
        let mut url = Url::parse(input)?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(UrlError::UnsupportedScheme(url.scheme().to_string()));
        }

        url.set_fragment(None);

        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !is_tracking_param(key))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }

        Ok(Self {
            input: input.to_string(),
            canonical: url.to_string(),
        })
    }

    /// The URL as submitted (trimmed).
    pub fn input(&self) -> &str {
        &self.input
    }

    /// The canonical URL.
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// SHA-256 of the canonical URL as 64-character lowercase hex.
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical.as_bytes());
        hex::encode(hasher.finalize())
    }
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with(TRACKING_PREFIX) || TRACKING_PARAMS.contains(&key)
}

/// Key for the per-repository mutation lock.
///
/// Stable across processes so every writer contends on the same key.
pub fn repository_lock_key(repository_id: RepositoryId) -> i64 {
    xxh64(repository_id.as_uuid().as_bytes(), 0) as i64
}
