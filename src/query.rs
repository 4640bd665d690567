//! Search query parsing.
//!
//! A query string is split on whitespace into tokens. Each token is either
//! an explicit topic reference (`in:/<org>/topics/<id>`) or a plain string
//! token. Parsing is total: anything that is not a well-formed topic
//! reference becomes a string token, so a query can never fail to parse.
//!
//! ```text
//! "York in:/wiki/topics/46fb…77 https://ex.com/?utm_source=x"
//!    │            │                        │
//!  string     topic ref              string (canonical URL)
//! ```
//!
//! A topic reference glued to a following token with no separator
//! (`in:/wiki/topics/<id>https://…`) is kept as one plain string token.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::normalize::{is_url, CanonicalUrl};
use crate::types::TopicId;

fn topic_ref_pattern() -> &'static regex_lite::Regex {
    static RE: OnceLock<regex_lite::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex_lite::Regex::new(r"^in:/[\w-]+/topics/[\w-]*$").expect("static regex")
    })
}

/// Backslash-escape the `LIKE` metacharacters in `token`.
fn escape_like(token: &str) -> String {
    let mut escaped = String::with_capacity(token.len());
    for c in token.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// An explicit topic reference embedded in a query.
///
/// Only the trailing id selects the topic. The `<org>` segment is part of the
/// accepted shape but is not compared against anything, so a reference
/// copied from another repository's path still resolves by id; a topic from
/// another repository then simply has no descendants under the search root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicRef(String);

impl TopicRef {
    /// Parse a token as a topic reference.
    pub fn parse(token: &str) -> Option<Self> {
        topic_ref_pattern()
            .is_match(token)
            .then(|| Self(token.to_string()))
    }

    /// The referenced topic.
    ///
    /// Returns [`TopicId::NONE`] when the trailing path segment is empty or is
    /// not an identifier, so the reference matches nothing.
    pub fn id(&self) -> TopicId {
        self.0
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .and_then(|segment| TopicId::from_str(segment).ok())
            .unwrap_or(TopicId::NONE)
    }

    /// The reference as written.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A parsed search query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySpec {
    /// Plain substring tokens, in input order.
    pub string_tokens: Vec<String>,
    /// Explicit topic references, de-duplicated by exact text.
    pub topic_refs: Vec<TopicRef>,
}

impl QuerySpec {
    /// Parse a free-text query. Never fails.
    pub fn parse(input: &str) -> Self {
        let mut spec = Self::default();

        for token in input.split_whitespace() {
            if let Some(topic_ref) = TopicRef::parse(token) {
                if !spec.topic_refs.contains(&topic_ref) {
                    spec.topic_refs.push(topic_ref);
                }
                continue;
            }

            if is_url(token) {
                if let Ok(url) = CanonicalUrl::parse(token) {
                    spec.string_tokens.push(url.as_str().to_string());
                    continue;
                }
            }

            spec.string_tokens.push(token.to_string());
        }

        spec
    }

    /// Whether the query has neither string tokens nor topic references.
    pub fn is_empty(&self) -> bool {
        self.string_tokens.is_empty() && self.topic_refs.is_empty()
    }

    /// Ids of the referenced topics.
    pub fn topic_ids(&self) -> Vec<TopicId> {
        self.topic_refs.iter().map(TopicRef::id).collect()
    }

    /// Case-insensitive "contains" patterns for `ILIKE ... ESCAPE '\'`, one
    /// per string token. `%`, `_` and `\` inside a token match literally.
    pub fn wildcard_tokens(&self) -> Vec<String> {
        self.string_tokens
            .iter()
            .map(|token| format!("%{}%", escape_like(token)))
            .collect()
    }

    /// String tokens that can be quoted for full-text search.
    ///
    /// Tokens containing a quote or a backslash would break out of the
    /// quoting and are skipped.
    pub fn full_text_tokens(&self) -> Vec<&str> {
        self.string_tokens
            .iter()
            .filter(|token| {
                let quotable = !token.contains('\'') && !token.contains('\\');
                if !quotable {
                    tracing::warn!(token = %token, "Skipping token that cannot be quoted for full-text search");
                }
                quotable
            })
            .map(String::as_str)
            .collect()
    }

    /// Render the string tokens as a `to_tsquery` expression joined with `&`.
    ///
    /// Returns `None` when no token survives [`QuerySpec::full_text_tokens`].
    pub fn full_text_query(&self) -> Option<String> {
        let quoted: Vec<String> = self
            .full_text_tokens()
            .into_iter()
            .map(|token| format!("'{}'", token))
            .collect();

        if quoted.is_empty() {
            None
        } else {
            Some(quoted.join(" & "))
        }
    }
}
