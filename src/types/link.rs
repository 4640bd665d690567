//! Links: URL resources filed under topics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{LinkId, RepositoryId};
use crate::normalize::CanonicalUrl;

/// A URL resource node. Always a leaf of the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Unique identifier.
    pub id: LinkId,
    /// Owning repository.
    pub repository_id: RepositoryId,
    /// URL as submitted.
    pub url: String,
    /// Canonicalized URL used for dedup.
    pub canonical_url: String,
    /// SHA-256 of the canonical URL (hex).
    pub url_hash: String,
    /// Page title; empty when unknown.
    pub title: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Link {
    /// Create a new link from a canonicalized URL.
    pub fn new(repository_id: RepositoryId, url: &CanonicalUrl, title: impl Into<String>) -> Self {
        Self {
            id: LinkId::generate(),
            repository_id,
            url: url.input().to_string(),
            canonical_url: url.as_str().to_string(),
            url_hash: url.hash(),
            title: title.into(),
            created_at: Utc::now(),
        }
    }
}
