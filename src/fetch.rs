//! Page-title fetching for new links.
//!
//! A fetch failure never fails a link upsert; the link is stored with an
//! empty title and a warning is logged.

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::RwLock;
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::normalize::CanonicalUrl;

/// Error type for page fetches.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Transport failure.
    #[error("Request failed: {0}")]
    Request(String),
    /// Non-success HTTP status.
    #[error("Unexpected status {0}")]
    Status(u16),
    /// The fetch ran past its timeout.
    #[error("Fetch timed out")]
    Timeout,
}

/// Source of page titles.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch the title of the page at `url`. `Ok(None)` means the page has none.
    async fn fetch_title(&self, url: &CanonicalUrl) -> Result<Option<String>, FetchError>;
}

/// Fetcher that never fetches.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFetcher;

#[async_trait]
impl PageFetcher for NoopFetcher {
    async fn fetch_title(&self, _url: &CanonicalUrl) -> Result<Option<String>, FetchError> {
        Ok(None)
    }
}

#[async_trait]
impl<F: PageFetcher + ?Sized> PageFetcher for Arc<F> {
    async fn fetch_title(&self, url: &CanonicalUrl) -> Result<Option<String>, FetchError> {
        (**self).fetch_title(url).await
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Current number of entries in the cache.
    pub len: usize,
    /// Maximum capacity of the cache.
    pub cap: usize,
}

/// LRU cache in front of another fetcher, keyed by canonical URL.
///
/// Only successful fetches are cached, so a transient failure is retried on
/// the next upsert of the same URL.
pub struct CachingFetcher<F> {
    inner: F,
    cache: Arc<RwLock<LruCache<String, Option<String>>>>,
}

impl<F: PageFetcher> CachingFetcher<F> {
    /// Wrap `inner` with a cache of `capacity` entries (at least one).
    pub fn new(inner: F, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Arc::new(RwLock::new(LruCache::new(capacity))),
        }
    }

    /// Get cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        let cache = self.cache.read();
        CacheStats {
            len: cache.len(),
            cap: cache.cap().get(),
        }
    }

    /// Clear the cache.
    pub fn clear_cache(&self) {
        self.cache.write().clear();
    }
}

#[async_trait]
impl<F: PageFetcher> PageFetcher for CachingFetcher<F> {
    async fn fetch_title(&self, url: &CanonicalUrl) -> Result<Option<String>, FetchError> {
        if let Some(title) = self.cache.read().peek(url.as_str()) {
            return Ok(title.clone());
        }

        let title = self.inner.fetch_title(url).await?;
        self.cache
            .write()
            .put(url.as_str().to_string(), title.clone());
        Ok(title)
    }
}

/// Extract the trimmed `<title>` text from an HTML document.
#[cfg(feature = "fetch")]
pub fn extract_title(html: &str) -> Option<String> {
    use scraper::{Html, Selector};

    let document = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;
    let element = document.select(&selector).next()?;
    let title = element.text().collect::<String>();
    let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
    (!title.is_empty()).then_some(title)
}

/// Fetches page titles over HTTP.
#[cfg(feature = "fetch")]
#[derive(Debug, Clone)]
pub struct HttpTitleFetcher {
    client: reqwest::Client,
}

#[cfg(feature = "fetch")]
impl HttpTitleFetcher {
    /// Create a fetcher whose requests time out after `timeout`.
    pub fn new(timeout: std::time::Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("digraph-kernel/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Request(e.to_string()))?;
        Ok(Self { client })
    }
}

#[cfg(feature = "fetch")]
#[async_trait]
impl PageFetcher for HttpTitleFetcher {
    async fn fetch_title(&self, url: &CanonicalUrl) -> Result<Option<String>, FetchError> {
        let response = self.client.get(url.as_str()).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Request(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;
        Ok(extract_title(&body))
    }
}
