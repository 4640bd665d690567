//! Service state management.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{EngineConfig, ServiceConfig};
use crate::engine::TopicGraph;
use crate::fetch::PageFetcher;
use crate::store::postgres::PoolStats;
use crate::store::{GraphStore, InMemoryGraphStore, PostgresGraphStore};

use super::loader::TopicLoader;

/// Store health as reported by the health endpoints.
#[async_trait]
pub trait StoreHealth: Send + Sync {
    /// Check if the backing store is reachable.
    async fn is_healthy(&self) -> bool;

    /// Connection pool statistics, if the store has a pool.
    fn pool_stats(&self) -> Option<PoolStats>;
}

#[async_trait]
impl StoreHealth for PostgresGraphStore {
    async fn is_healthy(&self) -> bool {
        PostgresGraphStore::is_healthy(self).await
    }

    fn pool_stats(&self) -> Option<PoolStats> {
        Some(PostgresGraphStore::pool_stats(self))
    }
}

#[async_trait]
impl StoreHealth for InMemoryGraphStore {
    async fn is_healthy(&self) -> bool {
        true
    }

    fn pool_stats(&self) -> Option<PoolStats> {
        None
    }
}

/// Shared service state.
pub struct ServiceState<S: GraphStore + 'static> {
    /// The graph engine.
    pub graph: Arc<TopicGraph<S>>,
    /// Collection window of the per-request batch loader.
    pub loader_window: Duration,
}

impl<S: GraphStore + 'static> ServiceState<S> {
    /// Create service state around a store.
    pub fn new(store: S, engine_config: EngineConfig, loader_window: Duration) -> Self {
        Self {
            graph: Arc::new(TopicGraph::new(store).with_config(engine_config)),
            loader_window,
        }
    }

    /// Create service state with a page fetcher for link titles.
    pub fn with_fetcher(
        store: S,
        engine_config: EngineConfig,
        loader_window: Duration,
        fetcher: impl PageFetcher + 'static,
    ) -> Self {
        Self {
            graph: Arc::new(
                TopicGraph::new(store)
                    .with_config(engine_config)
                    .with_fetcher(fetcher),
            ),
            loader_window,
        }
    }

    /// Create service state from environment variables.
    pub fn from_env(store: S) -> Self {
        Self::new(
            store,
            EngineConfig::from_env(),
            ServiceConfig::from_env().loader_window,
        )
    }

    /// A fresh batch loader for one request.
    pub fn topic_loader(&self) -> TopicLoader<S> {
        TopicLoader::new(Arc::clone(&self.graph), self.loader_window)
    }
}

impl<S: GraphStore + 'static> Clone for ServiceState<S> {
    fn clone(&self) -> Self {
        Self {
            graph: Arc::clone(&self.graph),
            loader_window: self.loader_window,
        }
    }
}
