//! Request-scoped batch loading of topics.
//!
//! Lookups issued within one collection window are answered by a single
//! multi-key fetch. The first caller of a window becomes its leader: it
//! sleeps for the window, takes every queued id and fetches them together,
//! then hands each waiter its row.
//!
//! ```text
//! load(a) ─┐
//! load(b) ─┼─ window ─→ get_topics([a, b, c]) ─→ a, b, c
//! load(c) ─┘
//! ```

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinSet;

use crate::engine::TopicGraph;
use crate::store::GraphStore;
use crate::types::{Topic, TopicId};

/// Error type for batched loads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    /// The batch fetch failed.
    #[error("Batch load failed: {0}")]
    Fetch(String),
    /// The batch leader went away before answering.
    #[error("Batch load was abandoned")]
    Abandoned,
}

type Reply = oneshot::Sender<Result<Option<Topic>, LoadError>>;

/// Batches topic lookups for one request.
pub struct TopicLoader<S> {
    graph: Arc<TopicGraph<S>>,
    window: Duration,
    pending: Arc<Mutex<Option<Vec<(TopicId, Reply)>>>>,
    batches: Arc<Mutex<usize>>,
}

impl<S> Clone for TopicLoader<S> {
    fn clone(&self) -> Self {
        Self {
            graph: Arc::clone(&self.graph),
            window: self.window,
            pending: Arc::clone(&self.pending),
            batches: Arc::clone(&self.batches),
        }
    }
}

impl<S: GraphStore + 'static> TopicLoader<S> {
    /// Create a loader with the given collection window.
    pub fn new(graph: Arc<TopicGraph<S>>, window: Duration) -> Self {
        Self {
            graph,
            window,
            pending: Arc::new(Mutex::new(None)),
            batches: Arc::new(Mutex::new(0)),
        }
    }

    /// Number of multi-key fetches issued so far.
    pub fn batches_issued(&self) -> usize {
        *self.batches.lock()
    }

    /// Load one topic, sharing the fetch with concurrent callers.
    pub async fn load(&self, id: TopicId) -> Result<Option<Topic>, LoadError> {
        let (tx, rx) = oneshot::channel();
        let leader = {
            let mut pending = self.pending.lock();
            match pending.as_mut() {
                Some(queue) => {
                    queue.push((id, tx));
                    false
                }
                None => {
                    *pending = Some(vec![(id, tx)]);
                    true
                }
            }
        };

        if leader {
            tokio::time::sleep(self.window).await;
            self.dispatch().await;
        }

        rx.await.unwrap_or(Err(LoadError::Abandoned))
    }

    /// Load several topics concurrently through the batch window.
    ///
    /// Missing topics are skipped; order follows `ids`.
    pub async fn load_many(&self, ids: &[TopicId]) -> Result<Vec<Topic>, LoadError> {
        let mut tasks = JoinSet::new();
        for (index, id) in ids.iter().copied().enumerate() {
            let loader = self.clone();
            tasks.spawn(async move { (index, loader.load(id).await) });
        }

        let mut found = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            let (index, result) = joined.map_err(|_| LoadError::Abandoned)?;
            if let Some(topic) = result? {
                found.insert(index, topic);
            }
        }
        Ok(found.into_values().collect())
    }

    async fn dispatch(&self) {
        let Some(queue) = self.pending.lock().take() else {
            return;
        };
        *self.batches.lock() += 1;

        let mut ids: Vec<TopicId> = queue.iter().map(|(id, _)| *id).collect();
        ids.sort();
        ids.dedup();
        tracing::debug!(keys = ids.len(), waiters = queue.len(), "Dispatching topic batch");

        match self.graph.get_topics(&ids).await {
            Ok(topics) => {
                let by_id: BTreeMap<TopicId, Topic> =
                    topics.into_iter().map(|t| (t.id, t)).collect();
                for (id, reply) in queue {
                    let _ = reply.send(Ok(by_id.get(&id).cloned()));
                }
            }
            Err(e) => {
                let message = e.to_string();
                for (_, reply) in queue {
                    let _ = reply.send(Err(LoadError::Fetch(message.clone())));
                }
            }
        }
    }
}
