//! Reachability queries over the topic graph.
//!
//! [`ReachabilitySet`] is the read contract every consumer of reachability
//! relies on: exact descendant and ancestor sets, excluding the node itself.
//! Two implementations exist:
//!
//! - [`ClosureTable`] reads the materialized closure kept by
//!   [`closure`](crate::closure). This is what the engine uses.
//! - [`OnlineReachability`] walks direct edges, memoizing per-topic results.
//!   It never touches the closure tables, so it doubles as an oracle for
//!   checking them.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::store::GraphSession;
use crate::types::{NodeId, TopicId};

/// Exact reachability over the current graph.
#[async_trait]
pub trait ReachabilitySet: Send {
    /// Error type for reachability reads.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Every node reachable below `topic`, excluding `topic`.
    async fn descendants_of(&mut self, topic: TopicId) -> Result<BTreeSet<NodeId>, Self::Error>;

    /// Every topic above `node`, excluding `node`.
    async fn ancestors_of(&mut self, node: NodeId) -> Result<BTreeSet<TopicId>, Self::Error>;
}

/// Reachability read from the materialized closure.
pub struct ClosureTable<'a, S> {
    session: &'a mut S,
}

impl<'a, S: GraphSession> ClosureTable<'a, S> {
    /// Read reachability through `session`.
    pub fn new(session: &'a mut S) -> Self {
        Self { session }
    }
}

#[async_trait]
impl<S: GraphSession> ReachabilitySet for ClosureTable<'_, S> {
    type Error = S::Error;

    async fn descendants_of(&mut self, topic: TopicId) -> Result<BTreeSet<NodeId>, Self::Error> {
        self.session.descendants(topic).await
    }

    async fn ancestors_of(&mut self, node: NodeId) -> Result<BTreeSet<TopicId>, Self::Error> {
        self.session.ancestors(node).await
    }
}

/// Reachability computed by walking direct edges.
///
/// Memoized results are only valid while the graph is unchanged; create a
/// fresh instance after every mutation.
pub struct OnlineReachability<'a, S> {
    session: &'a mut S,
    down: BTreeMap<TopicId, BTreeSet<NodeId>>,
    up: BTreeMap<NodeId, BTreeSet<TopicId>>,
}

impl<'a, S: GraphSession> OnlineReachability<'a, S> {
    /// Walk the graph through `session`.
    pub fn new(session: &'a mut S) -> Self {
        Self {
            session,
            down: BTreeMap::new(),
            up: BTreeMap::new(),
        }
    }
}

#[async_trait]
impl<S: GraphSession> ReachabilitySet for OnlineReachability<'_, S> {
    type Error = S::Error;

    async fn descendants_of(&mut self, topic: TopicId) -> Result<BTreeSet<NodeId>, Self::Error> {
        if let Some(known) = self.down.get(&topic) {
            return Ok(known.clone());
        }

        let mut seen: BTreeSet<NodeId> = BTreeSet::new();
        let mut queue: VecDeque<TopicId> = VecDeque::from([topic]);

        while let Some(current) = queue.pop_front() {
            for child in self.session.child_nodes(current).await? {
                if child == NodeId::Topic(topic) || !seen.insert(child) {
                    continue;
                }
                let NodeId::Topic(child_topic) = child else {
                    continue;
                };
                match self.down.get(&child_topic) {
                    // Memoized subtree: take it whole instead of expanding.
                    Some(below) => seen.extend(below.iter().copied()),
                    None => queue.push_back(child_topic),
                }
            }
        }

        seen.remove(&NodeId::Topic(topic));
        self.down.insert(topic, seen.clone());
        Ok(seen)
    }

    async fn ancestors_of(&mut self, node: NodeId) -> Result<BTreeSet<TopicId>, Self::Error> {
        if let Some(known) = self.up.get(&node) {
            return Ok(known.clone());
        }

        let mut seen: BTreeSet<TopicId> = BTreeSet::new();
        let mut queue: VecDeque<NodeId> = VecDeque::from([node]);

        while let Some(current) = queue.pop_front() {
            for parent in self.session.parent_topics(current).await? {
                if NodeId::Topic(parent) == node || !seen.insert(parent) {
                    continue;
                }
                match self.up.get(&NodeId::Topic(parent)) {
                    Some(above) => seen.extend(above.iter().copied()),
                    None => queue.push_back(NodeId::Topic(parent)),
                }
            }
        }

        if let NodeId::Topic(topic) = node {
            seen.remove(&topic);
        }
        self.up.insert(node, seen.clone());
        Ok(seen)
    }
}
