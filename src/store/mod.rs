//! Graph storage backends.
//!
//! The engine never holds a connection of its own. Every operation opens a
//! [`GraphSession`] from a [`GraphStore`], threads it explicitly through the
//! closure maintainer, cycle guard and search, and commits it once at the
//! end. Dropping a session without committing rolls it back.

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "postgres")]
pub mod schema;

use async_trait::async_trait;
use std::collections::{BTreeSet, VecDeque};

use crate::query::QuerySpec;
use crate::types::{
    Edge, Link, LinkId, NodeId, Repository, RepositoryId, Topic, TopicId,
};

/// Outcome of an insert-or-get on a unique key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inserted<T> {
    /// A new row was written.
    Created(T),
    /// A row with the same key already existed and was returned unchanged.
    Existing(T),
}

impl<T> Inserted<T> {
    /// Whether a new row was written.
    pub fn created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    /// The stored row.
    pub fn into_inner(self) -> T {
        match self {
            Self::Created(v) | Self::Existing(v) => v,
        }
    }
}

/// A descendant search request as seen by a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescendantQuery {
    /// Results must be in the down-set of this topic (itself included).
    pub root: TopicId,
    /// Parsed query: string tokens and topic references.
    pub spec: QuerySpec,
    /// Maximum number of rows to return.
    pub limit: usize,
}

/// Trait for graph storage backends.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Session type produced by [`GraphStore::begin`].
    type Session: GraphSession<Error = Self::Error>;

    /// Open a transaction-scoped session.
    async fn begin(&self) -> Result<Self::Session, Self::Error>;
}

/// A transaction-scoped handle onto the graph store.
///
/// Listing methods return results ordered by id for determinism.
#[async_trait]
pub trait GraphSession: Send {
    /// Error type for session operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Serialize mutations of one repository until this session ends.
    async fn lock_repository(&mut self, id: RepositoryId) -> Result<(), Self::Error>;

    /// Fetch a repository.
    async fn get_repository(&mut self, id: RepositoryId) -> Result<Option<Repository>, Self::Error>;

    /// Store a new repository.
    async fn insert_repository(&mut self, repository: &Repository) -> Result<(), Self::Error>;

    /// Fetch a topic.
    async fn get_topic(&mut self, id: TopicId) -> Result<Option<Topic>, Self::Error>;

    /// Fetch several topics; missing ids are skipped.
    async fn get_topics(&mut self, ids: &[TopicId]) -> Result<Vec<Topic>, Self::Error>;

    /// Find a topic by exact name within a repository.
    async fn find_topic_by_name(
        &mut self,
        repository: RepositoryId,
        name: &str,
    ) -> Result<Option<Topic>, Self::Error>;

    /// Insert a topic unless one with the same `(repository, name)` exists.
    async fn insert_topic(&mut self, topic: &Topic) -> Result<Inserted<Topic>, Self::Error>;

    /// Overwrite a topic's name, synonyms, description and time range.
    async fn update_topic(&mut self, topic: &Topic) -> Result<(), Self::Error>;

    /// Remove a topic row. Edges and closure rows must already be gone.
    async fn delete_topic(&mut self, id: TopicId) -> Result<(), Self::Error>;

    /// Fetch a link.
    async fn get_link(&mut self, id: LinkId) -> Result<Option<Link>, Self::Error>;

    /// Fetch several links; missing ids are skipped.
    async fn get_links(&mut self, ids: &[LinkId]) -> Result<Vec<Link>, Self::Error>;

    /// Insert a link unless one with the same `(repository, url_hash)` exists.
    async fn insert_link(&mut self, link: &Link) -> Result<Inserted<Link>, Self::Error>;

    /// Overwrite a link's title.
    async fn update_link(&mut self, link: &Link) -> Result<(), Self::Error>;

    /// Remove a link row. Edges and closure rows must already be gone.
    async fn delete_link(&mut self, id: LinkId) -> Result<(), Self::Error>;

    /// Insert a direct edge. Returns false if it already existed.
    async fn insert_edge(&mut self, edge: Edge) -> Result<bool, Self::Error>;

    /// Delete a direct edge. Returns false if it did not exist.
    async fn delete_edge(&mut self, edge: Edge) -> Result<bool, Self::Error>;

    /// Direct parent topics of a node.
    async fn parent_topics(&mut self, node: NodeId) -> Result<Vec<TopicId>, Self::Error>;

    /// Direct children of a topic.
    async fn child_nodes(&mut self, topic: TopicId) -> Result<Vec<NodeId>, Self::Error>;

    /// Everything reachable from `topic` over direct edges, excluding itself.
    ///
    /// This reads direct edges only, never the closure tables, so it is the
    /// ground truth the closure is rebuilt from.
    async fn reachable_from(&mut self, topic: TopicId) -> Result<BTreeSet<NodeId>, Self::Error> {
        let mut seen: BTreeSet<NodeId> = BTreeSet::new();
        let mut queue: VecDeque<TopicId> = VecDeque::from([topic]);

        while let Some(current) = queue.pop_front() {
            for child in self.child_nodes(current).await? {
                if child == NodeId::Topic(topic) || !seen.insert(child) {
                    continue;
                }
                if let NodeId::Topic(child_topic) = child {
                    queue.push_back(child_topic);
                }
            }
        }

        Ok(seen)
    }

    /// Closure read: every node below `topic`, excluding itself.
    async fn descendants(&mut self, topic: TopicId) -> Result<BTreeSet<NodeId>, Self::Error>;

    /// Closure read: every topic above `node`, excluding itself.
    async fn ancestors(&mut self, node: NodeId) -> Result<BTreeSet<TopicId>, Self::Error>;

    /// Replace every closure row whose ancestor is `ancestor`.
    async fn replace_descendants(
        &mut self,
        ancestor: TopicId,
        descendants: &BTreeSet<NodeId>,
    ) -> Result<(), Self::Error>;

    /// Remove every closure row mentioning `node` on either side.
    async fn purge_closure(&mut self, node: NodeId) -> Result<(), Self::Error>;

    /// Topics in the down-set of `query.root` matching the query.
    async fn search_topics(&mut self, query: &DescendantQuery) -> Result<Vec<Topic>, Self::Error>;

    /// Links in the down-set of `query.root` matching the query.
    async fn search_links(&mut self, query: &DescendantQuery) -> Result<Vec<Link>, Self::Error>;

    /// Repository-wide full-text topic match.
    async fn match_topics(
        &mut self,
        repository: RepositoryId,
        spec: &QuerySpec,
        limit: usize,
    ) -> Result<Vec<Topic>, Self::Error>;

    /// Make every change in this session durable.
    async fn commit(self) -> Result<(), Self::Error>;
}

pub use memory::InMemoryGraphStore;

#[cfg(feature = "postgres")]
pub use postgres::PostgresGraphStore;
