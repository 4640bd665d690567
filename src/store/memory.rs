//! In-memory graph store for testing.
//!
//! Sessions work on a private copy of the committed state and publish it on
//! commit. A commit fails with [`InMemoryError::Conflict`] if another session
//! committed after this one began, so two sessions can't both pass a cycle
//! check against the same stale closure and commit.
//!
//! The version is store-wide and a commit publishes the whole state, so this
//! is stricter than a per-repository lock: concurrent commits in unrelated
//! repositories conflict too, and the loser has to retry.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::{DescendantQuery, GraphSession, GraphStore, Inserted};
use crate::query::QuerySpec;
use crate::types::{
    Edge, Link, LinkId, NodeId, Repository, RepositoryId, Topic, TopicId,
};

/// Error type for in-memory store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InMemoryError {
    /// Another session committed first.
    #[error("Concurrent commit detected (session began at version {base}, store is at {current})")]
    Conflict {
        /// Version the session started from.
        base: u64,
        /// Version at commit time.
        current: u64,
    },
    /// Row to update was not found.
    #[error("Row not found: {0}")]
    RowNotFound(String),
    /// Failure injected by [`InMemoryGraphStore::fail_closure_writes_after`].
    #[error("Injected closure write failure")]
    InjectedFailure,
}

/// Mutable graph state.
///
/// Uses BTreeMap/BTreeSet for deterministic iteration order.
#[derive(Debug, Clone, Default)]
struct GraphState {
    repositories: BTreeMap<RepositoryId, Repository>,
    topics: BTreeMap<TopicId, Topic>,
    links: BTreeMap<LinkId, Link>,
    /// Parent -> direct children.
    children: BTreeMap<TopicId, BTreeSet<NodeId>>,
    /// Child -> direct parents.
    parents: BTreeMap<NodeId, BTreeSet<TopicId>>,
    /// Ancestor -> descendants (closure, no self-pairs).
    closure: BTreeMap<TopicId, BTreeSet<NodeId>>,
}

impl GraphState {
    fn down_set(&self, topic: TopicId) -> BTreeSet<NodeId> {
        let mut set = self.closure.get(&topic).cloned().unwrap_or_default();
        set.insert(NodeId::Topic(topic));
        set
    }

    fn within_all(&self, node: NodeId, refs: &[TopicId]) -> bool {
        refs.iter().all(|r| {
            NodeId::Topic(*r) == node
                || self.closure.get(r).is_some_and(|set| set.contains(&node))
        })
    }
}

#[derive(Debug, Default)]
struct Committed {
    version: u64,
    state: GraphState,
}

/// In-memory graph store for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGraphStore {
    committed: Arc<RwLock<Committed>>,
    /// Remaining closure writes before an injected failure.
    fault: Arc<Mutex<Option<usize>>>,
}

impl InMemoryGraphStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the session fail on a closure write once `n` writes have succeeded.
    pub fn fail_closure_writes_after(&self, n: usize) {
        *self.fault.lock() = Some(n);
    }

    /// Stop injecting failures.
    pub fn clear_faults(&self) {
        *self.fault.lock() = None;
    }

    /// All committed direct edges.
    pub fn direct_edges(&self) -> BTreeSet<Edge> {
        let committed = self.committed.read();
        committed
            .state
            .children
            .iter()
            .flat_map(|(parent, children)| children.iter().map(|c| Edge::new(*parent, *c)))
            .collect()
    }

    /// All committed closure rows as (ancestor, descendant) pairs.
    pub fn closure_rows(&self) -> BTreeSet<(TopicId, NodeId)> {
        let committed = self.committed.read();
        committed
            .state
            .closure
            .iter()
            .flat_map(|(ancestor, set)| set.iter().map(|d| (*ancestor, *d)))
            .collect()
    }

    /// Number of committed topics.
    pub fn num_topics(&self) -> usize {
        self.committed.read().state.topics.len()
    }

    /// Number of committed links.
    pub fn num_links(&self) -> usize {
        self.committed.read().state.links.len()
    }

    /// Number of commits so far.
    pub fn version(&self) -> u64 {
        self.committed.read().version
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    type Error = InMemoryError;
    type Session = InMemorySession;

    async fn begin(&self) -> Result<Self::Session, Self::Error> {
        let committed = self.committed.read();
        Ok(InMemorySession {
            committed: Arc::clone(&self.committed),
            fault: Arc::clone(&self.fault),
            base_version: committed.version,
            state: committed.state.clone(),
        })
    }
}

/// Session over an [`InMemoryGraphStore`].
#[derive(Debug)]
pub struct InMemorySession {
    committed: Arc<RwLock<Committed>>,
    fault: Arc<Mutex<Option<usize>>>,
    base_version: u64,
    state: GraphState,
}

impl InMemorySession {
    fn check_fault(&self) -> Result<(), InMemoryError> {
        let mut fault = self.fault.lock();
        match fault.as_mut() {
            Some(0) => Err(InMemoryError::InjectedFailure),
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl GraphSession for InMemorySession {
    type Error = InMemoryError;

    async fn lock_repository(&mut self, _id: RepositoryId) -> Result<(), Self::Error> {
        // Conflicts surface at commit.
        Ok(())
    }

    async fn get_repository(&mut self, id: RepositoryId) -> Result<Option<Repository>, Self::Error> {
        Ok(self.state.repositories.get(&id).cloned())
    }

    async fn insert_repository(&mut self, repository: &Repository) -> Result<(), Self::Error> {
        self.state
            .repositories
            .insert(repository.id, repository.clone());
        Ok(())
    }

    async fn get_topic(&mut self, id: TopicId) -> Result<Option<Topic>, Self::Error> {
        Ok(self.state.topics.get(&id).cloned())
    }

    async fn get_topics(&mut self, ids: &[TopicId]) -> Result<Vec<Topic>, Self::Error> {
        let wanted: BTreeSet<_> = ids.iter().copied().collect();
        Ok(wanted
            .iter()
            .filter_map(|id| self.state.topics.get(id).cloned())
            .collect())
    }

    async fn find_topic_by_name(
        &mut self,
        repository: RepositoryId,
        name: &str,
    ) -> Result<Option<Topic>, Self::Error> {
        Ok(self
            .state
            .topics
            .values()
            .find(|t| t.repository_id == repository && t.name == name)
            .cloned())
    }

    async fn insert_topic(&mut self, topic: &Topic) -> Result<Inserted<Topic>, Self::Error> {
        if let Some(existing) = self
            .find_topic_by_name(topic.repository_id, &topic.name)
            .await?
        {
            return Ok(Inserted::Existing(existing));
        }
        self.state.topics.insert(topic.id, topic.clone());
        Ok(Inserted::Created(topic.clone()))
    }

    async fn update_topic(&mut self, topic: &Topic) -> Result<(), Self::Error> {
        match self.state.topics.get_mut(&topic.id) {
            Some(stored) => {
                *stored = topic.clone();
                Ok(())
            }
            None => Err(InMemoryError::RowNotFound(format!("topic {}", topic.id))),
        }
    }

    async fn delete_topic(&mut self, id: TopicId) -> Result<(), Self::Error> {
        self.state.topics.remove(&id);
        Ok(())
    }

    async fn get_link(&mut self, id: LinkId) -> Result<Option<Link>, Self::Error> {
        Ok(self.state.links.get(&id).cloned())
    }

    async fn get_links(&mut self, ids: &[LinkId]) -> Result<Vec<Link>, Self::Error> {
        let wanted: BTreeSet<_> = ids.iter().copied().collect();
        Ok(wanted
            .iter()
            .filter_map(|id| self.state.links.get(id).cloned())
            .collect())
    }

    async fn insert_link(&mut self, link: &Link) -> Result<Inserted<Link>, Self::Error> {
        if let Some(existing) = self
            .state
            .links
            .values()
            .find(|l| l.repository_id == link.repository_id && l.url_hash == link.url_hash)
        {
            return Ok(Inserted::Existing(existing.clone()));
        }
        self.state.links.insert(link.id, link.clone());
        Ok(Inserted::Created(link.clone()))
    }

    async fn update_link(&mut self, link: &Link) -> Result<(), Self::Error> {
        match self.state.links.get_mut(&link.id) {
            Some(stored) => {
                stored.title = link.title.clone();
                Ok(())
            }
            None => Err(InMemoryError::RowNotFound(format!("link {}", link.id))),
        }
    }

    async fn delete_link(&mut self, id: LinkId) -> Result<(), Self::Error> {
        self.state.links.remove(&id);
        Ok(())
    }

    async fn insert_edge(&mut self, edge: Edge) -> Result<bool, Self::Error> {
        let added = self
            .state
            .children
            .entry(edge.parent)
            .or_default()
            .insert(edge.child);
        self.state
            .parents
            .entry(edge.child)
            .or_default()
            .insert(edge.parent);
        Ok(added)
    }

    async fn delete_edge(&mut self, edge: Edge) -> Result<bool, Self::Error> {
        let removed = self
            .state
            .children
            .get_mut(&edge.parent)
            .is_some_and(|set| set.remove(&edge.child));
        if let Some(set) = self.state.parents.get_mut(&edge.child) {
            set.remove(&edge.parent);
        }
        Ok(removed)
    }

    async fn parent_topics(&mut self, node: NodeId) -> Result<Vec<TopicId>, Self::Error> {
        Ok(self
            .state
            .parents
            .get(&node)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn child_nodes(&mut self, topic: TopicId) -> Result<Vec<NodeId>, Self::Error> {
        Ok(self
            .state
            .children
            .get(&topic)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn descendants(&mut self, topic: TopicId) -> Result<BTreeSet<NodeId>, Self::Error> {
        Ok(self.state.closure.get(&topic).cloned().unwrap_or_default())
    }

    async fn ancestors(&mut self, node: NodeId) -> Result<BTreeSet<TopicId>, Self::Error> {
        Ok(self
            .state
            .closure
            .iter()
            .filter(|(_, set)| set.contains(&node))
            .map(|(ancestor, _)| *ancestor)
            .collect())
    }

    async fn replace_descendants(
        &mut self,
        ancestor: TopicId,
        descendants: &BTreeSet<NodeId>,
    ) -> Result<(), Self::Error> {
        self.check_fault()?;
        if descendants.is_empty() {
            self.state.closure.remove(&ancestor);
        } else {
            self.state.closure.insert(ancestor, descendants.clone());
        }
        Ok(())
    }

    async fn purge_closure(&mut self, node: NodeId) -> Result<(), Self::Error> {
        self.check_fault()?;
        if let NodeId::Topic(topic) = node {
            self.state.closure.remove(&topic);
        }
        self.state.closure.retain(|_, set| {
            set.remove(&node);
            !set.is_empty()
        });
        Ok(())
    }

    async fn search_topics(&mut self, query: &DescendantQuery) -> Result<Vec<Topic>, Self::Error> {
        let refs = query.spec.topic_ids();
        let mut matches: Vec<Topic> = self
            .state
            .down_set(query.root)
            .into_iter()
            .filter(|node| self.state.within_all(*node, &refs))
            .filter_map(|node| node.as_topic())
            .filter_map(|id| self.state.topics.get(&id))
            .filter(|topic| {
                query
                    .spec
                    .string_tokens
                    .iter()
                    .all(|token| contains_ci(&topic.name, token))
            })
            .cloned()
            .collect();

        matches.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        matches.truncate(query.limit);
        Ok(matches)
    }

    async fn search_links(&mut self, query: &DescendantQuery) -> Result<Vec<Link>, Self::Error> {
        let refs = query.spec.topic_ids();
        let mut matches: Vec<Link> = self
            .state
            .down_set(query.root)
            .into_iter()
            .filter(|node| self.state.within_all(*node, &refs))
            .filter_map(|node| node.as_link())
            .filter_map(|id| self.state.links.get(&id))
            .filter(|link| {
                query.spec.string_tokens.iter().all(|token| {
                    contains_ci(&link.title, token)
                        || contains_ci(&link.url, token)
                        || contains_ci(&link.canonical_url, token)
                })
            })
            .cloned()
            .collect();

        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        matches.truncate(query.limit);
        Ok(matches)
    }

    async fn match_topics(
        &mut self,
        repository: RepositoryId,
        spec: &QuerySpec,
        limit: usize,
    ) -> Result<Vec<Topic>, Self::Error> {
        let wanted: Vec<String> = spec
            .full_text_tokens()
            .into_iter()
            .flat_map(words)
            .collect();
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let mut matches: Vec<Topic> = self
            .state
            .topics
            .values()
            .filter(|t| t.repository_id == repository)
            .filter(|t| {
                let name_words = words(&t.name);
                wanted.iter().all(|w| name_words.contains(w))
            })
            .cloned()
            .collect();

        matches.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn commit(self) -> Result<(), Self::Error> {
        let mut committed = self.committed.write();
        if committed.version != self.base_version {
            return Err(InMemoryError::Conflict {
                base: self.base_version,
                current: committed.version,
            });
        }
        committed.state = self.state;
        committed.version += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn topic(repo: RepositoryId, id: u128, name: &str) -> Topic {
        let mut t = Topic::new(repo, name);
        t.id = TopicId::new(Uuid::from_u128(id));
        t
    }

    #[tokio::test]
    async fn test_concurrent_commits_conflict_across_repositories() {
        let store = InMemoryGraphStore::new();
        let first_repo = RepositoryId::generate();
        let second_repo = RepositoryId::generate();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        first.lock_repository(first_repo).await.unwrap();
        second.lock_repository(second_repo).await.unwrap();
        first.insert_topic(&topic(first_repo, 1, "One")).await.unwrap();
        second.insert_topic(&topic(second_repo, 2, "Two")).await.unwrap();

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(matches!(err, InMemoryError::Conflict { base: 0, current: 1 }));
        assert_eq!(store.num_topics(), 1);

        let mut retry = store.begin().await.unwrap();
        retry.insert_topic(&topic(second_repo, 2, "Two")).await.unwrap();
        retry.commit().await.unwrap();
        assert_eq!(store.num_topics(), 2);
    }

    #[tokio::test]
    async fn test_insert_topic_is_idempotent_by_name() {
        let store = InMemoryGraphStore::new();
        let repo = RepositoryId::generate();
        let mut session = store.begin().await.unwrap();

        let first = session.insert_topic(&topic(repo, 1, "Foo")).await.unwrap();
        let second = session.insert_topic(&topic(repo, 2, "Foo")).await.unwrap();

        assert!(first.created());
        assert!(!second.created());
        assert_eq!(second.into_inner().id, TopicId::new(Uuid::from_u128(1)));
    }

    #[tokio::test]
    async fn test_parents_and_children() {
        let store = InMemoryGraphStore::new();
        let repo = RepositoryId::generate();
        let mut session = store.begin().await.unwrap();

        let a = topic(repo, 1, "A");
        let b = topic(repo, 2, "B");
        session.insert_topic(&a).await.unwrap();
        session.insert_topic(&b).await.unwrap();
        assert!(session.insert_edge(Edge::new(a.id, b.id)).await.unwrap());
        assert!(!session.insert_edge(Edge::new(a.id, b.id)).await.unwrap());

        assert_eq!(session.child_nodes(a.id).await.unwrap(), vec![NodeId::Topic(b.id)]);
        assert_eq!(session.parent_topics(NodeId::Topic(b.id)).await.unwrap(), vec![a.id]);

        assert!(session.delete_edge(Edge::new(a.id, b.id)).await.unwrap());
        assert!(session.child_nodes(a.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reachable_from_follows_direct_edges() {
        let store = InMemoryGraphStore::new();
        let repo = RepositoryId::generate();
        let mut session = store.begin().await.unwrap();

        let a = topic(repo, 1, "A");
        let b = topic(repo, 2, "B");
        let c = topic(repo, 3, "C");
        let link = LinkId::new(Uuid::from_u128(10));
        session.insert_edge(Edge::new(a.id, b.id)).await.unwrap();
        session.insert_edge(Edge::new(b.id, c.id)).await.unwrap();
        session.insert_edge(Edge::new(c.id, link)).await.unwrap();

        let reachable = session.reachable_from(a.id).await.unwrap();
        let expected: BTreeSet<NodeId> =
            [NodeId::Topic(b.id), NodeId::Topic(c.id), NodeId::Link(link)].into();
        assert_eq!(reachable, expected);
    }

    #[tokio::test]
    async fn test_uncommitted_session_is_discarded() {
        let store = InMemoryGraphStore::new();
        let repo = RepositoryId::generate();

        {
            let mut session = store.begin().await.unwrap();
            session.insert_topic(&topic(repo, 1, "Foo")).await.unwrap();
        }
        assert_eq!(store.num_topics(), 0);

        let mut session = store.begin().await.unwrap();
        session.insert_topic(&topic(repo, 1, "Foo")).await.unwrap();
        session.commit().await.unwrap();
        assert_eq!(store.num_topics(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_commit_conflicts() {
        let store = InMemoryGraphStore::new();
        let repo = RepositoryId::generate();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        first.insert_topic(&topic(repo, 1, "A")).await.unwrap();
        second.insert_topic(&topic(repo, 2, "B")).await.unwrap();

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(matches!(err, InMemoryError::Conflict { base: 0, current: 1 }));
        assert_eq!(store.num_topics(), 1);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = InMemoryGraphStore::new();
        let root = TopicId::new(Uuid::from_u128(1));
        store.fail_closure_writes_after(1);

        let mut session = store.begin().await.unwrap();
        let set = BTreeSet::new();
        session.replace_descendants(root, &set).await.unwrap();
        assert!(matches!(
            session.replace_descendants(root, &set).await,
            Err(InMemoryError::InjectedFailure)
        ));

        store.clear_faults();
        session.replace_descendants(root, &set).await.unwrap();
    }
}
