//! Mutation orchestration.
//!
//! [`TopicGraph`] is the entry point for every graph operation. Each call
//! opens one session, takes the repository lock before any cycle check,
//! threads the session through closure maintenance, cycle guarding and
//! search, and commits once at the end. Any error drops the session and
//! rolls everything back.
//!
//! # Example
//!
//! ```rust
//! use digraph_kernel::engine::TopicGraph;
//! use digraph_kernel::store::InMemoryGraphStore;
//!
//! # tokio_test_block(async {
//! let graph = TopicGraph::new(InMemoryGraphStore::new());
//! let repo = graph.create_repository("wiki").await.unwrap();
//!
//! let science = graph
//!     .upsert_topic(repo.repository.id, "Science", None, &[])
//!     .await
//!     .unwrap();
//! assert!(science.created);
//!
//! let results = graph
//!     .search(repo.root_topic.id, "scien", 10, 10)
//!     .await
//!     .unwrap();
//! assert_eq!(results.topics.len(), 1);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

mod links;
mod topics;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::deadline::Deadline;
use crate::error::{EngineError, StoreResultExt};
use crate::fetch::{NoopFetcher, PageFetcher};
use crate::query::QuerySpec;
use crate::search::{self, SearchResults};
use crate::store::{GraphSession, GraphStore};
use crate::types::{
    Alert, Link, LinkId, NodeId, Repository, RepositoryId, Topic, TopicId,
};

/// Result of creating a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRepositoryResult {
    /// The new repository.
    pub repository: Repository,
    /// Its root topic.
    pub root_topic: Topic,
}

/// Result of a topic upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertTopicResult {
    /// The stored topic; `None` when the name was rejected.
    pub topic: Option<Topic>,
    /// Whether a new topic was written.
    pub created: bool,
    /// Validation warnings.
    pub alerts: Vec<Alert>,
}

/// Result of a link upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertLinkResult {
    /// The stored link; `None` when the URL was rejected.
    pub link: Option<Link>,
    /// Whether a new link was written.
    pub created: bool,
    /// Validation warnings.
    pub alerts: Vec<Alert>,
}

/// A topic after an update, with any warnings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicUpdate {
    /// The topic as stored after the operation.
    pub topic: Topic,
    /// Validation warnings.
    pub alerts: Vec<Alert>,
}

/// A link after an update, with any warnings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkUpdate {
    /// The link as stored after the operation.
    pub link: Link,
    /// Validation warnings.
    pub alerts: Vec<Alert>,
}

/// Result of deleting a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteTopicResult {
    /// The removed topic.
    pub deleted_topic_id: TopicId,
}

/// Result of deleting a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteLinkResult {
    /// The removed link.
    pub deleted_link_id: LinkId,
}

/// Result of merging a topic into its parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeTopicResult {
    /// The surviving topic.
    pub topic: Topic,
    /// The merged-away topic.
    pub deleted_topic_id: TopicId,
    /// Validation warnings.
    pub alerts: Vec<Alert>,
}

/// The topic graph engine.
pub struct TopicGraph<S> {
    store: S,
    fetcher: Arc<dyn PageFetcher>,
    config: EngineConfig,
}

impl<S: GraphStore> TopicGraph<S> {
    /// Create an engine over `store` with default configuration and no
    /// page fetching.
    pub fn new(store: S) -> Self {
        Self {
            store,
            fetcher: Arc::new(NoopFetcher),
            config: EngineConfig::default(),
        }
    }

    /// Use `fetcher` to look up titles of new links.
    pub fn with_fetcher(mut self, fetcher: impl PageFetcher + 'static) -> Self {
        self.fetcher = Arc::new(fetcher);
        self
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn deadline(&self) -> Deadline {
        Deadline::from_timeout(self.config.operation_timeout)
    }

    async fn begin(&self) -> Result<S::Session, EngineError> {
        self.store.begin().await.context("begin session")
    }

    /// Create a repository together with its root topic.
    pub async fn create_repository(
        &self,
        name: &str,
    ) -> Result<CreateRepositoryResult, EngineError> {
        let mut session = self.begin().await?;

        let repository_id = RepositoryId::generate();
        let root_topic = Topic::root(repository_id);
        let repository = Repository {
            id: repository_id,
            name: name.trim().to_string(),
            root_topic_id: root_topic.id,
            created_at: root_topic.created_at,
        };

        session
            .insert_repository(&repository)
            .await
            .context("insert repository")?;
        session
            .insert_topic(&root_topic)
            .await
            .context("insert root topic")?;
        session.commit().await.context("commit")?;

        tracing::info!(
            repository_id = %repository.id,
            root_topic_id = %root_topic.id,
            "Created repository"
        );
        Ok(CreateRepositoryResult {
            repository,
            root_topic,
        })
    }

    /// Fetch a repository.
    pub async fn get_repository(&self, id: RepositoryId) -> Result<Option<Repository>, EngineError> {
        let mut session = self.begin().await?;
        session.get_repository(id).await.context("get repository")
    }

    /// Fetch a topic.
    pub async fn get_topic(&self, id: TopicId) -> Result<Option<Topic>, EngineError> {
        let mut session = self.begin().await?;
        session.get_topic(id).await.context("get topic")
    }

    /// Fetch several topics in one round trip; missing ids are skipped.
    pub async fn get_topics(&self, ids: &[TopicId]) -> Result<Vec<Topic>, EngineError> {
        let mut session = self.begin().await?;
        session.get_topics(ids).await.context("get topics")
    }

    /// Fetch a link.
    pub async fn get_link(&self, id: LinkId) -> Result<Option<Link>, EngineError> {
        let mut session = self.begin().await?;
        session.get_link(id).await.context("get link")
    }

    /// Ids of the direct parent topics of a topic or link.
    pub async fn parent_topic_ids(&self, node: NodeId) -> Result<Vec<TopicId>, EngineError> {
        let mut session = self.begin().await?;
        session.parent_topics(node).await.context("list parents")
    }

    /// Direct parent topics of a topic or link.
    pub async fn parent_topics(&self, node: NodeId) -> Result<Vec<Topic>, EngineError> {
        let mut session = self.begin().await?;
        let ids = session.parent_topics(node).await.context("list parents")?;
        session.get_topics(&ids).await.context("get topics")
    }

    /// Direct child topics of a topic.
    pub async fn child_topics(&self, topic: TopicId) -> Result<Vec<Topic>, EngineError> {
        let mut session = self.begin().await?;
        let ids: Vec<TopicId> = session
            .child_nodes(topic)
            .await
            .context("list children")?
            .into_iter()
            .filter_map(|node| node.as_topic())
            .collect();
        session.get_topics(&ids).await.context("get topics")
    }

    /// Direct child links of a topic.
    pub async fn child_links(&self, topic: TopicId) -> Result<Vec<Link>, EngineError> {
        let mut session = self.begin().await?;
        let ids: Vec<LinkId> = session
            .child_nodes(topic)
            .await
            .context("list children")?
            .into_iter()
            .filter_map(|node| node.as_link())
            .collect();
        session.get_links(&ids).await.context("get links")
    }

    /// Search below `root` with independent topic and link limits.
    pub async fn search(
        &self,
        root: TopicId,
        query: &str,
        topic_limit: usize,
        link_limit: usize,
    ) -> Result<SearchResults, EngineError> {
        let deadline = self.deadline();
        let spec = QuerySpec::parse(query);
        let mut session = self.begin().await?;
        load_topic(&mut session, root).await?;
        search::search(&mut session, &deadline, root, &spec, topic_limit, link_limit).await
    }

    /// Search below `root` for one page of `page_size` results, topics first
    /// and links filling whatever the topics left over.
    pub async fn search_page(
        &self,
        root: TopicId,
        query: &str,
        page_size: usize,
    ) -> Result<SearchResults, EngineError> {
        let deadline = self.deadline();
        let spec = QuerySpec::parse(query);
        let mut session = self.begin().await?;
        load_topic(&mut session, root).await?;
        search::search_page(&mut session, &deadline, root, &spec, page_size).await
    }

    /// Repository-wide topic lookup: every query word must be a word of the
    /// topic name.
    pub async fn match_topics(
        &self,
        repository: RepositoryId,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Topic>, EngineError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let spec = QuerySpec::parse(query);
        let mut session = self.begin().await?;
        session
            .match_topics(repository, &spec, limit)
            .await
            .context("match topics")
    }
}

/// Fetch a topic or fail with [`EngineError::TopicNotFound`].
async fn load_topic<S: GraphSession>(session: &mut S, id: TopicId) -> Result<Topic, EngineError> {
    session
        .get_topic(id)
        .await
        .context("get topic")?
        .ok_or(EngineError::TopicNotFound(id))
}

/// Fetch a link or fail with [`EngineError::LinkNotFound`].
async fn load_link<S: GraphSession>(session: &mut S, id: LinkId) -> Result<Link, EngineError> {
    session
        .get_link(id)
        .await
        .context("get link")?
        .ok_or(EngineError::LinkNotFound(id))
}

/// Fetch a repository or fail with [`EngineError::RepositoryNotFound`].
async fn load_repository<S: GraphSession>(
    session: &mut S,
    id: RepositoryId,
) -> Result<Repository, EngineError> {
    session
        .get_repository(id)
        .await
        .context("get repository")?
        .ok_or(EngineError::RepositoryNotFound(id))
}

/// Load requested parent topics, defaulting to the repository root.
///
/// Every id must name a topic of `repository`.
async fn resolve_parents<S: GraphSession>(
    session: &mut S,
    repository: &Repository,
    ids: &[TopicId],
) -> Result<Vec<Topic>, EngineError> {
    let wanted: BTreeSet<TopicId> = if ids.is_empty() {
        BTreeSet::from([repository.root_topic_id])
    } else {
        ids.iter().copied().collect()
    };

    let found = session
        .get_topics(&wanted.iter().copied().collect::<Vec<_>>())
        .await
        .context("get parent topics")?;

    for id in &wanted {
        let known = found
            .iter()
            .any(|t| t.id == *id && t.repository_id == repository.id);
        if !known {
            return Err(EngineError::TopicNotFound(*id));
        }
    }
    Ok(found)
}

/// Warn if `topic`'s derived name is taken by another topic of its repository.
async fn name_clash<S: GraphSession>(
    session: &mut S,
    topic: &Topic,
) -> Result<Option<Alert>, EngineError> {
    let holder = session
        .find_topic_by_name(topic.repository_id, &topic.name)
        .await
        .context("find topic by name")?;
    Ok(holder
        .filter(|other| other.id != topic.id)
        .map(|_| Alert::duplicate_topic_name(&topic.name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryGraphStore;

    #[tokio::test]
    async fn test_create_repository_has_root() {
        let graph = TopicGraph::new(InMemoryGraphStore::new());
        let created = graph.create_repository(" wiki ").await.unwrap();

        assert_eq!(created.repository.name, "wiki");
        assert!(created.root_topic.root);
        assert_eq!(created.repository.root_topic_id, created.root_topic.id);

        let root = graph.get_topic(created.root_topic.id).await.unwrap().unwrap();
        assert_eq!(root.name, crate::types::ROOT_TOPIC_NAME);
    }

    #[tokio::test]
    async fn test_search_unknown_root_is_not_found() {
        let graph = TopicGraph::new(InMemoryGraphStore::new());
        let err = graph
            .search(TopicId::generate(), "anything", 5, 5)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_match_topics_requires_whole_words() {
        let graph = TopicGraph::new(InMemoryGraphStore::new());
        let repo = graph.create_repository("wiki").await.unwrap().repository;
        graph.upsert_topic(repo.id, "New York City", None, &[]).await.unwrap();
        graph.upsert_topic(repo.id, "Newark", None, &[]).await.unwrap();

        let found = graph.match_topics(repo.id, "york new", 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "New York City");

        assert!(graph.match_topics(repo.id, "new", 0).await.unwrap().is_empty());
    }
}
