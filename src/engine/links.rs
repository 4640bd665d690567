//! Link mutations.

use std::collections::BTreeSet;

use super::{
    load_link, load_repository, resolve_parents, DeleteLinkResult, LinkUpdate, TopicGraph,
    UpsertLinkResult,
};
use crate::closure;
use crate::error::{EngineError, StoreResultExt};
use crate::normalize::CanonicalUrl;
use crate::store::{GraphSession, GraphStore, Inserted};
use crate::types::{Alert, Edge, Link, LinkId, NodeId, RepositoryId, TopicId};

impl<S: GraphStore> TopicGraph<S> {
    /// Create a link, or update the existing link with the same canonical URL.
    ///
    /// Without a title the page fetcher is asked for one; a failed fetch
    /// leaves the title empty. An existing link gets the new title (if one
    /// is given) and any new parent topics.
    pub async fn upsert_link(
        &self,
        repository_id: RepositoryId,
        url: &str,
        title: Option<String>,
        parent_ids: &[TopicId],
    ) -> Result<UpsertLinkResult, EngineError> {
        let canonical = match CanonicalUrl::parse(url) {
            Ok(canonical) => canonical,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Rejected link url");
                return Ok(UpsertLinkResult {
                    link: None,
                    created: false,
                    alerts: vec![Alert::invalid_url(url)],
                });
            }
        };

        let given_title = title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        // Fetched before the session opens so no lock is held during I/O.
        let initial_title = match &given_title {
            Some(title) => title.clone(),
            None => self.fetch_title(&canonical).await,
        };

        let deadline = self.deadline();
        let mut session = self.begin().await?;
        session
            .lock_repository(repository_id)
            .await
            .context("lock repository")?;
        let repository = load_repository(&mut session, repository_id).await?;

        let candidate = Link::new(repository.id, &canonical, initial_title);
        let (mut link, created) = match session
            .insert_link(&candidate)
            .await
            .context("insert link")?
        {
            Inserted::Created(link) => (link, true),
            Inserted::Existing(link) => (link, false),
        };

        if !created {
            if let Some(title) = given_title.filter(|t| *t != link.title) {
                link.title = title;
                session.update_link(&link).await.context("update link")?;
            }
        }

        // An existing link keeps its parents when none are requested.
        if created || !parent_ids.is_empty() {
            let parents = resolve_parents(&mut session, &repository, parent_ids).await?;
            for parent in &parents {
                closure::add_edge(&mut session, &deadline, Edge::new(parent.id, link.id)).await?;
            }
        }
        session.commit().await.context("commit")?;

        tracing::info!(
            link_id = %link.id,
            repository_id = %repository.id,
            created,
            "Upserted link"
        );
        Ok(UpsertLinkResult {
            link: Some(link),
            created,
            alerts: Vec::new(),
        })
    }

    /// Replace the parent topics of a link.
    ///
    /// An empty request puts the link under the repository root. Links are
    /// leaves, so no parent can close a cycle.
    pub async fn update_link_parent_topics(
        &self,
        link_id: LinkId,
        parent_ids: &[TopicId],
    ) -> Result<LinkUpdate, EngineError> {
        let deadline = self.deadline();
        let mut session = self.begin().await?;
        let link = load_link(&mut session, link_id).await?;
        session
            .lock_repository(link.repository_id)
            .await
            .context("lock repository")?;
        let repository = load_repository(&mut session, link.repository_id).await?;

        let requested: BTreeSet<TopicId> = resolve_parents(&mut session, &repository, parent_ids)
            .await?
            .into_iter()
            .map(|t| t.id)
            .collect();
        let current: BTreeSet<TopicId> = session
            .parent_topics(NodeId::Link(link.id))
            .await
            .context("list parents")?
            .into_iter()
            .collect();

        for added in requested.difference(&current) {
            closure::add_edge(&mut session, &deadline, Edge::new(*added, link.id)).await?;
        }
        for removed in current.difference(&requested) {
            closure::remove_edge(&mut session, &deadline, Edge::new(*removed, link.id)).await?;
        }
        session.commit().await.context("commit")?;

        tracing::info!(
            link_id = %link.id,
            parents = requested.len(),
            "Updated link parent topics"
        );
        Ok(LinkUpdate {
            link,
            alerts: Vec::new(),
        })
    }

    /// Delete a link with its edges and closure rows.
    pub async fn delete_link(&self, link_id: LinkId) -> Result<DeleteLinkResult, EngineError> {
        let deadline = self.deadline();
        let mut session = self.begin().await?;
        let link = load_link(&mut session, link_id).await?;
        session
            .lock_repository(link.repository_id)
            .await
            .context("lock repository")?;

        closure::detach_node(&mut session, &deadline, NodeId::Link(link.id)).await?;
        session.delete_link(link.id).await.context("delete link")?;
        session.commit().await.context("commit")?;

        tracing::info!(link_id = %link.id, "Deleted link");
        Ok(DeleteLinkResult {
            deleted_link_id: link.id,
        })
    }

    /// Ask the fetcher for a title, logging and swallowing failures.
    async fn fetch_title(&self, url: &CanonicalUrl) -> String {
        match self.fetcher.fetch_title(url).await {
            Ok(title) => title.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(url = %url.as_str(), error = %e, "Title fetch failed, storing empty title");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchError, PageFetcher};
    use crate::store::InMemoryGraphStore;
    use crate::types::AlertCode;
    use async_trait::async_trait;

    struct FixedTitle(Result<Option<String>, FetchError>);

    #[async_trait]
    impl PageFetcher for FixedTitle {
        async fn fetch_title(&self, _url: &CanonicalUrl) -> Result<Option<String>, FetchError> {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn test_fetched_title_is_used() {
        let graph = TopicGraph::new(InMemoryGraphStore::new())
            .with_fetcher(FixedTitle(Ok(Some("Fetched".to_string()))));
        let repo = graph.create_repository("wiki").await.unwrap().repository;

        let result = graph
            .upsert_link(repo.id, "https://example.com/a", None, &[])
            .await
            .unwrap();
        assert_eq!(result.link.unwrap().title, "Fetched");
    }

    #[tokio::test]
    async fn test_fetch_failure_stores_empty_title() {
        let graph = TopicGraph::new(InMemoryGraphStore::new())
            .with_fetcher(FixedTitle(Err(FetchError::Timeout)));
        let repo = graph.create_repository("wiki").await.unwrap().repository;

        let result = graph
            .upsert_link(repo.id, "https://example.com/a", None, &[])
            .await
            .unwrap();
        assert!(result.created);
        assert_eq!(result.link.unwrap().title, "");
    }

    #[tokio::test]
    async fn test_reupsert_updates_title_and_adds_parent() {
        let graph = TopicGraph::new(InMemoryGraphStore::new());
        let created = graph.create_repository("wiki").await.unwrap();
        let repo = created.repository.id;
        let topic = graph
            .upsert_topic(repo, "Reading", None, &[])
            .await
            .unwrap()
            .topic
            .unwrap();

        let first = graph
            .upsert_link(repo, "https://example.com/a#intro", Some("Old".into()), &[])
            .await
            .unwrap();
        let second = graph
            .upsert_link(repo, "https://EXAMPLE.com/a", Some("New".into()), &[topic.id])
            .await
            .unwrap();

        assert!(first.created);
        assert!(!second.created);
        let link = second.link.unwrap();
        assert_eq!(link.id, first.link.unwrap().id);
        assert_eq!(link.title, "New");

        let parents: BTreeSet<TopicId> = graph
            .parent_topics(NodeId::Link(link.id))
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(parents, BTreeSet::from([created.root_topic.id, topic.id]));
    }

    #[tokio::test]
    async fn test_invalid_url_alert() {
        let graph = TopicGraph::new(InMemoryGraphStore::new());
        let repo = graph.create_repository("wiki").await.unwrap().repository;
        let result = graph.upsert_link(repo.id, "not a url", None, &[]).await.unwrap();
        assert!(result.link.is_none());
        assert!(result.alerts[0].is(AlertCode::InvalidUrl));
    }

    #[tokio::test]
    async fn test_empty_parent_request_moves_link_to_root() {
        let graph = TopicGraph::new(InMemoryGraphStore::new());
        let created = graph.create_repository("wiki").await.unwrap();
        let repo = created.repository.id;
        let topic = graph.upsert_topic(repo, "T", None, &[]).await.unwrap().topic.unwrap();
        let link = graph
            .upsert_link(repo, "https://example.com/", Some("x".into()), &[topic.id])
            .await
            .unwrap()
            .link
            .unwrap();

        graph.update_link_parent_topics(link.id, &[]).await.unwrap();
        let parents = graph.parent_topics(NodeId::Link(link.id)).await.unwrap();
        assert_eq!(parents.len(), 1);
        assert_eq!(parents[0].id, created.root_topic.id);
    }
}
