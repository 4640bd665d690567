//! Descendant search.
//!
//! Candidates are narrowed in three steps:
//!
//! 1. the down-set of the root topic (the root itself included),
//! 2. intersected with the down-set of every `in:` topic reference,
//! 3. filtered by every string token as a case-insensitive substring of the
//!    topic name, or of the link title or URL.
//!
//! Topic and link results are capped independently. A limit of zero returns
//! nothing without touching the store, which lets a caller spend a single
//! page budget on topics first and links second.

use serde::{Deserialize, Serialize};

use crate::deadline::Deadline;
use crate::error::{EngineError, StoreResultExt};
use crate::query::QuerySpec;
use crate::store::{DescendantQuery, GraphSession};
use crate::types::{Link, Topic, TopicId};

/// Topics and links found under a root topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResults {
    /// Matching topics.
    pub topics: Vec<Topic>,
    /// Matching links.
    pub links: Vec<Link>,
}

impl SearchResults {
    /// Total number of results.
    pub fn len(&self) -> usize {
        self.topics.len() + self.links.len()
    }

    /// Whether nothing matched.
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty() && self.links.is_empty()
    }
}

/// Topics below `root` (itself included) matching `spec`.
pub async fn descendant_topics<S: GraphSession>(
    session: &mut S,
    root: TopicId,
    spec: &QuerySpec,
    limit: usize,
) -> Result<Vec<Topic>, EngineError> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let query = DescendantQuery {
        root,
        spec: spec.clone(),
        limit,
    };
    session.search_topics(&query).await.context("search topics")
}

/// Links below `root` matching `spec`.
pub async fn descendant_links<S: GraphSession>(
    session: &mut S,
    root: TopicId,
    spec: &QuerySpec,
    limit: usize,
) -> Result<Vec<Link>, EngineError> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let query = DescendantQuery {
        root,
        spec: spec.clone(),
        limit,
    };
    session.search_links(&query).await.context("search links")
}

/// Search topics and links with independent limits.
pub async fn search<S: GraphSession>(
    session: &mut S,
    deadline: &Deadline,
    root: TopicId,
    spec: &QuerySpec,
    topic_limit: usize,
    link_limit: usize,
) -> Result<SearchResults, EngineError> {
    deadline.check("search")?;
    let topics = descendant_topics(session, root, spec, topic_limit).await?;
    deadline.check("search")?;
    let links = descendant_links(session, root, spec, link_limit).await?;

    tracing::debug!(
        root = %root,
        tokens = spec.string_tokens.len(),
        topic_refs = spec.topic_refs.len(),
        topics = topics.len(),
        links = links.len(),
        "Descendant search"
    );
    Ok(SearchResults { topics, links })
}

/// Fill one page of `page_size` results: topics first, links with the rest.
pub async fn search_page<S: GraphSession>(
    session: &mut S,
    deadline: &Deadline,
    root: TopicId,
    spec: &QuerySpec,
    page_size: usize,
) -> Result<SearchResults, EngineError> {
    deadline.check("search")?;
    let topics = descendant_topics(session, root, spec, page_size).await?;
    let remaining = page_size.saturating_sub(topics.len());
    deadline.check("search")?;
    let links = descendant_links(session, root, spec, remaining).await?;
    Ok(SearchResults { topics, links })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::closure::add_edge;
    use crate::normalize::CanonicalUrl;
    use crate::store::{GraphStore, InMemoryGraphStore};
    use crate::types::{Edge, RepositoryId};

    #[tokio::test]
    async fn test_zero_limit_is_empty() {
        let store = InMemoryGraphStore::new();
        let mut session = store.begin().await.unwrap();
        let repo = RepositoryId::generate();
        let root = Topic::new(repo, "Root");
        session.insert_topic(&root).await.unwrap();

        let spec = QuerySpec::parse("");
        let results = search(&mut session, &Deadline::none(), root.id, &spec, 0, 0)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_root_finds_itself() {
        let store = InMemoryGraphStore::new();
        let mut session = store.begin().await.unwrap();
        let repo = RepositoryId::generate();
        let root = Topic::new(repo, "Astronomy");
        session.insert_topic(&root).await.unwrap();

        let spec = QuerySpec::parse("astro");
        let topics = descendant_topics(&mut session, root.id, &spec, 10).await.unwrap();
        assert_eq!(topics, vec![root]);
    }

    #[tokio::test]
    async fn test_page_spends_leftover_on_links() {
        let store = InMemoryGraphStore::new();
        let mut session = store.begin().await.unwrap();
        let deadline = Deadline::none();
        let repo = RepositoryId::generate();
        let root = Topic::new(repo, "Root");
        let child = Topic::new(repo, "Child");
        session.insert_topic(&root).await.unwrap();
        session.insert_topic(&child).await.unwrap();
        add_edge(&mut session, &deadline, Edge::new(root.id, child.id)).await.unwrap();

        for i in 0..5 {
            let url = CanonicalUrl::parse(&format!("https://example.com/{i}")).unwrap();
            let link = Link::new(repo, &url, format!("Page {i}"));
            session.insert_link(&link).await.unwrap();
            add_edge(&mut session, &deadline, Edge::new(child.id, link.id)).await.unwrap();
        }

        let spec = QuerySpec::parse("");
        let page = search_page(&mut session, &deadline, root.id, &spec, 4).await.unwrap();
        assert_eq!(page.topics.len(), 2);
        assert_eq!(page.links.len(), 2);
        assert_eq!(page.len(), 4);
    }
}
