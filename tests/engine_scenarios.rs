//! End-to-end scenarios for the topic graph engine.
//!
//! Every scenario runs against the in-memory store and, after each mutation,
//! checks that the committed closure is exactly the transitive closure of the
//! committed direct edges.

use digraph_kernel::{
    ActorId, AlertCode, EngineConfig, EngineError, InMemoryGraphStore, NodeId, Topic, TopicGraph,
    TopicId,
};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::Duration;

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn new_graph() -> TopicGraph<InMemoryGraphStore> {
    TopicGraph::new(InMemoryGraphStore::new()).with_config(EngineConfig::unbounded())
}

/// Transitive closure of the committed direct edges, computed from scratch.
fn expected_closure(store: &InMemoryGraphStore) -> BTreeSet<(TopicId, NodeId)> {
    let mut children: BTreeMap<TopicId, Vec<NodeId>> = BTreeMap::new();
    for edge in store.direct_edges() {
        children.entry(edge.parent).or_default().push(edge.child);
    }

    let mut rows = BTreeSet::new();
    for &start in children.keys() {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            for &child in children.get(&current).into_iter().flatten() {
                if child != NodeId::Topic(start) && seen.insert(child) {
                    if let NodeId::Topic(t) = child {
                        queue.push_back(t);
                    }
                }
            }
        }
        rows.extend(seen.into_iter().map(|d| (start, d)));
    }
    rows
}

fn assert_closure_exact(graph: &TopicGraph<InMemoryGraphStore>) {
    let store = graph.store();
    assert_eq!(store.closure_rows(), expected_closure(store));
}

async fn topic(
    graph: &TopicGraph<InMemoryGraphStore>,
    repo: digraph_kernel::RepositoryId,
    name: &str,
    parents: &[TopicId],
) -> Topic {
    graph
        .upsert_topic(repo, name, None, parents)
        .await
        .unwrap()
        .topic
        .unwrap()
}

async fn parent_ids(graph: &TopicGraph<InMemoryGraphStore>, node: NodeId) -> BTreeSet<TopicId> {
    graph
        .parent_topic_ids(node)
        .await
        .unwrap()
        .into_iter()
        .collect()
}

fn topic_ref(id: TopicId) -> String {
    format!("in:/wiki/topics/{}", id)
}

// ─────────────────────────────────────────────────────────────────────────────
// Upsert
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_upsert_topic_is_idempotent_by_normalized_name() {
    let graph = new_graph();
    let repo = graph.create_repository("wiki").await.unwrap().repository.id;

    let first = graph.upsert_topic(repo, "Foo", None, &[]).await.unwrap();
    let second = graph.upsert_topic(repo, "  Foo  ", None, &[]).await.unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.topic.unwrap().id, second.topic.unwrap().id);
    assert!(second.alerts[0].is(AlertCode::DuplicateTopicName));
    assert_eq!(graph.store().num_topics(), 2);
    assert_closure_exact(&graph);
}

#[tokio::test]
async fn test_duplicate_upsert_leaves_parents_alone() {
    let graph = new_graph();
    let created = graph.create_repository("wiki").await.unwrap();
    let repo = created.repository.id;
    let other = topic(&graph, repo, "Other", &[]).await;
    let foo = topic(&graph, repo, "Foo", &[]).await;

    graph.upsert_topic(repo, "Foo", None, &[other.id]).await.unwrap();

    assert_eq!(
        parent_ids(&graph, NodeId::Topic(foo.id)).await,
        BTreeSet::from([created.root_topic.id])
    );
}

#[tokio::test]
async fn test_url_shaped_topic_name_is_rejected() {
    let graph = new_graph();
    let repo = graph.create_repository("wiki").await.unwrap().repository.id;

    let result = graph
        .upsert_topic(repo, "http://www.google.com/", None, &[])
        .await
        .unwrap();

    assert!(result.topic.is_none());
    assert!(result.alerts[0].is(AlertCode::InvalidTopicName));
    assert_eq!(graph.store().num_topics(), 1);
}

#[tokio::test]
async fn test_same_name_in_two_repositories() {
    let graph = new_graph();
    let one = graph.create_repository("one").await.unwrap().repository.id;
    let two = graph.create_repository("two").await.unwrap().repository.id;

    let a = graph.upsert_topic(one, "Physics", None, &[]).await.unwrap();
    let b = graph.upsert_topic(two, "Physics", None, &[]).await.unwrap();

    assert!(a.created && b.created);
    assert_ne!(a.topic.unwrap().id, b.topic.unwrap().id);
}

#[tokio::test]
async fn test_parent_from_another_repository_is_not_found() {
    let graph = new_graph();
    let one = graph.create_repository("one").await.unwrap().repository.id;
    let two = graph.create_repository("two").await.unwrap().repository.id;
    let foreign = topic(&graph, two, "Foreign", &[]).await;

    let err = graph
        .upsert_topic(one, "Local", None, &[foreign.id])
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::TopicNotFound(id) if id == foreign.id));
}

// ─────────────────────────────────────────────────────────────────────────────
// Re-parenting and cycles
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_cycle_rejected_siblings_applied() {
    let graph = new_graph();
    let created = graph.create_repository("wiki").await.unwrap();
    let repo = created.repository.id;
    let root = created.root_topic.id;

    let a = topic(&graph, repo, "A", &[]).await;
    let b = topic(&graph, repo, "B", &[a.id]).await;
    let c = topic(&graph, repo, "C", &[]).await;
    let edges_before = graph.store().direct_edges();

    // B lies below A, so only C and the existing root parent survive.
    let update = graph
        .update_topic_parent_topics(a.id, &[b.id, c.id, root])
        .await
        .unwrap();

    assert_eq!(update.alerts.len(), 1);
    assert!(update.alerts[0].is(AlertCode::WouldCreateCycle));
    assert!(update.alerts[0].text.contains("A"));
    assert!(update.alerts[0].text.contains("B"));
    assert_eq!(
        parent_ids(&graph, NodeId::Topic(a.id)).await,
        BTreeSet::from([c.id, root])
    );

    let edges_after = graph.store().direct_edges();
    assert_eq!(edges_after.len(), edges_before.len() + 1);
    assert_closure_exact(&graph);
}

#[tokio::test]
async fn test_self_parent_is_a_cycle() {
    let graph = new_graph();
    let repo = graph.create_repository("wiki").await.unwrap().repository.id;
    let a = topic(&graph, repo, "A", &[]).await;

    let update = graph.update_topic_parent_topics(a.id, &[a.id]).await.unwrap();

    assert!(update.alerts.iter().any(|al| al.is(AlertCode::WouldCreateCycle)));
    assert!(update.alerts.iter().any(|al| al.is(AlertCode::ParentsUnchanged)));
    assert_closure_exact(&graph);
}

#[tokio::test]
async fn test_all_parents_rejected_keeps_existing() {
    let graph = new_graph();
    let created = graph.create_repository("wiki").await.unwrap();
    let repo = created.repository.id;
    let a = topic(&graph, repo, "A", &[]).await;
    let b = topic(&graph, repo, "B", &[a.id]).await;

    let update = graph.update_topic_parent_topics(a.id, &[b.id]).await.unwrap();

    assert!(update.alerts.iter().any(|al| al.is(AlertCode::ParentsUnchanged)));
    assert_eq!(
        parent_ids(&graph, NodeId::Topic(a.id)).await,
        BTreeSet::from([created.root_topic.id])
    );
}

#[tokio::test]
async fn test_move_subtree_updates_closure() {
    let graph = new_graph();
    let created = graph.create_repository("wiki").await.unwrap();
    let repo = created.repository.id;

    let science = topic(&graph, repo, "Science", &[]).await;
    let arts = topic(&graph, repo, "Arts", &[]).await;
    let music = topic(&graph, repo, "Music", &[science.id]).await;
    let jazz = topic(&graph, repo, "Jazz", &[music.id]).await;
    graph
        .upsert_link(repo, "https://example.com/bebop", Some("Bebop".into()), &[jazz.id])
        .await
        .unwrap();

    graph
        .update_topic_parent_topics(music.id, &[arts.id])
        .await
        .unwrap();
    assert_closure_exact(&graph);

    let under_science = graph.search(science.id, "", 10, 10).await.unwrap();
    assert_eq!(under_science.topics.len(), 1);
    assert!(under_science.links.is_empty());

    let under_arts = graph.search(arts.id, "", 10, 10).await.unwrap();
    assert_eq!(under_arts.topics.len(), 3);
    assert_eq!(under_arts.links.len(), 1);
}

#[tokio::test]
async fn test_root_cannot_be_reparented_or_deleted() {
    let graph = new_graph();
    let created = graph.create_repository("wiki").await.unwrap();
    let root = created.root_topic.id;
    let a = topic(&graph, created.repository.id, "A", &[]).await;

    let err = graph.update_topic_parent_topics(root, &[a.id]).await.unwrap_err();
    assert!(err.is_invariant_violation());

    let err = graph
        .delete_topic(&ActorId::anonymous(), root)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RootTopic { operation: "delete", .. }));
    assert!(graph.get_topic(root).await.unwrap().is_some());
}

// ─────────────────────────────────────────────────────────────────────────────
// Delete and merge
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_delete_splices_children_onto_parent() {
    let graph = new_graph();
    let repo = graph.create_repository("wiki").await.unwrap().repository.id;

    let p = topic(&graph, repo, "P", &[]).await;
    let x = topic(&graph, repo, "X", &[p.id]).await;
    let c1 = topic(&graph, repo, "C1", &[x.id]).await;
    let c2 = topic(&graph, repo, "C2", &[x.id]).await;
    let link = graph
        .upsert_link(repo, "https://example.com/x", Some("x".into()), &[x.id])
        .await
        .unwrap()
        .link
        .unwrap();

    let result = graph
        .delete_topic(&ActorId::new("editor"), x.id)
        .await
        .unwrap();
    assert_eq!(result.deleted_topic_id, x.id);

    for child in [NodeId::Topic(c1.id), NodeId::Topic(c2.id), NodeId::Link(link.id)] {
        assert_eq!(parent_ids(&graph, child).await, BTreeSet::from([p.id]));
    }
    let x_node = NodeId::Topic(x.id);
    assert!(graph
        .store()
        .closure_rows()
        .iter()
        .all(|(a, d)| *a != x.id && *d != x_node));
    assert!(graph.get_topic(x.id).await.unwrap().is_none());
    assert_closure_exact(&graph);
}

#[tokio::test]
async fn test_delete_with_two_parents_keeps_both_paths() {
    let graph = new_graph();
    let repo = graph.create_repository("wiki").await.unwrap().repository.id;

    let p1 = topic(&graph, repo, "P1", &[]).await;
    let p2 = topic(&graph, repo, "P2", &[]).await;
    let x = topic(&graph, repo, "X", &[p1.id, p2.id]).await;
    let c = topic(&graph, repo, "C", &[x.id]).await;

    graph.delete_topic(&ActorId::anonymous(), x.id).await.unwrap();

    assert_eq!(
        parent_ids(&graph, NodeId::Topic(c.id)).await,
        BTreeSet::from([p1.id, p2.id])
    );
    assert_closure_exact(&graph);
}

#[tokio::test]
async fn test_merge_into_parent() {
    let graph = new_graph();
    let repo = graph.create_repository("wiki").await.unwrap().repository.id;

    let parent = topic(&graph, repo, "Physics", &[]).await;
    let source = topic(&graph, repo, "Physical science", &[parent.id]).await;
    let child = topic(&graph, repo, "Optics", &[source.id]).await;
    let link = graph
        .upsert_link(repo, "https://example.com/lens", Some("Lens".into()), &[source.id])
        .await
        .unwrap()
        .link
        .unwrap();

    let merged = graph.merge_topic(source.id, parent.id).await.unwrap();

    assert_eq!(merged.deleted_topic_id, source.id);
    assert_eq!(merged.topic.name, "Physics");
    assert!(merged.topic.synonyms.contains_name("Physical science"));
    assert!(merged.alerts.is_empty());
    assert_eq!(
        parent_ids(&graph, NodeId::Topic(child.id)).await,
        BTreeSet::from([parent.id])
    );
    assert_eq!(
        parent_ids(&graph, NodeId::Link(link.id)).await,
        BTreeSet::from([parent.id])
    );
    assert!(graph.get_topic(source.id).await.unwrap().is_none());
    assert_closure_exact(&graph);
}

#[tokio::test]
async fn test_delete_link() {
    let graph = new_graph();
    let repo = graph.create_repository("wiki").await.unwrap().repository.id;
    let t = topic(&graph, repo, "T", &[]).await;
    let link = graph
        .upsert_link(repo, "https://example.com/", Some("x".into()), &[t.id])
        .await
        .unwrap()
        .link
        .unwrap();

    let result = graph.delete_link(link.id).await.unwrap();

    assert_eq!(result.deleted_link_id, link.id);
    assert_eq!(graph.store().num_links(), 0);
    assert!(graph
        .store()
        .closure_rows()
        .iter()
        .all(|(_, d)| *d != NodeId::Link(link.id)));
    assert!(graph.delete_link(link.id).await.unwrap_err().is_not_found());
}

// ─────────────────────────────────────────────────────────────────────────────
// Search
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_budgeted_split_search() {
    let graph = new_graph();
    let created = graph.create_repository("wiki").await.unwrap();
    let repo = created.repository.id;
    let root = created.root_topic.id;

    for i in 0..5 {
        topic(&graph, repo, &format!("Topic {}", i), &[]).await;
        graph
            .upsert_link(repo, &format!("https://example.com/{}", i), Some(format!("Link {}", i)), &[])
            .await
            .unwrap();
    }

    let links_only = graph.search(root, "", 0, 10).await.unwrap();
    assert!(links_only.topics.is_empty());
    assert_eq!(links_only.links.len(), 5);

    let capped = graph.search(root, "", 3, 2).await.unwrap();
    assert_eq!(capped.topics.len(), 3);
    assert_eq!(capped.links.len(), 2);
}

#[tokio::test]
async fn test_search_finds_the_root_itself() {
    let graph = new_graph();
    let repo = graph.create_repository("wiki").await.unwrap().repository.id;
    let science = topic(&graph, repo, "Science", &[]).await;
    topic(&graph, repo, "Chemistry", &[science.id]).await;

    let results = graph.search(science.id, "science", 10, 10).await.unwrap();

    assert_eq!(results.topics.len(), 1);
    assert_eq!(results.topics[0].id, science.id);
}

#[tokio::test]
async fn test_string_tokens_are_conjunctive() {
    let graph = new_graph();
    let created = graph.create_repository("wiki").await.unwrap();
    let repo = created.repository.id;
    topic(&graph, repo, "New York", &[]).await;
    topic(&graph, repo, "New Jersey", &[]).await;

    let results = graph
        .search(created.root_topic.id, "York New", 10, 10)
        .await
        .unwrap();

    assert_eq!(results.topics.len(), 1);
    assert_eq!(results.topics[0].name, "New York");
}

#[tokio::test]
async fn test_topic_references_intersect() {
    let graph = new_graph();
    let created = graph.create_repository("wiki").await.unwrap();
    let repo = created.repository.id;

    let a = topic(&graph, repo, "A", &[]).await;
    let b = topic(&graph, repo, "B", &[]).await;
    let both = topic(&graph, repo, "Both", &[a.id, b.id]).await;
    topic(&graph, repo, "Only A", &[a.id]).await;
    let link = graph
        .upsert_link(repo, "https://example.com/both", Some("In both".into()), &[both.id])
        .await
        .unwrap()
        .link
        .unwrap();

    let query = format!("{} {}", topic_ref(a.id), topic_ref(b.id));
    let results = graph
        .search(created.root_topic.id, &query, 10, 10)
        .await
        .unwrap();

    let names: Vec<&str> = results.topics.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["Both"]);
    assert_eq!(results.links.len(), 1);
    assert_eq!(results.links[0].id, link.id);
}

#[tokio::test]
async fn test_degenerate_topic_reference_matches_nothing() {
    let graph = new_graph();
    let created = graph.create_repository("wiki").await.unwrap();
    topic(&graph, created.repository.id, "A", &[]).await;

    let results = graph
        .search(created.root_topic.id, "in:/wiki/topics/", 10, 10)
        .await
        .unwrap();

    assert!(results.is_empty());
}

#[tokio::test]
async fn test_url_query_matches_canonical_link() {
    let graph = new_graph();
    let created = graph.create_repository("wiki").await.unwrap();
    graph
        .upsert_link(
            created.repository.id,
            "https://example.com/article",
            Some("Article".into()),
            &[],
        )
        .await
        .unwrap();

    let results = graph
        .search(
            created.root_topic.id,
            "https://EXAMPLE.com/article?utm_source=feed",
            0,
            10,
        )
        .await
        .unwrap();

    assert_eq!(results.links.len(), 1);
}

#[tokio::test]
async fn test_like_metacharacters_match_literally() {
    let graph = new_graph();
    let created = graph.create_repository("wiki").await.unwrap();
    let root = created.root_topic.id;
    topic(&graph, created.repository.id, "Quantum 50 cents", &[]).await;

    assert_eq!(graph.search(root, "50", 10, 10).await.unwrap().topics.len(), 1);
    assert!(graph.search(root, "50%", 10, 10).await.unwrap().is_empty());
    assert!(graph.search(root, "Q_antum", 10, 10).await.unwrap().is_empty());

    topic(&graph, created.repository.id, "Q_antum 50% off", &[]).await;
    let names: Vec<String> = graph
        .search(root, "Q_antum 50%", 10, 10)
        .await
        .unwrap()
        .topics
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["Q_antum 50% off"]);
}

#[tokio::test]
async fn test_unbounded_limits_return_everything() {
    let graph = new_graph();
    let created = graph.create_repository("wiki").await.unwrap();
    topic(&graph, created.repository.id, "Science", &[]).await;
    graph
        .upsert_link(created.repository.id, "https://example.com/a", Some("A".into()), &[])
        .await
        .unwrap();

    let results = graph
        .search(created.root_topic.id, "", usize::MAX, usize::MAX)
        .await
        .unwrap();

    assert_eq!(results.topics.len(), 2);
    assert_eq!(results.links.len(), 1);
}

#[tokio::test]
async fn test_search_page_fills_with_links() {
    let graph = new_graph();
    let created = graph.create_repository("wiki").await.unwrap();
    let repo = created.repository.id;
    let root = created.root_topic.id;
    topic(&graph, repo, "Science", &[]).await;
    for i in 0..4 {
        graph
            .upsert_link(repo, &format!("https://example.com/{}", i), Some(format!("Link {}", i)), &[])
            .await
            .unwrap();
    }

    let page = graph.search_page(root, "", 5).await.unwrap();
    assert_eq!(page.topics.len(), 2);
    assert_eq!(page.links.len(), 3);

    let topics_only = graph.search_page(root, "", 2).await.unwrap();
    assert_eq!(topics_only.topics.len(), 2);
    assert!(topics_only.links.is_empty());

    let missing = TopicId::new(uuid::Uuid::new_v4());
    assert!(graph.search_page(missing, "", 5).await.unwrap_err().is_not_found());
}

// ─────────────────────────────────────────────────────────────────────────────
// Failure and rollback
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_failed_closure_write_rolls_back_everything() {
    let graph = new_graph();
    let created = graph.create_repository("wiki").await.unwrap();
    let repo = created.repository.id;
    let a = topic(&graph, repo, "A", &[]).await;
    let b = topic(&graph, repo, "B", &[]).await;

    let edges_before = graph.store().direct_edges();
    let closure_before = graph.store().closure_rows();
    let version_before = graph.store().version();

    // Adding A under B rewrites the closure of B and the root; fail the second write.
    graph.store().fail_closure_writes_after(1);
    let err = graph
        .update_topic_parent_topics(a.id, &[b.id])
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Store { .. }));

    assert_eq!(graph.store().direct_edges(), edges_before);
    assert_eq!(graph.store().closure_rows(), closure_before);
    assert_eq!(graph.store().version(), version_before);

    // Re-running after the fault converges to the exact closure.
    graph.store().clear_faults();
    graph.update_topic_parent_topics(a.id, &[b.id]).await.unwrap();
    assert_eq!(
        parent_ids(&graph, NodeId::Topic(a.id)).await,
        BTreeSet::from([b.id])
    );
    assert_closure_exact(&graph);
}

#[tokio::test]
async fn test_expired_deadline_rolls_back() {
    let store = InMemoryGraphStore::new();
    let graph = TopicGraph::new(store.clone()).with_config(EngineConfig {
        operation_timeout: Some(Duration::ZERO),
        ..EngineConfig::default()
    });
    let setup = TopicGraph::new(store.clone()).with_config(EngineConfig::unbounded());
    let repo = setup.create_repository("wiki").await.unwrap().repository.id;
    let version = store.version();

    let err = graph.upsert_topic(repo, "Late", None, &[]).await.unwrap_err();

    assert!(matches!(err, EngineError::DeadlineExceeded { .. }));
    assert_eq!(store.version(), version);
    assert_eq!(store.num_topics(), 1);
}

#[tokio::test]
async fn test_missing_ids_are_not_found() {
    let graph = new_graph();

    let err = graph
        .update_topic_parent_topics(TopicId::generate(), &[])
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = graph
        .upsert_topic(digraph_kernel::RepositoryId::generate(), "A", None, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RepositoryNotFound(_)));

    assert!(graph.get_topic(TopicId::generate()).await.unwrap().is_none());
}
