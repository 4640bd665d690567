//! Property tests: closure correctness and acyclicity under random edits.
//!
//! Random sequences of topic creation, re-parenting, deletion, merging and
//! link creation run against small graphs (at most 20 topics). After every
//! step the materialized closure must equal the reachability computed by
//! walking direct edges, and the topic relation must stay acyclic.

use digraph_kernel::store::GraphStore;
use digraph_kernel::{
    ActorId, AlertCode, EngineConfig, InMemoryGraphStore, NodeId, OnlineReachability, ReachabilitySet,
    RepositoryId, TopicGraph, TopicId,
};
use proptest::collection::vec;
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

const MAX_TOPICS: usize = 19;

#[derive(Debug, Clone)]
enum Op {
    Create { parents: Vec<usize> },
    Reparent { topic: usize, parents: Vec<usize> },
    Delete { topic: usize },
    Merge { topic: usize },
    Link { parents: Vec<usize> },
}

fn arb_op() -> impl Strategy<Value = Op> {
    let index = 0..32usize;
    let parents = vec(0..32usize, 0..4);
    prop_oneof![
        3 => parents.clone().prop_map(|parents| Op::Create { parents }),
        4 => (index.clone(), parents.clone())
            .prop_map(|(topic, parents)| Op::Reparent { topic, parents }),
        1 => index.clone().prop_map(|topic| Op::Delete { topic }),
        1 => index.prop_map(|topic| Op::Merge { topic }),
        2 => parents.prop_map(|parents| Op::Link { parents }),
    ]
}

struct Harness {
    graph: TopicGraph<InMemoryGraphStore>,
    repo: RepositoryId,
    root: TopicId,
    live: Vec<TopicId>,
    counter: usize,
}

impl Harness {
    async fn new() -> Self {
        let graph =
            TopicGraph::new(InMemoryGraphStore::new()).with_config(EngineConfig::unbounded());
        let created = graph.create_repository("prop").await.unwrap();
        Self {
            graph,
            repo: created.repository.id,
            root: created.root_topic.id,
            live: Vec::new(),
            counter: 0,
        }
    }

    /// Map raw indices onto live topics; one past the end means the root.
    fn pick_parents(&self, raw: &[usize]) -> Vec<TopicId> {
        raw.iter()
            .map(|i| {
                let slot = i % (self.live.len() + 1);
                self.live.get(slot).copied().unwrap_or(self.root)
            })
            .collect()
    }

    fn pick_topic(&self, raw: usize) -> Option<TopicId> {
        (!self.live.is_empty()).then(|| self.live[raw % self.live.len()])
    }

    async fn apply(&mut self, op: &Op) {
        self.counter += 1;
        match op {
            Op::Create { parents } => {
                if self.live.len() >= MAX_TOPICS {
                    return;
                }
                let parents = self.pick_parents(parents);
                let result = self
                    .graph
                    .upsert_topic(self.repo, &format!("Topic {}", self.counter), None, &parents)
                    .await
                    .unwrap();
                self.live.push(result.topic.unwrap().id);
            }
            Op::Reparent { topic, parents } => {
                let Some(topic) = self.pick_topic(*topic) else {
                    return;
                };
                let parents = self.pick_parents(parents);
                let before = self.graph.store().direct_edges();
                let update = self
                    .graph
                    .update_topic_parent_topics(topic, &parents)
                    .await
                    .unwrap();
                let unchanged = update
                    .alerts
                    .iter()
                    .any(|a| a.is(AlertCode::ParentsUnchanged));
                if unchanged {
                    assert_eq!(self.graph.store().direct_edges(), before);
                }
                let remaining = self
                    .graph
                    .parent_topic_ids(NodeId::Topic(topic))
                    .await
                    .unwrap();
                assert!(!remaining.is_empty(), "non-root topic lost all parents");
            }
            Op::Delete { topic } => {
                let Some(topic) = self.pick_topic(*topic) else {
                    return;
                };
                self.graph
                    .delete_topic(&ActorId::anonymous(), topic)
                    .await
                    .unwrap();
                self.live.retain(|t| *t != topic);
            }
            Op::Merge { topic } => {
                let Some(topic) = self.pick_topic(*topic) else {
                    return;
                };
                let parents = self
                    .graph
                    .parent_topic_ids(NodeId::Topic(topic))
                    .await
                    .unwrap();
                let target = parents[0];
                self.graph.merge_topic(topic, target).await.unwrap();
                self.live.retain(|t| *t != topic);
            }
            Op::Link { parents } => {
                let parents = self.pick_parents(parents);
                self.graph
                    .upsert_link(
                        self.repo,
                        &format!("https://example.com/{}", self.counter),
                        Some("page".to_string()),
                        &parents,
                    )
                    .await
                    .unwrap();
            }
        }
    }

    /// Closure derived by walking direct edges from every topic.
    async fn walked_closure(&self) -> BTreeSet<(TopicId, NodeId)> {
        let mut session = self.graph.store().begin().await.unwrap();
        let mut online = OnlineReachability::new(&mut session);
        let mut rows = BTreeSet::new();
        for &topic in self.live.iter().chain(std::iter::once(&self.root)) {
            for node in online.descendants_of(topic).await.unwrap() {
                rows.insert((topic, node));
            }
        }
        rows
    }

    fn assert_topic_relation_acyclic(&self) {
        let mut indegree: BTreeMap<TopicId, usize> = BTreeMap::new();
        let mut children: BTreeMap<TopicId, Vec<TopicId>> = BTreeMap::new();
        for &topic in self.live.iter().chain(std::iter::once(&self.root)) {
            indegree.entry(topic).or_insert(0);
        }
        for edge in self.graph.store().direct_edges() {
            if let NodeId::Topic(child) = edge.child {
                *indegree.entry(child).or_insert(0) += 1;
                children.entry(edge.parent).or_default().push(child);
            }
        }

        // Kahn's algorithm must consume every topic.
        let mut ready: Vec<TopicId> = indegree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(t, _)| *t)
            .collect();
        let mut visited = 0;
        while let Some(topic) = ready.pop() {
            visited += 1;
            for child in children.get(&topic).into_iter().flatten() {
                if let Some(d) = indegree.get_mut(child) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push(*child);
                    }
                }
            }
        }
        assert_eq!(visited, indegree.len(), "topic relation has a cycle");
    }
}

async fn run(ops: Vec<Op>) {
    let mut harness = Harness::new().await;
    for op in &ops {
        harness.apply(op).await;
        assert_eq!(
            harness.graph.store().closure_rows(),
            harness.walked_closure().await,
            "closure diverged after {:?}",
            op
        );
        harness.assert_topic_relation_acyclic();
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The materialized closure always equals the walked closure, and the
    /// topic relation never gains a cycle.
    #[test]
    fn closure_matches_walk_after_every_edit(ops in vec(arb_op(), 1..30)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(run(ops));
    }

    /// Adding a topic below any descendant of itself is always refused.
    #[test]
    fn descendant_never_becomes_parent(depth in 1..8usize) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let mut harness = Harness::new().await;
            let mut chain = Vec::new();
            for _ in 0..=depth {
                let parents: Vec<TopicId> = chain.last().copied().into_iter().collect();
                let topic = harness
                    .graph
                    .upsert_topic(harness.repo, &format!("Chain {}", chain.len()), None, &parents)
                    .await
                    .unwrap()
                    .topic
                    .unwrap();
                chain.push(topic.id);
                harness.live.push(topic.id);
            }

            let head = chain[0];
            let tail = chain[depth];
            let before = harness.graph.store().direct_edges();
            let update = harness
                .graph
                .update_topic_parent_topics(head, &[tail])
                .await
                .unwrap();

            assert!(update
                .alerts
                .iter()
                .any(|a| a.is(AlertCode::WouldCreateCycle)));
            assert_eq!(harness.graph.store().direct_edges(), before);
            harness.assert_topic_relation_acyclic();
        });
    }
}
