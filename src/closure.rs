//! Transitive-closure maintenance.
//!
//! The closure is rebuilt, never patched:
//!
//! ```text
//! affected(p)    = {p} ∪ ancestors(p)          (read before the edit)
//! closure[a]     = reachable_from(a)           for every a in affected(p)
//! ```
//!
//! `reachable_from` walks direct edges only, so every recompute is a pure
//! function of the current direct edges. Re-issuing it after a failure
//! converges to the same rows; there is no delta that could be applied twice.
//!
//! Topics and links share one code path through [`NodeId`]: only topics have
//! children, so a link child contributes itself and nothing below.

use std::collections::BTreeSet;

use crate::deadline::Deadline;
use crate::error::{EngineError, StoreResultExt};
use crate::store::GraphSession;
use crate::types::{Edge, NodeId, TopicId};

/// Topics whose closure rows can change when an edge under `parent` changes.
pub async fn affected_by<S: GraphSession>(
    session: &mut S,
    parent: TopicId,
) -> Result<BTreeSet<TopicId>, EngineError> {
    let mut affected = session
        .ancestors(NodeId::Topic(parent))
        .await
        .context("read ancestors")?;
    affected.insert(parent);
    Ok(affected)
}

/// Rebuild the closure rows of every topic in `ancestors` from direct edges.
///
/// Returns the number of closure rows written.
pub async fn recompute<S: GraphSession>(
    session: &mut S,
    deadline: &Deadline,
    ancestors: &BTreeSet<TopicId>,
) -> Result<usize, EngineError> {
    let mut rows = 0;
    for &ancestor in ancestors {
        deadline.check("closure recompute")?;
        let reachable = session
            .reachable_from(ancestor)
            .await
            .context("compute reachable set")?;
        session
            .replace_descendants(ancestor, &reachable)
            .await
            .context("write closure rows")?;
        rows += reachable.len();
    }
    tracing::debug!(ancestors = ancestors.len(), rows, "Recomputed closure");
    Ok(rows)
}

/// Insert a direct edge and repair the closure above it.
///
/// Cycle checking is the caller's job; see [`crate::cycle`].
/// Returns false if the edge already existed.
pub async fn add_edge<S: GraphSession>(
    session: &mut S,
    deadline: &Deadline,
    edge: Edge,
) -> Result<bool, EngineError> {
    let inserted = session.insert_edge(edge).await.context("insert edge")?;
    if !inserted {
        return Ok(false);
    }
    let affected = affected_by(session, edge.parent).await?;
    tracing::debug!(edge = %edge, affected = affected.len(), "Added edge");
    recompute(session, deadline, &affected).await?;
    Ok(true)
}

/// Delete a direct edge and re-derive the closure above it.
///
/// Removing an edge may or may not disconnect anything (another path can
/// remain), so the affected set is rebuilt rather than pruned.
/// Returns false if the edge did not exist.
pub async fn remove_edge<S: GraphSession>(
    session: &mut S,
    deadline: &Deadline,
    edge: Edge,
) -> Result<bool, EngineError> {
    let affected = affected_by(session, edge.parent).await?;
    let removed = session.delete_edge(edge).await.context("delete edge")?;
    if !removed {
        return Ok(false);
    }
    tracing::debug!(edge = %edge, affected = affected.len(), "Removed edge");
    recompute(session, deadline, &affected).await?;
    Ok(true)
}

/// Move every child of `topic` under each topic in `onto`.
///
/// Edges from `topic` to its children are removed. The closure is not
/// touched; follow with [`detach_node`], which rebuilds it.
pub async fn splice_children<S: GraphSession>(
    session: &mut S,
    topic: TopicId,
    onto: &BTreeSet<TopicId>,
) -> Result<Vec<NodeId>, EngineError> {
    let children = session.child_nodes(topic).await.context("list children")?;
    for &child in &children {
        for &parent in onto {
            session
                .insert_edge(Edge::new(parent, child))
                .await
                .context("splice edge")?;
        }
        session
            .delete_edge(Edge::new(topic, child))
            .await
            .context("delete spliced edge")?;
    }
    tracing::debug!(
        topic_id = %topic,
        children = children.len(),
        parents = onto.len(),
        "Spliced children"
    );
    Ok(children)
}

/// Cut a node out of the graph: drop its parent edges and every closure row
/// that mentions it, then rebuild the closure of its former ancestors.
///
/// A topic must have no children left (see [`splice_children`]).
pub async fn detach_node<S: GraphSession>(
    session: &mut S,
    deadline: &Deadline,
    node: NodeId,
) -> Result<(), EngineError> {
    let ancestors = session.ancestors(node).await.context("read ancestors")?;

    for parent in session.parent_topics(node).await.context("list parents")? {
        session
            .delete_edge(Edge::new(parent, node))
            .await
            .context("delete parent edge")?;
    }
    session.purge_closure(node).await.context("purge closure")?;

    match node {
        NodeId::Topic(_) => {
            recompute(session, deadline, &ancestors).await?;
        }
        // A link is a leaf: purging its rows is already exact.
        NodeId::Link(_) => {}
    }
    Ok(())
}
