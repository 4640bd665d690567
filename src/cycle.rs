//! Cycle guard for parent-topic edges.

use crate::error::{EngineError, StoreResultExt};
use crate::reachability::ReachabilitySet;
use crate::types::{Alert, NodeId, Topic, TopicId};

/// Whether making `candidate_parent` a parent of `topic` would close a cycle.
///
/// True iff `candidate_parent` is `topic` itself or already lies below it.
pub async fn would_create_cycle<R: ReachabilitySet>(
    reach: &mut R,
    topic: TopicId,
    candidate_parent: TopicId,
) -> Result<bool, EngineError> {
    if topic == candidate_parent {
        return Ok(true);
    }
    let below = reach
        .descendants_of(topic)
        .await
        .context("read descendants")?;
    Ok(below.contains(&NodeId::Topic(candidate_parent)))
}

/// Check a prospective parent edge, turning a rejection into a cycle alert.
///
/// Returns `None` when the edge is safe to add.
pub async fn guard_parent<R: ReachabilitySet>(
    reach: &mut R,
    topic: &Topic,
    candidate_parent: &Topic,
) -> Result<Option<Alert>, EngineError> {
    if !would_create_cycle(reach, topic.id, candidate_parent.id).await? {
        return Ok(None);
    }
    tracing::warn!(
        topic_id = %topic.id,
        parent_id = %candidate_parent.id,
        "Rejected parent topic that would create a cycle"
    );
    Ok(Some(Alert::cycle(&topic.name, &candidate_parent.name)))
}
