//! Topic mutations.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use super::{
    load_repository, load_topic, name_clash, resolve_parents, DeleteTopicResult,
    MergeTopicResult, TopicGraph, TopicUpdate, UpsertTopicResult,
};
use crate::closure;
use crate::cycle::guard_parent;
use crate::error::{EngineError, StoreResultExt};
use crate::normalize::normalize_topic_name;
use crate::reachability::ClosureTable;
use crate::store::{GraphSession, GraphStore, Inserted};
use crate::types::{
    ActorId, Alert, AlertCode, Edge, NodeId, RepositoryId, Synonym, Synonyms, TimeRange,
    TimeRangePrefixFormat, Topic, TopicId,
};

impl<S: GraphStore> TopicGraph<S> {
    /// Create a topic, or return the existing one with the same name.
    ///
    /// With no parents the topic goes under the repository root. An existing
    /// topic is returned unchanged with a duplicate-name alert; its parents
    /// are not touched.
    pub async fn upsert_topic(
        &self,
        repository_id: RepositoryId,
        name: &str,
        description: Option<String>,
        parent_ids: &[TopicId],
    ) -> Result<UpsertTopicResult, EngineError> {
        let (name, valid) = normalize_topic_name(name);
        if !valid {
            tracing::warn!(name = %name, "Rejected topic name");
            return Ok(UpsertTopicResult {
                topic: None,
                created: false,
                alerts: vec![Alert::invalid_topic_name(&name)],
            });
        }

        let deadline = self.deadline();
        let mut session = self.begin().await?;
        session
            .lock_repository(repository_id)
            .await
            .context("lock repository")?;
        let repository = load_repository(&mut session, repository_id).await?;
        let parents = resolve_parents(&mut session, &repository, parent_ids).await?;

        let candidate = Topic::new(repository.id, name).with_description(description);
        let topic = match session
            .insert_topic(&candidate)
            .await
            .context("insert topic")?
        {
            Inserted::Existing(existing) => {
                tracing::debug!(topic_id = %existing.id, "Topic already exists");
                let alert = Alert::duplicate_topic_name(&existing.name);
                return Ok(UpsertTopicResult {
                    topic: Some(existing),
                    created: false,
                    alerts: vec![alert],
                });
            }
            Inserted::Created(topic) => topic,
        };

        // A fresh topic has no descendants, so no parent can close a cycle.
        for parent in &parents {
            closure::add_edge(&mut session, &deadline, Edge::new(parent.id, topic.id)).await?;
        }
        session.commit().await.context("commit")?;

        tracing::info!(
            topic_id = %topic.id,
            repository_id = %repository.id,
            parents = parents.len(),
            "Created topic"
        );
        Ok(UpsertTopicResult {
            topic: Some(topic),
            created: true,
            alerts: Vec::new(),
        })
    }

    /// Replace the parent topics of a topic.
    ///
    /// Additions go first, each checked against the closure as updated by the
    /// previous ones; parents that would close a cycle are skipped with an
    /// alert. Removals follow. If no requested parent is accepted the
    /// existing parents are kept.
    pub async fn update_topic_parent_topics(
        &self,
        topic_id: TopicId,
        parent_ids: &[TopicId],
    ) -> Result<TopicUpdate, EngineError> {
        let deadline = self.deadline();
        let mut session = self.begin().await?;
        let topic = load_topic(&mut session, topic_id).await?;
        if topic.root {
            return Err(EngineError::RootTopic {
                topic: topic.id,
                operation: "re-parent",
            });
        }
        session
            .lock_repository(topic.repository_id)
            .await
            .context("lock repository")?;

        let requested: BTreeSet<TopicId> = parent_ids.iter().copied().collect();
        let requested_ids: Vec<TopicId> = requested.iter().copied().collect();
        let candidates = session
            .get_topics(&requested_ids)
            .await
            .context("get parent topics")?;
        for id in &requested {
            if !candidates
                .iter()
                .any(|t| t.id == *id && t.repository_id == topic.repository_id)
            {
                return Err(EngineError::TopicNotFound(*id));
            }
        }

        let current: BTreeSet<TopicId> = session
            .parent_topics(NodeId::Topic(topic.id))
            .await
            .context("list parents")?
            .into_iter()
            .collect();

        let mut alerts = Vec::new();
        let mut accepted = BTreeSet::new();
        for parent in &candidates {
            if current.contains(&parent.id) {
                accepted.insert(parent.id);
                continue;
            }
            let mut reach = ClosureTable::new(&mut session);
            if let Some(alert) = guard_parent(&mut reach, &topic, parent).await? {
                alerts.push(alert);
                continue;
            }
            closure::add_edge(&mut session, &deadline, Edge::new(parent.id, topic.id)).await?;
            accepted.insert(parent.id);
        }

        if accepted.is_empty() {
            alerts.push(Alert::warn(
                AlertCode::ParentsUnchanged,
                format!(
                    "\"{}\" must have at least one valid parent topic; parents were not changed",
                    topic.name
                ),
            ));
            tracing::warn!(topic_id = %topic.id, "No parent topic accepted");
            return Ok(TopicUpdate { topic, alerts });
        }

        for stale in current.difference(&accepted) {
            closure::remove_edge(&mut session, &deadline, Edge::new(*stale, topic.id)).await?;
        }
        session.commit().await.context("commit")?;

        tracing::info!(
            topic_id = %topic.id,
            parents = accepted.len(),
            alerts = alerts.len(),
            "Updated parent topics"
        );
        Ok(TopicUpdate { topic, alerts })
    }

    /// Delete a topic, moving its children under each of its parents.
    pub async fn delete_topic(
        &self,
        actor: &ActorId,
        topic_id: TopicId,
    ) -> Result<DeleteTopicResult, EngineError> {
        let deadline = self.deadline();
        let mut session = self.begin().await?;
        let topic = load_topic(&mut session, topic_id).await?;
        if topic.root {
            return Err(EngineError::RootTopic {
                topic: topic.id,
                operation: "delete",
            });
        }
        session
            .lock_repository(topic.repository_id)
            .await
            .context("lock repository")?;

        let parents: BTreeSet<TopicId> = session
            .parent_topics(NodeId::Topic(topic.id))
            .await
            .context("list parents")?
            .into_iter()
            .collect();
        let children = closure::splice_children(&mut session, topic.id, &parents).await?;
        closure::detach_node(&mut session, &deadline, NodeId::Topic(topic.id)).await?;
        session
            .delete_topic(topic.id)
            .await
            .context("delete topic")?;
        session.commit().await.context("commit")?;

        tracing::info!(
            actor = %actor,
            topic_id = %topic.id,
            parents = parents.len(),
            children = children.len(),
            "Deleted topic"
        );
        Ok(DeleteTopicResult {
            deleted_topic_id: topic.id,
        })
    }

    /// Merge a topic into one of its direct parents.
    ///
    /// The source's synonyms are appended to the target, its children move
    /// under the target, and the source is deleted.
    pub async fn merge_topic(
        &self,
        source_id: TopicId,
        target_id: TopicId,
    ) -> Result<MergeTopicResult, EngineError> {
        let deadline = self.deadline();
        let mut session = self.begin().await?;
        let source = load_topic(&mut session, source_id).await?;
        if source.root {
            return Err(EngineError::RootTopic {
                topic: source.id,
                operation: "merge",
            });
        }
        session
            .lock_repository(source.repository_id)
            .await
            .context("lock repository")?;

        let parents = session
            .parent_topics(NodeId::Topic(source.id))
            .await
            .context("list parents")?;
        if !parents.contains(&target_id) {
            return Err(EngineError::InvalidMerge {
                source_topic: source.id,
                target: target_id,
            });
        }
        let mut target = load_topic(&mut session, target_id).await?;

        let onto = BTreeSet::from([target.id]);
        closure::splice_children(&mut session, source.id, &onto).await?;
        closure::detach_node(&mut session, &deadline, NodeId::Topic(source.id)).await?;
        session
            .delete_topic(source.id)
            .await
            .context("delete topic")?;

        let mut alerts = Vec::new();
        let mut merged = target.synonyms.clone();
        let added = source
            .synonyms
            .iter()
            .filter(|s| merged.push_unique((*s).clone()))
            .count();
        if added > 0 {
            let mut renamed = target.clone();
            renamed.set_synonyms(merged);
            match name_clash(&mut session, &renamed).await? {
                Some(alert) => alerts.push(alert),
                None => {
                    session
                        .update_topic(&renamed)
                        .await
                        .context("update topic")?;
                    target = renamed;
                }
            }
        }
        session.commit().await.context("commit")?;

        tracing::info!(
            source_id = %source.id,
            target_id = %target.id,
            synonyms_added = added,
            "Merged topic into parent"
        );
        Ok(MergeTopicResult {
            topic: target,
            deleted_topic_id: source.id,
            alerts,
        })
    }

    /// Replace the synonyms of a topic and re-derive its name.
    ///
    /// Invalid names are dropped with an alert. If nothing valid remains, or
    /// the new name is taken, the topic is left unchanged.
    pub async fn update_topic_synonyms(
        &self,
        topic_id: TopicId,
        synonyms: Vec<Synonym>,
    ) -> Result<TopicUpdate, EngineError> {
        let mut alerts = Vec::new();
        let mut cleaned = Synonyms::default();
        for synonym in synonyms {
            let (name, valid) = normalize_topic_name(&synonym.name);
            if !valid {
                alerts.push(Alert::invalid_topic_name(&name));
                continue;
            }
            cleaned.push_unique(Synonym::new(synonym.locale, name));
        }

        let mut session = self.begin().await?;
        let topic = load_topic(&mut session, topic_id).await?;

        if cleaned.is_empty() {
            alerts.push(Alert::warn(
                AlertCode::SynonymRequired,
                format!("\"{}\" needs at least one synonym", topic.name),
            ));
            return Ok(TopicUpdate { topic, alerts });
        }

        session
            .lock_repository(topic.repository_id)
            .await
            .context("lock repository")?;
        let mut updated = topic.clone();
        updated.set_synonyms(cleaned);
        self.save_renamed(session, topic, updated, alerts).await
    }

    /// Set the time range of a topic; the name picks up its prefix.
    pub async fn upsert_topic_timerange(
        &self,
        topic_id: TopicId,
        starts_at: DateTime<Utc>,
        ends_at: Option<DateTime<Utc>>,
        prefix_format: TimeRangePrefixFormat,
    ) -> Result<TopicUpdate, EngineError> {
        let mut session = self.begin().await?;
        let topic = load_topic(&mut session, topic_id).await?;
        session
            .lock_repository(topic.repository_id)
            .await
            .context("lock repository")?;

        let mut updated = topic.clone();
        updated.set_timerange(Some(TimeRange::new(starts_at, ends_at, prefix_format)));
        self.save_renamed(session, topic, updated, Vec::new()).await
    }

    /// Remove the time range of a topic.
    pub async fn delete_topic_timerange(&self, topic_id: TopicId) -> Result<TopicUpdate, EngineError> {
        let mut session = self.begin().await?;
        let topic = load_topic(&mut session, topic_id).await?;
        session
            .lock_repository(topic.repository_id)
            .await
            .context("lock repository")?;

        let mut updated = topic.clone();
        updated.set_timerange(None);
        self.save_renamed(session, topic, updated, Vec::new()).await
    }

    /// Store `updated` unless its derived name clashes with another topic.
    async fn save_renamed(
        &self,
        mut session: S::Session,
        original: Topic,
        updated: Topic,
        mut alerts: Vec<Alert>,
    ) -> Result<TopicUpdate, EngineError> {
        if let Some(alert) = name_clash(&mut session, &updated).await? {
            tracing::warn!(topic_id = %original.id, name = %updated.name, "Topic name already taken");
            alerts.push(alert);
            return Ok(TopicUpdate {
                topic: original,
                alerts,
            });
        }

        session
            .update_topic(&updated)
            .await
            .context("update topic")?;
        session.commit().await.context("commit")?;

        tracing::info!(topic_id = %updated.id, name = %updated.name, "Updated topic");
        Ok(TopicUpdate {
            topic: updated,
            alerts,
        })
    }
}
