//! Graph nodes and direct edges.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{LinkId, TopicId};

/// Kind of node a graph edge points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// A topic (may have children).
    Topic,
    /// A link (always a leaf).
    Link,
}

impl NodeKind {
    /// Parse a node kind from its string form.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "topic" => Some(Self::Topic),
            "link" => Some(Self::Link),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Topic => write!(f, "topic"),
            Self::Link => write!(f, "link"),
        }
    }
}

/// A node of the graph: either a topic or a link.
///
/// Topics and links share one closure-maintenance code path; only topics
/// can appear on the parent side of an [`Edge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum NodeId {
    /// A topic node.
    Topic(TopicId),
    /// A link node.
    Link(LinkId),
}

impl NodeId {
    /// Kind of this node.
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Topic(_) => NodeKind::Topic,
            Self::Link(_) => NodeKind::Link,
        }
    }

    /// The topic id, if this node is a topic.
    pub fn as_topic(&self) -> Option<TopicId> {
        match self {
            Self::Topic(id) => Some(*id),
            Self::Link(_) => None,
        }
    }

    /// The link id, if this node is a link.
    pub fn as_link(&self) -> Option<LinkId> {
        match self {
            Self::Link(id) => Some(*id),
            Self::Topic(_) => None,
        }
    }

    /// The raw UUID regardless of kind.
    pub fn as_uuid(&self) -> uuid::Uuid {
        match self {
            Self::Topic(id) => id.as_uuid(),
            Self::Link(id) => id.as_uuid(),
        }
    }
}

impl From<TopicId> for NodeId {
    fn from(id: TopicId) -> Self {
        Self::Topic(id)
    }
}

impl From<LinkId> for NodeId {
    fn from(id: LinkId) -> Self {
        Self::Link(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.as_uuid())
    }
}

/// Direct "has parent topic" edge.
///
/// Implements `Ord` for deterministic ordering: (parent, child).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Edge {
    /// Parent topic.
    pub parent: TopicId,
    /// Child topic or link.
    pub child: NodeId,
}

impl Edge {
    /// Create a new edge.
    pub fn new(parent: TopicId, child: impl Into<NodeId>) -> Self {
        Self {
            parent,
            child: child.into(),
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.parent, self.child)
    }
}
