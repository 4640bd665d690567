//! Core types for the topic graph.

pub mod ids;
pub mod edge;
pub mod topic;
pub mod link;
pub mod alert;

pub use ids::{ActorId, LinkId, RepositoryId, TopicId};
pub use edge::{Edge, NodeId, NodeKind};
pub use topic::{
    derive_name, Repository, Synonym, Synonyms, TimeRange, TimeRangePrefixFormat, Topic,
    DEFAULT_LOCALE, ROOT_TOPIC_NAME,
};
pub use link::Link;
pub use alert::{Alert, AlertCode, AlertType};
