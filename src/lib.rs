//! # digraph-kernel
//!
//! Closure maintenance, cycle guarding and descendant search for a
//! topic/link knowledge graph.
//!
//! Topics form a DAG under a single root topic per repository. Links hang off
//! topics as leaves. The kernel keeps a materialized transitive closure of
//! both relations exact under every edit and answers "what lies below this
//! topic and matches this query" from it.
//!
//! ## Architecture
//!
//! ```text
//! TopicGraph (engine) ──┬── cycle guard ──── ReachabilitySet (closure table)
//!                       ├── closure maintainer
//!                       └── descendant search ── QuerySpec (token parser)
//!                                 │
//!                      GraphSession (one transaction)
//!                                 │
//!                 GraphStore (Postgres or Memory)
//! ```
//!
//! ## Guarantees
//!
//! - After every committed operation the closure equals the transitive
//!   closure of the direct edges (self-pairs excluded)
//! - The topic relation stays acyclic; rejected parents come back as alerts
//! - A failed operation rolls back entirely; recomputation is idempotent

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod normalize;
pub mod query;
pub mod error;
pub mod config;
pub mod deadline;
pub mod store;
pub mod reachability;
pub mod closure;
pub mod cycle;
pub mod search;
pub mod fetch;
pub mod engine;

#[cfg(feature = "service")]
pub mod service;

// Re-exports
pub use types::{
    ActorId, Alert, AlertCode, AlertType, Edge, Link, LinkId, NodeId, NodeKind, Repository,
    RepositoryId, Synonym, Synonyms, TimeRange, TimeRangePrefixFormat, Topic, TopicId,
};
pub use normalize::{normalize_topic_name, CanonicalUrl};
pub use query::{QuerySpec, TopicRef};
pub use error::EngineError;
pub use config::EngineConfig;
pub use deadline::Deadline;
pub use store::{GraphSession, GraphStore, InMemoryGraphStore};
#[cfg(feature = "postgres")]
pub use store::PostgresGraphStore;
pub use reachability::{ClosureTable, OnlineReachability, ReachabilitySet};
pub use search::SearchResults;
pub use fetch::{CachingFetcher, NoopFetcher, PageFetcher};
pub use engine::TopicGraph;

// Service re-exports (when service feature is enabled)
#[cfg(feature = "service")]
pub use service::{create_router, ServiceState};
