//! Topic graph REST service.
//!
//! Exposes the [`TopicGraph`](crate::engine::TopicGraph) engine over HTTP.
//!
//! ## Endpoints
//!
//! - `POST /api/repositories` - Create a repository and its root topic
//! - `GET /api/repositories/:id/topics?q=` - Repository-wide topic match
//! - `POST /api/topics` - Upsert a topic
//! - `GET /api/topics/:id` - Fetch a topic with its parent topics
//! - `DELETE /api/topics/:id` - Delete a topic, splicing its children upward
//! - `PUT /api/topics/:id/parents` - Replace parent topics
//! - `PUT /api/topics/:id/synonyms` - Replace synonyms
//! - `PUT /api/topics/:id/timerange` - Set the time range
//! - `DELETE /api/topics/:id/timerange` - Clear the time range
//! - `POST /api/topics/:id/merge` - Merge a topic into one of its parents
//! - `GET /api/topics/:id/search?q=&page_size=` - Descendant search
//! - `POST /api/links` - Upsert a link
//! - `PUT /api/links/:id/parents` - Replace parent topics of a link
//! - `DELETE /api/links/:id` - Delete a link
//! - `GET /health` - Detailed service health check
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe

pub mod loader;
pub mod middleware;
pub mod routes;
pub mod state;

pub use loader::{LoadError, TopicLoader};
pub use middleware::{metrics_middleware, record_mutation_metrics, record_search_metrics};
pub use routes::{create_router, AppState, ErrorResponse};
pub use state::{ServiceState, StoreHealth};
