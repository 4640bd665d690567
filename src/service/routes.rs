//! Axum routes for the topic graph service.

use axum::{
    extract::{Json, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::engine::{
    CreateRepositoryResult, DeleteLinkResult, DeleteTopicResult, LinkUpdate, MergeTopicResult,
    TopicUpdate, UpsertLinkResult, UpsertTopicResult,
};
use crate::error::EngineError;
use crate::search::SearchResults;
use crate::store::{GraphStore, PostgresGraphStore};
use crate::types::{
    ActorId, LinkId, NodeId, RepositoryId, Synonym, TimeRangePrefixFormat, Topic, TopicId,
};

use super::middleware::{record_mutation_metrics, record_search_metrics};
use super::state::{ServiceState, StoreHealth};

/// Type alias for the service state with PostgresGraphStore.
pub type AppState = ServiceState<PostgresGraphStore>;

/// Header carrying the acting user.
pub const ACTOR_HEADER: &str = "x-actor-id";

const DEFAULT_SEARCH_LIMIT: usize = 100;
const DEFAULT_MATCH_LIMIT: usize = 20;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to create a repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRepositoryRequest {
    /// Repository name.
    pub name: String,
}

/// Request to create or fetch a topic by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertTopicRequest {
    /// Owning repository.
    pub repository_id: RepositoryId,
    /// Topic name; normalized before storage.
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Parent topics; empty means the repository root.
    #[serde(default)]
    pub parent_topic_ids: Vec<TopicId>,
}

/// Request to replace the parent topics of a topic or link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateParentsRequest {
    /// The requested parent set.
    #[serde(default)]
    pub parent_topic_ids: Vec<TopicId>,
}

/// Request to replace the synonyms of a topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSynonymsRequest {
    /// New synonyms, in display order.
    pub synonyms: Vec<Synonym>,
}

/// Request to set the time range of a topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeRangeRequest {
    /// Start of the range.
    pub starts_at: DateTime<Utc>,
    /// Optional end of the range.
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    /// Name prefix rendering.
    #[serde(default)]
    pub prefix_format: TimeRangePrefixFormat,
}

/// Request to merge a topic into one of its parents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequest {
    /// The parent topic that survives.
    pub target_topic_id: TopicId,
}

/// Request to create or update a link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertLinkRequest {
    /// Owning repository.
    pub repository_id: RepositoryId,
    /// URL as submitted.
    pub url: String,
    /// Title; fetched from the page when absent.
    #[serde(default)]
    pub title: Option<String>,
    /// Parent topics; empty means the repository root for new links.
    #[serde(default)]
    pub parent_topic_ids: Vec<TopicId>,
}

/// Query string of the descendant search endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchParams {
    /// Search string.
    #[serde(default)]
    pub q: String,
    /// Maximum topics to return.
    pub topic_limit: Option<usize>,
    /// Maximum links to return.
    pub link_limit: Option<usize>,
    /// Total results in one page, topics first. Overrides both limits.
    pub page_size: Option<usize>,
}

/// Query string of the repository-wide topic match endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchParams {
    /// Search string.
    #[serde(default)]
    pub q: String,
    /// Maximum topics to return.
    pub limit: Option<usize>,
}

/// A topic with its direct parents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicResponse {
    /// The topic.
    pub topic: Topic,
    /// Its direct parent topics.
    pub parent_topics: Vec<Topic>,
}

/// Service health response (detailed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Database connectivity status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseHealth>,
}

/// Database health information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseHealth {
    pub connected: bool,
    pub pool_size: u32,
    pub pool_idle: usize,
    pub pool_max: u32,
}

/// Simple liveness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResponse {
    pub status: String,
}

/// Readiness response with dependency status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub database: bool,
    pub details: Option<String>,
}

/// Structured error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Machine-readable error code.
    pub code: String,
    /// Additional error details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    /// Create a new error response with code and message.
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            details: None,
        }
    }

    /// Add details to the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// An engine error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            EngineError::TopicNotFound(_) => (StatusCode::NOT_FOUND, "TOPIC_NOT_FOUND"),
            EngineError::LinkNotFound(_) => (StatusCode::NOT_FOUND, "LINK_NOT_FOUND"),
            EngineError::RepositoryNotFound(_) => {
                (StatusCode::NOT_FOUND, "REPOSITORY_NOT_FOUND")
            }
            EngineError::RootTopic { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "ROOT_TOPIC"),
            EngineError::InvalidMerge { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_MERGE")
            }
            EngineError::DeadlineExceeded { .. } => {
                (StatusCode::GATEWAY_TIMEOUT, "DEADLINE_EXCEEDED")
            }
            EngineError::Store { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(code = code, error = %self.0, "Request failed");
        } else {
            tracing::warn!(code = code, error = %self.0, "Request error");
        }
        let mut body = ErrorResponse::new(code, self.0.to_string());
        match &self.0 {
            EngineError::RootTopic { operation, .. }
            | EngineError::DeadlineExceeded { operation }
            | EngineError::Store { operation, .. } => {
                body = body.with_details(*operation);
            }
            _ => {}
        }
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ============================================================================
// Route Handlers
// ============================================================================

fn actor_from(headers: &HeaderMap) -> ActorId {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ActorId::new)
        .unwrap_or_else(ActorId::anonymous)
}

/// Create a repository with its root topic.
async fn create_repository_handler<S: GraphStore + 'static>(
    State(state): State<Arc<ServiceState<S>>>,
    Json(request): Json<CreateRepositoryRequest>,
) -> ApiResult<CreateRepositoryResult> {
    let result = state.graph.create_repository(&request.name).await?;
    record_mutation_metrics("create_repository", 0);
    Ok(Json(result))
}

/// Repository-wide topic match.
async fn match_topics_handler<S: GraphStore + 'static>(
    State(state): State<Arc<ServiceState<S>>>,
    Path(repository_id): Path<RepositoryId>,
    Query(params): Query<MatchParams>,
) -> ApiResult<Vec<Topic>> {
    let limit = params.limit.unwrap_or(DEFAULT_MATCH_LIMIT);
    let topics = state
        .graph
        .match_topics(repository_id, &params.q, limit)
        .await?;
    Ok(Json(topics))
}

/// Upsert a topic.
async fn upsert_topic_handler<S: GraphStore + 'static>(
    State(state): State<Arc<ServiceState<S>>>,
    Json(request): Json<UpsertTopicRequest>,
) -> ApiResult<UpsertTopicResult> {
    let result = state
        .graph
        .upsert_topic(
            request.repository_id,
            &request.name,
            request.description,
            &request.parent_topic_ids,
        )
        .await?;
    record_mutation_metrics("upsert_topic", result.alerts.len());
    Ok(Json(result))
}

/// Fetch a topic, hydrating parent topics through the batch loader.
async fn get_topic_handler<S: GraphStore + 'static>(
    State(state): State<Arc<ServiceState<S>>>,
    Path(topic_id): Path<TopicId>,
) -> ApiResult<TopicResponse> {
    let topic = state
        .graph
        .get_topic(topic_id)
        .await?
        .ok_or(EngineError::TopicNotFound(topic_id))?;
    let parent_ids = state.graph.parent_topic_ids(NodeId::Topic(topic.id)).await?;

    let loader = state.topic_loader();
    let parent_topics = loader.load_many(&parent_ids).await.map_err(|e| {
        EngineError::Store {
            operation: "load parent topics",
            message: e.to_string(),
        }
    })?;

    Ok(Json(TopicResponse {
        topic,
        parent_topics,
    }))
}

/// Delete a topic.
async fn delete_topic_handler<S: GraphStore + 'static>(
    State(state): State<Arc<ServiceState<S>>>,
    headers: HeaderMap,
    Path(topic_id): Path<TopicId>,
) -> ApiResult<DeleteTopicResult> {
    let actor = actor_from(&headers);
    let result = state.graph.delete_topic(&actor, topic_id).await?;
    record_mutation_metrics("delete_topic", 0);
    Ok(Json(result))
}

/// Replace the parent topics of a topic.
async fn update_topic_parents_handler<S: GraphStore + 'static>(
    State(state): State<Arc<ServiceState<S>>>,
    Path(topic_id): Path<TopicId>,
    Json(request): Json<UpdateParentsRequest>,
) -> ApiResult<TopicUpdate> {
    let result = state
        .graph
        .update_topic_parent_topics(topic_id, &request.parent_topic_ids)
        .await?;
    record_mutation_metrics("update_topic_parent_topics", result.alerts.len());
    Ok(Json(result))
}

/// Replace the synonyms of a topic.
async fn update_synonyms_handler<S: GraphStore + 'static>(
    State(state): State<Arc<ServiceState<S>>>,
    Path(topic_id): Path<TopicId>,
    Json(request): Json<UpdateSynonymsRequest>,
) -> ApiResult<TopicUpdate> {
    let result = state
        .graph
        .update_topic_synonyms(topic_id, request.synonyms)
        .await?;
    record_mutation_metrics("update_topic_synonyms", result.alerts.len());
    Ok(Json(result))
}

/// Set the time range of a topic.
async fn upsert_timerange_handler<S: GraphStore + 'static>(
    State(state): State<Arc<ServiceState<S>>>,
    Path(topic_id): Path<TopicId>,
    Json(request): Json<TimeRangeRequest>,
) -> ApiResult<TopicUpdate> {
    let result = state
        .graph
        .upsert_topic_timerange(
            topic_id,
            request.starts_at,
            request.ends_at,
            request.prefix_format,
        )
        .await?;
    record_mutation_metrics("upsert_topic_timerange", result.alerts.len());
    Ok(Json(result))
}

/// Clear the time range of a topic.
async fn delete_timerange_handler<S: GraphStore + 'static>(
    State(state): State<Arc<ServiceState<S>>>,
    Path(topic_id): Path<TopicId>,
) -> ApiResult<TopicUpdate> {
    let result = state.graph.delete_topic_timerange(topic_id).await?;
    record_mutation_metrics("delete_topic_timerange", result.alerts.len());
    Ok(Json(result))
}

/// Merge a topic into one of its parents.
async fn merge_topic_handler<S: GraphStore + 'static>(
    State(state): State<Arc<ServiceState<S>>>,
    Path(topic_id): Path<TopicId>,
    Json(request): Json<MergeRequest>,
) -> ApiResult<MergeTopicResult> {
    let result = state
        .graph
        .merge_topic(topic_id, request.target_topic_id)
        .await?;
    record_mutation_metrics("merge_topic", result.alerts.len());
    Ok(Json(result))
}

/// Descendant search below a topic.
async fn search_handler<S: GraphStore + 'static>(
    State(state): State<Arc<ServiceState<S>>>,
    Path(topic_id): Path<TopicId>,
    Query(params): Query<SearchParams>,
) -> ApiResult<SearchResults> {
    let start = Instant::now();
    let results = match params.page_size {
        Some(page_size) => state.graph.search_page(topic_id, &params.q, page_size).await?,
        None => {
            state
                .graph
                .search(
                    topic_id,
                    &params.q,
                    params.topic_limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
                    params.link_limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
                )
                .await?
        }
    };
    record_search_metrics(
        results.topics.len(),
        results.links.len(),
        start.elapsed().as_millis() as u64,
    );
    Ok(Json(results))
}

/// Upsert a link.
async fn upsert_link_handler<S: GraphStore + 'static>(
    State(state): State<Arc<ServiceState<S>>>,
    Json(request): Json<UpsertLinkRequest>,
) -> ApiResult<UpsertLinkResult> {
    let result = state
        .graph
        .upsert_link(
            request.repository_id,
            &request.url,
            request.title,
            &request.parent_topic_ids,
        )
        .await?;
    record_mutation_metrics("upsert_link", result.alerts.len());
    Ok(Json(result))
}

/// Replace the parent topics of a link.
async fn update_link_parents_handler<S: GraphStore + 'static>(
    State(state): State<Arc<ServiceState<S>>>,
    Path(link_id): Path<LinkId>,
    Json(request): Json<UpdateParentsRequest>,
) -> ApiResult<LinkUpdate> {
    let result = state
        .graph
        .update_link_parent_topics(link_id, &request.parent_topic_ids)
        .await?;
    record_mutation_metrics("update_link_parent_topics", result.alerts.len());
    Ok(Json(result))
}

/// Delete a link.
async fn delete_link_handler<S: GraphStore + 'static>(
    State(state): State<Arc<ServiceState<S>>>,
    Path(link_id): Path<LinkId>,
) -> ApiResult<DeleteLinkResult> {
    let result = state.graph.delete_link(link_id).await?;
    record_mutation_metrics("delete_link", 0);
    Ok(Json(result))
}

/// Health check endpoint (detailed).
///
/// Returns full service status including database health.
async fn health_handler<S: GraphStore + StoreHealth + 'static>(
    State(state): State<Arc<ServiceState<S>>>,
) -> Json<HealthResponse> {
    let store = state.graph.store();
    let db_healthy = store.is_healthy().await;
    let database = store.pool_stats().map(|stats| DatabaseHealth {
        connected: db_healthy,
        pool_size: stats.size,
        pool_idle: stats.idle,
        pool_max: stats.max,
    });

    Json(HealthResponse {
        status: if db_healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database,
    })
}

/// Liveness probe endpoint.
///
/// Does NOT check dependencies. Returns 200 if the process is alive.
async fn liveness_handler() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "alive".to_string(),
    })
}

/// Readiness probe endpoint.
///
/// Returns 200 if the store is reachable, 503 otherwise.
async fn readiness_handler<S: GraphStore + StoreHealth + 'static>(
    State(state): State<Arc<ServiceState<S>>>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    if state.graph.store().is_healthy().await {
        Ok(Json(ReadinessResponse {
            ready: true,
            database: true,
            details: None,
        }))
    } else {
        Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                ready: false,
                database: false,
                details: Some("Database connection failed".to_string()),
            }),
        ))
    }
}

// ============================================================================
// Router Construction
// ============================================================================

/// Create the Axum router for the topic graph service.
pub fn create_router<S: GraphStore + StoreHealth + 'static>(state: ServiceState<S>) -> Router {
    let state = Arc::new(state);

    Router::new()
        // Repositories
        .route("/api/repositories", post(create_repository_handler::<S>))
        .route("/api/repositories/:id/topics", get(match_topics_handler::<S>))
        // Topics
        .route("/api/topics", post(upsert_topic_handler::<S>))
        .route(
            "/api/topics/:id",
            get(get_topic_handler::<S>).delete(delete_topic_handler::<S>),
        )
        .route("/api/topics/:id/parents", put(update_topic_parents_handler::<S>))
        .route("/api/topics/:id/synonyms", put(update_synonyms_handler::<S>))
        .route(
            "/api/topics/:id/timerange",
            put(upsert_timerange_handler::<S>).delete(delete_timerange_handler::<S>),
        )
        .route("/api/topics/:id/merge", post(merge_topic_handler::<S>))
        .route("/api/topics/:id/search", get(search_handler::<S>))
        // Links
        .route("/api/links", post(upsert_link_handler::<S>))
        .route("/api/links/:id", axum::routing::delete(delete_link_handler::<S>))
        .route("/api/links/:id/parents", put(update_link_parents_handler::<S>))
        // Health checks
        .route("/health", get(health_handler::<S>))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler::<S>))
        .with_state(state)
}
