//! Service middleware for metrics and request tracking.
//!
//! ## Metrics Exposed
//!
//! - `request` - Request count and latency by path pattern, method, status
//! - `search` - Result counts and latency of descendant searches
//! - `mutation` - Alert counts of graph mutations

use axum::{extract::Request, middleware::Next, response::Response};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::info;

/// Metrics middleware that records request counts and latency.
///
/// Uses tracing; metrics are aggregated from the log stream.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = normalize_path(request.uri().path());

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status().as_u16();

    info!(
        target: "digraph_kernel::metrics",
        metric_type = "request",
        path = %path,
        method = %method,
        status = status,
        latency_ms = latency.as_millis() as u64,
        "request_metric"
    );

    response
}

/// Normalize path for metrics to avoid high cardinality.
///
/// Replaces UUID path segments with `:id`.
fn normalize_path(path: &str) -> String {
    static UUID: OnceLock<Option<regex_lite::Regex>> = OnceLock::new();
    let pattern = UUID.get_or_init(|| {
        regex_lite::Regex::new(
            r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
        )
        .ok()
    });

    match pattern {
        Some(re) => re.replace_all(path, ":id").to_string(),
        None => path.to_string(),
    }
}

/// Record descendant search metrics.
pub fn record_search_metrics(topic_count: usize, link_count: usize, latency_ms: u64) {
    info!(
        target: "digraph_kernel::metrics",
        metric_type = "search",
        topic_count = topic_count,
        link_count = link_count,
        latency_ms = latency_ms,
        "search_metric"
    );
}

/// Record a graph mutation and how many alerts it produced.
pub fn record_mutation_metrics(operation: &str, alert_count: usize) {
    info!(
        target: "digraph_kernel::metrics",
        metric_type = "mutation",
        operation = operation,
        alert_count = alert_count,
        "mutation_metric"
    );
}
