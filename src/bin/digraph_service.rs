//! Topic Graph Service Binary
//!
//! Runs the topic graph engine as a REST API service:
//! - Structured JSON logging
//! - Request tracing with correlation IDs
//! - Graceful shutdown handling
//! - Health check endpoints
//!
//! ## Configuration
//!
//! Environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string (required)
//! - `PORT`: Service port (default: 8001)
//! - `HOST`: Service host (default: 0.0.0.0)
//! - `RUST_LOG`: Log level filter (default: info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: json)
//! - `LOADER_WINDOW_MS`: Batch loader collection window (default: 2)
//! - `GRAPH_OPERATION_TIMEOUT_MS`: Per-operation deadline, 0 disables (default: 10000)
//! - `GRAPH_TITLE_CACHE_SIZE`: Cached page titles (default: 512)
//! - `GRAPH_FETCH_TIMEOUT_MS`: Page title fetch timeout (default: 5000)
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://... cargo run --bin digraph_service --features service,fetch
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, warn, Instrument};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use digraph_kernel::config::{EngineConfig, LogFormat, ServiceConfig};
use digraph_kernel::fetch::{CachingFetcher, PageFetcher};
use digraph_kernel::service::{create_router, metrics_middleware, ServiceState};
use digraph_kernel::PostgresGraphStore;

/// Initialize the tracing subscriber with JSON or pretty format
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "digraph_service=info,digraph_kernel=info,tower_http=info,sqlx=warn".into());

    match format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_span_events(FmtSpan::CLOSE),
                )
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_current_span(true)
                        .with_span_events(FmtSpan::CLOSE)
                        .flatten_event(true),
                )
                .init();
        }
    }
}

/// Request logging middleware that adds correlation ID and timing
async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let trace_id = request
        .headers()
        .get("X-Request-Id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let method = request.method().clone();
    let uri = request.uri().path().to_string();

    let span = info_span!(
        "request",
        trace_id = %trace_id,
        method = %method,
        path = %uri,
        status = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
    );

    let response = next.run(request).instrument(span.clone()).await;

    let latency = start.elapsed();
    let status = response.status().as_u16();

    span.record("status", status);
    span.record("latency_ms", latency.as_millis() as u64);

    info!(
        target: "digraph_service::access",
        trace_id = %trace_id,
        method = %method,
        path = %uri,
        status = status,
        latency_ms = latency.as_millis() as u64,
        "request completed"
    );

    response
}

/// Page fetcher for link titles: HTTP when built with `fetch`, otherwise none.
fn title_fetcher(config: &EngineConfig) -> Arc<dyn PageFetcher> {
    #[cfg(feature = "fetch")]
    {
        match digraph_kernel::fetch::HttpTitleFetcher::new(config.fetch_timeout) {
            Ok(fetcher) => return Arc::new(fetcher),
            Err(e) => warn!(error = %e, "HTTP title fetcher unavailable, titles will not be fetched"),
        }
    }
    #[cfg(not(feature = "fetch"))]
    {
        let _ = config;
        warn!("Built without the fetch feature, titles will not be fetched");
    }
    Arc::new(digraph_kernel::fetch::NoopFetcher)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let service_config = ServiceConfig::from_env();
    init_tracing(service_config.log_format);

    let version = env!("CARGO_PKG_VERSION");
    let build_sha = option_env!("BUILD_SHA").unwrap_or("dev");

    info!(
        version = version,
        build_sha = build_sha,
        "Starting Topic Graph Service"
    );

    info!("Connecting to PostgreSQL...");
    let connect_start = Instant::now();

    let store = match tokio::time::timeout(Duration::from_secs(30), PostgresGraphStore::from_env()).await {
        Ok(Ok(store)) => store,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            return Err(e.into());
        }
        Err(_) => {
            tracing::error!("PostgreSQL connection timeout after 30s");
            return Err("Database connection timeout".into());
        }
    };

    info!(
        latency_ms = connect_start.elapsed().as_millis() as u64,
        "PostgreSQL connection established"
    );

    store.migrate().await?;
    info!("Schema migrations applied");

    let engine_config = EngineConfig::from_env();
    info!(
        operation_timeout_ms = engine_config.operation_timeout.map(|d| d.as_millis() as u64),
        title_cache_size = engine_config.title_cache_size,
        loader_window_ms = service_config.loader_window.as_millis() as u64,
        "Engine configured"
    );

    let fetcher = CachingFetcher::new(title_fetcher(&engine_config), engine_config.title_cache_size);
    let state = ServiceState::with_fetcher(
        store,
        engine_config,
        service_config.loader_window,
        fetcher,
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr: SocketAddr = service_config.bind_addr().parse()?;
    info!(
        address = %addr,
        version = version,
        "Topic Graph Service listening"
    );

    let listener = TcpListener::bind(addr).await?;

    info!("Ready to accept connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Topic Graph Service shutdown complete");

    Ok(())
}
