//! Environment-driven configuration.
//!
//! Every setting has a production default; unparseable values fall back to
//! the default rather than failing startup.

use std::str::FromStr;
use std::time::Duration;

#[cfg(feature = "postgres")]
pub use crate::store::postgres::PostgresConfig;

/// Read `key` from the environment, falling back to `default`.
pub(crate) fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Deadline for one mutation or search (`None` disables it).
    pub operation_timeout: Option<Duration>,
    /// Number of fetched page titles to keep.
    pub title_cache_size: usize,
    /// Timeout for one page-title fetch.
    pub fetch_timeout: Duration,
}

impl EngineConfig {
    /// Load configuration from environment variables with production defaults.
    ///
    /// - `GRAPH_OPERATION_TIMEOUT_MS` (default 10000, 0 disables)
    /// - `GRAPH_TITLE_CACHE_SIZE` (default 512)
    /// - `GRAPH_FETCH_TIMEOUT_MS` (default 5000)
    pub fn from_env() -> Self {
        let timeout_ms: u64 = env_or("GRAPH_OPERATION_TIMEOUT_MS", 10_000);
        Self {
            operation_timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
            title_cache_size: env_or("GRAPH_TITLE_CACHE_SIZE", 512),
            fetch_timeout: Duration::from_millis(env_or("GRAPH_FETCH_TIMEOUT_MS", 5_000)),
        }
    }

    /// Configuration without a deadline, for tests and batch tools.
    pub fn unbounded() -> Self {
        Self {
            operation_timeout: None,
            ..Self::default()
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Some(Duration::from_secs(10)),
            title_cache_size: 512,
            fetch_timeout: Duration::from_secs(5),
        }
    }
}

/// Log output format of the service binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable.
    Pretty,
}

impl FromStr for LogFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "pretty" => Self::Pretty,
            _ => Self::Json,
        })
    }
}

/// HTTP service settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Bind host (default 0.0.0.0).
    pub host: String,
    /// Bind port (default 8001).
    pub port: u16,
    /// Log format (default JSON).
    pub log_format: LogFormat,
    /// Batch loader collection window (default 2ms).
    pub loader_window: Duration,
}

impl ServiceConfig {
    /// Load configuration from `HOST`, `PORT`, `LOG_FORMAT` and `LOADER_WINDOW_MS`.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("PORT", 8001),
            log_format: env_or("LOG_FORMAT", LogFormat::Json),
            loader_window: Duration::from_millis(env_or("LOADER_WINDOW_MS", 2)),
        }
    }

    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
