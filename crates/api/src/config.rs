//! Application configuration loaded from environment variables.

use std::str::FromStr;

use saga::SagaConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `"json"` for JSON logs, anything else for text
/// - `DATABASE_URL`: PostgreSQL connection string; in-memory store when unset
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `LABEL_STORAGE_DIR`: directory for label PDFs; in-memory when unset
/// - `LABEL_PUBLIC_BASE_URL`: base URL the stored PDFs are served from
/// - `LABEL_SPOOL_DIR`: directory print jobs are spooled to; recorded only when unset
/// - `PRINT_MAX_RESERVE_RETRIES`, `PRINT_RETRY_BACKOFF_BASE_MS`,
///   `PRINT_RETRY_BACKOFF_MAX_MS`, `PRINT_COOLDOWN_MS`, `PRINT_MAX_BATCH_SIZE`,
///   `PRINT_PARALLELISM`, `PRINT_ARTIFACT_RETRIES`: [`SagaConfig`] overrides
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_json: bool,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub label_storage_dir: Option<String>,
    pub label_public_base_url: String,
    pub label_spool_dir: Option<String>,
    pub saga: SagaConfig,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let saga = &defaults.saga;

        let saga = SagaConfig {
            max_reserve_retries: parse_var(
                &lookup,
                "PRINT_MAX_RESERVE_RETRIES",
                saga.max_reserve_retries,
            ),
            retry_backoff_base_ms: parse_var(
                &lookup,
                "PRINT_RETRY_BACKOFF_BASE_MS",
                saga.retry_backoff_base_ms,
            ),
            retry_backoff_max_ms: parse_var(
                &lookup,
                "PRINT_RETRY_BACKOFF_MAX_MS",
                saga.retry_backoff_max_ms,
            ),
            cooldown_ms: parse_var(&lookup, "PRINT_COOLDOWN_MS", saga.cooldown_ms),
            max_batch_size: parse_var(&lookup, "PRINT_MAX_BATCH_SIZE", saga.max_batch_size),
            parallelism: parse_var(&lookup, "PRINT_PARALLELISM", saga.parallelism),
            artifact_retries: parse_var(&lookup, "PRINT_ARTIFACT_RETRIES", saga.artifact_retries),
        };

        Self {
            host: non_empty("HOST").unwrap_or(defaults.host.clone()),
            port: parse_var(&lookup, "PORT", defaults.port),
            log_level: non_empty("RUST_LOG").unwrap_or(defaults.log_level.clone()),
            log_json: lookup("LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json")),
            database_url: non_empty("DATABASE_URL"),
            database_max_connections: parse_var(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            ),
            label_storage_dir: non_empty("LABEL_STORAGE_DIR"),
            label_public_base_url: non_empty("LABEL_PUBLIC_BASE_URL")
                .unwrap_or(defaults.label_public_base_url.clone()),
            label_spool_dir: non_empty("LABEL_SPOOL_DIR"),
            saga,
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parses `key`, falling back to `default` when unset or malformed.
fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_json: false,
            database_url: None,
            database_max_connections: 10,
            label_storage_dir: None,
            label_public_base_url: "http://localhost:3000/files".to_string(),
            label_spool_dir: None,
            saga: SagaConfig::default(),
        }
    }
}
