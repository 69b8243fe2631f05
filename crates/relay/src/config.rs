// Relay server configuration.
//
// Centralizes environment variable parsing with defaults for local
// development. The database pool reads its own sizing variables in
// `db::pool::PoolConfig`.

use std::{net::SocketAddr, time::Duration};

const DEFAULT_PORT: u16 = 8888;
const DEFAULT_INDEXER_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_WORKSPACE_CACHE_TTL_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Core relay server configuration.
///
/// Constructed via [`RelayConfig::from_env`] which reads environment
/// variables and falls back to development defaults.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Listen address (host:port).
    pub listen_addr: SocketAddr,
    /// PostgreSQL connection string. In-memory stores are used when absent.
    pub database_url: Option<String>,
    /// Accept non-TLS PostgreSQL connections (local development only).
    pub database_allow_insecure: bool,
    /// Log filter directive (e.g. `info`, `worksync_relay=debug`).
    pub log_filter: String,
    pub log_format: LogFormat,
    /// Endpoint receiving best-effort content indexing submissions.
    pub indexer_url: Option<String>,
    pub indexer_timeout: Duration,
    /// Lifetime of cached workspace resolutions; zero disables the cache.
    pub workspace_cache_ttl: Duration,
    /// API key registered for a local development user in memory mode.
    pub dev_api_key: Option<String>,
}

impl RelayConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `WORKSYNC_RELAY_HOST` | `0.0.0.0` |
    /// | `WORKSYNC_RELAY_PORT` | `8888` |
    /// | `WORKSYNC_RELAY_DATABASE_URL` | *(unset: in-memory stores)* |
    /// | `WORKSYNC_RELAY_DB_ALLOW_INSECURE` | `false` |
    /// | `WORKSYNC_RELAY_LOG_FILTER` | `info` |
    /// | `WORKSYNC_RELAY_LOG_FORMAT` | `text` |
    /// | `WORKSYNC_RELAY_INDEXER_URL` | *(unset: indexing disabled)* |
    /// | `WORKSYNC_RELAY_INDEXER_TIMEOUT_MS` | `5000` |
    /// | `WORKSYNC_RELAY_WORKSPACE_CACHE_TTL_SECS` | `300` |
    /// | `WORKSYNC_RELAY_DEV_API_KEY` | *(unset)* |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("WORKSYNC_RELAY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env("WORKSYNC_RELAY_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        let database_url = env("WORKSYNC_RELAY_DATABASE_URL").ok().filter(|v| !v.trim().is_empty());
        let database_allow_insecure = env("WORKSYNC_RELAY_DB_ALLOW_INSECURE")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let log_filter = env("WORKSYNC_RELAY_LOG_FILTER").unwrap_or_else(|_| "info".into());
        let log_format = match env("WORKSYNC_RELAY_LOG_FORMAT") {
            Ok(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        let indexer_url = env("WORKSYNC_RELAY_INDEXER_URL").ok().filter(|v| !v.trim().is_empty());
        let indexer_timeout_ms = env("WORKSYNC_RELAY_INDEXER_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_INDEXER_TIMEOUT_MS);

        let workspace_cache_ttl_secs = env("WORKSYNC_RELAY_WORKSPACE_CACHE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_WORKSPACE_CACHE_TTL_SECS);

        let dev_api_key = env("WORKSYNC_RELAY_DEV_API_KEY")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        Self {
            listen_addr,
            database_url,
            database_allow_insecure,
            log_filter,
            log_format,
            indexer_url,
            indexer_timeout: Duration::from_millis(indexer_timeout_ms),
            workspace_cache_ttl: Duration::from_secs(workspace_cache_ttl_secs),
            dev_api_key,
        }
    }
}
