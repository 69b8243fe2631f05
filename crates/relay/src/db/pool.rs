use std::time::Duration;

use anyhow::{bail, Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;

const APPLICATION_NAME: &str = "worksync-relay";
const DEFAULT_MIN_CONNECTIONS: u32 = 2;
const DEFAULT_MAX_CONNECTIONS: u32 = 20;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;

/// Connection limits for the workspace store pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub min_connections: u32,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub allow_insecure: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: DEFAULT_MIN_CONNECTIONS,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
            allow_insecure: false,
        }
    }
}

impl PoolConfig {
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Reads `WORKSYNC_RELAY_DB_*`. Unparseable values fall back to the
    /// defaults; the minimum never exceeds the maximum.
    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let number = |key: &str, default: u64| {
            env(key).ok().and_then(|value| value.trim().parse::<u64>().ok()).unwrap_or(default)
        };

        let max_connections =
            u32::try_from(number("WORKSYNC_RELAY_DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS.into()))
                .unwrap_or(DEFAULT_MAX_CONNECTIONS)
                .max(1);
        let min_connections =
            u32::try_from(number("WORKSYNC_RELAY_DB_MIN_CONNECTIONS", DEFAULT_MIN_CONNECTIONS.into()))
                .unwrap_or(DEFAULT_MIN_CONNECTIONS)
                .min(max_connections);
        let acquire_timeout = Duration::from_secs(
            number("WORKSYNC_RELAY_DB_ACQUIRE_TIMEOUT_SECS", DEFAULT_ACQUIRE_TIMEOUT_SECS).max(1),
        );

        Self { min_connections, max_connections, acquire_timeout, allow_insecure: false }
    }

    pub fn allow_insecure(mut self, allow_insecure: bool) -> Self {
        self.allow_insecure = allow_insecure;
        self
    }
}

pub async fn create_pg_pool(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let connect_options = connect_options(database_url, config.allow_insecure)?;

    PgPoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(connect_options)
        .await
        .context("failed to connect to workspace store PostgreSQL")
}

fn connect_options(database_url: &str, allow_insecure: bool) -> Result<PgConnectOptions> {
    let options = database_url
        .parse::<PgConnectOptions>()
        .context("failed to parse workspace store connection url")?;
    if !allow_insecure {
        ensure_postgres_tls(&options)?;
    }
    Ok(options.application_name(APPLICATION_NAME))
}

fn ensure_postgres_tls(options: &PgConnectOptions) -> Result<()> {
    match options.get_ssl_mode() {
        PgSslMode::Require | PgSslMode::VerifyCa | PgSslMode::VerifyFull => Ok(()),
        mode => bail!(
            "workspace store connection must require TLS; got sslmode={mode:?}. Use sslmode=require or set WORKSYNC_RELAY_DB_ALLOW_INSECURE=true for local development."
        ),
    }
}

/// Round-trips a trivial query; backs `/readyz`.
pub async fn check_pool_health(pool: &PgPool) -> Result<()> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await
        .context("workspace store health check failed")?;

    Ok(())
}
