mod config;
mod db;
mod error;
mod identity;
mod indexer;
mod metrics;
mod reconcile;
mod store;
mod ws;

use std::{sync::Arc, time::Instant};

use anyhow::Context;
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{header, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use worksync_common::{
    protocol::{frame::EVENT_SERVER_STATUS, sync::StatusMessage},
    types::User,
};

use crate::{
    config::{LogFormat, RelayConfig},
    db::pool::{create_pg_pool, PoolConfig},
    error::{
        attach_request_id_header, request_id_from_headers_or_generate, with_request_id_scope,
        ErrorCode, RelayError,
    },
    identity::IdentityResolver,
    indexer::ContentIndexer,
    metrics::RelayMetrics,
    reconcile::Reconciler,
    store::{cache::WorkspaceCache, WorkspaceStore},
    ws::{ConnectionRegistry, EventRouter},
};

const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
struct AppState {
    store: WorkspaceStore,
    registry: ConnectionRegistry,
    metrics: Arc<RelayMetrics>,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
    connected_clients: usize,
    server_time: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RelayConfig::from_env();
    init_tracing(&config);

    let relay_metrics = Arc::new(RelayMetrics::default());
    metrics::set_global_metrics(Arc::clone(&relay_metrics));

    let (identity, store) = build_backends(&config).await?;
    let indexer = build_indexer(&config)?;
    let cache = WorkspaceCache::new(config.workspace_cache_ttl);
    let reconciler = Reconciler::new(identity, store.clone(), indexer, cache);

    let registry = ConnectionRegistry::default();
    let state = AppState { store, registry: registry.clone(), metrics: relay_metrics };
    let app = build_router(state, EventRouter::new(reconciler));

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind relay listener on {}", config.listen_addr))?;

    info!(listen_addr = %config.listen_addr, "starting worksync relay");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(registry))
        .await
        .context("relay server exited unexpectedly")
}

fn init_tracing(config: &RelayConfig) {
    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log_format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }
}

async fn build_backends(config: &RelayConfig) -> anyhow::Result<(IdentityResolver, WorkspaceStore)> {
    if let Some(database_url) = &config.database_url {
        let pool_config = PoolConfig::from_env().allow_insecure(config.database_allow_insecure);
        let pool = create_pg_pool(database_url, pool_config).await?;
        db::migrations::run_migrations(&pool).await?;
        info!("using PostgreSQL workspace store");
        return Ok((IdentityResolver::Postgres(pool.clone()), WorkspaceStore::Postgres(pool)));
    }

    let identity = IdentityResolver::memory();
    match &config.dev_api_key {
        Some(api_key) => {
            let user = User {
                id: Uuid::new_v4(),
                email: "dev@localhost".to_string(),
                display_name: "Local Developer".to_string(),
            };
            info!(user_id = %user.id, "registered development api key");
            identity.register_api_key(api_key, user).await;
        }
        None => warn!("no database and no development api key; every file update will be rejected"),
    }
    info!("using in-memory workspace store");
    Ok((identity, WorkspaceStore::memory()))
}

fn build_indexer(config: &RelayConfig) -> anyhow::Result<ContentIndexer> {
    match &config.indexer_url {
        Some(url) => {
            info!(indexer_url = %url, "content indexing enabled");
            ContentIndexer::http(url.clone(), config.indexer_timeout)
                .context("failed to build content indexer client")
        }
        None => {
            info!("content indexing disabled");
            Ok(ContentIndexer::Disabled)
        }
    }
}

fn build_router(state: AppState, event_router: EventRouter) -> Router {
    let socket_router = ws::router(event_router, state.registry.clone());
    apply_middleware(
        Router::new()
            .route("/healthz", get(healthz))
            .route("/readyz", get(readyz))
            .route("/v1/status", get(status))
            .route("/metrics", get(render_metrics))
            .with_state(state)
            .merge(socket_router)
            .fallback(not_found),
    )
}

fn apply_middleware(router: Router) -> Router {
    router
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(middleware::from_fn(request_context_middleware))
        .layer(middleware::from_fn(panic_handler))
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn readyz(State(state): State<AppState>) -> Response {
    match state.store.health_check().await {
        Ok(()) => (StatusCode::OK, "ready").into_response(),
        Err(error) => {
            error!(error = ?error, "workspace store health check failed");
            RelayError::new(ErrorCode::ServiceUnavailable, "workspace store is unavailable")
                .with_details(json!({ "component": "workspace_store" }))
                .into_response()
        }
    }
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok",
        connected_clients: state.registry.connection_count().await,
        server_time: Utc::now().to_rfc3339(),
    })
}

async fn render_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render_prometheus(),
    )
}

async fn not_found() -> RelayError {
    RelayError::from_code(ErrorCode::NotFound)
}

async fn shutdown_signal(registry: ConnectionRegistry) {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            error!(error = %error, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                error!(error = %error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
    notify_shutdown(&registry).await;
}

async fn notify_shutdown(registry: &ConnectionRegistry) {
    let payload = StatusMessage::new("shutting_down", "Server is shutting down");
    let notified = registry.broadcast(EVENT_SERVER_STATUS, &payload).await;
    info!(connections = notified, "notified clients of shutdown");
    registry.close_all();
}

async fn panic_handler(request: Request<Body>, next: Next) -> Response {
    match tokio::spawn(async move { next.run(request).await }).await {
        Ok(response) => response,
        Err(join_error) => {
            error!(?join_error, "request handling panicked");
            RelayError::from_code(ErrorCode::InternalError).into_response()
        }
    }
}

async fn request_context_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = request_id_from_headers_or_generate(request.headers());
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started_at = Instant::now();

    let mut response = with_request_id_scope(request_id.clone(), next.run(request)).await;
    attach_request_id_header(&mut response, &request_id);

    let latency_ms = started_at.elapsed().as_millis() as u64;
    let status = response.status().as_u16();
    metrics::record_http_request(method.as_str(), &path, status, latency_ms);
    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status,
        latency_ms,
        "request completed"
    );

    response
}
