//! # claimgraph HTTP API
//!
//! JSON over HTTP for crawl workers, extractors and catalog tooling.
//!
//! ## Routes
//!
//! Open:
//! - `GET /health`
//!
//! Queries ([`Scope::Read`]):
//! - `GET /status` graph row counts and resilience settings
//! - `GET /frontier/stats/{job_id}` task counts per status
//! - `POST /resolve/field`, `POST /resolve/item` trust arbitration
//! - `POST /identity/resolve` free text to canonical entity
//! - `POST /identity/compatibility` consumable/printer pairs
//!
//! Mutations ([`Scope::Write`]):
//! - `POST /frontier/tasks`, `/frontier/next`, `/frontier/next_batch`,
//!   `/frontier/complete`, `/frontier/reclaim`
//! - `POST /sources`, `POST /claims`
//! - `POST /identity/link`, `POST /graph/populate`
//!
//! Scopes only bite when `CLAIMGRAPH_API_KEY` is set.
//!
//! ## Environment
//!
//! - `CLAIMGRAPH_CORS_ORIGINS`: comma-separated origins or `*` (default: localhost)
//! - `CLAIMGRAPH_RATE_LIMIT`: requests per second (default 100, 0 disables)
//! - `CLAIMGRAPH_API_KEY`, `CLAIMGRAPH_READ_API_KEY`: bearer keys

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::{ApiKeys, Denied, Scope};
pub use handlers::ApiError;
pub use middleware::{create_rate_limiter, get_rate_limit_from_env, parse_rate_limit};
pub use types::{
    AddTaskRequest, AddTaskResponse, CompatibilityRequest, CompatibilityResponse,
    CompleteTaskRequest, ErrorResponse, HealthResponse, IngestClaimsRequest, IngestClaimsResponse,
    LinkAliasRequest, NextBatchRequest, NextTaskRequest, PopulateRequest, ReclaimRequest,
    ReclaimResponse, ResolveFieldRequest, ResolveFieldResponse, ResolveIdentityRequest,
    ResolveItemRequest, ResolveItemResponse, StatusResponse, TaskResponse, TasksResponse,
};

use crate::config::AppConfig;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use claimgraph_core::{
    ClaimGraphError, ClaimStore, Frontier, GraphPopulator, GraphService, SourceStore, Store,
    TrustEngine,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state. Every service is a cheap handle onto the same store.
#[derive(Clone)]
pub struct AppState {
    pub frontier: Frontier,
    pub sources: SourceStore,
    pub claims: ClaimStore,
    pub graph: GraphService,
    pub populator: GraphPopulator,
    pub trust: Arc<TrustEngine>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Wire every service onto `store` using `config`.
    #[must_use]
    pub fn new(store: Store, config: AppConfig) -> Self {
        Self {
            frontier: Frontier::new(store.clone()),
            sources: SourceStore::new(store.clone())
                .with_cache_window(config.sources.cache_window()),
            claims: ClaimStore::new(store.clone()),
            graph: GraphService::new(store.clone()),
            populator: GraphPopulator::new(store),
            trust: Arc::new(TrustEngine::new(config.trust.clone())),
            config: Arc::new(config),
        }
    }
}

// =============================================================================
// CORS
// =============================================================================

/// Origins allowed when `CLAIMGRAPH_CORS_ORIGINS` is unset or unusable.
const LOCAL_ORIGINS: [&str; 4] = [
    "http://localhost:3000",
    "http://localhost:8080",
    "http://127.0.0.1:3000",
    "http://127.0.0.1:8080",
];

/// Largest accepted request body. Populate payloads are the biggest.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Valid header values among comma-separated `origins`. Invalid entries are
/// logged and skipped.
fn parse_origins(origins: &str) -> Vec<HeaderValue> {
    origins
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin, error = %e, "ignoring invalid CORS origin");
                None
            }
        })
        .collect()
}

/// CORS for an optional `CLAIMGRAPH_CORS_ORIGINS` value.
fn cors_layer(setting: Option<&str>) -> CorsLayer {
    if setting == Some("*") {
        tracing::warn!("CORS allows every origin; do not expose this to the internet");
        return CorsLayer::permissive();
    }
    let mut origins = setting.map(parse_origins).unwrap_or_default();
    if origins.is_empty() {
        origins = LOCAL_ORIGINS
            .iter()
            .filter_map(|o| o.parse::<HeaderValue>().ok())
            .collect();
        tracing::info!("CORS limited to localhost");
    } else {
        tracing::info!(count = origins.len(), "CORS limited to configured origins");
    }
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTES
// =============================================================================

/// Routes that only read the store.
fn query_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(handlers::status_handler))
        .route(
            "/frontier/stats/{job_id}",
            get(handlers::frontier_stats_handler),
        )
        .route("/resolve/field", post(handlers::resolve_field_handler))
        .route("/resolve/item", post(handlers::resolve_item_handler))
        .route("/identity/resolve", post(handlers::resolve_identity_handler))
        .route(
            "/identity/compatibility",
            post(handlers::compatibility_handler),
        )
}

/// Routes that write to the store or claim frontier work.
fn mutation_routes() -> Router<AppState> {
    Router::new()
        .route("/frontier/tasks", post(handlers::add_task_handler))
        .route("/frontier/next", post(handlers::next_task_handler))
        .route("/frontier/next_batch", post(handlers::next_batch_handler))
        .route("/frontier/complete", post(handlers::complete_task_handler))
        .route("/frontier/reclaim", post(handlers::reclaim_handler))
        .route("/sources", post(handlers::record_source_handler))
        .route("/claims", post(handlers::ingest_claims_handler))
        .route("/identity/link", post(handlers::link_alias_handler))
        .route("/graph/populate", post(handlers::populate_handler))
}

/// Gate `routes` behind `scope`. Unmatched paths stay 404.
fn scoped(routes: Router<AppState>, keys: &Arc<ApiKeys>, scope: Scope) -> Router<AppState> {
    routes.route_layer(axum_middleware::from_fn_with_state(
        (Arc::clone(keys), scope),
        auth::require_scope,
    ))
}

/// Build the router.
///
/// Layers, outermost first: tracing, CORS, body limit, rate limiting, then
/// the per-scope key check on each route group.
pub fn create_router(state: AppState) -> Router {
    let (queries, mutations) = match ApiKeys::from_env().map(Arc::new) {
        Some(keys) => {
            tracing::info!(?keys, "API key authentication enabled");
            (
                scoped(query_routes(), &keys, Scope::Read),
                scoped(mutation_routes(), &keys, Scope::Write),
            )
        }
        None => {
            tracing::warn!(
                "API key authentication disabled, every route is public; set {} to enable it",
                auth::WRITE_KEY_VAR
            );
            (query_routes(), mutation_routes())
        }
    };

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .merge(queries)
        .merge(mutations);

    let rps = get_rate_limit_from_env();
    match create_rate_limiter(rps) {
        Some(limiter) => {
            tracing::info!(rps, "rate limiting enabled");
            router = router.layer(axum_middleware::from_fn_with_state(
                limiter,
                middleware::rate_limit_middleware,
            ));
        }
        None => tracing::info!("rate limiting disabled"),
    }

    let cors = cors_layer(std::env::var("CLAIMGRAPH_CORS_ORIGINS").ok().as_deref());
    router
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Serve on `addr` until Ctrl+C, letting in-flight requests finish.
pub async fn run_server(addr: &str, state: AppState) -> Result<(), ClaimGraphError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ClaimGraphError::IoError(format!("cannot bind {}: {}", addr, e)))?;
    tracing::info!(%addr, "claimgraph HTTP server listening");

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("shutdown requested"),
            Err(e) => tracing::error!(error = %e, "cannot listen for Ctrl+C"),
        }
    };
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ClaimGraphError::IoError(format!("server stopped: {}", e)))
}

// =============================================================================
// TESTS
// =============================================================================
