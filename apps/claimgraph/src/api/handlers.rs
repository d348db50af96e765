//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers.
//!
//! Core operations are synchronous redb transactions, so every handler runs
//! its work on the blocking pool.

use super::{
    AppState,
    types::{
        AddTaskRequest, AddTaskResponse, CompatibilityRequest, CompatibilityResponse,
        CompleteTaskRequest, ErrorResponse, HealthResponse, IngestClaimsRequest,
        IngestClaimsResponse, LinkAliasRequest, NextBatchRequest, NextTaskRequest,
        PopulateRequest, ReclaimRequest, ReclaimResponse, ResolveFieldRequest,
        ResolveFieldResponse, ResolveIdentityRequest, ResolveItemRequest, ResolveItemResponse,
        StatusResponse, TaskResponse, TasksResponse,
    },
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use claimgraph_core::{
    ClaimGraphError, FrontierStats, FrontierTask, IdentityMatch, LinkOutcome, NewSourceDocument,
    NewTask, PopulateReport, SourceDocument, SourceId, TaskId,
};

// =============================================================================
// ERROR MAPPING
// =============================================================================

/// A core error on its way to becoming an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub ClaimGraphError);

impl From<ClaimGraphError> for ApiError {
    fn from(e: ClaimGraphError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ClaimGraphError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ClaimGraphError::NotFound(_) => StatusCode::NOT_FOUND,
            ClaimGraphError::InvalidTransition { .. } => StatusCode::CONFLICT,
            ClaimGraphError::Uninitialized(_)
            | ClaimGraphError::Storage(_)
            | ClaimGraphError::SerializationError(_)
            | ClaimGraphError::DeserializationError(_)
            | ClaimGraphError::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Run a synchronous core call on the blocking pool.
async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> Result<T, ClaimGraphError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map(Json).map_err(ApiError),
        Err(e) => Err(ApiError(ClaimGraphError::IoError(format!(
            "worker task failed: {}",
            e
        )))),
    }
}

// =============================================================================
// HEALTH / STATUS
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Graph row counts.
pub async fn status_handler(State(state): State<AppState>) -> ApiResult<StatusResponse> {
    let graph = state.graph.clone();
    let (retry, breaker) = (state.config.retry, state.config.breaker);
    blocking(move || Ok(StatusResponse::new(graph.stats()?, retry, breaker))).await
}

// =============================================================================
// FRONTIER
// =============================================================================

pub async fn add_task_handler(
    State(state): State<AppState>,
    Json(request): Json<AddTaskRequest>,
) -> ApiResult<AddTaskResponse> {
    let task = NewTask::new(request.job_id, request.kind, request.value)
        .priority(request.priority)
        .depth(request.depth)
        .meta(request.meta);
    blocking(move || {
        let task = state.frontier.add(task)?;
        Ok(AddTaskResponse {
            created: task.is_some(),
            task,
        })
    })
    .await
}

pub async fn next_task_handler(
    State(state): State<AppState>,
    Json(request): Json<NextTaskRequest>,
) -> ApiResult<TaskResponse> {
    blocking(move || {
        Ok(TaskResponse {
            task: state.frontier.next(&request.job_id)?,
        })
    })
    .await
}

pub async fn next_batch_handler(
    State(state): State<AppState>,
    Json(request): Json<NextBatchRequest>,
) -> ApiResult<TasksResponse> {
    blocking(move || {
        Ok(TasksResponse {
            tasks: state.frontier.next_batch(&request.job_id, request.limit)?,
        })
    })
    .await
}

pub async fn complete_task_handler(
    State(state): State<AppState>,
    Json(request): Json<CompleteTaskRequest>,
) -> ApiResult<FrontierTask> {
    blocking(move || {
        state
            .frontier
            .complete(TaskId(request.task_id), request.status)
    })
    .await
}

pub async fn frontier_stats_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<FrontierStats> {
    blocking(move || state.frontier.stats(&job_id)).await
}

pub async fn reclaim_handler(
    State(state): State<AppState>,
    Json(request): Json<ReclaimRequest>,
) -> ApiResult<ReclaimResponse> {
    let older_than = match request.older_than_secs {
        Some(secs) if secs < 0 => {
            return Err(ApiError(ClaimGraphError::InvalidInput(
                "older_than_secs must not be negative".to_string(),
            )));
        }
        Some(secs) => chrono::Duration::seconds(secs),
        None => state.config.frontier.stale_after(),
    };
    blocking(move || {
        Ok(ReclaimResponse {
            reclaimed: state.frontier.reclaim_stale(older_than)?,
        })
    })
    .await
}

// =============================================================================
// SOURCES / CLAIMS
// =============================================================================

pub async fn record_source_handler(
    State(state): State<AppState>,
    Json(request): Json<NewSourceDocument>,
) -> ApiResult<SourceDocument> {
    blocking(move || state.sources.record(request)).await
}

pub async fn ingest_claims_handler(
    State(state): State<AppState>,
    Json(request): Json<IngestClaimsRequest>,
) -> ApiResult<IngestClaimsResponse> {
    blocking(move || {
        let report = state.claims.ingest(
            &request.item_id,
            request.source_document_id.map(SourceId),
            request.claims,
        )?;
        Ok(report.into())
    })
    .await
}

pub async fn resolve_field_handler(
    State(state): State<AppState>,
    Json(request): Json<ResolveFieldRequest>,
) -> ApiResult<ResolveFieldResponse> {
    blocking(move || {
        Ok(ResolveFieldResponse {
            resolved: state
                .claims
                .resolve(&state.trust, &request.item_id, &request.field)?,
        })
    })
    .await
}

pub async fn resolve_item_handler(
    State(state): State<AppState>,
    Json(request): Json<ResolveItemRequest>,
) -> ApiResult<ResolveItemResponse> {
    blocking(move || {
        let fields = state.claims.resolve_item(&state.trust, &request.item_id)?;
        Ok(ResolveItemResponse {
            item_id: request.item_id,
            fields,
        })
    })
    .await
}

// =============================================================================
// IDENTITY GRAPH
// =============================================================================

/// Returns `null` when nothing matches.
pub async fn resolve_identity_handler(
    State(state): State<AppState>,
    Json(request): Json<ResolveIdentityRequest>,
) -> ApiResult<Option<IdentityMatch>> {
    blocking(move || {
        state
            .graph
            .resolve_identity(&request.query, request.brand.as_deref())
    })
    .await
}

pub async fn compatibility_handler(
    State(state): State<AppState>,
    Json(request): Json<CompatibilityRequest>,
) -> ApiResult<CompatibilityResponse> {
    blocking(move || match request.printer {
        Some(printer) => Ok(CompatibilityResponse {
            compatible: Some(
                state
                    .graph
                    .check_compatibility(&request.consumable, &printer)?,
            ),
            entities: None,
        }),
        None => Ok(CompatibilityResponse {
            compatible: None,
            entities: Some(state.graph.compatible_with(&request.consumable)?),
        }),
    })
    .await
}

pub async fn link_alias_handler(
    State(state): State<AppState>,
    Json(request): Json<LinkAliasRequest>,
) -> ApiResult<LinkOutcome> {
    blocking(move || {
        state.graph.link_alias(
            &request.alias,
            &request.canonical_name,
            request.brand.as_deref(),
            request.source,
        )
    })
    .await
}

pub async fn populate_handler(
    State(state): State<AppState>,
    Json(request): Json<PopulateRequest>,
) -> ApiResult<PopulateReport> {
    blocking(move || {
        state
            .populator
            .populate_from_research(&request.item_id, &request.item, &request.job_id)
    })
    .await
}
