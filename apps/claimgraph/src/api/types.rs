//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API.
//!
//! Core records (`FrontierTask`, `SourceDocument`, `ResolvedField`,
//! `IdentityMatch`, ...) are serialized as-is; the types here only wrap them
//! or describe request bodies.

use claimgraph_core::{
    BreakerConfig, Entity, FrontierTask, GraphStats, IngestReport, LinkSource, Metadata, NewClaim,
    ResolvedField, RetryPolicy, TaskKind, TaskStatus,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// STATUS RESPONSE
// =============================================================================

/// Graph row counts plus the effective resilience settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub entities: u64,
    pub aliases: u64,
    pub edges: u64,
    pub evidence: u64,
    pub retry: RetryPolicy,
    pub breaker: BreakerConfig,
}

impl StatusResponse {
    pub fn new(stats: GraphStats, retry: RetryPolicy, breaker: BreakerConfig) -> Self {
        Self {
            entities: stats.entities,
            aliases: stats.aliases,
            edges: stats.edges,
            evidence: stats.evidence,
            retry,
            breaker,
        }
    }
}

// =============================================================================
// ERROR RESPONSE
// =============================================================================

/// Body of every non-2xx response produced by a handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// =============================================================================
// FRONTIER
// =============================================================================

/// `POST /frontier/tasks`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddTaskRequest {
    pub job_id: String,
    pub kind: TaskKind,
    pub value: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub depth: u32,
    #[serde(default)]
    pub meta: Metadata,
}

/// `task` is `None` when the (job, kind, value) triple was already queued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddTaskResponse {
    pub created: bool,
    pub task: Option<FrontierTask>,
}

/// `POST /frontier/next`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextTaskRequest {
    pub job_id: String,
}

/// `POST /frontier/next_batch`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextBatchRequest {
    pub job_id: String,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResponse {
    pub task: Option<FrontierTask>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksResponse {
    pub tasks: Vec<FrontierTask>,
}

/// `POST /frontier/complete`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteTaskRequest {
    pub task_id: u64,
    pub status: TaskStatus,
}

/// `POST /frontier/reclaim`. Falls back to the configured stale age.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReclaimRequest {
    #[serde(default)]
    pub older_than_secs: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReclaimResponse {
    pub reclaimed: usize,
}

// =============================================================================
// CLAIMS
// =============================================================================

/// `POST /claims`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestClaimsRequest {
    pub item_id: String,
    #[serde(default)]
    pub source_document_id: Option<u64>,
    pub claims: Vec<NewClaim>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestClaimsResponse {
    pub inserted: Vec<u64>,
    pub duplicates: usize,
}

impl From<IngestReport> for IngestClaimsResponse {
    fn from(report: IngestReport) -> Self {
        Self {
            inserted: report.inserted.into_iter().map(|id| id.0).collect(),
            duplicates: report.duplicates,
        }
    }
}

/// `POST /resolve/field`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveFieldRequest {
    pub item_id: String,
    pub field: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveFieldResponse {
    pub resolved: Option<ResolvedField>,
}

/// `POST /resolve/item`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveItemRequest {
    pub item_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveItemResponse {
    pub item_id: String,
    pub fields: BTreeMap<String, ResolvedField>,
}

// =============================================================================
// IDENTITY
// =============================================================================

/// `POST /identity/resolve`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveIdentityRequest {
    pub query: String,
    #[serde(default)]
    pub brand: Option<String>,
}

/// `POST /identity/compatibility`. With `printer` set, checks one pair;
/// without it, lists every compatible entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatibilityRequest {
    pub consumable: String,
    #[serde(default)]
    pub printer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatibilityResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compatible: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<Entity>>,
}

/// `POST /identity/link`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkAliasRequest {
    pub alias: String,
    pub canonical_name: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default = "default_link_source")]
    pub source: LinkSource,
}

fn default_link_source() -> LinkSource {
    LinkSource::Explicit
}

// =============================================================================
// GRAPH POPULATION
// =============================================================================

/// `POST /graph/populate`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulateRequest {
    pub item_id: String,
    pub job_id: String,
    pub item: claimgraph_core::ResolvedItem,
}
