//! Integration tests for the claimgraph HTTP API.
//!
//! Uses axum-test to test the API handlers without starting a real server.

// Allow holding MutexGuard across await in auth tests - tests are serialized
// intentionally to avoid env var conflicts
#![allow(clippy::unwrap_used, clippy::panic, clippy::await_holding_lock)]

use axum::http::{HeaderValue, StatusCode, header};
use axum_test::TestServer;
use claimgraph::api::{
    AddTaskResponse, AppState, CompatibilityResponse, ErrorResponse, HealthResponse,
    IngestClaimsResponse, ReclaimResponse, ResolveFieldResponse, ResolveItemResponse,
    StatusResponse, TaskResponse, TasksResponse, create_router,
};
use claimgraph::config::AppConfig;
use claimgraph_core::{
    FrontierStats, FrontierTask, IdentityMatch, LinkOutcome, PopulateReport, ResolutionMethod,
    SourceDocument, Store, TaskStatus,
};
use serde_json::json;
use std::sync::Mutex;
use tempfile::TempDir;

/// Mutex to serialize tests since they modify env vars.
static ENV_TEST_MUTEX: Mutex<()> = Mutex::new(());

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Holds the env mutex and the temp database for the duration of a test.
struct TestGuard {
    _guard: std::sync::MutexGuard<'static, ()>,
    _temp: TempDir,
}

impl Drop for TestGuard {
    fn drop(&mut self) {
        // SAFETY: Tests run sequentially under ENV_TEST_MUTEX, so no concurrent env access.
        unsafe {
            std::env::remove_var("CLAIMGRAPH_API_KEY");
            std::env::remove_var("CLAIMGRAPH_READ_API_KEY");
            std::env::remove_var("CLAIMGRAPH_RATE_LIMIT");
        }
    }
}

fn server_with_env(api_key: Option<&str>) -> (TestServer, TestGuard) {
    server_with_keys(api_key, None)
}

fn server_with_keys(api_key: Option<&str>, read_key: Option<&str>) -> (TestServer, TestGuard) {
    let guard = ENV_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    // SAFETY: Tests run sequentially under ENV_TEST_MUTEX, so no concurrent env access.
    unsafe {
        for (var, value) in [
            ("CLAIMGRAPH_API_KEY", api_key),
            ("CLAIMGRAPH_READ_API_KEY", read_key),
        ] {
            match value {
                Some(key) => std::env::set_var(var, key),
                None => std::env::remove_var(var),
            }
        }
        std::env::set_var("CLAIMGRAPH_RATE_LIMIT", "0");
    }
    let temp = tempfile::tempdir().unwrap();
    let store = Store::open(temp.path().join("api.redb")).unwrap();
    let router = create_router(AppState::new(store, AppConfig::default()));
    (
        TestServer::new(router).unwrap(),
        TestGuard {
            _guard: guard,
            _temp: temp,
        },
    )
}

fn create_test_server() -> (TestServer, TestGuard) {
    server_with_env(None)
}

async fn populate_ce285a(server: &TestServer) -> PopulateReport {
    let response = server
        .post("/graph/populate")
        .json(&json!({
            "item_id": "item-1",
            "job_id": "job-1",
            "item": {
                "primary_id": "CE285A",
                "canonical_name": "HP 85A Black Toner",
                "brand": "HP",
                "compatible_devices": ["LaserJet P1102", "LaserJet M1132"],
                "cross_references": ["Canon 725"],
                "evidence": [
                    {"url": "https://support.hp.com/ce285a", "snippet": "85A fits P1102", "confidence": 95}
                ]
            }
        }))
        .await;
    response.assert_status_ok();
    response.json()
}

// =============================================================================
// HEALTH / STATUS
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (server, _guard) = create_test_server();

    let response = server.get("/health").await;

    response.assert_status_ok();
    let health: HealthResponse = response.json();
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_status_empty_graph() {
    let (server, _guard) = create_test_server();

    let response = server.get("/status").await;

    response.assert_status_ok();
    let status: StatusResponse = response.json();
    assert_eq!(status.entities, 0);
    assert_eq!(status.edges, 0);
    assert_eq!(status.retry.max_attempts, 4);
}

#[tokio::test]
async fn test_status_after_populate() {
    let (server, _guard) = create_test_server();
    populate_ce285a(&server).await;

    let status: StatusResponse = server.get("/status").await.json();
    assert_eq!(status.entities, 4);
    assert_eq!(status.edges, 3);
    assert!(status.evidence > 0);
}

// =============================================================================
// FRONTIER
// =============================================================================

#[tokio::test]
async fn test_frontier_add_is_idempotent() {
    let (server, _guard) = create_test_server();
    let body = json!({"job_id": "job-1", "kind": "query", "value": "ce285a toner"});

    let first: AddTaskResponse = server.post("/frontier/tasks").json(&body).await.json();
    let second: AddTaskResponse = server.post("/frontier/tasks").json(&body).await.json();

    assert!(first.created);
    assert!(first.task.is_some());
    assert!(!second.created);
    assert!(second.task.is_none());
}

#[tokio::test]
async fn test_frontier_next_respects_priority() {
    let (server, _guard) = create_test_server();
    for (value, priority) in [("low", 0), ("high", 10), ("mid", 5)] {
        server
            .post("/frontier/tasks")
            .json(&json!({"job_id": "job-1", "kind": "url", "value": value, "priority": priority}))
            .await
            .assert_status_ok();
    }

    let next: TaskResponse = server
        .post("/frontier/next")
        .json(&json!({"job_id": "job-1"}))
        .await
        .json();
    let task = next.task.unwrap();
    assert_eq!(task.value, "high");
    assert_eq!(task.status, TaskStatus::Processing);

    let batch: TasksResponse = server
        .post("/frontier/next_batch")
        .json(&json!({"job_id": "job-1", "limit": 10}))
        .await
        .json();
    let values: Vec<&str> = batch.tasks.iter().map(|t| t.value.as_str()).collect();
    assert_eq!(values, ["mid", "low"]);

    let empty: TaskResponse = server
        .post("/frontier/next")
        .json(&json!({"job_id": "job-1"}))
        .await
        .json();
    assert!(empty.task.is_none());
}

#[tokio::test]
async fn test_frontier_complete_and_stats() {
    let (server, _guard) = create_test_server();
    server
        .post("/frontier/tasks")
        .json(&json!({"job_id": "job-1", "kind": "query", "value": "ce285a"}))
        .await
        .assert_status_ok();
    let task = server
        .post("/frontier/next")
        .json(&json!({"job_id": "job-1"}))
        .await
        .json::<TaskResponse>()
        .task
        .unwrap();

    let done: FrontierTask = server
        .post("/frontier/complete")
        .json(&json!({"task_id": task.id, "status": "completed"}))
        .await
        .json();
    assert_eq!(done.status, TaskStatus::Completed);

    let stats: FrontierStats = server.get("/frontier/stats/job-1").await.json();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.total, 1);
}

#[tokio::test]
async fn test_frontier_conflicting_completion_is_409() {
    let (server, _guard) = create_test_server();
    server
        .post("/frontier/tasks")
        .json(&json!({"job_id": "job-1", "kind": "query", "value": "ce285a"}))
        .await
        .assert_status_ok();
    let task = server
        .post("/frontier/next")
        .json(&json!({"job_id": "job-1"}))
        .await
        .json::<TaskResponse>()
        .task
        .unwrap();

    server
        .post("/frontier/complete")
        .json(&json!({"task_id": task.id, "status": "failed"}))
        .await
        .assert_status_ok();
    let response = server
        .post("/frontier/complete")
        .json(&json!({"task_id": task.id, "status": "completed"}))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    let error: ErrorResponse = response.json();
    assert!(error.error.contains("transition"));
}

#[tokio::test]
async fn test_frontier_unknown_task_is_404() {
    let (server, _guard) = create_test_server();
    let response = server
        .post("/frontier/complete")
        .json(&json!({"task_id": 999, "status": "completed"}))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_frontier_blank_value_is_400() {
    let (server, _guard) = create_test_server();
    let response = server
        .post("/frontier/tasks")
        .json(&json!({"job_id": "job-1", "kind": "query", "value": "  "}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_frontier_reclaim_without_stale_tasks() {
    let (server, _guard) = create_test_server();
    server
        .post("/frontier/tasks")
        .json(&json!({"job_id": "job-1", "kind": "query", "value": "ce285a"}))
        .await
        .assert_status_ok();
    server
        .post("/frontier/next")
        .json(&json!({"job_id": "job-1"}))
        .await
        .assert_status_ok();

    let fresh: ReclaimResponse = server.post("/frontier/reclaim").json(&json!({})).await.json();
    assert_eq!(fresh.reclaimed, 0);

    let all: ReclaimResponse = server
        .post("/frontier/reclaim")
        .json(&json!({"older_than_secs": 0}))
        .await
        .json();
    assert_eq!(all.reclaimed, 1);

    server
        .post("/frontier/reclaim")
        .json(&json!({"older_than_secs": -5}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

// =============================================================================
// SOURCES / CLAIMS / RESOLUTION
// =============================================================================

#[tokio::test]
async fn test_claims_resolve_worked_example() {
    let (server, _guard) = create_test_server();

    let doc: SourceDocument = server
        .post("/sources")
        .json(&json!({
            "job_id": "job-1",
            "url": "https://www.nix.ru/ce285a",
            "raw_content": "Ресурс: 10200 pages"
        }))
        .await
        .json();
    assert_eq!(doc.domain, "nix.ru");

    let retailer: IngestClaimsResponse = server
        .post("/claims")
        .json(&json!({
            "item_id": "ce285a",
            "source_document_id": doc.id,
            "claims": [{"field": "yield", "value": {"text": "10200 pages"}, "source_kind": "scrape"}]
        }))
        .await
        .json();
    assert_eq!(retailer.inserted.len(), 1);

    server
        .post("/claims")
        .json(&json!({
            "item_id": "ce285a",
            "claims": [{
                "field": "yield",
                "value": {"text": "15000 pages"},
                "source_domain": "random-blog.com",
                "source_kind": "agent"
            }]
        }))
        .await
        .assert_status_ok();

    let field: ResolveFieldResponse = server
        .post("/resolve/field")
        .json(&json!({"item_id": "ce285a", "field": "yield"}))
        .await
        .json();
    let resolved = field.resolved.unwrap();
    assert_eq!(resolved.normalized, "10200 pages");
    assert_eq!(resolved.method, ResolutionMethod::SingleSource);
    assert!(resolved.is_conflict);
    assert_eq!(resolved.confidence.percent(), 40);

    let item: ResolveItemResponse = server
        .post("/resolve/item")
        .json(&json!({"item_id": "ce285a"}))
        .await
        .json();
    assert_eq!(item.fields.len(), 1);
    assert!(item.fields.contains_key("yield"));
}

#[tokio::test]
async fn test_claims_replay_counts_duplicates() {
    let (server, _guard) = create_test_server();
    let body = json!({
        "item_id": "ce285a",
        "claims": [{
            "field": "color",
            "value": {"text": "Black"},
            "source_domain": "ozon.ru",
            "source_kind": "scrape"
        }]
    });

    server.post("/claims").json(&body).await.assert_status_ok();
    let replay: IngestClaimsResponse = server.post("/claims").json(&body).await.json();
    assert!(replay.inserted.is_empty());
    assert_eq!(replay.duplicates, 1);
}

#[tokio::test]
async fn test_claims_unknown_document_is_404() {
    let (server, _guard) = create_test_server();
    let response = server
        .post("/claims")
        .json(&json!({
            "item_id": "ce285a",
            "source_document_id": 42,
            "claims": [{"field": "yield", "value": {"text": "1600"}, "source_kind": "scrape"}]
        }))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_resolve_field_without_claims_is_null() {
    let (server, _guard) = create_test_server();
    let field: ResolveFieldResponse = server
        .post("/resolve/field")
        .json(&json!({"item_id": "ce285a", "field": "yield"}))
        .await
        .json();
    assert!(field.resolved.is_none());
}

// =============================================================================
// IDENTITY GRAPH
// =============================================================================

#[tokio::test]
async fn test_identity_resolve_after_populate() {
    let (server, _guard) = create_test_server();
    let report = populate_ce285a(&server).await;
    assert_eq!(report.entities_created, 4);

    let found: Option<IdentityMatch> = server
        .post("/identity/resolve")
        .json(&json!({"query": "Canon 725"}))
        .await
        .json();
    assert_eq!(found.unwrap().entity.id, report.entity_id);

    let missing: Option<IdentityMatch> = server
        .post("/identity/resolve")
        .json(&json!({"query": "TN-2420"}))
        .await
        .json();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_identity_compatibility_pair_and_list() {
    let (server, _guard) = create_test_server();
    populate_ce285a(&server).await;

    let pair: CompatibilityResponse = server
        .post("/identity/compatibility")
        .json(&json!({"consumable": "CE285A", "printer": "LaserJet P1102"}))
        .await
        .json();
    assert_eq!(pair.compatible, Some(true));

    let list: CompatibilityResponse = server
        .post("/identity/compatibility")
        .json(&json!({"consumable": "CE285A"}))
        .await
        .json();
    assert_eq!(list.entities.unwrap().len(), 2);
}

#[tokio::test]
async fn test_identity_link_is_idempotent() {
    let (server, _guard) = create_test_server();
    let body = json!({"alias": "85A", "canonical_name": "CE285A", "brand": "HP"});

    let first: LinkOutcome = server.post("/identity/link").json(&body).await.json();
    let second: LinkOutcome = server.post("/identity/link").json(&body).await.json();

    assert!(first.entity_created);
    assert!(first.alias_created);
    assert!(!second.entity_created);
    assert!(!second.alias_created);
    assert_eq!(first.entity.id, second.entity.id);
}

#[tokio::test]
async fn test_populate_blank_primary_id_is_400() {
    let (server, _guard) = create_test_server();
    let response = server
        .post("/graph/populate")
        .json(&json!({"item_id": "item-1", "job_id": "job-1", "item": {"primary_id": "  "}}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

// =============================================================================
// AUTHENTICATION
// =============================================================================

#[tokio::test]
async fn test_auth_required_when_key_set() {
    let (server, _guard) = server_with_env(Some("s3cret"));

    server.get("/status").await.assert_status(StatusCode::UNAUTHORIZED);
    server
        .get("/status")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer wrong"))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    server
        .get("/status")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer s3cret"))
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_health_bypasses_auth() {
    let (server, _guard) = server_with_env(Some("s3cret"));
    server.get("/health").await.assert_status_ok();
}

#[tokio::test]
async fn test_rejections_are_json_errors() {
    let (server, _guard) = server_with_env(Some("s3cret"));

    let response = server.get("/status").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(response.header(header::WWW_AUTHENTICATE), "Bearer");
    let body: ErrorResponse = response.json();
    assert!(body.error.starts_with("Unauthorized"));

    // A raw key without the Bearer scheme is not a credential.
    let response = server
        .post("/frontier/tasks")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("s3cret"))
        .json(&json!({"job_id": "job-1", "kind": "domain_crawl", "value": "nix.ru"}))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: ErrorResponse = response.json();
    assert!(!body.error.is_empty());
}

#[tokio::test]
async fn test_read_key_queries_but_cannot_mutate() {
    let (server, _guard) = server_with_keys(Some("w-key"), Some("r-key"));
    let read = HeaderValue::from_static("Bearer r-key");
    let write = HeaderValue::from_static("Bearer w-key");

    server
        .get("/status")
        .add_header(header::AUTHORIZATION, read.clone())
        .await
        .assert_status_ok();
    server
        .post("/identity/resolve")
        .add_header(header::AUTHORIZATION, read.clone())
        .json(&json!({"query": "CE285A"}))
        .await
        .assert_status_ok();

    let response = server
        .post("/identity/link")
        .add_header(header::AUTHORIZATION, read.clone())
        .json(&json!({"alias": "85A", "canonical_name": "CE285A"}))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    let body: ErrorResponse = response.json();
    assert!(body.error.starts_with("Forbidden"));

    server
        .post("/identity/link")
        .add_header(header::AUTHORIZATION, write)
        .json(&json!({"alias": "85A", "canonical_name": "CE285A"}))
        .await
        .assert_status_ok();
    let found: Option<IdentityMatch> = server
        .post("/identity/resolve")
        .add_header(header::AUTHORIZATION, read)
        .json(&json!({"query": "85A"}))
        .await
        .json();
    assert!(found.is_some());
}

#[tokio::test]
async fn test_read_key_alone_leaves_api_open() {
    let (server, _guard) = server_with_keys(None, Some("r-key"));
    server.get("/status").await.assert_status_ok();
}
