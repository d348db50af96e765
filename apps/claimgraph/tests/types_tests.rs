//! Unit tests for API types serialization/deserialization.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use claimgraph::api::{
    AddTaskRequest, CompatibilityRequest, CompatibilityResponse, ErrorResponse, HealthResponse,
    IngestClaimsRequest, IngestClaimsResponse, LinkAliasRequest, ReclaimRequest, StatusResponse,
};
use claimgraph_core::{
    BreakerConfig, ClaimId, FieldValue, GraphStats, IngestReport, LinkSource, RetryPolicy,
    SourceKind, TaskKind,
};

// =============================================================================
// HEALTH / STATUS
// =============================================================================

#[test]
fn test_health_response_default() {
    let health = HealthResponse::default();
    assert_eq!(health.status, "ok");
    assert!(!health.version.is_empty());
}

#[test]
fn test_status_response_carries_resilience_settings() {
    let stats = GraphStats {
        entities: 4,
        aliases: 7,
        edges: 3,
        evidence: 9,
    };
    let status = StatusResponse::new(stats, RetryPolicy::default(), BreakerConfig::default());

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["entities"], 4);
    assert_eq!(json["edges"], 3);
    assert_eq!(json["retry"]["max_attempts"], 4);
    assert_eq!(json["breaker"]["failure_threshold"], 5);
}

#[test]
fn test_error_response_serialization() {
    let error = ErrorResponse {
        error: "Not found: task 7".to_string(),
    };
    let json = serde_json::to_string(&error).unwrap();
    assert_eq!(json, r#"{"error":"Not found: task 7"}"#);
}

// =============================================================================
// FRONTIER
// =============================================================================

#[test]
fn test_add_task_request_defaults() {
    let json = r#"{"job_id":"job-1","kind":"domain_crawl","value":"nix.ru"}"#;
    let request: AddTaskRequest = serde_json::from_str(json).unwrap();

    assert_eq!(request.kind, TaskKind::DomainCrawl);
    assert_eq!(request.priority, 0);
    assert_eq!(request.depth, 0);
    assert!(request.meta.is_empty());
}

#[test]
fn test_add_task_request_rejects_unknown_kind() {
    let json = r#"{"job_id":"job-1","kind":"teleport","value":"x"}"#;
    assert!(serde_json::from_str::<AddTaskRequest>(json).is_err());
}

#[test]
fn test_reclaim_request_accepts_empty_body() {
    let request: ReclaimRequest = serde_json::from_str("{}").unwrap();
    assert!(request.older_than_secs.is_none());
}

// =============================================================================
// CLAIMS
// =============================================================================

#[test]
fn test_ingest_claims_request_externally_tagged_values() {
    let json = r#"{
        "item_id": "ce285a",
        "claims": [
            {"field": "yield", "value": {"text": "1600 pages"}, "source_kind": "scrape", "source_domain": "hp.com"},
            {"field": "weight_kg", "value": {"number": 0.7}, "source_kind": "manual", "source_domain": "hp.com"},
            {"field": "oem", "value": {"bool": true}, "source_kind": "agent", "source_domain": "hp.com", "confidence": 80}
        ]
    }"#;
    let request: IngestClaimsRequest = serde_json::from_str(json).unwrap();

    assert!(request.source_document_id.is_none());
    assert_eq!(request.claims.len(), 3);
    assert_eq!(request.claims[0].value, FieldValue::text("1600 pages"));
    assert!(matches!(request.claims[1].value, FieldValue::Number(_)));
    assert_eq!(request.claims[2].source_kind, SourceKind::Agent);
    assert_eq!(request.claims[2].confidence, Some(80));
}

#[test]
fn test_ingest_claims_response_from_report() {
    let report = IngestReport {
        inserted: vec![ClaimId(3), ClaimId(4)],
        duplicates: 2,
    };
    let response = IngestClaimsResponse::from(report);
    assert_eq!(response.inserted, vec![3, 4]);
    assert_eq!(response.duplicates, 2);
}

// =============================================================================
// IDENTITY
// =============================================================================

#[test]
fn test_link_alias_request_default_source() {
    let json = r#"{"alias":"85A","canonical_name":"CE285A"}"#;
    let request: LinkAliasRequest = serde_json::from_str(json).unwrap();
    assert_eq!(request.source, LinkSource::Explicit);
    assert!(request.brand.is_none());

    let json = r#"{"alias":"85A","canonical_name":"CE285A","source":"inferred"}"#;
    let request: LinkAliasRequest = serde_json::from_str(json).unwrap();
    assert_eq!(request.source, LinkSource::Inferred);
}

#[test]
fn test_compatibility_request_printer_optional() {
    let request: CompatibilityRequest =
        serde_json::from_str(r#"{"consumable":"CE285A"}"#).unwrap();
    assert!(request.printer.is_none());
}

#[test]
fn test_compatibility_response_skips_absent_fields() {
    let pair = CompatibilityResponse {
        compatible: Some(false),
        entities: None,
    };
    assert_eq!(
        serde_json::to_string(&pair).unwrap(),
        r#"{"compatible":false}"#
    );

    let list = CompatibilityResponse {
        compatible: None,
        entities: Some(vec![]),
    };
    assert_eq!(serde_json::to_string(&list).unwrap(), r#"{"entities":[]}"#);
}
