//! # claimgraph-core
//!
//! Claim resolution and identity graph for catalog enrichment - THE LOGIC.
//!
//! Untrusted web sources make conflicting statements about the same product
//! field. This crate records those statements, arbitrates between them with a
//! domain-trust policy, and maintains a graph of canonical entities with the
//! aliases and relations discovered along the way.
//!
//! ## Components
//!
//! - [`Frontier`]: per-job prioritized work queue with exactly-once claiming
//! - [`SourceStore`] / [`ClaimStore`]: append-only evidence ledger
//! - [`TrustEngine`]: picks one value per field and flags conflicts
//! - [`GraphService`] / [`GraphPopulator`]: identity lookup and idempotent
//!   graph upserts
//! - [`resilience`]: retry with backoff and circuit breakers for calls into
//!   external fetch and extraction capabilities
//!
//! ## Architectural Constraints
//!
//! - NO async, NO network dependencies (pure Rust)
//! - NO floating point in scoring: confidences are integer percentages
//! - `BTreeMap` only, so iteration order is stable
//! - One embedded redb file holds every table; all state lives in [`Store`]

// =============================================================================
// MODULES
// =============================================================================

pub mod claims;
pub mod frontier;
pub mod graph;
pub mod normalize;
pub mod primitives;
pub mod resilience;
pub mod sources;
pub mod storage;
pub mod trust;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Alias, AliasId, AliasKind, ClaimGraphError, ClaimId, Confidence, Edge, EdgeId, EdgeKind,
    Entity, EntityId, EntityKind, EvidenceId, EvidenceTarget, FieldValue, GraphEvidence, Metadata,
    Notes, SourceId, TaskId,
};

// =============================================================================
// RE-EXPORTS: Stores and Engines
// =============================================================================

pub use claims::{Claim, ClaimStore, IngestReport, NewClaim, SourceKind};
pub use frontier::{Frontier, FrontierStats, FrontierTask, NewTask, TaskKind, TaskStatus};
pub use graph::{
    EvidenceSource, GraphPopulator, GraphService, GraphStats, IdentityMatch, LinkOutcome,
    LinkSource, MatchKind, PopulateReport, ResolvedItem,
};
pub use sources::{DocumentStatus, NewSourceDocument, SourceDocument, SourceStore, content_hash};
pub use storage::Store;
pub use trust::{
    CandidateScore, Disposition, ResolutionMethod, ResolvedField, SourceContribution,
    SourcePredicate, TrustEngine, TrustPolicy, TrustRule, TrustTier,
};

// =============================================================================
// RE-EXPORTS: Resilience
// =============================================================================

pub use resilience::{
    BreakerConfig, BreakerError, BreakerRegistry, BreakerState, CircuitBreaker, Clock,
    RetryPolicy, Retrier, RetryableError, SystemClock, UpstreamError, parse_retry_after,
};
