//! # Primitives
//!
//! Compiled-in defaults and limits for the claimgraph core.
//!
//! Trust thresholds here are defaults only; [`crate::trust::TrustPolicy`]
//! carries the values actually used at runtime so deployments can tune them.

// =============================================================================
// TRUST SCORES
// =============================================================================

/// Score for a claim sourced from the manufacturer's own domain.
pub const OFFICIAL_SCORE: u32 = 100;

/// Score for a claim from a whitelisted retailer.
pub const TRUSTED_RETAILER_SCORE: u32 = 90;

/// Score for an agent-produced claim on an otherwise unclassified domain.
pub const AGENT_SCORE: u32 = 75;

/// Score for any domain no rule matches.
pub const DEFAULT_SCORE: u32 = 50;

/// Runner-up / winner ratio (percent) at or above which a field is conflicted.
pub const CONFLICT_RATIO_PERCENT: u32 = 70;

/// Confidence a conflicted, sub-consensus result is clamped to.
pub const CONFLICT_CLAMP_PERCENT: u8 = 40;

/// Group score at which an agent-backed winner is trusted outright.
pub const AGENT_TRUST_CUTOFF: u32 = 90;

/// Minimum confidence for a non-conflicted field to auto-publish.
pub const AUTO_PUBLISH_PERCENT: u8 = 80;

// =============================================================================
// RESOLUTION CONFIDENCES
// =============================================================================

/// An official source backs the winning value.
pub const OFFICIAL_CONFIDENCE: u8 = 100;

/// An agent claim backs a winner scoring at or above the agent cutoff.
pub const AGENT_RESULT_CONFIDENCE: u8 = 95;

/// Three or more distinct domains agree.
pub const BROAD_CONSENSUS_CONFIDENCE: u8 = 90;

/// Exactly two distinct domains agree.
pub const CONSENSUS_CONFIDENCE: u8 = 80;

/// One domain backs the winner.
pub const SINGLE_SOURCE_CONFIDENCE: u8 = 50;

/// Ceiling for an agent-backed winner below the agent cutoff.
pub const AGENT_CAP_CONFIDENCE: u8 = 75;

/// Ceiling for a conflicted agent-backed winner below the agent cutoff.
pub const AGENT_CONFLICT_CAP_CONFIDENCE: u8 = 50;

// =============================================================================
// GRAPH
// =============================================================================

/// Locale used when an alias carries no locale of its own.
pub const DEFAULT_LOCALE: &str = "und";

/// Penalty applied to identity hits found only by case-insensitive match.
pub const CASE_FOLD_PENALTY: u8 = 5;

/// Alias confidence for exact-type identifiers (MPN, cross-reference, barcode).
pub const EXACT_ALIAS_CONFIDENCE: u8 = 100;

/// Alias confidence for free-form or inferred identifiers.
pub const WEAK_ALIAS_CONFIDENCE: u8 = 80;

/// Alias confidence for an explicit `link_alias` call.
pub const EXPLICIT_LINK_CONFIDENCE: u8 = 100;

/// Alias confidence for an inferred `link_alias` call.
pub const INFERRED_LINK_CONFIDENCE: u8 = 90;

/// Number of supporting documents attached as evidence per populated item.
pub const MAX_EVIDENCE_PER_ITEM: usize = 3;

/// Maximum snippet length stored on a piece of evidence.
pub const MAX_SNIPPET_LENGTH: usize = 1024;

// =============================================================================
// SOURCES & FRONTIER
// =============================================================================

/// Hours a fetched document stays fresh before callers should re-fetch it.
pub const SOURCE_CACHE_WINDOW_HOURS: i64 = 24;

/// Seconds after which a task stuck in `processing` may be reclaimed.
pub const STALE_TASK_SECS: i64 = 15 * 60;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length for identifiers (job ids, item ids, field names).
pub const MAX_KEY_LENGTH: usize = 256;

/// Maximum length for frontier task values and claim values.
pub const MAX_VALUE_LENGTH: usize = 4096;

/// Maximum number of claims accepted in one ingestion call.
pub const MAX_CLAIM_BATCH: usize = 1000;

/// Maximum number of tasks claimed by one `next_batch` call.
pub const MAX_BATCH_CLAIM: usize = 500;
