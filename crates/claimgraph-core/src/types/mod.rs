//! # Core Type Definitions
//!
//! This module contains the shared types for the claimgraph substrate:
//! - Record identifiers (`EntityId`, `AliasId`, `EdgeId`, ...)
//! - Structural values (`FieldValue`, `Metadata`)
//! - Graph records (`Entity`, `Alias`, `Edge`, `GraphEvidence`)
//! - Integer confidence (`Confidence`)
//! - Error types (`ClaimGraphError`)
//!
//! ## Determinism Guarantees
//!
//! - Scores and confidences are integers (percent), never floats
//! - Maps are `BTreeMap` so serialized records are byte-stable
//! - Identifiers are allocated from monotonic counters inside write transactions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

macro_rules! record_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Get the raw identifier value.
            #[must_use]
            pub const fn value(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

record_id!(
    /// Identifier of a canonical graph node.
    EntityId
);
record_id!(
    /// Identifier of an alias row.
    AliasId
);
record_id!(
    /// Identifier of a directed edge.
    EdgeId
);
record_id!(
    /// Identifier of a provenance record attached to an edge or alias.
    EvidenceId
);
record_id!(
    /// Identifier of a frontier task.
    TaskId
);
record_id!(
    /// Identifier of a stored claim.
    ClaimId
);
record_id!(
    /// Identifier of a stored source document.
    SourceId
);

// =============================================================================
// STRUCTURAL VALUES
// =============================================================================

/// A loosely-typed scalar carried by claims and structural metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl FieldValue {
    /// Create a text value.
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Get the value as a string slice if it is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Structural metadata on entities, edges and frontier tasks.
pub type Metadata = BTreeMap<String, FieldValue>;

/// Free-form provenance notes. The only schema-less map in the model.
pub type Notes = BTreeMap<String, String>;

// =============================================================================
// CONFIDENCE
// =============================================================================

/// Confidence expressed as an integer percentage (0-100).
///
/// Integer scoring keeps resolution deterministic across platforms.
/// Use [`Confidence::as_fraction`] at presentation boundaries.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Confidence(u8);

impl Confidence {
    /// Full certainty.
    pub const CERTAIN: Self = Self(100);

    /// Create a confidence, clamping to 100.
    #[must_use]
    pub const fn new(percent: u8) -> Self {
        if percent > 100 { Self(100) } else { Self(percent) }
    }

    /// Raw percentage.
    #[must_use]
    pub const fn percent(self) -> u8 {
        self.0
    }

    /// Confidence in the `[0, 1]` range.
    #[must_use]
    #[allow(clippy::float_arithmetic)]
    pub fn as_fraction(self) -> f64 {
        f64::from(self.0) / 100.0
    }

    /// Lower the confidence by `points`, saturating at zero.
    #[must_use]
    pub const fn penalize(self, points: u8) -> Self {
        Self(self.0.saturating_sub(points))
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

// =============================================================================
// GRAPH KINDS
// =============================================================================

/// Kind of a canonical graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Brand,
    Printer,
    Consumable,
    Series,
    Unknown,
}

impl EntityKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Brand => "brand",
            Self::Printer => "printer",
            Self::Consumable => "consumable",
            Self::Series => "series",
            Self::Unknown => "unknown",
        }
    }
}

impl FromStr for EntityKind {
    type Err = ClaimGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "brand" => Ok(Self::Brand),
            "printer" => Ok(Self::Printer),
            "consumable" => Ok(Self::Consumable),
            "series" => Ok(Self::Series),
            "unknown" => Ok(Self::Unknown),
            other => Err(ClaimGraphError::InvalidInput(format!(
                "unknown entity kind '{other}'"
            ))),
        }
    }
}

/// How an alias string was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasKind {
    Exact,
    Regex,
    WeakSignal,
    MachineGenerated,
}

/// Typed relationship between two entities. Edges are directed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    CompatibleWith,
    ManufacturedBy,
    AlsoKnownAs,
    ReplacedBy,
    PartOfSeries,
}

impl EdgeKind {
    /// Stable numeric code used in the edge uniqueness index.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::CompatibleWith => 1,
            Self::ManufacturedBy => 2,
            Self::AlsoKnownAs => 3,
            Self::ReplacedBy => 4,
            Self::PartOfSeries => 5,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CompatibleWith => "COMPATIBLE_WITH",
            Self::ManufacturedBy => "MANUFACTURED_BY",
            Self::AlsoKnownAs => "ALSO_KNOWN_AS",
            Self::ReplacedBy => "REPLACED_BY",
            Self::PartOfSeries => "PART_OF_SERIES",
        }
    }
}

// =============================================================================
// GRAPH RECORDS
// =============================================================================

/// A canonical graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub canonical_name: String,
    pub metadata: Metadata,
}

/// A normalized string known to refer to a specific entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    pub id: AliasId,
    pub entity_id: EntityId,
    pub alias: String,
    pub kind: AliasKind,
    pub locale: String,
    pub confidence: Confidence,
}

/// A typed directed relationship between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub from: EntityId,
    pub to: EntityId,
    pub kind: EdgeKind,
    pub metadata: Metadata,
}

/// What a piece of evidence is attached to. Exactly one target per record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceTarget {
    Edge(EdgeId),
    Alias(AliasId),
}

/// Provenance for an edge or alias. Never drives graph structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEvidence {
    pub id: EvidenceId,
    pub target: EvidenceTarget,
    pub source_url: String,
    pub snippet: String,
    pub confidence: Confidence,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub fetched_at: DateTime<Utc>,
    pub notes: Notes,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the claimgraph core.
///
/// - No silent failures
/// - Storage faults propagate unmodified so dedup guarantees stay visible
/// - `Uninitialized` is the only storage condition read paths may absorb
#[derive(Debug, Error)]
pub enum ClaimGraphError {
    /// Caller supplied input that violates a validation rule.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The requested record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A frontier task was asked to leave a state it cannot leave.
    #[error("Invalid transition for task {task}: {from} -> {to}")]
    InvalidTransition {
        task: TaskId,
        from: String,
        to: String,
    },

    /// A table was missing because the schema was never created.
    #[error("Storage not initialized: missing table {0}")]
    Uninitialized(String),

    /// The embedded database reported a failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A record could not be encoded.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A stored record could not be decoded.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

impl ClaimGraphError {
    /// Whether this error means the graph schema has not been created yet.
    #[must_use]
    pub fn is_uninitialized(&self) -> bool {
        matches!(self, Self::Uninitialized(_))
    }
}

// =============================================================================
// TESTS
// =============================================================================
