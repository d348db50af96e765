//! # Claim Store
//!
//! Append-only ledger of field-level assertions extracted from source
//! documents. Claims are never updated or deleted; resolution always runs over
//! the full stored set of a field.
//!
//! Ingestion is replay-safe: a claim identical in item, field, domain,
//! document, normalized value and source kind is stored once.

use crate::normalize::{
    compose_key, normalize_domain, normalize_value, padded, prefix_bounds, validate_key,
    validate_value, KEY_SEP,
};
use crate::primitives::MAX_CLAIM_BATCH;
use crate::storage::{
    CLAIM_INDEX, CLAIM_KEYS, CLAIMS, SOURCE_DOCUMENTS, Store, decode, encode, next_id,
};
use crate::sources::SourceDocument;
use crate::trust::{ResolvedField, TrustEngine};
use crate::{ClaimGraphError, ClaimId, Confidence, FieldValue, SourceId};
use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// How a claim was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Scrape,
    Search,
    Agent,
    Manual,
}

impl SourceKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scrape => "scrape",
            Self::Search => "search",
            Self::Agent => "agent",
            Self::Manual => "manual",
        }
    }
}

/// A stored, immutable claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub item_id: String,
    pub field: String,
    pub value: FieldValue,
    pub normalized: String,
    /// Extractor-reported confidence. Not used by arbitration.
    pub confidence: Confidence,
    pub source_document_id: Option<SourceId>,
    pub source_domain: String,
    pub source_kind: SourceKind,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// One extracted assertion awaiting ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewClaim {
    pub field: String,
    pub value: FieldValue,
    /// Defaults to the source document's domain.
    #[serde(default)]
    pub source_domain: Option<String>,
    pub source_kind: SourceKind,
    #[serde(default)]
    pub confidence: Option<u8>,
}

/// Result of [`ClaimStore::ingest`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub inserted: Vec<ClaimId>,
    pub duplicates: usize,
}

struct Prepared {
    claim: NewClaim,
    normalized: String,
    domain: String,
    dedup_key: String,
}

/// Persistence and resolution of claims.
#[derive(Debug, Clone)]
pub struct ClaimStore {
    store: Store,
}

impl ClaimStore {
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Append claims about `item_id`, optionally tied to a source document.
    ///
    /// The batch is validated up front and written in one transaction.
    pub fn ingest(
        &self,
        item_id: &str,
        source_document_id: Option<SourceId>,
        claims: Vec<NewClaim>,
    ) -> Result<IngestReport, ClaimGraphError> {
        validate_key("item_id", item_id)?;
        if claims.len() > MAX_CLAIM_BATCH {
            return Err(ClaimGraphError::InvalidInput(format!(
                "batch of {} claims exceeds maximum {}",
                claims.len(),
                MAX_CLAIM_BATCH
            )));
        }

        let txn = self.store.begin_write()?;

        let document_domain = match source_document_id {
            Some(id) => {
                let documents = txn.open_table(SOURCE_DOCUMENTS)?;
                let bytes = documents
                    .get(id.0)?
                    .ok_or_else(|| ClaimGraphError::NotFound(format!("source document {id}")))?;
                let doc: SourceDocument = decode(bytes.value())?;
                Some(doc.domain)
            }
            None => None,
        };
        let document_part = source_document_id.map_or_else(|| "-".to_string(), |id| padded(id.0));

        let mut prepared = Vec::with_capacity(claims.len());
        for claim in claims {
            validate_key("field", &claim.field)?;
            let normalized = normalize_value(&claim.value.to_string());
            validate_value("value", &normalized)?;
            let domain = match (&claim.source_domain, &document_domain) {
                (Some(d), _) if !d.trim().is_empty() => normalize_domain(d),
                (_, Some(d)) => d.clone(),
                _ => {
                    return Err(ClaimGraphError::InvalidInput(format!(
                        "claim for field '{}' has no source domain",
                        claim.field
                    )));
                }
            };
            validate_key("source_domain", &domain)?;
            let dedup_key = compose_key(&[
                item_id,
                &claim.field,
                &domain,
                &document_part,
                &normalized,
                claim.source_kind.as_str(),
            ]);
            prepared.push(Prepared {
                claim,
                normalized,
                domain,
                dedup_key,
            });
        }

        let now = Utc::now();
        let mut report = IngestReport::default();
        for p in prepared {
            {
                let keys = txn.open_table(CLAIM_KEYS)?;
                if keys.get(p.dedup_key.as_str())?.is_some() {
                    report.duplicates += 1;
                    continue;
                }
            }

            let id = ClaimId(next_id(&txn, "claim")?);
            let stored = Claim {
                id,
                item_id: item_id.to_string(),
                field: p.claim.field,
                value: p.claim.value,
                normalized: p.normalized,
                confidence: Confidence::new(p.claim.confidence.unwrap_or(100)),
                source_document_id,
                source_domain: p.domain,
                source_kind: p.claim.source_kind,
                created_at: now,
            };

            let mut claims_table = txn.open_table(CLAIMS)?;
            let bytes = encode(&stored)?;
            claims_table.insert(id.0, bytes.as_slice())?;
            let mut keys = txn.open_table(CLAIM_KEYS)?;
            keys.insert(p.dedup_key.as_str(), id.0)?;
            let mut index = txn.open_table(CLAIM_INDEX)?;
            index.insert(
                compose_key(&[item_id, &stored.field, &padded(id.0)]).as_str(),
                id.0,
            )?;
            report.inserted.push(id);
        }
        txn.commit()?;

        tracing::info!(
            item_id,
            inserted = report.inserted.len(),
            duplicates = report.duplicates,
            "claims ingested"
        );
        Ok(report)
    }

    /// Claims about one field of one item, in insertion order.
    pub fn claims_for(&self, item_id: &str, field: &str) -> Result<Vec<Claim>, ClaimGraphError> {
        validate_key("item_id", item_id)?;
        validate_key("field", field)?;
        let (start, end) = prefix_bounds(&compose_key(&[item_id, field]));

        let txn = self.store.begin_read()?;
        let index = txn.open_table(CLAIM_INDEX)?;
        let claims = txn.open_table(CLAIMS)?;

        let mut found = Vec::new();
        for entry in index.range(start.as_str()..end.as_str())? {
            let (_, id) = entry?;
            if let Some(bytes) = claims.get(id.value())? {
                found.push(decode(bytes.value())?);
            }
        }
        Ok(found)
    }

    /// Fields that have at least one claim for `item_id`, sorted.
    pub fn fields_for(&self, item_id: &str) -> Result<Vec<String>, ClaimGraphError> {
        validate_key("item_id", item_id)?;
        let (start, end) = prefix_bounds(item_id);

        let txn = self.store.begin_read()?;
        let index = txn.open_table(CLAIM_INDEX)?;

        let mut fields = BTreeSet::new();
        for entry in index.range(start.as_str()..end.as_str())? {
            let (key, _) = entry?;
            if let Some(field) = key.value().split(KEY_SEP).nth(1) {
                fields.insert(field.to_string());
            }
        }
        Ok(fields.into_iter().collect())
    }

    /// Resolve one field from every stored claim about it.
    pub fn resolve(
        &self,
        engine: &TrustEngine,
        item_id: &str,
        field: &str,
    ) -> Result<Option<ResolvedField>, ClaimGraphError> {
        let claims = self.claims_for(item_id, field)?;
        Ok(engine.resolve_field(&claims))
    }

    /// Resolve every field of an item.
    pub fn resolve_item(
        &self,
        engine: &TrustEngine,
        item_id: &str,
    ) -> Result<BTreeMap<String, ResolvedField>, ClaimGraphError> {
        let mut resolved = BTreeMap::new();
        for field in self.fields_for(item_id)? {
            if let Some(r) = self.resolve(engine, item_id, &field)? {
                resolved.insert(field, r);
            }
        }
        Ok(resolved)
    }
}

// =============================================================================
// TESTS
// =============================================================================
