//! Write path: turns one item's resolved research into graph structure.
//!
//! The structural writes of an item (entities, aliases, edges) commit in one
//! transaction. Evidence is attached afterwards in its own transaction and a
//! failure there is logged, never propagated, so provenance can't roll back
//! structure.

use super::{attach_evidence, find_or_create_entity, insert_alias, insert_edge};
use crate::normalize::canonical_key;
use crate::primitives::{EXACT_ALIAS_CONFIDENCE, MAX_EVIDENCE_PER_ITEM, WEAK_ALIAS_CONFIDENCE};
use crate::storage::Store;
use crate::{
    AliasId, AliasKind, ClaimGraphError, Confidence, EdgeId, EdgeKind, EntityId, EntityKind,
    EvidenceTarget, FieldValue, Metadata, Notes,
};
use chrono::{DateTime, Utc};
use redb::WriteTransaction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A document supporting the resolved item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSource {
    pub url: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default = "default_evidence_confidence")]
    pub confidence: u8,
    #[serde(default)]
    pub fetched_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Notes,
}

fn default_evidence_confidence() -> u8 {
    50
}

/// Resolved research data for one catalog item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolvedItem {
    /// Manufacturer part number. Keys the consumable entity.
    pub primary_id: String,
    pub canonical_name: Option<String>,
    pub brand: Option<String>,
    pub compatible_devices: Vec<String>,
    /// OEM and competitor part numbers.
    pub cross_references: Vec<String>,
    pub barcodes: Vec<String>,
    /// Free-form names and spellings.
    pub aliases: Vec<String>,
    pub series: Option<String>,
    /// Part numbers this item supersedes.
    pub replaces: Vec<String>,
    pub evidence: Vec<EvidenceSource>,
}

/// What one populate call changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulateReport {
    pub entity_id: EntityId,
    pub entities_created: u32,
    pub edges_created: u32,
    pub aliases_created: u32,
    pub evidence_attached: u32,
}

/// Bulk writer fed by resolved research.
#[derive(Debug, Clone)]
pub struct GraphPopulator {
    store: Store,
}

struct Written {
    entity_id: EntityId,
    entities: u32,
    edges: u32,
    aliases: u32,
    primary_alias: AliasId,
    compatibility_edges: Vec<EdgeId>,
}

impl GraphPopulator {
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Write `item` into the graph. Running it twice with the same data
    /// creates nothing the second time.
    pub fn populate_from_research(
        &self,
        item_id: &str,
        item: &ResolvedItem,
        job_id: &str,
    ) -> Result<PopulateReport, ClaimGraphError> {
        let primary = item.primary_id.trim();
        if canonical_key(primary).is_empty() {
            return Err(ClaimGraphError::InvalidInput(format!(
                "item {item_id} has no usable primary identifier"
            )));
        }

        let txn = self.store.begin_write()?;
        let written = write_structure(&txn, item_id, item, job_id, primary)?;
        txn.commit()?;

        let evidence_attached = match self.write_evidence(item, &written) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(item_id, job_id, error = %e, "evidence write failed, structure kept");
                0
            }
        };

        let report = PopulateReport {
            entity_id: written.entity_id,
            entities_created: written.entities,
            edges_created: written.edges,
            aliases_created: written.aliases,
            evidence_attached,
        };
        tracing::info!(
            item_id,
            job_id,
            entity_id = %report.entity_id,
            entities_created = report.entities_created,
            edges_created = report.edges_created,
            aliases_created = report.aliases_created,
            evidence_attached,
            "graph populated"
        );
        Ok(report)
    }

    fn write_evidence(
        &self,
        item: &ResolvedItem,
        written: &Written,
    ) -> Result<u32, ClaimGraphError> {
        let mut sources: Vec<&EvidenceSource> = item
            .evidence
            .iter()
            .filter(|e| !e.url.trim().is_empty())
            .collect();
        if sources.is_empty() {
            return Ok(0);
        }
        sources.sort_by(|a, b| b.confidence.cmp(&a.confidence));
        sources.truncate(MAX_EVIDENCE_PER_ITEM);

        let mut targets = vec![EvidenceTarget::Alias(written.primary_alias)];
        targets.extend(written.compatibility_edges.iter().map(|id| EvidenceTarget::Edge(*id)));

        let now = Utc::now();
        let txn = self.store.begin_write()?;
        let mut attached = 0;
        for source in sources {
            for target in &targets {
                let created = attach_evidence(
                    &txn,
                    *target,
                    source.url.trim(),
                    &source.snippet,
                    Confidence::new(source.confidence),
                    source.fetched_at.unwrap_or(now),
                    source.notes.clone(),
                )?;
                if created {
                    attached += 1;
                }
            }
        }
        txn.commit()?;
        Ok(attached)
    }
}

fn edge_metadata(item_id: &str, job_id: &str) -> Metadata {
    let mut meta = Metadata::new();
    meta.insert("item_id".to_string(), FieldValue::text(item_id));
    meta.insert("job_id".to_string(), FieldValue::text(job_id));
    meta
}

/// Unique non-empty values by canonical key, first spelling kept.
fn dedup<'a>(values: &'a [String], skip: &str) -> Vec<&'a str> {
    let mut seen = BTreeSet::new();
    seen.insert(canonical_key(skip));
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| {
            let key = canonical_key(v);
            !key.is_empty() && seen.insert(key)
        })
        .collect()
}

fn count(created: bool, counter: &mut u32) {
    if created {
        *counter += 1;
    }
}

fn write_structure(
    txn: &WriteTransaction,
    item_id: &str,
    item: &ResolvedItem,
    job_id: &str,
    primary: &str,
) -> Result<Written, ClaimGraphError> {
    let mut entities = 0;
    let mut edges = 0;
    let mut aliases = 0;

    // 1. Consumable keyed by its primary identifier.
    let mut meta = Metadata::new();
    meta.insert("item_id".to_string(), FieldValue::text(item_id));
    if let Some(name) = item
        .canonical_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
    {
        meta.insert("title".to_string(), FieldValue::text(name));
    }
    if let Some(brand) = item.brand.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
        meta.insert("brand".to_string(), FieldValue::text(brand));
    }
    let (consumable, created) = find_or_create_entity(txn, EntityKind::Consumable, primary, meta)?;
    count(created, &mut entities);

    let (primary_alias, created) = insert_alias(
        txn,
        consumable.id,
        primary,
        AliasKind::Exact,
        None,
        Confidence::new(EXACT_ALIAS_CONFIDENCE),
    )?;
    count(created, &mut aliases);

    // 2. Brand.
    let brand = item
        .brand
        .as_deref()
        .map(str::trim)
        .filter(|b| !canonical_key(b).is_empty());
    if let Some(brand) = brand {
        let (brand_entity, created) =
            find_or_create_entity(txn, EntityKind::Brand, brand, Metadata::new())?;
        count(created, &mut entities);
        let (_, created) = insert_alias(
            txn,
            brand_entity.id,
            brand,
            AliasKind::Exact,
            None,
            Confidence::new(EXACT_ALIAS_CONFIDENCE),
        )?;
        count(created, &mut aliases);
        let (_, created) = insert_edge(
            txn,
            consumable.id,
            brand_entity.id,
            EdgeKind::ManufacturedBy,
            edge_metadata(item_id, job_id),
        )?;
        count(created, &mut edges);
    }

    // 3. Compatible devices.
    let mut compatibility_edges = Vec::new();
    for device in dedup(&item.compatible_devices, primary) {
        let (printer, created) =
            find_or_create_entity(txn, EntityKind::Printer, device, Metadata::new())?;
        count(created, &mut entities);
        let (_, created) = insert_alias(
            txn,
            printer.id,
            device,
            AliasKind::Exact,
            None,
            Confidence::new(EXACT_ALIAS_CONFIDENCE),
        )?;
        count(created, &mut aliases);
        let (edge, created) = insert_edge(
            txn,
            consumable.id,
            printer.id,
            EdgeKind::CompatibleWith,
            edge_metadata(item_id, job_id),
        )?;
        count(created, &mut edges);
        compatibility_edges.push(edge.id);
    }

    // 4. Additional identifiers.
    let exact: Vec<String> = item
        .cross_references
        .iter()
        .chain(&item.barcodes)
        .cloned()
        .collect();
    for identifier in dedup(&exact, primary) {
        let (_, created) = insert_alias(
            txn,
            consumable.id,
            identifier,
            AliasKind::Exact,
            None,
            Confidence::new(EXACT_ALIAS_CONFIDENCE),
        )?;
        count(created, &mut aliases);
    }
    for weak in item.aliases.iter().map(|a| a.trim()).filter(|a| !a.is_empty()) {
        let (_, created) = insert_alias(
            txn,
            consumable.id,
            weak,
            AliasKind::WeakSignal,
            None,
            Confidence::new(WEAK_ALIAS_CONFIDENCE),
        )?;
        count(created, &mut aliases);
    }

    let series = item
        .series
        .as_deref()
        .map(str::trim)
        .filter(|s| !canonical_key(s).is_empty());
    if let Some(series) = series {
        let (series_entity, created) =
            find_or_create_entity(txn, EntityKind::Series, series, Metadata::new())?;
        count(created, &mut entities);
        let (_, created) = insert_alias(
            txn,
            series_entity.id,
            series,
            AliasKind::Exact,
            None,
            Confidence::new(EXACT_ALIAS_CONFIDENCE),
        )?;
        count(created, &mut aliases);
        let (_, created) = insert_edge(
            txn,
            consumable.id,
            series_entity.id,
            EdgeKind::PartOfSeries,
            edge_metadata(item_id, job_id),
        )?;
        count(created, &mut edges);
    }

    for old in dedup(&item.replaces, primary) {
        let (predecessor, created) =
            find_or_create_entity(txn, EntityKind::Consumable, old, Metadata::new())?;
        count(created, &mut entities);
        let (_, created) = insert_alias(
            txn,
            predecessor.id,
            old,
            AliasKind::Exact,
            None,
            Confidence::new(EXACT_ALIAS_CONFIDENCE),
        )?;
        count(created, &mut aliases);
        let (_, created) = insert_edge(
            txn,
            predecessor.id,
            consumable.id,
            EdgeKind::ReplacedBy,
            edge_metadata(item_id, job_id),
        )?;
        count(created, &mut edges);
    }

    Ok(Written {
        entity_id: consumable.id,
        entities,
        edges,
        aliases,
        primary_alias: primary_alias.id,
        compatibility_edges,
    })
}

// =============================================================================
// TESTS
// =============================================================================
