//! Read path over the entity graph.
//!
//! Lookups never fail because the graph is empty or was never created: a
//! missing table is a miss. Every other storage error propagates.

use super::{
    exact_aliases, find_or_create_entity, folded_aliases, insert_alias, load_alias, load_edge,
    load_entity,
};
use crate::normalize::canonical_key;
use crate::primitives::{CASE_FOLD_PENALTY, EXPLICIT_LINK_CONFIDENCE, INFERRED_LINK_CONFIDENCE};
use crate::storage::{
    ALIAS_FOLDED, ALIAS_KEYS, ALIASES, EDGE_ADJACENCY, EDGE_KEYS, EDGES, ENTITIES, ENTITY_ALIASES,
    ENTITY_NAMES, GRAPH_EVIDENCE, Store, decode,
};
use crate::{
    Alias, AliasKind, ClaimGraphError, Confidence, EdgeKind, Entity, EntityId, EntityKind,
    FieldValue, Metadata,
};
use redb::ReadableTableMetadata;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How an identity query matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    CaseInsensitive,
}

/// A successful identity lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityMatch {
    pub entity: Entity,
    pub alias: Alias,
    pub confidence: Confidence,
    pub match_kind: MatchKind,
}

/// Who asserted an alias link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkSource {
    /// A person or an authoritative feed.
    Explicit,
    /// Derived by the pipeline.
    Inferred,
}

/// Result of [`GraphService::link_alias`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkOutcome {
    pub entity: Entity,
    pub alias: Alias,
    pub entity_created: bool,
    pub alias_created: bool,
}

/// Row counts of the graph tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub entities: u64,
    pub aliases: u64,
    pub edges: u64,
    pub evidence: u64,
}

/// Identity and compatibility queries over the graph.
#[derive(Debug, Clone)]
pub struct GraphService {
    store: Store,
}

/// Treat a missing table as an empty graph.
fn absorb_uninitialized<T>(
    result: Result<T, ClaimGraphError>,
    empty: T,
) -> Result<T, ClaimGraphError> {
    match result {
        Err(e) if e.is_uninitialized() => {
            tracing::debug!(error = %e, "graph storage not initialized, treating as miss");
            Ok(empty)
        }
        other => other,
    }
}

impl GraphService {
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Resolve free text to a canonical entity.
    ///
    /// Tries exact aliases first, then case-insensitive ones at a small
    /// confidence penalty. When several entities match, one linked to `brand`
    /// is preferred, then the highest alias confidence, then the oldest alias.
    pub fn resolve_identity(
        &self,
        query: &str,
        brand: Option<&str>,
    ) -> Result<Option<IdentityMatch>, ClaimGraphError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }
        absorb_uninitialized(self.try_resolve(query, brand), None)
    }

    fn try_resolve(
        &self,
        query: &str,
        brand: Option<&str>,
    ) -> Result<Option<IdentityMatch>, ClaimGraphError> {
        let txn = self.store.begin_read()?;
        let aliases = txn.open_table(ALIASES)?;

        let mut match_kind = MatchKind::Exact;
        let mut candidates = {
            let alias_keys = txn.open_table(ALIAS_KEYS)?;
            exact_aliases(&alias_keys, &aliases, query)?
        };
        if candidates.is_empty() {
            let folded = txn.open_table(ALIAS_FOLDED)?;
            candidates = folded_aliases(&folded, &aliases, query)?;
            match_kind = MatchKind::CaseInsensitive;
        }
        if candidates.is_empty() {
            return Ok(None);
        }

        let brand_id = match brand.map(canonical_key).filter(|k| !k.is_empty()) {
            Some(key) => {
                let names = txn.open_table(ENTITY_NAMES)?;
                names.get(key.as_str())?.map(|v| EntityId(v.value()))
            }
            None => None,
        };
        let brand_key = brand.map(canonical_key);

        let entities = txn.open_table(ENTITIES)?;
        let edge_keys = txn.open_table(EDGE_KEYS)?;

        let mut best: Option<(bool, Alias, Entity)> = None;
        for alias in candidates {
            let entity = load_entity(&entities, alias.entity_id.0)?;
            let branded = match &brand_key {
                Some(key) => {
                    let in_metadata = entity
                        .metadata
                        .get("brand")
                        .and_then(FieldValue::as_text)
                        .is_some_and(|b| canonical_key(b) == *key);
                    let by_edge = match brand_id {
                        Some(b) => edge_keys
                            .get((entity.id.0, b.0, EdgeKind::ManufacturedBy.code()))?
                            .is_some(),
                        None => false,
                    };
                    in_metadata || by_edge
                }
                None => false,
            };
            let better = match &best {
                None => true,
                Some((best_branded, best_alias, _)) => {
                    (branded, alias.confidence, std::cmp::Reverse(alias.id))
                        > (
                            *best_branded,
                            best_alias.confidence,
                            std::cmp::Reverse(best_alias.id),
                        )
                }
            };
            if better {
                best = Some((branded, alias, entity));
            }
        }

        Ok(best.map(|(_, alias, entity)| {
            let confidence = match match_kind {
                MatchKind::Exact => alias.confidence,
                MatchKind::CaseInsensitive => alias.confidence.penalize(CASE_FOLD_PENALTY),
            };
            IdentityMatch {
                entity,
                alias,
                confidence,
                match_kind,
            }
        }))
    }

    /// Whether a COMPATIBLE_WITH edge joins the two references, in either
    /// direction. `false` when either reference does not resolve.
    pub fn check_compatibility(
        &self,
        consumable_ref: &str,
        printer_ref: &str,
    ) -> Result<bool, ClaimGraphError> {
        let Some(consumable) = self.resolve_identity(consumable_ref, None)? else {
            return Ok(false);
        };
        let Some(printer) = self.resolve_identity(printer_ref, None)? else {
            return Ok(false);
        };
        absorb_uninitialized(
            self.try_linked(consumable.entity.id, printer.entity.id),
            false,
        )
    }

    fn try_linked(&self, a: EntityId, b: EntityId) -> Result<bool, ClaimGraphError> {
        let code = EdgeKind::CompatibleWith.code();
        let txn = self.store.begin_read()?;
        let edge_keys = txn.open_table(EDGE_KEYS)?;
        Ok(edge_keys.get((a.0, b.0, code))?.is_some() || edge_keys.get((b.0, a.0, code))?.is_some())
    }

    /// Entities joined to `reference` by COMPATIBLE_WITH, in id order.
    pub fn compatible_with(&self, reference: &str) -> Result<Vec<Entity>, ClaimGraphError> {
        let Some(found) = self.resolve_identity(reference, None)? else {
            return Ok(Vec::new());
        };
        absorb_uninitialized(self.try_compatible_with(found.entity.id), Vec::new())
    }

    fn try_compatible_with(&self, id: EntityId) -> Result<Vec<Entity>, ClaimGraphError> {
        let txn = self.store.begin_read()?;
        let adjacency = txn.open_table(EDGE_ADJACENCY)?;
        let edges = txn.open_table(EDGES)?;
        let entities = txn.open_table(ENTITIES)?;

        let mut others = BTreeSet::new();
        for entry in adjacency.range((id.0, 0u64)..=(id.0, u64::MAX))? {
            let (_, edge_id) = entry?;
            let edge = load_edge(&edges, edge_id.value())?;
            if edge.kind != EdgeKind::CompatibleWith {
                continue;
            }
            others.insert(if edge.from == id { edge.to } else { edge.from });
        }
        others
            .into_iter()
            .map(|other| load_entity(&entities, other.0))
            .collect()
    }

    /// Fetch an entity by id.
    pub fn entity(&self, id: EntityId) -> Result<Option<Entity>, ClaimGraphError> {
        absorb_uninitialized(self.try_entity(id), None)
    }

    fn try_entity(&self, id: EntityId) -> Result<Option<Entity>, ClaimGraphError> {
        let txn = self.store.begin_read()?;
        let entities = txn.open_table(ENTITIES)?;
        match entities.get(id.0)? {
            Some(bytes) => Ok(Some(decode(bytes.value())?)),
            None => Ok(None),
        }
    }

    /// Every alias of an entity, oldest first.
    pub fn aliases_of(&self, id: EntityId) -> Result<Vec<Alias>, ClaimGraphError> {
        absorb_uninitialized(self.try_aliases_of(id), Vec::new())
    }

    fn try_aliases_of(&self, id: EntityId) -> Result<Vec<Alias>, ClaimGraphError> {
        let txn = self.store.begin_read()?;
        let by_entity = txn.open_table(ENTITY_ALIASES)?;
        let aliases = txn.open_table(ALIASES)?;
        let mut found = Vec::new();
        for entry in by_entity.range((id.0, 0u64)..=(id.0, u64::MAX))? {
            let (_, alias_id) = entry?;
            found.push(load_alias(&aliases, alias_id.value())?);
        }
        Ok(found)
    }

    /// Row counts of the graph tables.
    pub fn stats(&self) -> Result<GraphStats, ClaimGraphError> {
        absorb_uninitialized(self.try_stats(), GraphStats::default())
    }

    fn try_stats(&self) -> Result<GraphStats, ClaimGraphError> {
        let txn = self.store.begin_read()?;
        Ok(GraphStats {
            entities: txn.open_table(ENTITIES)?.len()?,
            aliases: txn.open_table(ALIASES)?.len()?,
            edges: txn.open_table(EDGES)?.len()?,
            evidence: txn.open_table(GRAPH_EVIDENCE)?.len()?,
        })
    }

    /// Bind `alias` to the entity named `canonical_name`, creating the entity
    /// when needed.
    ///
    /// Idempotent: an existing (alias, locale) row is left untouched. This is
    /// a write, so storage faults propagate.
    pub fn link_alias(
        &self,
        alias: &str,
        canonical_name: &str,
        brand: Option<&str>,
        source: LinkSource,
    ) -> Result<LinkOutcome, ClaimGraphError> {
        let mut metadata = Metadata::new();
        if let Some(b) = brand.map(str::trim).filter(|b| !b.is_empty()) {
            metadata.insert("brand".to_string(), FieldValue::text(b));
        }
        let (kind, confidence) = match source {
            LinkSource::Explicit => (AliasKind::Exact, EXPLICIT_LINK_CONFIDENCE),
            LinkSource::Inferred => (AliasKind::MachineGenerated, INFERRED_LINK_CONFIDENCE),
        };

        let txn = self.store.begin_write()?;
        let (entity, entity_created) = find_or_create_entity(
            &txn,
            EntityKind::Unknown,
            canonical_name,
            metadata,
        )?;
        let (alias, alias_created) = insert_alias(
            &txn,
            entity.id,
            alias,
            kind,
            None,
            Confidence::new(confidence),
        )?;
        txn.commit()?;

        tracing::info!(
            alias = %alias.alias,
            entity_id = %entity.id,
            entity_created,
            alias_created,
            "alias linked"
        );
        Ok(LinkOutcome {
            entity,
            alias,
            entity_created,
            alias_created,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
