//! # Entity Graph
//!
//! Canonical entities, the aliases that point at them, typed edges between
//! them and the evidence behind edges and aliases.
//!
//! Every registry is append-only and every insert is guarded by a unique
//! index:
//!
//! | Record   | Unique on                  |
//! |----------|----------------------------|
//! | Entity   | canonical key of its name  |
//! | Alias    | (alias, locale)            |
//! | Edge     | (from, to, kind)           |
//! | Evidence | (target, source url)       |
//!
//! An insert that hits an existing key is a no-op that returns the stored
//! record, so repeated writes converge.
//!
//! [`GraphService`] is the read path (plus `link_alias`), [`GraphPopulator`]
//! the bulk write path fed by resolved research.

mod populator;
mod service;

pub use populator::{EvidenceSource, GraphPopulator, PopulateReport, ResolvedItem};
pub use service::{GraphService, GraphStats, IdentityMatch, LinkOutcome, LinkSource, MatchKind};

use crate::normalize::{canonical_key, compose_key, fold_alias, padded, prefix_bounds, validate_key};
use crate::primitives::{DEFAULT_LOCALE, MAX_SNIPPET_LENGTH};
use crate::storage::{
    ALIAS_FOLDED, ALIAS_KEYS, ALIASES, EDGE_ADJACENCY, EDGE_KEYS, EDGES, ENTITIES, ENTITY_ALIASES,
    ENTITY_NAMES, EVIDENCE_KEYS, GRAPH_EVIDENCE, decode, encode, next_id,
};
use crate::{
    Alias, AliasId, AliasKind, ClaimGraphError, Confidence, Edge, EdgeId, EdgeKind, Entity,
    EntityId, EntityKind, EvidenceId, EvidenceTarget, GraphEvidence, Metadata, Notes,
};
use chrono::{DateTime, Utc};
use redb::{ReadableTable, WriteTransaction};

// =============================================================================
// READ HELPERS (shared by read and write transactions)
// =============================================================================

fn load_entity(
    entities: &impl ReadableTable<u64, &'static [u8]>,
    id: u64,
) -> Result<Entity, ClaimGraphError> {
    let bytes = entities
        .get(id)?
        .ok_or_else(|| ClaimGraphError::NotFound(format!("entity {id}")))?;
    decode(bytes.value())
}

fn load_alias(
    aliases: &impl ReadableTable<u64, &'static [u8]>,
    id: u64,
) -> Result<Alias, ClaimGraphError> {
    let bytes = aliases
        .get(id)?
        .ok_or_else(|| ClaimGraphError::NotFound(format!("alias {id}")))?;
    decode(bytes.value())
}

fn load_edge(
    edges: &impl ReadableTable<u64, &'static [u8]>,
    id: u64,
) -> Result<Edge, ClaimGraphError> {
    let bytes = edges
        .get(id)?
        .ok_or_else(|| ClaimGraphError::NotFound(format!("edge {id}")))?;
    decode(bytes.value())
}

/// Aliases whose exact text is `alias`, in every locale.
fn exact_aliases(
    alias_keys: &impl ReadableTable<&'static str, u64>,
    aliases: &impl ReadableTable<u64, &'static [u8]>,
    alias: &str,
) -> Result<Vec<Alias>, ClaimGraphError> {
    let (start, end) = prefix_bounds(alias);
    let mut found = Vec::new();
    for entry in alias_keys.range(start.as_str()..end.as_str())? {
        let (_, id) = entry?;
        found.push(load_alias(aliases, id.value())?);
    }
    Ok(found)
}

/// Aliases whose case-folded text equals `fold_alias(query)`, in every locale.
fn folded_aliases(
    alias_folded: &impl ReadableTable<&'static str, u64>,
    aliases: &impl ReadableTable<u64, &'static [u8]>,
    query: &str,
) -> Result<Vec<Alias>, ClaimGraphError> {
    let (start, end) = prefix_bounds(&fold_alias(query));
    let mut found = Vec::new();
    for entry in alias_folded.range(start.as_str()..end.as_str())? {
        let (_, id) = entry?;
        found.push(load_alias(aliases, id.value())?);
    }
    Ok(found)
}

// =============================================================================
// WRITE HELPERS
// =============================================================================

/// Find the entity `name` refers to, or create it.
///
/// Lookup order: an exact alias equal to `name`, then the canonical key of
/// `name`. An `Unknown` entity found this way is upgraded to `kind`, and
/// metadata keys it lacks are filled in; neither counts as a creation.
pub(crate) fn find_or_create_entity(
    txn: &WriteTransaction,
    kind: EntityKind,
    name: &str,
    metadata: Metadata,
) -> Result<(Entity, bool), ClaimGraphError> {
    let name = name.trim();
    validate_key("entity name", name)?;
    let key = canonical_key(name);
    if key.is_empty() {
        return Err(ClaimGraphError::InvalidInput(format!(
            "'{name}' has no alphanumeric characters"
        )));
    }

    let existing = {
        let alias_keys = txn.open_table(ALIAS_KEYS)?;
        let aliases = txn.open_table(ALIASES)?;
        match exact_aliases(&alias_keys, &aliases, name)?.first() {
            Some(alias) => Some(alias.entity_id.0),
            None => {
                let names = txn.open_table(ENTITY_NAMES)?;
                names.get(key.as_str())?.map(|v| v.value())
            }
        }
    };

    if let Some(id) = existing {
        let mut entities = txn.open_table(ENTITIES)?;
        let mut entity = load_entity(&entities, id)?;
        let mut changed = false;
        if entity.kind == EntityKind::Unknown && kind != EntityKind::Unknown {
            entity.kind = kind;
            changed = true;
        }
        for (k, v) in metadata {
            if !entity.metadata.contains_key(&k) {
                entity.metadata.insert(k, v);
                changed = true;
            }
        }
        if changed {
            let bytes = encode(&entity)?;
            entities.insert(id, bytes.as_slice())?;
        }
        return Ok((entity, false));
    }

    let id = EntityId(next_id(txn, "entity")?);
    let entity = Entity {
        id,
        kind,
        canonical_name: name.to_string(),
        metadata,
    };
    {
        let mut entities = txn.open_table(ENTITIES)?;
        let bytes = encode(&entity)?;
        entities.insert(id.0, bytes.as_slice())?;
        let mut names = txn.open_table(ENTITY_NAMES)?;
        names.insert(key.as_str(), id.0)?;
    }
    tracing::debug!(entity_id = %id, kind = kind.as_str(), name, "entity created");
    Ok((entity, true))
}

/// Insert-or-ignore an alias. An existing (alias, locale) row wins, even
/// when it points at another entity.
pub(crate) fn insert_alias(
    txn: &WriteTransaction,
    entity_id: EntityId,
    alias: &str,
    kind: AliasKind,
    locale: Option<&str>,
    confidence: Confidence,
) -> Result<(Alias, bool), ClaimGraphError> {
    let alias = alias.trim();
    validate_key("alias", alias)?;
    let locale = locale.map_or(DEFAULT_LOCALE, str::trim);
    validate_key("locale", locale)?;
    let key = compose_key(&[alias, locale]);

    {
        let alias_keys = txn.open_table(ALIAS_KEYS)?;
        if let Some(id) = alias_keys.get(key.as_str())? {
            let aliases = txn.open_table(ALIASES)?;
            return Ok((load_alias(&aliases, id.value())?, false));
        }
    }

    let id = AliasId(next_id(txn, "alias")?);
    let record = Alias {
        id,
        entity_id,
        alias: alias.to_string(),
        kind,
        locale: locale.to_string(),
        confidence,
    };
    {
        let mut aliases = txn.open_table(ALIASES)?;
        let bytes = encode(&record)?;
        aliases.insert(id.0, bytes.as_slice())?;
        let mut alias_keys = txn.open_table(ALIAS_KEYS)?;
        alias_keys.insert(key.as_str(), id.0)?;
        let mut folded = txn.open_table(ALIAS_FOLDED)?;
        folded.insert(
            compose_key(&[&fold_alias(alias), locale, &padded(id.0)]).as_str(),
            id.0,
        )?;
        let mut by_entity = txn.open_table(ENTITY_ALIASES)?;
        by_entity.insert((entity_id.0, id.0), id.0)?;
    }
    Ok((record, true))
}

/// Insert-or-ignore a directed edge.
pub(crate) fn insert_edge(
    txn: &WriteTransaction,
    from: EntityId,
    to: EntityId,
    kind: EdgeKind,
    metadata: Metadata,
) -> Result<(Edge, bool), ClaimGraphError> {
    let unique = (from.0, to.0, kind.code());
    {
        let edge_keys = txn.open_table(EDGE_KEYS)?;
        if let Some(id) = edge_keys.get(unique)? {
            let edges = txn.open_table(EDGES)?;
            return Ok((load_edge(&edges, id.value())?, false));
        }
    }

    let id = EdgeId(next_id(txn, "edge")?);
    let edge = Edge {
        id,
        from,
        to,
        kind,
        metadata,
    };
    {
        let mut edges = txn.open_table(EDGES)?;
        let bytes = encode(&edge)?;
        edges.insert(id.0, bytes.as_slice())?;
        let mut edge_keys = txn.open_table(EDGE_KEYS)?;
        edge_keys.insert(unique, id.0)?;
        let mut adjacency = txn.open_table(EDGE_ADJACENCY)?;
        adjacency.insert((from.0, id.0), id.0)?;
        adjacency.insert((to.0, id.0), id.0)?;
    }
    tracing::debug!(edge_id = %id, from = %from, to = %to, kind = kind.as_str(), "edge created");
    Ok((edge, true))
}

/// Attach provenance to an edge or alias. Returns `false` when the target
/// already carries evidence from `source_url`.
pub(crate) fn attach_evidence(
    txn: &WriteTransaction,
    target: EvidenceTarget,
    source_url: &str,
    snippet: &str,
    confidence: Confidence,
    fetched_at: DateTime<Utc>,
    notes: Notes,
) -> Result<bool, ClaimGraphError> {
    let target_part = match target {
        EvidenceTarget::Edge(id) => format!("edge:{}", padded(id.0)),
        EvidenceTarget::Alias(id) => format!("alias:{}", padded(id.0)),
    };
    let key = compose_key(&[&target_part, source_url]);

    {
        let evidence_keys = txn.open_table(EVIDENCE_KEYS)?;
        if evidence_keys.get(key.as_str())?.is_some() {
            return Ok(false);
        }
    }

    let id = EvidenceId(next_id(txn, "evidence")?);
    let record = GraphEvidence {
        id,
        target,
        source_url: source_url.to_string(),
        snippet: snippet.chars().take(MAX_SNIPPET_LENGTH).collect(),
        confidence,
        fetched_at,
        notes,
    };
    let mut evidence = txn.open_table(GRAPH_EVIDENCE)?;
    let bytes = encode(&record)?;
    evidence.insert(id.0, bytes.as_slice())?;
    let mut evidence_keys = txn.open_table(EVIDENCE_KEYS)?;
    evidence_keys.insert(key.as_str(), id.0)?;
    Ok(true)
}
