//! # redb-backed Store
//!
//! A single embedded redb database holds every table the core persists:
//! the frontier, the source/claim ledger, and the entity graph.
//!
//! redb gives us:
//! - ACID transactions (one write transaction at a time, MVCC readers)
//! - Crash safety (copy-on-write B-trees)
//! - Zero configuration
//!
//! The single-writer property is what the frontier's exactly-once claim and
//! the graph's insert-or-ignore upserts rely on: a read-then-conditional-insert
//! inside one write transaction cannot interleave with another writer.
//!
//! ## Construction
//!
//! - [`Store::open`] creates the file and every table.
//! - [`Store::attach`] opens an existing file without creating tables, and
//!   never creates the file. Read paths over an attached store see
//!   [`ClaimGraphError::Uninitialized`] for a missing file or missing tables,
//!   which the graph read path turns into a miss.

use crate::ClaimGraphError;
use redb::{
    CommitError, Database, DatabaseError, ReadTransaction, ReadableDatabase, ReadableTable,
    StorageError, TableDefinition, TableError, TransactionError, WriteTransaction,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;

// =============================================================================
// TABLE DEFINITIONS
// =============================================================================

/// Counters: name -> next id.
pub(crate) const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// Entities: EntityId -> postcard(Entity).
pub(crate) const ENTITIES: TableDefinition<u64, &[u8]> = TableDefinition::new("entities");

/// Unique canonical key -> EntityId.
pub(crate) const ENTITY_NAMES: TableDefinition<&str, u64> = TableDefinition::new("entity_names");

/// Aliases: AliasId -> postcard(Alias).
pub(crate) const ALIASES: TableDefinition<u64, &[u8]> = TableDefinition::new("aliases");

/// Unique (alias, locale) -> AliasId.
pub(crate) const ALIAS_KEYS: TableDefinition<&str, u64> = TableDefinition::new("alias_keys");

/// (folded alias, locale, alias id) -> AliasId. Case-insensitive lookup index.
pub(crate) const ALIAS_FOLDED: TableDefinition<&str, u64> = TableDefinition::new("alias_folded");

/// (entity id, alias id) -> AliasId.
pub(crate) const ENTITY_ALIASES: TableDefinition<(u64, u64), u64> =
    TableDefinition::new("entity_aliases");

/// Edges: EdgeId -> postcard(Edge).
pub(crate) const EDGES: TableDefinition<u64, &[u8]> = TableDefinition::new("edges");

/// Unique (from, to, kind code) -> EdgeId.
pub(crate) const EDGE_KEYS: TableDefinition<(u64, u64, u8), u64> =
    TableDefinition::new("edge_keys");

/// (entity id, edge id) -> EdgeId, for both endpoints of every edge.
pub(crate) const EDGE_ADJACENCY: TableDefinition<(u64, u64), u64> =
    TableDefinition::new("edge_adjacency");

/// Evidence: EvidenceId -> postcard(GraphEvidence).
pub(crate) const GRAPH_EVIDENCE: TableDefinition<u64, &[u8]> =
    TableDefinition::new("graph_evidence");

/// Unique (target, source url) -> EvidenceId.
pub(crate) const EVIDENCE_KEYS: TableDefinition<&str, u64> = TableDefinition::new("evidence_keys");

/// Frontier tasks: TaskId -> postcard(FrontierTask).
pub(crate) const FRONTIER_TASKS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("frontier_tasks");

/// Unique (job, kind, value) -> TaskId.
pub(crate) const FRONTIER_KEYS: TableDefinition<&str, u64> = TableDefinition::new("frontier_keys");

/// (job, inverted priority, task id) -> TaskId. Only pending tasks live here.
pub(crate) const FRONTIER_PENDING: TableDefinition<&str, u64> =
    TableDefinition::new("frontier_pending");

/// (job, task id) -> TaskId. Every task of a job.
pub(crate) const FRONTIER_JOBS: TableDefinition<&str, u64> = TableDefinition::new("frontier_jobs");

/// Source documents: SourceId -> postcard(SourceDocument).
pub(crate) const SOURCE_DOCUMENTS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("source_documents");

/// (url, source id) -> SourceId.
pub(crate) const SOURCE_URLS: TableDefinition<&str, u64> = TableDefinition::new("source_urls");

/// Unique (url, content hash) -> SourceId.
pub(crate) const SOURCE_HASHES: TableDefinition<&str, u64> = TableDefinition::new("source_hashes");

/// (job, source id) -> SourceId.
pub(crate) const SOURCE_JOBS: TableDefinition<&str, u64> = TableDefinition::new("source_jobs");

/// Claims: ClaimId -> postcard(Claim).
pub(crate) const CLAIMS: TableDefinition<u64, &[u8]> = TableDefinition::new("claims");

/// Unique claim identity -> ClaimId. Suppresses replayed ingestion.
pub(crate) const CLAIM_KEYS: TableDefinition<&str, u64> = TableDefinition::new("claim_keys");

/// (item, field, claim id) -> ClaimId.
pub(crate) const CLAIM_INDEX: TableDefinition<&str, u64> = TableDefinition::new("claim_index");

// =============================================================================
// ERROR CONVERSIONS
// =============================================================================

impl From<DatabaseError> for ClaimGraphError {
    fn from(e: DatabaseError) -> Self {
        Self::IoError(e.to_string())
    }
}

impl From<TransactionError> for ClaimGraphError {
    fn from(e: TransactionError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<TableError> for ClaimGraphError {
    fn from(e: TableError) -> Self {
        match e {
            TableError::TableDoesNotExist(name) => Self::Uninitialized(name),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<StorageError> for ClaimGraphError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<CommitError> for ClaimGraphError {
    fn from(e: CommitError) -> Self {
        Self::Storage(e.to_string())
    }
}

// =============================================================================
// RECORD ENCODING
// =============================================================================

/// Encode a record for storage.
pub(crate) fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>, ClaimGraphError> {
    postcard::to_allocvec(record).map_err(|e| ClaimGraphError::SerializationError(e.to_string()))
}

/// Decode a stored record.
pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ClaimGraphError> {
    postcard::from_bytes(bytes).map_err(|e| ClaimGraphError::DeserializationError(e.to_string()))
}

/// Allocate the next id for `counter` inside the caller's write transaction.
///
/// Ids start at 1 and are never reused.
pub(crate) fn next_id(txn: &WriteTransaction, counter: &str) -> Result<u64, ClaimGraphError> {
    let mut meta = txn.open_table(META)?;
    let current = meta.get(counter)?.map(|v| v.value()).unwrap_or(1);
    meta.insert(counter, current.saturating_add(1))?;
    Ok(current)
}

// =============================================================================
// STORE
// =============================================================================

/// Handle to the embedded database.
///
/// Cloning is cheap and shares the same database; hand clones to every
/// component and worker thread instead of reaching for a global.
#[derive(Clone)]
pub struct Store {
    /// `None` for a store attached to a path with no database file.
    db: Option<Arc<Database>>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("attached", &self.db.is_some())
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Open or create a database at `path` and create every table.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ClaimGraphError> {
        let db = Database::create(path.as_ref())?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(META)?;
            let _ = write_txn.open_table(ENTITIES)?;
            let _ = write_txn.open_table(ENTITY_NAMES)?;
            let _ = write_txn.open_table(ALIASES)?;
            let _ = write_txn.open_table(ALIAS_KEYS)?;
            let _ = write_txn.open_table(ALIAS_FOLDED)?;
            let _ = write_txn.open_table(ENTITY_ALIASES)?;
            let _ = write_txn.open_table(EDGES)?;
            let _ = write_txn.open_table(EDGE_KEYS)?;
            let _ = write_txn.open_table(EDGE_ADJACENCY)?;
            let _ = write_txn.open_table(GRAPH_EVIDENCE)?;
            let _ = write_txn.open_table(EVIDENCE_KEYS)?;
            let _ = write_txn.open_table(FRONTIER_TASKS)?;
            let _ = write_txn.open_table(FRONTIER_KEYS)?;
            let _ = write_txn.open_table(FRONTIER_PENDING)?;
            let _ = write_txn.open_table(FRONTIER_JOBS)?;
            let _ = write_txn.open_table(SOURCE_DOCUMENTS)?;
            let _ = write_txn.open_table(SOURCE_URLS)?;
            let _ = write_txn.open_table(SOURCE_HASHES)?;
            let _ = write_txn.open_table(SOURCE_JOBS)?;
            let _ = write_txn.open_table(CLAIMS)?;
            let _ = write_txn.open_table(CLAIM_KEYS)?;
            let _ = write_txn.open_table(CLAIM_INDEX)?;
        }
        write_txn.commit()?;

        tracing::debug!(path = %path.as_ref().display(), "store opened");
        Ok(Self {
            db: Some(Arc::new(db)),
        })
    }

    /// Open an existing database without creating the file or any table.
    ///
    /// Used by read-only consumers that must not initialize the schema. A
    /// missing file yields a store whose transactions fail with
    /// [`ClaimGraphError::Uninitialized`].
    pub fn attach(path: impl AsRef<Path>) -> Result<Self, ClaimGraphError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no database file, attaching empty store");
            return Ok(Self { db: None });
        }
        let db = Database::open(path)?;
        Ok(Self {
            db: Some(Arc::new(db)),
        })
    }

    fn database(&self) -> Result<&Database, ClaimGraphError> {
        self.db
            .as_deref()
            .ok_or_else(|| ClaimGraphError::Uninitialized("database".to_string()))
    }

    /// Begin a write transaction. Blocks while another writer is active.
    pub(crate) fn begin_write(&self) -> Result<WriteTransaction, ClaimGraphError> {
        Ok(self.database()?.begin_write()?)
    }

    /// Begin a read transaction over a consistent snapshot.
    pub(crate) fn begin_read(&self) -> Result<ReadTransaction, ClaimGraphError> {
        Ok(self.database()?.begin_read()?)
    }
}

// =============================================================================
// TESTS
// =============================================================================
