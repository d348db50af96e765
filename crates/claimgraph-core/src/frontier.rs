//! # Frontier
//!
//! Per-job prioritized queue of discovery and fetch tasks.
//!
//! ## Guarantees
//!
//! - `add` is idempotent on `(job_id, kind, value)`
//! - `next` / `next_batch` claim tasks exactly once: the lookup of the best
//!   pending task and its flip to `processing` happen inside one redb write
//!   transaction, and redb admits one writer at a time
//! - Higher priority first; equal priorities are served in insertion order
//! - `completed` and `failed` are terminal
//!
//! ## Index layout
//!
//! `frontier_pending` holds only pending tasks, keyed by
//! `job ␟ inverted priority ␟ task id`, so the first key in a job's range is
//! always the next task to hand out.

use crate::normalize::{compose_key, padded, prefix_bounds, validate_key, validate_value};
use crate::primitives::MAX_BATCH_CLAIM;
use crate::storage::{
    FRONTIER_JOBS, FRONTIER_KEYS, FRONTIER_PENDING, FRONTIER_TASKS, Store, decode, encode, next_id,
};
use crate::{ClaimGraphError, Metadata, TaskId};
use chrono::{DateTime, Duration, Utc};
use redb::{ReadableTable, WriteTransaction};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// TASK TYPES
// =============================================================================

/// What a frontier task asks the crawler to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Query,
    Url,
    DomainCrawl,
    DeepCrawl,
    Agent,
    Enrichment,
}

impl TaskKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Url => "url",
            Self::DomainCrawl => "domain_crawl",
            Self::DeepCrawl => "deep_crawl",
            Self::Agent => "agent",
            Self::Enrichment => "enrichment",
        }
    }
}

impl FromStr for TaskKind {
    type Err = ClaimGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "query" => Ok(Self::Query),
            "url" => Ok(Self::Url),
            "domain_crawl" => Ok(Self::DomainCrawl),
            "deep_crawl" => Ok(Self::DeepCrawl),
            "agent" => Ok(Self::Agent),
            "enrichment" => Ok(Self::Enrichment),
            other => Err(ClaimGraphError::InvalidInput(format!(
                "unknown task kind '{other}'"
            ))),
        }
    }
}

/// Lifecycle state of a frontier task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// `completed` and `failed` never change again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored frontier task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontierTask {
    pub id: TaskId,
    pub job_id: String,
    pub kind: TaskKind,
    pub value: String,
    pub status: TaskStatus,
    pub priority: i64,
    pub depth: u32,
    pub meta: Metadata,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Input for [`Frontier::add`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub job_id: String,
    pub kind: TaskKind,
    pub value: String,
    pub priority: i64,
    pub depth: u32,
    pub meta: Metadata,
}

impl NewTask {
    /// A task with priority 0, depth 0 and no metadata.
    pub fn new(job_id: impl Into<String>, kind: TaskKind, value: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            kind,
            value: value.into(),
            priority: 0,
            depth: 0,
            meta: Metadata::new(),
        }
    }

    #[must_use]
    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    #[must_use]
    pub fn meta(mut self, meta: Metadata) -> Self {
        self.meta = meta;
        self
    }
}

/// Task counts for one job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontierStats {
    pub job_id: String,
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub total: u64,
}

// =============================================================================
// KEY HELPERS
// =============================================================================

/// Map a signed priority onto a key part where higher priorities sort first.
fn priority_part(priority: i64) -> String {
    let ordered = (priority as u64) ^ (1u64 << 63);
    padded(u64::MAX - ordered)
}

fn pending_key(task: &FrontierTask) -> String {
    compose_key(&[
        &task.job_id,
        &priority_part(task.priority),
        &padded(task.id.0),
    ])
}

fn job_key(job_id: &str, id: TaskId) -> String {
    compose_key(&[job_id, &padded(id.0)])
}

fn load_task(txn: &WriteTransaction, id: TaskId) -> Result<FrontierTask, ClaimGraphError> {
    let tasks = txn.open_table(FRONTIER_TASKS)?;
    let bytes = tasks
        .get(id.0)?
        .ok_or_else(|| ClaimGraphError::NotFound(format!("task {id}")))?;
    decode(bytes.value())
}

fn save_task(txn: &WriteTransaction, task: &FrontierTask) -> Result<(), ClaimGraphError> {
    let mut tasks = txn.open_table(FRONTIER_TASKS)?;
    let bytes = encode(task)?;
    tasks.insert(task.id.0, bytes.as_slice())?;
    Ok(())
}

// =============================================================================
// FRONTIER
// =============================================================================

/// The crawl frontier. Cheap to clone; all clones share one store.
#[derive(Debug, Clone)]
pub struct Frontier {
    store: Store,
}

impl Frontier {
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Enqueue a task. Returns `None` when `(job_id, kind, value)` already exists.
    pub fn add(&self, task: NewTask) -> Result<Option<FrontierTask>, ClaimGraphError> {
        validate_key("job_id", &task.job_id)?;
        validate_value("value", &task.value)?;

        let dedup_key = compose_key(&[&task.job_id, task.kind.as_str(), &task.value]);

        let txn = self.store.begin_write()?;
        {
            let keys = txn.open_table(FRONTIER_KEYS)?;
            if keys.get(dedup_key.as_str())?.is_some() {
                tracing::debug!(job_id = %task.job_id, kind = task.kind.as_str(), "duplicate frontier task ignored");
                return Ok(None);
            }
        }

        let id = TaskId(next_id(&txn, "frontier_task")?);
        let stored = FrontierTask {
            id,
            job_id: task.job_id,
            kind: task.kind,
            value: task.value,
            status: TaskStatus::Pending,
            priority: task.priority,
            depth: task.depth,
            meta: task.meta,
            created_at: Utc::now(),
            claimed_at: None,
            completed_at: None,
        };

        save_task(&txn, &stored)?;
        {
            let mut keys = txn.open_table(FRONTIER_KEYS)?;
            keys.insert(dedup_key.as_str(), id.0)?;
            let mut pending = txn.open_table(FRONTIER_PENDING)?;
            pending.insert(pending_key(&stored).as_str(), id.0)?;
            let mut jobs = txn.open_table(FRONTIER_JOBS)?;
            jobs.insert(job_key(&stored.job_id, id).as_str(), id.0)?;
        }
        txn.commit()?;

        tracing::debug!(job_id = %stored.job_id, task_id = %id, priority = stored.priority, "frontier task added");
        Ok(Some(stored))
    }

    /// Claim the highest-priority pending task of `job_id`.
    pub fn next(&self, job_id: &str) -> Result<Option<FrontierTask>, ClaimGraphError> {
        Ok(self.next_batch(job_id, 1)?.into_iter().next())
    }

    /// Claim up to `limit` pending tasks of `job_id` in queue order.
    ///
    /// `limit` is capped at [`MAX_BATCH_CLAIM`].
    pub fn next_batch(
        &self,
        job_id: &str,
        limit: usize,
    ) -> Result<Vec<FrontierTask>, ClaimGraphError> {
        validate_key("job_id", job_id)?;
        let limit = limit.min(MAX_BATCH_CLAIM);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let (start, end) = prefix_bounds(job_id);
        let now = Utc::now();

        let txn = self.store.begin_write()?;
        let picked: Vec<(String, u64)> = {
            let pending = txn.open_table(FRONTIER_PENDING)?;
            let mut picked = Vec::with_capacity(limit);
            for entry in pending.range(start.as_str()..end.as_str())?.take(limit) {
                let (key, value) = entry?;
                picked.push((key.value().to_string(), value.value()));
            }
            picked
        };

        if picked.is_empty() {
            return Ok(Vec::new());
        }

        let mut claimed = Vec::with_capacity(picked.len());
        {
            let mut pending = txn.open_table(FRONTIER_PENDING)?;
            for (key, _) in &picked {
                pending.remove(key.as_str())?;
            }
        }
        for (_, id) in picked {
            let mut task = load_task(&txn, TaskId(id))?;
            task.status = TaskStatus::Processing;
            task.claimed_at = Some(now);
            save_task(&txn, &task)?;
            claimed.push(task);
        }
        txn.commit()?;

        tracing::debug!(job_id, claimed = claimed.len(), "frontier tasks claimed");
        Ok(claimed)
    }

    /// Move a processing task to a terminal status.
    ///
    /// Repeating the same terminal status is a no-op; any other transition is
    /// rejected with [`ClaimGraphError::InvalidTransition`].
    pub fn complete(
        &self,
        task_id: TaskId,
        status: TaskStatus,
    ) -> Result<FrontierTask, ClaimGraphError> {
        if !status.is_terminal() {
            return Err(ClaimGraphError::InvalidInput(format!(
                "'{status}' is not a terminal status"
            )));
        }

        let txn = self.store.begin_write()?;
        let mut task = load_task(&txn, task_id)?;

        if task.status == status {
            return Ok(task);
        }
        if task.status != TaskStatus::Processing {
            return Err(ClaimGraphError::InvalidTransition {
                task: task_id,
                from: task.status.to_string(),
                to: status.to_string(),
            });
        }

        task.status = status;
        task.completed_at = Some(Utc::now());
        save_task(&txn, &task)?;
        txn.commit()?;

        tracing::debug!(job_id = %task.job_id, task_id = %task_id, status = status.as_str(), "frontier task completed");
        Ok(task)
    }

    /// Fetch a task by id.
    pub fn get(&self, task_id: TaskId) -> Result<Option<FrontierTask>, ClaimGraphError> {
        let txn = self.store.begin_read()?;
        let tasks = txn.open_table(FRONTIER_TASKS)?;
        match tasks.get(task_id.0)? {
            Some(bytes) => Ok(Some(decode(bytes.value())?)),
            None => Ok(None),
        }
    }

    /// Count the tasks of `job_id` by status.
    pub fn stats(&self, job_id: &str) -> Result<FrontierStats, ClaimGraphError> {
        validate_key("job_id", job_id)?;
        let (start, end) = prefix_bounds(job_id);

        let txn = self.store.begin_read()?;
        let jobs = txn.open_table(FRONTIER_JOBS)?;
        let tasks = txn.open_table(FRONTIER_TASKS)?;

        let mut stats = FrontierStats {
            job_id: job_id.to_string(),
            ..FrontierStats::default()
        };
        for entry in jobs.range(start.as_str()..end.as_str())? {
            let (_, id) = entry?;
            let Some(bytes) = tasks.get(id.value())? else {
                continue;
            };
            let task: FrontierTask = decode(bytes.value())?;
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Processing => stats.processing += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
            }
            stats.total += 1;
        }
        Ok(stats)
    }

    /// Return tasks stuck in `processing` for longer than `older_than` to the queue.
    pub fn reclaim_stale(&self, older_than: Duration) -> Result<usize, ClaimGraphError> {
        self.reclaim_claimed_before(Utc::now() - older_than)
    }

    /// Return every processing task claimed before `cutoff` to `pending`.
    ///
    /// A reclaimed task keeps its original queue position.
    pub fn reclaim_claimed_before(&self, cutoff: DateTime<Utc>) -> Result<usize, ClaimGraphError> {
        let txn = self.store.begin_write()?;
        let stale: Vec<FrontierTask> = {
            let tasks = txn.open_table(FRONTIER_TASKS)?;
            let mut stale = Vec::new();
            for entry in tasks.iter()? {
                let (_, bytes) = entry?;
                let task: FrontierTask = decode(bytes.value())?;
                let expired = task.status == TaskStatus::Processing
                    && task.claimed_at.is_some_and(|at| at < cutoff);
                if expired {
                    stale.push(task);
                }
            }
            stale
        };

        if stale.is_empty() {
            return Ok(0);
        }

        for mut task in stale.iter().cloned() {
            task.status = TaskStatus::Pending;
            task.claimed_at = None;
            save_task(&txn, &task)?;
        }
        {
            let mut pending = txn.open_table(FRONTIER_PENDING)?;
            for task in &stale {
                pending.insert(pending_key(task).as_str(), task.id.0)?;
            }
        }
        txn.commit()?;

        tracing::info!(reclaimed = stale.len(), "stale frontier tasks returned to queue");
        Ok(stale.len())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    fn frontier() -> (tempfile::TempDir, Frontier) {
        let temp = tempdir().expect("temp dir");
        let store = Store::open(temp.path().join("frontier.redb")).expect("open");
        (temp, Frontier::new(store))
    }

    #[test]
    fn add_is_idempotent() {
        let (_temp, frontier) = frontier();
        let first = frontier
            .add(NewTask::new("job-1", TaskKind::Query, "ce285a toner"))
            .expect("add");
        let second = frontier
            .add(NewTask::new("job-1", TaskKind::Query, "ce285a toner"))
            .expect("add");

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(frontier.stats("job-1").expect("stats").total, 1);
    }

    #[test]
    fn same_value_different_kind_or_job_is_distinct() {
        let (_temp, frontier) = frontier();
        assert!(frontier.add(NewTask::new("job-1", TaskKind::Query, "x")).unwrap().is_some());
        assert!(frontier.add(NewTask::new("job-1", TaskKind::Url, "x")).unwrap().is_some());
        assert!(frontier.add(NewTask::new("job-2", TaskKind::Query, "x")).unwrap().is_some());
    }

    #[test]
    fn next_respects_priority_then_fifo() {
        let (_temp, frontier) = frontier();
        frontier.add(NewTask::new("job-1", TaskKind::Url, "low").priority(1)).unwrap();
        frontier.add(NewTask::new("job-1", TaskKind::Url, "high-a").priority(10)).unwrap();
        frontier.add(NewTask::new("job-1", TaskKind::Url, "high-b").priority(10)).unwrap();
        frontier.add(NewTask::new("job-1", TaskKind::Url, "negative").priority(-5)).unwrap();

        let order: Vec<String> = std::iter::from_fn(|| frontier.next("job-1").unwrap())
            .map(|t| t.value)
            .collect();
        assert_eq!(order, ["high-a", "high-b", "low", "negative"]);
    }

    #[test]
    fn next_is_scoped_to_job() {
        let (_temp, frontier) = frontier();
        frontier.add(NewTask::new("job-1", TaskKind::Query, "a")).unwrap();
        assert!(frontier.next("job-10").unwrap().is_none());
        assert!(frontier.next("job-1").unwrap().is_some());
        assert!(frontier.next("job-1").unwrap().is_none());
    }

    #[test]
    fn next_batch_claims_in_order_and_caps() {
        let (_temp, frontier) = frontier();
        for i in 0..5 {
            frontier
                .add(NewTask::new("job-1", TaskKind::Url, format!("u{i}")).priority(i))
                .unwrap();
        }
        let batch = frontier.next_batch("job-1", 3).unwrap();
        let values: Vec<_> = batch.iter().map(|t| t.value.as_str()).collect();
        assert_eq!(values, ["u4", "u3", "u2"]);
        assert!(batch.iter().all(|t| t.status == TaskStatus::Processing));
        assert_eq!(frontier.next_batch("job-1", 0).unwrap().len(), 0);
        assert_eq!(frontier.next_batch("job-1", 10).unwrap().len(), 2);
    }

    #[test]
    fn complete_transitions() {
        let (_temp, frontier) = frontier();
        let task = frontier
            .add(NewTask::new("job-1", TaskKind::Agent, "research"))
            .unwrap()
            .unwrap();

        let err = frontier.complete(task.id, TaskStatus::Completed).unwrap_err();
        assert!(matches!(err, ClaimGraphError::InvalidTransition { .. }));

        frontier.next("job-1").unwrap();
        let done = frontier.complete(task.id, TaskStatus::Completed).unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert!(done.completed_at.is_some());

        // Same terminal status again is a no-op.
        assert!(frontier.complete(task.id, TaskStatus::Completed).is_ok());
        let err = frontier.complete(task.id, TaskStatus::Failed).unwrap_err();
        assert!(matches!(err, ClaimGraphError::InvalidTransition { .. }));

        let err = frontier.complete(task.id, TaskStatus::Pending).unwrap_err();
        assert!(matches!(err, ClaimGraphError::InvalidInput(_)));
    }

    #[test]
    fn complete_unknown_task_is_not_found() {
        let (_temp, frontier) = frontier();
        let err = frontier.complete(TaskId(42), TaskStatus::Failed).unwrap_err();
        assert!(matches!(err, ClaimGraphError::NotFound(_)));
    }

    #[test]
    fn stats_counts_by_status() {
        let (_temp, frontier) = frontier();
        for v in ["a", "b", "c", "d"] {
            frontier.add(NewTask::new("job-1", TaskKind::Url, v)).unwrap();
        }
        let a = frontier.next("job-1").unwrap().unwrap();
        let b = frontier.next("job-1").unwrap().unwrap();
        frontier.next("job-1").unwrap();
        frontier.complete(a.id, TaskStatus::Completed).unwrap();
        frontier.complete(b.id, TaskStatus::Failed).unwrap();

        let stats = frontier.stats("job-1").unwrap();
        assert_eq!(
            (stats.pending, stats.processing, stats.completed, stats.failed, stats.total),
            (1, 1, 1, 1, 4)
        );
    }

    #[test]
    fn reclaim_returns_stale_tasks_to_their_position() {
        let (_temp, frontier) = frontier();
        frontier.add(NewTask::new("job-1", TaskKind::Url, "first").priority(5)).unwrap();
        frontier.add(NewTask::new("job-1", TaskKind::Url, "second").priority(5)).unwrap();

        let claimed = frontier.next("job-1").unwrap().unwrap();
        assert_eq!(claimed.value, "first");

        assert_eq!(frontier.reclaim_claimed_before(Utc::now() - Duration::hours(1)).unwrap(), 0);
        assert_eq!(frontier.reclaim_claimed_before(Utc::now() + Duration::seconds(1)).unwrap(), 1);

        let again = frontier.next("job-1").unwrap().unwrap();
        assert_eq!(again.id, claimed.id);
    }

    #[test]
    fn rejects_invalid_input() {
        let (_temp, frontier) = frontier();
        assert!(frontier.add(NewTask::new("", TaskKind::Url, "x")).is_err());
        assert!(frontier.add(NewTask::new("job-1", TaskKind::Url, " ")).is_err());
        assert!(
            frontier
                .add(NewTask::new("job-1", TaskKind::Url, "x".repeat(5000)))
                .is_err()
        );
    }

    #[test]
    fn concurrent_next_never_duplicates() {
        let (_temp, frontier) = frontier();
        for i in 0..200 {
            frontier
                .add(NewTask::new("job-1", TaskKind::Url, format!("https://nix.ru/{i}")))
                .unwrap();
        }

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let frontier = frontier.clone();
                std::thread::spawn(move || {
                    let mut ids = Vec::new();
                    while let Some(task) = frontier.next("job-1").unwrap() {
                        ids.push(task.id);
                    }
                    ids
                })
            })
            .collect();

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.join().unwrap());
        }
        let unique: BTreeSet<_> = all.iter().copied().collect();
        assert_eq!(all.len(), 200);
        assert_eq!(unique.len(), 200);
    }
}
