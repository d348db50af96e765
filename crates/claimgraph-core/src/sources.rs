//! # Source Documents
//!
//! Store of fetched pages. Each document is addressed by its URL and the
//! SHA-256 of its raw content; recording the same content for the same URL
//! again returns the stored document with its crawl time and status updated.
//!
//! The cache window decides whether a caller may reuse a stored document or
//! must fetch the URL again.

use crate::normalize::{compose_key, domain_of, normalize_domain, padded, prefix_bounds};
use crate::normalize::{validate_key, validate_value};
use crate::primitives::SOURCE_CACHE_WINDOW_HOURS;
use crate::storage::{
    SOURCE_DOCUMENTS, SOURCE_HASHES, SOURCE_JOBS, SOURCE_URLS, Store, decode, encode, next_id,
};
use crate::{ClaimGraphError, SourceId};
use chrono::{DateTime, Duration, Utc};
use redb::{ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Outcome of fetching a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Fetched,
    Failed,
}

/// A stored source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub id: SourceId,
    pub job_id: String,
    pub url: String,
    pub domain: String,
    pub raw_content: String,
    pub content_hash: String,
    pub status: DocumentStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub crawled_at: DateTime<Utc>,
}

/// Input for [`SourceStore::record`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSourceDocument {
    pub job_id: String,
    pub url: String,
    /// Derived from `url` when absent.
    #[serde(default)]
    pub domain: Option<String>,
    pub raw_content: String,
    #[serde(default = "default_status")]
    pub status: DocumentStatus,
}

fn default_status() -> DocumentStatus {
    DocumentStatus::Fetched
}

/// SHA-256 of `content`, hex encoded.
#[must_use]
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Persistence for fetched documents.
#[derive(Debug, Clone)]
pub struct SourceStore {
    store: Store,
    cache_window: Duration,
}

impl SourceStore {
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self {
            store,
            cache_window: Duration::hours(SOURCE_CACHE_WINDOW_HOURS),
        }
    }

    /// Override the reuse window.
    #[must_use]
    pub fn with_cache_window(mut self, window: Duration) -> Self {
        self.cache_window = window;
        self
    }

    /// Persist a document, or refresh and return the stored one with identical
    /// content.
    pub fn record(&self, doc: NewSourceDocument) -> Result<SourceDocument, ClaimGraphError> {
        self.record_at(doc, Utc::now())
    }

    /// [`SourceStore::record`] with an explicit crawl time.
    pub fn record_at(
        &self,
        doc: NewSourceDocument,
        crawled_at: DateTime<Utc>,
    ) -> Result<SourceDocument, ClaimGraphError> {
        validate_key("job_id", &doc.job_id)?;
        validate_value("url", &doc.url)?;

        let domain = match doc.domain.as_deref() {
            Some(d) if !d.trim().is_empty() => normalize_domain(d),
            _ => domain_of(&doc.url).ok_or_else(|| {
                ClaimGraphError::InvalidInput(format!("cannot derive domain from '{}'", doc.url))
            })?,
        };
        validate_key("domain", &domain)?;

        let hash = content_hash(&doc.raw_content);
        let hash_key = compose_key(&[&doc.url, &hash]);

        let txn = self.store.begin_write()?;
        let existing_id = {
            let hashes = txn.open_table(SOURCE_HASHES)?;
            hashes.get(hash_key.as_str())?.map(|guard| guard.value())
        };
        if let Some(id) = existing_id {
            let previous: Option<SourceDocument> = {
                let documents = txn.open_table(SOURCE_DOCUMENTS)?;
                match documents.get(id)? {
                    Some(bytes) => Some(decode(bytes.value())?),
                    None => None,
                }
            };
            if let Some(mut refreshed) = previous {
                // Unchanged content still counts as a fresh crawl.
                refreshed.crawled_at = refreshed.crawled_at.max(crawled_at);
                refreshed.status = doc.status;
                {
                    let mut documents = txn.open_table(SOURCE_DOCUMENTS)?;
                    let bytes = encode(&refreshed)?;
                    documents.insert(id, bytes.as_slice())?;

                    let mut jobs = txn.open_table(SOURCE_JOBS)?;
                    jobs.insert(compose_key(&[&doc.job_id, &padded(id)]).as_str(), id)?;
                }
                txn.commit()?;
                tracing::debug!(url = %doc.url, source_id = id, "unchanged source document refreshed");
                return Ok(refreshed);
            }
        }

        let id = SourceId(next_id(&txn, "source_document")?);
        let stored = SourceDocument {
            id,
            job_id: doc.job_id,
            url: doc.url,
            domain,
            raw_content: doc.raw_content,
            content_hash: hash,
            status: doc.status,
            crawled_at,
        };

        {
            let mut documents = txn.open_table(SOURCE_DOCUMENTS)?;
            let bytes = encode(&stored)?;
            documents.insert(id.0, bytes.as_slice())?;

            let mut hashes = txn.open_table(SOURCE_HASHES)?;
            hashes.insert(hash_key.as_str(), id.0)?;

            let mut urls = txn.open_table(SOURCE_URLS)?;
            urls.insert(compose_key(&[&stored.url, &padded(id.0)]).as_str(), id.0)?;

            let mut jobs = txn.open_table(SOURCE_JOBS)?;
            jobs.insert(compose_key(&[&stored.job_id, &padded(id.0)]).as_str(), id.0)?;
        }
        txn.commit()?;

        tracing::debug!(job_id = %stored.job_id, url = %stored.url, source_id = %id, "source document recorded");
        Ok(stored)
    }

    /// Fetch a document by id.
    pub fn get(&self, id: SourceId) -> Result<Option<SourceDocument>, ClaimGraphError> {
        let txn = self.store.begin_read()?;
        let documents = txn.open_table(SOURCE_DOCUMENTS)?;
        match documents.get(id.0)? {
            Some(bytes) => Ok(Some(decode(bytes.value())?)),
            None => Ok(None),
        }
    }

    /// Newest successfully fetched document for `url` still inside the cache window.
    pub fn fresh_for(
        &self,
        url: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SourceDocument>, ClaimGraphError> {
        validate_value("url", url)?;
        let cutoff = now - self.cache_window;

        let newest = self
            .scan(SOURCE_URLS, url)?
            .into_iter()
            .filter(|doc| doc.status == DocumentStatus::Fetched && doc.crawled_at >= cutoff)
            .max_by_key(|doc| (doc.crawled_at, doc.id));
        Ok(newest)
    }

    /// Every document recorded for a job, in insertion order.
    pub fn for_job(&self, job_id: &str) -> Result<Vec<SourceDocument>, ClaimGraphError> {
        validate_key("job_id", job_id)?;
        self.scan(SOURCE_JOBS, job_id)
    }

    /// Load the documents listed under `prefix` in a `key ␟ id` index.
    fn scan(
        &self,
        index: TableDefinition<'static, &'static str, u64>,
        prefix: &str,
    ) -> Result<Vec<SourceDocument>, ClaimGraphError> {
        let (start, end) = prefix_bounds(prefix);
        let txn = self.store.begin_read()?;
        let table = txn.open_table(index)?;
        let documents = txn.open_table(SOURCE_DOCUMENTS)?;

        let mut found = Vec::new();
        for entry in table.range(start.as_str()..end.as_str())? {
            let (_, id) = entry?;
            if let Some(bytes) = documents.get(id.value())? {
                found.push(decode(bytes.value())?);
            }
        }
        Ok(found)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sources() -> (tempfile::TempDir, SourceStore) {
        let temp = tempdir().expect("temp dir");
        let store = Store::open(temp.path().join("sources.redb")).expect("open");
        (temp, SourceStore::new(store))
    }

    fn page(url: &str, content: &str) -> NewSourceDocument {
        NewSourceDocument {
            job_id: "job-1".into(),
            url: url.into(),
            domain: None,
            raw_content: content.into(),
            status: DocumentStatus::Fetched,
        }
    }

    #[test]
    fn record_derives_domain_and_hash() {
        let (_temp, sources) = sources();
        let doc = sources
            .record(page("https://www.nix.ru/ce285a.html", "<html>10200 pages</html>"))
            .unwrap();
        assert_eq!(doc.domain, "nix.ru");
        assert_eq!(doc.content_hash.len(), 64);
        assert_eq!(sources.get(doc.id).unwrap(), Some(doc));
    }

    #[test]
    fn record_is_idempotent_on_url_and_content() {
        let (_temp, sources) = sources();
        let a = sources.record(page("https://nix.ru/a", "same")).unwrap();
        let b = sources.record(page("https://nix.ru/a", "same")).unwrap();
        let c = sources.record(page("https://nix.ru/a", "changed")).unwrap();
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_eq!(sources.for_job("job-1").unwrap().len(), 2);
    }

    #[test]
    fn fresh_for_honours_cache_window() {
        let (_temp, sources) = sources();
        let now = Utc::now();
        sources
            .record_at(page("https://nix.ru/a", "old"), now - Duration::hours(30))
            .unwrap();
        assert!(sources.fresh_for("https://nix.ru/a", now).unwrap().is_none());

        let recent = sources
            .record_at(page("https://nix.ru/a", "new"), now - Duration::hours(2))
            .unwrap();
        assert_eq!(
            sources.fresh_for("https://nix.ru/a", now).unwrap().map(|d| d.id),
            Some(recent.id)
        );
        assert!(sources.fresh_for("https://nix.ru/ab", now).unwrap().is_none());
    }

    #[test]
    fn recrawl_of_unchanged_content_is_fresh_again() {
        let (_temp, sources) = sources();
        let now = Utc::now();
        let first = sources
            .record_at(page("https://nix.ru/a", "same"), now - Duration::hours(30))
            .unwrap();
        assert!(sources.fresh_for("https://nix.ru/a", now).unwrap().is_none());

        let again = sources.record_at(page("https://nix.ru/a", "same"), now).unwrap();
        assert_eq!(again.id, first.id);
        assert!(again.crawled_at > first.crawled_at);
        assert_eq!(
            sources.fresh_for("https://nix.ru/a", now).unwrap().map(|d| d.id),
            Some(first.id)
        );
    }

    #[test]
    fn older_recrawl_does_not_move_crawl_time_back() {
        let (_temp, sources) = sources();
        let now = Utc::now();
        sources.record_at(page("https://nix.ru/a", "same"), now).unwrap();
        sources
            .record_at(page("https://nix.ru/a", "same"), now - Duration::hours(30))
            .unwrap();
        assert!(sources.fresh_for("https://nix.ru/a", now).unwrap().is_some());
    }

    #[test]
    fn failed_fetch_is_never_fresh() {
        let (_temp, sources) = sources();
        let mut failed = page("https://nix.ru/down", "");
        failed.status = DocumentStatus::Failed;
        sources.record(failed).unwrap();
        assert!(sources.fresh_for("https://nix.ru/down", Utc::now()).unwrap().is_none());
    }

    #[test]
    fn explicit_domain_is_normalized() {
        let (_temp, sources) = sources();
        let mut doc = page("https://cdn.example.net/x", "x");
        doc.domain = Some("WWW.Example.NET".into());
        assert_eq!(sources.record(doc).unwrap().domain, "example.net");
    }

    #[test]
    fn unparsable_url_without_domain_is_rejected() {
        let (_temp, sources) = sources();
        let err = sources.record(page("not a url", "x")).unwrap_err();
        assert!(matches!(err, ClaimGraphError::InvalidInput(_)));
    }
}
