//! Canonical URL graph, per-job pending ledger, and per-job results.
//!
//! The storage layer is the only shared mutable state in the system; every
//! hot-path mutation is a single-statement insert-if-absent or delete so
//! concurrent foremen and workers never need in-process coordination. The
//! record-level operations here are the synchronization primitives that make
//! "a job completes exactly when its last outstanding descendant finishes"
//! hold.

pub mod pg;

pub use pg::PgStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{JobResults, JobStatus};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// One row of the shared, cross-job `url` table.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct UrlRecord {
    pub id: i64,
    pub url: String,
    /// Content type, empty when unknown.
    pub mime: String,
    /// Set by the worker after a successful scrape; never moves backwards.
    pub crawled_on: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Job {
    pub id: i64,
    pub created_on: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct JobUrl {
    pub job_id: i64,
    pub url_id: i64,
    pub completed_on: Option<DateTime<Utc>>,
}

/// Storage contract. All operations are idempotent and safe under concurrent
/// duplicate attempts.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get_url_by_id(&self, url_id: i64) -> Result<Option<UrlRecord>, StorageError>;

    async fn get_url_by_url(&self, url: &str) -> Result<Option<UrlRecord>, StorageError>;

    /// Upsert by URL string. When the row is inserted it gets the supplied
    /// mime; racing callers all observe the same canonical record.
    async fn get_or_add_url(&self, url: &str, mime: &str) -> Result<UrlRecord, StorageError>;

    /// Record that `refer_id`'s page contained a link to `url_id`.
    async fn add_link(&self, url_id: i64, refer_id: i64) -> Result<(), StorageError>;

    /// Set the mime and stamp `crawled_on` with the current time.
    async fn mark_crawled(&self, url_id: i64, mime: &str) -> Result<(), StorageError>;

    /// All URL records one link edge away from `refer_id`.
    async fn get_urls_with_refer(&self, refer_id: i64) -> Result<Vec<UrlRecord>, StorageError>;

    async fn add_pending(
        &self,
        job_id: i64,
        url_id: i64,
        origin_id: i64,
    ) -> Result<(), StorageError>;

    async fn delete_pending(
        &self,
        job_id: i64,
        url_id: i64,
        origin_id: i64,
    ) -> Result<(), StorageError>;

    /// Whether any pending row exists for the job's origin, across all URLs.
    async fn has_pending(&self, job_id: i64, origin_id: i64) -> Result<bool, StorageError>;

    async fn create_job(&self) -> Result<Job, StorageError>;

    async fn get_job(&self, job_id: i64) -> Result<Option<Job>, StorageError>;

    async fn add_job_url(&self, job_id: i64, url_id: i64) -> Result<(), StorageError>;

    /// Stamp `completed_on` if it is currently null.
    async fn mark_job_url_complete(&self, job_id: i64, url_id: i64) -> Result<(), StorageError>;

    /// Complete the seed's job_url row iff no pending rows remain for
    /// `(job_id, origin_id)`. The check and the write happen atomically;
    /// returns whether the row was completed by this call.
    async fn update_job_url_if_complete(
        &self,
        job_id: i64,
        origin_id: i64,
    ) -> Result<bool, StorageError>;

    async fn add_result(
        &self,
        job_id: i64,
        refer_id: i64,
        url_id: i64,
    ) -> Result<(), StorageError>;

    /// Progress snapshot derived from the job_url rows, or `None` when the
    /// job does not exist.
    async fn job_status(&self, job_id: i64) -> Result<Option<JobStatus>, StorageError>;

    /// Results grouped by refer URL, filtered to descendants whose mime
    /// begins with `mime_prefix` (empty prefix selects everything).
    async fn job_results(
        &self,
        job_id: i64,
        mime_prefix: &str,
    ) -> Result<JobResults, StorageError>;
}
