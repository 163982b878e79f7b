//! Postgres implementation of the storage contract.
//!
//! Every mutation used on the hot path is a single statement, so the
//! database serializes concurrent foremen and workers without any help from
//! the processes themselves.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::BTreeMap;

use super::{Job, Storage, StorageError, UrlRecord};
use crate::config::StorageConfig;
use crate::models::{JobResults, JobStatus};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS url (
        id         BIGSERIAL    PRIMARY KEY,
        url        TEXT         NOT NULL UNIQUE,
        mime       TEXT         NOT NULL DEFAULT '',
        crawled_on TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS url_link (
        url_id   BIGINT NOT NULL,
        refer_id BIGINT NOT NULL,
        PRIMARY KEY (url_id, refer_id)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS url_link_refer_idx ON url_link (refer_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS job (
        id         BIGSERIAL   PRIMARY KEY,
        created_on TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS job_url (
        job_id       BIGINT NOT NULL,
        url_id       BIGINT NOT NULL,
        completed_on TIMESTAMPTZ,
        PRIMARY KEY (job_id, url_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS url_pending (
        job_id    BIGINT NOT NULL,
        url_id    BIGINT NOT NULL,
        origin_id BIGINT NOT NULL,
        PRIMARY KEY (job_id, url_id, origin_id)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS url_pending_origin_idx ON url_pending (job_id, origin_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS job_result (
        job_id   BIGINT NOT NULL,
        refer_id BIGINT NOT NULL,
        url_id   BIGINT NOT NULL,
        PRIMARY KEY (job_id, refer_id, url_id)
    )
    "#,
];

#[derive(Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub async fn connect(config: &StorageConfig) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(&config.conn_url())
            .await?;
        Ok(PgStorage { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        PgStorage { pool }
    }

    /// Create the tables and indexes if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StorageError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn get_url_by_id(&self, url_id: i64) -> Result<Option<UrlRecord>, StorageError> {
        let row = sqlx::query_as::<_, UrlRecord>(
            "SELECT id, url, mime, crawled_on FROM url WHERE id = $1",
        )
        .bind(url_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_url_by_url(&self, url: &str) -> Result<Option<UrlRecord>, StorageError> {
        let row = sqlx::query_as::<_, UrlRecord>(
            "SELECT id, url, mime, crawled_on FROM url WHERE url = $1",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_or_add_url(&self, url: &str, mime: &str) -> Result<UrlRecord, StorageError> {
        // Single statement so racing callers all get the same canonical row.
        // The no-op DO UPDATE makes RETURNING yield the existing row (with
        // its original mime) when the insert loses the race.
        let row = sqlx::query_as::<_, UrlRecord>(
            r#"
            INSERT INTO url (url, mime) VALUES ($1, $2)
            ON CONFLICT (url) DO UPDATE SET url = EXCLUDED.url
            RETURNING id, url, mime, crawled_on
            "#,
        )
        .bind(url)
        .bind(mime)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn add_link(&self, url_id: i64, refer_id: i64) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO url_link (url_id, refer_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(url_id)
        .bind(refer_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_crawled(&self, url_id: i64, mime: &str) -> Result<(), StorageError> {
        sqlx::query("UPDATE url SET mime = $2, crawled_on = now() WHERE id = $1")
            .bind(url_id)
            .bind(mime)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_urls_with_refer(&self, refer_id: i64) -> Result<Vec<UrlRecord>, StorageError> {
        let rows = sqlx::query_as::<_, UrlRecord>(
            r#"
            SELECT u.id, u.url, u.mime, u.crawled_on
            FROM url u
            JOIN url_link l ON l.url_id = u.id
            WHERE l.refer_id = $1
            ORDER BY u.id
            "#,
        )
        .bind(refer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn add_pending(
        &self,
        job_id: i64,
        url_id: i64,
        origin_id: i64,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO url_pending (job_id, url_id, origin_id)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(job_id)
        .bind(url_id)
        .bind(origin_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_pending(
        &self,
        job_id: i64,
        url_id: i64,
        origin_id: i64,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "DELETE FROM url_pending WHERE job_id = $1 AND url_id = $2 AND origin_id = $3",
        )
        .bind(job_id)
        .bind(url_id)
        .bind(origin_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn has_pending(&self, job_id: i64, origin_id: i64) -> Result<bool, StorageError> {
        let row = sqlx::query_as::<_, (bool,)>(
            "SELECT exists(SELECT 1 FROM url_pending WHERE job_id = $1 AND origin_id = $2)",
        )
        .bind(job_id)
        .bind(origin_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    async fn create_job(&self) -> Result<Job, StorageError> {
        let job = sqlx::query_as::<_, Job>(
            "INSERT INTO job DEFAULT VALUES RETURNING id, created_on",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(job)
    }

    async fn get_job(&self, job_id: i64) -> Result<Option<Job>, StorageError> {
        let job = sqlx::query_as::<_, Job>("SELECT id, created_on FROM job WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    async fn add_job_url(&self, job_id: i64, url_id: i64) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO job_url (job_id, url_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(job_id)
        .bind(url_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_job_url_complete(&self, job_id: i64, url_id: i64) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            UPDATE job_url SET completed_on = now()
            WHERE job_id = $1 AND url_id = $2 AND completed_on IS NULL
            "#,
        )
        .bind(job_id)
        .bind(url_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_job_url_if_complete(
        &self,
        job_id: i64,
        origin_id: i64,
    ) -> Result<bool, StorageError> {
        // The pending check and the completion write share one statement so
        // a pending row inserted by a concurrent worker cannot slip between
        // them.
        let result = sqlx::query(
            r#"
            UPDATE job_url SET completed_on = now()
            WHERE job_id = $1 AND url_id = $2 AND completed_on IS NULL
              AND NOT EXISTS (
                  SELECT 1 FROM url_pending
                  WHERE job_id = $1 AND origin_id = $2
              )
            "#,
        )
        .bind(job_id)
        .bind(origin_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn add_result(
        &self,
        job_id: i64,
        refer_id: i64,
        url_id: i64,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO job_result (job_id, refer_id, url_id)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(job_id)
        .bind(refer_id)
        .bind(url_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn job_status(&self, job_id: i64) -> Result<Option<JobStatus>, StorageError> {
        let Some(job) = self.get_job(job_id).await? else {
            return Ok(None);
        };

        let seeds = sqlx::query_as::<_, (String, Option<chrono::DateTime<Utc>>)>(
            r#"
            SELECT u.url, ju.completed_on
            FROM job_url ju
            JOIN url u ON u.id = ju.url_id
            WHERE ju.job_id = $1
            ORDER BY u.url
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(build_status(&job, &seeds)))
    }

    async fn job_results(
        &self,
        job_id: i64,
        mime_prefix: &str,
    ) -> Result<JobResults, StorageError> {
        let rows = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT DISTINCT ru.url AS refer, uu.url AS url
            FROM job_result jr
            JOIN url ru ON ru.id = jr.refer_id
            JOIN url uu ON uu.id = jr.url_id
            WHERE jr.job_id = $1 AND uu.mime LIKE $2 || '%'
            ORDER BY refer, url
            "#,
        )
        .bind(job_id)
        .bind(mime_prefix)
        .fetch_all(&self.pool)
        .await?;

        let mut results: JobResults = BTreeMap::new();
        for (refer, url) in rows {
            results.entry(refer).or_default().push(url);
        }
        Ok(results)
    }
}

/// Derive the status snapshot from a job and its `(seed url, completed_on)`
/// rows. The elapsed clock stops at the last seed completion once everything
/// is done.
pub fn build_status(job: &Job, seeds: &[(String, Option<chrono::DateTime<Utc>>)]) -> JobStatus {
    let completed = seeds.iter().filter(|(_, done)| done.is_some()).count();
    let pending = seeds.len() - completed;

    let end = if pending == 0 {
        seeds
            .iter()
            .filter_map(|(_, done)| *done)
            .max()
            .unwrap_or_else(Utc::now)
    } else {
        Utc::now()
    };
    let elapsed = (end - job.created_on).to_std().unwrap_or_default();

    JobStatus {
        job_id: job.id,
        completed,
        pending,
        elapsed,
        urls: seeds
            .iter()
            .map(|(url, done)| (url.clone(), done.is_some()))
            .collect(),
    }
}
