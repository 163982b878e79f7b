//! Job submission and the read views over storage.
//!
//! Scheduling registers each seed as its own pending origin before the seed
//! task is published, so a job can never look complete before its first task
//! has even been consumed.

use std::sync::Arc;
use url::Url;

use crate::models::{JobResults, JobStatus, UrlQueueItem};
use crate::queue::{Publisher, QueueError};
use crate::storage::{Storage, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("no URLs provided")]
    NoUrls,
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

#[derive(Clone)]
pub struct JobService {
    storage: Arc<dyn Storage>,
    url_queue: Arc<dyn Publisher>,
}

impl JobService {
    pub fn new(storage: Arc<dyn Storage>, url_queue: Arc<dyn Publisher>) -> Self {
        JobService { storage, url_queue }
    }

    /// Create a job for the given seed URLs and queue one level-0 task per
    /// seed. Returns the new job id.
    pub async fn schedule(
        &self,
        seed_urls: &[String],
        force_crawl: bool,
    ) -> Result<i64, ScheduleError> {
        if seed_urls.is_empty() {
            return Err(ScheduleError::NoUrls);
        }

        let job = self.storage.create_job().await?;

        for seed in seed_urls {
            let url = self.storage.get_or_add_url(seed, "").await?;
            // The seed is its own origin.
            self.storage.add_pending(job.id, url.id, url.id).await?;
            self.storage.add_job_url(job.id, url.id).await?;
            self.url_queue
                .send(&UrlQueueItem::seed(job.id, url.id, force_crawl))
                .await?;
        }

        tracing::info!(
            job_id = job.id,
            seeds = seed_urls.len(),
            force_crawl,
            "job scheduled"
        );

        Ok(job.id)
    }

    pub async fn status(&self, job_id: i64) -> Result<Option<JobStatus>, StorageError> {
        self.storage.job_status(job_id).await
    }

    /// Results for a job, or `None` when the job does not exist.
    pub async fn results(
        &self,
        job_id: i64,
        mime_prefix: &str,
    ) -> Result<Option<JobResults>, StorageError> {
        if self.storage.get_job(job_id).await?.is_none() {
            return Ok(None);
        }
        Ok(Some(self.storage.job_results(job_id, mime_prefix).await?))
    }
}

/// Parse a newline-separated URL list from a request body. Blank lines are
/// skipped, duplicates collapse, and any invalid URL rejects the whole
/// submission.
pub fn parse_job_urls(body: &str) -> Result<Vec<String>, ScheduleError> {
    let mut urls = Vec::new();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let url = validate_job_url(line)?;
        if !urls.contains(&url) {
            urls.push(url);
        }
    }

    if urls.is_empty() {
        return Err(ScheduleError::NoUrls);
    }
    Ok(urls)
}

/// A seed must have a host and an http(s) scheme; a missing scheme defaults
/// to http so plain `www.example.com` input works.
fn validate_job_url(raw: &str) -> Result<String, ScheduleError> {
    if raw.starts_with('/') {
        return Err(ScheduleError::InvalidUrl(raw.to_string()));
    }

    let parsed = match Url::parse(raw) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("http://{raw}"))
                .map_err(|_| ScheduleError::InvalidUrl(raw.to_string()))?
        }
        Err(_) => return Err(ScheduleError::InvalidUrl(raw.to_string())),
    };

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ScheduleError::InvalidUrl(raw.to_string()));
    }
    if parsed.host_str().is_none() {
        return Err(ScheduleError::InvalidUrl(raw.to_string()));
    }

    Ok(parsed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_one_url_per_line() {
        let urls = parse_job_urls("http://a/\nhttps://b/\n\n").unwrap();
        assert_eq!(urls, vec!["http://a/", "https://b/"]);
    }

    #[test]
    fn deduplicates_input() {
        let urls = parse_job_urls("http://a/\nhttp://a/").unwrap();
        assert_eq!(urls, vec!["http://a/"]);
    }

    #[test]
    fn defaults_missing_scheme_to_http() {
        let urls = parse_job_urls("www.example.com").unwrap();
        assert_eq!(urls, vec!["http://www.example.com/"]);
    }

    #[test]
    fn rejects_bare_paths() {
        assert!(matches!(
            parse_job_urls("/no/host"),
            Err(ScheduleError::InvalidUrl(_))
        ));
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert!(matches!(
            parse_job_urls("ftp://example.com/"),
            Err(ScheduleError::InvalidUrl(_))
        ));
    }

    #[test]
    fn rejects_empty_body() {
        assert!(matches!(parse_job_urls("\n \n"), Err(ScheduleError::NoUrls)));
    }
}
