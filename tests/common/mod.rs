//! In-memory doubles for the storage, queue, and HTTP boundaries, used to
//! drive the real foreman/worker code without Postgres, Redis, or a network.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use webharvest::models::{JobResults, JobStatus, UrlQueueItem};
use webharvest::queue::{Publisher, QueueError};
use webharvest::scrape::{FetchedDoc, Fetcher, ScrapeError};
use webharvest::storage::pg::build_status;
use webharvest::storage::{Job, Storage, StorageError, UrlRecord};

// --- Storage ---

#[derive(Default)]
struct Tables {
    urls: Vec<UrlRecord>,
    /// (url_id, refer_id)
    links: HashSet<(i64, i64)>,
    jobs: Vec<Job>,
    /// (job_id, url_id, completed_on)
    job_urls: Vec<(i64, i64, Option<DateTime<Utc>>)>,
    /// (job_id, url_id, origin_id)
    pending: HashSet<(i64, i64, i64)>,
    /// (job_id, refer_id, url_id)
    results: HashSet<(i64, i64, i64)>,
}

/// Storage backed by plain collections under one lock, which makes every
/// operation trivially atomic.
#[derive(Clone, Default)]
pub struct MemStorage {
    tables: Arc<Mutex<Tables>>,
}

impl MemStorage {
    pub fn url_count(&self) -> usize {
        self.tables.lock().unwrap().urls.len()
    }

    pub fn pending_count(&self) -> usize {
        self.tables.lock().unwrap().pending.len()
    }

    pub fn result_rows(&self) -> Vec<(i64, i64, i64)> {
        let mut rows: Vec<_> = self
            .tables
            .lock()
            .unwrap()
            .results
            .iter()
            .copied()
            .collect();
        rows.sort();
        rows
    }
}

#[async_trait]
impl Storage for MemStorage {
    async fn get_url_by_id(&self, url_id: i64) -> Result<Option<UrlRecord>, StorageError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.urls.iter().find(|u| u.id == url_id).cloned())
    }

    async fn get_url_by_url(&self, url: &str) -> Result<Option<UrlRecord>, StorageError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.urls.iter().find(|u| u.url == url).cloned())
    }

    async fn get_or_add_url(&self, url: &str, mime: &str) -> Result<UrlRecord, StorageError> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(existing) = tables.urls.iter().find(|u| u.url == url) {
            return Ok(existing.clone());
        }
        let record = UrlRecord {
            id: tables.urls.len() as i64 + 1,
            url: url.to_string(),
            mime: mime.to_string(),
            crawled_on: None,
        };
        tables.urls.push(record.clone());
        Ok(record)
    }

    async fn add_link(&self, url_id: i64, refer_id: i64) -> Result<(), StorageError> {
        self.tables.lock().unwrap().links.insert((url_id, refer_id));
        Ok(())
    }

    async fn mark_crawled(&self, url_id: i64, mime: &str) -> Result<(), StorageError> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(url) = tables.urls.iter_mut().find(|u| u.id == url_id) {
            url.mime = mime.to_string();
            url.crawled_on = Some(Utc::now());
        }
        Ok(())
    }

    async fn get_urls_with_refer(&self, refer_id: i64) -> Result<Vec<UrlRecord>, StorageError> {
        let tables = self.tables.lock().unwrap();
        let mut kids: Vec<UrlRecord> = tables
            .links
            .iter()
            .filter(|(_, r)| *r == refer_id)
            .filter_map(|(u, _)| tables.urls.iter().find(|rec| rec.id == *u).cloned())
            .collect();
        kids.sort_by_key(|u| u.id);
        Ok(kids)
    }

    async fn add_pending(
        &self,
        job_id: i64,
        url_id: i64,
        origin_id: i64,
    ) -> Result<(), StorageError> {
        self.tables
            .lock()
            .unwrap()
            .pending
            .insert((job_id, url_id, origin_id));
        Ok(())
    }

    async fn delete_pending(
        &self,
        job_id: i64,
        url_id: i64,
        origin_id: i64,
    ) -> Result<(), StorageError> {
        self.tables
            .lock()
            .unwrap()
            .pending
            .remove(&(job_id, url_id, origin_id));
        Ok(())
    }

    async fn has_pending(&self, job_id: i64, origin_id: i64) -> Result<bool, StorageError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .pending
            .iter()
            .any(|(j, _, o)| *j == job_id && *o == origin_id))
    }

    async fn create_job(&self) -> Result<Job, StorageError> {
        let mut tables = self.tables.lock().unwrap();
        let job = Job {
            id: tables.jobs.len() as i64 + 1,
            created_on: Utc::now(),
        };
        tables.jobs.push(job.clone());
        Ok(job)
    }

    async fn get_job(&self, job_id: i64) -> Result<Option<Job>, StorageError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.jobs.iter().find(|j| j.id == job_id).cloned())
    }

    async fn add_job_url(&self, job_id: i64, url_id: i64) -> Result<(), StorageError> {
        let mut tables = self.tables.lock().unwrap();
        if !tables
            .job_urls
            .iter()
            .any(|(j, u, _)| *j == job_id && *u == url_id)
        {
            tables.job_urls.push((job_id, url_id, None));
        }
        Ok(())
    }

    async fn mark_job_url_complete(&self, job_id: i64, url_id: i64) -> Result<(), StorageError> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(row) = tables
            .job_urls
            .iter_mut()
            .find(|(j, u, done)| *j == job_id && *u == url_id && done.is_none())
        {
            row.2 = Some(Utc::now());
        }
        Ok(())
    }

    async fn update_job_url_if_complete(
        &self,
        job_id: i64,
        origin_id: i64,
    ) -> Result<bool, StorageError> {
        // Check and write under the same lock, like the single-statement
        // production version.
        let mut tables = self.tables.lock().unwrap();
        let still_pending = tables
            .pending
            .iter()
            .any(|(j, _, o)| *j == job_id && *o == origin_id);
        if still_pending {
            return Ok(false);
        }
        if let Some(row) = tables
            .job_urls
            .iter_mut()
            .find(|(j, u, done)| *j == job_id && *u == origin_id && done.is_none())
        {
            row.2 = Some(Utc::now());
            return Ok(true);
        }
        Ok(false)
    }

    async fn add_result(
        &self,
        job_id: i64,
        refer_id: i64,
        url_id: i64,
    ) -> Result<(), StorageError> {
        self.tables
            .lock()
            .unwrap()
            .results
            .insert((job_id, refer_id, url_id));
        Ok(())
    }

    async fn job_status(&self, job_id: i64) -> Result<Option<JobStatus>, StorageError> {
        let tables = self.tables.lock().unwrap();
        let Some(job) = tables.jobs.iter().find(|j| j.id == job_id) else {
            return Ok(None);
        };
        let mut seeds: Vec<(String, Option<DateTime<Utc>>)> = tables
            .job_urls
            .iter()
            .filter(|(j, _, _)| *j == job_id)
            .filter_map(|(_, u, done)| {
                tables
                    .urls
                    .iter()
                    .find(|rec| rec.id == *u)
                    .map(|rec| (rec.url.clone(), *done))
            })
            .collect();
        seeds.sort();
        Ok(Some(build_status(job, &seeds)))
    }

    async fn job_results(
        &self,
        job_id: i64,
        mime_prefix: &str,
    ) -> Result<JobResults, StorageError> {
        let tables = self.tables.lock().unwrap();
        let mut results = JobResults::new();
        for (j, refer_id, url_id) in &tables.results {
            if *j != job_id {
                continue;
            }
            let (Some(refer), Some(url)) = (
                tables.urls.iter().find(|rec| rec.id == *refer_id),
                tables.urls.iter().find(|rec| rec.id == *url_id),
            ) else {
                continue;
            };
            if !url.mime.starts_with(mime_prefix) {
                continue;
            }
            let group = results.entry(refer.url.clone()).or_default();
            if !group.contains(&url.url) {
                group.push(url.url.clone());
            }
        }
        for group in results.values_mut() {
            group.sort();
        }
        Ok(results)
    }
}

// --- Queue ---

/// Queue double: a deque the tests pop from directly, plus a record of
/// everything ever published for invariant checks.
#[derive(Clone, Default)]
pub struct MemQueue {
    items: Arc<Mutex<VecDeque<UrlQueueItem>>>,
    history: Arc<Mutex<Vec<UrlQueueItem>>>,
}

impl MemQueue {
    pub fn pop(&self) -> Option<UrlQueueItem> {
        self.items.lock().unwrap().pop_front()
    }

    pub fn history(&self) -> Vec<UrlQueueItem> {
        self.history.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for MemQueue {
    async fn send(&self, item: &UrlQueueItem) -> Result<(), QueueError> {
        self.items.lock().unwrap().push_back(item.clone());
        self.history.lock().unwrap().push(item.clone());
        Ok(())
    }
}

// --- Fetcher ---

/// Map-backed fetcher that records every URL it is asked for.
#[derive(Clone, Default)]
pub struct FakeFetcher {
    pages: Arc<Mutex<HashMap<String, FetchedDoc>>>,
    fetched: Arc<Mutex<Vec<String>>>,
}

impl FakeFetcher {
    /// Register a text page at `url`.
    pub fn page(self, url: &str, mime: &str, body: &str) -> Self {
        self.pages.lock().unwrap().insert(
            url.to_string(),
            FetchedDoc {
                mime: mime.to_string(),
                body: Some(body.to_string()),
            },
        );
        self
    }

    /// URLs that were actually requested, in order.
    pub fn fetched_urls(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedDoc, ScrapeError> {
        self.fetched.lock().unwrap().push(url.to_string());
        self.pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| ScrapeError::InvalidTarget(url.to_string()))
    }
}
