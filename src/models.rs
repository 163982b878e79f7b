use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// --- Queue task ---

/// A single unit of crawl work carried on both queue topics.
///
/// `origin_id` is the seed URL of `job_id` this task descends from, `refer_id`
/// the parent whose page linked to `url_id`. `level` is the hop distance from
/// the seed (0 at the seed itself).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlQueueItem {
    pub job_id: i64,
    pub origin_id: i64,
    pub refer_id: i64,
    pub url_id: i64,
    pub level: i32,
    pub force_crawl: bool,
}

impl UrlQueueItem {
    /// Seed task for a freshly scheduled job URL. The seed is its own origin
    /// and has no refer.
    pub fn seed(job_id: i64, url_id: i64, force_crawl: bool) -> Self {
        UrlQueueItem {
            job_id,
            origin_id: url_id,
            refer_id: 0,
            url_id,
            level: 0,
            force_crawl,
        }
    }

    /// Descendant task one level below this one.
    pub fn descendant(&self, url_id: i64) -> Self {
        UrlQueueItem {
            job_id: self.job_id,
            origin_id: self.origin_id,
            refer_id: self.url_id,
            url_id,
            level: self.level + 1,
            force_crawl: self.force_crawl,
        }
    }
}

// --- Job status ---

/// Per-job progress snapshot derived from the job_url rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: i64,
    pub completed: usize,
    pub pending: usize,
    /// Wall-clock time since the job was created, frozen at the last seed
    /// completion once the whole job is done.
    pub elapsed: std::time::Duration,
    /// Seed URL -> completed?
    pub urls: BTreeMap<String, bool>,
}

/// Job results grouped by refer URL. Each value set is deduplicated.
pub type JobResults = BTreeMap<String, Vec<String>>;
