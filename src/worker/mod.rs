//! The worker consumes the work_queue: fetch, scrape, persist discoveries,
//! emit descendant tasks, and retire the task's pending entry.
//!
//! The pending entry is the job-completion signal, so retiring it (and
//! running the completion check) happens on every exit path out of a task —
//! a failed scrape still retires, it just leaves `crawled_on` unset so a
//! later force-crawl can retry the URL.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::mime::{can_skip_mime, guess_mime_by_extension};
use crate::models::UrlQueueItem;
use crate::queue::{Publisher, QueueError, Receiver};
use crate::scrape::{scrape, Fetcher, ScrapeError};
use crate::storage::{Storage, StorageError};

#[derive(Debug, thiserror::Error)]
enum CrawlError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("scrape failed: {0}")]
    Scrape(#[from] ScrapeError),
    #[error("no url record for url_id {0}")]
    MissingUrl(i64),
}

pub struct Worker<F> {
    storage: Arc<dyn Storage>,
    url_queue: Arc<dyn Publisher>,
    fetcher: F,
    max_level: i32,
}

impl<F: Fetcher> Worker<F> {
    pub fn new(
        storage: Arc<dyn Storage>,
        url_queue: Arc<dyn Publisher>,
        fetcher: F,
        max_level: i32,
    ) -> Self {
        Worker {
            storage,
            url_queue,
            fetcher,
            max_level,
        }
    }

    /// Receive loop: one task at a time, pausing `work_delay` between tasks.
    pub async fn run<R: Receiver>(
        &self,
        receiver: &mut R,
        work_delay: Duration,
        shutdown: CancellationToken,
    ) {
        loop {
            let item = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                received = receiver.recv() => match received {
                    Ok(item) => item,
                    Err(e) => {
                        tracing::error!(error = %e, "work_queue receive failed");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                },
            };

            self.crawl(&item).await;

            if let Err(e) = receiver.ack(&item).await {
                tracing::warn!(
                    job_id = item.job_id,
                    url_id = item.url_id,
                    origin_id = item.origin_id,
                    error = %e,
                    "failed to ack work_queue task"
                );
            }

            // Fixed inter-task throttle, per worker rather than per host.
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(work_delay) => {}
            }
        }
    }

    /// Handle one work_queue task: the fallible crawl step, then the retire
    /// sequence, unconditionally.
    pub async fn crawl(&self, item: &UrlQueueItem) {
        if let Err(e) = self.crawl_inner(item).await {
            tracing::warn!(
                job_id = item.job_id,
                url_id = item.url_id,
                origin_id = item.origin_id,
                error = %e,
                "crawl failed, retiring task anyway"
            );
        }

        if let Err(e) = self
            .storage
            .delete_pending(item.job_id, item.url_id, item.origin_id)
            .await
        {
            tracing::error!(
                job_id = item.job_id,
                url_id = item.url_id,
                origin_id = item.origin_id,
                error = %e,
                "failed to delete pending entry"
            );
        }
        match self
            .storage
            .update_job_url_if_complete(item.job_id, item.origin_id)
            .await
        {
            Ok(true) => {
                tracing::info!(
                    job_id = item.job_id,
                    origin_id = item.origin_id,
                    "seed completed"
                );
            }
            Ok(false) => {}
            Err(e) => {
                tracing::error!(
                    job_id = item.job_id,
                    origin_id = item.origin_id,
                    error = %e,
                    "seed completion check failed"
                );
            }
        }
    }

    async fn crawl_inner(&self, item: &UrlQueueItem) -> Result<(), CrawlError> {
        let url_rec = self
            .storage
            .get_url_by_id(item.url_id)
            .await?
            .ok_or(CrawlError::MissingUrl(item.url_id))?;

        let (mime, descendants) = scrape(&self.fetcher, &url_rec.url).await?;

        tracing::debug!(
            job_id = item.job_id,
            url = %url_rec.url,
            mime = %mime,
            descendants = descendants.len(),
            level = item.level,
            "crawled url"
        );

        self.storage.mark_crawled(item.url_id, &mime).await?;

        if item.level > 0 {
            self.storage
                .add_result(item.job_id, item.refer_id, item.url_id)
                .await?;
        }

        for descendant_url in &descendants {
            let kind = guess_mime_by_extension(descendant_url);
            let descendant = self.storage.get_or_add_url(descendant_url, kind).await?;
            self.storage.add_link(descendant.id, item.url_id).await?;

            if item.level + 1 < self.max_level {
                if can_skip_mime(kind) {
                    // Terminal leaf: a finding of the job, but never queued
                    // for a fetch of its own.
                    self.storage
                        .add_result(item.job_id, item.url_id, descendant.id)
                        .await?;
                } else {
                    self.storage
                        .add_pending(item.job_id, descendant.id, item.origin_id)
                        .await?;
                    self.url_queue.send(&item.descendant(descendant.id)).await?;
                }
            } else {
                self.storage
                    .add_result(item.job_id, item.url_id, descendant.id)
                    .await?;
            }
        }

        Ok(())
    }
}
