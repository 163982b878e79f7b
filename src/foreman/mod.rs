//! The foreman consumes the url_queue and decides, per task, whether the URL
//! actually needs a fetch. Uncached tasks go to the work_queue; cached ones
//! are short-circuited by re-expanding descendants from the stored link
//! graph.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::mime::can_skip_mime;
use crate::models::UrlQueueItem;
use crate::queue::{Publisher, QueueError, Receiver};
use crate::storage::{Storage, StorageError, UrlRecord};

#[derive(Debug, thiserror::Error)]
enum ExpandError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

pub struct Foreman {
    storage: Arc<dyn Storage>,
    url_queue: Arc<dyn Publisher>,
    work_queue: Arc<dyn Publisher>,
    cache_max_age: Duration,
    max_level: i32,
}

impl Foreman {
    pub fn new(
        storage: Arc<dyn Storage>,
        url_queue: Arc<dyn Publisher>,
        work_queue: Arc<dyn Publisher>,
        cache_max_age: Duration,
        max_level: i32,
    ) -> Self {
        Foreman {
            storage,
            url_queue,
            work_queue,
            cache_max_age,
            max_level,
        }
    }

    /// Receive loop: one task at a time until shutdown.
    pub async fn run<R: Receiver>(&self, receiver: &mut R, shutdown: CancellationToken) {
        loop {
            let item = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                received = receiver.recv() => match received {
                    Ok(item) => item,
                    Err(e) => {
                        tracing::error!(error = %e, "url_queue receive failed");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                },
            };

            self.process(&item).await;

            if let Err(e) = receiver.ack(&item).await {
                tracing::warn!(
                    job_id = item.job_id,
                    url_id = item.url_id,
                    origin_id = item.origin_id,
                    error = %e,
                    "failed to ack url_queue task"
                );
            }
        }
    }

    /// Handle one url_queue task. Failures are logged with the task triple
    /// and the task is dropped; nothing propagates to the loop.
    pub async fn process(&self, item: &UrlQueueItem) {
        let url_rec = match self.storage.get_url_by_id(item.url_id).await {
            Ok(Some(rec)) => rec,
            Ok(None) => {
                // The submit path creates the row before the task is queued,
                // so this is an invariant violation.
                tracing::warn!(
                    job_id = item.job_id,
                    url_id = item.url_id,
                    origin_id = item.origin_id,
                    "dropping task for unknown url"
                );
                return;
            }
            Err(e) => {
                tracing::error!(
                    job_id = item.job_id,
                    url_id = item.url_id,
                    origin_id = item.origin_id,
                    error = %e,
                    "failed to load url record, dropping task"
                );
                return;
            }
        };

        if !is_cached(&url_rec, item, self.cache_max_age) {
            if let Err(e) = self.work_queue.send(item).await {
                tracing::error!(
                    job_id = item.job_id,
                    url_id = item.url_id,
                    origin_id = item.origin_id,
                    error = %e,
                    "failed to forward task to work_queue"
                );
            }
            // The worker retires the pending entry once it has fetched.
            return;
        }

        tracing::debug!(
            job_id = item.job_id,
            url = %url_rec.url,
            level = item.level,
            "cache hit, expanding descendants from stored links"
        );

        if let Err(e) = self.expand_cached(item).await {
            tracing::warn!(
                job_id = item.job_id,
                url_id = item.url_id,
                origin_id = item.origin_id,
                error = %e,
                "cached expansion incomplete"
            );
        }

        // The retire sequence runs on every path out of the cached branch,
        // after everything else.
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

    /// Record the cached URL as a result and re-emit its known descendants.
    async fn expand_cached(&self, item: &UrlQueueItem) -> Result<(), ExpandError> {
        if item.level > 0 {
            self.storage
                .add_result(item.job_id, item.refer_id, item.url_id)
                .await?;
        }

        let kids = self.storage.get_urls_with_refer(item.url_id).await?;

        if item.level + 1 < self.max_level {
            for kid in &kids {
                self.storage
                    .add_pending(item.job_id, kid.id, item.origin_id)
                    .await?;
                self.url_queue.send(&item.descendant(kid.id)).await?;
            }
        } else {
            // The level ceiling turns known descendants into terminal
            // results.
            for kid in &kids {
                self.storage
                    .add_result(item.job_id, item.url_id, kid.id)
                    .await?;
            }
        }

        Ok(())
    }
}

/// A URL is cached when its last crawl is recent enough (and the task does
/// not force a re-crawl), or when its mime never gets fetched at all.
fn is_cached(url_rec: &UrlRecord, item: &UrlQueueItem, cache_max_age: Duration) -> bool {
    let fresh = match url_rec.crawled_on {
        Some(crawled_on) => {
            let age = (Utc::now() - crawled_on).to_std().unwrap_or_default();
            age < cache_max_age && !item.force_crawl
        }
        None => false,
    };
    fresh || can_skip_mime(&url_rec.mime)
}
