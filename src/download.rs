//! Batch download orchestration.
//!
//! [`Downloader`] owns handles to every collaborator and runs batches as
//! tracked tasks: it allocates a task, walks the posts in order, dispatches
//! one download per post that is not already on disk, paces itself between
//! dispatches, and rolls back dispatched posts if the task is canceled.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::catalog::Catalog;
use crate::config::{DispatchMode, TaskConfig};
use crate::error::{Error, Result};
use crate::item::Item;
use crate::media::MediaStore;
use crate::registry::TaskRegistry;
use crate::storage::Storage;
use crate::task::{Task, TaskOutcome, TaskState, now_millis};

/// Result of one batch run.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub outcome: TaskOutcome,
    /// The task as persisted, or `None` if it was removed while running.
    pub task: Option<Task>,
}

#[derive(Debug, Default)]
struct Tally {
    downloaded: usize,
    failed: usize,
}

impl Tally {
    fn record(&mut self, post_id: u64, joined: std::result::Result<Result<Item>, JoinError>) {
        match joined {
            Ok(Ok(_)) => self.downloaded += 1,
            Ok(Err(Error::Cancelled)) => log::debug!("Post {post_id}: download cancelled"),
            Ok(Err(e)) => {
                self.failed += 1;
                log::warn!("Post {post_id}: download failed: {e}");
            }
            Err(e) => {
                self.failed += 1;
                log::error!("Post {post_id}: download task aborted: {e}");
            }
        }
    }
}

/// Entry point for downloads, tag backfill and task bookkeeping.
#[derive(Clone)]
pub struct Downloader {
    pub(crate) storage: Arc<dyn Storage>,
    pub(crate) catalog: Arc<dyn Catalog>,
    pub(crate) media: Arc<dyn MediaStore>,
    pub(crate) registry: Arc<TaskRegistry>,
    pub(crate) config: TaskConfig,
}

impl Downloader {
    #[must_use]
    pub fn new(
        storage: Arc<dyn Storage>,
        catalog: Arc<dyn Catalog>,
        media: Arc<dyn MediaStore>,
        registry: Arc<TaskRegistry>,
        config: TaskConfig,
    ) -> Self {
        Self {
            storage,
            catalog,
            media,
            registry,
            config,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    #[must_use]
    pub const fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// Snapshot of all tasks for display, ordered by id.
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.registry.tasks()
    }

    /// Requests cancellation of a running task.
    ///
    /// Returns false if the task is unknown or already finished.
    pub fn cancel_task(&self, id: u64) -> bool {
        let canceled = self.registry.cancel(id);
        if canceled {
            log::info!("Task {id}: cancellation requested");
        }
        canceled
    }

    /// Removes a task from the registry and from storage.
    ///
    /// A task that is still running stops as if it had been canceled.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored record cannot be deleted.
    pub async fn remove_task(&self, id: u64) -> Result<Option<Task>> {
        let removed = self.registry.remove(id);
        self.storage.remove_task(id).await?;
        if removed.is_some() {
            log::info!("Task {id}: removed");
        }
        Ok(removed)
    }

    /// Downloads one post and records it as downloaded.
    ///
    /// With a `task_id` the task's progress is advanced; without one the
    /// post's tags are backfilled right away, since no batch will do it later.
    ///
    /// # Errors
    ///
    /// Returns an error if the media write or the item update fails.
    pub async fn download_item(
        &self,
        item: &Item,
        task_id: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<Item> {
        self.media.write_media(item, cancel).await?;
        let updated = item.mark_downloaded(now_millis());
        self.storage.update_item(&updated).await?;

        match task_id {
            Some(id) => self.registry.record_item_done(id),
            None => {
                if let Err(e) = self.update_tag_cache(updated.tags.clone()).await {
                    log::warn!("Post {}: tag backfill failed: {e}", updated.id);
                }
            }
        }
        Ok(updated)
    }

    /// Downloads a single post outside of any task.
    ///
    /// # Errors
    ///
    /// Returns an error if the download fails.
    pub async fn download_post(&self, item: &Item) -> Result<Item> {
        self.download_item(item, None, &CancellationToken::new())
            .await
    }

    /// Undoes the local effects of dispatched downloads.
    ///
    /// Every post is marked not downloaded even when deleting its file fails;
    /// a later download overwrites whatever was left behind. Failures are
    /// returned per post id and never retried.
    pub async fn rollback(&self, items: &[Item]) -> Vec<(u64, Error)> {
        let mut errors = Vec::new();
        for item in items {
            if let Err(e) = self.media.delete_media(item).await {
                errors.push((item.id, e));
            }
            if let Err(e) = self.storage.update_item(&item.reset_download()).await {
                errors.push((item.id, e));
            }
        }
        errors
    }

    /// Downloads the posts a user selected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoPostsSelected`] for an empty selection, before any
    /// task is created.
    pub async fn download_selected(&self, items: Vec<Item>) -> Result<BatchReport> {
        if items.is_empty() {
            return Err(Error::NoPostsSelected);
        }
        self.run_batch(items, None).await
    }

    /// Downloads every post of a listing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoPostsToDownload`] for an empty listing, before any
    /// task is created.
    pub async fn download_all(&self, items: Vec<Item>) -> Result<BatchReport> {
        if items.is_empty() {
            return Err(Error::NoPostsToDownload);
        }
        self.run_batch(items, None).await
    }

    /// Like [`Self::download_all`], but sends the task id on `started` as soon
    /// as the task is registered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoPostsToDownload`] for an empty listing. `started`
    /// is then dropped without a value.
    pub async fn download_all_notifying(
        &self,
        items: Vec<Item>,
        started: oneshot::Sender<u64>,
    ) -> Result<BatchReport> {
        if items.is_empty() {
            return Err(Error::NoPostsToDownload);
        }
        self.run_batch(items, Some(started)).await
    }

    fn spawn_item(
        &self,
        item: Item,
        task_id: u64,
        cancel: CancellationToken,
        permit: OwnedSemaphorePermit,
    ) -> JoinHandle<Result<Item>> {
        let this = self.clone();
        tokio::spawn(async move {
            let _permit = permit;
            this.download_item(&item, Some(task_id), &cancel).await
        })
    }

    /// True once the task was canceled or removed.
    fn is_stopped(&self, task_id: u64) -> bool {
        self.registry
            .state(task_id)
            .is_none_or(|state| state == TaskState::Canceled)
    }

    async fn run_batch(
        &self,
        items: Vec<Item>,
        started: Option<oneshot::Sender<u64>>,
    ) -> Result<BatchReport> {
        let post_ids = items.iter().map(|i| i.id).collect();
        let (task, token) = self.registry.create(post_ids, now_millis());
        let task_id = task.id;
        if let Err(e) = self.storage.save_task(&task).await {
            self.registry.remove(task_id);
            return Err(e);
        }
        log::info!("Task {task_id}: starting batch of {} posts", task.items);
        if let Some(started) = started {
            let _ = started.send(task_id);
        }

        let limiter = Arc::new(Semaphore::new(self.config.dispatch.in_flight_limit()));
        let mut in_flight = Vec::new();
        let mut dispatched = Vec::new();
        let mut pending_tags = Vec::new();
        let mut tally = Tally::default();
        let mut skipped = 0;
        let mut canceled = false;

        for item in &items {
            if item.downloaded {
                log::debug!("Task {task_id}: post {} already downloaded", item.id);
                skipped += 1;
                continue;
            }

            let permit = tokio::select! {
                permit = Arc::clone(&limiter).acquire_owned() => permit.ok(),
                () = token.cancelled() => None,
            };
            if let Some(permit) = permit {
                let handle = self.spawn_item(item.clone(), task_id, token.child_token(), permit);
                dispatched.push(item.clone());
                pending_tags.extend(item.tags.iter().cloned());
                if self.config.dispatch == DispatchMode::Sequential {
                    tally.record(item.id, handle.await);
                } else {
                    in_flight.push((item.id, handle));
                }
            }

            tokio::select! {
                () = tokio::time::sleep(self.config.pacing_delay()) => {}
                () = token.cancelled() => {}
            }

            if self.is_stopped(task_id) {
                canceled = true;
                break;
            }
        }

        let drained = futures::future::join_all(
            in_flight
                .into_iter()
                .map(|(post_id, handle)| async move { (post_id, handle.await) }),
        )
        .await;
        for (post_id, joined) in drained {
            tally.record(post_id, joined);
        }
        // A cancel that lands while the last downloads drain still counts;
        // anything later is refused.
        canceled = self.registry.seal(task_id) || canceled;

        if canceled {
            log::info!(
                "Task {task_id}: canceled, rolling back {} dispatched posts",
                dispatched.len()
            );
            for (post_id, e) in self.rollback(&dispatched).await {
                log::warn!("Task {task_id}: rollback of post {post_id} failed: {e}");
            }
        } else if let Err(e) = self.update_tag_cache(pending_tags).await {
            log::warn!("Task {task_id}: tag backfill failed: {e}");
        }

        let outcome = TaskOutcome {
            task_id,
            downloaded: tally.downloaded,
            skipped,
            failed: tally.failed,
            canceled,
        };
        let task = self.persist_task(outcome).await?;
        Ok(BatchReport { outcome, task })
    }
}
