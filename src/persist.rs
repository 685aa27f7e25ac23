//! Terminal task bookkeeping and registry rehydration.

use crate::download::Downloader;
use crate::error::Result;
use crate::registry::TaskRegistry;
use crate::storage::Storage;
use crate::task::{Task, TaskOutcome, now_millis};

impl Downloader {
    /// Classifies a finished batch, stamps it, and persists the task.
    ///
    /// Returns `None` without leaving a record behind if the task was removed
    /// while the batch ran, including while its record was being saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the task record cannot be saved.
    pub async fn persist_task(&self, outcome: TaskOutcome) -> Result<Option<Task>> {
        let Some(mut task) = self.registry.get(outcome.task_id) else {
            log::debug!("Task {}: removed before it finished", outcome.task_id);
            return Ok(None);
        };

        task.finish(&outcome, now_millis());
        self.storage.save_task(&task).await?;
        if !self.registry.replace(task.clone()) {
            log::debug!("Task {}: removed while saving, deleting record", task.id);
            self.storage.remove_task(task.id).await?;
            return Ok(None);
        }

        log::info!(
            "Task {}: {} ({} downloaded, {} skipped, {} failed of {})",
            task.id,
            task.state,
            outcome.downloaded,
            outcome.skipped,
            outcome.failed,
            task.items
        );
        Ok(Some(task))
    }
}

impl TaskRegistry {
    /// Builds a registry from every persisted task.
    ///
    /// Tasks a previous process left running can never progress again; they
    /// are marked failed and saved back.
    ///
    /// # Errors
    ///
    /// Returns an error if the tasks cannot be listed or an interrupted task
    /// cannot be saved.
    pub async fn rehydrate(storage: &dyn Storage) -> Result<Self> {
        let mut tasks = storage.get_all_tasks().await?;
        let now = now_millis();
        for task in &mut tasks {
            if task.mark_interrupted(now) {
                log::warn!("Task {}: interrupted by shutdown, marking failed", task.id);
                storage.save_task(task).await?;
            }
        }
        log::info!("Loaded {} persisted tasks", tasks.len());
        Ok(Self::from_tasks(tasks))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::config::TaskConfig;
    use crate::item::{Item, Tag};
    use crate::storage::MemoryStorage;
    use crate::task::TaskState;
    use crate::testing::{Harness, MockCatalog, MockMedia};

    /// Memory storage whose task saves take a while.
    struct SlowSaves {
        inner: MemoryStorage,
        delay: Duration,
    }

    #[async_trait]
    impl Storage for SlowSaves {
        async fn save_task(&self, task: &Task) -> Result<()> {
            tokio::time::sleep(self.delay).await;
            self.inner.save_task(task).await
        }

        async fn get_all_tasks(&self) -> Result<Vec<Task>> {
            self.inner.get_all_tasks().await
        }

        async fn remove_task(&self, id: u64) -> Result<()> {
            self.inner.remove_task(id).await
        }

        async fn tag_exists(&self, name: &str) -> Result<bool> {
            self.inner.tag_exists(name).await
        }

        async fn bulk_insert_tags(&self, tags: &[Tag]) -> Result<()> {
            self.inner.bulk_insert_tags(tags).await
        }

        async fn get_item(&self, id: u64) -> Result<Option<Item>> {
            self.inner.get_item(id).await
        }

        async fn update_item(&self, item: &Item) -> Result<()> {
            self.inner.update_item(item).await
        }

        async fn bulk_save_items(&self, items: &[Item]) -> Result<()> {
            self.inner.bulk_save_items(items).await
        }
    }

    fn harness_with_task(items: usize) -> Harness {
        let h = Harness::new(MockCatalog::new(), MockMedia::new(), TaskConfig::default());
        h.registry.create((1..=items as u64).collect(), 0);
        h
    }

    fn outcome(downloaded: usize, skipped: usize, canceled: bool) -> TaskOutcome {
        TaskOutcome {
            task_id: 1,
            downloaded,
            skipped,
            failed: 0,
            canceled,
        }
    }

    #[tokio::test]
    async fn full_tally_completes() {
        let h = harness_with_task(100);
        let task = h.downloader.persist_task(outcome(60, 40, false)).await.unwrap().unwrap();
        assert_eq!(task.state, TaskState::Completed);
        assert_eq!(task.items_done, 100);
        assert!(task.timestamp_done.is_some());
        assert_eq!(h.storage.task(1), Some(task.clone()));
        assert_eq!(h.registry.get(1), Some(task));
    }

    #[tokio::test]
    async fn short_tally_fails() {
        let h = harness_with_task(100);
        let task = h.downloader.persist_task(outcome(50, 40, false)).await.unwrap().unwrap();
        assert_eq!(task.state, TaskState::Failed);
        assert!(task.timestamp_done.is_some());
        assert_eq!(h.storage.task(1).unwrap().state, TaskState::Failed);
    }

    #[tokio::test]
    async fn canceled_wins_over_counts() {
        let h = harness_with_task(100);
        let task = h.downloader.persist_task(outcome(60, 40, true)).await.unwrap().unwrap();
        assert_eq!(task.state, TaskState::Canceled);
        assert!(task.timestamp_done.is_some());
    }

    #[tokio::test]
    async fn removed_task_is_not_written() {
        let h = harness_with_task(3);
        h.registry.remove(1);
        assert!(h.downloader.persist_task(outcome(3, 0, false)).await.unwrap().is_none());
        assert!(h.storage.task(1).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn removal_during_save_leaves_no_record() {
        let storage = Arc::new(SlowSaves {
            inner: MemoryStorage::new(),
            delay: Duration::from_secs(1),
        });
        let registry = Arc::new(TaskRegistry::new());
        registry.create(vec![1], 0);
        let downloader = Downloader::new(
            storage.clone(),
            Arc::new(MockCatalog::new()),
            Arc::new(MockMedia::new()),
            registry.clone(),
            TaskConfig::default(),
        );

        let persisting = tokio::spawn({
            let downloader = downloader.clone();
            async move { downloader.persist_task(outcome(1, 0, false)).await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(downloader.remove_task(1).await.unwrap().is_some());

        assert!(persisting.await.unwrap().unwrap().is_none());
        assert!(!registry.contains(1));
        assert!(storage.inner.task(1).is_none());
        let rehydrated = TaskRegistry::rehydrate(&*storage).await.unwrap();
        assert!(rehydrated.tasks().is_empty());
    }

    #[tokio::test]
    async fn rehydrated_ids_continue_from_max() {
        let storage = MemoryStorage::with_tasks([2, 5, 9].map(|id| {
            let mut task = Task::new(id, vec![id], 0);
            task.finish(&TaskOutcome { task_id: id, downloaded: 1, ..TaskOutcome::default() }, 1);
            task
        }));

        let registry = TaskRegistry::rehydrate(&storage).await.unwrap();
        assert_eq!(registry.last_id(), 9);
        assert_eq!(registry.tasks().len(), 3);
        let (task, _) = registry.create(vec![1], 0);
        assert_eq!(task.id, 10);
    }

    #[tokio::test]
    async fn rehydration_marks_unfinished_tasks_failed() {
        let storage = MemoryStorage::with_tasks([Task::new(4, vec![1, 2], 0)]);

        let registry = TaskRegistry::rehydrate(&storage).await.unwrap();

        let task = registry.get(4).unwrap();
        assert_eq!(task.state, TaskState::Failed);
        assert!(task.timestamp_done.is_some());
        assert_eq!(storage.task(4).unwrap().state, TaskState::Failed);
    }

    #[tokio::test]
    async fn empty_storage_rehydrates_to_zero() {
        let registry = TaskRegistry::rehydrate(&MemoryStorage::new()).await.unwrap();
        assert_eq!(registry.last_id(), 0);
        assert!(registry.tasks().is_empty());
    }
}
