//! In-memory registry of download tasks.
//!
//! The registry is shared between the batch loop, cancellation requests and
//! the persistence bridge. Each call is atomic on its own, but nothing holds
//! the lock across an `.await`, so a read followed by a write may observe
//! another flow's change in between.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::task::{Task, TaskState};

struct Entry {
    task: Task,
    token: CancellationToken,
    /// Set once the batch stopped listening for cancellation.
    sealed: bool,
}

#[derive(Default)]
struct Inner {
    entries: BTreeMap<u64, Entry>,
    last_id: u64,
}

/// Mapping from task id to task, plus the id counter.
///
/// Ids are never reused, even after a task is removed.
#[derive(Default)]
pub struct TaskRegistry {
    inner: Mutex<Inner>,
}

impl TaskRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from previously persisted tasks.
    ///
    /// `last_id` becomes the largest id seen, or 0.
    #[must_use]
    pub fn from_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        let mut inner = Inner::default();
        for task in tasks {
            inner.last_id = inner.last_id.max(task.id);
            inner.entries.insert(
                task.id,
                Entry {
                    task,
                    token: CancellationToken::new(),
                    sealed: false,
                },
            );
        }
        Self {
            inner: Mutex::new(inner),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn last_id(&self) -> u64 {
        self.lock().last_id
    }

    /// Allocates the next id and registers a `preparing` task for `post_ids`.
    ///
    /// Returns the task and the token that cancels its downloads.
    pub fn create(&self, post_ids: Vec<u64>, started: i64) -> (Task, CancellationToken) {
        let mut inner = self.lock();
        inner.last_id += 1;
        let task = Task::new(inner.last_id, post_ids, started);
        let token = CancellationToken::new();
        inner.entries.insert(
            task.id,
            Entry {
                task: task.clone(),
                token: token.clone(),
                sealed: false,
            },
        );
        (task, token)
    }

    #[must_use]
    pub fn get(&self, id: u64) -> Option<Task> {
        self.lock().entries.get(&id).map(|e| e.task.clone())
    }

    #[must_use]
    pub fn state(&self, id: u64) -> Option<TaskState> {
        self.lock().entries.get(&id).map(|e| e.task.state)
    }

    #[must_use]
    pub fn contains(&self, id: u64) -> bool {
        self.lock().entries.contains_key(&id)
    }

    /// Snapshot of every task, ordered by id.
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.lock().entries.values().map(|e| e.task.clone()).collect()
    }

    /// Records one confirmed item completion for a task.
    pub fn record_item_done(&self, id: u64) {
        if let Some(entry) = self.lock().entries.get_mut(&id) {
            entry.task.record_item_done();
        }
    }

    /// Cancels a running task and fires its token.
    ///
    /// Returns false if the task is unknown, sealed or already finished.
    pub fn cancel(&self, id: u64) -> bool {
        let mut inner = self.lock();
        let Some(entry) = inner.entries.get_mut(&id) else {
            return false;
        };
        if entry.sealed || !entry.task.cancel() {
            return false;
        }
        entry.token.cancel();
        true
    }

    /// Closes a task to further cancel requests once its downloads settled.
    ///
    /// Returns true if the task was canceled or removed before it could be
    /// sealed, in which case the caller must roll the batch back.
    pub fn seal(&self, id: u64) -> bool {
        match self.lock().entries.get_mut(&id) {
            Some(entry) if entry.task.state != TaskState::Canceled => {
                entry.sealed = true;
                false
            }
            _ => true,
        }
    }

    /// Removes a task. Any downloads still running for it are cancelled.
    pub fn remove(&self, id: u64) -> Option<Task> {
        let entry = self.lock().entries.remove(&id)?;
        entry.token.cancel();
        Some(entry.task)
    }

    /// Writes a task back if it is still registered.
    ///
    /// Returns false when the task was removed in the meantime.
    pub fn replace(&self, task: Task) -> bool {
        match self.lock().entries.get_mut(&task.id) {
            Some(entry) => {
                entry.task = task;
                true
            }
            None => false,
        }
    }
}
