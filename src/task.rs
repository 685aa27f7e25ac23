//! Download task records and their state machine.
//!
//! A task starts in [`TaskState::Preparing`], moves to
//! [`TaskState::Downloading`] on the first confirmed item completion (not on
//! dispatch), and ends in one of the three terminal states. States never move
//! backwards, and `items_done` never exceeds `items`.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current wall-clock time as epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Lifecycle state of a download task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Preparing,
    Downloading,
    Completed,
    Failed,
    Canceled,
}

impl TaskState {
    /// Returns true for states a task never leaves.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }

    /// Position along the lifecycle; terminal states share the last rank.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Preparing => 0,
            Self::Downloading => 1,
            Self::Completed | Self::Failed | Self::Canceled => 2,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Preparing => "preparing",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        };
        f.pad(name)
    }
}

/// A tracked batch download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: u64,
    /// Planned number of items.
    pub items: usize,
    pub items_done: usize,
    pub state: TaskState,
    /// Posts in the batch, fixed at creation.
    pub post_ids: Vec<u64>,
    /// Epoch milliseconds.
    pub timestamp_started: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_done: Option<i64>,
}

/// Final tally reported by a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskOutcome {
    pub task_id: u64,
    /// Items whose download was confirmed.
    pub downloaded: usize,
    /// Items already downloaded before the batch started.
    pub skipped: usize,
    /// Items whose download returned an error.
    pub failed: usize,
    pub canceled: bool,
}

impl Task {
    /// Creates a task in the `preparing` state.
    #[must_use]
    pub fn new(id: u64, post_ids: Vec<u64>, started: i64) -> Self {
        Self {
            id,
            items: post_ids.len(),
            items_done: 0,
            state: TaskState::Preparing,
            post_ids,
            timestamp_started: started,
            timestamp_done: None,
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Records one confirmed item completion.
    pub fn record_item_done(&mut self) {
        if self.items_done < self.items {
            self.items_done += 1;
        }
        if matches!(self.state, TaskState::Preparing | TaskState::Downloading) {
            self.state = TaskState::Downloading;
        }
    }

    /// Moves a running task to `canceled`. Returns false if it already finished.
    pub fn cancel(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.state = TaskState::Canceled;
        true
    }

    /// Classifies the task from its batch outcome and stamps completion.
    ///
    /// A canceled outcome wins whatever the counts say.
    pub fn finish(&mut self, outcome: &TaskOutcome, now: i64) {
        let accounted = outcome.downloaded + outcome.skipped;
        self.state = if outcome.canceled {
            TaskState::Canceled
        } else if accounted == self.items {
            self.items_done = accounted;
            TaskState::Completed
        } else {
            TaskState::Failed
        };
        self.timestamp_done = Some(now);
    }

    /// Marks a task left unfinished by a previous process as failed.
    ///
    /// Returns true if the task changed.
    pub fn mark_interrupted(&mut self, now: i64) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.state = TaskState::Failed;
        self.timestamp_done = Some(now);
        true
    }
}
