use std::sync::{Arc, PoisonError};

use serde::Serialize;

use tasker_core::{SchedulerError, Task, TaskId, TaskOutcome, TaskValue};

use super::core::{read_lock, write_lock};
use super::TaskScheduler;

/// Where a task currently sits in the scheduler's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskStatus {
    Running,
    Done,
    /// Never submitted here, or already removed.
    Unknown,
}

fn require(id: Option<TaskId>) -> Result<TaskId, SchedulerError> {
    id.ok_or(SchedulerError::InvalidTask("task reference is missing"))
}

impl TaskScheduler {
    /// Whether the task has finished and its outcome can be collected.
    ///
    /// May report `false` for a task that finished a moment ago if another
    /// thread is mid-sweep; never reports `true` for an unfinished task.
    pub fn is_done(&self, id: impl Into<Option<TaskId>>) -> Result<bool, SchedulerError> {
        let id = require(id.into())?;
        self.reconcile()?;
        Ok(read_lock(&self.done, "done")?.contains_key(&id))
    }

    /// Fetch the value of a finished task without blocking.
    ///
    /// Returns `Ok(None)` while the task is running (or if it is unknown),
    /// and [`SchedulerError::TaskExecution`] carrying the original cause if
    /// the task failed.
    pub fn result(
        &self,
        id: impl Into<Option<TaskId>>,
    ) -> Result<Option<TaskValue>, SchedulerError> {
        let id = require(id.into())?;
        self.reconcile()?;

        let done = read_lock(&self.done, "done")?;
        match done.get(&id).map(|entry| &entry.outcome) {
            None => Ok(None),
            Some(TaskOutcome::Succeeded(value)) => Ok(Some(value.clone())),
            Some(TaskOutcome::Failed(err)) => Err(SchedulerError::TaskExecution {
                id,
                source: Arc::clone(err),
            }),
        }
    }

    /// Forget a finished task. Returns `false` if the task is still running
    /// or not tracked at all.
    pub fn remove(&self, id: impl Into<Option<TaskId>>) -> Result<bool, SchedulerError> {
        let id = require(id.into())?;
        self.reconcile()?;

        let removed = write_lock(&self.done, "done")?.remove(&id).is_some();
        if removed {
            self.metrics
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .record_removal();
        }
        Ok(removed)
    }

    pub fn status(&self, id: impl Into<Option<TaskId>>) -> Result<TaskStatus, SchedulerError> {
        let id = require(id.into())?;
        self.reconcile()?;

        let running = read_lock(&self.running, "running")?;
        let done = read_lock(&self.done, "done")?;
        Ok(if done.contains_key(&id) {
            TaskStatus::Done
        } else if running.contains_key(&id) {
            TaskStatus::Running
        } else {
            TaskStatus::Unknown
        })
    }

    /// Snapshot of the tasks still running.
    pub fn running(&self) -> Result<Vec<Arc<dyn Task>>, SchedulerError> {
        self.reconcile()?;
        Ok(read_lock(&self.running, "running")?
            .values()
            .map(|entry| Arc::clone(&entry.task))
            .collect())
    }

    /// Snapshot of the finished tasks not yet removed.
    pub fn done(&self) -> Result<Vec<Arc<dyn Task>>, SchedulerError> {
        self.reconcile()?;
        Ok(read_lock(&self.done, "done")?
            .values()
            .map(|entry| Arc::clone(&entry.task))
            .collect())
    }
}
