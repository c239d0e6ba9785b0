use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::error::TaskError;

/// Value produced by a successful task.
pub type TaskValue = serde_json::Value;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(0);

/// Process-wide unique task identifier. Ids are handed out in increasing
/// order and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TaskId(u64);

impl TaskId {
    /// Allocate the next identifier.
    pub fn next() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A unit of work the scheduler can run on its worker pool.
///
/// The scheduler never looks inside a task: it only keys bookkeeping by
/// [`Task::id`] and forwards whatever [`Task::execute`] returns.
pub trait Task: Send + Sync {
    /// Identifier assigned when the task was constructed.
    fn id(&self) -> TaskId;

    /// Run the task to completion on the calling thread.
    fn execute(&self) -> Result<TaskValue, TaskError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "task"
    }
}

impl fmt::Debug for dyn Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.id())
    }
}

/// Final state of an executed task.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Succeeded(TaskValue),
    Failed(Arc<TaskError>),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded(_))
    }
}

impl From<Result<TaskValue, TaskError>> for TaskOutcome {
    fn from(result: Result<TaskValue, TaskError>) -> Self {
        match result {
            Ok(value) => TaskOutcome::Succeeded(value),
            Err(err) => TaskOutcome::Failed(Arc::new(err)),
        }
    }
}

type TaskFn = dyn Fn() -> Result<TaskValue, TaskError> + Send + Sync;

/// Task backed by a closure.
pub struct FnTask {
    id: TaskId,
    name: String,
    func: Box<TaskFn>,
}

impl FnTask {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn() -> Result<TaskValue, TaskError> + Send + Sync + 'static,
    {
        Self::named("fn-task", func)
    }

    pub fn named<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn() -> Result<TaskValue, TaskError> + Send + Sync + 'static,
    {
        Self {
            id: TaskId::next(),
            name: name.into(),
            func: Box::new(func),
        }
    }
}

impl Task for FnTask {
    fn id(&self) -> TaskId {
        self.id
    }

    fn execute(&self) -> Result<TaskValue, TaskError> {
        (self.func)()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for FnTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTask")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
