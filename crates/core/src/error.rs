use std::sync::Arc;

use thiserror::Error;

use crate::task::TaskId;

/// Failure produced while executing a single task.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("task failed: {0}")]
    Failed(String),

    /// Error raised by the task's own logic, kept as-is.
    #[error("{0}")]
    Execution(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("task abandoned: worker pool shut down before it started")]
    Abandoned,

    #[error("task result lost: worker dropped the handle without resolving it")]
    Lost,
}

impl TaskError {
    /// Wrap an arbitrary error raised by a task implementation.
    pub fn execution<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        TaskError::Execution(Box::new(err))
    }
}

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("invalid task: {0}")]
    InvalidTask(&'static str),

    #[error("task {id} failed to execute: {source}")]
    TaskExecution {
        id: TaskId,
        #[source]
        source: Arc<TaskError>,
    },

    #[error("scheduler unavailable: worker pool has been shut down")]
    Unavailable,

    #[error("task {0} has already been submitted")]
    DuplicateTask(TaskId),

    #[error("scheduler interrupted: {0}")]
    Interrupted(String),

    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("worker pool error: {0}")]
    Pool(String),
}

impl SchedulerError {
    /// The underlying task failure, when this error wraps one.
    pub fn task_error(&self) -> Option<&TaskError> {
        match self {
            SchedulerError::TaskExecution { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("boom at {0}")]
    struct Boom(u32);

    #[test]
    fn execution_error_keeps_original_cause() {
        let err = TaskError::execution(Boom(7));
        assert_eq!(err.to_string(), "boom at 7");

        let cause = err.source().expect("execution errors expose their cause");
        let boom = cause.downcast_ref::<Boom>().expect("cause is the original type");
        assert_eq!(boom.0, 7);
    }

    #[test]
    fn task_execution_exposes_task_error() {
        let id = TaskId::next();
        let err = SchedulerError::TaskExecution {
            id,
            source: Arc::new(TaskError::Failed("bad input".into())),
        };

        assert!(matches!(err.task_error(), Some(TaskError::Failed(msg)) if msg == "bad input"));
        assert!(err.to_string().contains("bad input"));
        assert!(err.source().is_some());
        assert!(SchedulerError::Unavailable.task_error().is_none());
    }
}
