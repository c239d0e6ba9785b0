//! Thread-pool task scheduler with non-blocking completion queries.
//!
//! Tasks are submitted to a fixed-size [`WorkerPool`]. The [`TaskScheduler`]
//! keeps every submitted task in exactly one of two collections, running or
//! done, and moves finished tasks across on whichever query call wins the
//! reconciliation lock.

pub mod metrics;
pub mod pool;
pub mod scheduler;

pub use metrics::SchedulerMetrics;
pub use pool::{HandleState, TaskHandle, WorkerPool};
pub use scheduler::{TaskScheduler, TaskStatus};

pub use tasker_core::{
    SchedulerConfig, SchedulerError, ShutdownPolicy, Task, TaskError, TaskId, TaskOutcome,
    TaskValue,
};
