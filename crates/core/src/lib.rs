pub mod config;
pub mod error;
pub mod task;

pub use config::{ConfigError, SchedulerConfig, ShutdownPolicy};
pub use error::*;
pub use task::{FnTask, Task, TaskId, TaskOutcome, TaskValue};
