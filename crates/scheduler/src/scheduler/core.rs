use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use tracing::{debug, info};

use tasker_core::{
    SchedulerConfig, SchedulerError, ShutdownPolicy, Task, TaskId, TaskOutcome,
};

use crate::metrics::SchedulerMetrics;
use crate::pool::{TaskHandle, WorkerPool};

/// A dispatched task whose handle has not been reconciled yet.
///
/// The handle has its own lock so the sweep can poll it while holding the
/// running map for reading only.
pub(super) struct RunningEntry {
    pub(super) task: Arc<dyn Task>,
    pub(super) handle: Mutex<TaskHandle>,
    pub(super) submitted_at: Instant,
}

/// A reconciled task waiting for the client to collect and remove it.
pub(super) struct DoneEntry {
    pub(super) task: Arc<dyn Task>,
    pub(super) outcome: TaskOutcome,
}

/// The task scheduler. Hands tasks to a [`WorkerPool`] and tracks each one
/// in either the running or the done collection until the client removes it.
///
/// All methods take `&self`; share the scheduler between threads with an
/// `Arc`. Locks are always taken in the order running, then done.
pub struct TaskScheduler {
    pub(super) config: SchedulerConfig,
    pub(super) pool: WorkerPool,
    /// Submitted tasks still executing (or finished but not yet swept).
    pub(super) running: RwLock<HashMap<TaskId, RunningEntry>>,
    /// Finished tasks with their outcome.
    pub(super) done: RwLock<HashMap<TaskId, DoneEntry>>,
    /// Held by whichever thread is currently sweeping running into done.
    pub(super) reconcile_lock: Mutex<()>,
    pub(super) metrics: RwLock<SchedulerMetrics>,
}

impl TaskScheduler {
    /// Create a scheduler and start its worker pool.
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let pool = WorkerPool::new(&config)?;
        info!(
            "Task scheduler started with {} workers ({} shutdown)",
            pool.size(),
            config.shutdown_policy
        );

        Ok(Self {
            config,
            pool,
            running: RwLock::new(HashMap::new()),
            done: RwLock::new(HashMap::new()),
            reconcile_lock: Mutex::new(()),
            metrics: RwLock::new(SchedulerMetrics::default()),
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Submit a task for execution and return its id.
    ///
    /// Fails with [`SchedulerError::InvalidTask`] when no task is given,
    /// [`SchedulerError::DuplicateTask`] when the same task is still
    /// tracked by this scheduler, and [`SchedulerError::Unavailable`]
    /// after shutdown. A failed submission leaves no trace.
    pub fn submit(
        &self,
        task: impl Into<Option<Arc<dyn Task>>>,
    ) -> Result<TaskId, SchedulerError> {
        let task = task
            .into()
            .ok_or(SchedulerError::InvalidTask("submitted task is missing"))?;
        let id = task.id();

        let mut running = write_lock(&self.running, "running")?;
        if running.contains_key(&id) || read_lock(&self.done, "done")?.contains_key(&id) {
            return Err(SchedulerError::DuplicateTask(id));
        }

        let handle = self.pool.submit(Arc::clone(&task))?;
        debug!("Submitted task {} ({})", id, task.name());
        running.insert(
            id,
            RunningEntry {
                task,
                handle: Mutex::new(handle),
                submitted_at: Instant::now(),
            },
        );
        drop(running);

        self.metrics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .record_submission();

        Ok(id)
    }

    /// Shut the worker pool down using the configured policy.
    pub fn shutdown(&self) -> Result<(), SchedulerError> {
        self.shutdown_with(self.config.shutdown_policy)
    }

    /// Shut the worker pool down. Safe to call repeatedly and from several
    /// threads; only the first call has an effect, except that an
    /// [`ShutdownPolicy::Immediate`] call still abandons whatever is queued.
    ///
    /// Queries keep working afterwards so outstanding results can be
    /// collected.
    pub fn shutdown_with(&self, policy: ShutdownPolicy) -> Result<(), SchedulerError> {
        if self.pool.shutdown(policy)? {
            info!("Scheduler shutdown requested ({} policy)", policy);
        }
        Ok(())
    }

    /// Whether new submissions are still accepted.
    pub fn is_accepting(&self) -> bool {
        self.pool.is_accepting()
    }

    /// Get a snapshot of the current scheduler metrics.
    pub fn metrics(&self) -> SchedulerMetrics {
        let mut snapshot = self
            .metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        snapshot.running = self
            .running
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        snapshot.done = self
            .done
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        snapshot.queued = self.pool.queued();
        snapshot.in_flight = self.pool.in_flight();
        snapshot.worker_threads = self.pool.size();
        snapshot.accepting = self.pool.is_accepting();
        snapshot
    }
}

pub(super) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    name: &str,
) -> Result<RwLockReadGuard<'a, T>, SchedulerError> {
    lock.read()
        .map_err(|e| SchedulerError::LockPoisoned(format!("{} read lock: {}", name, e)))
}

pub(super) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    name: &str,
) -> Result<RwLockWriteGuard<'a, T>, SchedulerError> {
    lock.write()
        .map_err(|e| SchedulerError::LockPoisoned(format!("{} write lock: {}", name, e)))
}
