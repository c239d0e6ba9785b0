//! Fixed-size worker pool backed by rayon.
//!
//! Every submission returns a [`TaskHandle`] right away. The handle is the
//! receiving half of a oneshot channel that the worker resolves once the
//! task has run, so callers can poll it without blocking.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::{debug, info, warn};

use tasker_core::{SchedulerConfig, SchedulerError, ShutdownPolicy, Task, TaskError, TaskOutcome};

/// Outcome of one task execution plus how long it ran.
#[derive(Debug)]
pub struct Completion {
    pub outcome: TaskOutcome,
    pub elapsed: Duration,
}

/// Result of polling a [`TaskHandle`].
#[derive(Debug)]
pub enum HandleState {
    /// The task is queued or still executing.
    Pending,
    Ready(Completion),
    /// The worker side went away without resolving the handle.
    Lost,
}

/// Deferred result of a submitted task.
#[derive(Debug)]
pub struct TaskHandle {
    rx: oneshot::Receiver<Completion>,
}

impl TaskHandle {
    /// Check for completion without blocking.
    ///
    /// A handle yields `Ready` at most once; polling it again afterwards
    /// reports `Lost`.
    pub fn poll(&mut self) -> HandleState {
        match self.rx.try_recv() {
            Ok(completion) => HandleState::Ready(completion),
            Err(TryRecvError::Empty) => HandleState::Pending,
            Err(TryRecvError::Closed) => HandleState::Lost,
        }
    }
}

#[cfg(test)]
impl TaskHandle {
    /// A handle whose sending side is already gone.
    pub(crate) fn detached() -> Self {
        let (_tx, rx) = oneshot::channel();
        Self { rx }
    }

    /// Block until the task resolves. Panics inside an async runtime.
    pub(crate) fn wait(self) -> HandleState {
        match self.rx.blocking_recv() {
            Ok(completion) => HandleState::Ready(completion),
            Err(_) => HandleState::Lost,
        }
    }
}

/// A fixed number of worker threads with an unbounded queue in front.
pub struct WorkerPool {
    /// `None` once the pool has been shut down.
    pool: RwLock<Option<rayon::ThreadPool>>,
    size: usize,
    /// Set by an immediate shutdown; queued jobs check it before running.
    abandon: Arc<AtomicBool>,
    queued: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub fn new(config: &SchedulerConfig) -> Result<Self, SchedulerError> {
        let size = config.resolved_worker_threads();
        let prefix = config.thread_name_prefix.clone();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(move |index| format!("{}-{}", prefix, index))
            .build()
            .map_err(|e| SchedulerError::Pool(e.to_string()))?;

        info!("Worker pool started with {} threads", size);

        Ok(Self {
            pool: RwLock::new(Some(pool)),
            size,
            abandon: Arc::new(AtomicBool::new(false)),
            queued: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Queue a task for execution and return its handle.
    pub fn submit(&self, task: Arc<dyn Task>) -> Result<TaskHandle, SchedulerError> {
        let guard = self
            .pool
            .read()
            .map_err(|e| SchedulerError::LockPoisoned(format!("worker pool: {}", e)))?;
        let pool = guard.as_ref().ok_or(SchedulerError::Unavailable)?;

        let (tx, rx) = oneshot::channel();
        let abandon = Arc::clone(&self.abandon);
        let queued = Arc::clone(&self.queued);
        let in_flight = Arc::clone(&self.in_flight);

        queued.fetch_add(1, Ordering::Relaxed);
        pool.spawn(move || {
            queued.fetch_sub(1, Ordering::Relaxed);

            if abandon.load(Ordering::Acquire) {
                debug!("Abandoning queued task {}", task.id());
                let _ = tx.send(Completion {
                    outcome: TaskOutcome::Failed(Arc::new(TaskError::Abandoned)),
                    elapsed: Duration::ZERO,
                });
                return;
            }

            in_flight.fetch_add(1, Ordering::Relaxed);
            let start = Instant::now();
            let outcome = run_task(task.as_ref());
            let elapsed = start.elapsed();
            in_flight.fetch_sub(1, Ordering::Relaxed);

            // The receiver is gone only if its scheduler was dropped.
            let _ = tx.send(Completion { outcome, elapsed });
        });

        Ok(TaskHandle { rx })
    }

    /// Stop accepting work. Returns `true` for the call that actually shut
    /// the pool down, `false` if it was already stopped.
    ///
    /// Worker threads exit on their own once the jobs left in the queue
    /// have drained (or been abandoned, under [`ShutdownPolicy::Immediate`]).
    pub fn shutdown(&self, policy: ShutdownPolicy) -> Result<bool, SchedulerError> {
        if policy == ShutdownPolicy::Immediate {
            self.abandon.store(true, Ordering::Release);
        }

        let mut guard = self
            .pool
            .write()
            .map_err(|e| SchedulerError::LockPoisoned(format!("worker pool: {}", e)))?;

        match guard.take() {
            Some(pool) => {
                drop(pool);
                info!(
                    "Worker pool shut down ({} policy, {} queued, {} in flight)",
                    policy,
                    self.queued(),
                    self.in_flight()
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.pool.read().map(|g| g.is_some()).unwrap_or(false)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Tasks waiting for a free worker.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Relaxed)
    }

    /// Tasks currently executing.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }
}

/// Execute a task, turning a panic into a failed outcome.
fn run_task(task: &dyn Task) -> TaskOutcome {
    match panic::catch_unwind(AssertUnwindSafe(|| task.execute())) {
        Ok(result) => result.into(),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!("Task {} ({}) panicked: {}", task.id(), task.name(), message);
            TaskOutcome::Failed(Arc::new(TaskError::Panicked(message)))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::sync::Mutex;

    use serde_json::json;
    use tasker_core::FnTask;

    use super::*;

    fn pool(workers: usize) -> WorkerPool {
        WorkerPool::new(&SchedulerConfig::with_workers(workers)).unwrap()
    }

    fn expect_ready(state: HandleState) -> Completion {
        match state {
            HandleState::Ready(c) => c,
            other => panic!("expected a resolved handle, got {:?}", other),
        }
    }

    #[test]
    fn resolves_value() {
        let pool = pool(2);
        let handle = pool
            .submit(Arc::new(FnTask::new(|| Ok(json!(55)))))
            .unwrap();

        let completion = expect_ready(handle.wait());
        match completion.outcome {
            TaskOutcome::Succeeded(v) => assert_eq!(v, json!(55)),
            TaskOutcome::Failed(e) => panic!("unexpected failure: {}", e),
        }
    }

    #[test]
    fn resolves_error() {
        let pool = pool(1);
        let handle = pool
            .submit(Arc::new(FnTask::new(|| Err(TaskError::Failed("bad".into())))))
            .unwrap();

        match expect_ready(handle.wait()).outcome {
            TaskOutcome::Failed(e) => assert!(matches!(e.as_ref(), TaskError::Failed(m) if m == "bad")),
            TaskOutcome::Succeeded(v) => panic!("unexpected value {}", v),
        }
    }

    #[test]
    fn panic_becomes_failure() {
        let pool = pool(1);
        let handle = pool
            .submit(Arc::new(FnTask::new(|| panic!("worker exploded"))))
            .unwrap();

        match expect_ready(handle.wait()).outcome {
            TaskOutcome::Failed(e) => {
                assert!(matches!(e.as_ref(), TaskError::Panicked(m) if m == "worker exploded"))
            }
            TaskOutcome::Succeeded(v) => panic!("unexpected value {}", v),
        }

        // The worker thread survives the panic.
        let handle = pool.submit(Arc::new(FnTask::new(|| Ok(json!(1))))).unwrap();
        assert!(expect_ready(handle.wait()).outcome.is_success());
    }

    #[test]
    fn poll_is_non_blocking() {
        let pool = pool(1);
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);

        let mut handle = pool
            .submit(Arc::new(FnTask::new(move || {
                release_rx.lock().unwrap().recv().ok();
                Ok(json!("released"))
            })))
            .unwrap();

        assert!(matches!(handle.poll(), HandleState::Pending));
        release_tx.send(()).unwrap();

        let completion = loop {
            match handle.poll() {
                HandleState::Pending => std::thread::yield_now(),
                state => break expect_ready(state),
            }
        };
        assert!(completion.outcome.is_success());
        assert!(matches!(handle.poll(), HandleState::Lost));
    }

    #[test]
    fn submit_after_shutdown_is_rejected() {
        let pool = pool(1);
        assert!(pool.is_accepting());
        assert!(pool.shutdown(ShutdownPolicy::Graceful).unwrap());
        assert!(!pool.shutdown(ShutdownPolicy::Graceful).unwrap());
        assert!(!pool.is_accepting());

        let err = pool.submit(Arc::new(FnTask::new(|| Ok(json!(1))))).unwrap_err();
        assert!(matches!(err, SchedulerError::Unavailable));
    }

    #[test]
    fn graceful_shutdown_drains_queue() {
        let pool = pool(1);
        let handles: Vec<_> = (0..5)
            .map(|i| pool.submit(Arc::new(FnTask::new(move || Ok(json!(i))))).unwrap())
            .collect();

        pool.shutdown(ShutdownPolicy::Graceful).unwrap();

        for handle in handles {
            assert!(expect_ready(handle.wait()).outcome.is_success());
        }
    }

    #[test]
    fn immediate_shutdown_abandons_queued_tasks() {
        let pool = pool(1);
        let (started_tx, started_rx) = mpsc::channel::<()>();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let started_tx = Mutex::new(started_tx);
        let release_rx = Mutex::new(release_rx);

        let running = pool
            .submit(Arc::new(FnTask::new(move || {
                started_tx.lock().unwrap().send(()).ok();
                release_rx.lock().unwrap().recv().ok();
                Ok(json!("finished"))
            })))
            .unwrap();
        started_rx.recv().unwrap();

        let queued = pool.submit(Arc::new(FnTask::new(|| Ok(json!("never"))))).unwrap();
        assert_eq!(pool.in_flight(), 1);

        pool.shutdown(ShutdownPolicy::Immediate).unwrap();
        release_tx.send(()).unwrap();

        assert!(expect_ready(running.wait()).outcome.is_success());
        match expect_ready(queued.wait()).outcome {
            TaskOutcome::Failed(e) => assert!(matches!(e.as_ref(), TaskError::Abandoned)),
            TaskOutcome::Succeeded(v) => panic!("queued task should not run, got {}", v),
        }
    }

    #[test]
    fn zero_workers_resolves_to_parallelism() {
        let pool = pool(0);
        assert!(pool.size() > 0);
    }
}
