//! Client drivers that load the scheduler with script tasks.
//!
//! Every driver submits `[].sum(v)` for each value in [`VALUES`], polls the
//! scheduler until its tasks are done, removes them, and adds up what it
//! collected.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use tasker_core::{Task, TaskId};
use tasker_scheduler::{SchedulerMetrics, TaskScheduler};
use tasker_script::ScriptTask;

use crate::cli::Command;

pub const VALUES: [i64; 3] = [1, 10, 100];

/// Polling delay that doubles while nothing is ready.
#[derive(Debug)]
pub struct Backoff {
    current: Duration,
    initial: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            current: initial,
            initial,
            max,
        }
    }

    /// Sleep for the current delay, then double it up to the cap.
    pub fn wait(&mut self) {
        thread::sleep(self.current);
        self.current = (self.current * 2).min(self.max);
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    #[cfg(test)]
    pub fn current(&self) -> Duration {
        self.current
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_micros(50), Duration::from_millis(10))
    }
}

/// What a driver run produced.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub driver: &'static str,
    pub tasks: usize,
    pub total: i64,
    pub expected: i64,
    pub elapsed_ms: u128,
    pub metrics: SchedulerMetrics,
}

impl RunSummary {
    pub fn is_correct(&self) -> bool {
        self.total == self.expected
    }
}

/// Sum the scheduler should report for `tasks_per_value` tasks of each value.
pub fn expected_total(tasks_per_value: usize) -> i64 {
    tasks_per_value as i64 * VALUES.iter().sum::<i64>()
}

/// Run the selected driver against `scheduler`.
pub fn run(scheduler: &Arc<TaskScheduler>, command: &Command) -> Result<RunSummary> {
    let tasks_per_value = command.tasks_per_value();
    info!(
        "Running {} driver: {} tasks per value {:?}",
        command.name(),
        tasks_per_value,
        VALUES
    );

    let start = Instant::now();
    let total = match *command {
        Command::Sequential { tasks } => sequential(scheduler, tasks)?,
        Command::Multithread { tasks } => multithread(scheduler, tasks)?,
        Command::Stress {
            batches,
            batch_size,
            clients,
        } => stress(scheduler, batches, batch_size, clients)?,
    };

    Ok(RunSummary {
        driver: command.name(),
        tasks: tasks_per_value * VALUES.len(),
        total,
        expected: expected_total(tasks_per_value),
        elapsed_ms: start.elapsed().as_millis(),
        metrics: scheduler.metrics(),
    })
}

/// Submit everything from the calling thread, then collect everything.
fn sequential(scheduler: &TaskScheduler, tasks: usize) -> Result<i64> {
    let mut ids = Vec::with_capacity(tasks * VALUES.len());
    for value in VALUES {
        ids.extend(submit_batch(scheduler, value, tasks)?);
    }
    collect(scheduler, ids)
}

/// One client thread per value.
fn multithread(scheduler: &Arc<TaskScheduler>, tasks: usize) -> Result<i64> {
    let clients: Vec<_> = VALUES
        .into_iter()
        .map(|value| {
            let scheduler = Arc::clone(scheduler);
            thread::Builder::new()
                .name(format!("client-{}", value))
                .spawn(move || -> Result<i64> {
                    let ids = submit_batch(&scheduler, value, tasks)?;
                    collect(&scheduler, ids)
                })
                .context("failed to spawn client thread")
        })
        .collect::<Result<_>>()?;

    join_all(clients)
}

/// `clients` threads pull batch jobs off a shared counter until all
/// `batches` per value have run.
fn stress(
    scheduler: &Arc<TaskScheduler>,
    batches: usize,
    batch_size: usize,
    clients: usize,
) -> Result<i64> {
    let jobs: Arc<Vec<i64>> = Arc::new(
        VALUES
            .iter()
            .flat_map(|value| std::iter::repeat(*value).take(batches))
            .collect(),
    );
    let next = Arc::new(AtomicUsize::new(0));

    let clients: Vec<_> = (0..clients.max(1))
        .map(|index| {
            let scheduler = Arc::clone(scheduler);
            let jobs = Arc::clone(&jobs);
            let next = Arc::clone(&next);
            thread::Builder::new()
                .name(format!("client-{}", index))
                .spawn(move || -> Result<i64> {
                    let mut total = 0;
                    while let Some(&value) = jobs.get(next.fetch_add(1, Ordering::Relaxed)) {
                        let ids = submit_batch(&scheduler, value, batch_size)?;
                        total += collect(&scheduler, ids)?;
                    }
                    Ok(total)
                })
                .context("failed to spawn client thread")
        })
        .collect::<Result<_>>()?;

    join_all(clients)
}

fn join_all(clients: Vec<thread::JoinHandle<Result<i64>>>) -> Result<i64> {
    let mut total = 0;
    for client in clients {
        total += client
            .join()
            .map_err(|_| anyhow!("client thread panicked"))??;
    }
    Ok(total)
}

fn submit_batch(scheduler: &TaskScheduler, value: i64, count: usize) -> Result<Vec<TaskId>> {
    (0..count)
        .map(|_| {
            let task: Arc<dyn Task> = Arc::new(ScriptTask::new(format!("[].sum({})", value)));
            scheduler
                .submit(task)
                .with_context(|| format!("failed to submit task for value {}", value))
        })
        .collect()
}

/// Poll until every task in `ids` has a result, removing each as it is
/// collected. Backs off while a full pass finds nothing new.
fn collect(scheduler: &TaskScheduler, mut ids: Vec<TaskId>) -> Result<i64> {
    let mut total = 0;
    let mut backoff = Backoff::default();

    while !ids.is_empty() {
        let before = ids.len();
        let mut pending = Vec::with_capacity(ids.len());

        for id in ids {
            match scheduler.result(id)? {
                Some(value) => {
                    total += value
                        .as_i64()
                        .ok_or_else(|| anyhow!("task {} returned a non-integer: {}", id, value))?;
                    if !scheduler.remove(id)? {
                        bail!("task {} vanished before it could be removed", id);
                    }
                }
                None => pending.push(id),
            }
        }

        if pending.len() == before {
            backoff.wait();
        } else {
            backoff.reset();
        }
        ids = pending;
    }

    debug!("Client collected total {}", total);
    Ok(total)
}

#[cfg(test)]
mod tests {
    use tasker_core::SchedulerConfig;

    use super::*;

    fn scheduler() -> Arc<TaskScheduler> {
        Arc::new(TaskScheduler::new(SchedulerConfig::with_workers(4)).unwrap())
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let mut backoff = Backoff::new(Duration::from_micros(1), Duration::from_micros(4));
        backoff.wait();
        assert_eq!(backoff.current(), Duration::from_micros(2));
        backoff.wait();
        backoff.wait();
        assert_eq!(backoff.current(), Duration::from_micros(4));
        backoff.reset();
        assert_eq!(backoff.current(), Duration::from_micros(1));
    }

    #[test]
    fn expected_total_scales_with_task_count() {
        assert_eq!(expected_total(10_000), 1_110_000);
        assert_eq!(expected_total(0), 0);
    }

    #[test]
    fn sequential_collects_everything() {
        let scheduler = scheduler();
        let summary = run(&scheduler, &Command::Sequential { tasks: 50 }).unwrap();

        assert!(summary.is_correct(), "{:?}", summary);
        assert_eq!(summary.total, 5_550);
        assert_eq!(summary.tasks, 150);
        assert_eq!(summary.metrics.submitted, 150);
        assert_eq!(summary.metrics.done, 0);
        scheduler.shutdown().unwrap();
    }

    #[test]
    fn multithread_collects_everything() {
        let scheduler = scheduler();
        let summary = run(&scheduler, &Command::Multithread { tasks: 100 }).unwrap();

        assert!(summary.is_correct(), "{:?}", summary);
        assert_eq!(summary.metrics.removed, 300);
        scheduler.shutdown().unwrap();
    }

    #[test]
    fn stress_collects_everything() {
        let scheduler = scheduler();
        let command = Command::Stress {
            batches: 20,
            batch_size: 10,
            clients: 4,
        };
        let summary = run(&scheduler, &command).unwrap();

        assert!(summary.is_correct(), "{:?}", summary);
        assert_eq!(summary.total, expected_total(200));
        assert_eq!(summary.metrics.running, 0);
        scheduler.shutdown().unwrap();
    }

    #[test]
    fn submitting_after_shutdown_fails_the_run() {
        let scheduler = scheduler();
        scheduler.shutdown().unwrap();

        let err = run(&scheduler, &Command::Sequential { tasks: 1 }).unwrap_err();
        assert!(err.to_string().contains("failed to submit"));
    }
}
