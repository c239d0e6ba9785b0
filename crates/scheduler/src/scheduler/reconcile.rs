use std::sync::{Arc, PoisonError, TryLockError};

use tracing::{debug, error, trace, warn};

use tasker_core::{SchedulerError, TaskError, TaskOutcome};

use crate::pool::HandleState;

use super::core::{read_lock, write_lock, DoneEntry};
use super::TaskScheduler;

impl TaskScheduler {
    /// Move every finished task from running into done.
    ///
    /// Only one thread sweeps at a time. A caller that finds a sweep in
    /// progress returns at once without waiting: the sweeping thread picks
    /// up whatever has finished, and the next poll sees the rest.
    ///
    /// Handles are polled under the running read lock, so submissions and
    /// status queries from other threads proceed during the poll; the write
    /// locks are taken only to move finished entries. Only the sweeping
    /// thread removes running entries, so nothing polled here disappears
    /// before the move.
    ///
    /// A lost handle does not stop the sweep. The entry is stored as a
    /// [`TaskError::Lost`] failure and [`SchedulerError::Interrupted`] is
    /// returned once every other entry has been processed.
    pub(super) fn reconcile(&self) -> Result<(), SchedulerError> {
        let _sweep = match self.reconcile_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                trace!("Reconciliation already in progress, skipping");
                return Ok(());
            }
            // The mutex protects no data.
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        let mut finished = Vec::new();
        let mut lost = Vec::new();
        for (id, entry) in read_lock(&self.running, "running")?.iter() {
            let mut handle = entry.handle.lock().unwrap_or_else(PoisonError::into_inner);
            match handle.poll() {
                HandleState::Pending => {}
                HandleState::Ready(completion) => finished.push((*id, completion)),
                HandleState::Lost => lost.push(*id),
            }
        }

        if finished.is_empty() && lost.is_empty() {
            return Ok(());
        }

        let mut running = write_lock(&self.running, "running")?;
        let mut done = write_lock(&self.done, "done")?;
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);

        let finished_count = finished.len();
        for (id, completion) in finished {
            let Some(entry) = running.remove(&id) else {
                continue;
            };

            match &completion.outcome {
                TaskOutcome::Succeeded(_) => {
                    trace!("Task {} completed in {:?}", id, completion.elapsed)
                }
                TaskOutcome::Failed(err) => {
                    error!("Failed to execute task {} ({}): {}", id, entry.task.name(), err)
                }
            }

            metrics.record_completion(completion.outcome.is_success(), completion.elapsed);
            done.insert(
                id,
                DoneEntry {
                    task: entry.task,
                    outcome: completion.outcome,
                },
            );
        }

        for id in &lost {
            if let Some(entry) = running.remove(id) {
                warn!("Task {} ({}) lost its result handle", id, entry.task.name());
                metrics.record_completion(false, entry.submitted_at.elapsed());
                done.insert(
                    *id,
                    DoneEntry {
                        task: entry.task,
                        outcome: TaskOutcome::Failed(Arc::new(TaskError::Lost)),
                    },
                );
            }
        }

        debug!(
            "Reconciled {} finished tasks ({} still running, {} done)",
            finished_count + lost.len(),
            running.len(),
            done.len()
        );

        if lost.is_empty() {
            Ok(())
        } else {
            Err(SchedulerError::Interrupted(format!(
                "{} task handle(s) dropped by the worker pool without a result",
                lost.len()
            )))
        }
    }
}
