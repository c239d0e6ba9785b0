use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Scheduler operational metrics.
///
/// Counters are maintained by the scheduler; the gauge fields (`running`,
/// `done`, `queued`, `in_flight`, `accepting`) are filled in when a
/// snapshot is taken.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerMetrics {
    /// Tasks accepted by `submit`.
    pub submitted: u64,
    /// Tasks reconciled with a value.
    pub succeeded: u64,
    /// Tasks reconciled with a failure.
    pub failed: u64,
    /// Done entries deleted by `remove`.
    pub removed: u64,
    /// Mean execution time over all reconciled tasks.
    pub avg_task_duration: Duration,
    /// When the most recent completion was reconciled.
    pub last_completed: Option<DateTime<Utc>>,
    /// Entries currently in the running collection.
    pub running: usize,
    /// Entries currently in the done collection.
    pub done: usize,
    /// Tasks waiting for a worker.
    pub queued: usize,
    /// Tasks executing right now.
    pub in_flight: usize,
    pub worker_threads: usize,
    /// Whether the worker pool still takes submissions.
    pub accepting: bool,
}

impl SchedulerMetrics {
    pub fn record_submission(&mut self) {
        self.submitted += 1;
    }

    /// Record a reconciled completion.
    pub fn record_completion(&mut self, success: bool, duration: Duration) {
        if success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.last_completed = Some(Utc::now());

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let count = self.completed();
        self.avg_task_duration = if count == 1 {
            duration
        } else {
            let prev_nanos = self.avg_task_duration.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };
    }

    pub fn record_removal(&mut self) {
        self.removed += 1;
    }

    /// Total reconciled completions, successful or not.
    pub fn completed(&self) -> u64 {
        self.succeeded + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_single_completion() {
        let mut m = SchedulerMetrics::default();
        m.record_submission();
        m.record_completion(true, Duration::from_millis(100));

        assert_eq!(m.submitted, 1);
        assert_eq!(m.succeeded, 1);
        assert_eq!(m.failed, 0);
        assert!(m.last_completed.is_some());
        assert_eq!(m.avg_task_duration, Duration::from_millis(100));
    }

    #[test]
    fn record_multiple_completions_averages() {
        let mut m = SchedulerMetrics::default();
        m.record_completion(true, Duration::from_millis(100));
        m.record_completion(false, Duration::from_millis(200));

        assert_eq!(m.completed(), 2);
        assert_eq!(m.failed, 1);
        // Average of 100ms and 200ms = 150ms
        let avg = m.avg_task_duration.as_millis();
        assert!((140..=160).contains(&avg), "expected ~150ms, got {}ms", avg);
    }

    #[test]
    fn default_metrics() {
        let m = SchedulerMetrics::default();
        assert_eq!(m.completed(), 0);
        assert_eq!(m.removed, 0);
        assert!(m.last_completed.is_none());
        assert!(!m.accepting);
    }
}
