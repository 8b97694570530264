//! Interval tasks driven by the UI loop.
//!
//! Nothing here spawns threads or timers. The owner calls [`ScheduledTask::poll`]
//! with the current instant (once per repaint) and runs the task body when it
//! returns true. Cancellation goes through a [`CancellationToken`], so a whole
//! family of tasks can be stopped from one [`Scheduler`].

use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Root of a family of scheduled tasks.
#[derive(Debug, Default)]
pub struct Scheduler {
    root: CancellationToken,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a task whose token is a child of this scheduler's root.
    /// The first run is due immediately unless `start` is false.
    pub fn task(&self, name: &'static str, interval: Duration, start: bool) -> ScheduledTask {
        let task = ScheduledTask {
            name,
            interval,
            next_due: None,
            parent: self.root.clone(),
            token: self.root.child_token(),
        };
        if !start {
            task.token.cancel();
        }
        task
    }

    /// Cancels every task created from this scheduler.
    pub fn shutdown(&self) {
        self.root.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.root.is_cancelled()
    }
}

#[derive(Debug)]
pub struct ScheduledTask {
    name: &'static str,
    interval: Duration,
    next_due: Option<Instant>,
    parent: CancellationToken,
    token: CancellationToken,
}

impl ScheduledTask {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Returns true when the task should run now, and books the next run.
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        match self.next_due {
            Some(due) if now < due => false,
            _ => {
                self.next_due = Some(now + self.interval);
                true
            }
        }
    }

    pub fn cancel(&mut self) {
        self.token.cancel();
        self.next_due = None;
    }

    /// Re-arms a cancelled task with a fresh token; the next poll runs it.
    /// Has no effect once the owning scheduler was shut down.
    pub fn restart(&mut self) {
        if self.parent.is_cancelled() {
            return;
        }
        if self.token.is_cancelled() {
            self.token = self.parent.child_token();
        }
        self.next_due = None;
    }

    /// Time left until the next run, `None` when cancelled.
    pub fn time_until_due(&self, now: Instant) -> Option<Duration> {
        if self.token.is_cancelled() {
            return None;
        }
        Some(
            self.next_due
                .map_or(Duration::ZERO, |due| due.saturating_duration_since(now)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(700);

    #[test]
    fn poll_fires_once_per_interval() {
        let scheduler = Scheduler::new();
        let mut task = scheduler.task("ads", TICK, true);
        let t0 = Instant::now();

        assert!(task.poll(t0));
        assert!(!task.poll(t0 + Duration::from_millis(100)));
        assert_eq!(
            task.time_until_due(t0 + Duration::from_millis(100)),
            Some(Duration::from_millis(600))
        );
        assert!(task.poll(t0 + TICK));
        assert!(!task.poll(t0 + TICK));
    }

    #[test]
    fn cancelled_task_never_fires_until_restarted() {
        let scheduler = Scheduler::new();
        let mut task = scheduler.task("ads", TICK, true);
        let t0 = Instant::now();
        assert!(task.poll(t0));

        task.cancel();
        assert!(!task.poll(t0 + TICK * 5));
        assert_eq!(task.time_until_due(t0), None);

        task.restart();
        assert!(task.is_active());
        assert!(task.poll(t0 + TICK * 5));
    }

    #[test]
    fn task_created_stopped_waits_for_restart() {
        let scheduler = Scheduler::new();
        let mut task = scheduler.task("frames", TICK, false);
        assert!(!task.poll(Instant::now()));
        task.restart();
        assert!(task.poll(Instant::now()));
    }

    #[test]
    fn shutdown_cancels_all_children_for_good() {
        let scheduler = Scheduler::new();
        let mut a = scheduler.task("a", TICK, true);
        let mut b = scheduler.task("b", TICK, true);
        scheduler.shutdown();

        let now = Instant::now();
        assert!(!a.poll(now));
        assert!(!b.poll(now));
        b.restart();
        assert!(!b.is_active());
        assert!(scheduler.is_shut_down());
    }
}
