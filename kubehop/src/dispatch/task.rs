//! Task handles, stop flags and interruptible sleeps.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, sleep};

/// Granularity at which sleeps notice a stop request.
pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Cooperative cancellation flag shared between a task and its owner.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the task to stop. It notices at its next check.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Sleep for `duration` in short steps, returning early once `stop` is set.
///
/// Returns `true` if the full duration elapsed.
pub async fn sleep_unless_stopped(duration: Duration, stop: &StopFlag) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if stop.is_stopped() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        sleep(STOP_POLL_INTERVAL.min(deadline - now)).await;
    }
}

/// Where a dispatched task is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Cancelled | TaskState::Failed
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Idle => "idle",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Cancelled => "cancelled",
            TaskState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Observes and stops one dispatched task.
///
/// Results never come through the handle; they arrive as events.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    name: &'static str,
    stop: StopFlag,
    state: watch::Receiver<TaskState>,
}

impl TaskHandle {
    pub(crate) fn new(name: &'static str, stop: StopFlag, state: watch::Receiver<TaskState>) -> Self {
        Self { name, stop, state }
    }

    /// The action this task runs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Ask the task to stop.
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn stop_flag(&self) -> &StopFlag {
        &self.stop
    }

    /// The current state. A task that was aborted counts as cancelled.
    pub fn state(&self) -> TaskState {
        let state = *self.state.borrow();
        if !state.is_terminal() && self.state.has_changed().is_err() {
            return TaskState::Cancelled;
        }
        state
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Wait until the task has finished and return its final state.
    pub async fn finished(&mut self) -> TaskState {
        let result = self.state.wait_for(TaskState::is_terminal).await.map(|state| *state);
        match result {
            Ok(state) => state,
            Err(_) => self.state(),
        }
    }
}
