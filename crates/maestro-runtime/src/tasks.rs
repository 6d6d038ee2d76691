//! Background task records.
//!
//! A [`BackgroundTask`] is the runtime handle for one dispatched todo:
//! status, timestamps, heartbeat, and its cancellation token. The
//! [`TaskRegistry`] keeps terminal tasks around for a grace period so late
//! status queries still resolve, then garbage-collects them.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use maestro_core::ids::{PlanId, TaskId, TodoId};
use maestro_plan::Priority;
use metrics::gauge;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How long a terminal task stays queryable before GC.
pub const DEFAULT_GC_GRACE: Duration = Duration::from_secs(60);

/// Runtime status of a background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Created, not yet dispatched.
    Queued,
    /// Running on a worker.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error or timeout.
    Failed,
    /// Interrupted before completion.
    Cancelled,
}

impl TaskStatus {
    /// Whether the status is terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Stable string form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Runtime handle for one dispatched todo.
#[derive(Debug, Clone)]
pub struct BackgroundTask {
    /// Task id.
    pub id: TaskId,
    /// Plan the todo belongs to.
    pub plan_id: PlanId,
    /// The todo being executed.
    pub todo_id: TodoId,
    /// Worker that owns the task.
    pub agent_id: String,
    /// Dispatch priority, copied from the todo.
    pub priority: Priority,
    /// Current status.
    pub status: TaskStatus,
    /// When the task record was created.
    pub created: Instant,
    /// When the task started running.
    pub started: Option<Instant>,
    /// When the task reached a terminal status.
    pub finished: Option<Instant>,
    /// Last heartbeat from the worker.
    pub last_heartbeat: Option<Instant>,
    /// Progress message from the most recent heartbeat.
    pub last_progress: Option<String>,
    /// Cancels this task's worker call.
    pub cancel: CancellationToken,
}

/// Registry of background tasks with terminal-task GC.
pub struct TaskRegistry {
    tasks: Mutex<HashMap<TaskId, BackgroundTask>>,
    gc_grace: Duration,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_GC_GRACE)
    }
}

impl TaskRegistry {
    /// Create a registry with the given GC grace period.
    #[must_use]
    pub fn new(gc_grace: Duration) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            gc_grace,
        }
    }

    /// Create a queued task for a todo. Its token is a child of `parent`,
    /// so cancelling the run cancels every task.
    pub fn create(
        &self,
        plan_id: PlanId,
        todo_id: TodoId,
        agent_id: impl Into<String>,
        priority: Priority,
        parent: &CancellationToken,
    ) -> BackgroundTask {
        let task = BackgroundTask {
            id: TaskId::generate(),
            plan_id,
            todo_id,
            agent_id: agent_id.into(),
            priority,
            status: TaskStatus::Queued,
            created: Instant::now(),
            started: None,
            finished: None,
            last_heartbeat: None,
            last_progress: None,
            cancel: parent.child_token(),
        };
        let mut tasks = self.tasks.lock();
        let _ = tasks.insert(task.id.clone(), task.clone());
        gauge!("maestro_tasks_tracked").set(tasks.len() as f64);
        task
    }

    /// Mark a task running.
    pub fn mark_running(&self, id: &TaskId) {
        if let Some(task) = self.tasks.lock().get_mut(id) {
            task.status = TaskStatus::Running;
            task.started = Some(Instant::now());
            task.last_heartbeat = Some(Instant::now());
        }
    }

    /// Mark a task terminal. Already-terminal tasks keep their status.
    pub fn mark_terminal(&self, id: &TaskId, status: TaskStatus) {
        debug_assert!(status.is_terminal());
        if let Some(task) = self.tasks.lock().get_mut(id) {
            if task.status.is_terminal() {
                return;
            }
            task.status = status;
            task.finished = Some(Instant::now());
        }
    }

    /// Record a heartbeat from a running task, with a progress message.
    pub fn heartbeat(&self, id: &TaskId, message: impl Into<String>) {
        if let Some(task) = self.tasks.lock().get_mut(id) {
            task.last_heartbeat = Some(Instant::now());
            task.last_progress = Some(message.into());
        }
    }

    /// Status of a task, if still tracked.
    #[must_use]
    pub fn status(&self, id: &TaskId) -> Option<TaskStatus> {
        self.tasks.lock().get(id).map(|t| t.status)
    }

    /// Snapshot of a task record.
    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<BackgroundTask> {
        self.tasks.lock().get(id).cloned()
    }

    /// Cancel one task's token. Returns whether the task was tracked and
    /// non-terminal.
    pub fn cancel(&self, id: &TaskId) -> bool {
        let tasks = self.tasks.lock();
        match tasks.get(id) {
            Some(task) if !task.status.is_terminal() => {
                task.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Cancel every non-terminal task. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        for task in self.tasks.lock().values() {
            if !task.status.is_terminal() {
                task.cancel.cancel();
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Drop terminal tasks older than the grace period. Returns how many
    /// were collected.
    pub fn gc(&self) -> usize {
        let mut tasks = self.tasks.lock();
        let before = tasks.len();
        let grace = self.gc_grace;
        tasks.retain(|_, task| match task.finished {
            Some(finished) => finished.elapsed() < grace,
            None => true,
        });
        let collected = before - tasks.len();
        if collected > 0 {
            debug!(collected, remaining = tasks.len(), "task registry gc");
            gauge!("maestro_tasks_tracked").set(tasks.len() as f64);
        }
        collected
    }

    /// Number of tracked tasks (including terminal ones inside grace).
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Whether no tasks are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }
}
