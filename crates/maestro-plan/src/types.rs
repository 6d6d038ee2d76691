//! Core types for plans and todos.
//!
//! All serializable types use `camelCase` for wire compatibility with the
//! console renderer and structured UI observers. Timestamps are ISO 8601
//! strings, durations are milliseconds.

use maestro_core::ids::{PlanId, TodoId};
use serde::{Deserialize, Serialize};

use crate::errors::PlanError;

// ─────────────────────────────────────────────────────────────────────────────
// Enums
// ─────────────────────────────────────────────────────────────────────────────

/// Plan lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// Created, awaiting approval.
    Draft,
    /// Approved by the operator, ready to execute.
    Approved,
    /// Currently being driven by the orchestrator.
    Executing,
    /// All todos succeeded.
    Completed,
    /// At least one todo failed, or a critical failure stopped the run.
    Failed,
    /// Operator interrupt ended the run.
    Cancelled,
}

impl PlanStatus {
    /// Whether this status represents a terminal state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Stable string form (matches the serde rename values).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Approved => "approved",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Todo workflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    /// Not yet dispatched.
    Pending,
    /// Dispatched to a worker.
    InProgress,
    /// Done.
    Completed,
    /// Timed out, errored, or had an unmet dependency. Terminal per todo,
    /// non-terminal for the plan.
    Failed,
}

impl TodoStatus {
    /// Whether this status represents a terminal state for the todo.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Stable string form (matches the serde rename values).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TodoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Todo priority level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Low priority.
    Low,
    /// Default priority.
    Medium,
    /// Elevated priority.
    High,
    /// Urgent.
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

/// Risk classification for a whole plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Read-only or trivially reversible work.
    Low,
    /// Writes files inside the workspace.
    Medium,
    /// Runs commands with side effects.
    High,
    /// Destructive operations (deletions, deployments).
    Critical,
}

impl Default for RiskLevel {
    fn default() -> Self {
        Self::Low
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Domain types
// ─────────────────────────────────────────────────────────────────────────────

/// One declared side-effecting operation a todo intends to perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclaredOperation {
    /// Human-readable summary.
    pub description: String,
    /// Command to run, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Files this operation touches.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    /// Whether the operation is destructive (gates extra approval and the
    /// continue-or-stop policy on failure).
    #[serde(default)]
    pub destructive: bool,
}

/// One unit of work within a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    /// Unique id (prefixed: `todo-{uuid}`).
    pub id: TodoId,
    /// Short description.
    pub title: String,
    /// Detailed description.
    #[serde(default)]
    pub description: String,
    /// Priority level.
    #[serde(default)]
    pub priority: Priority,
    /// Free-form category tag.
    #[serde(default)]
    pub category: String,
    /// Current status.
    pub status: TodoStatus,
    /// Dependencies by id — a weak relation, not ownership.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<TodoId>,
    /// Estimated duration in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_ms: Option<u64>,
    /// Actual duration in milliseconds, once terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_ms: Option<u64>,
    /// Progress percentage, 0–100. Invariant: `100` iff completed, reset
    /// to `0` on failure.
    pub progress: u8,
    /// Declared side-effecting operations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<DeclaredOperation>,
    /// Free-text reasoning behind this step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl Todo {
    /// Create a pending todo with default priority and no dependencies.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: TodoId::generate(),
            title: title.into(),
            description: String::new(),
            priority: Priority::default(),
            category: String::new(),
            status: TodoStatus::Pending,
            depends_on: Vec::new(),
            estimated_ms: None,
            actual_ms: None,
            progress: 0,
            operations: Vec::new(),
            reasoning: None,
        }
    }

    /// Builder-style: add a dependency.
    #[must_use]
    pub fn depends_on(mut self, id: TodoId) -> Self {
        self.depends_on.push(id);
        self
    }

    /// Builder-style: set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Builder-style: add a declared operation.
    #[must_use]
    pub fn with_operation(mut self, op: DeclaredOperation) -> Self {
        self.operations.push(op);
        self
    }

    /// Whether any declared operation is destructive.
    #[must_use]
    pub fn is_destructive(&self) -> bool {
        self.operations.iter().any(|op| op.destructive)
    }

    /// Whether a failure of this todo should be treated as critical
    /// (destructive operations or critical priority).
    #[must_use]
    pub fn is_critical(&self) -> bool {
        self.is_destructive() || self.priority == Priority::Critical
    }

    /// Transition to a new status, maintaining the progress invariant.
    ///
    /// `in_progress` is only reachable from `pending`; terminal statuses
    /// are only reachable from `in_progress` or `pending` (a todo can fail
    /// its dependency gate without ever running).
    pub fn set_status(&mut self, status: TodoStatus) -> Result<(), PlanError> {
        let allowed = match (self.status, status) {
            (TodoStatus::Pending, TodoStatus::InProgress)
            | (TodoStatus::Pending | TodoStatus::InProgress, TodoStatus::Failed)
            | (TodoStatus::InProgress, TodoStatus::Completed) => true,
            (a, b) => a == b,
        };
        if !allowed {
            return Err(PlanError::InvalidTransition {
                from: self.status.to_string(),
                to: status.to_string(),
            });
        }
        self.status = status;
        match status {
            TodoStatus::Completed => self.progress = 100,
            TodoStatus::Failed => self.progress = 0,
            TodoStatus::Pending | TodoStatus::InProgress => {}
        }
        Ok(())
    }

    /// Update progress while running. Clamped to 0–99; `100` is reserved
    /// for the completed transition.
    pub fn set_progress(&mut self, progress: u8) {
        if self.status == TodoStatus::InProgress {
            self.progress = progress.min(99);
        }
    }
}

/// One execution request: the top-level unit of work produced from a single
/// natural-language request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    /// Unique id (prefixed: `plan-{uuid}`).
    pub id: PlanId,
    /// Short title.
    pub title: String,
    /// Longer description.
    #[serde(default)]
    pub description: String,
    /// The originating request text, verbatim.
    pub request: String,
    /// Ordered todos. Insertion order is the deterministic tiebreak for
    /// the resolver.
    pub todos: Vec<Todo>,
    /// Aggregate estimated duration in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_ms: Option<u64>,
    /// Risk classification.
    pub risk: RiskLevel,
    /// Lifecycle status.
    pub status: PlanStatus,
    /// Creation timestamp (ISO 8601).
    pub created_at: String,
    /// Approval timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<String>,
    /// Execution start timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    /// Terminal timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl Plan {
    /// Look up a todo by id.
    #[must_use]
    pub fn todo(&self, id: &TodoId) -> Option<&Todo> {
        self.todos.iter().find(|t| &t.id == id)
    }

    /// Look up a todo by id, mutably.
    pub fn todo_mut(&mut self, id: &TodoId) -> Option<&mut Todo> {
        self.todos.iter_mut().find(|t| &t.id == id)
    }

    /// Count of todos in a given status.
    #[must_use]
    pub fn count_status(&self, status: TodoStatus) -> usize {
        self.todos.iter().filter(|t| t.status == status).count()
    }

    /// Whether every todo reached a terminal state.
    #[must_use]
    pub fn all_todos_terminal(&self) -> bool {
        self.todos.iter().all(|t| t.status.is_terminal())
    }
}

/// Current UTC time as an ISO 8601 string (shared timestamp format).
#[must_use]
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
