//! Runtime error types.
//!
//! Todo-level failures are contained: they surface as todo status plus
//! event payload, never as an `Err` from the execution loop. The variants
//! here are for run-level and API-boundary failures.

use thiserror::Error;

/// Errors from the execution engine.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Plan-layer failure (unknown plan, malformed graph, bad transition).
    #[error(transparent)]
    Plan(#[from] maestro_plan::PlanError),

    /// The plan is not in a state the requested operation accepts.
    #[error("invalid plan state: {reason}")]
    InvalidPlanState {
        /// What was wrong.
        reason: String,
    },

    /// A task exceeded its timeout.
    #[error("task timed out after {timeout_ms}ms: {todo_id}")]
    Timeout {
        /// The todo that was running.
        todo_id: String,
        /// Configured timeout in milliseconds.
        timeout_ms: u64,
    },

    /// Plan generation nested past the recursion bound.
    #[error("recursion limit reached: depth {depth} >= max {max}")]
    RecursionLimit {
        /// Depth at the point of refusal.
        depth: u32,
        /// Configured bound.
        max: u32,
    },

    /// The run was cancelled. Expected during operator interrupts; not a
    /// failure for logging purposes.
    #[error("cancelled")]
    Cancelled,

    /// A worker reported an execution failure.
    #[error("worker: {0}")]
    Worker(String),

    /// The plan already has an active run.
    #[error("plan busy: {0}")]
    Busy(String),
}

impl RuntimeError {
    /// Whether the condition is expected to clear without operator
    /// intervention (retry, next dispatch, or normal interrupt flow).
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Cancelled | Self::Worker(_) | Self::Busy(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_classification() {
        assert!(RuntimeError::Cancelled.is_recoverable());
        assert!(RuntimeError::Worker("boom".into()).is_recoverable());
        assert!(
            RuntimeError::Timeout {
                todo_id: "todo-1".into(),
                timeout_ms: 300_000,
            }
            .is_recoverable()
        );
        assert!(!RuntimeError::RecursionLimit { depth: 3, max: 3 }.is_recoverable());
        assert!(
            !RuntimeError::InvalidPlanState {
                reason: "draft".into()
            }
            .is_recoverable()
        );
    }

    #[test]
    fn plan_error_converts() {
        let err: RuntimeError = maestro_plan::PlanError::invalid("bad graph").into();
        assert!(matches!(err, RuntimeError::Plan(_)));
        assert!(!err.is_recoverable());
    }
}
