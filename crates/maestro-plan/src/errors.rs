//! Plan-layer error types.

use thiserror::Error;

/// Errors from plan creation, mutation, and persistence.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The supplied todo set has a malformed dependency graph
    /// (unknown dependency ids, duplicates, or self-dependencies).
    /// Fatal to plan creation.
    #[error("invalid plan: {reason}")]
    InvalidPlan {
        /// What made the graph malformed.
        reason: String,
    },

    /// No plan with the given id.
    #[error("plan not found: {0}")]
    NotFound(String),

    /// No todo with the given id inside the plan.
    #[error("todo not found: {0}")]
    TodoNotFound(String),

    /// A status transition the state machine does not allow.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        /// Status before the attempted transition.
        from: String,
        /// Requested status.
        to: String,
    },

    /// Filesystem failure while persisting or loading a snapshot.
    #[error("persistence io: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot (de)serialization failure.
    #[error("persistence serde: {0}")]
    Serde(#[from] serde_json::Error),
}

impl PlanError {
    /// Shorthand for [`PlanError::InvalidPlan`].
    #[must_use]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidPlan {
            reason: reason.into(),
        }
    }
}
