//! Lifecycle event types for plan execution.
//!
//! [`PlanEvent`] is the tagged union published on the event bus as a plan
//! executes. Every variant carries a [`BaseEvent`] (plan id + timestamp)
//! and required, typed payload fields — payloads are validated by
//! construction, not at publish time.
//!
//! Observers (console renderer, structured UI, session transcript) consume
//! these events without the orchestrator knowing they exist.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{PlanId, TodoId};

// ─────────────────────────────────────────────────────────────────────────────
// Common payload pieces
// ─────────────────────────────────────────────────────────────────────────────

/// Common fields for all plan events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseEvent {
    /// Plan this event belongs to.
    pub plan_id: PlanId,
    /// ISO 8601 timestamp.
    pub timestamp: String,
}

impl BaseEvent {
    /// Create a new base event with the current UTC timestamp.
    #[must_use]
    pub fn now(plan_id: PlanId) -> Self {
        Self {
            plan_id,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Terminal outcome of one todo, as carried by [`PlanEvent::TodoComplete`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoOutcome {
    /// The todo finished successfully.
    Completed,
    /// The todo failed (timeout, worker error, or unmet dependency).
    Failed,
    /// The todo was cancelled by operator interrupt.
    Cancelled,
}

// ─────────────────────────────────────────────────────────────────────────────
// plan_events! macro — generates PlanEvent, base(), event_type()
// ─────────────────────────────────────────────────────────────────────────────

/// Declarative macro that generates [`PlanEvent`], its `base()` and
/// `event_type()` accessors, and a compile-time `VARIANT_COUNT`.
///
/// Adding a new variant requires ONE edit (inside this invocation).
/// The compiler enforces exhaustive matching everywhere else.
macro_rules! plan_events {
    ($(
        $(#[doc = $doc:literal])*
        $variant:ident {
            $(
                $(#[$fmeta:meta])*
                $field:ident : $ty:ty
            ),*
            $(,)?
        } => $rename:literal
    ),* $(,)?) => {
        /// Lifecycle event with plan context.
        ///
        /// The serialized form is a flat object discriminated by `type`;
        /// downstream renderers rely on exact type strings and field names.
        #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
        #[serde(tag = "type")]
        #[allow(missing_docs)]
        pub enum PlanEvent {
            $(
                $(#[doc = $doc])*
                #[serde(rename = $rename)]
                $variant {
                    #[serde(flatten)]
                    base: BaseEvent,
                    $(
                        $(#[$fmeta])*
                        $field: $ty,
                    )*
                },
            )*
        }

        impl PlanEvent {
            /// Get the base event fields.
            #[must_use]
            pub fn base(&self) -> &BaseEvent {
                match self {
                    $(Self::$variant { base, .. } => base,)*
                }
            }

            /// Get the event type string (for type discrimination).
            #[must_use]
            pub fn event_type(&self) -> &str {
                match self {
                    $(Self::$variant { .. } => $rename,)*
                }
            }

            /// The plan this event belongs to.
            #[must_use]
            pub fn plan_id(&self) -> &PlanId {
                &self.base().plan_id
            }
        }

        /// Number of `PlanEvent` variants (compile-time constant for tests).
        #[cfg(test)]
        pub(crate) const VARIANT_COUNT: usize = [$($rename),*].len();
    };
}

plan_events! {
    // -- Todo lifecycle --

    /// A todo entered `in_progress` and was dispatched.
    TodoStart {
        #[serde(rename = "todoId")]
        todo_id: TodoId,
        title: String,
    } => "todo_start",

    /// Heartbeat/progress update from a running todo.
    TodoProgress {
        #[serde(rename = "todoId")]
        todo_id: TodoId,
        /// 0–100.
        progress: u8,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    } => "todo_progress",

    /// A todo reached a terminal status.
    TodoComplete {
        #[serde(rename = "todoId")]
        todo_id: TodoId,
        outcome: TodoOutcome,
        #[serde(rename = "durationMs")]
        duration_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    } => "todo_complete",

    // -- Provider stream --

    /// The completion provider requested a tool invocation.
    ToolCall {
        #[serde(rename = "todoId")]
        todo_id: TodoId,
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        name: String,
        arguments: Value,
    } => "tool_call",

    /// A tool invocation produced a result.
    ToolResult {
        #[serde(rename = "todoId")]
        todo_id: TodoId,
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        content: String,
        #[serde(rename = "isError")]
        is_error: bool,
    } => "tool_result",

    // -- Plan lifecycle --

    /// All todos reached a terminal state and every one succeeded.
    PlanComplete {
        completed: u32,
        #[serde(rename = "durationMs")]
        duration_ms: u64,
    } => "plan_complete",

    /// The run ended with at least one failed or cancelled todo.
    PlanFailed {
        completed: u32,
        failed: u32,
        cancelled: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    } => "plan_failed",

    // -- Budget --

    /// Session token usage crossed the compaction threshold.
    CompactionSuggested {
        #[serde(rename = "sessionTokens")]
        session_tokens: u64,
        threshold: u64,
    } => "compaction_suggested",
}

/// Convenience constructor for a `todo_start` event.
#[must_use]
pub fn todo_start_event(plan_id: PlanId, todo_id: TodoId, title: impl Into<String>) -> PlanEvent {
    PlanEvent::TodoStart {
        base: BaseEvent::now(plan_id),
        todo_id,
        title: title.into(),
    }
}

/// Convenience constructor for a `todo_complete` event.
#[must_use]
pub fn todo_complete_event(
    plan_id: PlanId,
    todo_id: TodoId,
    outcome: TodoOutcome,
    duration_ms: u64,
    error: Option<String>,
) -> PlanEvent {
    PlanEvent::TodoComplete {
        base: BaseEvent::now(plan_id),
        todo_id,
        outcome,
        duration_ms,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid() -> PlanId {
        PlanId::generate()
    }

    fn tid() -> TodoId {
        TodoId::generate()
    }

    #[test]
    fn event_type_strings() {
        let e = todo_start_event(pid(), tid(), "build");
        assert_eq!(e.event_type(), "todo_start");

        let e = PlanEvent::PlanComplete {
            base: BaseEvent::now(pid()),
            completed: 3,
            duration_ms: 1200,
        };
        assert_eq!(e.event_type(), "plan_complete");
    }

    #[test]
    fn variant_count_matches_event_surface() {
        // todo_start, todo_progress, todo_complete, tool_call, tool_result,
        // plan_complete, plan_failed, compaction_suggested
        assert_eq!(VARIANT_COUNT, 8);
    }

    #[test]
    fn serde_tagged_roundtrip() {
        let e = PlanEvent::ToolCall {
            base: BaseEvent::now(pid()),
            todo_id: tid(),
            tool_call_id: "tc_1".into(),
            name: "run_command".into(),
            arguments: serde_json::json!({"cmd": "cargo check"}),
        };
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("\"type\":\"tool_call\""));
        assert!(json.contains("\"toolCallId\":\"tc_1\""));
        let back: PlanEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn base_flattened_on_wire() {
        let plan = pid();
        let e = todo_start_event(plan.clone(), tid(), "t");
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["planId"], plan.as_str());
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn plan_id_accessor() {
        let plan = pid();
        let e = todo_start_event(plan.clone(), tid(), "t");
        assert_eq!(e.plan_id(), &plan);
    }

    #[test]
    fn outcome_serde_values() {
        assert_eq!(
            serde_json::to_string(&TodoOutcome::Completed).unwrap(),
            "\"completed\""
        );
        assert_eq!(
            serde_json::to_string(&TodoOutcome::Cancelled).unwrap(),
            "\"cancelled\""
        );
    }

    #[test]
    fn optional_error_skipped_when_none() {
        let e = todo_complete_event(pid(), tid(), TodoOutcome::Completed, 5, None);
        let json = serde_json::to_string(&e).unwrap();
        assert!(!json.contains("\"error\""));
    }
}
