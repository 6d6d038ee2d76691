//! Boundary contracts.
//!
//! The orchestrator only knows these traits. Concrete workers, providers,
//! and approval surfaces (console, structured UI, tests) plug in at
//! construction time.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use maestro_budget::TokenUsage;
use maestro_core::ids::{PlanId, TaskId, TodoId};
use maestro_plan::{Plan, Todo};
use tokio_util::sync::CancellationToken;

use crate::bus::EventBus;
use crate::errors::RuntimeError;

/// Everything a worker needs to run one todo: identity, the event bus for
/// progress and tool events, and the run's cancellation token.
#[derive(Clone)]
pub struct TaskContext {
    /// Plan being executed.
    pub plan_id: PlanId,
    /// Todo being executed.
    pub todo_id: TodoId,
    /// Background task handle id.
    pub task_id: TaskId,
    /// Bus for progress / tool-call / tool-result events.
    pub bus: Arc<EventBus>,
    /// Cancelled when the run is interrupted.
    pub cancel: CancellationToken,
}

/// What a worker reports back for a finished todo.
#[derive(Debug, Clone, Default)]
pub struct TaskReport {
    /// Human-readable result summary.
    pub summary: String,
    /// Token usage incurred, for budget accounting.
    pub usage: TokenUsage,
    /// Model that produced the usage (empty for non-LLM work).
    pub model: String,
}

/// Executes todos. One call per todo; implementations decide what
/// "executing" means (subprocess, provider loop, simulation).
#[async_trait]
pub trait Worker: Send + Sync {
    /// Execute one todo to completion or failure. Implementations should
    /// return promptly once `ctx.cancel` fires.
    async fn execute(&self, todo: &Todo, ctx: TaskContext) -> Result<TaskReport, RuntimeError>;

    /// Stable identifier recorded on each task this worker runs.
    fn agent_id(&self) -> &str {
        "worker"
    }

    /// Best-effort cancellation of any work outstanding outside the
    /// per-task tokens (subprocess pools, connection drains). Returns how
    /// many in-flight units were cancelled.
    async fn cancel_all(&self) -> usize {
        0
    }
}

/// One chunk of a streaming completion.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionChunk {
    /// Incremental assistant text.
    TextDelta(String),
    /// The model requested a tool invocation.
    ToolCall {
        /// Provider-assigned call id.
        id: String,
        /// Tool name.
        name: String,
        /// Tool arguments.
        arguments: serde_json::Value,
    },
    /// A tool invocation produced a result.
    ToolResult {
        /// Matches the originating call id.
        id: String,
        /// Result content.
        content: String,
        /// Whether the tool reported failure.
        is_error: bool,
    },
    /// Stream-level provider error. Terminal.
    Error(String),
    /// End of stream, with final usage. Terminal.
    Done {
        /// Token usage for the whole request.
        usage: TokenUsage,
    },
}

/// Boxed chunk stream returned by providers.
pub type ChunkStream = Pin<Box<dyn Stream<Item = CompletionChunk> + Send>>;

/// Streaming model backend.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Start a completion for a prompt.
    async fn complete(&self, prompt: &str) -> Result<ChunkStream, RuntimeError>;

    /// Model identifier, for pricing.
    fn model(&self) -> &str;
}

/// Asks the operator a yes/no question.
#[async_trait]
pub trait Approver: Send + Sync {
    /// Present a question with supporting detail; `default` is the answer
    /// when the surface cannot ask (non-interactive runs).
    async fn request_approval(&self, question: &str, details: &str, default: bool) -> bool;
}

/// Receives plan state for persistence. Both operations are best-effort
/// from the orchestrator's point of view.
pub trait PlanSink: Send + Sync {
    /// Persist the plan's current state.
    fn save_plan(&self, plan: &Plan);

    /// Remove persisted artifacts for a finished plan.
    fn delete_artifacts(&self, id: &PlanId);
}

impl PlanSink for maestro_plan::PlanPersistence {
    fn save_plan(&self, plan: &Plan) {
        self.save_best_effort(plan);
    }

    fn delete_artifacts(&self, id: &PlanId) {
        maestro_plan::PlanPersistence::delete_artifacts(self, id);
    }
}

/// A sink that drops everything (ephemeral runs, tests).
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl PlanSink for NullSink {
    fn save_plan(&self, _plan: &Plan) {}
    fn delete_artifacts(&self, _id: &PlanId) {}
}

/// An approver that always answers with the caller's default
/// (non-interactive / `--yes` runs).
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultApprover;

#[async_trait]
impl Approver for DefaultApprover {
    async fn request_approval(&self, _question: &str, _details: &str, default: bool) -> bool {
        default
    }
}
