//! Local simulation worker.
//!
//! Stands in for a real execution backend: each todo is "executed" by a
//! scripted completion stream (text, one tool call per declared
//! operation, usage on `Done`), driven through the shared stream
//! consumer so tool events and budget accounting flow exactly as they
//! would with a live provider.

use async_trait::async_trait;
use maestro_budget::TokenUsage;
use maestro_core::events::{BaseEvent, PlanEvent};
use maestro_plan::Todo;
use maestro_runtime::completion::drive_completion;
use maestro_runtime::traits::{ChunkStream, CompletionChunk, CompletionProvider};
use maestro_runtime::{RuntimeError, TaskContext, TaskReport, Worker};

const SIM_MODEL: &str = "claude-sonnet-4-5";

/// Provider that scripts a plausible completion for one todo.
pub struct SimulatedProvider {
    chunks: Vec<CompletionChunk>,
}

impl SimulatedProvider {
    /// Script the stream for a todo: a text summary, one tool round-trip
    /// per declared operation, then usage proportional to the text.
    #[must_use]
    pub fn for_todo(todo: &Todo) -> Self {
        let mut chunks = vec![CompletionChunk::TextDelta(format!(
            "Working on: {}\n",
            todo.title
        ))];
        for (i, op) in todo.operations.iter().enumerate() {
            let call_id = format!("call_{i}");
            chunks.push(CompletionChunk::ToolCall {
                id: call_id.clone(),
                name: "run_command".into(),
                arguments: serde_json::json!({
                    "command": op.command.clone().unwrap_or_default(),
                }),
            });
            chunks.push(CompletionChunk::ToolResult {
                id: call_id,
                content: format!("{} ok", op.description),
                is_error: false,
            });
        }
        chunks.push(CompletionChunk::TextDelta("Done.\n".into()));
        let text_chars: usize = chunks
            .iter()
            .filter_map(|c| match c {
                CompletionChunk::TextDelta(t) => Some(t.len()),
                _ => None,
            })
            .sum();
        chunks.push(CompletionChunk::Done {
            usage: TokenUsage {
                input_tokens: (todo.title.len() as u64) / 4 + 50,
                output_tokens: (text_chars as u64) / 4,
            },
        });
        Self { chunks }
    }
}

#[async_trait]
impl CompletionProvider for SimulatedProvider {
    async fn complete(&self, _prompt: &str) -> Result<ChunkStream, RuntimeError> {
        let chunks = self.chunks.clone();
        Ok(Box::pin(async_stream::stream! {
            for chunk in chunks {
                // Yield between chunks so cancellation gets a look in.
                tokio::task::yield_now().await;
                yield chunk;
            }
        }))
    }

    fn model(&self) -> &str {
        SIM_MODEL
    }
}

/// Worker that executes every todo against a [`SimulatedProvider`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalWorker;

#[async_trait]
impl Worker for LocalWorker {
    fn agent_id(&self) -> &str {
        "local-sim"
    }

    async fn execute(&self, todo: &Todo, ctx: TaskContext) -> Result<TaskReport, RuntimeError> {
        let provider = SimulatedProvider::for_todo(todo);
        let _ = ctx.bus.publish(&PlanEvent::TodoProgress {
            base: BaseEvent::now(ctx.plan_id.clone()),
            todo_id: ctx.todo_id.clone(),
            progress: 10,
            message: None,
        });
        let output = drive_completion(&provider, &todo.title, &ctx).await?;
        Ok(TaskReport {
            summary: output.text,
            usage: output.usage,
            model: provider.model().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_core::ids::{PlanId, TaskId, TodoId};
    use maestro_plan::types::DeclaredOperation;
    use maestro_runtime::EventBus;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn ctx(bus: Arc<EventBus>) -> TaskContext {
        TaskContext {
            plan_id: PlanId::generate(),
            todo_id: TodoId::generate(),
            task_id: TaskId::generate(),
            bus,
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn simulated_execution_reports_usage() {
        let todo = Todo::new("build the crate");
        let bus = Arc::new(EventBus::new());
        let report = LocalWorker.execute(&todo, ctx(bus)).await.unwrap();
        assert!(report.summary.contains("build the crate"));
        assert!(report.usage.total() > 0);
        assert_eq!(report.model, SIM_MODEL);
    }

    #[tokio::test]
    async fn declared_operations_emit_tool_events() {
        let todo = Todo::new("run tests").with_operation(DeclaredOperation {
            description: "run tests".into(),
            command: Some("cargo test".into()),
            files: vec![],
            destructive: false,
        });
        let bus = Arc::new(EventBus::new());
        let mut rx = bus.watch_all();
        let _ = LocalWorker
            .execute(&todo, ctx(Arc::clone(&bus)))
            .await
            .unwrap();

        let mut types = Vec::new();
        while let Ok(event) = rx.try_recv() {
            types.push(event.event_type().to_string());
        }
        assert!(types.contains(&"tool_call".to_string()));
        assert!(types.contains(&"tool_result".to_string()));
    }

    #[tokio::test]
    async fn cancelled_context_aborts() {
        let todo = Todo::new("anything");
        let bus = Arc::new(EventBus::new());
        let ctx = ctx(bus);
        ctx.cancel.cancel();
        let err = LocalWorker.execute(&todo, ctx).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Cancelled));
    }
}
