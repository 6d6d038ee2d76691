//! Provider stream consumption.
//!
//! Drains a [`ChunkStream`](crate::traits::ChunkStream) into bus events:
//! tool calls and tool results publish as they arrive, text accumulates,
//! and the final `Done` chunk carries the usage for budget accounting.
//! Cancellation aborts the drain between chunks.

use futures::StreamExt;
use maestro_budget::TokenUsage;
use maestro_core::events::{BaseEvent, PlanEvent};

use crate::errors::RuntimeError;
use crate::traits::{CompletionChunk, CompletionProvider, TaskContext};

/// Assembled output of one completion.
#[derive(Debug, Clone, Default)]
pub struct CompletionOutput {
    /// Concatenated assistant text.
    pub text: String,
    /// Usage reported on `Done`.
    pub usage: TokenUsage,
}

/// Run one completion and drain its stream, publishing tool events on the
/// context's bus.
pub async fn drive_completion(
    provider: &dyn CompletionProvider,
    prompt: &str,
    ctx: &TaskContext,
) -> Result<CompletionOutput, RuntimeError> {
    let mut stream = provider.complete(prompt).await?;
    let mut output = CompletionOutput::default();

    loop {
        let chunk = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => return Err(RuntimeError::Cancelled),
            chunk = stream.next() => chunk,
        };
        let Some(chunk) = chunk else {
            // Stream ended without Done; usage stays zero.
            return Ok(output);
        };

        match chunk {
            CompletionChunk::TextDelta(delta) => output.text.push_str(&delta),
            CompletionChunk::ToolCall {
                id,
                name,
                arguments,
            } => {
                let _ = ctx.bus.publish(&PlanEvent::ToolCall {
                    base: BaseEvent::now(ctx.plan_id.clone()),
                    todo_id: ctx.todo_id.clone(),
                    tool_call_id: id,
                    name,
                    arguments,
                });
            }
            CompletionChunk::ToolResult {
                id,
                content,
                is_error,
            } => {
                let _ = ctx.bus.publish(&PlanEvent::ToolResult {
                    base: BaseEvent::now(ctx.plan_id.clone()),
                    todo_id: ctx.todo_id.clone(),
                    tool_call_id: id,
                    content,
                    is_error,
                });
            }
            CompletionChunk::Error(message) => return Err(RuntimeError::Worker(message)),
            CompletionChunk::Done { usage } => {
                output.usage = usage;
                return Ok(output);
            }
        }
    }
}
