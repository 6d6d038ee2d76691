//! Console event rendering and interactive approval.

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use maestro_core::events::{PlanEvent, TodoOutcome};
use maestro_runtime::bus::{EventFilter, Subscription};
use maestro_runtime::{Approver, EventBus};

/// Render events as they happen. Keep the subscription alive for the
/// duration of the run.
pub fn attach_renderer(bus: &Arc<EventBus>) -> Subscription {
    bus.subscribe(EventFilter::All, |event| {
        render(event);
        Ok(())
    })
}

fn render(event: &PlanEvent) {
    match event {
        PlanEvent::TodoStart { title, .. } => println!("  ▶ {title}"),
        PlanEvent::TodoProgress {
            progress, message, ..
        } => {
            if let Some(message) = message {
                println!("    … {progress}% {message}");
            }
        }
        PlanEvent::TodoComplete {
            outcome,
            duration_ms,
            error,
            ..
        } => match outcome {
            TodoOutcome::Completed => println!("  ✔ done ({duration_ms}ms)"),
            TodoOutcome::Failed => {
                println!("  ✘ failed: {}", error.as_deref().unwrap_or("unknown"));
            }
            TodoOutcome::Cancelled => println!("  ⊘ cancelled"),
        },
        PlanEvent::ToolCall { name, .. } => println!("    → {name}"),
        PlanEvent::ToolResult { is_error, .. } => {
            if *is_error {
                println!("    ← tool error");
            }
        }
        PlanEvent::PlanComplete {
            completed,
            duration_ms,
            ..
        } => println!("\nPlan complete: {completed} step(s) in {duration_ms}ms"),
        PlanEvent::PlanFailed {
            completed,
            failed,
            cancelled,
            ..
        } => println!(
            "\nPlan did not complete: {completed} ok, {failed} failed, {cancelled} cancelled"
        ),
        PlanEvent::CompactionSuggested { session_tokens, .. } => {
            println!("  (session at {session_tokens} tokens — consider compacting)");
        }
    }
}

/// Prompts on stdin. `[Y/n]` / `[y/N]` follows the caller's default, and
/// read failures fall back to it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleApprover;

#[async_trait]
impl Approver for ConsoleApprover {
    async fn request_approval(&self, question: &str, details: &str, default: bool) -> bool {
        let question = question.to_string();
        let details = details.to_string();
        tokio::task::spawn_blocking(move || prompt(&question, &details, default))
            .await
            .unwrap_or(default)
    }
}

fn prompt(question: &str, details: &str, default: bool) -> bool {
    if !details.is_empty() {
        println!("{details}");
    }
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    print!("{question} {hint} ");
    if std::io::stdout().flush().is_err() {
        return default;
    }
    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).is_err() {
        return default;
    }
    match line.trim().to_lowercase().as_str() {
        "y" | "yes" => true,
        "n" | "no" => false,
        _ => default,
    }
}

/// Answers yes to everything (`--yes` runs).
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprover;

#[async_trait]
impl Approver for AutoApprover {
    async fn request_approval(&self, _question: &str, _details: &str, _default: bool) -> bool {
        true
    }
}
