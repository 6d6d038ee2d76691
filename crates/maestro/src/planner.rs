//! Demo planner.
//!
//! Splits a natural-language request into sequential todos on common
//! conjunctions. Each step depends on the previous one, side-effecting
//! verbs become declared operations, and deletion/deployment verbs mark
//! the operation destructive. Good enough to exercise the engine end to
//! end; a model-backed planner plugs in at the same seam.

use maestro_plan::types::DeclaredOperation;
use maestro_plan::{Priority, Todo};

const STEP_SEPARATORS: [&str; 4] = [" then ", " and then ", ", then ", "; "];

const DESTRUCTIVE_VERBS: [&str; 6] = ["delete", "remove", "drop", "deploy", "wipe", "uninstall"];
const COMMAND_VERBS: [&str; 5] = ["run", "build", "test", "install", "compile"];

/// Split a request into a dependency chain of todos.
pub fn plan_request(request: &str) -> Vec<Todo> {
    let mut steps = vec![request.trim()];
    for sep in STEP_SEPARATORS {
        steps = steps
            .into_iter()
            .flat_map(|s| s.split(sep))
            .map(str::trim)
            .collect();
    }
    steps.retain(|s| !s.is_empty());

    let mut todos: Vec<Todo> = Vec::with_capacity(steps.len());
    for step in steps {
        let mut todo = Todo::new(step).with_priority(priority_for(step));
        todo.category = category_for(step).to_string();
        if let Some(op) = operation_for(step) {
            todo = todo.with_operation(op);
        }
        if let Some(prev) = todos.last() {
            todo.depends_on.push(prev.id.clone());
        }
        todos.push(todo);
    }
    todos
}

fn first_word(step: &str) -> String {
    step.split_whitespace()
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

fn category_for(step: &str) -> &'static str {
    let verb = first_word(step);
    match verb.as_str() {
        "test" => "test",
        "build" | "compile" => "build",
        "deploy" => "deploy",
        "delete" | "remove" | "wipe" | "uninstall" | "drop" => "cleanup",
        _ => "general",
    }
}

fn priority_for(step: &str) -> Priority {
    if DESTRUCTIVE_VERBS.contains(&first_word(step).as_str()) {
        Priority::High
    } else {
        Priority::Medium
    }
}

fn operation_for(step: &str) -> Option<DeclaredOperation> {
    let verb = first_word(step);
    let destructive = DESTRUCTIVE_VERBS.contains(&verb.as_str());
    if destructive || COMMAND_VERBS.contains(&verb.as_str()) {
        Some(DeclaredOperation {
            description: step.to_string(),
            command: Some(step.to_string()),
            files: vec![],
            destructive,
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_step_single_todo() {
        let todos = plan_request("update the readme");
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].title, "update the readme");
        assert!(todos[0].depends_on.is_empty());
    }

    #[test]
    fn conjunctions_split_into_chain() {
        let todos = plan_request("build the crate then test everything; deploy to staging");
        assert_eq!(todos.len(), 3);
        assert_eq!(todos[1].depends_on, vec![todos[0].id.clone()]);
        assert_eq!(todos[2].depends_on, vec![todos[1].id.clone()]);
    }

    #[test]
    fn destructive_verbs_marked() {
        let todos = plan_request("delete the old build artifacts");
        assert!(todos[0].is_destructive());
        assert_eq!(todos[0].priority, Priority::High);
        assert_eq!(todos[0].category, "cleanup");
    }

    #[test]
    fn command_verbs_declare_operations() {
        let todos = plan_request("run the integration suite");
        assert_eq!(todos[0].operations.len(), 1);
        assert!(!todos[0].operations[0].destructive);
        assert!(todos[0].operations[0].command.is_some());
    }

    #[test]
    fn plain_steps_have_no_operations() {
        let todos = plan_request("summarize recent changes");
        assert!(todos[0].operations.is_empty());
        assert_eq!(todos[0].category, "general");
    }

    #[test]
    fn empty_request_yields_nothing() {
        assert!(plan_request("   ").is_empty());
    }

    #[test]
    fn categories_assigned_by_verb() {
        let todos = plan_request("build the app then test it then deploy it");
        let categories: Vec<&str> = todos.iter().map(|t| t.category.as_str()).collect();
        assert_eq!(categories, vec!["build", "test", "deploy"]);
    }
}
