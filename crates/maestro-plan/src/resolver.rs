//! Dependency resolution.
//!
//! A pure, stable topological sort over a plan's todos. Eligible todos are
//! selected batch by batch in insertion order, so independent todos always
//! execute in the order they were authored, and the same input always
//! produces the same output.
//!
//! Cycles never abort resolution. When no todo is eligible but unresolved
//! todos remain, the earliest unresolved todo (by insertion order) is
//! forced into the order and logged. Forced todos are exempt from the
//! runtime dependency gate — their dependencies can never all complete.

use std::collections::HashSet;

use maestro_core::ids::TodoId;
use tracing::warn;

use crate::types::Todo;

/// Output of [`resolve_execution_order`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOrder {
    /// Every todo id, in execution order. Same length as the input.
    pub order: Vec<TodoId>,
    /// Todos forced into the order by the cycle-break policy. These must
    /// skip the runtime dependency gate.
    pub forced: HashSet<TodoId>,
    /// Batches of todos whose dependencies were all satisfied by earlier
    /// batches. A parallel run may fan out within a batch.
    pub batches: Vec<Vec<TodoId>>,
}

impl ResolvedOrder {
    /// Whether a cycle was broken during resolution.
    #[must_use]
    pub fn had_cycle(&self) -> bool {
        !self.forced.is_empty()
    }
}

/// Compute a stable execution order for the given todos.
///
/// Pure: no entity is mutated, no status is read. Dependencies pointing at
/// ids outside `todos` are impossible for store-created plans and are
/// treated as already satisfied if they appear.
#[must_use]
pub fn resolve_execution_order(todos: &[Todo]) -> ResolvedOrder {
    let known: HashSet<&TodoId> = todos.iter().map(|t| &t.id).collect();
    let mut resolved: HashSet<TodoId> = HashSet::new();
    let mut order: Vec<TodoId> = Vec::with_capacity(todos.len());
    let mut forced: HashSet<TodoId> = HashSet::new();
    let mut batches: Vec<Vec<TodoId>> = Vec::new();

    while order.len() < todos.len() {
        let mut batch: Vec<TodoId> = Vec::new();
        for todo in todos {
            if resolved.contains(&todo.id) {
                continue;
            }
            let eligible = todo
                .depends_on
                .iter()
                .all(|dep| resolved.contains(dep) || !known.contains(dep));
            if eligible {
                batch.push(todo.id.clone());
            }
        }

        if batch.is_empty() {
            // Cycle: force the earliest unresolved todo and keep going.
            let victim = todos
                .iter()
                .find(|t| !resolved.contains(&t.id))
                .map(|t| t.id.clone());
            let Some(victim) = victim else { break };
            let unmet: Vec<String> = todos
                .iter()
                .find(|t| t.id == victim)
                .map(|t| {
                    t.depends_on
                        .iter()
                        .filter(|dep| !resolved.contains(*dep))
                        .map(ToString::to_string)
                        .collect()
                })
                .unwrap_or_default();
            warn!(
                todo_id = %victim,
                unmet_dependencies = ?unmet,
                "dependency cycle detected, forcing todo into execution order"
            );
            let _ = forced.insert(victim.clone());
            batch.push(victim);
        }

        for id in &batch {
            let _ = resolved.insert(id.clone());
            order.push(id.clone());
        }
        batches.push(batch);
    }

    ResolvedOrder {
        order,
        forced,
        batches,
    }
}
