//! The plan store — exclusive owner of plan entities.
//!
//! Validation happens at creation: every dependency id referenced by a
//! todo must exist among the supplied todos, ids must be unique, and no
//! todo may depend on itself. A malformed graph is fatal to plan creation
//! ([`PlanError::InvalidPlan`]); nothing is stored.
//!
//! The store itself is not synchronized — the orchestrator is the only
//! mutator, per the ownership model.

use std::collections::{HashMap, HashSet};

use maestro_core::ids::PlanId;
use tracing::debug;

use crate::errors::PlanError;
use crate::types::{Plan, PlanStatus, RiskLevel, Todo, now_rfc3339};

/// Parameters for creating a plan.
#[derive(Debug, Clone, Default)]
pub struct PlanDraft {
    /// Short title (falls back to a prefix of the request).
    pub title: Option<String>,
    /// Longer description.
    pub description: String,
    /// Risk classification (derived from the todos when `None`).
    pub risk: Option<RiskLevel>,
}

/// In-memory registry of plans, keyed by id.
#[derive(Debug, Default)]
pub struct PlanStore {
    plans: HashMap<PlanId, Plan>,
}

impl PlanStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a plan from a request and its todos, validating the
    /// dependency graph.
    pub fn create_plan(
        &mut self,
        request: impl Into<String>,
        todos: Vec<Todo>,
        draft: PlanDraft,
    ) -> Result<PlanId, PlanError> {
        let request = request.into();
        if todos.is_empty() {
            return Err(PlanError::invalid("a plan needs at least one todo"));
        }

        let mut seen = HashSet::new();
        for todo in &todos {
            if !seen.insert(todo.id.clone()) {
                return Err(PlanError::invalid(format!(
                    "duplicate todo id {}",
                    todo.id
                )));
            }
        }
        for todo in &todos {
            for dep in &todo.depends_on {
                if dep == &todo.id {
                    return Err(PlanError::invalid(format!(
                        "todo {} depends on itself",
                        todo.id
                    )));
                }
                if !seen.contains(dep) {
                    return Err(PlanError::invalid(format!(
                        "todo {} depends on unknown todo {dep}",
                        todo.id
                    )));
                }
            }
        }

        let estimated_ms = todos.iter().filter_map(|t| t.estimated_ms).sum::<u64>();
        let risk = draft.risk.unwrap_or_else(|| derive_risk(&todos));
        let title = draft.title.unwrap_or_else(|| default_title(&request));

        let plan = Plan {
            id: PlanId::generate(),
            title,
            description: draft.description,
            request,
            todos,
            estimated_ms: (estimated_ms > 0).then_some(estimated_ms),
            risk,
            status: PlanStatus::Draft,
            created_at: now_rfc3339(),
            approved_at: None,
            started_at: None,
            completed_at: None,
        };
        let id = plan.id.clone();
        debug!(plan_id = %id, todos = plan.todos.len(), risk = ?plan.risk, "plan created");
        let _ = self.plans.insert(id.clone(), plan);
        Ok(id)
    }

    /// Approve a draft plan, recording the approval timestamp.
    pub fn approve(&mut self, id: &PlanId) -> Result<(), PlanError> {
        let plan = self.get_mut(id)?;
        if plan.status != PlanStatus::Draft {
            return Err(PlanError::InvalidTransition {
                from: plan.status.to_string(),
                to: PlanStatus::Approved.to_string(),
            });
        }
        plan.status = PlanStatus::Approved;
        plan.approved_at = Some(now_rfc3339());
        Ok(())
    }

    /// Look up a plan.
    pub fn get(&self, id: &PlanId) -> Result<&Plan, PlanError> {
        self.plans
            .get(id)
            .ok_or_else(|| PlanError::NotFound(id.to_string()))
    }

    /// Look up a plan, mutably. Orchestrator-only.
    pub fn get_mut(&mut self, id: &PlanId) -> Result<&mut Plan, PlanError> {
        self.plans
            .get_mut(id)
            .ok_or_else(|| PlanError::NotFound(id.to_string()))
    }

    /// Insert a previously persisted plan (crash recovery).
    pub fn restore(&mut self, plan: Plan) {
        let _ = self.plans.insert(plan.id.clone(), plan);
    }

    /// Remove a plan, returning it if present.
    pub fn remove(&mut self, id: &PlanId) -> Option<Plan> {
        self.plans.remove(id)
    }

    /// Number of plans held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plans.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

/// Highest risk implied by the todos' declared operations.
fn derive_risk(todos: &[Todo]) -> RiskLevel {
    let mut risk = RiskLevel::Low;
    for todo in todos {
        for op in &todo.operations {
            let op_risk = if op.destructive {
                RiskLevel::Critical
            } else if op.command.is_some() {
                RiskLevel::High
            } else if op.files.is_empty() {
                RiskLevel::Low
            } else {
                RiskLevel::Medium
            };
            risk = risk.max(op_risk);
        }
    }
    risk
}

fn default_title(request: &str) -> String {
    maestro_core::text::truncate_with_suffix(request.trim(), 64, "…")
}
