//! Orchestrator — drives an approved plan to a terminal state.
//!
//! Dispatch is sequential in resolver order by default; parallel fan-out
//! within a dependency batch is opt-in and bounded by a semaphore. Todo
//! failures are contained: a failed todo marks itself and execution
//! continues, unless the todo was critical and the approver declines to
//! continue. One cancellation token interrupts the whole run.
//!
//! Lock discipline: the plan store lock is never held across an await.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use maestro_budget::BudgetManager;
use maestro_core::events::{BaseEvent, PlanEvent, TodoOutcome, todo_complete_event, todo_start_event};
use maestro_core::ids::{PlanId, TodoId};
use maestro_plan::types::now_rfc3339;
use maestro_plan::{Plan, PlanDraft, PlanStatus, PlanStore, Todo, TodoStatus, resolve_execution_order};
use metrics::gauge;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::bus::EventBus;
use crate::errors::RuntimeError;
use crate::guard::{EngineMode, SafetyGuard};
use crate::tasks::{TaskRegistry, TaskStatus};
use crate::traits::{Approver, PlanSink, TaskContext, Worker};

/// Default per-task timeout.
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(300);

/// Default parallel fan-out bound.
pub const DEFAULT_MAX_CONCURRENCY: usize = 2;

/// Tunables for one orchestrator instance.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Fan out independent todos within a dependency batch.
    pub parallel: bool,
    /// Concurrent worker calls allowed when `parallel` is on.
    pub max_concurrency: usize,
    /// Per-task timeout; an elapsed task fails and the run continues.
    pub task_timeout: Duration,
    /// Per-unit toolchain token ceiling.
    pub unit_ceiling: u64,
    /// Session token level at which compaction is suggested.
    pub compaction_threshold: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            task_timeout: DEFAULT_TASK_TIMEOUT,
            unit_ceiling: maestro_budget::budget::DEFAULT_UNIT_CEILING,
            compaction_threshold: maestro_budget::budget::DEFAULT_COMPACTION_THRESHOLD,
        }
    }
}

/// Terminal summary of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// The plan that ran.
    pub plan_id: PlanId,
    /// Terminal plan status.
    pub status: PlanStatus,
    /// Todos completed.
    pub completed: u32,
    /// Todos failed (worker error, timeout, or unmet dependency).
    pub failed: u32,
    /// Todos left non-terminal by an interrupt.
    pub cancelled: u32,
    /// Wall time of the run in milliseconds.
    pub duration_ms: u64,
}

/// How one dispatched todo ended, for the driver loop.
enum DispatchOutcome {
    Completed,
    Failed { critical: bool },
    Cancelled,
}

/// Drives plans. Owns the store, the bus, the budget, and the task
/// registry; workers, approval, and persistence plug in via traits.
pub struct Orchestrator {
    store: Mutex<PlanStore>,
    bus: Arc<EventBus>,
    worker: Arc<dyn Worker>,
    approver: Arc<dyn Approver>,
    sink: Arc<dyn PlanSink>,
    budget: Mutex<BudgetManager>,
    registry: Arc<TaskRegistry>,
    guard: SafetyGuard,
    config: OrchestratorConfig,
    cancel_root: CancellationToken,
    active: Mutex<HashSet<PlanId>>,
}

impl Orchestrator {
    /// Create an orchestrator.
    #[must_use]
    pub fn new(
        worker: Arc<dyn Worker>,
        approver: Arc<dyn Approver>,
        sink: Arc<dyn PlanSink>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store: Mutex::new(PlanStore::new()),
            bus: Arc::new(EventBus::new()),
            worker,
            approver,
            sink,
            budget: Mutex::new(BudgetManager::new(
                config.unit_ceiling,
                config.compaction_threshold,
            )),
            registry: Arc::new(TaskRegistry::default()),
            guard: SafetyGuard::new(),
            config,
            cancel_root: CancellationToken::new(),
            active: Mutex::new(HashSet::new()),
        }
    }

    /// The event bus.
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The task registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// The safety guard.
    #[must_use]
    pub fn guard(&self) -> &SafetyGuard {
        &self.guard
    }

    /// Session token total so far.
    #[must_use]
    pub fn session_tokens(&self) -> u64 {
        self.budget.lock().session().tokens()
    }

    /// Session cost estimate so far, in USD.
    #[must_use]
    pub fn session_cost_usd(&self) -> f64 {
        self.budget.lock().session().cost_usd()
    }

    /// Create a plan in the store.
    pub fn create_plan(
        &self,
        request: impl Into<String>,
        todos: Vec<Todo>,
        draft: PlanDraft,
    ) -> Result<PlanId, RuntimeError> {
        Ok(self.store.lock().create_plan(request, todos, draft)?)
    }

    /// Approve a draft plan.
    pub fn approve(&self, plan_id: &PlanId) -> Result<(), RuntimeError> {
        self.store.lock().approve(plan_id)?;
        Ok(())
    }

    /// Snapshot of a plan's current state.
    pub fn plan(&self, plan_id: &PlanId) -> Result<Plan, RuntimeError> {
        Ok(self.store.lock().get(plan_id)?.clone())
    }

    /// Interrupt the run: cancels outstanding worker calls and halts
    /// further dispatch.
    pub fn cancel(&self) {
        warn!("cancellation requested");
        self.cancel_root.cancel();
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_root.is_cancelled()
    }

    /// Execute an approved plan to a terminal state.
    #[instrument(skip(self), fields(plan_id = %plan_id))]
    pub async fn execute(&self, plan_id: &PlanId) -> Result<ExecutionResult, RuntimeError> {
        {
            let mut active = self.active.lock();
            if !active.insert(plan_id.clone()) {
                return Err(RuntimeError::Busy(plan_id.to_string()));
            }
            gauge!("maestro_plans_active").set(active.len() as f64);
        }
        let result = self.run(plan_id).await;
        {
            let mut active = self.active.lock();
            let _ = active.remove(plan_id);
            gauge!("maestro_plans_active").set(active.len() as f64);
        }
        result
    }

    async fn run(&self, plan_id: &PlanId) -> Result<ExecutionResult, RuntimeError> {
        let started = Instant::now();

        let resolved = {
            let mut store = self.store.lock();
            let plan = store.get_mut(plan_id)?;
            if plan.status != PlanStatus::Approved {
                return Err(RuntimeError::InvalidPlanState {
                    reason: format!("plan is {}, expected approved", plan.status),
                });
            }
            plan.status = PlanStatus::Executing;
            plan.started_at = Some(now_rfc3339());
            resolve_execution_order(&plan.todos)
        };
        self.guard.state().set_mode(EngineMode::Executing);
        self.persist(plan_id);
        info!(
            todos = resolved.order.len(),
            forced = resolved.forced.len(),
            parallel = self.config.parallel,
            "execution started"
        );

        let mut interrupted = false;
        let mut stopped = false;

        'batches: for batch in &resolved.batches {
            if self.cancel_root.is_cancelled() {
                interrupted = true;
                break;
            }

            if self.config.parallel && batch.len() > 1 {
                let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
                let outcomes = futures::future::join_all(batch.iter().map(|todo_id| {
                    let semaphore = Arc::clone(&semaphore);
                    let forced = resolved.forced.contains(todo_id);
                    async move {
                        let Ok(_permit) = Arc::clone(&semaphore).acquire_owned().await else {
                            return DispatchOutcome::Cancelled;
                        };
                        self.run_todo(plan_id, todo_id, forced).await
                    }
                }))
                .await;

                for (todo_id, outcome) in batch.iter().zip(outcomes) {
                    match outcome {
                        DispatchOutcome::Cancelled => {
                            interrupted = true;
                        }
                        DispatchOutcome::Failed { critical: true } => {
                            if !self.consult_after_critical_failure(plan_id, todo_id).await {
                                stopped = true;
                            }
                        }
                        DispatchOutcome::Completed | DispatchOutcome::Failed { .. } => {}
                    }
                }
                if interrupted || stopped {
                    break 'batches;
                }
            } else {
                for todo_id in batch {
                    if self.cancel_root.is_cancelled() {
                        interrupted = true;
                        break 'batches;
                    }
                    let forced = resolved.forced.contains(todo_id);
                    match self.run_todo(plan_id, todo_id, forced).await {
                        DispatchOutcome::Cancelled => {
                            interrupted = true;
                            break 'batches;
                        }
                        DispatchOutcome::Failed { critical: true } => {
                            if !self.consult_after_critical_failure(plan_id, todo_id).await {
                                stopped = true;
                                break 'batches;
                            }
                        }
                        DispatchOutcome::Completed | DispatchOutcome::Failed { .. } => {}
                    }
                }
            }
        }

        if interrupted {
            self.cleanup_after_interrupt().await;
        }

        let result = self.finalize(plan_id, interrupted, stopped, started)?;
        self.guard.state().set_mode(EngineMode::Idle);
        Ok(result)
    }

    /// Dispatch one todo. Never holds the store lock across an await.
    async fn run_todo(&self, plan_id: &PlanId, todo_id: &TodoId, forced: bool) -> DispatchOutcome {
        // Clone the todo and gate on dependencies in one lock scope.
        let (todo, unmet) = {
            let store = self.store.lock();
            let Ok(plan) = store.get(plan_id) else {
                return DispatchOutcome::Failed { critical: false };
            };
            let Some(todo) = plan.todo(todo_id) else {
                return DispatchOutcome::Failed { critical: false };
            };
            let unmet: Vec<TodoId> = todo
                .depends_on
                .iter()
                .filter(|&dep| {
                    plan.todo(dep)
                        .map_or(true, |d| d.status != TodoStatus::Completed)
                })
                .cloned()
                .collect();
            (todo.clone(), unmet)
        };

        if !unmet.is_empty() && !forced {
            let detail = unmet
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            debug!(todo_id = %todo_id, unmet = %detail, "dependency gate failed");
            self.mark_failed(plan_id, todo_id, 0, format!("unmet dependencies: {detail}"));
            return DispatchOutcome::Failed {
                critical: todo.is_critical(),
            };
        }

        // Destructive todos get their own approval gate.
        if todo.is_destructive() {
            let details = todo
                .operations
                .iter()
                .filter(|op| op.destructive)
                .map(|op| op.description.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            let approved = self
                .approver
                .request_approval(
                    &format!("Execute destructive step \"{}\"?", todo.title),
                    &details,
                    true,
                )
                .await;
            if !approved {
                self.mark_failed(plan_id, todo_id, 0, "destructive operation declined".into());
                return DispatchOutcome::Failed {
                    critical: todo.is_critical(),
                };
            }
        }

        let task = self.registry.create(
            plan_id.clone(),
            todo_id.clone(),
            self.worker.agent_id(),
            todo.priority,
            &self.cancel_root,
        );
        {
            let mut store = self.store.lock();
            if let Ok(plan) = store.get_mut(plan_id) {
                if let Some(t) = plan.todo_mut(todo_id) {
                    if let Err(e) = t.set_status(TodoStatus::InProgress) {
                        warn!(todo_id = %todo_id, error = %e, "unexpected status transition");
                    }
                }
            }
        }
        self.registry.mark_running(&task.id);
        let _ = self
            .bus
            .publish(&todo_start_event(plan_id.clone(), todo_id.clone(), &todo.title));

        let ctx = TaskContext {
            plan_id: plan_id.clone(),
            todo_id: todo_id.clone(),
            task_id: task.id.clone(),
            bus: Arc::clone(&self.bus),
            cancel: task.cancel.clone(),
        };
        let dispatch_started = Instant::now();
        let timeout = self.config.task_timeout;
        let result = tokio::select! {
            biased;
            () = task.cancel.cancelled() => Err(RuntimeError::Cancelled),
            res = tokio::time::timeout(timeout, self.worker.execute(&todo, ctx)) => {
                res.unwrap_or_else(|_| Err(RuntimeError::Timeout {
                    todo_id: todo_id.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                }))
            }
        };
        let duration_ms = dispatch_started.elapsed().as_millis() as u64;

        let outcome = match result {
            Ok(report) => {
                let suggestion = {
                    let unit = if todo.category.is_empty() {
                        "worker"
                    } else {
                        todo.category.as_str()
                    };
                    self.budget.lock().record(unit, &report.model, report.usage)
                };
                if let Some(s) = suggestion {
                    let _ = self.bus.publish(&PlanEvent::CompactionSuggested {
                        base: BaseEvent::now(plan_id.clone()),
                        session_tokens: s.session_tokens,
                        threshold: s.threshold,
                    });
                }

                {
                    let mut store = self.store.lock();
                    if let Ok(plan) = store.get_mut(plan_id) {
                        if let Some(t) = plan.todo_mut(todo_id) {
                            if let Err(e) = t.set_status(TodoStatus::Completed) {
                                warn!(todo_id = %todo_id, error = %e, "unexpected status transition");
                            }
                            t.actual_ms = Some(duration_ms);
                        }
                    }
                }
                self.registry.mark_terminal(&task.id, TaskStatus::Completed);
                let _ = self.bus.publish(&todo_complete_event(
                    plan_id.clone(),
                    todo_id.clone(),
                    TodoOutcome::Completed,
                    duration_ms,
                    None,
                ));
                debug!(todo_id = %todo_id, duration_ms, "todo completed");
                DispatchOutcome::Completed
            }
            Err(RuntimeError::Cancelled) => {
                self.registry.mark_terminal(&task.id, TaskStatus::Cancelled);
                let _ = self.bus.publish(&todo_complete_event(
                    plan_id.clone(),
                    todo_id.clone(),
                    TodoOutcome::Cancelled,
                    duration_ms,
                    None,
                ));
                DispatchOutcome::Cancelled
            }
            Err(e) => {
                self.registry.mark_terminal(&task.id, TaskStatus::Failed);
                warn!(todo_id = %todo_id, error = %e, "todo failed");
                self.mark_failed(plan_id, todo_id, duration_ms, e.to_string());
                DispatchOutcome::Failed {
                    critical: todo.is_critical(),
                }
            }
        };

        self.persist(plan_id);
        outcome
    }

    /// Mark a todo failed and publish its terminal event.
    fn mark_failed(&self, plan_id: &PlanId, todo_id: &TodoId, duration_ms: u64, error: String) {
        {
            let mut store = self.store.lock();
            if let Ok(plan) = store.get_mut(plan_id) {
                if let Some(t) = plan.todo_mut(todo_id) {
                    if let Err(e) = t.set_status(TodoStatus::Failed) {
                        warn!(todo_id = %todo_id, error = %e, "unexpected status transition");
                    }
                    t.actual_ms = Some(duration_ms);
                }
            }
        }
        let _ = self.bus.publish(&todo_complete_event(
            plan_id.clone(),
            todo_id.clone(),
            TodoOutcome::Failed,
            duration_ms,
            Some(error),
        ));
    }

    async fn consult_after_critical_failure(&self, plan_id: &PlanId, todo_id: &TodoId) -> bool {
        let title = {
            let store = self.store.lock();
            store
                .get(plan_id)
                .ok()
                .and_then(|p| p.todo(todo_id))
                .map_or_else(|| todo_id.to_string(), |t| t.title.clone())
        };
        let proceed = self
            .approver
            .request_approval(
                "A critical step failed. Continue with the rest of the plan?",
                &format!("failed step: {title}"),
                false,
            )
            .await;
        if !proceed {
            warn!(todo_id = %todo_id, "run stopped after critical failure");
        }
        proceed
    }

    /// Single-flight interrupt cleanup: cancel tracked tasks and drain the
    /// worker. A concurrent cleanup holding the flag means ours logs and
    /// returns; the flag is released on the way out either way.
    async fn cleanup_after_interrupt(&self) {
        let state = self.guard.state();
        if !state.try_acquire_cleanup() {
            info!("cleanup already in progress, skipping");
            return;
        }
        let tasks_cancelled = self.registry.cancel_all();
        let worker_cancelled = self.worker.cancel_all().await;
        info!(tasks_cancelled, worker_cancelled, "interrupt cleanup done");
        state.release_cleanup();
    }

    fn finalize(
        &self,
        plan_id: &PlanId,
        interrupted: bool,
        stopped: bool,
        started: Instant,
    ) -> Result<ExecutionResult, RuntimeError> {
        let duration_ms = started.elapsed().as_millis() as u64;
        let (status, completed, failed, cancelled) = {
            let mut store = self.store.lock();
            let plan = store.get_mut(plan_id)?;
            let completed = plan.count_status(TodoStatus::Completed) as u32;
            let failed = plan.count_status(TodoStatus::Failed) as u32;
            let non_terminal = plan
                .todos
                .iter()
                .filter(|t| !t.status.is_terminal())
                .count() as u32;
            let cancelled = if interrupted { non_terminal } else { 0 };

            plan.status = if interrupted {
                PlanStatus::Cancelled
            } else if failed > 0 || stopped {
                PlanStatus::Failed
            } else {
                PlanStatus::Completed
            };
            plan.completed_at = Some(now_rfc3339());
            (plan.status, completed, failed, cancelled)
        };
        self.persist(plan_id);

        let event = if status == PlanStatus::Completed {
            PlanEvent::PlanComplete {
                base: BaseEvent::now(plan_id.clone()),
                completed,
                duration_ms,
            }
        } else {
            PlanEvent::PlanFailed {
                base: BaseEvent::now(plan_id.clone()),
                completed,
                failed,
                cancelled,
                error: interrupted.then(|| "cancelled by operator".to_string()),
            }
        };
        let _ = self.bus.publish(&event);

        if status == PlanStatus::Completed {
            self.sink.delete_artifacts(plan_id);
        }
        info!(
            status = status.as_str(),
            completed, failed, cancelled, duration_ms, "execution finished"
        );
        Ok(ExecutionResult {
            plan_id: plan_id.clone(),
            status,
            completed,
            failed,
            cancelled,
            duration_ms,
        })
    }

    fn persist(&self, plan_id: &PlanId) {
        let plan = self.store.lock().get(plan_id).ok().cloned();
        if let Some(plan) = plan {
            self.sink.save_plan(&plan);
        }
    }
}
