//! maestro — plan-and-execute CLI.
//!
//! `maestro plan <request…>` turns a request into a todo plan, shows the
//! resolved order, and executes it with the local simulation worker,
//! streaming events to the console. Ctrl-C interrupts the run.

#![deny(unsafe_code)]

mod console;
mod planner;
mod worker;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use maestro_plan::{PlanDraft, PlanPersistence, PlanStatus, resolve_execution_order};
use maestro_runtime::{Approver, Orchestrator, OrchestratorConfig};
use tracing::info;

use crate::console::{AutoApprover, ConsoleApprover};
use crate::worker::LocalWorker;

/// Where plan snapshots live between runs.
const SNAPSHOT_DIR: &str = ".maestro/plans";

#[derive(Debug, Parser)]
#[command(name = "maestro", about = "Plan and execute multi-step requests")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a plan from a request and execute it.
    Plan {
        /// The request, in plain words.
        #[arg(required = true)]
        request: Vec<String>,

        /// Fan out independent steps.
        #[arg(long, default_value_t = false)]
        parallel: bool,

        /// Concurrent steps when --parallel is set.
        #[arg(long, default_value_t = 2)]
        max_concurrency: usize,

        /// Per-step timeout in seconds.
        #[arg(long, default_value_t = 300)]
        timeout_secs: u64,

        /// Approve everything without prompting.
        #[arg(long, short = 'y', default_value_t = false)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    maestro_core::logging::init_tracing("maestro=info");
    let args = Args::parse();
    let result = match args.command {
        Command::Plan {
            request,
            parallel,
            max_concurrency,
            timeout_secs,
            yes,
        } => {
            let config = OrchestratorConfig {
                parallel,
                max_concurrency,
                task_timeout: Duration::from_secs(timeout_secs),
                ..OrchestratorConfig::default()
            };
            run_plan(&request.join(" "), config, yes).await
        }
    };
    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run_plan(
    request: &str,
    config: OrchestratorConfig,
    yes: bool,
) -> anyhow::Result<ExitCode> {
    let approver: Arc<dyn Approver> = if yes {
        Arc::new(AutoApprover)
    } else {
        Arc::new(ConsoleApprover)
    };
    let orch = Arc::new(Orchestrator::new(
        Arc::new(LocalWorker),
        Arc::clone(&approver),
        Arc::new(PlanPersistence::new(SNAPSHOT_DIR)),
        config,
    ));

    // Plan generation sits behind the recursion guard; hitting the bound
    // here means a previous recovery did not complete.
    let todos = {
        let _scope = orch.guard().enter_generation()?;
        planner::plan_request(request)
    };
    if todos.is_empty() {
        println!("Nothing to do.");
        return Ok(ExitCode::SUCCESS);
    }

    let plan_id = orch.create_plan(request, todos, PlanDraft::default())?;
    let plan = orch.plan(&plan_id)?;
    info!(plan_id = %plan_id, todos = plan.todos.len(), "plan created");

    println!(
        "Plan: {} ({} step(s), risk: {:?})",
        plan.title,
        plan.todos.len(),
        plan.risk
    );
    let resolved = resolve_execution_order(&plan.todos);
    for (i, id) in resolved.order.iter().enumerate() {
        if let Some(todo) = plan.todo(id) {
            println!("  {}. {}", i + 1, todo.title);
        }
    }
    if resolved.had_cycle() {
        println!("  (dependency cycle detected; order was forced)");
    }

    if !approver
        .request_approval("Execute this plan?", "", true)
        .await
    {
        println!("Aborted.");
        return Ok(ExitCode::SUCCESS);
    }
    orch.approve(&plan_id)?;

    let _renderer = console::attach_renderer(orch.bus());
    {
        let watcher = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    orch.cancel();
                }
            })
        };
        // Detached watcher; emergency recovery aborts it with the rest.
        orch.guard().state().register_timer(watcher.abort_handle());
    }

    let result = orch.execute(&plan_id).await?;
    println!(
        "Session usage: {} tokens (${:.4})",
        orch.session_tokens(),
        orch.session_cost_usd()
    );

    if result.status == PlanStatus::Completed {
        Ok(ExitCode::SUCCESS)
    } else {
        // Return the engine to a known-idle state before exiting nonzero.
        orch.guard().emergency_recover();
        Ok(ExitCode::FAILURE)
    }
}
