//! # maestro-runtime
//!
//! The execution engine:
//!
//! - [`bus::EventBus`] — synchronous fan-out with a broadcast bridge for
//!   async consumers
//! - [`traits`] — boundary contracts ([`traits::Worker`],
//!   [`traits::CompletionProvider`], [`traits::Approver`],
//!   [`traits::PlanSink`])
//! - [`tasks`] — background task records and their registry
//! - [`orchestrator::Orchestrator`] — drives an approved plan to a
//!   terminal state
//! - [`guard::SafetyGuard`] — recursion bound and emergency recovery
//!
//! ## Crate Position
//!
//! Depends on maestro-core, maestro-plan, and maestro-budget. Depended on
//! by the CLI.

#![deny(unsafe_code)]

pub mod bus;
pub mod completion;
pub mod errors;
pub mod guard;
pub mod orchestrator;
pub mod tasks;
pub mod traits;

pub use bus::{EventBus, EventFilter, Subscription};
pub use errors::RuntimeError;
pub use guard::{RecoveryState, SafetyGuard};
pub use orchestrator::{ExecutionResult, Orchestrator, OrchestratorConfig};
pub use tasks::{BackgroundTask, TaskRegistry, TaskStatus};
pub use traits::{
    Approver, CompletionChunk, CompletionProvider, PlanSink, TaskContext, TaskReport, Worker,
};
