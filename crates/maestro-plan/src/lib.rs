//! # maestro-plan
//!
//! Plan/todo entities and the pure planning algorithms.
//!
//! - **Types**: [`types::Plan`] and [`types::Todo`] with their status state
//!   machines and progress invariants
//! - **Store**: [`store::PlanStore`] — exclusive owner of plan entities,
//!   validates the dependency graph at creation
//! - **Resolver**: [`resolver::resolve_execution_order`] — stable, pure
//!   topological ordering with an explicit, logged cycle-break policy
//! - **Persistence**: best-effort todo-file snapshots for crash resilience
//!
//! ## Crate Position
//!
//! Depends only on maestro-core. Depended on by maestro-runtime.

#![deny(unsafe_code)]

pub mod errors;
pub mod persistence;
pub mod resolver;
pub mod store;
pub mod types;

pub use errors::PlanError;
pub use persistence::{PlanPersistence, PlanSnapshot};
pub use resolver::{ResolvedOrder, resolve_execution_order};
pub use store::{PlanDraft, PlanStore};
pub use types::{DeclaredOperation, Plan, PlanStatus, Priority, RiskLevel, Todo, TodoStatus};
