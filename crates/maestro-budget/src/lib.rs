//! # maestro-budget
//!
//! Token accounting and cost control:
//!
//! - [`budget::ToolchainBudget`] — per-unit token ceilings with
//!   reset-on-overflow semantics
//! - [`budget::SessionBudget`] — process-wide usage and realtime cost
//! - [`budget::BudgetManager`] — wraps both and raises a compaction
//!   suggestion once per threshold crossing
//! - [`pricing`] — static per-model rate table
//! - [`compaction`] — transcript collapse when the session grows too large
//!
//! ## Crate Position
//!
//! Depends only on maestro-core. Depended on by maestro-runtime.

#![deny(unsafe_code)]

pub mod budget;
pub mod compaction;
pub mod pricing;

pub use budget::{BudgetManager, CompactionSuggestion, SessionBudget, TokenUsage, ToolchainBudget};
pub use compaction::{CompactionReport, Entry, Role, Transcript};
pub use pricing::estimate_cost;
