//! # maestro-core
//!
//! Foundation types for the Maestro orchestration engine.
//!
//! This crate provides the shared vocabulary that all other Maestro crates
//! depend on:
//!
//! - **Branded IDs**: [`ids::PlanId`], [`ids::TodoId`], [`ids::TaskId`] as newtypes
//! - **Events**: [`events::PlanEvent`] tagged-union lifecycle events with
//!   required, typed payload fields
//! - **Errors**: [`errors::CoreError`]
//! - **Text**: UTF-8–safe truncation used by context compaction
//! - **Logging**: [`logging::init_tracing`] subscriber setup
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other maestro crates.

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod ids;
pub mod logging;
pub mod text;
