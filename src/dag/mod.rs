// src/dag/mod.rs

//! Dependency-aware asynchronous task graphs.
//!
//! - [`graph`] holds the declared tasks and validates them (unknown
//!   dependencies, duplicates, cycles) before anything runs.
//! - [`executor`] runs a validated graph, dispatching every task as soon as
//!   its dependencies have completed.
//! - [`results`] is the read-only view of completed task values.

pub mod executor;
pub mod graph;
pub mod results;

pub use executor::execute;
pub use graph::{ExecutionPlan, TaskFuture, TaskGraph, TaskName};
pub use results::TaskResults;
