//! Check-execution worker.
//!
//! Claims requests from the `task_executions` queue, runs them through the
//! matching check plugin and records the outcome. Parallelism comes from
//! running more worker processes; each one executes checks sequentially.

pub mod config;
pub mod queue;
pub mod service;
pub mod store;
