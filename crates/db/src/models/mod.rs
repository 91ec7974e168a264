//! Row models and DTOs.
//!
//! Each submodule contains a `FromRow` entity struct matching the table row
//! and, where rows are inserted, a `New*` DTO.

pub mod campaign_task;
pub mod check_plugin;
pub mod connected_system;
pub mod status;
pub mod task_execution;
pub mod task_result;
