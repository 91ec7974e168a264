//! Append-only check result history.

use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;
use vigil_core::types::{DbId, Timestamp};

/// A row from the `task_results` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TaskResult {
    pub id: DbId,
    pub task_instance_id: DbId,
    pub execution_id: Uuid,
    pub executed_by: Option<String>,
    pub checked_at: Timestamp,
    pub status: String,
    pub output: Value,
    pub created_at: Timestamp,
}

/// DTO for appending a result record.
#[derive(Debug, Clone)]
pub struct NewTaskResult {
    pub task_instance_id: DbId,
    pub execution_id: Uuid,
    pub executed_by: Option<String>,
    pub checked_at: Timestamp,
    pub status: String,
    pub output: Value,
}
