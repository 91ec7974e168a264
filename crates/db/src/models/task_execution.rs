//! Queue row models for the `task_executions` table.

use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;
use vigil_core::envelope::ExecutionStatus;
use vigil_core::types::{DbId, JsonObject, Timestamp};

use super::status::{StatusId, TaskExecutionStatus};

/// A row from the `task_executions` table, exactly as stored.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TaskExecution {
    pub id: Uuid,
    pub task_instance_id: DbId,
    pub check_type: String,
    pub parameters: Value,
    pub system_config: Value,
    pub created_at: Timestamp,
    pub status_id: StatusId,
    pub error_message: Option<String>,
    pub result: Option<Value>,
    pub completed_at: Option<Timestamp>,
    pub locked_at: Option<Timestamp>,
    pub locked_by: Option<String>,
    pub updated_at: Timestamp,
}

/// DTO for enqueueing a new check execution.
#[derive(Debug, Clone)]
pub struct NewTaskExecution {
    /// Producer-assigned so the caller knows the id before the insert.
    pub id: Uuid,
    pub task_instance_id: DbId,
    pub check_type: String,
    pub parameters: JsonObject,
    pub system_config: JsonObject,
}

impl NewTaskExecution {
    /// Build a request with a fresh time-ordered id.
    pub fn new(
        task_instance_id: DbId,
        check_type: impl Into<String>,
        parameters: JsonObject,
        system_config: JsonObject,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            task_instance_id,
            check_type: check_type.into(),
            parameters,
            system_config,
        }
    }
}

/// A queue row decoded for execution.
///
/// `parameters` and `system_config` are always objects. A stored value that
/// is not an object decodes to an empty bag so later validation rejects it.
#[derive(Debug, Clone)]
pub struct TaskExecutionRequest {
    pub id: Uuid,
    pub task_instance_id: DbId,
    pub check_type: String,
    pub parameters: JsonObject,
    pub system_config: JsonObject,
    pub created_at: Timestamp,
    pub status_id: StatusId,
    pub error_message: Option<String>,
    pub result: Option<Value>,
    pub completed_at: Option<Timestamp>,
    pub locked_at: Option<Timestamp>,
    pub locked_by: Option<String>,
}

impl TaskExecutionRequest {
    pub fn status(&self) -> Option<TaskExecutionStatus> {
        TaskExecutionStatus::from_id(self.status_id)
    }
}

impl From<TaskExecution> for TaskExecutionRequest {
    fn from(row: TaskExecution) -> Self {
        let parameters = decode_object(row.id, "parameters", row.parameters);
        let system_config = decode_object(row.id, "system_config", row.system_config);
        Self {
            id: row.id,
            task_instance_id: row.task_instance_id,
            check_type: row.check_type,
            parameters,
            system_config,
            created_at: row.created_at,
            status_id: row.status_id,
            error_message: row.error_message,
            result: row.result,
            completed_at: row.completed_at,
            locked_at: row.locked_at,
            locked_by: row.locked_by,
        }
    }
}

fn decode_object(id: Uuid, field: &'static str, value: Value) -> JsonObject {
    match value {
        Value::Object(map) => map,
        other => {
            tracing::warn!(
                execution_id = %id,
                field,
                found = %json_kind(&other),
                "Stored field is not a JSON object, using an empty one",
            );
            JsonObject::new()
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Outcome of one execution attempt, written back by the worker.
#[derive(Debug, Clone)]
pub struct TaskExecutionResult {
    pub id: Uuid,
    pub status: ExecutionStatus,
    /// Normalized result envelope; always a JSON object.
    pub result: Value,
    pub error_message: Option<String>,
    pub completed_at: Timestamp,
}

/// Row count per queue status, for observability.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StatusCount {
    pub status_id: StatusId,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;

    fn row(parameters: Value, system_config: Value) -> TaskExecution {
        let now = Utc::now();
        TaskExecution {
            id: Uuid::now_v7(),
            task_instance_id: 7,
            check_type: "http_get_check".to_string(),
            parameters,
            system_config,
            created_at: now,
            status_id: TaskExecutionStatus::Processing.id(),
            error_message: None,
            result: None,
            completed_at: None,
            locked_at: Some(now),
            locked_by: Some("worker-a".to_string()),
            updated_at: now,
        }
    }

    #[test]
    fn object_fields_decode_as_is() {
        let req = TaskExecutionRequest::from(row(
            json!({"api_path": "/health"}),
            json!({"base_url": "https://example.test"}),
        ));
        assert_eq!(req.parameters["api_path"], "/health");
        assert_eq!(req.system_config["base_url"], "https://example.test");
        assert_eq!(req.status(), Some(TaskExecutionStatus::Processing));
    }

    #[test]
    fn malformed_fields_decode_to_empty_objects() {
        let req = TaskExecutionRequest::from(row(json!("not-an-object"), json!([1, 2])));
        assert!(req.parameters.is_empty());
        assert!(req.system_config.is_empty());
        assert_eq!(req.check_type, "http_get_check");
    }

    #[test]
    fn new_requests_get_distinct_ids() {
        let a = NewTaskExecution::new(1, "tls_certificate_expiry", JsonObject::new(), JsonObject::new());
        let b = NewTaskExecution::new(1, "tls_certificate_expiry", JsonObject::new(), JsonObject::new());
        assert_ne!(a.id, b.id);
    }
}
