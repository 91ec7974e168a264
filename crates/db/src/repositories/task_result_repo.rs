//! Repository for the append-only `task_results` table.

use sqlx::PgPool;
use vigil_core::types::DbId;

use crate::models::task_result::{NewTaskResult, TaskResult};

/// Column list for `task_results` queries.
const COLUMNS: &str = "\
    id, task_instance_id, execution_id, executed_by, checked_at, status, output, created_at";

/// Maximum page size for history listing.
const MAX_LIMIT: i64 = 100;

/// Appends and lists result history. Rows are never updated.
pub struct TaskResultRepo;

impl TaskResultRepo {
    /// Append a result record.
    pub async fn append(pool: &PgPool, input: &NewTaskResult) -> Result<TaskResult, sqlx::Error> {
        let query = format!(
            "INSERT INTO task_results \
                 (task_instance_id, execution_id, executed_by, checked_at, status, output) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TaskResult>(&query)
            .bind(input.task_instance_id)
            .bind(input.execution_id)
            .bind(input.executed_by.as_deref())
            .bind(input.checked_at)
            .bind(&input.status)
            .bind(&input.output)
            .fetch_one(pool)
            .await
    }

    /// Most recent results for a task instance, newest first.
    pub async fn list_for_instance(
        pool: &PgPool,
        task_instance_id: DbId,
        limit: i64,
    ) -> Result<Vec<TaskResult>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM task_results \
             WHERE task_instance_id = $1 \
             ORDER BY checked_at DESC, id DESC \
             LIMIT $2"
        );
        sqlx::query_as::<_, TaskResult>(&query)
            .bind(task_instance_id)
            .bind(limit.clamp(1, MAX_LIMIT))
            .fetch_all(pool)
            .await
    }
}
