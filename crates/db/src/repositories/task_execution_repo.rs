//! Repository for the `task_executions` queue table.
//!
//! Claims use `SELECT FOR UPDATE SKIP LOCKED` inside a single `UPDATE`, so
//! concurrent workers never block on each other's claims and never receive
//! the same row.

use std::time::Duration;

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::status::TaskExecutionStatus;
use crate::models::task_execution::{
    NewTaskExecution, StatusCount, TaskExecution, TaskExecutionResult,
};

/// Column list for `task_executions` queries.
const COLUMNS: &str = "\
    id, task_instance_id, check_type, parameters, system_config, \
    created_at, status_id, error_message, result, completed_at, \
    locked_at, locked_by, updated_at";

/// Lease held by a worker on a claimed row before others may reclaim it.
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(5 * 60);

/// Provides queue operations for check executions.
pub struct TaskExecutionRepo;

impl TaskExecutionRepo {
    /// Insert a new pending execution request.
    pub async fn enqueue(
        pool: &PgPool,
        input: &NewTaskExecution,
    ) -> Result<TaskExecution, sqlx::Error> {
        let query = format!(
            "INSERT INTO task_executions \
                 (id, task_instance_id, check_type, parameters, system_config, status_id) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TaskExecution>(&query)
            .bind(input.id)
            .bind(input.task_instance_id)
            .bind(&input.check_type)
            .bind(sqlx::types::Json(&input.parameters))
            .bind(sqlx::types::Json(&input.system_config))
            .bind(TaskExecutionStatus::Pending.id())
            .fetch_one(pool)
            .await
    }

    /// Atomically claim the oldest eligible row for `worker_id`.
    ///
    /// Eligible rows are pending ones and processing ones whose lease is
    /// older than `lease`. Returns `None` when nothing is eligible.
    pub async fn claim_next(
        pool: &PgPool,
        worker_id: &str,
        lease: Duration,
    ) -> Result<Option<TaskExecution>, sqlx::Error> {
        let query = format!(
            "UPDATE task_executions \
             SET status_id = $2, locked_at = NOW(), locked_by = $1, updated_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM task_executions \
                 WHERE status_id = $3 \
                    OR (status_id = $2 \
                        AND locked_at < NOW() - make_interval(secs => $4)) \
                 ORDER BY created_at ASC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TaskExecution>(&query)
            .bind(worker_id)
            .bind(TaskExecutionStatus::Processing.id())
            .bind(TaskExecutionStatus::Pending.id())
            .bind(lease.as_secs_f64())
            .fetch_optional(pool)
            .await
    }

    /// Write the final outcome and release the lease.
    ///
    /// Returns `false` if no row has the given id.
    pub async fn complete(
        pool: &PgPool,
        result: &TaskExecutionResult,
    ) -> Result<bool, sqlx::Error> {
        let status = TaskExecutionStatus::from(result.status);
        let outcome = sqlx::query(
            "UPDATE task_executions \
             SET status_id = $2, result = $3, error_message = $4, completed_at = $5, \
                 locked_at = NULL, locked_by = NULL, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(result.id)
        .bind(status.id())
        .bind(&result.result)
        .bind(result.error_message.as_deref())
        .bind(result.completed_at)
        .execute(pool)
        .await?;
        Ok(outcome.rows_affected() > 0)
    }

    /// Find an execution by its ID.
    pub async fn find_by_id(
        pool: &PgPool,
        id: Uuid,
    ) -> Result<Option<TaskExecution>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM task_executions WHERE id = $1");
        sqlx::query_as::<_, TaskExecution>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Number of rows per status.
    pub async fn count_by_status(pool: &PgPool) -> Result<Vec<StatusCount>, sqlx::Error> {
        sqlx::query_as::<_, StatusCount>(
            "SELECT status_id, COUNT(*) AS count FROM task_executions \
             GROUP BY status_id ORDER BY status_id",
        )
        .fetch_all(pool)
        .await
    }
}
