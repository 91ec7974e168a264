//! The durable check-execution queue.
//!
//! Delivery is at-least-once: a claimed request whose worker dies is
//! reclaimed once its lease expires and runs again.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;
use vigil_db::models::status::TaskExecutionStatus;
use vigil_db::models::task_execution::{
    NewTaskExecution, TaskExecutionRequest, TaskExecutionResult,
};
use vigil_db::repositories::task_execution_repo::DEFAULT_LEASE_DURATION;
use vigil_db::repositories::TaskExecutionRepo;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Queue persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("Task execution not found: {0}")]
    NotFound(Uuid),
}

/// Request counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Persist a new pending request.
    async fn enqueue(&self, request: &NewTaskExecution) -> Result<TaskExecutionRequest, QueueError>;

    /// Claim the oldest eligible request, if any.
    async fn dequeue(&self) -> Result<Option<TaskExecutionRequest>, QueueError>;

    /// Write the terminal outcome and release the lease.
    async fn update_result(&self, result: &TaskExecutionResult) -> Result<(), QueueError>;

    async fn get_status(&self, id: Uuid) -> Result<TaskExecutionRequest, QueueError>;

    async fn stats(&self) -> Result<QueueStats, QueueError>;
}

/// [`TaskQueue`] over the `task_executions` table.
pub struct PgTaskQueue {
    pool: PgPool,
    worker_id: String,
    lease: Duration,
}

impl PgTaskQueue {
    /// Queue claiming as `worker_id` with the default 5-minute lease.
    pub fn new(pool: PgPool, worker_id: impl Into<String>) -> Self {
        Self {
            pool,
            worker_id: worker_id.into(),
            lease: DEFAULT_LEASE_DURATION,
        }
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }
}

#[async_trait]
impl TaskQueue for PgTaskQueue {
    async fn enqueue(&self, request: &NewTaskExecution) -> Result<TaskExecutionRequest, QueueError> {
        let row = TaskExecutionRepo::enqueue(&self.pool, request).await?;
        tracing::debug!(
            execution_id = %row.id,
            check_type = %row.check_type,
            "Check execution enqueued",
        );
        Ok(row.into())
    }

    async fn dequeue(&self) -> Result<Option<TaskExecutionRequest>, QueueError> {
        let claimed = TaskExecutionRepo::claim_next(&self.pool, &self.worker_id, self.lease).await?;
        Ok(claimed.map(TaskExecutionRequest::from))
    }

    async fn update_result(&self, result: &TaskExecutionResult) -> Result<(), QueueError> {
        if TaskExecutionRepo::complete(&self.pool, result).await? {
            Ok(())
        } else {
            Err(QueueError::NotFound(result.id))
        }
    }

    async fn get_status(&self, id: Uuid) -> Result<TaskExecutionRequest, QueueError> {
        TaskExecutionRepo::find_by_id(&self.pool, id)
            .await?
            .map(TaskExecutionRequest::from)
            .ok_or(QueueError::NotFound(id))
    }

    async fn stats(&self) -> Result<QueueStats, QueueError> {
        let mut stats = QueueStats::default();
        for row in TaskExecutionRepo::count_by_status(&self.pool).await? {
            match TaskExecutionStatus::from_id(row.status_id) {
                Some(TaskExecutionStatus::Pending) => stats.pending = row.count,
                Some(TaskExecutionStatus::Processing) => stats.processing = row.count,
                Some(TaskExecutionStatus::Completed) => stats.completed = row.count,
                Some(TaskExecutionStatus::Failed) => stats.failed = row.count,
                None => tracing::warn!(status_id = row.status_id, "Unknown task execution status"),
            }
        }
        Ok(stats)
    }
}
