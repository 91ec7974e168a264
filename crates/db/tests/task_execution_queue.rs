//! Queue semantics of `TaskExecutionRepo` against a real Postgres.

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use vigil_core::envelope::ExecutionStatus;
use vigil_core::types::JsonObject;
use vigil_db::models::status::TaskExecutionStatus;
use vigil_db::models::task_execution::{NewTaskExecution, TaskExecutionRequest, TaskExecutionResult};
use vigil_db::repositories::task_execution_repo::DEFAULT_LEASE_DURATION;
use vigil_db::repositories::TaskExecutionRepo;

fn new_request(task_instance_id: i64) -> NewTaskExecution {
    let mut params = JsonObject::new();
    params.insert("port".to_string(), json!(443));
    NewTaskExecution::new(task_instance_id, "network_port_check", params, JsonObject::new())
}

fn completed(id: Uuid) -> TaskExecutionResult {
    TaskExecutionResult {
        id,
        status: ExecutionStatus::Completed,
        result: json!({"check_status": "success", "execution_status": "completed"}),
        error_message: None,
        completed_at: Utc::now(),
    }
}

/// Push a row's lease into the past so it counts as abandoned.
async fn expire_lease(pool: &PgPool, id: Uuid) {
    sqlx::query("UPDATE task_executions SET locked_at = NOW() - INTERVAL '10 minutes' WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .unwrap();
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn enqueue_inserts_pending_row(pool: PgPool) {
    let input = new_request(1);
    let row = TaskExecutionRepo::enqueue(&pool, &input).await.unwrap();

    assert_eq!(row.id, input.id);
    assert_eq!(row.status_id, TaskExecutionStatus::Pending.id());
    assert_eq!(row.parameters["port"], 443);
    assert!(row.locked_at.is_none());
    assert!(row.locked_by.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn claim_returns_none_on_empty_queue(pool: PgPool) {
    let claimed = TaskExecutionRepo::claim_next(&pool, "worker-a", DEFAULT_LEASE_DURATION)
        .await
        .unwrap();
    assert!(claimed.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn claims_in_creation_order_and_stamps_lease(pool: PgPool) {
    let first = TaskExecutionRepo::enqueue(&pool, &new_request(1)).await.unwrap();
    let second = TaskExecutionRepo::enqueue(&pool, &new_request(2)).await.unwrap();

    let a = TaskExecutionRepo::claim_next(&pool, "worker-a", DEFAULT_LEASE_DURATION)
        .await
        .unwrap()
        .expect("first row");
    let b = TaskExecutionRepo::claim_next(&pool, "worker-b", DEFAULT_LEASE_DURATION)
        .await
        .unwrap()
        .expect("second row");

    assert_eq!(a.id, first.id);
    assert_eq!(b.id, second.id);
    assert_eq!(a.status_id, TaskExecutionStatus::Processing.id());
    assert_eq!(a.locked_by.as_deref(), Some("worker-a"));
    assert!(a.locked_at.is_some());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn held_lease_is_not_reclaimed(pool: PgPool) {
    TaskExecutionRepo::enqueue(&pool, &new_request(1)).await.unwrap();
    TaskExecutionRepo::claim_next(&pool, "worker-a", DEFAULT_LEASE_DURATION)
        .await
        .unwrap()
        .expect("claimed");

    let again = TaskExecutionRepo::claim_next(&pool, "worker-b", DEFAULT_LEASE_DURATION)
        .await
        .unwrap();
    assert!(again.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn abandoned_lease_is_reclaimed_and_completed_once(pool: PgPool) {
    let row = TaskExecutionRepo::enqueue(&pool, &new_request(1)).await.unwrap();
    TaskExecutionRepo::claim_next(&pool, "worker-a", DEFAULT_LEASE_DURATION)
        .await
        .unwrap()
        .expect("claimed by a");

    // worker-a dies without writing a result.
    expire_lease(&pool, row.id).await;

    let reclaimed = TaskExecutionRepo::claim_next(&pool, "worker-b", DEFAULT_LEASE_DURATION)
        .await
        .unwrap()
        .expect("reclaimed by b");
    assert_eq!(reclaimed.id, row.id);
    assert_eq!(reclaimed.locked_by.as_deref(), Some("worker-b"));

    assert!(TaskExecutionRepo::complete(&pool, &completed(row.id)).await.unwrap());

    let stored = TaskExecutionRepo::find_by_id(&pool, row.id).await.unwrap().unwrap();
    assert_eq!(stored.status_id, TaskExecutionStatus::Completed.id());
    assert!(stored.locked_at.is_none());
    assert!(stored.locked_by.is_none());
    assert!(stored.completed_at.is_some());

    // Terminal rows are never claimed, even with an old lease timestamp.
    expire_lease(&pool, row.id).await;
    let none = TaskExecutionRepo::claim_next(&pool, "worker-c", DEFAULT_LEASE_DURATION)
        .await
        .unwrap();
    assert!(none.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn short_lease_expires_by_duration(pool: PgPool) {
    TaskExecutionRepo::enqueue(&pool, &new_request(1)).await.unwrap();
    TaskExecutionRepo::claim_next(&pool, "worker-a", Duration::from_millis(50))
        .await
        .unwrap()
        .expect("claimed");

    tokio::time::sleep(Duration::from_millis(200)).await;

    let reclaimed = TaskExecutionRepo::claim_next(&pool, "worker-b", Duration::from_millis(50))
        .await
        .unwrap();
    assert!(reclaimed.is_some());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn failed_result_keeps_error_message(pool: PgPool) {
    let row = TaskExecutionRepo::enqueue(&pool, &new_request(1)).await.unwrap();
    TaskExecutionRepo::claim_next(&pool, "worker-a", DEFAULT_LEASE_DURATION)
        .await
        .unwrap();

    let result = TaskExecutionResult {
        id: row.id,
        status: ExecutionStatus::Failed,
        result: json!({"execution_error": "no target configured"}),
        error_message: Some("no target configured".to_string()),
        completed_at: Utc::now(),
    };
    TaskExecutionRepo::complete(&pool, &result).await.unwrap();

    let stored = TaskExecutionRepo::find_by_id(&pool, row.id).await.unwrap().unwrap();
    assert_eq!(stored.status_id, TaskExecutionStatus::Failed.id());
    assert_eq!(stored.error_message.as_deref(), Some("no target configured"));
    assert_eq!(stored.result.unwrap()["execution_error"], "no target configured");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn complete_unknown_id_reports_missing_row(pool: PgPool) {
    let updated = TaskExecutionRepo::complete(&pool, &completed(Uuid::now_v7()))
        .await
        .unwrap();
    assert!(!updated);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn non_object_json_decodes_to_empty_bag(pool: PgPool) {
    let row = TaskExecutionRepo::enqueue(&pool, &new_request(1)).await.unwrap();
    sqlx::query("UPDATE task_executions SET parameters = '\"oops\"'::jsonb WHERE id = $1")
        .bind(row.id)
        .execute(&pool)
        .await
        .unwrap();

    let claimed = TaskExecutionRepo::claim_next(&pool, "worker-a", DEFAULT_LEASE_DURATION)
        .await
        .unwrap()
        .expect("still returned");
    let request = TaskExecutionRequest::from(claimed);
    assert_eq!(request.id, row.id);
    assert!(request.parameters.is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn concurrent_claims_never_overlap(pool: PgPool) {
    const REQUESTS: usize = 40;
    const WORKERS: usize = 6;

    for i in 0..REQUESTS {
        TaskExecutionRepo::enqueue(&pool, &new_request(i as i64)).await.unwrap();
    }

    let handles = (0..WORKERS).map(|w| {
        let pool = pool.clone();
        tokio::spawn(async move {
            let worker = format!("worker-{w}");
            let mut claimed = Vec::new();
            while let Some(row) = TaskExecutionRepo::claim_next(&pool, &worker, DEFAULT_LEASE_DURATION)
                .await
                .unwrap()
            {
                TaskExecutionRepo::complete(&pool, &completed(row.id)).await.unwrap();
                claimed.push(row.id);
            }
            claimed
        })
    });

    let mut all = Vec::new();
    for claimed in futures::future::join_all(handles).await {
        all.extend(claimed.unwrap());
    }

    let unique: HashSet<_> = all.iter().copied().collect();
    assert_eq!(all.len(), REQUESTS, "every request claimed exactly once");
    assert_eq!(unique.len(), REQUESTS);

    let counts = TaskExecutionRepo::count_by_status(&pool).await.unwrap();
    assert_eq!(counts.len(), 1);
    assert_eq!(counts[0].status_id, TaskExecutionStatus::Completed.id());
    assert_eq!(counts[0].count, REQUESTS as i64);
}
