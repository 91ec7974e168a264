//! Repository for the `campaign_task_instances` table.

use sqlx::PgPool;
use vigil_core::types::{DbId, Timestamp};

use crate::models::campaign_task::CampaignTaskInstance;

/// Column list for `campaign_task_instances` queries.
const COLUMNS: &str = "\
    id, campaign_id, check_type, target_id, parameters, \
    last_checked_at, last_check_status, created_at, updated_at";

/// Read access plus last-check bookkeeping for task instances.
pub struct CampaignTaskRepo;

impl CampaignTaskRepo {
    /// Find a task instance by its ID.
    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<CampaignTaskInstance>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM campaign_task_instances WHERE id = $1");
        sqlx::query_as::<_, CampaignTaskInstance>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Stamp the latest check time and status.
    ///
    /// Returns `false` if the instance no longer exists.
    pub async fn record_check_status(
        pool: &PgPool,
        id: DbId,
        checked_at: Timestamp,
        status: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE campaign_task_instances \
             SET last_checked_at = $2, last_check_status = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(checked_at)
        .bind(status)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
