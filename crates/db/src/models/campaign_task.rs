//! Campaign task instance rows (owned by the compliance CRUD layer).

use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;
use vigil_core::types::{DbId, Timestamp};

/// A row from the `campaign_task_instances` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CampaignTaskInstance {
    pub id: DbId,
    pub campaign_id: DbId,
    pub check_type: String,
    /// Connected system the check runs against.
    pub target_id: Option<DbId>,
    pub parameters: Value,
    pub last_checked_at: Option<Timestamp>,
    pub last_check_status: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
