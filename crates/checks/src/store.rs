//! Narrow view of platform data used by the execution pipeline.
//!
//! Everything outside the check subsystem (campaigns, targets, history) is
//! reached through [`Store`]. The queue is separate; a queue write and a
//! store write are never in the same transaction.

use async_trait::async_trait;
use vigil_core::check_status::CheckStatus;
use vigil_core::error::CoreError;
use vigil_core::types::{DbId, Timestamp};
use vigil_db::models::campaign_task::CampaignTaskInstance;
use vigil_db::models::connected_system::ConnectedSystem;
use vigil_db::models::task_result::NewTaskResult;

/// Reads task instances and targets, writes check status and history.
///
/// Missing rows are reported as [`CoreError::NotFound`]; storage failures
/// as [`CoreError::Internal`].
#[async_trait]
pub trait Store: Send + Sync {
    async fn task_instance(&self, id: DbId) -> Result<CampaignTaskInstance, CoreError>;

    async fn connected_system(&self, id: DbId) -> Result<ConnectedSystem, CoreError>;

    async fn record_check_status(
        &self,
        id: DbId,
        checked_at: Timestamp,
        status: CheckStatus,
    ) -> Result<(), CoreError>;

    async fn append_result(&self, record: NewTaskResult) -> Result<(), CoreError>;
}
