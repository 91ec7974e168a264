//! Postgres adapters for the `Store` and `PluginCatalog` seams.
//!
//! sqlx errors are flattened into [`CoreError::Internal`]; the pipeline
//! only needs to tell "missing" from "broken".

use async_trait::async_trait;
use sqlx::PgPool;
use vigil_checks::plugin::CheckTypeConfiguration;
use vigil_checks::registry::PluginCatalog;
use vigil_checks::store::Store;
use vigil_core::check_status::CheckStatus;
use vigil_core::error::CoreError;
use vigil_core::types::{DbId, Timestamp};
use vigil_db::models::campaign_task::CampaignTaskInstance;
use vigil_db::models::check_plugin::NewCheckPlugin;
use vigil_db::models::connected_system::ConnectedSystem;
use vigil_db::models::task_result::NewTaskResult;
use vigil_db::repositories::{
    CampaignTaskRepo, CheckPluginRepo, ConnectedSystemRepo, TaskResultRepo,
};

fn internal(e: sqlx::Error) -> CoreError {
    CoreError::Internal(e.to_string())
}

/// Platform data backed by the main database.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn task_instance(&self, id: DbId) -> Result<CampaignTaskInstance, CoreError> {
        CampaignTaskRepo::find_by_id(&self.pool, id)
            .await
            .map_err(internal)?
            .ok_or(CoreError::NotFound {
                entity: "campaign_task_instance",
                id,
            })
    }

    async fn connected_system(&self, id: DbId) -> Result<ConnectedSystem, CoreError> {
        ConnectedSystemRepo::find_by_id(&self.pool, id)
            .await
            .map_err(internal)?
            .ok_or(CoreError::NotFound {
                entity: "connected_system",
                id,
            })
    }

    async fn record_check_status(
        &self,
        id: DbId,
        checked_at: Timestamp,
        status: CheckStatus,
    ) -> Result<(), CoreError> {
        let updated = CampaignTaskRepo::record_check_status(&self.pool, id, checked_at, status.as_str())
            .await
            .map_err(internal)?;
        if updated {
            Ok(())
        } else {
            Err(CoreError::NotFound {
                entity: "campaign_task_instance",
                id,
            })
        }
    }

    async fn append_result(&self, record: NewTaskResult) -> Result<(), CoreError> {
        TaskResultRepo::append(&self.pool, &record)
            .await
            .map_err(internal)?;
        Ok(())
    }
}

/// Plugin registrations in `check_plugins` / `check_type_configurations`.
#[derive(Clone)]
pub struct PgPluginCatalog {
    pool: PgPool,
}

impl PgPluginCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PluginCatalog for PgPluginCatalog {
    async fn upsert_plugin(&self, plugin: &NewCheckPlugin) -> Result<(), CoreError> {
        CheckPluginRepo::upsert(&self.pool, plugin)
            .await
            .map_err(internal)?;
        Ok(())
    }

    async fn set_plugin_active(&self, id: &str, active: bool) -> Result<(), CoreError> {
        if CheckPluginRepo::set_active(&self.pool, id, active)
            .await
            .map_err(internal)?
        {
            Ok(())
        } else {
            Err(CoreError::Validation(format!("Unknown check plugin: {id}")))
        }
    }

    async fn active_check_types(&self) -> Result<Vec<CheckTypeConfiguration>, CoreError> {
        let rows = CheckPluginRepo::list_active_check_types(&self.pool)
            .await
            .map_err(internal)?;
        Ok(rows.into_iter().map(CheckTypeConfiguration::from).collect())
    }

    async fn is_check_type_active(&self, check_type: &str) -> Result<bool, CoreError> {
        CheckPluginRepo::is_check_type_active(&self.pool, check_type)
            .await
            .map_err(internal)
    }
}
