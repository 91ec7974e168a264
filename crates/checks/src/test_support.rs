//! Fixtures for plugin tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use vigil_core::check_status::CheckStatus;
use vigil_core::error::CoreError;
use vigil_core::types::{DbId, JsonObject, Timestamp};
use vigil_db::models::campaign_task::CampaignTaskInstance;
use vigil_db::models::connected_system::ConnectedSystem;
use vigil_db::models::task_result::NewTaskResult;

use crate::plugin::ExecutionContext;
use crate::store::Store;

/// A store with nothing in it.
pub struct EmptyStore;

#[async_trait]
impl Store for EmptyStore {
    async fn task_instance(&self, id: DbId) -> Result<CampaignTaskInstance, CoreError> {
        Err(CoreError::NotFound { entity: "campaign_task_instance", id })
    }

    async fn connected_system(&self, id: DbId) -> Result<ConnectedSystem, CoreError> {
        Err(CoreError::NotFound { entity: "connected_system", id })
    }

    async fn record_check_status(&self, _: DbId, _: Timestamp, _: CheckStatus) -> Result<(), CoreError> {
        Ok(())
    }

    async fn append_result(&self, _: NewTaskResult) -> Result<(), CoreError> {
        Ok(())
    }
}

fn object(value: Value) -> JsonObject {
    match value {
        Value::Object(map) => map,
        _ => JsonObject::new(),
    }
}

/// Context for task 1 against system 1 with a 30-second deadline.
pub fn context(params: Value, config: Value) -> ExecutionContext {
    let now = Utc::now();
    let params = object(params);
    let config = object(config);
    ExecutionContext {
        task: CampaignTaskInstance {
            id: 1,
            campaign_id: 1,
            check_type: "test".to_string(),
            target_id: Some(1),
            parameters: Value::Object(params.clone()),
            last_checked_at: None,
            last_check_status: None,
            created_at: now,
            updated_at: now,
        },
        params,
        system: ConnectedSystem {
            id: 1,
            name: "test system".to_string(),
            system_type: "test".to_string(),
            configuration: Value::Object(config.clone()),
            created_at: now,
            updated_at: now,
        },
        config,
        store: Arc::new(EmptyStore),
        deadline: Instant::now() + Duration::from_secs(30),
        cancel: CancellationToken::new(),
    }
}
