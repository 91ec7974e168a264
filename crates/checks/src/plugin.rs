//! The check plugin contract.
//!
//! A plugin serves one or more check types. The execution service hands it
//! an [`ExecutionContext`] for a single task and gets back a
//! [`CheckOutcome`]: a status, free-form output text, and optionally the
//! error that stopped evaluation. Output and error travel together so a
//! plugin that fails halfway still reports what it saw.
//!
//! # Delivery guarantee
//!
//! Queue delivery is at-least-once. A worker that dies mid-check loses its
//! lease and another worker runs the same request again, so checks must be
//! read-only probes. Plugins that trigger remote side effects (webhooks,
//! scripts that call out) can fire twice after a reclaim; there is no
//! idempotency marker to prevent it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use vigil_core::check_status::CheckStatus;
use vigil_core::types::JsonObject;
use vigil_db::models::campaign_task::CampaignTaskInstance;
use vigil_db::models::connected_system::ConnectedSystem;

pub use vigil_db::models::check_plugin::{CheckTypeConfiguration, ParameterDefinition};

use crate::store::Store;

/// Why a plugin could not produce a clean result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckError {
    /// The connected system's configuration is missing or malformed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A task parameter is missing or malformed.
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// The plugin was asked for a check type it does not serve.
    #[error("Unsupported check type: {0}")]
    UnsupportedCheckType(String),

    /// The call was attempted and the transport failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The execution deadline elapsed.
    #[error("Check timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CheckError {
    pub fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result of one `execute_check` call.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub status: CheckStatus,
    /// Usually serialized JSON; any text is accepted.
    pub output: String,
    pub error: Option<CheckError>,
}

impl CheckOutcome {
    pub fn new(status: CheckStatus, output: &Value) -> Self {
        Self {
            status,
            output: output.to_string(),
            error: None,
        }
    }

    pub fn success(output: Value) -> Self {
        Self::new(CheckStatus::Success, &output)
    }

    /// Negative result; the evidence belongs in `output`.
    pub fn failed(output: Value) -> Self {
        Self::new(CheckStatus::Failed, &output)
    }

    /// The check could not be evaluated.
    pub fn error(error: CheckError) -> Self {
        Self {
            status: CheckStatus::Error,
            output: json!({ "error": error.to_string() }).to_string(),
            error: Some(error),
        }
    }

    /// Attach an error while keeping status and output.
    pub fn with_error(mut self, error: CheckError) -> Self {
        self.error = Some(error);
        self
    }
}

/// Everything a plugin may look at while running one check.
pub struct ExecutionContext {
    /// The task instance; its `parameters` already hold the effective bag.
    pub task: CampaignTaskInstance,
    /// Effective parameters (request snapshot over instance parameters).
    pub params: JsonObject,
    pub system: ConnectedSystem,
    /// Effective target configuration.
    pub config: JsonObject,
    /// Platform data, for plugins that need auxiliary lookups.
    pub store: Arc<dyn Store>,
    pub deadline: Instant,
    pub cancel: CancellationToken,
}

impl ExecutionContext {
    /// Time left before the deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// `limit` capped at the time left before the deadline.
    pub fn budget(&self, limit: Duration) -> Duration {
        limit.min(self.remaining())
    }

    /// Parameter value, falling back to the target configuration.
    pub fn lookup(&self, key: &str) -> Option<&Value> {
        self.params
            .get(key)
            .filter(|v| !v.is_null())
            .or_else(|| self.config.get(key).filter(|v| !v.is_null()))
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("task_id", &self.task.id)
            .field("system_id", &self.system.id)
            .field("params", &self.params)
            .field("remaining", &self.remaining())
            .finish_non_exhaustive()
    }
}

/// A family of checks.
#[async_trait]
pub trait CheckPlugin: Send + Sync {
    /// Stable identifier, persisted in `check_plugins.id`.
    fn id(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Schemas of the check types this plugin serves.
    fn check_types(&self) -> Vec<CheckTypeConfiguration>;

    /// Run one check. Validation must happen before any network call.
    async fn execute_check(&self, ctx: &ExecutionContext, check_type: &str) -> CheckOutcome;
}
