//! Task execution service.
//!
//! Polls the queue and drives each claimed request through
//! load → resolve target → resolve plugin → execute → normalize → persist.
//! Every stage can end the attempt early; whatever happened is still
//! written back to the queue, so a claimed request never stays
//! `processing` unless the worker itself dies.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use vigil_checks::plugin::{CheckError, CheckOutcome, ExecutionContext};
use vigil_checks::registry::PluginRegistry;
use vigil_checks::store::Store;
use vigil_core::envelope::ResultEnvelope;
use vigil_core::types::{DbId, JsonObject};
use vigil_db::models::campaign_task::CampaignTaskInstance;
use vigil_db::models::connected_system::ConnectedSystem;
use vigil_db::models::task_execution::{TaskExecutionRequest, TaskExecutionResult};
use vigil_db::models::task_result::NewTaskResult;

use crate::config::WorkerConfig;
use crate::queue::TaskQueue;

/// Timing knobs for the control loop.
#[derive(Debug, Clone, Copy)]
pub struct ServiceConfig {
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    pub check_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            error_backoff: Duration::from_secs(5),
            check_timeout: Duration::from_secs(240),
        }
    }
}

impl From<&WorkerConfig> for ServiceConfig {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            error_backoff: config.error_backoff,
            check_timeout: config.check_timeout,
        }
    }
}

/// How far one attempt got.
struct Attempt {
    /// Set once the task instance was loaded.
    instance_id: Option<DbId>,
    envelope: ResultEnvelope,
}

impl Attempt {
    fn failed(instance_id: Option<DbId>, message: impl Into<String>) -> Self {
        Self {
            instance_id,
            envelope: ResultEnvelope::pipeline_failure(message),
        }
    }
}

pub struct TaskExecutionService {
    queue: Arc<dyn TaskQueue>,
    store: Arc<dyn Store>,
    registry: Arc<PluginRegistry>,
    worker_id: String,
    config: ServiceConfig,
}

impl TaskExecutionService {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        store: Arc<dyn Store>,
        registry: Arc<PluginRegistry>,
        worker_id: impl Into<String>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            queue,
            store,
            registry,
            worker_id: worker_id.into(),
            config,
        }
    }

    /// Run until `cancel` fires. An in-flight check is finished first.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            worker_id = %self.worker_id,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            check_timeout_secs = self.config.check_timeout.as_secs(),
            "Task execution service started",
        );

        while !cancel.is_cancelled() {
            let pause = match self.queue.dequeue().await {
                Ok(Some(request)) => {
                    self.process_task(request).await;
                    continue;
                }
                Ok(None) => self.config.poll_interval,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to dequeue task execution");
                    self.config.error_backoff
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        tracing::info!(worker_id = %self.worker_id, "Task execution service stopped");
    }

    /// Execute one claimed request and record the outcome.
    ///
    /// Never fails: persistence errors past the queue write-back are
    /// logged. Returns what was written to the queue.
    pub async fn process_task(&self, request: TaskExecutionRequest) -> TaskExecutionResult {
        tracing::info!(
            execution_id = %request.id,
            task_instance_id = request.task_instance_id,
            check_type = %request.check_type,
            "Processing task execution",
        );

        let attempt = self.attempt(&request).await;
        let envelope = &attempt.envelope;
        let completed_at = Utc::now();
        let result = TaskExecutionResult {
            id: request.id,
            status: envelope.execution_status,
            result: envelope.to_json(),
            error_message: envelope.execution_error.clone(),
            completed_at,
        };

        if let Err(e) = self.queue.update_result(&result).await {
            tracing::error!(
                execution_id = %request.id,
                error = %e,
                "Failed to write task execution result",
            );
        }

        if let Some(instance_id) = attempt.instance_id {
            if let Err(e) = self
                .store
                .record_check_status(instance_id, completed_at, envelope.check_status)
                .await
            {
                tracing::warn!(
                    execution_id = %request.id,
                    task_instance_id = instance_id,
                    error = %e,
                    "Failed to update task instance status",
                );
            }

            let record = NewTaskResult {
                task_instance_id: instance_id,
                execution_id: request.id,
                executed_by: Some(self.worker_id.clone()),
                checked_at: completed_at,
                status: envelope.check_status.as_str().to_string(),
                output: result.result.clone(),
            };
            if let Err(e) = self.store.append_result(record).await {
                tracing::warn!(
                    execution_id = %request.id,
                    task_instance_id = instance_id,
                    error = %e,
                    "Failed to append task result history",
                );
            }
        }

        match &envelope.execution_error {
            None => tracing::info!(
                execution_id = %request.id,
                check_status = %envelope.check_status,
                "Task execution completed",
            ),
            Some(error) => tracing::warn!(
                execution_id = %request.id,
                check_status = %envelope.check_status,
                error = %error,
                "Task execution failed",
            ),
        }

        result
    }

    async fn attempt(&self, request: &TaskExecutionRequest) -> Attempt {
        let task = match self.store.task_instance(request.task_instance_id).await {
            Ok(task) => task,
            Err(e) => return Attempt::failed(None, format!("Failed to load task instance: {e}")),
        };
        let instance_id = Some(task.id);

        let Some(target_id) = task.target_id else {
            return Attempt::failed(instance_id, "No target configured");
        };
        let system = match self.store.connected_system(target_id).await {
            Ok(system) => system,
            Err(e) => {
                return Attempt::failed(instance_id, format!("Failed to load connected system: {e}"))
            }
        };

        let Some(plugin) = self.registry.get_plugin_for_check_type(&request.check_type).await else {
            return Attempt::failed(
                instance_id,
                format!("No plugin available for check type '{}'", request.check_type),
            );
        };

        let cancel = CancellationToken::new();
        // Cancels whatever the plugin spawned once this attempt ends.
        let _cancel_on_exit = cancel.clone().drop_guard();
        let ctx = self.context(request, task, system, cancel);

        let timeout = self.config.check_timeout;
        let outcome = match tokio::time::timeout(
            timeout,
            plugin.execute_check(&ctx, &request.check_type),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    execution_id = %request.id,
                    plugin_id = %plugin.id(),
                    timeout_secs = timeout.as_secs(),
                    "Check exceeded its deadline",
                );
                CheckOutcome::error(CheckError::Timeout(timeout))
            }
        };

        Attempt {
            instance_id,
            envelope: ResultEnvelope::from_plugin(
                outcome.status,
                &outcome.output,
                outcome.error.map(|e| e.to_string()),
            ),
        }
    }

    /// Request parameters win over instance parameters key by key. The
    /// request's system-config snapshot is used only when the live
    /// configuration is empty.
    fn context(
        &self,
        request: &TaskExecutionRequest,
        mut task: CampaignTaskInstance,
        mut system: ConnectedSystem,
        cancel: CancellationToken,
    ) -> ExecutionContext {
        let mut params = as_object(&task.parameters);
        params.extend(request.parameters.clone());
        task.parameters = Value::Object(params.clone());

        let live = as_object(&system.configuration);
        let config = if live.is_empty() {
            request.system_config.clone()
        } else {
            live
        };
        system.configuration = Value::Object(config.clone());

        ExecutionContext {
            task,
            params,
            system,
            config,
            store: Arc::clone(&self.store),
            deadline: Instant::now() + self.config.check_timeout,
            cancel,
        }
    }
}

fn as_object(value: &Value) -> JsonObject {
    match value {
        Value::Object(map) => map.clone(),
        _ => JsonObject::new(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
