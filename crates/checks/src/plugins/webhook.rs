//! Outbound webhook checks.
//!
//! **Side effects.** A webhook check triggers work on the remote end. Queue
//! delivery is at-least-once, so after a lease reclaim the same request can
//! be POSTed twice, and the payload carries no idempotency key.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use vigil_core::check_status::CheckStatus;

use super::http::read_body;
use crate::params::{optional_str, require_str, truncate};
use crate::plugin::{
    CheckError, CheckOutcome, CheckPlugin, CheckTypeConfiguration, ExecutionContext,
    ParameterDefinition,
};

pub const WEBHOOK_CHECK: &str = "webhook_check";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_BODY_CHARS: usize = 1024;
/// Replies past this size are not parsed for a status.
const MAX_REPLY_BYTES: usize = 64 * 1024;

pub struct WebhookPlugin {
    client: reqwest::Client,
}

impl WebhookPlugin {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CheckPlugin for WebhookPlugin {
    fn id(&self) -> &str {
        "webhook"
    }

    fn name(&self) -> &str {
        "Webhook checks"
    }

    fn check_types(&self) -> Vec<CheckTypeConfiguration> {
        vec![CheckTypeConfiguration {
            check_type: WEBHOOK_CHECK.to_string(),
            name: "Webhook trigger".to_string(),
            description: "POSTs the task to a remote endpoint that performs the check"
                .to_string(),
            target_type: "webhook".to_string(),
            parameters: vec![ParameterDefinition::optional(
                "payload",
                "object",
                Some(json!({})),
                "Extra JSON sent to the endpoint",
            )],
        }]
    }

    async fn execute_check(&self, ctx: &ExecutionContext, check_type: &str) -> CheckOutcome {
        if check_type != WEBHOOK_CHECK {
            return CheckOutcome::error(CheckError::UnsupportedCheckType(check_type.to_string()));
        }
        let url = match webhook_url(ctx) {
            Ok(url) => url,
            Err(e) => return CheckOutcome::error(e),
        };
        let payload = match ctx.lookup("payload") {
            None => json!({}),
            Some(Value::Object(map)) => Value::Object(map.clone()),
            Some(_) => {
                return CheckOutcome::error(CheckError::invalid_parameter(
                    "payload",
                    "must be an object",
                ))
            }
        };
        let token = match optional_str(ctx, "auth_token") {
            Ok(token) => token,
            Err(e) => return CheckOutcome::error(e),
        };

        let body = json!({
            "task_instance_id": ctx.task.id,
            "check_type": check_type,
            "system_id": ctx.system.id,
            "payload": payload,
        });
        let timeout = ctx.budget(REQUEST_TIMEOUT);
        let started = Instant::now();

        let mut request = self.client.post(url).timeout(timeout).json(&body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let error = if e.is_timeout() {
                    CheckError::Timeout(timeout)
                } else {
                    CheckError::Transport(e.to_string())
                };
                return CheckOutcome::failed(json!({"url": url, "error": error.to_string()}))
                    .with_error(error);
            }
        };

        let status_code = response.status().as_u16();
        let (text, cut) = read_body(response, MAX_REPLY_BYTES).await;
        let reply = if cut {
            None
        } else {
            serde_json::from_str::<Value>(&text).ok()
        };
        let status = classify(status_code, reply.as_ref());
        // Large JSON replies are kept as truncated text.
        let stored = match reply {
            Some(reply) if text.chars().count() <= MAX_BODY_CHARS => reply,
            _ => Value::from(truncate(&text, MAX_BODY_CHARS)),
        };

        tracing::info!(url, status_code, check_status = %status, "Webhook delivered");
        CheckOutcome::new(
            status,
            &json!({
                "url": url,
                "status_code": status_code,
                "elapsed_ms": started.elapsed().as_millis() as u64,
                "response": stored,
            }),
        )
    }
}

fn webhook_url(ctx: &ExecutionContext) -> Result<&str, CheckError> {
    let url = require_str(ctx, "webhook_url")
        .map_err(|_| CheckError::InvalidConfig("webhook_url is required".to_string()))?;
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(url)
    } else {
        Err(CheckError::InvalidConfig(format!(
            "webhook_url must be an http(s) URL, got {url}"
        )))
    }
}

/// Map the receiver's answer to a check status.
///
/// `202 Accepted`, or a 2xx reply with `"status": "pending"` or
/// `"async": true`, means the remote work continues after the call.
fn classify(status_code: u16, reply: Option<&Value>) -> CheckStatus {
    if !(200..300).contains(&status_code) {
        return CheckStatus::Failed;
    }
    if status_code == 202 {
        return CheckStatus::Pending;
    }
    let Some(reply) = reply else {
        return CheckStatus::Success;
    };
    if reply.get("async").and_then(Value::as_bool) == Some(true) {
        return CheckStatus::Pending;
    }
    match reply.get("status").and_then(Value::as_str) {
        Some("pending") => CheckStatus::Pending,
        Some("completed") => CheckStatus::Completed,
        Some("failed") => CheckStatus::Failed,
        _ => CheckStatus::Success,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
