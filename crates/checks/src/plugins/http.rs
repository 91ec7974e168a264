//! HTTP endpoint checks.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{json, Value};
use vigil_core::check_status::CheckStatus;

use crate::params::{optional_str, optional_u64, require_str, truncate};
use crate::plugin::{
    CheckError, CheckOutcome, CheckPlugin, CheckTypeConfiguration, ExecutionContext,
    ParameterDefinition,
};

pub const GET_CHECK: &str = "http_get_check";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_EXPECTED_STATUS: u16 = 200;
const MAX_BODY_CHARS: usize = 1024;
/// Enough bytes for `MAX_BODY_CHARS + 1` characters of any width.
const MAX_BODY_BYTES: usize = (MAX_BODY_CHARS + 1) * 4;

pub struct HttpPlugin {
    client: reqwest::Client,
}

impl HttpPlugin {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CheckPlugin for HttpPlugin {
    fn id(&self) -> &str {
        "http"
    }

    fn name(&self) -> &str {
        "HTTP checks"
    }

    fn check_types(&self) -> Vec<CheckTypeConfiguration> {
        vec![CheckTypeConfiguration {
            check_type: GET_CHECK.to_string(),
            name: "HTTP GET status".to_string(),
            description: "Issues a GET and compares the response status".to_string(),
            target_type: "web_service".to_string(),
            parameters: vec![
                ParameterDefinition::optional(
                    "api_path",
                    "string",
                    Some(json!("")),
                    "Path appended to the system's base_url",
                ),
                ParameterDefinition::optional(
                    "expected_status",
                    "integer",
                    Some(json!(DEFAULT_EXPECTED_STATUS)),
                    "Expected HTTP status code",
                ),
            ],
        }]
    }

    async fn execute_check(&self, ctx: &ExecutionContext, check_type: &str) -> CheckOutcome {
        if check_type != GET_CHECK {
            return CheckOutcome::error(CheckError::UnsupportedCheckType(check_type.to_string()));
        }
        let request = match GetRequest::from_context(ctx) {
            Ok(request) => request,
            Err(e) => return CheckOutcome::error(e),
        };
        self.get(&request, ctx.budget(REQUEST_TIMEOUT)).await
    }
}

impl HttpPlugin {
    async fn get(&self, request: &GetRequest, timeout: Duration) -> CheckOutcome {
        let started = Instant::now();
        let mut builder = self
            .client
            .get(&request.url)
            .timeout(timeout)
            .headers(request.headers.clone());
        if let Some(token) = &request.auth_token {
            builder = builder.bearer_auth(token);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                let error = if e.is_timeout() {
                    CheckError::Timeout(timeout)
                } else {
                    CheckError::Transport(e.to_string())
                };
                return CheckOutcome::failed(json!({
                    "url": request.url,
                    "expected_status": request.expected_status,
                    "error": error.to_string(),
                }))
                .with_error(error);
            }
        };

        let status_code = response.status().as_u16();
        let (body, _) = read_body(response, MAX_BODY_BYTES).await;
        let status = if status_code == request.expected_status {
            CheckStatus::Success
        } else {
            CheckStatus::Failed
        };

        tracing::debug!(url = %request.url, status_code, "HTTP check response");
        CheckOutcome::new(
            status,
            &json!({
                "url": request.url,
                "expected_status": request.expected_status,
                "status_code": status_code,
                "elapsed_ms": started.elapsed().as_millis() as u64,
                "body": truncate(&body, MAX_BODY_CHARS),
            }),
        )
    }
}

#[derive(Debug)]
struct GetRequest {
    url: String,
    expected_status: u16,
    auth_token: Option<String>,
    headers: HeaderMap,
}

impl GetRequest {
    fn from_context(ctx: &ExecutionContext) -> Result<Self, CheckError> {
        let base_url = require_str(ctx, "base_url")
            .map_err(|_| CheckError::InvalidConfig("base_url is required".to_string()))?;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(CheckError::InvalidConfig(format!(
                "base_url must be an http(s) URL, got {base_url}"
            )));
        }
        let path = optional_str(ctx, "api_path")?.unwrap_or("");
        let url = join_url(base_url, path);

        let expected_status = match optional_u64(ctx, "expected_status")? {
            None => DEFAULT_EXPECTED_STATUS,
            Some(code @ 100..=599) => code as u16,
            Some(code) => {
                return Err(CheckError::invalid_parameter(
                    "expected_status",
                    format!("{code} is not an HTTP status code"),
                ))
            }
        };

        Ok(Self {
            url,
            expected_status,
            auth_token: optional_str(ctx, "auth_token")?.map(str::to_string),
            headers: header_map(ctx.lookup("headers"))?,
        })
    }
}

/// Read at most `max_bytes` of a response body, chunk by chunk.
///
/// Returns the (lossily decoded) prefix and whether anything was left
/// unread. A body that fails mid-read keeps what arrived so far.
pub(super) async fn read_body(mut response: reqwest::Response, max_bytes: usize) -> (String, bool) {
    let mut buf = Vec::new();
    let mut cut = false;
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let room = max_bytes - buf.len();
                if chunk.len() > room {
                    buf.extend_from_slice(&chunk[..room]);
                    cut = true;
                    break;
                }
                buf.extend_from_slice(&chunk);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "Response body read failed");
                break;
            }
        }
    }
    (String::from_utf8_lossy(&buf).into_owned(), cut)
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim();
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{}", path.trim_start_matches('/'))
    }
}

fn header_map(value: Option<&Value>) -> Result<HeaderMap, CheckError> {
    let mut headers = HeaderMap::new();
    let Some(value) = value else {
        return Ok(headers);
    };
    let Value::Object(entries) = value else {
        return Err(CheckError::InvalidConfig("headers must be an object".to_string()));
    };
    for (name, value) in entries {
        let Some(value) = value.as_str() else {
            return Err(CheckError::InvalidConfig(format!("header {name} must be a string")));
        };
        let header = HeaderName::try_from(name.as_str())
            .map_err(|e| CheckError::InvalidConfig(format!("header name {name}: {e}")))?;
        let value = HeaderValue::try_from(value)
            .map_err(|e| CheckError::InvalidConfig(format!("header {name}: {e}")))?;
        headers.insert(header, value);
    }
    Ok(headers)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
