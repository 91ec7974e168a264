//! Local script checks.
//!
//! Runs an operator-provided shell script or executable with the task on
//! stdin. Scripts that call out to other systems are side-effecting and can
//! run twice after a lease reclaim.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use vigil_core::check_status::CheckStatus;
use vigil_core::probe::binary::BinaryRunner;
use vigil_core::probe::runner::{ProbeError, ProbeInput, ProbeOutput, ProbeRunner};
use vigil_core::probe::shell::ShellRunner;

use crate::params::{optional_str, optional_timeout, require_str, truncate};
use crate::plugin::{
    CheckError, CheckOutcome, CheckPlugin, CheckTypeConfiguration, ExecutionContext,
    ParameterDefinition,
};

pub const SCRIPT_CHECK: &str = "script_check";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_TIMEOUT: Duration = Duration::from_secs(300);
const MAX_STREAM_CHARS: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interpreter {
    Shell,
    Binary,
}

pub struct ScriptPlugin;

#[async_trait]
impl CheckPlugin for ScriptPlugin {
    fn id(&self) -> &str {
        "script"
    }

    fn name(&self) -> &str {
        "Script checks"
    }

    fn check_types(&self) -> Vec<CheckTypeConfiguration> {
        vec![CheckTypeConfiguration {
            check_type: SCRIPT_CHECK.to_string(),
            name: "Custom script".to_string(),
            description: "Runs a script; exit code 0 passes".to_string(),
            target_type: "any".to_string(),
            parameters: vec![
                ParameterDefinition::required("script_path", "string", "Path to the script"),
                ParameterDefinition::optional(
                    "interpreter",
                    "string",
                    None,
                    "shell or binary; inferred from the extension when omitted",
                ),
                ParameterDefinition::optional(
                    "timeout_secs",
                    "integer",
                    Some(json!(DEFAULT_TIMEOUT.as_secs())),
                    "Kill the script after this many seconds, at most 300",
                ),
            ],
        }]
    }

    async fn execute_check(&self, ctx: &ExecutionContext, check_type: &str) -> CheckOutcome {
        if check_type != SCRIPT_CHECK {
            return CheckOutcome::error(CheckError::UnsupportedCheckType(check_type.to_string()));
        }
        let invocation = match Invocation::from_context(ctx) {
            Ok(invocation) => invocation,
            Err(e) => return CheckOutcome::error(e),
        };

        let input = ProbeInput {
            payload: json!({
                "task_instance_id": ctx.task.id,
                "check_type": check_type,
                "parameters": ctx.params,
                "config": ctx.config,
            }),
            env_vars: vec![
                ("TASK_INSTANCE_ID".to_string(), ctx.task.id.to_string()),
                ("CHECK_TYPE".to_string(), check_type.to_string()),
            ],
            timeout: invocation.timeout,
        };

        let result = match invocation.interpreter {
            Interpreter::Shell => ShellRunner.run(&invocation.path, input).await,
            Interpreter::Binary => BinaryRunner.run(&invocation.path, input).await,
        };

        match result {
            Ok(output) => grade(&output),
            Err(e @ (ProbeError::NotFound(_) | ProbeError::PermissionDenied(_))) => {
                CheckOutcome::error(CheckError::InvalidConfig(e.to_string()))
            }
            Err(ProbeError::Timeout { elapsed_ms }) => {
                let error = CheckError::Timeout(invocation.timeout);
                CheckOutcome::failed(json!({
                    "script_path": invocation.path,
                    "elapsed_ms": elapsed_ms,
                    "error": error.to_string(),
                }))
                .with_error(error)
            }
            Err(ProbeError::Io(e)) => {
                let error = CheckError::Transport(format!("failed to run {}: {e}", invocation.path));
                CheckOutcome::failed(json!({
                    "script_path": invocation.path,
                    "error": error.to_string(),
                }))
                .with_error(error)
            }
        }
    }
}

#[derive(Debug)]
struct Invocation {
    path: String,
    interpreter: Interpreter,
    timeout: Duration,
}

impl Invocation {
    fn from_context(ctx: &ExecutionContext) -> Result<Self, CheckError> {
        let path = require_str(ctx, "script_path")?.to_string();
        let interpreter = match optional_str(ctx, "interpreter")? {
            Some("shell") => Interpreter::Shell,
            Some("binary") => Interpreter::Binary,
            Some(other) => {
                return Err(CheckError::invalid_parameter(
                    "interpreter",
                    format!("expected shell or binary, got {other}"),
                ))
            }
            None if path.ends_with(".sh") => Interpreter::Shell,
            None => Interpreter::Binary,
        };
        let timeout = optional_timeout(ctx, "timeout_secs", DEFAULT_TIMEOUT, MAX_TIMEOUT)?;
        Ok(Self {
            path,
            interpreter,
            timeout: ctx.budget(timeout),
        })
    }
}

/// Exit 0 passes. A JSON object on stdout with a valid `status` field
/// overrides the exit-code verdict.
fn grade(output: &ProbeOutput) -> CheckOutcome {
    let reported = output
        .parsed_stdout
        .as_ref()
        .and_then(|v| v.get("status"))
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<CheckStatus>().ok());
    let status = reported.unwrap_or(if output.succeeded() {
        CheckStatus::Success
    } else {
        CheckStatus::Failed
    });

    CheckOutcome::new(
        status,
        &json!({
            "exit_code": output.exit_code,
            "duration_ms": output.duration_ms,
            "result": output.parsed_stdout,
            "stdout": if output.parsed_stdout.is_some() {
                Value::Null
            } else {
                Value::from(truncate(&output.stdout, MAX_STREAM_CHARS))
            },
            "stderr": truncate(&output.stderr, MAX_STREAM_CHARS),
        }),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;

    use super::*;
    use crate::test_support::context;

    fn write_script(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new()
            .suffix(".sh")
            .tempfile()
            .expect("create temp file");
        writeln!(f, "#!/bin/bash").expect("write shebang");
        write!(f, "{body}").expect("write body");
        f
    }

    fn path(f: &tempfile::NamedTempFile) -> String {
        f.path().to_str().expect("path").to_string()
    }

    fn output(outcome: &CheckOutcome) -> Value {
        serde_json::from_str(&outcome.output).unwrap()
    }

    #[tokio::test]
    async fn zero_exit_succeeds_with_parsed_stdout() {
        // Echo the stdin payload back as the result.
        let script = write_script("cat\n");
        let ctx = context(
            json!({"script_path": path(&script), "host": "db.internal"}),
            json!({"region": "eu-west-1"}),
        );

        let outcome = ScriptPlugin.execute_check(&ctx, SCRIPT_CHECK).await;

        assert_eq!(outcome.status, CheckStatus::Success);
        let out = output(&outcome);
        assert_eq!(out["exit_code"], 0);
        assert_eq!(out["result"]["parameters"]["host"], "db.internal");
        assert_eq!(out["result"]["config"]["region"], "eu-west-1");
        assert!(out["stdout"].is_null());
    }

    #[tokio::test]
    async fn nonzero_exit_fails() {
        let script = write_script("echo 'sshd misconfigured' >&2\nexit 2\n");
        let ctx = context(json!({"script_path": path(&script)}), json!({}));

        let outcome = ScriptPlugin.execute_check(&ctx, SCRIPT_CHECK).await;

        assert_eq!(outcome.status, CheckStatus::Failed);
        let out = output(&outcome);
        assert_eq!(out["exit_code"], 2);
        assert!(out["stderr"].as_str().unwrap().contains("sshd misconfigured"));
    }

    #[tokio::test]
    async fn stdout_status_overrides_exit_code() {
        let script = write_script("echo '{\"status\": \"pending\", \"ticket\": 7}'\n");
        let ctx = context(json!({"script_path": path(&script)}), json!({}));

        let outcome = ScriptPlugin.execute_check(&ctx, SCRIPT_CHECK).await;

        assert_eq!(outcome.status, CheckStatus::Pending);
        assert_eq!(output(&outcome)["result"]["ticket"], 7);
    }

    #[tokio::test]
    async fn environment_carries_task_identity() {
        let script = write_script("echo \"$TASK_INSTANCE_ID/$CHECK_TYPE\"\n");
        let ctx = context(json!({"script_path": path(&script)}), json!({}));

        let outcome = ScriptPlugin.execute_check(&ctx, SCRIPT_CHECK).await;

        assert_eq!(output(&outcome)["stdout"].as_str().unwrap().trim(), "1/script_check");
    }

    #[tokio::test]
    async fn slow_script_times_out() {
        let script = write_script("sleep 5\n");
        let ctx = context(json!({"script_path": path(&script), "timeout_secs": 1}), json!({}));

        let outcome = ScriptPlugin.execute_check(&ctx, SCRIPT_CHECK).await;

        assert_eq!(outcome.status, CheckStatus::Failed);
        assert_matches!(outcome.error, Some(CheckError::Timeout(_)));
    }

    #[tokio::test]
    async fn missing_script_is_a_config_error() {
        let ctx = context(json!({"script_path": "/nonexistent/check.sh"}), json!({}));

        let outcome = ScriptPlugin.execute_check(&ctx, SCRIPT_CHECK).await;

        assert_eq!(outcome.status, CheckStatus::Error);
        assert_matches!(outcome.error, Some(CheckError::InvalidConfig(_)));
    }

    #[test]
    fn interpreter_is_inferred_from_extension() {
        let ctx = context(json!({"script_path": "/opt/checks/probe"}), json!({}));
        assert_eq!(Invocation::from_context(&ctx).unwrap().interpreter, Interpreter::Binary);

        let ctx = context(json!({"script_path": "/opt/checks/probe.sh", "timeout_secs": 900}), json!({}));
        let invocation = Invocation::from_context(&ctx).unwrap();
        assert_eq!(invocation.interpreter, Interpreter::Shell);
        // Capped by the 30-second context deadline before the 300-second cap.
        assert!(invocation.timeout <= Duration::from_secs(30));
    }
}
