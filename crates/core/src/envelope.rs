//! Normalized result envelope persisted for every execution attempt.
//!
//! Plugins return free-form text. Whatever they return, the stored result
//! must be a well-formed JSON object, so the text is classified into a
//! [`CheckOutput`] and wrapped in a [`ResultEnvelope`] that also carries the
//! plugin status and the overall execution status/error.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::check_status::CheckStatus;
use crate::types::JsonObject;

/// Key holding the plugin-reported [`CheckStatus`].
pub const KEY_CHECK_STATUS: &str = "check_status";

/// Key holding the overall [`ExecutionStatus`].
pub const KEY_EXECUTION_STATUS: &str = "execution_status";

/// Key holding the pipeline-level error message (`null` when none).
pub const KEY_EXECUTION_ERROR: &str = "execution_error";

/// Key holding a JSON value that was valid but not an object.
pub const KEY_OUTPUT: &str = "output";

/// Key holding the raw text of unparseable plugin output.
pub const KEY_RAW_OUTPUT: &str = "raw_output";

/// Key holding the parser error for unparseable plugin output.
pub const KEY_PARSE_ERROR: &str = "parse_error";

/// Terminal status of one execution attempt, as written back to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Plugin output after classification.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutput {
    /// Output parsed as JSON. Non-object values are stored under `output`.
    Structured(JsonObject),
    /// Output was not JSON; kept verbatim next to the parser error.
    RawText { raw: String, parse_error: String },
}

impl CheckOutput {
    /// Classify plugin output text.
    ///
    /// Blank output is treated as an empty structured object so that a
    /// plugin that reports nothing does not look like a parse failure.
    pub fn parse(text: &str) -> Self {
        if text.trim().is_empty() {
            return Self::empty();
        }
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Self::Structured(map),
            Ok(other) => {
                let mut map = Map::new();
                map.insert(KEY_OUTPUT.to_string(), other);
                Self::Structured(map)
            }
            Err(e) => Self::RawText {
                raw: text.to_string(),
                parse_error: e.to_string(),
            },
        }
    }

    /// Output used when no plugin ran.
    pub fn empty() -> Self {
        Self::Structured(Map::new())
    }

    pub fn is_raw_text(&self) -> bool {
        matches!(self, Self::RawText { .. })
    }
}

/// Everything persisted about one execution attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultEnvelope {
    pub output: CheckOutput,
    pub check_status: CheckStatus,
    pub execution_status: ExecutionStatus,
    pub execution_error: Option<String>,
}

impl ResultEnvelope {
    /// Envelope for a pipeline that stopped before any plugin ran.
    pub fn pipeline_failure(message: impl Into<String>) -> Self {
        Self {
            output: CheckOutput::empty(),
            check_status: CheckStatus::Error,
            execution_status: ExecutionStatus::Failed,
            execution_error: Some(message.into()),
        }
    }

    /// Envelope around plugin output.
    ///
    /// The execution fails when the plugin reported an error; the plugin's
    /// partial output is kept either way.
    pub fn from_plugin(check_status: CheckStatus, output: &str, error: Option<String>) -> Self {
        let execution_status = if error.is_some() {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Completed
        };
        Self {
            output: CheckOutput::parse(output),
            check_status,
            execution_status,
            execution_error: error,
        }
    }

    /// Render the envelope as the JSON object stored in the queue and the
    /// result history. Envelope keys win over plugin keys of the same name.
    pub fn to_json(&self) -> Value {
        let mut map = match &self.output {
            CheckOutput::Structured(map) => map.clone(),
            CheckOutput::RawText { raw, parse_error } => {
                let mut map = Map::new();
                map.insert(KEY_PARSE_ERROR.to_string(), Value::from(parse_error.as_str()));
                map.insert(KEY_RAW_OUTPUT.to_string(), Value::from(raw.as_str()));
                map
            }
        };
        map.insert(
            KEY_CHECK_STATUS.to_string(),
            Value::from(self.check_status.as_str()),
        );
        map.insert(
            KEY_EXECUTION_STATUS.to_string(),
            Value::from(self.execution_status.as_str()),
        );
        map.insert(
            KEY_EXECUTION_ERROR.to_string(),
            self.execution_error
                .as_deref()
                .map_or(Value::Null, Value::from),
        );
        Value::Object(map)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn structured_output_is_annotated() {
        let env = ResultEnvelope::from_plugin(
            CheckStatus::Success,
            r#"{"days_left": 42}"#,
            None,
        );
        let value = env.to_json();
        assert_eq!(value["days_left"], 42);
        assert_eq!(value[KEY_CHECK_STATUS], "success");
        assert_eq!(value[KEY_EXECUTION_STATUS], "completed");
        assert!(value[KEY_EXECUTION_ERROR].is_null());
    }

    #[test]
    fn plain_text_output_is_wrapped() {
        let env = ResultEnvelope::from_plugin(CheckStatus::Failed, "connection refused", None);
        assert!(env.output.is_raw_text());

        let value = env.to_json();
        assert!(value.is_object());
        assert_eq!(value[KEY_RAW_OUTPUT], "connection refused");
        assert!(value[KEY_PARSE_ERROR].as_str().is_some_and(|s| !s.is_empty()));
        assert_eq!(value[KEY_CHECK_STATUS], "failed");
    }

    #[test]
    fn truncated_json_falls_back_to_raw_text() {
        let output = CheckOutput::parse(r#"{"buckets": ["a", "b""#);
        assert_matches!(output, CheckOutput::RawText { ref raw, .. } if raw.starts_with("{\"buckets\""));
    }

    #[test]
    fn non_object_json_goes_under_output_key() {
        let value = ResultEnvelope::from_plugin(CheckStatus::Success, "[1, 2]", None).to_json();
        assert_eq!(value[KEY_OUTPUT], json!([1, 2]));
    }

    #[test]
    fn blank_output_is_empty_object() {
        assert_eq!(CheckOutput::parse("  \n"), CheckOutput::empty());
    }

    #[test]
    fn plugin_error_fails_execution_but_keeps_output() {
        let env = ResultEnvelope::from_plugin(
            CheckStatus::Error,
            r#"{"partial": true}"#,
            Some("Invalid parameter: port".to_string()),
        );
        let value = env.to_json();
        assert_eq!(value["partial"], true);
        assert_eq!(value[KEY_EXECUTION_STATUS], "failed");
        assert_eq!(value[KEY_EXECUTION_ERROR], "Invalid parameter: port");
    }

    #[test]
    fn pipeline_failure_has_error_status() {
        let value = ResultEnvelope::pipeline_failure("no target configured").to_json();
        assert_eq!(value[KEY_CHECK_STATUS], "error");
        assert_eq!(value[KEY_EXECUTION_STATUS], "failed");
        assert_eq!(value[KEY_EXECUTION_ERROR], "no target configured");
    }

    #[test]
    fn envelope_keys_override_plugin_keys() {
        let value = ResultEnvelope::from_plugin(
            CheckStatus::Success,
            r#"{"execution_status": "bogus"}"#,
            None,
        )
        .to_json();
        assert_eq!(value[KEY_EXECUTION_STATUS], "completed");
    }
}
