//! Typed access to parameter bags and target configuration.
//!
//! Form-generated parameters arrive as strings as often as numbers, so the
//! numeric readers accept both.

use std::time::Duration;

use serde_json::Value;

use crate::plugin::{CheckError, ExecutionContext};

/// A required, non-empty string from parameters or configuration.
pub fn require_str<'a>(ctx: &'a ExecutionContext, key: &str) -> Result<&'a str, CheckError> {
    optional_str(ctx, key)?.ok_or_else(|| CheckError::invalid_parameter(key, "is required"))
}

/// An optional string; present-but-empty counts as absent.
pub fn optional_str<'a>(ctx: &'a ExecutionContext, key: &str) -> Result<Option<&'a str>, CheckError> {
    match ctx.lookup(key) {
        None => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(CheckError::invalid_parameter(
            key,
            format!("expected a string, got {other}"),
        )),
    }
}

/// An optional non-negative integer.
pub fn optional_u64(ctx: &ExecutionContext, key: &str) -> Result<Option<u64>, CheckError> {
    let Some(value) = ctx.lookup(key) else {
        return Ok(None);
    };
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.map(Some).ok_or_else(|| {
        CheckError::invalid_parameter(
            key,
            format!("expected a non-negative integer, got {value}"),
        )
    })
}

/// A required TCP/UDP port.
pub fn require_port(ctx: &ExecutionContext, key: &str) -> Result<u16, CheckError> {
    let raw = optional_u64(ctx, key)?.ok_or_else(|| CheckError::invalid_parameter(key, "is required"))?;
    match u16::try_from(raw) {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(CheckError::invalid_parameter(key, format!("{raw} is not a valid port"))),
    }
}

/// An optional `timeout_secs`-style parameter, clamped to `max`.
///
/// Zero is rejected rather than treated as an instant timeout.
pub fn optional_timeout(
    ctx: &ExecutionContext,
    key: &str,
    default: Duration,
    max: Duration,
) -> Result<Duration, CheckError> {
    match optional_u64(ctx, key)? {
        None => Ok(default.min(max)),
        Some(0) => Err(CheckError::invalid_parameter(key, "must be at least 1 second")),
        Some(secs) => Ok(Duration::from_secs(secs).min(max)),
    }
}

/// Keep at most `max_chars` characters, marking the cut.
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...(truncated)", &text[..idx]),
        None => text.to_string(),
    }
}
