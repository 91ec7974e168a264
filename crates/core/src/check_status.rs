//! Status vocabulary shared by every check plugin.
//!
//! The string forms are what lands in `campaign_task_instances.last_check_status`
//! and `task_results.status`, so they must stay stable.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Outcome of a single check as reported by a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    /// The target meets the expectation.
    Success,
    /// The check ran and the target does not meet the expectation, or the
    /// target was unreachable as a meaningful negative result.
    Failed,
    /// The check could not be evaluated (bad configuration, parse failure).
    Error,
    /// Remote work was triggered and has not finished yet.
    Pending,
    /// Remote work triggered by the check has finished.
    Completed,
}

impl CheckStatus {
    /// Stable lowercase name used in storage and JSON output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Error => "error",
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "error" => Ok(Self::Error),
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            other => Err(CoreError::Validation(format!(
                "Unknown check status: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_stored_name() {
        for status in [
            CheckStatus::Success,
            CheckStatus::Failed,
            CheckStatus::Error,
            CheckStatus::Pending,
            CheckStatus::Completed,
        ] {
            assert_eq!(status.as_str().parse::<CheckStatus>().unwrap(), status);
        }
    }

    #[test]
    fn rejects_unknown_name() {
        let err = "Success".parse::<CheckStatus>().unwrap_err();
        assert_eq!(err.to_string(), "Validation failed: Unknown check status: Success");
    }

    #[test]
    fn serde_uses_lowercase() {
        let json = serde_json::to_value(CheckStatus::Failed).unwrap();
        assert_eq!(json, "failed");
    }
}
