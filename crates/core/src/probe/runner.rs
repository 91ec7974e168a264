//! Probe runner trait and its input/output types.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

/// Input handed to a probe program.
#[derive(Debug, Clone)]
pub struct ProbeInput {
    /// JSON document written to the child's stdin.
    pub payload: Value,
    /// Extra environment variables for the child.
    pub env_vars: Vec<(String, String)>,
    /// Wall-clock limit; the child is killed when it elapses.
    pub timeout: Duration,
}

/// What a probe program produced.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeOutput {
    pub stdout: String,
    pub stderr: String,
    /// `-1` if the process was killed by a signal.
    pub exit_code: i32,
    pub duration_ms: u64,
    /// Stdout parsed as JSON, if it was JSON.
    pub parsed_stdout: Option<Value>,
}

impl ProbeOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Errors raised before or while running a probe program.
///
/// A non-zero exit code is not an error; it is reported through
/// [`ProbeOutput::exit_code`].
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Probe not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Probe timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Implemented by each way of launching a probe program.
pub trait ProbeRunner: Send + Sync {
    /// Run the program at `path` with the given input.
    fn run(
        &self,
        path: &str,
        input: ProbeInput,
    ) -> impl std::future::Future<Output = Result<ProbeOutput, ProbeError>> + Send;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
