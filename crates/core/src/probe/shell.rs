//! Runs probe scripts through `bash`.

use super::process;
use super::runner::{ProbeError, ProbeInput, ProbeOutput, ProbeRunner};

pub struct ShellRunner;

impl ProbeRunner for ShellRunner {
    async fn run(&self, path: &str, input: ProbeInput) -> Result<ProbeOutput, ProbeError> {
        if tokio::fs::metadata(path).await.is_err() {
            return Err(ProbeError::NotFound(path.to_string()));
        }
        let mut cmd = tokio::process::Command::new("bash");
        cmd.arg(path);
        process::run_command(&mut cmd, input).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
