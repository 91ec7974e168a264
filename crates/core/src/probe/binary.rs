//! Runs pre-compiled probe executables directly.

use std::os::unix::fs::PermissionsExt;

use super::process;
use super::runner::{ProbeError, ProbeInput, ProbeOutput, ProbeRunner};

pub struct BinaryRunner;

impl ProbeRunner for BinaryRunner {
    async fn run(&self, path: &str, input: ProbeInput) -> Result<ProbeOutput, ProbeError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|_| ProbeError::NotFound(path.to_string()))?;

        let mode = metadata.permissions().mode();
        if mode & 0o111 == 0 {
            return Err(ProbeError::PermissionDenied(format!(
                "{path} is not executable (mode {mode:#o})"
            )));
        }

        let mut cmd = tokio::process::Command::new(path);
        process::run_command(&mut cmd, input).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
