//! Child-process plumbing shared by the shell and binary runners.

use std::process::Stdio;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use super::runner::{ProbeError, ProbeInput, ProbeOutput};

/// Cap on captured bytes per stream (1 MiB). Probe output ends up in a
/// JSONB column, so anything past this is dropped.
const MAX_CAPTURE_BYTES: u64 = 1024 * 1024;

/// Spawn `cmd`, write the JSON payload to stdin, capture stdout/stderr and
/// enforce the input timeout.
///
/// The caller sets program and arguments; environment variables come from
/// [`ProbeInput`].
pub async fn run_command(cmd: &mut Command, input: ProbeInput) -> Result<ProbeOutput, ProbeError> {
    // The child is killed if the timeout drops it.
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    for (key, value) in &input.env_vars {
        cmd.env(key, value);
    }

    let start = Instant::now();
    let mut child = cmd.spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        let bytes = serde_json::to_vec(&input.payload).unwrap_or_default();
        // The probe may exit without reading stdin.
        let _ = stdin.write_all(&bytes).await;
        drop(stdin);
    }

    let stdout_task = tokio::spawn(read_capped(child.stdout.take()));
    let stderr_task = tokio::spawn(read_capped(child.stderr.take()));

    match tokio::time::timeout(input.timeout, child.wait()).await {
        Ok(Ok(status)) => {
            let duration_ms = start.elapsed().as_millis() as u64;
            let stdout = String::from_utf8_lossy(&stdout_task.await.unwrap_or_default()).into_owned();
            let stderr = String::from_utf8_lossy(&stderr_task.await.unwrap_or_default()).into_owned();
            let parsed_stdout = serde_json::from_str(stdout.trim()).ok();

            Ok(ProbeOutput {
                stdout,
                stderr,
                exit_code: status.code().unwrap_or(-1),
                duration_ms,
                parsed_stdout,
            })
        }
        Ok(Err(e)) => Err(ProbeError::Io(e)),
        Err(_elapsed) => Err(ProbeError::Timeout {
            elapsed_ms: start.elapsed().as_millis() as u64,
        }),
    }
}

async fn read_capped<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(h) = handle {
        let _ = h.take(MAX_CAPTURE_BYTES).read_to_end(&mut buf).await;
    }
    buf
}
