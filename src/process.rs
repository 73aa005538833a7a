//! Child-process execution with captured output and a wall-clock limit.
//!
//! The handler builds a [`tokio::process::Command`] for the runner and hands
//! it to [`run_with_timeout`], which owns spawning, stream capture and
//! killing the child when the limit is hit.
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::error::{AppError, AppResult};

/// Per-stream capture limit (10 MiB).
const MAX_OUTPUT_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `-1` when the process was terminated by a signal.
    pub exit_code: i32,
    pub duration: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout followed by stderr, the way the job log is reported.
    pub fn combined_log(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }
}

pub async fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> AppResult<ProcessOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let mut child = cmd.spawn()?;

    // Drain both pipes off-task so a chatty child never blocks on a full pipe
    // while we wait on it.
    let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
    let stderr_task = tokio::spawn(read_stream(child.stderr.take()));

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => {
            let stdout = stdout_task.await.unwrap_or_default();
            let stderr = stderr_task.await.unwrap_or_default();
            Ok(ProcessOutput {
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
                exit_code: status.code().unwrap_or(-1),
                duration: start.elapsed(),
            })
        }
        Ok(Err(e)) => Err(AppError::Io(e)),
        Err(_elapsed) => {
            // `child` drops here and kill_on_drop reaps it.
            stdout_task.abort();
            stderr_task.abort();
            tracing::warn!("runner exceeded {:?}, killing it", timeout);
            Err(AppError::Timeout(timeout))
        }
    }
}

async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(h) = handle {
        let _ = h.take(MAX_OUTPUT_BYTES).read_to_end(&mut buf).await;
    }
    buf
}
