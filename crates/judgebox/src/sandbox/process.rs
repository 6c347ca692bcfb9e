//! Process spawning and I/O for the container engine
//!
//! Runs one engine command, feeds its stdin, drains stdout/stderr
//! concurrently and enforces a wall-clock deadline.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::sandbox::SandboxError;

/// Captured result of one engine command
#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Exit status of the command; None if it was killed at the deadline
    pub exit_code: Option<i32>,
    /// Wall clock time from spawn to exit (or to the deadline)
    pub wall_time: Duration,
    /// Whether the deadline elapsed before the command exited
    pub timed_out: bool,
}

impl StepOutput {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Read a stream to its end, keeping at most `limit` bytes
async fn drain<R>(reader: Option<R>, limit: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok(Vec::new());
    };

    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        // Keep draining past the cap so the writer never blocks on a full pipe
        let room = limit.saturating_sub(buf.len());
        buf.extend_from_slice(&chunk[..n.min(room)]);
    }
    Ok(buf)
}

/// Run an engine command with an optional stdin payload and a deadline
///
/// On deadline the engine client is killed and whatever output was
/// captured so far is returned with `timed_out` set. Stopping the work
/// inside the container is the caller's job.
#[instrument(skip(args, stdin), fields(program = args.first().map(String::as_str)))]
pub async fn run_step(
    args: Vec<String>,
    stdin: Option<Vec<u8>>,
    deadline: Duration,
    max_output: usize,
) -> Result<StepOutput, SandboxError> {
    let program = args
        .first()
        .ok_or_else(|| SandboxError::CommandFailed("empty command arguments".to_string()))?;

    let mut child = Command::new(program)
        .args(&args[1..])
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(SandboxError::SpawnFailed)?;

    let start = Instant::now();

    let stdout_task = tokio::spawn(drain(child.stdout.take(), max_output));
    let stderr_task = tokio::spawn(drain(child.stderr.take(), max_output));

    if let (Some(data), Some(mut pipe)) = (stdin, child.stdin.take()) {
        tokio::spawn(async move {
            // A program that exits without reading its input closes the pipe early
            if let Err(e) = pipe.write_all(&data).await
                && e.kind() != std::io::ErrorKind::BrokenPipe
            {
                warn!(error = %e, "failed to write stdin payload");
            }
            let _ = pipe.shutdown().await;
        });
    }

    let (exit_code, timed_out) = match tokio::time::timeout(deadline, child.wait()).await {
        Ok(status) => (status?.code(), false),
        Err(_) => {
            debug!(?deadline, "deadline elapsed, killing engine client");
            let _ = child.start_kill();
            let _ = child.wait().await;
            (None, true)
        }
    };
    let wall_time = start.elapsed();

    let stdout = stdout_task
        .await
        .map_err(|e| SandboxError::CommandFailed(e.to_string()))??;
    let stderr = stderr_task
        .await
        .map_err(|e| SandboxError::CommandFailed(e.to_string()))??;

    debug!(
        ?exit_code,
        timed_out,
        wall_ms = wall_time.as_millis() as u64,
        stdout_len = stdout.len(),
        stderr_len = stderr.len(),
        "step complete"
    );

    Ok(StepOutput {
        stdout,
        stderr,
        exit_code,
        wall_time,
        timed_out,
    })
}
