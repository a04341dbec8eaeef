// ABOUTME: Process-backed ActionExecutor built on tokio::process.
// ABOUTME: Captures bounded stdout/stderr and kills the child on timeout or cancellation.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

use super::{ActionError, ActionExecutor, ActionResult, RenderedAction};

/// Default per-stream capture cap (64 KiB).
pub const DEFAULT_OUTPUT_CAP: usize = 64 * 1024;

/// Runs actions as local child processes.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    output_cap: usize,
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_CAP)
    }
}

impl ProcessExecutor {
    /// Create an executor keeping at most `output_cap` bytes per stream.
    pub fn new(output_cap: usize) -> Self {
        Self { output_cap }
    }

    pub fn output_cap(&self) -> usize {
        self.output_cap
    }
}

#[async_trait]
impl ActionExecutor for ProcessExecutor {
    async fn execute(
        &self,
        action: &RenderedAction,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ActionResult, ActionError> {
        let program = action.program.clone();

        if cancel.is_cancelled() {
            return Err(ActionError::Cancelled { program });
        }

        let mut command = Command::new(&action.program);
        command
            .args(&action.args)
            .envs(&action.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = action.working_dir {
            command.current_dir(dir);
        }

        tracing::debug!(command = %action.display(), timeout = ?timeout, "spawning action");

        let started = Instant::now();
        let mut child = command.spawn().map_err(|source| ActionError::Launch {
            program: program.clone(),
            source,
        })?;

        let cap = self.output_cap;
        let stdout = child.stdout.take().map(|s| tokio::spawn(read_capped(s, cap)));
        let stderr = child.stderr.take().map(|s| tokio::spawn(read_capped(s, cap)));
        let captures: Vec<AbortHandle> = stdout
            .iter()
            .chain(stderr.iter())
            .map(|task| task.abort_handle())
            .collect();

        // The deadline covers output capture too: a descendant that inherited
        // the pipes can hold them open after the child itself has exited.
        let finished = async {
            let status = child.wait().await.map_err(|source| ActionError::Capture {
                program: program.clone(),
                source,
            })?;
            let stdout = join_capture(stdout, &program).await?;
            let stderr = join_capture(stderr, &program).await?;
            Ok::<_, ActionError>((status, stdout, stderr))
        };

        let (status, (stdout, out_truncated), (stderr, err_truncated)) = tokio::select! {
            finished = finished => finished?,
            _ = tokio::time::sleep(timeout) => {
                abort_captures(&captures);
                kill_running(&mut child, &program, "timed out").await;
                return Err(ActionError::Timeout { program, after: timeout });
            }
            _ = cancel.cancelled() => {
                abort_captures(&captures);
                kill_running(&mut child, &program, "cancelled").await;
                return Err(ActionError::Cancelled { program });
            }
        };

        let result = ActionResult {
            exit_code: status.code(),
            stdout,
            stderr,
            duration: started.elapsed(),
            truncated: out_truncated || err_truncated,
        };

        tracing::debug!(
            command = %action.display(),
            exit_code = ?result.exit_code,
            elapsed = ?result.duration,
            "action finished"
        );

        Ok(result)
    }
}

/// Kill the child unless it has already been reaped.
async fn kill_running(child: &mut Child, program: &str, reason: &str) {
    if child.id().is_none() {
        return;
    }
    if let Err(e) = child.kill().await {
        tracing::warn!("Failed to kill {} '{}': {}", reason, program, e);
    }
}

fn abort_captures(captures: &[AbortHandle]) {
    for capture in captures {
        capture.abort();
    }
}

type CaptureTask = tokio::task::JoinHandle<std::io::Result<(Vec<u8>, bool)>>;

async fn join_capture(
    task: Option<CaptureTask>,
    program: &str,
) -> Result<(String, bool), ActionError> {
    let Some(task) = task else {
        return Ok((String::new(), false));
    };
    let (bytes, truncated) = task
        .await
        .map_err(|e| ActionError::Capture {
            program: program.to_string(),
            source: std::io::Error::other(e),
        })?
        .map_err(|source| ActionError::Capture {
            program: program.to_string(),
            source,
        })?;
    Ok((String::from_utf8_lossy(&bytes).into_owned(), truncated))
}

/// Read a stream to EOF, keeping at most `cap` bytes. The remainder is
/// drained so the child never blocks on a full pipe.
async fn read_capped<R>(mut reader: R, cap: usize) -> std::io::Result<(Vec<u8>, bool)>
where
    R: AsyncRead + Unpin,
{
    let mut kept = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let room = cap.saturating_sub(kept.len());
        if room >= n {
            kept.extend_from_slice(&chunk[..n]);
        } else {
            kept.extend_from_slice(&chunk[..room]);
            truncated = true;
        }
    }

    Ok((kept, truncated))
}
