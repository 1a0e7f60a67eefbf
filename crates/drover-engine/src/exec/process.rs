use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::ExecError;

/// Captured streams and exit status of a finished subprocess.
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// How a subprocess run ended.
pub enum WaitOutcome {
    Exited(ProcessOutput),
    Cancelled,
    TimedOut,
}

/// Spawn `cmd` and wait for it within `window`, killing the child when the
/// cancellation handle fires or the window closes.
pub async fn run_with_window(
    mut cmd: Command,
    cancel: &CancellationToken,
    window: Duration,
) -> Result<WaitOutcome, ExecError> {
    let program = format!("{:?}", cmd.as_std().get_program());
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    trace!(%program, "spawning subprocess");
    let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
        program,
        source,
    })?;

    // Drain both pipes concurrently so a chatty child can't fill one and
    // deadlock against our wait.
    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();
    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(pipe) = stdout_pipe.as_mut() {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(pipe) = stderr_pipe.as_mut() {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    });

    tokio::select! {
        status = child.wait() => {
            let status = status?;
            let stdout = stdout_task.await.unwrap_or_default();
            let stderr = stderr_task.await.unwrap_or_default();
            Ok(WaitOutcome::Exited(ProcessOutput {
                exit_code: status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            }))
        }
        _ = cancel.cancelled() => {
            trace!("cancellation observed; killing subprocess");
            kill_graceful(&mut child).await;
            Ok(WaitOutcome::Cancelled)
        }
        _ = tokio::time::sleep(window) => {
            trace!("execution window closed; killing subprocess");
            kill_graceful(&mut child).await;
            Ok(WaitOutcome::TimedOut)
        }
    }
}

#[cfg(target_family = "unix")]
async fn kill_graceful(child: &mut Child) {
    #[cfg(target_os = "linux")]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        if let Some(id) = child.id() {
            let _ = kill(Pid::from_raw(id as i32), Signal::SIGTERM);
        }
    }
    let _ = child.kill().await;
}

#[cfg(target_family = "windows")]
async fn kill_graceful(child: &mut Child) {
    let _ = child.kill().await;
}
