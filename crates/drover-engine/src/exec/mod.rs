//! Per-variant executors: each turns one [`TaskKind`] into a host
//! subprocess invocation and shapes the captured output.

mod process;
pub use process::{ProcessOutput, WaitOutcome};

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use drover_model::TaskKind;

use crate::error::ExecError;
use process::run_with_window;

/// What an executor produced for a finished subprocess.
#[derive(Debug)]
pub struct ExecOutput {
    pub exit_code: i32,
    /// Standard output, or the combined streams for executors that merge.
    pub output: String,
    /// Standard error (empty for combined-capture executors).
    pub error: String,
    pub metadata: HashMap<String, Value>,
}

/// Terminal outcome of one executor run.
#[derive(Debug)]
pub enum ExecOutcome {
    Finished(ExecOutput),
    Cancelled,
    TimedOut,
}

/// Capture mode per variant: `command` and `script` keep the streams
/// separate, everything else reports them as one combined text.
fn combines_output(kind: &TaskKind) -> bool {
    !matches!(kind, TaskKind::Command { .. } | TaskKind::Script { .. })
}

/// Run one task variant to completion within `window`.
pub async fn run(
    kind: &TaskKind,
    cancel: &CancellationToken,
    window: Duration,
) -> Result<ExecOutcome, ExecError> {
    let (cmd, metadata) = build_command(kind)?;

    let outcome = run_with_window(cmd, cancel, window).await?;
    Ok(match outcome {
        WaitOutcome::Cancelled => ExecOutcome::Cancelled,
        WaitOutcome::TimedOut => ExecOutcome::TimedOut,
        WaitOutcome::Exited(out) => {
            let (output, error) = if combines_output(kind) {
                (combine(out.stdout, out.stderr), String::new())
            } else {
                (out.stdout, out.stderr)
            };
            ExecOutcome::Finished(ExecOutput {
                exit_code: out.exit_code,
                output,
                error,
                metadata,
            })
        }
    })
}

fn combine(stdout: String, stderr: String) -> String {
    if stderr.is_empty() {
        stdout
    } else if stdout.is_empty() {
        stderr
    } else {
        format!("{stdout}{stderr}")
    }
}

/// Translate a task variant into the host command it runs.
fn build_command(kind: &TaskKind) -> Result<(Command, HashMap<String, Value>), ExecError> {
    let mut metadata = HashMap::new();

    let cmd = match kind {
        TaskKind::Command {
            command,
            args,
            env,
            working_dir,
        } => {
            metadata.insert("command".into(), command.clone().into());
            metadata.insert("args".into(), args.clone().into());
            let mut cmd = Command::new(command);
            cmd.args(args).envs(env);
            if let Some(dir) = working_dir {
                cmd.current_dir(dir);
            }
            cmd
        }
        TaskKind::Script {
            source,
            interpreter,
            env,
            working_dir,
        } => {
            metadata.insert("interpreter".into(), interpreter.program().into());
            let mut cmd = Command::new(interpreter.program());
            cmd.arg("-c").arg(source).envs(env);
            if let Some(dir) = working_dir {
                cmd.current_dir(dir);
            }
            cmd
        }
        TaskKind::FileOp { operation, args } => {
            metadata.insert("operation".into(), operation.clone().into());
            file_op_command(operation, args)?
        }
        TaskKind::HttpCall {
            method,
            url,
            headers,
            body,
        } => {
            metadata.insert("method".into(), method.clone().into());
            metadata.insert("url".into(), url.clone().into());
            let mut cmd = Command::new("curl");
            cmd.args(["-sS", "-X", method]);
            for (key, value) in headers {
                cmd.arg("-H").arg(format!("{key}: {value}"));
            }
            if let Some(body) = body {
                cmd.arg("-d").arg(body);
            }
            cmd.arg(url);
            cmd
        }
        TaskKind::Container { command, args } => {
            metadata.insert("operation".into(), command.clone().into());
            let mut cmd = Command::new("docker");
            cmd.arg(command).args(args);
            cmd
        }
        TaskKind::ClusterOp { command, args } => {
            metadata.insert("operation".into(), command.clone().into());
            let mut cmd = Command::new("kubectl");
            cmd.arg(command).args(args);
            cmd
        }
        TaskKind::Custom { name } => {
            return Err(ExecError::NotImplemented(name.clone()));
        }
    };

    Ok((cmd, metadata))
}

/// Map a file-op verb onto the host utility that performs it.
fn file_op_command(operation: &str, args: &[String]) -> Result<Command, ExecError> {
    let require = |n: usize, what: &str| {
        if args.len() < n {
            Err(ExecError::InvalidArguments(format!(
                "{operation} operation requires {what}"
            )))
        } else {
            Ok(())
        }
    };

    let mut cmd = match operation {
        "copy" => {
            require(2, "source and destination")?;
            let mut cmd = Command::new("cp");
            cmd.arg("-r");
            cmd
        }
        "move" => {
            require(2, "source and destination")?;
            Command::new("mv")
        }
        "delete" => {
            require(1, "a file path")?;
            let mut cmd = Command::new("rm");
            cmd.arg("-rf");
            cmd
        }
        "chmod" => {
            require(2, "a file path and mode")?;
            Command::new("chmod")
        }
        "chown" => {
            require(2, "a file path and owner")?;
            Command::new("chown")
        }
        other => {
            return Err(ExecError::InvalidArguments(format!(
                "unsupported file operation: {other}"
            )));
        }
    };
    cmd.args(args);
    Ok(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn command_kind(program: &str, args: &[&str]) -> TaskKind {
        TaskKind::Command {
            command: program.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            env: HashMap::new(),
            working_dir: None,
        }
    }

    #[tokio::test]
    async fn command_captures_separate_streams() {
        let kind = TaskKind::Script {
            source: "echo out; echo err 1>&2".into(),
            interpreter: Default::default(),
            env: HashMap::new(),
            working_dir: None,
        };
        let cancel = CancellationToken::new();
        let outcome = run(&kind, &cancel, Duration::from_secs(5)).await.unwrap();

        match outcome {
            ExecOutcome::Finished(out) => {
                assert_eq!(out.exit_code, 0);
                assert_eq!(out.output, "out\n");
                assert_eq!(out.error, "err\n");
            }
            _ => panic!("expected finished outcome"),
        }
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported() {
        let kind = command_kind("/bin/false", &[]);
        let cancel = CancellationToken::new();
        let outcome = run(&kind, &cancel, Duration::from_secs(5)).await.unwrap();

        match outcome {
            ExecOutcome::Finished(out) => assert_eq!(out.exit_code, 1),
            _ => panic!("expected finished outcome"),
        }
    }

    #[tokio::test]
    async fn window_expiry_kills_the_subprocess() {
        let kind = command_kind("/bin/sleep", &["5"]);
        let cancel = CancellationToken::new();
        let started = std::time::Instant::now();
        let outcome = run(&kind, &cancel, Duration::from_millis(200))
            .await
            .unwrap();

        assert!(matches!(outcome, ExecOutcome::TimedOut));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn cancellation_kills_the_subprocess() {
        let kind = command_kind("/bin/sleep", &["5"]);
        let cancel = CancellationToken::new();
        let handle = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            handle.cancel();
        });

        let outcome = run(&kind, &cancel, Duration::from_secs(10)).await.unwrap();
        assert!(matches!(outcome, ExecOutcome::Cancelled));
    }

    #[tokio::test]
    async fn custom_kind_is_not_implemented() {
        let kind = TaskKind::Custom { name: "plugin-x".into() };
        let cancel = CancellationToken::new();
        let err = run(&kind, &cancel, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::NotImplemented(_)));
    }

    #[test]
    fn file_op_verb_arity_is_checked() {
        assert!(file_op_command("copy", &["/only-source".into()]).is_err());
        assert!(file_op_command("shred", &[]).is_err());
        assert!(file_op_command("delete", &["/tmp/x".into()]).is_ok());
    }
}
