use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use drover_model::{TaskKind, TaskResult, TaskStatus};

use crate::exec::{self, ExecOutcome};
use crate::registry::TaskRegistry;

/// A task as handed to the worker pool.
pub(crate) struct QueuedTask {
    pub id: String,
    pub kind: TaskKind,
    pub cancel: CancellationToken,
    pub deadline: Instant,
}

/// One member of the worker pool: pulls a task at a time off the shared
/// queue and drives it to a terminal result.
pub(crate) struct Worker {
    pub id: usize,
    pub queue: Arc<Mutex<mpsc::Receiver<QueuedTask>>>,
    pub results: mpsc::Sender<TaskResult>,
    pub registry: TaskRegistry,
    pub shutdown: CancellationToken,
}

impl Worker {
    pub(crate) async fn run(self) {
        info!(worker_id = self.id, "worker started");

        loop {
            let next = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                next = async { self.queue.lock().await.recv().await } => next,
            };

            match next {
                Some(task) => self.run_one(task).await,
                None => break,
            }
        }

        info!(worker_id = self.id, "worker stopped");
    }

    async fn run_one(&self, task: QueuedTask) {
        let started_at = SystemTime::now();

        // Cancelled while still queued: emit the terminal record without
        // touching the host.
        if task.cancel.is_cancelled() {
            self.emit(TaskResult::synthesized(
                &task.id,
                TaskStatus::Cancelled,
                "task cancelled",
                started_at,
            ))
            .await;
            return;
        }

        if let Err(status) = self.registry.mark_running(&task.id) {
            match status {
                Some(status) => {
                    debug!(task_id = %task.id, %status, "task no longer eligible to run");
                    self.emit(TaskResult::synthesized(
                        &task.id,
                        TaskStatus::Cancelled,
                        "task cancelled",
                        started_at,
                    ))
                    .await;
                }
                None => warn!(task_id = %task.id, "dequeued task missing from registry"),
            }
            return;
        }

        debug!(
            worker_id = self.id,
            task_id = %task.id,
            task_kind = task.kind.kind(),
            "executing task"
        );

        let window = task.deadline.saturating_duration_since(Instant::now());
        let result = if window.is_zero() {
            TaskResult::synthesized(
                &task.id,
                TaskStatus::Timeout,
                "task execution timeout",
                started_at,
            )
        } else {
            match exec::run(&task.kind, &task.cancel, window).await {
                Ok(outcome) => build_result(&task, outcome, started_at),
                Err(err) => {
                    warn!(task_id = %task.id, error = %err, "task execution failed");
                    TaskResult::synthesized(&task.id, TaskStatus::Failed, err.to_string(), started_at)
                }
            }
        };

        debug!(
            worker_id = self.id,
            task_id = %task.id,
            status = %result.status,
            duration_ms = result.duration_ms,
            "task finished"
        );
        self.emit(result).await;
    }

    async fn emit(&self, result: TaskResult) {
        if self.results.send(result).await.is_err() {
            error!(worker_id = self.id, "result channel closed; dropping task result");
        }
    }
}

fn build_result(task: &QueuedTask, outcome: ExecOutcome, started_at: SystemTime) -> TaskResult {
    match outcome {
        ExecOutcome::Cancelled => TaskResult::synthesized(
            &task.id,
            TaskStatus::Cancelled,
            "task cancelled",
            started_at,
        ),
        ExecOutcome::TimedOut => TaskResult::synthesized(
            &task.id,
            TaskStatus::Timeout,
            "task execution timeout",
            started_at,
        ),
        ExecOutcome::Finished(out) => {
            let finished_at = SystemTime::now();
            let duration_ms = finished_at
                .duration_since(started_at)
                .unwrap_or_default()
                .as_millis() as u64;

            let (status, error) = if out.exit_code == 0 {
                (TaskStatus::Completed, out.error)
            } else if !out.error.is_empty() {
                (TaskStatus::Failed, out.error)
            } else {
                (
                    TaskStatus::Failed,
                    format!("exit code {}", out.exit_code),
                )
            };

            let mut metadata: HashMap<String, serde_json::Value> = out.metadata;
            metadata.insert("task_kind".into(), task.kind.kind().into());

            TaskResult {
                task_id: task.id.clone(),
                status,
                exit_code: out.exit_code,
                output: out.output,
                error,
                started_at,
                finished_at,
                duration_ms,
                metadata,
            }
        }
    }
}
