use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use drover_model::{TaskKind, TaskRecord, TaskResult, TaskSpec, TaskStatus};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::registry::{EngineStats, TaskRegistry};
use crate::worker::{QueuedTask, Worker};

/// The execution engine: admission queue, worker pool, task registry.
///
/// All public operations take `&self`; internal state is behind the
/// registry lock and the channel endpoints, so the engine is shared as an
/// `Arc<Engine>` between the supervisor and the admin surface.
pub struct Engine {
    config: EngineConfig,
    registry: TaskRegistry,
    queue_tx: mpsc::Sender<QueuedTask>,
    queue_rx: Arc<Mutex<mpsc::Receiver<QueuedTask>>>,
    /// Dropped on stop so the result handler drains and exits.
    result_tx: std::sync::Mutex<Option<mpsc::Sender<TaskResult>>>,
    result_rx: std::sync::Mutex<Option<mpsc::Receiver<TaskResult>>>,
    shutdown: CancellationToken,
    running: AtomicBool,
    worker_handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
    result_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_size);
        let (result_tx, result_rx) = mpsc::channel(config.queue_size);
        Self {
            config,
            registry: TaskRegistry::new(),
            queue_tx,
            queue_rx: Arc::new(Mutex::new(queue_rx)),
            result_tx: std::sync::Mutex::new(Some(result_tx)),
            result_rx: std::sync::Mutex::new(Some(result_rx)),
            shutdown: CancellationToken::new(),
            running: AtomicBool::new(false),
            worker_handles: std::sync::Mutex::new(Vec::new()),
            result_handle: std::sync::Mutex::new(None),
        }
    }

    /// Spawn the worker pool and the result handler.
    pub fn start(&self) -> Result<(), EngineError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(EngineError::AlreadyRunning);
        }
        let Some(mut result_rx) = self.result_rx.lock().unwrap().take() else {
            // A stopped engine cannot be restarted; channels are gone.
            self.running.store(false, Ordering::SeqCst);
            return Err(EngineError::Stopped);
        };
        let result_tx = match self.result_tx.lock().unwrap().clone() {
            Some(result_tx) => result_tx,
            None => {
                self.running.store(false, Ordering::SeqCst);
                return Err(EngineError::Stopped);
            }
        };

        let mut workers = self.worker_handles.lock().unwrap();
        for id in 0..self.config.worker_pool_size {
            let worker = Worker {
                id,
                queue: Arc::clone(&self.queue_rx),
                results: result_tx.clone(),
                registry: self.registry.clone(),
                shutdown: self.shutdown.clone(),
            };
            workers.push(tokio::spawn(worker.run()));
        }
        drop(result_tx);

        let registry = self.registry.clone();
        *self.result_handle.lock().unwrap() = Some(tokio::spawn(async move {
            // Runs until every sender is gone, so results emitted during
            // shutdown are still applied.
            while let Some(result) = result_rx.recv().await {
                registry.apply_result(result);
            }
        }));

        info!(workers = self.config.worker_pool_size, "task engine started");
        Ok(())
    }

    /// Cancel active tasks, stop workers, and wait for everything spawned
    /// at start to exit. Idempotent: stopping a stopped engine is a no-op.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("stopping task engine");

        self.registry.cancel_active();
        self.shutdown.cancel();

        let workers: Vec<JoinHandle<()>> =
            std::mem::take(&mut *self.worker_handles.lock().unwrap());
        for handle in workers {
            if let Err(err) = handle.await {
                warn!(error = %err, "worker join failed");
            }
        }

        // All workers are gone; dropping the last sender lets the result
        // handler drain the channel and exit.
        self.result_tx.lock().unwrap().take();
        let handler = self.result_handle.lock().unwrap().take();
        if let Some(handle) = handler {
            if let Err(err) = handle.await {
                warn!(error = %err, "result handler join failed");
            }
        }

        info!("task engine stopped");
    }

    /// Admit a task for asynchronous execution and return its id.
    pub async fn submit(&self, spec: TaskSpec) -> Result<String, EngineError> {
        let (id, _, _) = self.admit(spec, None).await?;
        Ok(id)
    }

    /// Admit a task and block until its result is available, the caller's
    /// context is cancelled, or the task deadline expires (in which case a
    /// synthesized `timeout` result is returned).
    pub async fn execute(
        &self,
        ctx: &CancellationToken,
        spec: TaskSpec,
    ) -> Result<TaskResult, EngineError> {
        let (waiter_tx, waiter_rx) = oneshot::channel();
        let (id, deadline, queued_at) = self.admit(spec, Some(waiter_tx)).await?;

        tokio::select! {
            result = waiter_rx => match result {
                Ok(result) => Ok(result),
                // The engine shut down before the result was delivered.
                Err(_) => Err(EngineError::Stopped),
            },
            _ = ctx.cancelled() => Err(EngineError::WaitCancelled(id)),
            _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {
                Ok(TaskResult::synthesized(
                    id,
                    TaskStatus::Timeout,
                    "task execution timeout",
                    queued_at,
                ))
            }
        }
    }

    async fn admit(
        &self,
        spec: TaskSpec,
        waiter: Option<oneshot::Sender<TaskResult>>,
    ) -> Result<(String, Instant, SystemTime), EngineError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(EngineError::Stopped);
        }
        validate(&spec)?;

        let id = spec
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let timeout = spec.timeout.unwrap_or(self.config.task_timeout);
        let deadline = Instant::now() + timeout;
        let queued_at = SystemTime::now();
        let cancel = self.shutdown.child_token();

        let record = TaskRecord {
            id: id.clone(),
            name: spec.name,
            kind: spec.kind.clone(),
            status: TaskStatus::Queued,
            priority: spec.priority,
            metadata: spec.metadata,
            queued_at,
            started_at: None,
            finished_at: None,
            error: None,
        };

        self.registry.insert(record, cancel.clone())?;
        if let Some(waiter) = waiter {
            self.registry.attach_waiter(&id, waiter);
        }

        info!(task_id = %id, task_kind = spec.kind.kind(), "task queued for execution");

        let queued = QueuedTask {
            id: id.clone(),
            kind: spec.kind,
            cancel,
            deadline,
        };
        match self
            .queue_tx
            .send_timeout(queued, self.config.admission_wait)
            .await
        {
            Ok(()) => Ok((id, deadline, queued_at)),
            Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
                // Queue stayed full past the admission wait: unwind the
                // registration so the task leaves no trace.
                self.registry.remove(&id);
                Err(EngineError::QueueFull)
            }
            Err(mpsc::error::SendTimeoutError::Closed(_)) => {
                self.registry.remove(&id);
                Err(EngineError::Stopped)
            }
        }
    }

    /// Fetch the current record for a task.
    pub fn get(&self, task_id: &str) -> Result<TaskRecord, EngineError> {
        self.registry
            .get(task_id)
            .ok_or_else(|| EngineError::NotFound(task_id.to_string()))
    }

    /// Fetch the terminal result for a task, when one exists yet.
    pub fn get_result(&self, task_id: &str) -> Result<Option<TaskResult>, EngineError> {
        if self.registry.get(task_id).is_none() {
            return Err(EngineError::NotFound(task_id.to_string()));
        }
        Ok(self.registry.get_result(task_id))
    }

    /// Cancel a queued or running task.
    pub fn cancel(&self, task_id: &str) -> Result<(), EngineError> {
        self.registry.request_cancel(task_id)?;
        info!(task_id = %task_id, "task cancelled");
        Ok(())
    }

    pub fn list(&self) -> Vec<TaskRecord> {
        self.registry.list()
    }

    pub fn list_running(&self) -> Vec<TaskRecord> {
        self.registry.list_running()
    }

    pub fn stats(&self) -> EngineStats {
        let (total, running, completed) = self.registry.counts();
        EngineStats {
            total,
            running,
            completed,
            queue_depth: self.config.queue_size - self.queue_tx.capacity(),
            worker_count: self.config.worker_pool_size,
        }
    }

    /// Drop terminal records that finished before `cutoff`.
    pub fn prune(&self, cutoff: SystemTime) -> usize {
        let dropped = self.registry.prune(cutoff);
        if dropped > 0 {
            info!(dropped, "pruned terminal tasks");
        }
        dropped
    }
}

fn validate(spec: &TaskSpec) -> Result<(), EngineError> {
    match &spec.kind {
        TaskKind::Command { command, .. } if command.is_empty() => Err(EngineError::Validation(
            "command is required for command tasks".into(),
        )),
        TaskKind::Script { source, .. } if source.is_empty() => Err(EngineError::Validation(
            "source is required for script tasks".into(),
        )),
        _ => Ok(()),
    }
}
