use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use drover_model::{TaskRecord, TaskResult, TaskStatus};

use crate::error::EngineError;

/// Engine statistics snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStats {
    pub total: usize,
    pub running: usize,
    pub completed: usize,
    pub queue_depth: usize,
    pub worker_count: usize,
}

/// Live registry entry: the public record plus the execution-side handles.
struct LiveTask {
    record: TaskRecord,
    cancel: CancellationToken,
    waiter: Option<oneshot::Sender<TaskResult>>,
    result: Option<TaskResult>,
}

struct RegistryInner {
    tasks: HashMap<String, LiveTask>,
    running: HashSet<String>,
    completed: HashSet<String>,
}

/// Task registry guarded by a single reader-writer lock.
///
/// Reads (status queries) are frequent; writes happen on admission and on
/// terminal transition.
#[derive(Clone)]
pub(crate) struct TaskRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl TaskRegistry {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryInner {
                tasks: HashMap::new(),
                running: HashSet::new(),
                completed: HashSet::new(),
            })),
        }
    }

    /// Register an admitted task. Fails when the id is already taken.
    pub(crate) fn insert(
        &self,
        record: TaskRecord,
        cancel: CancellationToken,
    ) -> Result<(), EngineError> {
        let mut inner = self.inner.write().unwrap();
        if inner.tasks.contains_key(&record.id) {
            return Err(EngineError::Validation(format!(
                "duplicate task id: {}",
                record.id
            )));
        }
        inner.tasks.insert(
            record.id.clone(),
            LiveTask {
                record,
                cancel,
                waiter: None,
                result: None,
            },
        );
        Ok(())
    }

    /// Unwind a registration whose queueing failed.
    pub(crate) fn remove(&self, id: &str) {
        let mut inner = self.inner.write().unwrap();
        inner.tasks.remove(id);
        inner.running.remove(id);
        inner.completed.remove(id);
    }

    /// Attach the synchronous waiter used by `execute`.
    pub(crate) fn attach_waiter(&self, id: &str, waiter: oneshot::Sender<TaskResult>) {
        let mut inner = self.inner.write().unwrap();
        if let Some(live) = inner.tasks.get_mut(id) {
            live.waiter = Some(waiter);
        }
    }

    /// Transition `queued -> running`. Returns the current status when the
    /// task is no longer eligible (cancelled before dequeue, unknown id).
    pub(crate) fn mark_running(&self, id: &str) -> Result<(), Option<TaskStatus>> {
        let mut inner = self.inner.write().unwrap();
        let Some(live) = inner.tasks.get_mut(id) else {
            return Err(None);
        };
        if live.record.status != TaskStatus::Queued {
            return Err(Some(live.record.status));
        }
        live.record.status = TaskStatus::Running;
        live.record.started_at = Some(SystemTime::now());
        inner.running.insert(id.to_string());
        Ok(())
    }

    /// Flip an active task to `cancelled` and fire its handle.
    pub(crate) fn request_cancel(&self, id: &str) -> Result<(), EngineError> {
        let cancel = {
            let mut inner = self.inner.write().unwrap();
            let Some(live) = inner.tasks.get_mut(id) else {
                return Err(EngineError::NotFound(id.to_string()));
            };
            if live.record.status.is_terminal() {
                return Err(EngineError::InvalidState {
                    id: id.to_string(),
                    status: live.record.status,
                });
            }
            live.record.status = TaskStatus::Cancelled;
            live.cancel.clone()
        };
        cancel.cancel();
        Ok(())
    }

    /// Apply the terminal result emitted by a worker.
    ///
    /// Status transitions stay monotonic: a task already terminal (explicit
    /// cancel raced the worker) keeps its status, but the result is still
    /// recorded and the task moves to the completed set. Results for unknown
    /// ids are logged and dropped.
    pub(crate) fn apply_result(&self, result: TaskResult) {
        let (waiter, cancel) = {
            let mut inner = self.inner.write().unwrap();
            let Some(live) = inner.tasks.get_mut(&result.task_id) else {
                warn!(task_id = %result.task_id, "received result for unknown task");
                return;
            };

            if !live.record.status.is_terminal() {
                live.record.status = result.status;
            }
            if live.record.started_at.is_none() {
                live.record.started_at = Some(result.started_at);
            }
            live.record.finished_at = Some(result.finished_at);
            if !result.error.is_empty() {
                live.record.error = Some(result.error.clone());
            }

            let waiter = live.waiter.take();
            let cancel = live.cancel.clone();
            live.result = Some(result.clone());

            let id = result.task_id.clone();
            inner.running.remove(&id);
            inner.completed.insert(id);
            (waiter, cancel)
        };

        if let Some(waiter) = waiter {
            // The receiver may be gone (execute caller bailed out); fine.
            let _ = waiter.send(result);
        }
        // Release the task's timeout/cancel resources.
        cancel.cancel();
    }

    pub(crate) fn get(&self, id: &str) -> Option<TaskRecord> {
        let inner = self.inner.read().unwrap();
        inner.tasks.get(id).map(|live| live.record.clone())
    }

    pub(crate) fn get_result(&self, id: &str) -> Option<TaskResult> {
        let inner = self.inner.read().unwrap();
        inner.tasks.get(id).and_then(|live| live.result.clone())
    }

    pub(crate) fn list(&self) -> Vec<TaskRecord> {
        let inner = self.inner.read().unwrap();
        inner.tasks.values().map(|live| live.record.clone()).collect()
    }

    pub(crate) fn list_running(&self) -> Vec<TaskRecord> {
        let inner = self.inner.read().unwrap();
        inner
            .running
            .iter()
            .filter_map(|id| inner.tasks.get(id))
            .filter(|live| live.record.status == TaskStatus::Running)
            .map(|live| live.record.clone())
            .collect()
    }

    pub(crate) fn counts(&self) -> (usize, usize, usize) {
        let inner = self.inner.read().unwrap();
        (inner.tasks.len(), inner.running.len(), inner.completed.len())
    }

    /// Fire the cancellation handle of every non-terminal task.
    pub(crate) fn cancel_active(&self) {
        let handles: Vec<CancellationToken> = {
            let inner = self.inner.read().unwrap();
            inner
                .tasks
                .values()
                .filter(|live| !live.record.status.is_terminal())
                .map(|live| live.cancel.clone())
                .collect()
        };
        for handle in handles {
            handle.cancel();
        }
    }

    /// Drop terminal records that finished before `cutoff`.
    pub(crate) fn prune(&self, cutoff: SystemTime) -> usize {
        let mut inner = self.inner.write().unwrap();
        let stale: Vec<String> = inner
            .tasks
            .iter()
            .filter(|(_, live)| {
                live.record.status.is_terminal()
                    && live.record.finished_at.is_some_and(|at| at < cutoff)
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            inner.tasks.remove(id);
            inner.completed.remove(id);
        }
        stale.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drover_model::TaskKind;
    use std::collections::HashMap;
    use std::time::Duration;

    fn record(id: &str) -> TaskRecord {
        TaskRecord {
            id: id.to_string(),
            name: String::new(),
            kind: TaskKind::Custom { name: "noop".into() },
            status: TaskStatus::Queued,
            priority: 0,
            metadata: HashMap::new(),
            queued_at: SystemTime::now(),
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    fn insert(registry: &TaskRegistry, id: &str) -> CancellationToken {
        let cancel = CancellationToken::new();
        registry.insert(record(id), cancel.clone()).unwrap();
        cancel
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let registry = TaskRegistry::new();
        insert(&registry, "t-1");
        let err = registry
            .insert(record("t-1"), CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn mark_running_only_from_queued() {
        let registry = TaskRegistry::new();
        insert(&registry, "t-1");

        registry.mark_running("t-1").unwrap();
        assert_eq!(registry.get("t-1").unwrap().status, TaskStatus::Running);

        // Second attempt observes the non-queued status.
        assert_eq!(
            registry.mark_running("t-1"),
            Err(Some(TaskStatus::Running))
        );
        assert_eq!(registry.mark_running("ghost"), Err(None));
    }

    #[test]
    fn cancel_fires_handle_and_flips_status() {
        let registry = TaskRegistry::new();
        let token = insert(&registry, "t-1");

        registry.request_cancel("t-1").unwrap();
        assert!(token.is_cancelled());
        assert_eq!(registry.get("t-1").unwrap().status, TaskStatus::Cancelled);

        // Idempotence from the engine's point of view: a second cancel on a
        // terminal task reports the invalid state.
        assert!(matches!(
            registry.request_cancel("t-1"),
            Err(EngineError::InvalidState { .. })
        ));
    }

    #[test]
    fn apply_result_moves_task_to_completed() {
        let registry = TaskRegistry::new();
        insert(&registry, "t-1");
        registry.mark_running("t-1").unwrap();

        let result = TaskResult::synthesized(
            "t-1",
            TaskStatus::Completed,
            "",
            SystemTime::now(),
        );
        registry.apply_result(result);

        let rec = registry.get("t-1").unwrap();
        assert_eq!(rec.status, TaskStatus::Completed);
        assert!(rec.finished_at.is_some());

        let (total, running, completed) = registry.counts();
        assert_eq!((total, running, completed), (1, 0, 1));
    }

    #[test]
    fn terminal_status_is_not_overwritten_by_late_result() {
        let registry = TaskRegistry::new();
        insert(&registry, "t-1");
        registry.mark_running("t-1").unwrap();
        registry.request_cancel("t-1").unwrap();

        let result = TaskResult::synthesized(
            "t-1",
            TaskStatus::Failed,
            "killed",
            SystemTime::now(),
        );
        registry.apply_result(result);

        assert_eq!(registry.get("t-1").unwrap().status, TaskStatus::Cancelled);
    }

    #[test]
    fn prune_drops_old_terminal_records() {
        let registry = TaskRegistry::new();
        insert(&registry, "t-1");
        registry.mark_running("t-1").unwrap();
        registry.apply_result(TaskResult::synthesized(
            "t-1",
            TaskStatus::Completed,
            "",
            SystemTime::now(),
        ));
        insert(&registry, "t-2");

        let dropped = registry.prune(SystemTime::now() + Duration::from_secs(1));
        assert_eq!(dropped, 1);
        assert!(registry.get("t-1").is_none());
        assert!(registry.get("t-2").is_some());
    }

    #[test]
    fn list_running_only_shows_running_status() {
        let registry = TaskRegistry::new();
        insert(&registry, "t-1");
        insert(&registry, "t-2");
        registry.mark_running("t-1").unwrap();
        registry.mark_running("t-2").unwrap();
        registry.request_cancel("t-2").unwrap();

        let running = registry.list_running();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id, "t-1");
    }
}
