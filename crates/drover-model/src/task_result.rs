use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{time_serde, TaskStatus};

/// Terminal record for a task: produced exactly once, then the task moves
/// from the running set to the completed set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub status: TaskStatus,
    pub exit_code: i32,
    /// Captured standard output (combined output for executors that merge
    /// the streams).
    pub output: String,
    /// Captured standard error, or a synthesized failure description.
    pub error: String,
    #[serde(with = "time_serde")]
    pub started_at: SystemTime,
    #[serde(with = "time_serde")]
    pub finished_at: SystemTime,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl TaskResult {
    /// Synthesize a terminal result for a task that never produced one
    /// itself (timeout expiry, cancellation before dequeue).
    pub fn synthesized(
        task_id: impl Into<String>,
        status: TaskStatus,
        error: impl Into<String>,
        started_at: SystemTime,
    ) -> Self {
        let finished_at = SystemTime::now();
        let duration = finished_at
            .duration_since(started_at)
            .unwrap_or(Duration::ZERO);
        Self {
            task_id: task_id.into(),
            status,
            exit_code: -1,
            output: String::new(),
            error: error.into(),
            started_at,
            finished_at,
            duration_ms: duration.as_millis() as u64,
            metadata: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesized_result_is_terminal() {
        let result = TaskResult::synthesized(
            "t-1",
            TaskStatus::Timeout,
            "task execution timeout",
            SystemTime::now(),
        );
        assert!(result.status.is_terminal());
        assert_eq!(result.exit_code, -1);
        assert!(result.finished_at >= result.started_at);
    }

    #[test]
    fn serde_roundtrip() {
        let result = TaskResult {
            task_id: "t-9".into(),
            status: TaskStatus::Completed,
            exit_code: 0,
            output: "hi\n".into(),
            error: String::new(),
            started_at: SystemTime::now(),
            finished_at: SystemTime::now(),
            duration_ms: 12,
            metadata: HashMap::new(),
        };

        let json = serde_json::to_string(&result).unwrap();
        let back: TaskResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.task_id, "t-9");
        assert_eq!(back.status, TaskStatus::Completed);
        assert_eq!(back.output, "hi\n");
    }
}
