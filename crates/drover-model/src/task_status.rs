use serde::{Deserialize, Serialize};

/// Current execution state of a task.
///
/// Transitions are monotonic: `Queued -> Running -> {Completed, Failed,
/// Cancelled, Timeout}`. A terminal status never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Admitted and waiting for a worker.
    Queued,
    /// A worker is executing the task.
    Running,
    /// Subprocess exited zero.
    Completed,
    /// Subprocess exited non-zero or could not be spawned.
    Failed,
    /// Cancelled by an explicit request or by shutdown.
    Cancelled,
    /// Deadline expired before the subprocess finished.
    Timeout,
}

impl TaskStatus {
    /// Returns `true` for states that never transition further.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed
                | TaskStatus::Failed
                | TaskStatus::Cancelled
                | TaskStatus::Timeout
        )
    }

    /// Returns `true` while the task still occupies the engine.
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Queued | TaskStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(TaskStatus::Timeout.is_terminal());

        assert!(!TaskStatus::Queued.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn active_states() {
        assert!(TaskStatus::Queued.is_active());
        assert!(TaskStatus::Running.is_active());
        assert!(!TaskStatus::Cancelled.is_active());
    }

    #[test]
    fn serde_uses_wire_strings() {
        let json = serde_json::to_string(&TaskStatus::Cancelled).unwrap();
        assert_eq!(json, r#""cancelled""#);

        let back: TaskStatus = serde_json::from_str(r#""timeout""#).unwrap();
        assert_eq!(back, TaskStatus::Timeout);
    }
}
