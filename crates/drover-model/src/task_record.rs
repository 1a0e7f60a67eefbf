use std::collections::HashMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{time_serde, TaskKind, TaskStatus};

/// Registry view of an admitted task.
///
/// Snapshot returned by the engine's `get`/`list` operations; the live
/// record (cancellation handle, waiter) stays inside the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub name: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub priority: i32,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
    #[serde(with = "time_serde")]
    pub queued_at: SystemTime,
    #[serde(default, with = "time_serde::opt", skip_serializing_if = "Option::is_none")]
    pub started_at: Option<SystemTime>,
    #[serde(default, with = "time_serde::opt", skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<SystemTime>,
    /// Error text from the terminal result, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_roundtrip() {
        let record = TaskRecord {
            id: "t-1".into(),
            name: "probe".into(),
            kind: TaskKind::Custom { name: "noop".into() },
            status: TaskStatus::Queued,
            priority: 1,
            metadata: HashMap::new(),
            queued_at: SystemTime::now(),
            started_at: None,
            finished_at: None,
            error: None,
        };

        let json = serde_json::to_string(&record).unwrap();
        let back: TaskRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, record.id);
        assert_eq!(back.status, record.status);
        assert!(back.started_at.is_none());
    }

    #[test]
    fn optional_timestamps_are_omitted() {
        let record = TaskRecord {
            id: "t-2".into(),
            name: String::new(),
            kind: TaskKind::Custom { name: "noop".into() },
            status: TaskStatus::Queued,
            priority: 0,
            metadata: HashMap::new(),
            queued_at: SystemTime::now(),
            started_at: None,
            finished_at: None,
            error: None,
        };

        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("started_at"));
        assert!(!json.contains("finished_at"));
    }
}
