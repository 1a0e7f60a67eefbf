use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::time_serde;

/// Direction of a long-running file transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    Upload,
    Download,
    Copy,
    Move,
}

impl TransferKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferKind::Upload => "upload",
            TransferKind::Download => "download",
            TransferKind::Copy => "copy",
            TransferKind::Move => "move",
        }
    }
}

/// State of a transfer. Once terminal, the record never mutates again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Completed | TransferStatus::Failed | TransferStatus::Cancelled
        )
    }
}

/// Observable state of one transfer, as returned by the fileops manager.
///
/// Invariant: `0 <= transferred <= size` once the size is known, and
/// `progress == transferred / size` (1.0 for empty files).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRecord {
    pub id: String,
    pub kind: TransferKind,
    pub status: TransferStatus,
    pub source_path: String,
    pub dest_path: String,
    /// Total bytes to move; 0 until the source has been measured.
    pub size: u64,
    pub transferred: u64,
    pub progress: f64,
    /// Hex SHA-256 of the moved bytes, recorded on completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(with = "time_serde")]
    pub started_at: SystemTime,
    #[serde(default, with = "time_serde::opt", skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<SystemTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(TransferStatus::Completed.is_terminal());
        assert!(TransferStatus::Failed.is_terminal());
        assert!(TransferStatus::Cancelled.is_terminal());
        assert!(!TransferStatus::Pending.is_terminal());
        assert!(!TransferStatus::Running.is_terminal());
    }

    #[test]
    fn serde_roundtrip() {
        let record = TransferRecord {
            id: "x-1".into(),
            kind: TransferKind::Download,
            status: TransferStatus::Running,
            source_path: "/a".into(),
            dest_path: "/b".into(),
            size: 100,
            transferred: 40,
            progress: 0.4,
            checksum: None,
            started_at: SystemTime::now(),
            completed_at: None,
            error: None,
        };

        let json = serde_json::to_string(&record).unwrap();
        let back: TransferRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, TransferKind::Download);
        assert_eq!(back.transferred, 40);
        assert!(!json.contains("checksum"));
    }
}
