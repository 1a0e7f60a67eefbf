use thiserror::Error;

/// Errors surfaced by the fileops manager.
#[derive(Debug, Error)]
pub enum FileOpsError {
    #[error("invalid operation: {0}")]
    Validation(String),

    #[error("transfer not found: {0}")]
    NotFound(String),

    #[error("path not found: {0}")]
    PathNotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("manager is already running")]
    AlreadyRunning,
}

impl FileOpsError {
    /// Stable error code, used in error envelopes replied to the controller.
    pub fn code(&self) -> &'static str {
        match self {
            FileOpsError::Validation(_) => "VALIDATION_ERROR",
            FileOpsError::NotFound(_) | FileOpsError::PathNotFound(_) => "NOT_FOUND",
            FileOpsError::Io(_) => "IO_ERROR",
            FileOpsError::AlreadyRunning => "ALREADY_RUNNING",
        }
    }
}
