use drover_model::TaskStatus;
use thiserror::Error;

/// Errors surfaced by the engine's public operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid task: {0}")]
    Validation(String),

    #[error("task queue is full")]
    QueueFull,

    #[error("task not found: {0}")]
    NotFound(String),

    #[error("task {id} cannot be cancelled (status: {status})")]
    InvalidState { id: String, status: TaskStatus },

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is stopped")]
    Stopped,

    #[error("caller cancelled while waiting for task {0}")]
    WaitCancelled(String),
}

impl EngineError {
    /// Stable error code, used in error envelopes replied to the controller.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "VALIDATION_ERROR",
            EngineError::QueueFull => "QUEUE_FULL",
            EngineError::NotFound(_) => "NOT_FOUND",
            EngineError::InvalidState { .. } => "INVALID_STATE",
            EngineError::AlreadyRunning => "ALREADY_RUNNING",
            EngineError::Stopped => "UNAVAILABLE",
            EngineError::WaitCancelled(_) => "CANCELLED",
        }
    }
}

/// Errors raised while turning a task into a subprocess.
///
/// These never escape the engine: the worker folds them into a `failed`
/// task result.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    InvalidArguments(String),

    #[error("custom task execution not implemented: {0}")]
    NotImplemented(String),
}
