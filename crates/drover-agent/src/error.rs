use thiserror::Error;

use drover_engine::EngineError;
use drover_fileops::FileOpsError;
use drover_transport::TransportError;

use crate::config::ConfigError;

/// Errors surfaced by the agent supervisor.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent is already running")]
    AlreadyRunning,

    #[error("failed to start service {service}: {reason}")]
    StartFailed { service: String, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    FileOps(#[from] FileOpsError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
