//! Task execution engine: a bounded admission queue feeding a fixed pool of
//! workers, each turning typed tasks into host subprocesses.
//!
//! The engine owns the task registry for the process lifetime. Admission
//! registers the task and queues it; a worker drives it through the
//! `queued -> running -> terminal` state machine; a dedicated result handler
//! applies the single terminal [`drover_model::TaskResult`] and wakes any
//! synchronous waiter.

mod config;
pub use config::EngineConfig;

mod error;
pub use error::{EngineError, ExecError};

mod registry;
pub use registry::EngineStats;

mod engine;
pub use engine::Engine;

pub mod exec;

mod worker;
