//! The drover agent daemon.
//!
//! The supervisor here owns the lifecycle of the sub-services (execution
//! engine, fileops manager, controller transport), the heartbeat ticker,
//! and the receive-and-dispatch loop that correlates controller messages
//! with their handlers.

mod config;
pub use config::{Config, ConfigError};

mod error;
pub use error::AgentError;

mod service;
pub use service::Service;

mod health;

mod dispatch;

mod agent;
pub use agent::Agent;
