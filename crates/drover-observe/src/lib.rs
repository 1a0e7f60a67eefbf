//! Logging setup for the drover agent.
//!
//! One call at process start wires a `tracing` subscriber with an
//! `EnvFilter`-style level directive and either human-readable or JSON
//! output.

mod logger;
pub use logger::{init_logging, LogConfig, LogFormat, LogInitError};
