//! Domain types shared across the drover agent.
//!
//! Everything here is plain data: the execution-facing task model, the
//! transfer model for long-running file movement, and the controller wire
//! envelope. Behaviour lives in the engine, transport and fileops crates.

mod error;
pub use error::ParseError;

mod task_kind;
pub use task_kind::{Interpreter, TaskKind};

mod task_status;
pub use task_status::TaskStatus;

mod task_spec;
pub use task_spec::TaskSpec;

mod task_record;
pub use task_record::TaskRecord;

mod task_result;
pub use task_result::TaskResult;

mod transfer;
pub use transfer::{TransferKind, TransferRecord, TransferStatus};

mod fileop;
pub use fileop::{FileOperation, OperationKind};

mod envelope;
pub use envelope::{Envelope, MessageType};

mod connection;
pub use connection::ConnectionInfo;

pub(crate) mod time_serde;

/// Payload map carried by a controller envelope.
pub type Payload = serde_json::Map<String, serde_json::Value>;
