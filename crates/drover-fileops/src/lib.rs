//! File operations for the drover agent.
//!
//! Synchronous operations (copy, move, delete, list, stat, chmod, chown)
//! are direct filesystem calls returning structured result maps. Uploads
//! and downloads become tracked [`drover_model::TransferRecord`]s driven by
//! a chunked byte pump that reports progress and honours cancellation. A
//! janitor evicts stale temp files and finished transfers.

mod config;
pub use config::{CleanupConfig, StorageConfig};

mod error;
pub use error::FileOpsError;

mod checksum;
pub use checksum::{checksum_file, ChecksumAlgorithm};

mod transfer;

mod manager;
pub use manager::FileOpsManager;
