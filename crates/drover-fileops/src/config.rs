use std::path::PathBuf;
use std::time::Duration;

/// Eviction policy for the janitor.
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    pub enabled: bool,
    /// Cadence of janitor runs.
    pub interval: Duration,
    /// Temp files older than this are deleted.
    pub max_age: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(60 * 60),
            max_age: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Storage layout and limits for the fileops manager.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub cleanup: CleanupConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/drover/data"),
            temp_dir: PathBuf::from("/tmp/drover"),
            cleanup: CleanupConfig::default(),
        }
    }
}
