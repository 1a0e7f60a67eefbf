use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use drover_model::{FileOperation, OperationKind, Payload, TransferKind, TransferRecord};

use crate::checksum::{checksum_file, ChecksumAlgorithm};
use crate::config::StorageConfig;
use crate::error::FileOpsError;
use crate::transfer::{pump, TransferRegistry};

/// Terminal transfers are kept around this long for status queries.
const TRANSFER_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Owns the transfer registry, executes file operations, and runs the
/// cleanup janitor.
pub struct FileOpsManager {
    config: StorageConfig,
    transfers: TransferRegistry,
    shutdown: CancellationToken,
    running: AtomicBool,
    janitor: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl FileOpsManager {
    pub fn new(config: StorageConfig) -> Result<Self, FileOpsError> {
        std::fs::create_dir_all(&config.data_dir)?;
        std::fs::create_dir_all(&config.temp_dir)?;

        Ok(Self {
            config,
            transfers: TransferRegistry::new(),
            shutdown: CancellationToken::new(),
            running: AtomicBool::new(false),
            janitor: std::sync::Mutex::new(None),
        })
    }

    pub fn start(&self) -> Result<(), FileOpsError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(FileOpsError::AlreadyRunning);
        }

        if self.config.cleanup.enabled {
            let transfers = self.transfers.clone();
            let temp_dir = self.config.temp_dir.clone();
            let cleanup = self.config.cleanup.clone();
            let shutdown = self.shutdown.clone();
            *self.janitor.lock().unwrap() = Some(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(cleanup.interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => return,
                        _ = ticker.tick() => {
                            debug!("running fileops cleanup");
                            if let Err(e) = sweep_temp_dir(&temp_dir, cleanup.max_age).await {
                                warn!(error = %e, "temp directory cleanup failed");
                            }
                            let cutoff = SystemTime::now() - TRANSFER_RETENTION;
                            let evicted = transfers.evict_finished_before(cutoff);
                            if evicted > 0 {
                                info!(evicted, "dropped finished transfers");
                            }
                        }
                    }
                }
            }));
        }

        info!("fileops manager started");
        Ok(())
    }

    /// Cancel live transfers and stop the janitor. Idempotent.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        self.transfers.cancel_all();
        self.shutdown.cancel();

        let janitor = self.janitor.lock().unwrap().take();
        if let Some(handle) = janitor {
            let _ = handle.await;
        }

        info!("fileops manager stopped");
    }

    /// Execute one file operation and return its structured result map.
    pub async fn execute(&self, op: &FileOperation) -> Result<Payload, FileOpsError> {
        info!(
            operation = ?op.kind,
            source = %op.source_path,
            dest = %op.dest_path,
            "executing file operation"
        );

        match op.kind {
            OperationKind::Upload => self.start_transfer(TransferKind::Upload, op),
            OperationKind::Download => self.start_transfer(TransferKind::Download, op),
            OperationKind::Copy => self.copy(op).await,
            OperationKind::Move => self.rename(op).await,
            OperationKind::Delete => self.delete(op).await,
            OperationKind::List => self.list_dir(op).await,
            OperationKind::Stat => self.stat(op).await,
            OperationKind::Chmod => self.chmod(op).await,
            OperationKind::Chown => self.chown(op).await,
        }
    }

    /// Allocate a pending transfer and spawn its byte pump; returns
    /// immediately with the transfer id.
    fn start_transfer(
        &self,
        kind: TransferKind,
        op: &FileOperation,
    ) -> Result<Payload, FileOpsError> {
        let source = validate_path(&op.source_path)?;
        let dest = validate_path(&op.dest_path)?;
        if dest.exists() && !op.overwrite {
            return Err(FileOpsError::Validation(format!(
                "destination exists: {}",
                dest.display()
            )));
        }

        let id = Uuid::new_v4().to_string();
        let cancel = self.shutdown.child_token();
        self.transfers.insert(&id, kind, &source, &dest, cancel.clone());

        tokio::spawn(pump(
            self.transfers.clone(),
            id.clone(),
            source,
            dest,
            cancel,
        ));

        let mut result = Payload::new();
        result.insert("transfer_id".into(), id.into());
        result.insert("status".into(), "pending".into());
        Ok(result)
    }

    pub fn get_transfer(&self, id: &str) -> Result<TransferRecord, FileOpsError> {
        self.transfers
            .get(id)
            .ok_or_else(|| FileOpsError::NotFound(id.to_string()))
    }

    pub fn list_transfers(&self) -> Vec<TransferRecord> {
        self.transfers.list()
    }

    /// Cancel a transfer; idempotent on terminal transfers.
    pub fn cancel_transfer(&self, id: &str) -> Result<(), FileOpsError> {
        self.transfers
            .cancel(id)
            .ok_or_else(|| FileOpsError::NotFound(id.to_string()))
    }

    /// Stream a file through a digest; unknown algorithms fail validation.
    pub async fn checksum(&self, path: &str, algorithm: &str) -> Result<String, FileOpsError> {
        let path = validate_path(path)?;
        let algorithm = ChecksumAlgorithm::from_name(algorithm)?;
        checksum_file(path, algorithm).await
    }

    async fn copy(&self, op: &FileOperation) -> Result<Payload, FileOpsError> {
        let source = validate_path(&op.source_path)?;
        let dest = validate_path(&op.dest_path)?;

        let meta = tokio::fs::metadata(&source)
            .await
            .map_err(|_| FileOpsError::PathNotFound(op.source_path.clone()))?;

        let bytes_copied = if meta.is_dir() {
            if !op.recursive {
                return Err(FileOpsError::Validation(
                    "source is a directory, use recursive flag".into(),
                ));
            }
            copy_dir(&source, &dest).await?
        } else {
            copy_file(&source, &dest).await?
        };

        let mut result = Payload::new();
        result.insert("source".into(), op.source_path.clone().into());
        result.insert("destination".into(), op.dest_path.clone().into());
        result.insert("bytes_copied".into(), bytes_copied.into());
        result.insert("is_dir".into(), meta.is_dir().into());
        Ok(result)
    }

    async fn rename(&self, op: &FileOperation) -> Result<Payload, FileOpsError> {
        let source = validate_path(&op.source_path)?;
        let dest = validate_path(&op.dest_path)?;
        tokio::fs::rename(&source, &dest).await?;

        let mut result = Payload::new();
        result.insert("source".into(), op.source_path.clone().into());
        result.insert("destination".into(), op.dest_path.clone().into());
        Ok(result)
    }

    async fn delete(&self, op: &FileOperation) -> Result<Payload, FileOpsError> {
        let path = validate_path(&op.source_path)?;
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|_| FileOpsError::PathNotFound(op.source_path.clone()))?;

        if meta.is_dir() {
            if !op.recursive {
                return Err(FileOpsError::Validation(
                    "path is a directory, use recursive flag".into(),
                ));
            }
            tokio::fs::remove_dir_all(&path).await?;
        } else {
            tokio::fs::remove_file(&path).await?;
        }

        let mut result = Payload::new();
        result.insert("path".into(), op.source_path.clone().into());
        result.insert("deleted".into(), true.into());
        Ok(result)
    }

    async fn list_dir(&self, op: &FileOperation) -> Result<Payload, FileOpsError> {
        let path = validate_path(&op.source_path)?;
        let mut entries = tokio::fs::read_dir(&path)
            .await
            .map_err(|_| FileOpsError::PathNotFound(op.source_path.clone()))?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            files.push(file_info(&entry.path(), &meta));
        }

        let mut result = Payload::new();
        result.insert("path".into(), op.source_path.clone().into());
        result.insert("count".into(), files.len().into());
        result.insert("files".into(), files.into());
        Ok(result)
    }

    async fn stat(&self, op: &FileOperation) -> Result<Payload, FileOpsError> {
        let path = validate_path(&op.source_path)?;
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|_| FileOpsError::PathNotFound(op.source_path.clone()))?;

        let mut result = Payload::new();
        result.insert("file".into(), file_info(&path, &meta));
        Ok(result)
    }

    async fn chmod(&self, op: &FileOperation) -> Result<Payload, FileOpsError> {
        let path = validate_path(&op.source_path)?;
        let mode = op
            .metadata
            .get("mode")
            .and_then(mode_bits)
            .ok_or_else(|| FileOpsError::Validation("chmod requires an octal mode".into()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).await?;
        }
        #[cfg(not(unix))]
        {
            let _ = mode;
            return Err(FileOpsError::Validation(
                "chmod is not supported on this platform".into(),
            ));
        }

        let mut result = Payload::new();
        result.insert("path".into(), op.source_path.clone().into());
        result.insert("mode".into(), format!("{mode:o}").into());
        Ok(result)
    }

    async fn chown(&self, op: &FileOperation) -> Result<Payload, FileOpsError> {
        let path = validate_path(&op.source_path)?;
        let uid = op.metadata.get("uid").and_then(Value::as_u64);
        let gid = op.metadata.get("gid").and_then(Value::as_u64);
        if uid.is_none() && gid.is_none() {
            return Err(FileOpsError::Validation(
                "chown requires uid or gid metadata".into(),
            ));
        }

        #[cfg(unix)]
        {
            let path = path.clone();
            tokio::task::spawn_blocking(move || {
                std::os::unix::fs::chown(&path, uid.map(|v| v as u32), gid.map(|v| v as u32))
            })
            .await
            .map_err(|e| FileOpsError::Validation(e.to_string()))??;
        }
        #[cfg(not(unix))]
        {
            return Err(FileOpsError::Validation(
                "chown is not supported on this platform".into(),
            ));
        }

        let mut result = Payload::new();
        result.insert("path".into(), op.source_path.clone().into());
        if let Some(uid) = uid {
            result.insert("uid".into(), uid.into());
        }
        if let Some(gid) = gid {
            result.insert("gid".into(), gid.into());
        }
        Ok(result)
    }
}

fn validate_path(path: &str) -> Result<PathBuf, FileOpsError> {
    if path.is_empty() {
        return Err(FileOpsError::Validation("path is empty".into()));
    }
    let path = PathBuf::from(path);
    if !path.is_absolute() {
        return Err(FileOpsError::Validation(format!(
            "path must be absolute: {}",
            path.display()
        )));
    }
    Ok(path)
}

fn mode_bits(value: &Value) -> Option<u32> {
    match value {
        Value::String(s) => u32::from_str_radix(s.trim_start_matches("0o"), 8).ok(),
        Value::Number(n) => n.as_u64().map(|v| v as u32),
        _ => None,
    }
}

fn file_info(path: &Path, meta: &std::fs::Metadata) -> Value {
    let mut info = Payload::new();
    info.insert(
        "name".into(),
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
            .into(),
    );
    info.insert("path".into(), path.display().to_string().into());
    info.insert("size".into(), meta.len().into());
    info.insert("is_dir".into(), meta.is_dir().into());
    if let Ok(modified) = meta.modified() {
        if let Ok(since_epoch) = modified.duration_since(std::time::UNIX_EPOCH) {
            info.insert("mod_time".into(), since_epoch.as_secs().into());
        }
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        info.insert(
            "mode".into(),
            format!("{:o}", meta.permissions().mode() & 0o7777).into(),
        );
    }
    Value::Object(info)
}

async fn copy_file(source: &Path, dest: &Path) -> Result<u64, FileOpsError> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(tokio::fs::copy(source, dest).await?)
}

/// Recursive directory copy; returns total bytes moved.
async fn copy_dir(source: &Path, dest: &Path) -> Result<u64, FileOpsError> {
    let mut total = 0u64;
    let mut stack = vec![(source.to_path_buf(), dest.to_path_buf())];

    while let Some((from, to)) = stack.pop() {
        tokio::fs::create_dir_all(&to).await?;
        let mut entries = tokio::fs::read_dir(&from).await?;
        while let Some(entry) = entries.next_entry().await? {
            let target = to.join(entry.file_name());
            let meta = entry.metadata().await?;
            if meta.is_dir() {
                stack.push((entry.path(), target));
            } else {
                total += tokio::fs::copy(entry.path(), target).await?;
            }
        }
    }
    Ok(total)
}

/// Delete temp-directory files older than `max_age`.
async fn sweep_temp_dir(dir: &Path, max_age: Duration) -> Result<(), FileOpsError> {
    let cutoff = SystemTime::now() - max_age;
    let mut stack = vec![dir.to_path_buf()];

    while let Some(current) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&current).await?;
        while let Some(entry) = entries.next_entry().await? {
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if meta.is_dir() {
                stack.push(entry.path());
            } else if meta.modified().map(|at| at < cutoff).unwrap_or(false) {
                debug!(file = %entry.path().display(), "removing old temp file");
                let _ = tokio::fs::remove_file(entry.path()).await;
            }
        }
    }
    Ok(())
}
