use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use drover_model::{TransferKind, TransferRecord, TransferStatus};

/// Pump buffer size.
const CHUNK: usize = 64 * 1024;

struct LiveTransfer {
    record: TransferRecord,
    cancel: CancellationToken,
}

/// Transfer registry guarded by one reader-writer lock; the pump mutates
/// progress through it so readers always see a consistent record.
#[derive(Clone)]
pub(crate) struct TransferRegistry {
    inner: Arc<RwLock<HashMap<String, LiveTransfer>>>,
}

impl TransferRegistry {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub(crate) fn insert(
        &self,
        id: &str,
        kind: TransferKind,
        source: &Path,
        dest: &Path,
        cancel: CancellationToken,
    ) {
        let record = TransferRecord {
            id: id.to_string(),
            kind,
            status: TransferStatus::Pending,
            source_path: source.display().to_string(),
            dest_path: dest.display().to_string(),
            size: 0,
            transferred: 0,
            progress: 0.0,
            checksum: None,
            started_at: SystemTime::now(),
            completed_at: None,
            error: None,
        };
        self.inner
            .write()
            .unwrap()
            .insert(id.to_string(), LiveTransfer { record, cancel });
    }

    pub(crate) fn get(&self, id: &str) -> Option<TransferRecord> {
        self.inner
            .read()
            .unwrap()
            .get(id)
            .map(|live| live.record.clone())
    }

    pub(crate) fn list(&self) -> Vec<TransferRecord> {
        self.inner
            .read()
            .unwrap()
            .values()
            .map(|live| live.record.clone())
            .collect()
    }

    /// Cancel a transfer. Idempotent: cancelling a terminal transfer is a
    /// no-op, an unknown id reports `None`.
    pub(crate) fn cancel(&self, id: &str) -> Option<()> {
        let cancel = {
            let mut inner = self.inner.write().unwrap();
            let live = inner.get_mut(id)?;
            if live.record.status.is_terminal() {
                return Some(());
            }
            live.record.status = TransferStatus::Cancelled;
            live.record.completed_at = Some(SystemTime::now());
            live.cancel.clone()
        };
        cancel.cancel();
        Some(())
    }

    pub(crate) fn cancel_all(&self) {
        let handles: Vec<CancellationToken> = {
            let inner = self.inner.read().unwrap();
            inner
                .values()
                .filter(|live| !live.record.status.is_terminal())
                .map(|live| live.cancel.clone())
                .collect()
        };
        for handle in handles {
            handle.cancel();
        }
    }

    fn set_running(&self, id: &str, size: u64) {
        let mut inner = self.inner.write().unwrap();
        if let Some(live) = inner.get_mut(id) {
            if live.record.status == TransferStatus::Pending {
                live.record.status = TransferStatus::Running;
            }
            live.record.size = size;
        }
    }

    fn add_progress(&self, id: &str, bytes: u64) {
        let mut inner = self.inner.write().unwrap();
        if let Some(live) = inner.get_mut(id) {
            live.record.transferred += bytes;
            live.record.progress = if live.record.size > 0 {
                live.record.transferred as f64 / live.record.size as f64
            } else {
                1.0
            };
        }
    }

    /// Transition to a terminal state. Already-terminal records (an explicit
    /// cancel raced the pump) are left untouched.
    fn finish(&self, id: &str, status: TransferStatus, checksum: Option<String>, error: Option<String>) {
        let mut inner = self.inner.write().unwrap();
        if let Some(live) = inner.get_mut(id) {
            if live.record.status.is_terminal() {
                return;
            }
            live.record.status = status;
            live.record.checksum = checksum;
            live.record.error = error;
            live.record.completed_at = Some(SystemTime::now());
            if status == TransferStatus::Completed {
                live.record.progress = 1.0;
            }
        }
    }

    /// Drop terminal transfers whose completion is older than `cutoff`.
    pub(crate) fn evict_finished_before(&self, cutoff: SystemTime) -> usize {
        let mut inner = self.inner.write().unwrap();
        let before = inner.len();
        inner.retain(|_, live| {
            !(live.record.status.is_terminal()
                && live.record.completed_at.is_some_and(|at| at < cutoff))
        });
        before - inner.len()
    }
}

/// Move bytes from `source` to `dest` in chunks, updating progress after
/// each write and folding a SHA-256 over the stream. Cancellation is
/// observed between writes.
pub(crate) async fn pump(
    registry: TransferRegistry,
    id: String,
    source: PathBuf,
    dest: PathBuf,
    cancel: CancellationToken,
) {
    match pump_bytes(&registry, &id, &source, &dest, &cancel).await {
        Ok(Some(checksum)) => {
            info!(transfer_id = %id, "transfer completed");
            registry.finish(&id, TransferStatus::Completed, Some(checksum), None);
        }
        Ok(None) => {
            info!(transfer_id = %id, "transfer cancelled");
            registry.finish(&id, TransferStatus::Cancelled, None, None);
        }
        Err(e) => {
            warn!(transfer_id = %id, error = %e, "transfer failed");
            registry.finish(&id, TransferStatus::Failed, None, Some(e.to_string()));
        }
    }
}

/// Returns the hex checksum on completion, `None` when cancelled.
async fn pump_bytes(
    registry: &TransferRegistry,
    id: &str,
    source: &Path,
    dest: &Path,
    cancel: &CancellationToken,
) -> std::io::Result<Option<String>> {
    let mut input = tokio::fs::File::open(source).await?;
    let size = input.metadata().await?.len();
    registry.set_running(id, size);
    debug!(transfer_id = %id, size, "transfer running");

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut output = tokio::fs::File::create(dest).await?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK];
    loop {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        let n = input.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        output.write_all(&buf[..n]).await?;
        hasher.update(&buf[..n]);
        registry.add_progress(id, n as u64);
    }
    output.flush().await?;

    Ok(Some(hex::encode(hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(registry: &TransferRegistry, id: &str) -> CancellationToken {
        let cancel = CancellationToken::new();
        registry.insert(
            id,
            TransferKind::Copy,
            Path::new("/a"),
            Path::new("/b"),
            cancel.clone(),
        );
        cancel
    }

    #[test]
    fn progress_tracks_size() {
        let registry = TransferRegistry::new();
        seeded(&registry, "x");

        registry.set_running("x", 200);
        registry.add_progress("x", 50);
        registry.add_progress("x", 50);

        let record = registry.get("x").unwrap();
        assert_eq!(record.status, TransferStatus::Running);
        assert_eq!(record.transferred, 100);
        assert!((record.progress - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn cancel_is_idempotent() {
        let registry = TransferRegistry::new();
        let token = seeded(&registry, "x");

        assert!(registry.cancel("x").is_some());
        assert!(token.is_cancelled());
        assert_eq!(registry.get("x").unwrap().status, TransferStatus::Cancelled);

        // Second cancel: still fine, status unchanged.
        assert!(registry.cancel("x").is_some());
        assert!(registry.cancel("ghost").is_none());
    }

    #[test]
    fn terminal_record_is_not_overwritten() {
        let registry = TransferRegistry::new();
        seeded(&registry, "x");

        registry.cancel("x");
        registry.finish("x", TransferStatus::Completed, Some("abc".into()), None);

        let record = registry.get("x").unwrap();
        assert_eq!(record.status, TransferStatus::Cancelled);
        assert!(record.checksum.is_none());
    }

    #[test]
    fn eviction_keeps_live_transfers() {
        let registry = TransferRegistry::new();
        seeded(&registry, "done");
        seeded(&registry, "live");
        registry.finish("done", TransferStatus::Completed, None, None);

        let evicted =
            registry.evict_finished_before(SystemTime::now() + std::time::Duration::from_secs(1));
        assert_eq!(evicted, 1);
        assert!(registry.get("done").is_none());
        assert!(registry.get("live").is_some());
    }
}
