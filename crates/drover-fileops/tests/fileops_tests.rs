//! Fileops manager tests on temporary directory trees.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::json;

use drover_fileops::{FileOpsManager, FileOpsError, StorageConfig};
use drover_model::{FileOperation, OperationKind, TransferStatus};

fn manager(root: &std::path::Path) -> FileOpsManager {
    FileOpsManager::new(StorageConfig {
        data_dir: root.join("data"),
        temp_dir: root.join("tmp"),
        ..Default::default()
    })
    .expect("manager builds")
}

fn operation(kind: OperationKind, source: &std::path::Path, dest: &std::path::Path) -> FileOperation {
    FileOperation {
        kind,
        source_path: source.display().to_string(),
        dest_path: dest.display().to_string(),
        recursive: false,
        overwrite: false,
        metadata: HashMap::new(),
    }
}

async fn wait_terminal(manager: &FileOpsManager, id: &str) -> TransferStatus {
    for _ in 0..100 {
        let record = manager.get_transfer(id).expect("transfer registered");
        if record.status.is_terminal() {
            return record.status;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("transfer {id} never reached a terminal state");
}

#[tokio::test]
async fn upload_pumps_bytes_with_progress_and_checksum() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path());

    let source = dir.path().join("payload.bin");
    let content = vec![7u8; 256 * 1024];
    tokio::fs::write(&source, &content).await.unwrap();
    let dest = dir.path().join("data/payload.bin");

    let result = manager
        .execute(&operation(OperationKind::Upload, &source, &dest))
        .await
        .unwrap();
    let id = result["transfer_id"].as_str().unwrap().to_string();

    let status = wait_terminal(&manager, &id).await;
    assert_eq!(status, TransferStatus::Completed);

    let record = manager.get_transfer(&id).unwrap();
    assert_eq!(record.size, content.len() as u64);
    assert_eq!(record.transferred, content.len() as u64);
    assert!((record.progress - 1.0).abs() < f64::EPSILON);

    // The recorded checksum matches an independent digest of the copy.
    let copied = tokio::fs::read(&dest).await.unwrap();
    assert_eq!(copied, content);
    let expected = manager
        .checksum(&dest.display().to_string(), "sha256")
        .await
        .unwrap();
    assert_eq!(record.checksum.as_deref(), Some(expected.as_str()));
}

#[tokio::test]
async fn cancelled_transfer_goes_terminal() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path());

    let source = dir.path().join("big.bin");
    tokio::fs::write(&source, vec![0u8; 1024 * 1024]).await.unwrap();
    let dest = dir.path().join("data/big.bin");

    let result = manager
        .execute(&operation(OperationKind::Download, &source, &dest))
        .await
        .unwrap();
    let id = result["transfer_id"].as_str().unwrap().to_string();

    manager.cancel_transfer(&id).unwrap();
    let status = wait_terminal(&manager, &id).await;
    assert_eq!(status, TransferStatus::Cancelled);

    // Idempotent.
    manager.cancel_transfer(&id).unwrap();
    assert!(matches!(
        manager.cancel_transfer("no-such-id"),
        Err(FileOpsError::NotFound(_))
    ));
}

#[tokio::test]
async fn copy_directory_requires_recursive() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path());

    let source = dir.path().join("tree");
    tokio::fs::create_dir_all(source.join("nested")).await.unwrap();
    tokio::fs::write(source.join("a.txt"), b"alpha").await.unwrap();
    tokio::fs::write(source.join("nested/b.txt"), b"beta").await.unwrap();
    let dest = dir.path().join("tree-copy");

    let err = manager
        .execute(&operation(OperationKind::Copy, &source, &dest))
        .await
        .expect_err("non-recursive copy of a directory fails");
    assert!(matches!(err, FileOpsError::Validation(_)));

    let mut op = operation(OperationKind::Copy, &source, &dest);
    op.recursive = true;
    let result = manager.execute(&op).await.unwrap();
    assert_eq!(result["bytes_copied"].as_u64(), Some(9));
    assert_eq!(
        tokio::fs::read(dest.join("nested/b.txt")).await.unwrap(),
        b"beta"
    );
}

#[tokio::test]
async fn move_delete_stat_and_list() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path());

    let source = dir.path().join("a.txt");
    tokio::fs::write(&source, b"contents").await.unwrap();
    let moved = dir.path().join("b.txt");

    manager
        .execute(&operation(OperationKind::Move, &source, &moved))
        .await
        .unwrap();
    assert!(!source.exists());

    let stat = manager
        .execute(&operation(OperationKind::Stat, &moved, std::path::Path::new("")))
        .await
        .unwrap();
    assert_eq!(stat["file"]["size"].as_u64(), Some(8));
    assert_eq!(stat["file"]["is_dir"], json!(false));

    let listing = manager
        .execute(&operation(
            OperationKind::List,
            dir.path(),
            std::path::Path::new(""),
        ))
        .await
        .unwrap();
    assert!(listing["count"].as_u64().unwrap() >= 1);

    manager
        .execute(&operation(OperationKind::Delete, &moved, std::path::Path::new("")))
        .await
        .unwrap();
    assert!(!moved.exists());
}

#[tokio::test]
async fn relative_paths_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path());

    let op = FileOperation {
        kind: OperationKind::Stat,
        source_path: "relative/path".into(),
        dest_path: String::new(),
        recursive: false,
        overwrite: false,
        metadata: HashMap::new(),
    };
    assert!(matches!(
        manager.execute(&op).await,
        Err(FileOpsError::Validation(_))
    ));
}

#[tokio::test]
async fn checksum_rejects_unknown_algorithm() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path());

    let path = dir.path().join("f");
    tokio::fs::write(&path, b"x").await.unwrap();

    assert!(manager
        .checksum(&path.display().to_string(), "sha256")
        .await
        .is_ok());
    assert!(matches!(
        manager.checksum(&path.display().to_string(), "crc32").await,
        Err(FileOpsError::Validation(_))
    ));
}

#[tokio::test]
async fn upload_respects_overwrite_flag() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path());

    let source = dir.path().join("src.bin");
    tokio::fs::write(&source, b"fresh").await.unwrap();
    let dest = dir.path().join("data/out.bin");
    tokio::fs::create_dir_all(dest.parent().unwrap()).await.unwrap();
    tokio::fs::write(&dest, b"old").await.unwrap();

    let err = manager
        .execute(&operation(OperationKind::Upload, &source, &dest))
        .await
        .expect_err("existing destination without overwrite fails");
    assert!(matches!(err, FileOpsError::Validation(_)));

    let mut op = operation(OperationKind::Upload, &source, &dest);
    op.overwrite = true;
    let result = manager.execute(&op).await.unwrap();
    let id = result["transfer_id"].as_str().unwrap().to_string();
    assert_eq!(wait_terminal(&manager, &id).await, TransferStatus::Completed);
    assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"fresh");
}
