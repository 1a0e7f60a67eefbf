use std::path::Path;

use md5::Md5;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::error::FileOpsError;

/// Digest algorithms supported by the `checksum` operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Md5,
    Sha256,
}

impl ChecksumAlgorithm {
    pub fn from_name(name: &str) -> Result<Self, FileOpsError> {
        match name {
            "md5" => Ok(ChecksumAlgorithm::Md5),
            "sha256" => Ok(ChecksumAlgorithm::Sha256),
            other => Err(FileOpsError::Validation(format!(
                "unsupported checksum algorithm: {other}"
            ))),
        }
    }
}

/// Stream a file through the selected digest and return it hex-encoded.
pub async fn checksum_file(
    path: impl AsRef<Path>,
    algorithm: ChecksumAlgorithm,
) -> Result<String, FileOpsError> {
    let mut file = tokio::fs::File::open(path.as_ref()).await?;
    let mut buf = vec![0u8; 64 * 1024];

    match algorithm {
        ChecksumAlgorithm::Md5 => {
            let mut hasher = Md5::new();
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            Ok(hex::encode(hasher.finalize()))
        }
        ChecksumAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            Ok(hex::encode(hasher.finalize()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_names() {
        assert_eq!(
            ChecksumAlgorithm::from_name("md5").unwrap(),
            ChecksumAlgorithm::Md5
        );
        assert_eq!(
            ChecksumAlgorithm::from_name("sha256").unwrap(),
            ChecksumAlgorithm::Sha256
        );
        assert!(matches!(
            ChecksumAlgorithm::from_name("crc32"),
            Err(FileOpsError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn digests_known_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input");
        tokio::fs::write(&path, b"abc").await.unwrap();

        let sha = checksum_file(&path, ChecksumAlgorithm::Sha256).await.unwrap();
        assert_eq!(
            sha,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );

        let md5 = checksum_file(&path, ChecksumAlgorithm::Md5).await.unwrap();
        assert_eq!(md5, "900150983cd24fb0d6963f7d28e17f72");
    }
}
