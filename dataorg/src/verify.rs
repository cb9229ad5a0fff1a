use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use crate::error::DataorgResult;

pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Digest used to decide whether two files are the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChecksumAlgorithm {
    Crc32,
    Md5,
    Sha1,
    #[default]
    Sha256,
}

impl ChecksumAlgorithm {
    /// Parse a scheme name; unknown names fall back to SHA-256.
    pub fn parse_or_default(scheme: &str) -> Self {
        match scheme.trim().to_uppercase().replace('_', "-").as_str() {
            "CRC32" => ChecksumAlgorithm::Crc32,
            "MD5" => ChecksumAlgorithm::Md5,
            "SHA-1" | "SHA1" => ChecksumAlgorithm::Sha1,
            "SHA-256" | "SHA256" => ChecksumAlgorithm::Sha256,
            other => {
                warn!("Unknown checksum scheme '{}', using SHA-256", other);
                ChecksumAlgorithm::Sha256
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Crc32 => "CRC32",
            ChecksumAlgorithm::Md5 => "MD5",
            ChecksumAlgorithm::Sha1 => "SHA-1",
            ChecksumAlgorithm::Sha256 => "SHA-256",
        }
    }
}

impl From<String> for ChecksumAlgorithm {
    fn from(value: String) -> Self {
        Self::parse_or_default(&value)
    }
}

impl From<ChecksumAlgorithm> for String {
    fn from(value: ChecksumAlgorithm) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

enum FileHasher {
    Crc32(crc32fast::Hasher),
    Md5(md5::Context),
    Sha1(Sha1),
    Sha256(Sha256),
}

impl FileHasher {
    fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Crc32 => FileHasher::Crc32(crc32fast::Hasher::new()),
            ChecksumAlgorithm::Md5 => FileHasher::Md5(md5::Context::new()),
            ChecksumAlgorithm::Sha1 => FileHasher::Sha1(Sha1::new()),
            ChecksumAlgorithm::Sha256 => FileHasher::Sha256(Sha256::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            FileHasher::Crc32(h) => h.update(data),
            FileHasher::Md5(h) => h.consume(data),
            FileHasher::Sha1(h) => h.update(data),
            FileHasher::Sha256(h) => h.update(data),
        }
    }

    fn finish(self) -> String {
        match self {
            FileHasher::Crc32(h) => h.finalize().to_string(),
            FileHasher::Md5(h) => format!("{:x}", h.compute()),
            FileHasher::Sha1(h) => format!("{:x}", h.finalize()),
            FileHasher::Sha256(h) => format!("{:x}", h.finalize()),
        }
    }
}

pub struct FileVerifier;

impl FileVerifier {
    /// Hex digest of a file (decimal for CRC32), read in `block_size` chunks.
    pub async fn hash_file(
        path: &Path,
        algorithm: ChecksumAlgorithm,
        block_size: usize,
    ) -> DataorgResult<String> {
        debug!("Calculating {} checksum for {:?}", algorithm, path);

        let block_size = if block_size == 0 { DEFAULT_BLOCK_SIZE } else { block_size };
        let mut file = tokio::fs::File::open(path).await?;
        let mut hasher = FileHasher::new(algorithm);
        let mut buffer = vec![0u8; block_size];

        loop {
            let bytes_read = file.read(&mut buffer).await?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(hasher.finish())
    }

    /// Whether `a` and `b` hold the same content. Hashing errors count as
    /// "different" so the caller copies again rather than skipping.
    pub async fn same_file(
        a: &Path,
        b: &Path,
        algorithm: ChecksumAlgorithm,
        block_size: usize,
        shallow: bool,
    ) -> bool {
        let (a_len, b_len) = match (tokio::fs::metadata(a).await, tokio::fs::metadata(b).await) {
            (Ok(a_meta), Ok(b_meta)) => (a_meta.len(), b_meta.len()),
            _ => return false,
        };

        if a_len != b_len {
            return false;
        }
        if shallow {
            return true;
        }

        let a_hash = Self::hash_file(a, algorithm, block_size).await;
        let b_hash = Self::hash_file(b, algorithm, block_size).await;

        match (a_hash, b_hash) {
            (Ok(a_hash), Ok(b_hash)) => {
                let same = a_hash == b_hash;
                if same {
                    info!("{} match for {:?} and {:?}: {}", algorithm, a, b, a_hash);
                }
                same
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!("Failed to compute the checksum, treating {:?} as different: {}", a, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_scheme() {
        assert_eq!(ChecksumAlgorithm::parse_or_default("crc32"), ChecksumAlgorithm::Crc32);
        assert_eq!(ChecksumAlgorithm::parse_or_default("MD5"), ChecksumAlgorithm::Md5);
        assert_eq!(ChecksumAlgorithm::parse_or_default("sha-1"), ChecksumAlgorithm::Sha1);
        assert_eq!(ChecksumAlgorithm::parse_or_default("SHA-256"), ChecksumAlgorithm::Sha256);
        assert_eq!(ChecksumAlgorithm::parse_or_default("whirlpool"), ChecksumAlgorithm::Sha256);
    }

    #[tokio::test]
    async fn test_known_digests() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("abc.txt");
        tokio::fs::write(&path, b"abc").await.unwrap();

        let sha256 = FileVerifier::hash_file(&path, ChecksumAlgorithm::Sha256, 2).await.unwrap();
        assert_eq!(sha256, "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");

        let sha1 = FileVerifier::hash_file(&path, ChecksumAlgorithm::Sha1, 4096).await.unwrap();
        assert_eq!(sha1, "a9993e364706816aba3e25717850c26c9cd0d89d");

        let md5 = FileVerifier::hash_file(&path, ChecksumAlgorithm::Md5, 1).await.unwrap();
        assert_eq!(md5, "900150983cd24fb0d6963f7d28e17f72");

        let crc = FileVerifier::hash_file(&path, ChecksumAlgorithm::Crc32, 0).await.unwrap();
        assert_eq!(crc, "891568578");
    }

    #[tokio::test]
    async fn test_same_file() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a");
        let b = temp_dir.path().join("b");
        let c = temp_dir.path().join("c");
        let d = temp_dir.path().join("d");
        tokio::fs::write(&a, b"same bytes").await.unwrap();
        tokio::fs::write(&b, b"same bytes").await.unwrap();
        tokio::fs::write(&c, b"diff bytes").await.unwrap();
        tokio::fs::write(&d, b"longer content").await.unwrap();

        let algo = ChecksumAlgorithm::Sha256;
        assert!(FileVerifier::same_file(&a, &b, algo, 4096, false).await);
        assert!(!FileVerifier::same_file(&a, &c, algo, 4096, false).await);
        // shallow only compares sizes
        assert!(FileVerifier::same_file(&a, &c, algo, 4096, true).await);
        assert!(!FileVerifier::same_file(&a, &d, algo, 4096, true).await);
        assert!(!FileVerifier::same_file(&a, &temp_dir.path().join("missing"), algo, 4096, true).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_content_is_not_a_duplicate() {
        let temp_dir = TempDir::new().unwrap();
        // a directory has a size but no readable content
        let dir = temp_dir.path().join("dir");
        tokio::fs::create_dir(&dir).await.unwrap();
        let dir_len = tokio::fs::metadata(&dir).await.unwrap().len();
        let file = temp_dir.path().join("file");
        tokio::fs::write(&file, vec![0u8; dir_len as usize]).await.unwrap();

        let algo = ChecksumAlgorithm::Sha256;
        assert!(FileVerifier::same_file(&file, &dir, algo, 4096, true).await);
        assert!(!FileVerifier::same_file(&file, &dir, algo, 4096, false).await);
        assert!(!FileVerifier::same_file(&dir, &file, algo, 4096, false).await);
    }
}
