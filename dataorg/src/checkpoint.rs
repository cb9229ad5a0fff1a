use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{DataorgError, DataorgResult};

const START_INDEX_PREFIX: &str = "START_INDEX_";

/// Small durable string map persisted as a JSON object.
///
/// Writes go to a sibling temp file which is synced and renamed over the
/// original, so a crash leaves either the old or the new contents.
#[derive(Debug)]
pub struct KvStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl KvStore {
    pub async fn open(path: impl Into<PathBuf>) -> DataorgResult<Self> {
        let path = path.into();

        let entries = match fs::read_to_string(&path).await {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => {
                serde_json::from_str(&contents).map_err(|e| DataorgError::StateCorrupted {
                    path: path.clone(),
                    reason: e.to_string(),
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("State file {:?} does not exist yet", path);
                BTreeMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    pub async fn flush(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let json_data = serde_json::to_string_pretty(&self.entries)?;
        let tmp_path = self.path.with_extension("json.tmp");

        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(json_data.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp_path, &self.path).await
    }
}

/// Last row index of an input that reached a terminal outcome.
#[derive(Debug)]
pub struct CheckpointStore {
    store: KvStore,
}

impl CheckpointStore {
    pub async fn open(path: impl Into<PathBuf>) -> DataorgResult<Self> {
        Ok(Self {
            store: KvStore::open(path).await?,
        })
    }

    pub fn key(input_id: &str) -> String {
        format!("{}{}", START_INDEX_PREFIX, input_id)
    }

    /// 0 means nothing has been processed yet.
    pub fn load(&self, input_id: &str) -> DataorgResult<u64> {
        match self.store.get(&Self::key(input_id)) {
            None => Ok(0),
            Some(raw) => raw.trim().parse().map_err(|_| DataorgError::StateCorrupted {
                path: self.store.path().to_path_buf(),
                reason: format!("checkpoint for {} is not a row index: {:?}", input_id, raw),
            }),
        }
    }

    /// Record `row_index` as done. Never moves the checkpoint backwards.
    pub async fn advance(&mut self, input_id: &str, row_index: u64) -> DataorgResult<()> {
        let current = self.load(input_id)?;
        if row_index < current {
            warn!(
                "Ignoring checkpoint {} for {}: already at {}",
                row_index, input_id, current
            );
            return Ok(());
        }
        if row_index == current {
            return Ok(());
        }

        self.store.set(Self::key(input_id), row_index.to_string());
        self.persist(input_id).await?;

        debug!("Checkpoint for {} advanced to row {}", input_id, row_index);
        Ok(())
    }

    /// Forget progress for `input_id`; the next run starts fresh.
    pub async fn reset(&mut self, input_id: &str) -> DataorgResult<()> {
        if self.store.remove(&Self::key(input_id)).is_some() {
            self.persist(input_id).await?;
            info!("Reset checkpoint for {}", input_id);
        }
        Ok(())
    }

    async fn persist(&self, input_id: &str) -> DataorgResult<()> {
        self.store
            .flush()
            .await
            .map_err(|e| DataorgError::CheckpointWriteFailed {
                input_id: input_id.to_string(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_kv_store_persists() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state").join("kv.json");

        let mut store = KvStore::open(&path).await.unwrap();
        assert_eq!(store.get("A"), None);
        store.set("A", "1");
        store.flush().await.unwrap();

        let reopened = KvStore::open(&path).await.unwrap();
        assert_eq!(reopened.get("A"), Some("1"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupted_state_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("kv.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let result = KvStore::open(&path).await;
        assert!(matches!(result, Err(DataorgError::StateCorrupted { .. })));
    }

    #[tokio::test]
    async fn test_checkpoint_roundtrip_and_monotonic() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("checkpoint.json");

        let mut checkpoint = CheckpointStore::open(&path).await.unwrap();
        assert_eq!(checkpoint.load("input.csv").unwrap(), 0);

        checkpoint.advance("input.csv", 3).await.unwrap();
        checkpoint.advance("input.csv", 2).await.unwrap();
        assert_eq!(checkpoint.load("input.csv").unwrap(), 3);
        assert_eq!(checkpoint.load("other.csv").unwrap(), 0);

        let reopened = CheckpointStore::open(&path).await.unwrap();
        assert_eq!(reopened.load("input.csv").unwrap(), 3);

        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(raw.contains("START_INDEX_input.csv"));
    }

    #[tokio::test]
    async fn test_checkpoint_reset() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("checkpoint.json");

        let mut checkpoint = CheckpointStore::open(&path).await.unwrap();
        checkpoint.advance("input.csv", 7).await.unwrap();
        checkpoint.reset("input.csv").await.unwrap();

        let reopened = CheckpointStore::open(&path).await.unwrap();
        assert_eq!(reopened.load("input.csv").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_checkpoint_write_failure_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let state_dir = temp_dir.path().join("state");
        let mut checkpoint = CheckpointStore::open(state_dir.join("checkpoint.json")).await.unwrap();

        // parent "directory" is now a regular file, so the write cannot succeed
        tokio::fs::write(&state_dir, b"file").await.unwrap();
        let err = checkpoint.advance("input.csv", 1).await.unwrap_err();
        assert!(matches!(err, DataorgError::CheckpointWriteFailed { .. }));
        assert!(err.is_fatal());
    }
}
