use parking_lot::Mutex;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::checkpoint::KvStore;
use crate::error::{DataorgError, DataorgResult};
use crate::utils::{format_bytes, parse_size};

const COPIED_FILES: &str = "COPIED_FILES";
const FAILED_FILES: &str = "FAILED_FILES";
const SKIPPED_FILES: &str = "SKIPPED_FILES";
const SKIPPED_FOLDERS: &str = "SKIPPED_FOLDERS";
const DUPLICATE_FILES: &str = "DUPLICATE_FILES";
const TOTAL_COPIED_LENGTH: &str = "TOTAL_COPIED_LENGTH";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub files_copied: u64,
    pub files_failed: u64,
    pub files_skipped: u64,
    pub folders_skipped: u64,
    pub duplicate_files: u64,
    pub bytes_copied: u64,
}

/// Run counters, shared by copy workers and flushed by the driver.
#[derive(Debug)]
pub struct Stats {
    counters: Mutex<StatsSnapshot>,
    store: tokio::sync::Mutex<KvStore>,
}

impl Stats {
    pub async fn open(path: impl Into<PathBuf>) -> DataorgResult<Self> {
        let store = KvStore::open(path).await?;

        let count = |key: &str| -> u64 {
            match store.get(key).map(|v| v.trim().parse::<u64>()) {
                Some(Ok(value)) => value,
                Some(Err(_)) => {
                    warn!("Ignoring unreadable stats value for {}", key);
                    0
                }
                None => 0,
            }
        };

        let counters = StatsSnapshot {
            files_copied: count(COPIED_FILES),
            files_failed: count(FAILED_FILES),
            files_skipped: count(SKIPPED_FILES),
            folders_skipped: count(SKIPPED_FOLDERS),
            duplicate_files: count(DUPLICATE_FILES),
            bytes_copied: store
                .get(TOTAL_COPIED_LENGTH)
                .and_then(parse_size)
                .unwrap_or(0),
        };
        debug!("Loaded stats from {:?}: {:?}", store.path(), counters);

        Ok(Self {
            counters: Mutex::new(counters),
            store: tokio::sync::Mutex::new(store),
        })
    }

    pub fn record_copied(&self, bytes: u64) {
        let mut counters = self.counters.lock();
        counters.files_copied += 1;
        counters.bytes_copied += bytes;
    }

    pub fn record_failed(&self) {
        self.counters.lock().files_failed += 1;
    }

    pub fn record_skipped_file(&self) {
        self.counters.lock().files_skipped += 1;
    }

    pub fn record_skipped_folder(&self) {
        self.counters.lock().folders_skipped += 1;
    }

    pub fn record_duplicate(&self) {
        self.counters.lock().duplicate_files += 1;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        *self.counters.lock()
    }

    pub async fn flush(&self) -> DataorgResult<()> {
        let snapshot = self.snapshot();
        let mut store = self.store.lock().await;

        store.set(COPIED_FILES, snapshot.files_copied.to_string());
        store.set(FAILED_FILES, snapshot.files_failed.to_string());
        store.set(SKIPPED_FILES, snapshot.files_skipped.to_string());
        store.set(SKIPPED_FOLDERS, snapshot.folders_skipped.to_string());
        store.set(DUPLICATE_FILES, snapshot.duplicate_files.to_string());
        store.set(TOTAL_COPIED_LENGTH, format_bytes(snapshot.bytes_copied));

        store.flush().await.map_err(|e| DataorgError::StatsWriteFailed {
            path: store.path().to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub async fn close(self) -> DataorgResult<StatsSnapshot> {
        self.flush().await?;
        Ok(self.snapshot())
    }
}
