use chrono::Local;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::{DataorgError, DataorgResult};

pub const COPIED_LOG: &str = "copied.log";
pub const FAILED_LOG: &str = "failed.log";
pub const SKIPPED_LOG: &str = "skipped.log";

/// One append-only text log; each entry is written as a whole line.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl AuditLog {
    pub async fn open(path: impl Into<PathBuf>) -> DataorgResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, line: &str) -> DataorgResult<()> {
        let mut entry = String::with_capacity(line.len() + 1);
        entry.push_str(line);
        entry.push('\n');

        let mut file = self.file.lock().await;
        let result = async {
            file.write_all(entry.as_bytes()).await?;
            file.flush().await
        }
        .await;

        result.map_err(|e| DataorgError::AuditWriteFailed {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }
}

/// The copied, failed and skipped logs of a run.
#[derive(Debug)]
pub struct AuditLogs {
    pub copied: AuditLog,
    pub failed: AuditLog,
    pub skipped: AuditLog,
}

impl AuditLogs {
    pub async fn open(log_dir: &Path) -> DataorgResult<Self> {
        Ok(Self {
            copied: AuditLog::open(log_dir.join(COPIED_LOG)).await?,
            failed: AuditLog::open(log_dir.join(FAILED_LOG)).await?,
            skipped: AuditLog::open(log_dir.join(SKIPPED_LOG)).await?,
        })
    }

    pub async fn copied(&self, from: &Path, to: &Path) -> DataorgResult<()> {
        self.copied.append(&transfer_line(from, to)).await
    }

    pub async fn failed(&self, from: &Path, to: &Path) -> DataorgResult<()> {
        self.failed.append(&transfer_line(from, to)).await
    }

    pub async fn skipped(&self, path: &Path) -> DataorgResult<()> {
        self.skipped.append(&path.display().to_string()).await
    }
}

fn transfer_line(from: &Path, to: &Path) -> String {
    format!("{} -> {}", from.display(), to.display())
}

/// Rename `path` to `<path>-backup-<timestamp>` if it exists.
pub async fn backup_existing(path: &Path) -> DataorgResult<Option<PathBuf>> {
    if fs::symlink_metadata(path).await.is_err() {
        return Ok(None);
    }

    let stamp = Local::now().format("%Y-%m-%d %H-%M-%S-%3f");
    let mut backup = path.as_os_str().to_os_string();
    backup.push(format!("-backup-{}", stamp));
    let backup = PathBuf::from(backup);

    fs::rename(path, &backup).await?;
    info!("Backed up {:?} to {:?}", path, backup);
    Ok(Some(backup))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_entries_format() {
        let temp_dir = TempDir::new().unwrap();
        let logs = AuditLogs::open(&temp_dir.path().join("logs")).await.unwrap();

        logs.copied(Path::new("/src/a.mov"), Path::new("/dst/a.mov")).await.unwrap();
        logs.failed(Path::new("/src/b.mov"), Path::new("/dst/b.mov")).await.unwrap();
        logs.skipped(Path::new("/src/c.srt")).await.unwrap();

        let copied = tokio::fs::read_to_string(logs.copied.path()).await.unwrap();
        let failed = tokio::fs::read_to_string(logs.failed.path()).await.unwrap();
        let skipped = tokio::fs::read_to_string(logs.skipped.path()).await.unwrap();
        assert_eq!(copied, "/src/a.mov -> /dst/a.mov\n");
        assert_eq!(failed, "/src/b.mov -> /dst/b.mov\n");
        assert_eq!(skipped, "/src/c.srt\n");
    }

    #[tokio::test]
    async fn test_concurrent_appends_keep_whole_lines() {
        let temp_dir = TempDir::new().unwrap();
        let log = Arc::new(AuditLog::open(temp_dir.path().join("copied.log")).await.unwrap());

        let mut handles = Vec::new();
        for worker in 0..4 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..50 {
                    log.append(&format!("/src/{}-{} -> /dst/{}-{}", worker, i, worker, i))
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let contents = tokio::fs::read_to_string(log.path()).await.unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 200);
        assert!(lines.iter().all(|l| l.starts_with("/src/") && l.contains(" -> /dst/")));
    }

    #[tokio::test]
    async fn test_backup_existing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("copied.log");

        assert!(backup_existing(&path).await.unwrap().is_none());

        tokio::fs::write(&path, b"old run\n").await.unwrap();
        let backup = backup_existing(&path).await.unwrap().unwrap();
        assert!(!path.exists());
        assert!(backup.to_string_lossy().contains("copied.log-backup-"));
        assert_eq!(tokio::fs::read_to_string(&backup).await.unwrap(), "old run\n");
    }
}
