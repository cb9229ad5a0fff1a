use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, error, info, warn};

use crate::audit::AuditLogs;
use crate::error::{DataorgError, DataorgResult};
use crate::metrics::Metrics;
use crate::stats::Stats;
use crate::verify::DEFAULT_BLOCK_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyStrategy {
    /// Stream through a fixed-size buffer.
    Chunked,
    /// Copy into a sibling temp file, keep permissions and timestamps, then
    /// rename over the target.
    WholeFile,
}

#[derive(Debug, Clone)]
pub struct CopyOptions {
    pub block_size: usize,
    pub strategy: CopyStrategy,
    pub fail_fast: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            strategy: CopyStrategy::Chunked,
            fail_fast: true,
        }
    }
}

/// Everything a copy worker needs besides the two paths.
#[derive(Clone)]
pub struct CopyContext {
    pub options: CopyOptions,
    pub stats: Arc<Stats>,
    pub audit: Arc<AuditLogs>,
    pub metrics: Metrics,
}

impl CopyContext {
    pub fn new(options: CopyOptions, stats: Arc<Stats>, audit: Arc<AuditLogs>, metrics: Metrics) -> Self {
        Self {
            options,
            stats,
            audit,
            metrics,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    Copied { bytes: u64 },
    Failed { reason: String },
}

impl CopyOutcome {
    pub fn is_copied(&self) -> bool {
        matches!(self, CopyOutcome::Copied { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyTask {
    pub from: PathBuf,
    pub to: PathBuf,
}

impl CopyTask {
    pub fn new(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Copy one file and record the outcome. With fail-fast, a failure is
    /// recorded first and then returned as `CopyFailed`.
    pub async fn run(&self, ctx: &CopyContext) -> DataorgResult<CopyOutcome> {
        info!("Starting copy file {:?} to {:?}", self.from, self.to);

        let transfer = match ctx.options.strategy {
            CopyStrategy::Chunked => copy_chunked(&self.from, &self.to, ctx.options.block_size).await,
            CopyStrategy::WholeFile => copy_whole_file(&self.from, &self.to).await,
        };

        self.settle(transfer, ctx).await
    }

    /// Decide the outcome from the transfer result and the on-disk lengths.
    /// A destination whose length differs from the source is never kept.
    pub(crate) async fn settle(
        &self,
        transfer: io::Result<u64>,
        ctx: &CopyContext,
    ) -> DataorgResult<CopyOutcome> {
        let source_len = fs::metadata(&self.from).await.map(|m| m.len());
        let dest_len = fs::metadata(&self.to).await.ok().map(|m| m.len());

        let failure = match (&transfer, &source_len, dest_len) {
            (Err(e), _, _) => Some(e.to_string()),
            (Ok(_), Err(e), _) => Some(format!("cannot read source metadata: {}", e)),
            (Ok(_), Ok(src), Some(dst)) if *src == dst => None,
            (Ok(_), Ok(src), dst) => Some(format!(
                "size mismatch: source {} bytes, destination {} bytes",
                src,
                dst.unwrap_or(0)
            )),
        };

        match failure {
            None => {
                let bytes = dest_len.unwrap_or(0);
                info!("Completed file copy from {:?} to {:?} ({} bytes)", self.from, self.to, bytes);
                ctx.stats.record_copied(bytes);
                ctx.metrics.record_file_copied(bytes);
                self.audit(ctx.audit.copied(&self.from, &self.to).await, ctx)?;
                Ok(CopyOutcome::Copied { bytes })
            }
            Some(reason) => {
                if dest_len.is_some() {
                    if let Err(e) = fs::remove_file(&self.to).await {
                        warn!("Could not remove partial file {:?}: {}", self.to, e);
                    }
                }

                error!("Failed to copy file {:?} to the destination {:?}: {}", self.from, self.to, reason);
                ctx.stats.record_failed();
                ctx.metrics.record_file_failed();
                self.audit(ctx.audit.failed(&self.from, &self.to).await, ctx)?;

                if ctx.options.fail_fast {
                    return Err(DataorgError::CopyFailed {
                        source_path: self.from.clone(),
                        target_path: self.to.clone(),
                        reason,
                    });
                }
                Ok(CopyOutcome::Failed { reason })
            }
        }
    }

    fn audit(&self, written: DataorgResult<()>, ctx: &CopyContext) -> DataorgResult<()> {
        match written {
            Ok(()) => Ok(()),
            Err(e) if ctx.options.fail_fast => Err(e),
            Err(e) => {
                warn!("Audit entry for {:?} lost: {}", self.from, e);
                Ok(())
            }
        }
    }
}

pub async fn copy_chunked(from: &Path, to: &Path, block_size: usize) -> io::Result<u64> {
    let source_file = fs::File::open(from).await?;
    copy_stream(source_file, to, block_size).await
}

/// Write everything `reader` yields into a freshly created `to`.
pub async fn copy_stream<R>(mut reader: R, to: &Path, block_size: usize) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let block_size = if block_size == 0 { DEFAULT_BLOCK_SIZE } else { block_size };
    let mut dest_file = fs::File::create(to).await?;
    let mut buffer = vec![0u8; block_size];
    let mut total_bytes = 0u64;
    let start_time = std::time::Instant::now();

    loop {
        let bytes_read = reader.read(&mut buffer).await?;
        if bytes_read == 0 {
            break;
        }
        dest_file.write_all(&buffer[..bytes_read]).await?;
        total_bytes += bytes_read as u64;
    }

    dest_file.flush().await?;

    let elapsed = start_time.elapsed();
    debug!("Chunked copy completed: {} bytes in {:.3}s", total_bytes, elapsed.as_secs_f64());
    Ok(total_bytes)
}

pub async fn copy_whole_file(from: &Path, to: &Path) -> io::Result<u64> {
    let tmp_path = partial_path(to);

    let result = async {
        // fs::copy carries the permission bits over
        let bytes = fs::copy(from, &tmp_path).await?;
        copy_timestamps(from, &tmp_path).await;
        fs::rename(&tmp_path, to).await?;
        Ok(bytes)
    }
    .await;

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path).await;
    }
    result
}

fn partial_path(to: &Path) -> PathBuf {
    let name = to
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    to.with_file_name(format!(".{}.dataorg-part", name))
}

#[cfg(unix)]
async fn copy_timestamps(source: &Path, destination: &Path) {
    use nix::sys::stat::{utimensat, UtimensatFlags};
    use nix::sys::time::TimeSpec;

    let metadata = match fs::metadata(source).await {
        Ok(metadata) => metadata,
        Err(e) => {
            debug!("Could not read timestamps of {:?}: {}", source, e);
            return;
        }
    };

    let mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    let atime = metadata.accessed().unwrap_or(mtime);

    let atime_spec = TimeSpec::from(atime.duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default());
    let mtime_spec = TimeSpec::from(mtime.duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default());

    if let Err(e) = utimensat(None, destination, &atime_spec, &mtime_spec, UtimensatFlags::FollowSymlink) {
        warn!("Could not set timestamps for {:?}: {}", destination, e);
    }
}

#[cfg(not(unix))]
async fn copy_timestamps(source: &Path, destination: &Path) {
    let modified = match fs::metadata(source).await.and_then(|m| m.modified()) {
        Ok(modified) => modified,
        Err(_) => return,
    };
    let destination = destination.to_path_buf();
    let _ = tokio::task::spawn_blocking(move || {
        std::fs::File::options()
            .write(true)
            .open(&destination)
            .and_then(|f| f.set_modified(modified))
    })
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tempfile::TempDir;
    use tokio::io::ReadBuf;

    struct BrokenPipe;

    impl AsyncRead for BrokenPipe {
        fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "device went away")))
        }
    }

    async fn context(root: &Path, fail_fast: bool, strategy: CopyStrategy) -> CopyContext {
        let stats = Arc::new(Stats::open(root.join("stats.json")).await.unwrap());
        let audit = Arc::new(AuditLogs::open(&root.join("logs")).await.unwrap());
        let options = CopyOptions {
            block_size: 16,
            strategy,
            fail_fast,
        };
        CopyContext::new(options, stats, audit, Metrics::new().unwrap())
    }

    #[tokio::test]
    async fn test_both_strategies_produce_identical_files() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source.bin");
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        tokio::fs::write(&source, &data).await.unwrap();

        for (strategy, name) in [(CopyStrategy::Chunked, "chunked.bin"), (CopyStrategy::WholeFile, "whole.bin")] {
            let ctx = context(temp_dir.path(), true, strategy).await;
            let dest = temp_dir.path().join(name);
            let outcome = CopyTask::new(&source, &dest).run(&ctx).await.unwrap();
            assert_eq!(outcome, CopyOutcome::Copied { bytes: 1000 });
            assert_eq!(tokio::fs::read(&dest).await.unwrap(), data);
        }

        assert!(!temp_dir.path().join(".whole.bin.dataorg-part").exists());
        let copied = tokio::fs::read_to_string(temp_dir.path().join("logs/copied.log")).await.unwrap();
        assert_eq!(copied.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_truncated_copy_is_deleted_and_failed() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source.bin");
        let dest = temp_dir.path().join("dest.bin");
        let data = vec![7u8; 100];
        tokio::fs::write(&source, &data).await.unwrap();

        let ctx = context(temp_dir.path(), false, CopyStrategy::Chunked).await;
        let task = CopyTask::new(&source, &dest);

        // the stream ends quietly after 40 bytes
        let transfer = copy_stream(&data[..40], &dest, 16).await;
        assert_eq!(transfer.as_ref().unwrap(), &40);
        assert_eq!(tokio::fs::metadata(&dest).await.unwrap().len(), 40);

        let outcome = task.settle(transfer, &ctx).await.unwrap();
        assert!(matches!(outcome, CopyOutcome::Failed { .. }));
        assert!(!dest.exists());
        assert_eq!(ctx.stats.snapshot().files_failed, 1);
        assert_eq!(ctx.stats.snapshot().files_copied, 0);

        let failed = tokio::fs::read_to_string(temp_dir.path().join("logs/failed.log")).await.unwrap();
        assert_eq!(failed, format!("{} -> {}\n", source.display(), dest.display()));
    }

    #[tokio::test]
    async fn test_interrupted_copy_fails_fast() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source.bin");
        let dest = temp_dir.path().join("dest.bin");
        let data = vec![1u8; 100];
        tokio::fs::write(&source, &data).await.unwrap();

        let ctx = context(temp_dir.path(), true, CopyStrategy::Chunked).await;
        let task = CopyTask::new(&source, &dest);

        let transfer = copy_stream((&data[..40]).chain(BrokenPipe), &dest, 16).await;
        assert!(transfer.is_err());

        let err = task.settle(transfer, &ctx).await.unwrap_err();
        assert!(matches!(err, DataorgError::CopyFailed { .. }));
        assert!(!dest.exists());
        assert_eq!(ctx.stats.snapshot().files_failed, 1);
    }

    #[tokio::test]
    async fn test_missing_source_fails() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context(temp_dir.path(), false, CopyStrategy::Chunked).await;
        let task = CopyTask::new(temp_dir.path().join("nope"), temp_dir.path().join("out"));

        let outcome = task.run(&ctx).await.unwrap();
        assert!(!outcome.is_copied());
        assert!(!temp_dir.path().join("out").exists());
    }
}
