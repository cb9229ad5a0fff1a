use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::copy_task::{CopyContext, CopyOutcome, CopyTask};
use crate::error::{DataorgError, DataorgResult};

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_COPY_THREADS: usize = 3;

/// Tasks collected from the walk, submitted once the ceiling is reached.
#[derive(Debug)]
pub struct Batch {
    tasks: Vec<CopyTask>,
    ceiling: usize,
}

impl Batch {
    pub fn new(ceiling: usize) -> Self {
        let ceiling = ceiling.max(1);
        Self {
            tasks: Vec::with_capacity(ceiling.min(DEFAULT_BATCH_SIZE)),
            ceiling,
        }
    }

    /// Returns true once the batch should be submitted.
    pub fn push(&mut self, task: CopyTask) -> bool {
        self.tasks.push(task);
        self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.tasks.len() >= self.ceiling
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn take(&mut self) -> Vec<CopyTask> {
        std::mem::take(&mut self.tasks)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub copied: usize,
    pub failed: usize,
    pub bytes_copied: u64,
}

impl BatchReport {
    pub fn merge(&mut self, other: BatchReport) {
        self.copied += other.copied;
        self.failed += other.failed;
        self.bytes_copied += other.bytes_copied;
    }
}

/// Fixed number of copy workers shared by every batch of a run.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run every task and wait for all of them. The first error seen is
    /// returned only after the whole batch is terminal.
    pub async fn run_batch(&self, tasks: Vec<CopyTask>, ctx: &CopyContext) -> DataorgResult<BatchReport> {
        if tasks.is_empty() {
            return Ok(BatchReport::default());
        }

        let start_time = Instant::now();
        let total = tasks.len();
        info!("Submitting batch of {} files to {} workers", total, self.size);

        let mut join_set = JoinSet::new();
        for task in tasks {
            let permits = self.permits.clone();
            let ctx = ctx.clone();
            join_set.spawn(async move {
                let _permit = permits.acquire_owned().await.map_err(|e| DataorgError::InternalError {
                    message: format!("worker pool closed: {}", e),
                })?;
                task.run(&ctx).await
            });
        }

        let mut report = BatchReport::default();
        let mut first_error: Option<DataorgError> = None;

        while let Some(joined) = join_set.join_next().await {
            let result = joined.unwrap_or_else(|e| {
                Err(DataorgError::InternalError {
                    message: format!("copy worker panicked: {}", e),
                })
            });

            match result {
                Ok(CopyOutcome::Copied { bytes }) => {
                    report.copied += 1;
                    report.bytes_copied += bytes;
                }
                Ok(CopyOutcome::Failed { .. }) => report.failed += 1,
                Err(e) => {
                    if matches!(e, DataorgError::CopyFailed { .. }) {
                        report.failed += 1;
                    }
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        let elapsed = start_time.elapsed();
        ctx.metrics.batch_duration.observe(elapsed.as_secs_f64());
        debug!(
            "Batch finished in {:.3}s: {} copied, {} failed",
            elapsed.as_secs_f64(),
            report.copied,
            report.failed
        );

        match first_error {
            Some(e) => {
                error!("Batch of {} files aborted: {}", total, e);
                Err(e)
            }
            None => Ok(report),
        }
    }
}
