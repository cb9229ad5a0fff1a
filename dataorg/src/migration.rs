use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::audit::{backup_existing, AuditLogs, COPIED_LOG, FAILED_LOG, SKIPPED_LOG};
use crate::checkpoint::CheckpointStore;
use crate::config::Config;
use crate::copy_task::CopyContext;
use crate::error::{DataorgError, DataorgResult};
use crate::metrics::Metrics;
use crate::processor::{RowLayout, RowOutcome, RowProcessor};
use crate::row::Row;
use crate::source::{input_id, CsvSource};
use crate::stats::{Stats, StatsSnapshot};
use crate::template::Resolution;

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub input_id: String,
    /// Checkpoint the run started from; 0 for a fresh run.
    pub resumed_from: u64,
    pub last_row: u64,
    pub rows_processed: u64,
    pub rows_skipped: u64,
    pub rows_quarantined: u64,
    pub stats: StatsSnapshot,
    #[serde(skip)]
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct RowPreview {
    pub index: u64,
    pub id: Option<String>,
    pub source_exists: bool,
    pub target_dir: Option<PathBuf>,
    pub quarantined: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    pub input_id: String,
    pub checkpoint: u64,
    pub stats: StatsSnapshot,
}

/// Drives a whole migration: one row at a time, in input order.
pub struct Migration {
    config: Config,
}

impl Migration {
    pub fn new(config: Config) -> DataorgResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn input_id(&self) -> String {
        input_id(&self.config.input_file)
    }

    pub async fn run(&self) -> DataorgResult<RunSummary> {
        let start_time = Instant::now();
        let source = CsvSource::open(&self.config.input_file, &self.config.date_format)?;
        let input_id = source.input_id();

        let checkpoint = CheckpointStore::open(self.config.checkpoint_path()).await?;
        let resumed_from = checkpoint.load(&input_id)?;
        if resumed_from == 0 {
            info!("Starting a fresh migration of {:?}", self.config.input_file);
            self.backup_previous_run().await?;
        } else {
            info!("Resuming migration of {:?} after row {}", self.config.input_file, resumed_from);
        }

        let metrics = Metrics::new()?;
        let stats = Arc::new(Stats::open(self.config.stats_path()).await?);
        let audit = Arc::new(AuditLogs::open(&self.config.log_dir()).await?);
        let ctx = CopyContext::new(self.config.copy_options(), stats.clone(), audit, metrics.clone());
        let mut processor = RowProcessor::new(&self.config, ctx, checkpoint, input_id.clone())?;

        let mut summary = RunSummary {
            input_id,
            resumed_from,
            last_row: resumed_from,
            ..RunSummary::default()
        };

        let result = self.drive(source, &mut processor, &mut summary).await;

        if let Err(e) = stats.flush().await {
            warn!("Final stats flush failed: {}", e);
        }
        if let Some(path) = &self.config.metrics_file {
            if let Err(e) = metrics.write_to(path).await {
                warn!("Could not write metrics to {:?}: {}", path, e);
            }
        }

        summary.stats = stats.snapshot();
        summary.elapsed = start_time.elapsed();
        result?;

        info!(
            "Migration finished at row {}: {} copied, {} failed, {} skipped in {:.1}s",
            summary.last_row,
            summary.stats.files_copied,
            summary.stats.files_failed,
            summary.stats.files_skipped,
            summary.elapsed.as_secs_f64()
        );
        Ok(summary)
    }

    async fn drive(
        &self,
        source: CsvSource,
        processor: &mut RowProcessor,
        summary: &mut RunSummary,
    ) -> DataorgResult<()> {
        for record in source {
            let (index, row) = match record {
                Ok(record) => record,
                Err(DataorgError::InputReadFailed { row, reason }) if !self.config.fail_fast => {
                    warn!("Skipping unreadable row {}: {}", row, reason);
                    (row, Row::new())
                }
                Err(e) => return Err(e),
            };

            if index <= summary.resumed_from {
                debug!("Row {} already done", index);
                continue;
            }

            match processor.process_row(&row, index).await? {
                RowOutcome::Skipped(_) => summary.rows_skipped += 1,
                RowOutcome::Processed { quarantined, .. } => {
                    summary.rows_processed += 1;
                    if quarantined {
                        summary.rows_quarantined += 1;
                    }
                }
            }
            summary.last_row = index;
        }
        Ok(())
    }

    /// A fresh run moves the previous run's logs and stats out of the way.
    async fn backup_previous_run(&self) -> DataorgResult<()> {
        let log_dir = self.config.log_dir();
        let previous = [
            log_dir.join(COPIED_LOG),
            log_dir.join(FAILED_LOG),
            log_dir.join(SKIPPED_LOG),
            self.config.stats_path(),
        ];
        for path in &previous {
            backup_existing(path).await?;
        }
        Ok(())
    }

    /// Where each row would go, without touching the target tree.
    pub fn preview(&self, limit: Option<usize>) -> DataorgResult<Vec<RowPreview>> {
        let layout = RowLayout::from_config(&self.config)?;
        let source = CsvSource::open(&self.config.input_file, &self.config.date_format)?;

        let mut previews = Vec::new();
        for record in source.take(limit.unwrap_or(usize::MAX)) {
            let (index, row) = record?;
            let id = layout.row_id(&row).map(str::to_string);

            let preview = match &id {
                None => RowPreview {
                    index,
                    id: None,
                    source_exists: false,
                    target_dir: None,
                    quarantined: false,
                },
                Some(guid) => {
                    let resolution = layout.resolve(&row);
                    RowPreview {
                        index,
                        id: id.clone(),
                        source_exists: layout.source_dir(guid).is_some_and(|dir| dir.is_dir()),
                        target_dir: Some(resolution.target_dir(&layout.quarantine_dir).to_path_buf()),
                        quarantined: matches!(resolution, Resolution::Quarantined { .. }),
                    }
                }
            };
            previews.push(preview);
        }
        Ok(previews)
    }

    pub async fn status(&self) -> DataorgResult<MigrationStatus> {
        let input_id = self.input_id();
        let checkpoint = CheckpointStore::open(self.config.checkpoint_path()).await?;
        let stats = Stats::open(self.config.stats_path()).await?;
        Ok(MigrationStatus {
            checkpoint: checkpoint.load(&input_id)?,
            input_id,
            stats: stats.snapshot(),
        })
    }

    /// Forget the checkpoint so the next run starts at row 1.
    pub async fn reset(&self) -> DataorgResult<()> {
        let mut checkpoint = CheckpointStore::open(self.config.checkpoint_path()).await?;
        checkpoint.reset(&self.input_id()).await
    }
}
