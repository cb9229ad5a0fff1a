use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::batch::{Batch, BatchReport, WorkerPool};
use crate::checkpoint::CheckpointStore;
use crate::collision::{exists_on_disk, ClaimSet};
use crate::config::Config;
use crate::copy_task::{CopyContext, CopyTask};
use crate::error::{DataorgError, DataorgResult};
use crate::filter::ExclusionFilter;
use crate::row::Row;
use crate::template::{resolve, PathTemplate, Resolution, Sanitizer};
use crate::verify::{ChecksumAlgorithm, FileVerifier};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingId,
    /// The id is not a single folder name under the source root.
    InvalidId(String),
    MissingSource(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    /// Nothing to migrate for this row; not an error.
    Skipped(SkipReason),
    Processed {
        target_dir: PathBuf,
        quarantined: bool,
        files_queued: usize,
        report: BatchReport,
    },
}

impl RowOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, RowOutcome::Skipped(_))
    }
}

/// Settings that decide where a row's files go and which are left out.
#[derive(Debug, Clone)]
pub struct RowLayout {
    pub source_root: PathBuf,
    pub target_root: PathBuf,
    pub quarantine_dir: PathBuf,
    pub id_column: String,
    pub template: PathTemplate,
    pub optional_keys: HashSet<String>,
    pub sanitizer: Sanitizer,
    pub filter: ExclusionFilter,
}

impl RowLayout {
    pub fn from_config(config: &Config) -> DataorgResult<Self> {
        Ok(Self {
            source_root: config.source_root.clone(),
            target_root: config.target_root.clone(),
            quarantine_dir: config.quarantine_dir(),
            id_column: config.id_column.clone(),
            template: config.template(),
            optional_keys: config.optional_keys(),
            sanitizer: config.sanitizer()?,
            filter: config.exclusion_filter()?,
        })
    }

    pub fn row_id<'a>(&self, row: &'a Row) -> Option<&'a str> {
        row.get(&self.id_column)
    }

    /// Folder holding the files of `id`, or `None` when the id would point
    /// anywhere other than a folder inside the source root.
    pub fn source_dir(&self, id: &str) -> Option<PathBuf> {
        let mut components = Path::new(id).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Some(self.source_root.join(id)),
            _ => None,
        }
    }

    pub fn resolve(&self, row: &Row) -> Resolution {
        resolve(
            &self.template,
            &self.optional_keys,
            row,
            &self.target_root,
            &self.sanitizer,
        )
    }
}

#[derive(Debug, Clone)]
pub struct DuplicateCheck {
    pub enabled: bool,
    pub algorithm: ChecksumAlgorithm,
    pub block_size: usize,
    pub shallow: bool,
}

impl DuplicateCheck {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled: config.skip_duplicates,
            algorithm: config.checksum_scheme,
            block_size: config.copy_block_size,
            shallow: config.shallow_file_comparison,
        }
    }
}

/// Turns one metadata row into copy batches and moves the checkpoint past it.
pub struct RowProcessor {
    layout: RowLayout,
    duplicates: DuplicateCheck,
    ctx: CopyContext,
    pool: WorkerPool,
    batch_size: usize,
    claims: ClaimSet,
    checkpoint: CheckpointStore,
    input_id: String,
}

impl RowProcessor {
    pub fn new(
        config: &Config,
        ctx: CopyContext,
        checkpoint: CheckpointStore,
        input_id: impl Into<String>,
    ) -> DataorgResult<Self> {
        Ok(Self {
            layout: RowLayout::from_config(config)?,
            duplicates: DuplicateCheck::from_config(config),
            ctx,
            pool: WorkerPool::new(config.copy_threads),
            batch_size: config.batch_size,
            claims: ClaimSet::new(),
            checkpoint,
            input_id: input_id.into(),
        })
    }

    pub fn checkpoint(&self) -> &CheckpointStore {
        &self.checkpoint
    }

    pub fn context(&self) -> &CopyContext {
        &self.ctx
    }

    fn fail_fast(&self) -> bool {
        self.ctx.options.fail_fast
    }

    pub async fn process_row(&mut self, row: &Row, index: u64) -> DataorgResult<RowOutcome> {
        let outcome = self.migrate_row(row, index).await?;

        self.checkpoint.advance(&self.input_id, index).await?;
        if let Err(e) = self.ctx.stats.flush().await {
            warn!("Stats not saved after row {}: {}", index, e);
        }

        match &outcome {
            RowOutcome::Skipped(_) => self.ctx.metrics.rows_skipped.inc(),
            RowOutcome::Processed { quarantined, .. } => {
                self.ctx.metrics.rows_processed.inc();
                if *quarantined {
                    self.ctx.metrics.rows_quarantined.inc();
                }
            }
        }

        Ok(outcome)
    }

    async fn migrate_row(&mut self, row: &Row, index: u64) -> DataorgResult<RowOutcome> {
        let Some(id) = self.layout.row_id(row) else {
            warn!("Row {} has no {}, skipping", index, self.layout.id_column);
            return Ok(RowOutcome::Skipped(SkipReason::MissingId));
        };

        let Some(source_dir) = self.layout.source_dir(id) else {
            error!("Row {} has {} {:?}, which is not a folder name, skipping", index, self.layout.id_column, id);
            self.ctx.stats.record_skipped_folder();
            return Ok(RowOutcome::Skipped(SkipReason::InvalidId(id.to_string())));
        };
        if !source_dir.is_dir() {
            error!(
                "Source folder {:?} is not present, skipping the row index {}",
                source_dir, index
            );
            self.ctx.stats.record_skipped_folder();
            return Ok(RowOutcome::Skipped(SkipReason::MissingSource(source_dir)));
        }

        let resolution = self.layout.resolve(row);
        let target_dir = resolution.target_dir(&self.layout.quarantine_dir).to_path_buf();
        if let Resolution::Quarantined { missing_key } = &resolution {
            warn!(
                "Row {} ({}) is missing {:?}, moving its files to {:?}",
                index, id, missing_key, target_dir
            );
        }

        self.create_target_dir(&target_dir).await?;

        info!("Row {}: copying {:?} into {:?}", index, source_dir, target_dir);
        let (files_queued, report) = self.copy_tree(&source_dir, &target_dir).await?;

        Ok(RowOutcome::Processed {
            target_dir,
            quarantined: resolution.is_quarantined(),
            files_queued,
            report,
        })
    }

    async fn create_target_dir(&self, target_dir: &Path) -> DataorgResult<()> {
        match tokio::fs::create_dir_all(target_dir).await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!("Failed to create the folder path {:?}: {}", target_dir, e);
                if self.fail_fast() {
                    return Err(DataorgError::DirectoryCreateFailed {
                        path: target_dir.to_path_buf(),
                        reason: e.to_string(),
                    });
                }
                // every copy into it will fail and be logged
                Ok(())
            }
        }
    }

    async fn copy_tree(&mut self, source_dir: &Path, target_dir: &Path) -> DataorgResult<(usize, BatchReport)> {
        let mut batch = Batch::new(self.batch_size);
        let mut report = BatchReport::default();
        let mut files_queued = 0usize;

        let mut walker = WalkDir::new(source_dir).sort_by_file_name().into_iter();
        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().unwrap_or(source_dir).to_path_buf();
                    error!("Failed to read {:?}: {}", path, e);
                    if self.fail_fast() {
                        self.claims.clear();
                        return Err(DataorgError::WalkFailed {
                            path,
                            reason: e.to_string(),
                        });
                    }
                    continue;
                }
            };

            let path = entry.path();
            if entry.path_is_symlink() && path.is_dir() {
                info!("Skipping linked folder {:?}", path);
                self.ctx.audit.skipped(path).await.or_else(|e| self.soft(e))?;
                self.ctx.stats.record_skipped_folder();
                continue;
            }
            if entry.file_type().is_dir() {
                if self.layout.filter.is_excluded_dir(path) {
                    info!("Skipping sub-path {:?}, matched an exclude pattern", path);
                    self.ctx.audit.skipped(path).await.or_else(|e| self.soft(e))?;
                    self.ctx.stats.record_skipped_folder();
                    walker.skip_current_dir();
                }
                continue;
            }

            if self.layout.filter.is_excluded(path) {
                info!("Skipping file {:?} per exclude patterns and file types", path);
                self.ctx.audit.skipped(path).await.or_else(|e| self.soft(e))?;
                self.ctx.stats.record_skipped_file();
                self.ctx.metrics.record_file_skipped();
                continue;
            }

            let Some(task) = self.plan_copy(path, target_dir).await? else {
                continue;
            };

            files_queued += 1;
            if batch.push(task) {
                report.merge(self.flush(&mut batch).await?);
                info!("Completed copy batch for files inside {:?}", source_dir);
            }
        }

        if !batch.is_empty() {
            report.merge(self.flush(&mut batch).await?);
        }

        debug!(
            "Finished {:?}: {} queued, {} copied, {} failed",
            source_dir, files_queued, report.copied, report.failed
        );
        Ok((files_queued, report))
    }

    /// Pick the destination for one source file, or `None` when it is
    /// skipped as a duplicate or has no free name.
    async fn plan_copy(&self, path: &Path, target_dir: &Path) -> DataorgResult<Option<CopyTask>> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let candidate = target_dir.join(self.layout.sanitizer.file_name(&file_name));

        if self.duplicates.enabled
            && !self.claims.contains(&candidate)
            && exists_on_disk(&candidate)
            && FileVerifier::same_file(
                path,
                &candidate,
                self.duplicates.algorithm,
                self.duplicates.block_size,
                self.duplicates.shallow,
            )
            .await
        {
            info!("Skipping duplicate file {:?}, same content at {:?}", path, candidate);
            self.ctx.audit.skipped(path).await.or_else(|e| self.soft(e))?;
            self.ctx.stats.record_duplicate();
            self.ctx.metrics.record_file_skipped();
            return Ok(None);
        }

        match self.claims.claim(&candidate, exists_on_disk) {
            Ok(target) => Ok(Some(CopyTask::new(path, target))),
            Err(e) => {
                error!("{}", e);
                self.ctx.stats.record_failed();
                self.ctx.metrics.record_file_failed();
                self.ctx.audit.failed(path, &candidate).await.or_else(|e| self.soft(e))?;
                if self.fail_fast() {
                    self.claims.clear();
                    return Err(e);
                }
                Ok(None)
            }
        }
    }

    async fn flush(&self, batch: &mut Batch) -> DataorgResult<BatchReport> {
        let result = self.pool.run_batch(batch.take(), &self.ctx).await;
        self.claims.clear();
        result
    }

    // Audit write failures only stop the run under fail-fast.
    fn soft(&self, e: DataorgError) -> DataorgResult<()> {
        if self.fail_fast() {
            Err(e)
        } else {
            warn!("{}", e);
            Ok(())
        }
    }
}
