use prometheus::{Counter, Histogram, IntCounter, Registry, Encoder, TextEncoder};
use std::path::Path;
use std::sync::Arc;

use crate::error::{DataorgError, DataorgResult};

#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    pub files_copied: IntCounter,
    pub files_failed: IntCounter,
    pub files_skipped: IntCounter,
    pub bytes_copied_total: Counter,
    pub rows_processed: IntCounter,
    pub rows_skipped: IntCounter,
    pub rows_quarantined: IntCounter,
    pub batch_duration: Histogram,
}

impl Metrics {
    pub fn new() -> DataorgResult<Self> {
        let registry = Arc::new(Registry::new());

        let files_copied = IntCounter::new("dataorg_files_copied_total", "Files copied to the target tree")?;
        let files_failed = IntCounter::new("dataorg_files_failed_total", "Files that failed to copy")?;
        let files_skipped = IntCounter::new("dataorg_files_skipped_total", "Files excluded or skipped as duplicates")?;
        let bytes_copied_total = Counter::new("dataorg_bytes_copied_total", "Total bytes copied")?;
        let rows_processed = IntCounter::new("dataorg_rows_processed_total", "Metadata rows processed")?;
        let rows_skipped = IntCounter::new("dataorg_rows_skipped_total", "Metadata rows skipped for missing id or source")?;
        let rows_quarantined = IntCounter::new("dataorg_rows_quarantined_total", "Metadata rows redirected to quarantine")?;
        let batch_duration = Histogram::with_opts(
            prometheus::HistogramOpts::new("dataorg_batch_duration_seconds", "Time taken to run one copy batch")
                .buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 600.0])
        )?;

        registry.register(Box::new(files_copied.clone()))?;
        registry.register(Box::new(files_failed.clone()))?;
        registry.register(Box::new(files_skipped.clone()))?;
        registry.register(Box::new(bytes_copied_total.clone()))?;
        registry.register(Box::new(rows_processed.clone()))?;
        registry.register(Box::new(rows_skipped.clone()))?;
        registry.register(Box::new(rows_quarantined.clone()))?;
        registry.register(Box::new(batch_duration.clone()))?;

        Ok(Self {
            registry,
            files_copied,
            files_failed,
            files_skipped,
            bytes_copied_total,
            rows_processed,
            rows_skipped,
            rows_quarantined,
            batch_duration,
        })
    }

    pub fn export(&self) -> DataorgResult<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| DataorgError::MonitoringError {
            reason: e.to_string(),
        })
    }

    /// Write the text exposition to `path` (node_exporter textfile style).
    pub async fn write_to(&self, path: &Path) -> DataorgResult<()> {
        let text = self.export()?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, text).await?;
        Ok(())
    }

    pub fn record_file_copied(&self, bytes_copied: u64) {
        self.files_copied.inc();
        self.bytes_copied_total.inc_by(bytes_copied as f64);
    }

    pub fn record_file_failed(&self) {
        self.files_failed.inc();
    }

    pub fn record_file_skipped(&self) {
        self.files_skipped.inc();
    }
}
