pub mod audit;
pub mod batch;
pub mod checkpoint;
pub mod collision;
pub mod config;
pub mod copy_task;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod migration;
pub mod processor;
pub mod row;
pub mod source;
pub mod stats;
pub mod template;
pub mod utils;
pub mod verify;

// Re-export commonly used types
pub use audit::AuditLogs;
pub use batch::{Batch, BatchReport, WorkerPool};
pub use checkpoint::CheckpointStore;
pub use collision::ClaimSet;
pub use config::Config;
pub use copy_task::{CopyContext, CopyOptions, CopyOutcome, CopyStrategy, CopyTask};
pub use error::{DataorgError, DataorgResult, ErrorSeverity};
pub use filter::ExclusionFilter;
pub use metrics::Metrics;
pub use migration::{Migration, MigrationStatus, RowPreview, RunSummary};
pub use processor::{RowOutcome, RowProcessor, SkipReason};
pub use row::Row;
pub use source::CsvSource;
pub use stats::{Stats, StatsSnapshot};
pub use template::{PathTemplate, Resolution, Sanitizer};
pub use verify::{ChecksumAlgorithm, FileVerifier};
