use std::path::PathBuf;
use thiserror::Error;

/// Error types for dataorg operations
#[derive(Error, Debug)]
pub enum DataorgError {
    // File system errors
    #[error("Failed to create directory {path}: {reason}")]
    DirectoryCreateFailed { path: PathBuf, reason: String },

    #[error("Copy failed: {source_path} -> {target_path}: {reason}")]
    CopyFailed {
        source_path: PathBuf,
        target_path: PathBuf,
        reason: String,
    },

    #[error("No free name for {path} after {attempts} suffixes")]
    CollisionLimitExceeded { path: PathBuf, attempts: u32 },

    #[error("Failed to read directory entry under {path}: {reason}")]
    WalkFailed { path: PathBuf, reason: String },

    // Durable state errors
    #[error("Failed to save checkpoint for {input_id}: {reason}")]
    CheckpointWriteFailed { input_id: String, reason: String },

    #[error("State file corrupted: {path} - {reason}")]
    StateCorrupted { path: PathBuf, reason: String },

    #[error("Failed to write stats to {path}: {reason}")]
    StatsWriteFailed { path: PathBuf, reason: String },

    #[error("Failed to write audit entry to {path}: {reason}")]
    AuditWriteFailed { path: PathBuf, reason: String },

    // Input errors
    #[error("Input file not found: {path}")]
    InputNotFound { path: PathBuf },

    #[error("Failed to read input row {row}: {reason}")]
    InputReadFailed { row: u64, reason: String },

    // Configuration errors
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("Invalid regex pattern: {pattern} - {reason}")]
    InvalidRegexPattern { pattern: String, reason: String },

    #[error("Monitoring error: {reason}")]
    MonitoringError { reason: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<prometheus::Error> for DataorgError {
    fn from(e: prometheus::Error) -> Self {
        DataorgError::MonitoringError {
            reason: e.to_string(),
        }
    }
}

impl DataorgError {
    /// Errors that leave durable progress untrustworthy
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DataorgError::CheckpointWriteFailed { .. }
                | DataorgError::StateCorrupted { .. }
                | DataorgError::InternalError { .. }
        )
    }

    /// Get the error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            DataorgError::InternalError { .. }
            | DataorgError::CheckpointWriteFailed { .. }
            | DataorgError::StateCorrupted { .. } => ErrorSeverity::Critical,
            DataorgError::CopyFailed { .. }
            | DataorgError::DirectoryCreateFailed { .. }
            | DataorgError::AuditWriteFailed { .. }
            | DataorgError::CollisionLimitExceeded { .. } => ErrorSeverity::High,
            DataorgError::StatsWriteFailed { .. } => ErrorSeverity::Low,
            DataorgError::InputNotFound { .. }
            | DataorgError::InvalidConfiguration { .. }
            | DataorgError::InvalidRegexPattern { .. } => ErrorSeverity::Medium,
            DataorgError::MonitoringError { .. } => ErrorSeverity::Low,
            _ => ErrorSeverity::Medium,
        }
    }

    /// Get suggested user action
    pub fn suggested_action(&self) -> &'static str {
        match self {
            DataorgError::InputNotFound { .. } => "Check the input_file path",
            DataorgError::DirectoryCreateFailed { .. } => {
                "Check permissions and free space under the target root"
            }
            DataorgError::CopyFailed { .. } => {
                "Inspect the failed log, fix the cause and rerun; the run resumes at the failed row"
            }
            DataorgError::CheckpointWriteFailed { .. } => {
                "Check that the state directory is writable before resuming"
            }
            DataorgError::InvalidRegexPattern { .. } => "Check regex pattern syntax",
            DataorgError::InvalidConfiguration { .. } => {
                "Fix the configuration file or command line options"
            }
            _ => "Check the error details and the run logs",
        }
    }

    /// Convert to exit code for CLI applications. Any error that ends a
    /// command is a failure, whatever its severity.
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Critical => 2,
            ErrorSeverity::High | ErrorSeverity::Medium | ErrorSeverity::Low => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Critical,
    High,
    Medium,
    Low,
}

/// Result type alias for dataorg operations
pub type DataorgResult<T> = Result<T, DataorgError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_severity() {
        let error = DataorgError::InputNotFound {
            path: PathBuf::from("/test.csv"),
        };
        assert_eq!(error.severity(), ErrorSeverity::Medium);
        assert_eq!(error.exit_code(), 1);

        let error = DataorgError::CheckpointWriteFailed {
            input_id: "input.csv".to_string(),
            reason: "disk full".to_string(),
        };
        assert_eq!(error.severity(), ErrorSeverity::Critical);
        assert_eq!(error.exit_code(), 2);

        let error = DataorgError::MonitoringError {
            reason: "registry".to_string(),
        };
        assert_eq!(error.severity(), ErrorSeverity::Low);
        assert_eq!(error.exit_code(), 1);

        let error = DataorgError::StatsWriteFailed {
            path: PathBuf::from("/state/stats.json"),
            reason: "read-only".to_string(),
        };
        assert_ne!(error.exit_code(), 0);
    }

    #[test]
    fn test_fatal_errors() {
        let fatal = DataorgError::CheckpointWriteFailed {
            input_id: "input.csv".to_string(),
            reason: "read-only".to_string(),
        };
        assert!(fatal.is_fatal());

        let copy = DataorgError::CopyFailed {
            source_path: PathBuf::from("/src/a"),
            target_path: PathBuf::from("/dst/a"),
            reason: "size mismatch".to_string(),
        };
        assert!(!copy.is_fatal());
        assert!(copy.to_string().contains("/src/a -> /dst/a"));
    }
}
