use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::batch::{DEFAULT_BATCH_SIZE, DEFAULT_COPY_THREADS};
use crate::copy_task::{CopyOptions, CopyStrategy};
use crate::error::{DataorgError, DataorgResult};
use crate::filter::ExclusionFilter;
use crate::source::DEFAULT_DATE_FORMAT;
use crate::template::{PathTemplate, Sanitizer};
use crate::verify::{ChecksumAlgorithm, DEFAULT_BLOCK_SIZE};

pub const CONFIG_PATH_ENV: &str = "DATAORG_CONFIG_PATH";
pub const DEFAULT_FOLDER_SEQUENCE: &str = "Decade->Series Title->Year->Episode Number;Episode Title";
pub const DEFAULT_ID_COLUMN: &str = "GUID";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub input_file: PathBuf,
    pub source_root: PathBuf,
    pub target_root: PathBuf,
    /// Defaults to `<target_root>/quarantine`.
    pub quarantine_dir: Option<PathBuf>,
    pub folder_sequence: String,
    pub optional_keys: Vec<String>,
    pub id_column: String,
    pub date_format: String,
    pub exclude_file_types: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub copy_block_size: usize,
    pub use_stream_copy: bool,
    pub copy_threads: usize,
    pub batch_size: usize,
    pub checksum_scheme: ChecksumAlgorithm,
    pub shallow_file_comparison: bool,
    /// Regex of characters stripped from template values and file names.
    pub replace_chars: String,
    pub fail_fast: bool,
    pub skip_duplicates: bool,
    pub state_dir: PathBuf,
    pub metrics_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_file: PathBuf::new(),
            source_root: PathBuf::new(),
            target_root: PathBuf::new(),
            quarantine_dir: None,
            folder_sequence: DEFAULT_FOLDER_SEQUENCE.to_string(),
            optional_keys: Vec::new(),
            id_column: DEFAULT_ID_COLUMN.to_string(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            exclude_file_types: Vec::new(),
            exclude_patterns: Vec::new(),
            copy_block_size: DEFAULT_BLOCK_SIZE,
            use_stream_copy: true,
            copy_threads: DEFAULT_COPY_THREADS,
            batch_size: DEFAULT_BATCH_SIZE,
            checksum_scheme: ChecksumAlgorithm::default(),
            shallow_file_comparison: false,
            replace_chars: String::new(),
            fail_fast: true,
            skip_duplicates: false,
            state_dir: default_state_dir(),
            metrics_file: None,
        }
    }
}

fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dataorg")
}

impl Config {
    /// Load from `explicit`, else `$DATAORG_CONFIG_PATH`, else the user config
    /// directory. Only an explicitly named file has to exist.
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config file {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file {:?}", path))?;
            info!("Loaded configuration from {:?}", path);
            return Ok(config);
        }

        let config_path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .ok()
            .or_else(|| dirs::config_dir().map(|d| d.join("dataorg").join("config.toml")));

        let Some(config_path) = config_path else {
            warn!("No configuration directory available. Using default settings.");
            return Ok(Config::default());
        };

        match tokio::fs::read_to_string(&config_path).await {
            Ok(content) => {
                let config: Config = toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file {:?}", config_path))?;
                info!("Loaded configuration from {:?}", config_path);
                Ok(config)
            }
            Err(_) => {
                warn!("Configuration file not found at {:?}. Using default settings.", config_path);
                Ok(Config::default())
            }
        }
    }

    pub fn validate(&self) -> DataorgResult<()> {
        let required = [
            ("input_file", &self.input_file),
            ("source_root", &self.source_root),
            ("target_root", &self.target_root),
        ];
        for (field, path) in required {
            if path.as_os_str().is_empty() {
                return Err(invalid(field, "must be set"));
            }
        }
        if !self.source_root.is_dir() {
            return Err(invalid("source_root", format!("{:?} is not a directory", self.source_root)));
        }
        if self.copy_block_size == 0 {
            return Err(invalid("copy_block_size", "must be greater than zero"));
        }
        if self.copy_threads == 0 {
            return Err(invalid("copy_threads", "must be greater than zero"));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "must be greater than zero"));
        }
        if self.id_column.trim().is_empty() {
            return Err(invalid("id_column", "must not be empty"));
        }

        self.sanitizer()?;
        self.exclusion_filter()?;
        Ok(())
    }

    pub fn quarantine_dir(&self) -> PathBuf {
        self.quarantine_dir
            .clone()
            .unwrap_or_else(|| self.target_root.join("quarantine"))
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.state_dir.join("checkpoint.json")
    }

    pub fn stats_path(&self) -> PathBuf {
        self.state_dir.join("stats.json")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.state_dir.join("logs")
    }

    pub fn template(&self) -> PathTemplate {
        PathTemplate::parse(&self.folder_sequence)
    }

    pub fn optional_keys(&self) -> HashSet<String> {
        self.optional_keys
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect()
    }

    pub fn sanitizer(&self) -> DataorgResult<Sanitizer> {
        Sanitizer::new(&self.replace_chars)
    }

    pub fn exclusion_filter(&self) -> DataorgResult<ExclusionFilter> {
        ExclusionFilter::new(self.exclude_file_types.as_slice(), self.exclude_patterns.as_slice())
    }

    pub fn copy_options(&self) -> CopyOptions {
        CopyOptions {
            block_size: self.copy_block_size,
            strategy: if self.use_stream_copy {
                CopyStrategy::Chunked
            } else {
                CopyStrategy::WholeFile
            },
            fail_fast: self.fail_fast,
        }
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> DataorgError {
    DataorgError::InvalidConfiguration {
        field: field.to_string(),
        reason: reason.into(),
    }
}
