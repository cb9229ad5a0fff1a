use anyhow::Result;
use clap::{Parser, Subcommand};
use dataorg::{ChecksumAlgorithm, Config, DataorgError};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "dataorgctl")]
struct Cli {
    /// Configuration file (defaults to $DATAORG_CONFIG_PATH, then the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: String,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

/// Command line values that take precedence over the configuration file.
#[derive(clap::Args, Default)]
struct Overrides {
    /// Metadata CSV file
    #[arg(long, global = true)]
    input: Option<PathBuf>,
    /// Directory holding one folder per GUID
    #[arg(long, global = true)]
    source_root: Option<PathBuf>,
    /// Root of the organized target tree
    #[arg(long, global = true)]
    target_root: Option<PathBuf>,
    /// Where rows with missing template values go
    #[arg(long, global = true)]
    quarantine_dir: Option<PathBuf>,
    /// Folder template, e.g. "Decade->Series Title->Year"
    #[arg(long, global = true)]
    folder_sequence: Option<String>,
    /// Checkpoint, stats and audit log directory
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,
    /// Copy worker count
    #[arg(long, global = true)]
    threads: Option<usize>,
    /// Files per copy batch
    #[arg(long, global = true)]
    batch_size: Option<usize>,
    /// Copy buffer size in bytes
    #[arg(long, global = true)]
    block_size: Option<usize>,
    /// Keep going after copy failures instead of stopping
    #[arg(long, global = true)]
    best_effort: bool,
    /// Skip files already present in the target with the same content
    #[arg(long, global = true)]
    skip_duplicates: bool,
    /// Checksum used for duplicate detection (CRC32, MD5, SHA-1, SHA-256)
    #[arg(long, global = true)]
    checksum: Option<String>,
    /// Write Prometheus text metrics here at the end of a run
    #[arg(long, global = true)]
    metrics_file: Option<PathBuf>,
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        if let Some(input) = self.input {
            config.input_file = input;
        }
        if let Some(source_root) = self.source_root {
            config.source_root = source_root;
        }
        if let Some(target_root) = self.target_root {
            config.target_root = target_root;
        }
        if let Some(quarantine_dir) = self.quarantine_dir {
            config.quarantine_dir = Some(quarantine_dir);
        }
        if let Some(folder_sequence) = self.folder_sequence {
            config.folder_sequence = folder_sequence;
        }
        if let Some(state_dir) = self.state_dir {
            config.state_dir = state_dir;
        }
        if let Some(threads) = self.threads {
            config.copy_threads = threads;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(block_size) = self.block_size {
            config.copy_block_size = block_size;
        }
        if self.best_effort {
            config.fail_fast = false;
        }
        if self.skip_duplicates {
            config.skip_duplicates = true;
        }
        if let Some(checksum) = self.checksum {
            config.checksum_scheme = ChecksumAlgorithm::parse_or_default(&checksum);
        }
        if let Some(metrics_file) = self.metrics_file {
            config.metrics_file = Some(metrics_file);
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run (or resume) the migration
    Run,
    /// Show where rows would be copied without copying anything
    Preview {
        /// Only look at the first N rows
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Show the checkpoint and counters of the last run
    Status,
    /// Clear the checkpoint so the next run starts from the first row
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose {
        "dataorg=debug,dataorgctl=debug"
    } else {
        "dataorg=info,dataorgctl=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::load(cli.config.as_deref()).await?;
    cli.overrides.apply(&mut config);
    debug!("Effective configuration: {:?}", config);

    let result = match cli.command {
        Commands::Run => cli::handle_run(config, &cli.format).await,
        Commands::Preview { limit } => cli::handle_preview(config, limit, &cli.format),
        Commands::Status => cli::handle_status(config, &cli.format).await,
        Commands::Reset => cli::handle_reset(config, &cli.format).await,
    };

    if let Err(e) = result {
        match e.downcast_ref::<DataorgError>() {
            Some(error) => {
                cli::print_error(error);
                std::process::exit(error.exit_code());
            }
            None => return Err(e),
        }
    }

    Ok(())
}
