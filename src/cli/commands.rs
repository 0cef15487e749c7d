//! CLI command definitions

use clap::Args;

/// Run the pipeline against the simulated backend
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Object key to treat as newly created (repeatable)
    #[arg(short, long, required_unless_present = "event")]
    pub key: Vec<String>,

    /// S3 event notification JSON file to replay
    #[arg(long)]
    pub event: Option<String>,

    /// Status checks each async job answers "pending" before finishing
    #[arg(long, default_value_t = 2)]
    pub pending_checks: u32,

    /// Override the poll interval of every async stage
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Don't save runs to history
    #[arg(long)]
    pub no_history: bool,
}

/// Validate a pipeline configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Show a single run with its stage log
    #[arg(long)]
    pub run_id: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}
