//! Command-line definitions.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use workload_mongodb::MongoConnectionArgs;

#[derive(Parser)]
#[command(name = "mongo-workload")]
#[command(about = "Schema-driven CRUD workload generator for MongoDB")]
#[command(long_about = None)]
pub struct Cli {
    /// Enable debug logging (RUST_LOG still takes precedence)
    #[arg(long, global = true)]
    pub debug: bool,

    /// Also write logs to this file
    #[arg(long, global = true, value_name = "PATH")]
    pub log: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a workload
    Run(Box<RunArgs>),

    /// Load collection definitions and configuration, print the normalized
    /// ratios and exit without touching a database
    Validate(Box<RunArgs>),
}

/// Summary output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// YAML configuration file; command-line flags override its values
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Collection definition file (JSON/YAML) or directory of them
    #[arg(long, value_name = "PATH")]
    pub collection_definition: Option<PathBuf>,

    #[command(flatten)]
    pub connection: MongoConnectionArgs,

    /// Total run length (e.g. 60s, 5m, 1h) [default: 60s]
    #[arg(long)]
    pub runtime: Option<String>,

    /// Number of workers, each with its own thread and connection pool [default: 1]
    #[arg(long, visible_alias = "cpu")]
    pub workers: Option<usize>,

    /// Concurrent operation streams per worker [default: 4]
    #[arg(long, visible_alias = "threads")]
    pub streams: Option<usize>,

    /// Instances of each collection definition [default: 1]
    #[arg(long)]
    pub collections: Option<usize>,

    /// Drop the collections before starting
    #[arg(long)]
    pub recreate: bool,

    /// Documents per insert [default: 10]
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Operations each stream issues together before checking for stop [default: 1]
    #[arg(long)]
    pub ops_per_batch: Option<usize>,

    /// Documents returned per ineffective select [default: 5]
    #[arg(long)]
    pub find_limit: Option<i64>,

    /// Use primary-key anchored queries and single-document writes
    #[arg(long)]
    pub optimized: bool,

    /// Percentage of insert operations
    #[arg(long)]
    pub insert_ratio: Option<f64>,

    /// Percentage of select operations
    #[arg(long)]
    pub select_ratio: Option<f64>,

    /// Percentage of update operations
    #[arg(long)]
    pub update_ratio: Option<f64>,

    /// Percentage of delete operations
    #[arg(long)]
    pub delete_ratio: Option<f64>,

    /// Skip all insert operations
    #[arg(long)]
    pub skip_insert: bool,

    /// Skip all select operations
    #[arg(long)]
    pub skip_select: bool,

    /// Skip all update operations
    #[arg(long)]
    pub skip_update: bool,

    /// Skip all delete operations
    #[arg(long)]
    pub skip_delete: bool,

    /// Throughput report frequency (e.g. 5s) [default: 5s]
    #[arg(long)]
    pub report_interval: Option<String>,

    /// Report each worker's throughput instead of the combined rate
    #[arg(long)]
    pub per_worker_report: bool,

    /// Run against an in-memory store instead of MongoDB
    #[arg(long)]
    pub dry_run: bool,

    /// Summary output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub output_format: OutputFormat,
}

impl RunArgs {
    /// Whether any connection flag differs from its default.
    pub fn connection_overridden(&self) -> bool {
        let defaults = MongoConnectionArgs::default();
        self.connection.mongodb_connection_string != defaults.mongodb_connection_string
            || self.connection.replica_set.is_some()
            || self.connection.max_pool_size.is_some()
            || self.connection.connect_timeout_secs != defaults.connect_timeout_secs
            || self.connection.server_selection_timeout_secs
                != defaults.server_selection_timeout_secs
    }
}
