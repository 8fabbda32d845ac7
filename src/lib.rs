//! mongo-workload
//!
//! Drives randomized, schema-aware CRUD traffic against MongoDB and reports
//! throughput. The engine lives in the workspace crates:
//!
//! - `workload-core`: collection definitions
//! - `workload-generator`: random documents and values
//! - `workload-mongodb`: templates, shard guard, key inventory, executors
//! - `workload-runner`: ratios, workers, orchestration, reporting
//!
//! This crate adds the command line, configuration file and logging.
//!
//! # CLI Usage
//!
//! ```bash
//! # Five minutes of optimized traffic from two workers
//! mongo-workload run \
//!   --collection-definition collections/ \
//!   --mongodb-connection-string mongodb://localhost:27017 \
//!   --runtime 5m --workers 2 --streams 8 --optimized
//!
//! # Reads and inserts only, against the in-memory store
//! mongo-workload run --collection-definition flights.json \
//!   --insert-ratio 30 --select-ratio 70 --skip-update --skip-delete --dry-run
//! ```

pub mod cli;
pub mod config;
pub mod logging;

pub use cli::{Cli, Commands, OutputFormat, RunArgs};
pub use config::{apply_overrides, parse_duration, resolve, FileConfig, ResolvedRun};
