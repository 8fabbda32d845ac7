//! Configuration file loading and CLI overrides.
//!
//! A run is configured from an optional YAML file first, then from the
//! command line; any flag given on the command line wins.
//!
//! ```yaml
//! collection_definition: collections/
//! mongodb:
//!   mongodb_connection_string: mongodb://localhost:27017
//! workload:
//!   duration: 300        # seconds
//!   workers: 2
//!   streams: 8
//!   optimized: true
//!   ratios:
//!     insert: 30
//!     select: 70
//!     skip_update: true
//!     skip_delete: true
//! ```

mod duration;

pub use duration::parse_duration;

use crate::cli::RunArgs;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use workload_mongodb::MongoConnectionArgs;
use workload_runner::WorkloadConfig;

/// Contents of a `--config` YAML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Collection definition file or directory.
    pub collection_definition: Option<PathBuf>,
    pub mongodb: Option<MongoConnectionArgs>,
    pub workload: WorkloadConfig,
}

impl FileConfig {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}

/// Everything a run needs after merging file and command line.
#[derive(Debug, Clone)]
pub struct ResolvedRun {
    pub collection_definition: PathBuf,
    pub connection: MongoConnectionArgs,
    pub workload: WorkloadConfig,
}

/// Merge the optional config file with command-line overrides.
pub fn resolve(args: &RunArgs) -> anyhow::Result<ResolvedRun> {
    let file = match &args.config {
        Some(path) => FileConfig::from_path(path)?,
        None => FileConfig::default(),
    };

    let collection_definition = args
        .collection_definition
        .clone()
        .or(file.collection_definition)
        .context("A collection definition is required (--collection-definition or the config file)")?;

    let connection = match file.mongodb {
        Some(from_file) if !args.connection_overridden() => from_file,
        _ => args.connection.clone(),
    };

    let mut workload = file.workload;
    apply_overrides(args, &mut workload)?;

    Ok(ResolvedRun {
        collection_definition,
        connection,
        workload,
    })
}

/// Copy every flag given on the command line into `config`.
pub fn apply_overrides(args: &RunArgs, config: &mut WorkloadConfig) -> anyhow::Result<()> {
    if let Some(runtime) = &args.runtime {
        config.duration = parse_duration(runtime).context("Invalid --runtime")?;
    }
    if let Some(interval) = &args.report_interval {
        config.report_interval = parse_duration(interval).context("Invalid --report-interval")?;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(streams) = args.streams {
        config.streams = streams;
    }
    if let Some(collections) = args.collections {
        config.collections = collections;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(ops_per_batch) = args.ops_per_batch {
        config.ops_per_batch = ops_per_batch;
    }
    if let Some(find_limit) = args.find_limit {
        config.find_limit = find_limit;
    }

    config.optimized |= args.optimized;
    config.recreate |= args.recreate;
    config.per_worker_report |= args.per_worker_report;

    let ratios = &mut config.ratios;
    ratios.insert = args.insert_ratio.or(ratios.insert);
    ratios.select = args.select_ratio.or(ratios.select);
    ratios.update = args.update_ratio.or(ratios.update);
    ratios.delete = args.delete_ratio.or(ratios.delete);
    ratios.skip_insert |= args.skip_insert;
    ratios.skip_select |= args.skip_select;
    ratios.skip_update |= args.skip_update;
    ratios.skip_delete |= args.skip_delete;
    Ok(())
}
