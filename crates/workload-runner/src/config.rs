//! Run configuration.

use crate::ratio::RatioSettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use workload_mongodb::{OperationKind, QueryMode, DEFAULT_BATCH_SIZE, DEFAULT_FIND_LIMIT};

/// Configuration problems detected before any worker starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Every operation is skipped or has a zero ratio; nothing to run")]
    NoOperationsEnabled,

    #[error("Invalid {operation} ratio: {value}")]
    InvalidRatio { operation: OperationKind, value: f64 },

    #[error("{0} must be at least 1")]
    Zero(&'static str),

    #[error("No collection definitions to run against")]
    NoCollections,

    #[error("Schema error: {0}")]
    Schema(#[from] workload_core::SchemaError),

    #[error("Generator error: {0}")]
    Generator(#[from] workload_generator::GeneratorError),
}

/// Plain values describing one workload run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// How long operation streams keep issuing batches.
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    /// Isolated workers, each with its own runtime and connection pool.
    pub workers: usize,
    /// Concurrent operation streams per worker.
    pub streams: usize,
    /// Documents per insert.
    pub batch_size: usize,
    /// Operations a stream issues together before checking for stop.
    pub ops_per_batch: usize,
    /// Documents returned by an ineffective select.
    pub find_limit: i64,
    pub optimized: bool,
    pub ratios: RatioSettings,
    #[serde(with = "duration_secs")]
    pub report_interval: Duration,
    /// Instances per collection definition.
    pub collections: usize,
    /// Drop collections before the run.
    pub recreate: bool,
    /// Log each worker's interval rates instead of the combined line.
    pub per_worker_report: bool,
    /// Time given to streams to finish their last batch after stop.
    #[serde(with = "duration_secs")]
    pub shutdown_grace: Duration,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(60),
            workers: 1,
            streams: 4,
            batch_size: DEFAULT_BATCH_SIZE,
            ops_per_batch: 1,
            find_limit: DEFAULT_FIND_LIMIT,
            optimized: false,
            ratios: RatioSettings::default(),
            report_interval: Duration::from_secs(5),
            collections: 1,
            recreate: false,
            per_worker_report: false,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl WorkloadConfig {
    pub fn mode(&self) -> QueryMode {
        QueryMode::from_optimized(self.optimized)
    }

    /// Reject values no run can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Zero("workers"));
        }
        if self.streams == 0 {
            return Err(ConfigError::Zero("streams"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Zero("batch_size"));
        }
        if self.ops_per_batch == 0 {
            return Err(ConfigError::Zero("ops_per_batch"));
        }
        if self.collections == 0 {
            return Err(ConfigError::Zero("collections"));
        }
        // The driver reads zero as no limit and a negative limit as one batch
        if self.find_limit <= 0 {
            return Err(ConfigError::Zero("find_limit"));
        }
        if self.report_interval.is_zero() {
            return Err(ConfigError::Zero("report_interval"));
        }
        Ok(())
    }

    /// Clamp the worker count to the CPUs the process can see.
    pub fn clamp_workers(&mut self) {
        let available = num_cpus::get();
        if self.workers > available {
            tracing::info!(
                "Cannot use {} workers as there are only {} CPUs available. Using {}.",
                self.workers,
                available,
                available
            );
            self.workers = available;
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
