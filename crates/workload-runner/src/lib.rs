//! Workload orchestration for mongo-workload.
//!
//! - [`ratio`]: operation percentages and the weighted operation chooser
//! - [`config`]: [`WorkloadConfig`] and its validation
//! - [`worker`]: one OS thread and runtime per worker, many streams inside
//! - [`orchestrator`]: [`run_workload`], from setup to final totals
//! - [`report`]: banner, collection statistics and summary output

pub mod config;
pub mod metrics;
pub mod orchestrator;
pub mod ratio;
pub mod report;
pub mod worker;

pub use config::{ConfigError, WorkloadConfig};
pub use metrics::{ThroughputReport, WorkerMessage, WorkloadSummary};
pub use orchestrator::{preflight, run_workload};
pub use ratio::{OperationChooser, RatioSettings, WorkloadRatios};
pub use report::{collection_stats, CollectionReport};
pub use worker::{MongoStoreFactory, SharedStoreFactory, StoreFactory};
