//! MongoDB workload engine.
//!
//! This crate holds everything that issues or shapes database traffic:
//!
//! - [`templates`]: cached filter/update/projection skeletons per schema,
//!   operation and query mode
//! - [`shard`]: shard metadata cache and the guard that keeps generated
//!   traffic shard-key correct
//! - [`inventory`]: live primary keys per collection
//! - [`executor`]: insert/select/update/delete against a [`DocumentStore`]
//! - [`setup`]: collection creation, sharding and indexes
//!
//! [`MongoStore`] talks to a real deployment; [`MemoryStore`] runs the same
//! engine in-process.

pub mod args;
pub mod error;
pub mod executor;
pub mod inventory;
pub mod memory;
pub mod mongo_store;
pub mod operation;
pub mod setup;
pub mod shard;
pub mod stats;
pub mod store;
pub mod templates;

pub use args::MongoConnectionArgs;
pub use error::WorkloadError;
pub use executor::{
    CollectionContext, Executor, ExecutorSettings, OperationOutcome, PlannedOperation, SkipReason,
    DEFAULT_BATCH_SIZE, DEFAULT_FIND_LIMIT,
};
pub use inventory::PrimaryKeyInventory;
pub use memory::MemoryStore;
pub use mongo_store::MongoStore;
pub use operation::{OperationKind, QueryMode};
pub use setup::{setup_collections, CollectionTarget, SetupOptions, SetupReport};
pub use shard::{permits, GuardDecision, RejectReason, ShardMetadata, ShardMetadataCache};
pub use stats::{RunStatistics, StatsSnapshot};
pub use store::{CollectionStats, DocumentStore, Namespace, UpdateOutcome};
pub use templates::{
    build_templates, Placeholder, QueryTemplate, RenderedQuery, TemplateCache, TemplateError,
    TemplateInput, TemplateNode, ValueMap,
};
