//! Core types for the mongo-workload generator.
//!
//! This crate holds the declarative collection model shared by the data
//! generator, the MongoDB executors and the workload runner.

pub mod ordered;
pub mod schema;
pub mod types;

pub use ordered::OrderedMap;
pub use schema::{
    parse_date_bound, CollectionSchema, FieldSpec, IndexSpec, SchemaError, SchemaSet, ShardConfig,
    DEFAULT_PRIMARY_KEY,
};
pub use types::FieldType;
