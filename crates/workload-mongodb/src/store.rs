//! Document store abstraction.
//!
//! Executors and setup code talk to the database only through
//! [`DocumentStore`]. [`crate::MongoStore`] is the production implementation;
//! [`crate::MemoryStore`] runs the same workload in-process for dry runs and
//! tests.

use crate::error::WorkloadError;
use async_trait::async_trait;
use bson::{Bson, Document};
use serde::Serialize;
use std::fmt;

/// Fully qualified collection name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Result of an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
}

/// Storage statistics of one collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectionStats {
    pub sharded: bool,
    /// Uncompressed data size in bytes.
    pub size: u64,
    pub documents: u64,
}

/// Operations the workload needs from a document database.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Insert documents, returning their `_id` values in input order.
    async fn insert_many(
        &self,
        ns: &Namespace,
        documents: Vec<Document>,
    ) -> Result<Vec<Bson>, WorkloadError>;

    async fn count(&self, ns: &Namespace, filter: Document) -> Result<u64, WorkloadError>;

    async fn find(
        &self,
        ns: &Namespace,
        filter: Document,
        projection: Option<Document>,
        limit: i64,
    ) -> Result<Vec<Document>, WorkloadError>;

    async fn update_one(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
    ) -> Result<UpdateOutcome, WorkloadError>;

    async fn update_many(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
    ) -> Result<UpdateOutcome, WorkloadError>;

    /// Delete at most one matching document, returning the deleted count.
    async fn delete_one(&self, ns: &Namespace, filter: Document) -> Result<u64, WorkloadError>;

    async fn delete_many(&self, ns: &Namespace, filter: Document) -> Result<u64, WorkloadError>;

    async fn collection_stats(&self, ns: &Namespace) -> Result<CollectionStats, WorkloadError>;

    /// Shard key fields from the cluster routing metadata, in key order.
    /// `None` when the routing table has no entry for the namespace.
    async fn shard_key(&self, ns: &Namespace) -> Result<Option<Vec<String>>, WorkloadError>;

    async fn list_collections(&self, database: &str) -> Result<Vec<String>, WorkloadError>;

    async fn create_collection(&self, ns: &Namespace) -> Result<(), WorkloadError>;

    async fn drop_collection(&self, ns: &Namespace) -> Result<(), WorkloadError>;

    /// Create an index, returning its name.
    async fn create_index(
        &self,
        ns: &Namespace,
        keys: Document,
        options: Document,
    ) -> Result<String, WorkloadError>;

    async fn enable_sharding(&self, database: &str) -> Result<(), WorkloadError>;

    async fn shard_collection(&self, ns: &Namespace, key: Document) -> Result<(), WorkloadError>;

    /// Whether the deployment is a plain replica set, where sharding commands
    /// are unavailable.
    fn is_replica_set(&self) -> bool;
}
