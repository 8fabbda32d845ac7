//! [`DocumentStore`] backed by the MongoDB driver.

use crate::args::MongoConnectionArgs;
use crate::error::WorkloadError;
use crate::store::{CollectionStats, DocumentStore, Namespace, UpdateOutcome};
use async_trait::async_trait;
use bson::{doc, Bson, Document};
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Collection, IndexModel};
use std::time::Duration;
use tracing::debug;

const APP_NAME: &str = "mongo-workload";

/// MongoDB client wrapper. Cloning shares the underlying connection pool.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    replica_set: bool,
}

impl MongoStore {
    /// Connect and verify the deployment answers a ping.
    pub async fn connect(args: &MongoConnectionArgs) -> Result<Self, WorkloadError> {
        debug!("Parsing MongoDB connection options");
        let mut options = ClientOptions::parse(&args.mongodb_connection_string).await?;
        options.app_name = Some(APP_NAME.to_string());
        options.connect_timeout = Some(Duration::from_secs(args.connect_timeout_secs));
        options.server_selection_timeout =
            Some(Duration::from_secs(args.server_selection_timeout_secs));
        if let Some(name) = &args.replica_set {
            options.repl_set_name = Some(name.clone());
        }
        if let Some(max) = args.max_pool_size {
            options.max_pool_size = Some(max);
        }
        let replica_set = options.repl_set_name.is_some();

        let client = Client::with_options(options)?;
        client.database("admin").run_command(doc! { "ping": 1 }).await?;
        debug!("MongoDB connection established (replica set: {})", replica_set);

        Ok(Self::with_client(client, replica_set))
    }

    /// Wrap an existing client.
    pub fn with_client(client: Client, replica_set: bool) -> Self {
        Self {
            client,
            replica_set,
        }
    }

    fn collection(&self, ns: &Namespace) -> Collection<Document> {
        self.client
            .database(&ns.database)
            .collection(&ns.collection)
    }
}

/// Read a numeric field of a command reply regardless of its BSON width.
fn reply_u64(reply: &Document, key: &str) -> u64 {
    match reply.get(key) {
        Some(Bson::Int32(v)) => (*v).max(0) as u64,
        Some(Bson::Int64(v)) => (*v).max(0) as u64,
        Some(Bson::Double(v)) if *v > 0.0 => *v as u64,
        _ => 0,
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn insert_many(
        &self,
        ns: &Namespace,
        documents: Vec<Document>,
    ) -> Result<Vec<Bson>, WorkloadError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let result = self.collection(ns).insert_many(documents).await?;
        let mut ids: Vec<(usize, Bson)> = result.inserted_ids.into_iter().collect();
        ids.sort_by_key(|(index, _)| *index);
        Ok(ids.into_iter().map(|(_, id)| id).collect())
    }

    async fn count(&self, ns: &Namespace, filter: Document) -> Result<u64, WorkloadError> {
        Ok(self.collection(ns).count_documents(filter).await?)
    }

    async fn find(
        &self,
        ns: &Namespace,
        filter: Document,
        projection: Option<Document>,
        limit: i64,
    ) -> Result<Vec<Document>, WorkloadError> {
        let mut cursor = match projection {
            Some(p) => self.collection(ns).find(filter).projection(p).limit(limit).await?,
            None => self.collection(ns).find(filter).limit(limit).await?,
        };
        let mut documents = Vec::new();
        while cursor.advance().await? {
            documents.push(cursor.deserialize_current()?);
        }
        Ok(documents)
    }

    async fn update_one(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
    ) -> Result<UpdateOutcome, WorkloadError> {
        let result = self.collection(ns).update_one(filter, update).await?;
        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    async fn update_many(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
    ) -> Result<UpdateOutcome, WorkloadError> {
        let result = self.collection(ns).update_many(filter, update).await?;
        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    async fn delete_one(&self, ns: &Namespace, filter: Document) -> Result<u64, WorkloadError> {
        Ok(self.collection(ns).delete_one(filter).await?.deleted_count)
    }

    async fn delete_many(&self, ns: &Namespace, filter: Document) -> Result<u64, WorkloadError> {
        Ok(self.collection(ns).delete_many(filter).await?.deleted_count)
    }

    async fn collection_stats(&self, ns: &Namespace) -> Result<CollectionStats, WorkloadError> {
        let reply = self
            .client
            .database(&ns.database)
            .run_command(doc! { "collStats": ns.collection.as_str() })
            .await?;
        Ok(CollectionStats {
            sharded: reply.get_bool("sharded").unwrap_or(false),
            size: reply_u64(&reply, "size"),
            documents: reply_u64(&reply, "count"),
        })
    }

    async fn shard_key(&self, ns: &Namespace) -> Result<Option<Vec<String>>, WorkloadError> {
        let entry = self
            .client
            .database("config")
            .collection::<Document>("collections")
            .find_one(doc! { "_id": ns.to_string() })
            .await?;
        Ok(entry.and_then(|e| {
            e.get_document("key")
                .ok()
                .map(|key| key.keys().cloned().collect())
        }))
    }

    async fn list_collections(&self, database: &str) -> Result<Vec<String>, WorkloadError> {
        Ok(self.client.database(database).list_collection_names().await?)
    }

    async fn create_collection(&self, ns: &Namespace) -> Result<(), WorkloadError> {
        self.client
            .database(&ns.database)
            .create_collection(&ns.collection)
            .await?;
        Ok(())
    }

    async fn drop_collection(&self, ns: &Namespace) -> Result<(), WorkloadError> {
        self.collection(ns).drop().await?;
        Ok(())
    }

    async fn create_index(
        &self,
        ns: &Namespace,
        keys: Document,
        options: Document,
    ) -> Result<String, WorkloadError> {
        let options: IndexOptions = bson::from_document(options)?;
        let model = IndexModel::builder().keys(keys).options(options).build();
        let result = self.collection(ns).create_index(model).await?;
        Ok(result.index_name)
    }

    async fn enable_sharding(&self, database: &str) -> Result<(), WorkloadError> {
        self.client
            .database("admin")
            .run_command(doc! { "enableSharding": database })
            .await?;
        Ok(())
    }

    async fn shard_collection(&self, ns: &Namespace, key: Document) -> Result<(), WorkloadError> {
        self.client
            .database("admin")
            .run_command(doc! { "shardCollection": ns.to_string(), "key": key })
            .await?;
        Ok(())
    }

    fn is_replica_set(&self) -> bool {
        self.replica_set
    }
}
