//! In-process [`DocumentStore`] used by `--dry-run` and the test suites.
//!
//! Behaves like a small single-node deployment: collections are created on
//! first insert, `_id` values are assigned when missing, and sharding
//! commands record a shard key that `collection_stats` and `shard_key`
//! report back. Queries are linear scans.

mod matcher;
mod update;

pub use matcher::{matches, project};
pub use update::apply_update;

use crate::error::WorkloadError;
use crate::store::{CollectionStats, DocumentStore, Namespace, UpdateOutcome};
use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MemoryCollection {
    documents: Vec<Document>,
    shard_key: Option<Document>,
    indexes: Vec<(String, Document)>,
}

#[derive(Debug, Default)]
struct MemoryState {
    collections: BTreeMap<Namespace, MemoryCollection>,
    sharded_databases: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    replica_set: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that behaves like a plain replica set: sharding commands fail.
    pub fn replica_set() -> Self {
        Self {
            state: Mutex::default(),
            replica_set: true,
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a collection that reports itself sharded on `key`.
    pub fn create_sharded(&self, ns: &Namespace, key: Document) {
        let mut state = self.state();
        state.sharded_databases.insert(ns.database.clone());
        state.collections.entry(ns.clone()).or_default().shard_key = Some(key);
    }

    /// Copy of every document in `ns`.
    pub fn documents(&self, ns: &Namespace) -> Vec<Document> {
        self.state()
            .collections
            .get(ns)
            .map(|c| c.documents.clone())
            .unwrap_or_default()
    }

    pub fn document_count(&self, ns: &Namespace) -> usize {
        self.state()
            .collections
            .get(ns)
            .map_or(0, |c| c.documents.len())
    }

    /// Names of the indexes created on `ns`.
    pub fn index_names(&self, ns: &Namespace) -> Vec<String> {
        self.state()
            .collections
            .get(ns)
            .map(|c| c.indexes.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default()
    }

    /// Key document of the index called `name`.
    pub fn index_keys(&self, ns: &Namespace, name: &str) -> Option<Document> {
        self.state().collections.get(ns).and_then(|c| {
            c.indexes
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, keys)| keys.clone())
        })
    }

    pub fn is_database_sharded(&self, database: &str) -> bool {
        self.state().sharded_databases.contains(database)
    }

    fn update(
        &self,
        ns: &Namespace,
        filter: &Document,
        update: &Document,
        multi: bool,
    ) -> Result<UpdateOutcome, WorkloadError> {
        let mut state = self.state();
        let mut outcome = UpdateOutcome::default();
        let Some(collection) = state.collections.get_mut(ns) else {
            return Ok(outcome);
        };
        for doc in collection.documents.iter_mut() {
            if !matches(doc, filter)? {
                continue;
            }
            outcome.matched += 1;
            let mut candidate = doc.clone();
            if apply_update(&mut candidate, update)? {
                *doc = candidate;
                outcome.modified += 1;
            }
            if !multi {
                break;
            }
        }
        Ok(outcome)
    }

    fn delete(&self, ns: &Namespace, filter: &Document, multi: bool) -> Result<u64, WorkloadError> {
        let mut state = self.state();
        let Some(collection) = state.collections.get_mut(ns) else {
            return Ok(0);
        };
        let mut doomed = Vec::new();
        for (index, doc) in collection.documents.iter().enumerate() {
            if matches(doc, filter)? {
                doomed.push(index);
                if !multi {
                    break;
                }
            }
        }
        for index in doomed.iter().rev() {
            collection.documents.remove(*index);
        }
        Ok(doomed.len() as u64)
    }
}

/// Server-style index name: `field_1_other_-1`.
fn index_name(keys: &Document) -> String {
    keys.iter()
        .map(|(field, direction)| match direction {
            Bson::String(s) => format!("{field}_{s}"),
            Bson::Int32(v) => format!("{field}_{v}"),
            Bson::Int64(v) => format!("{field}_{v}"),
            Bson::Double(v) => format!("{field}_{v}"),
            other => format!("{field}_{other}"),
        })
        .collect::<Vec<_>>()
        .join("_")
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_many(
        &self,
        ns: &Namespace,
        documents: Vec<Document>,
    ) -> Result<Vec<Bson>, WorkloadError> {
        let mut state = self.state();
        let collection = state.collections.entry(ns.clone()).or_default();
        let mut ids = Vec::with_capacity(documents.len());
        for mut doc in documents {
            let id = match doc.get("_id") {
                Some(id) => id.clone(),
                None => {
                    let id = Bson::ObjectId(ObjectId::new());
                    let mut with_id = Document::new();
                    with_id.insert("_id", id.clone());
                    with_id.extend(doc);
                    doc = with_id;
                    id
                }
            };
            collection.documents.push(doc);
            ids.push(id);
        }
        Ok(ids)
    }

    async fn count(&self, ns: &Namespace, filter: Document) -> Result<u64, WorkloadError> {
        let state = self.state();
        let Some(collection) = state.collections.get(ns) else {
            return Ok(0);
        };
        let mut count = 0;
        for doc in &collection.documents {
            if matches(doc, &filter)? {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn find(
        &self,
        ns: &Namespace,
        filter: Document,
        projection: Option<Document>,
        limit: i64,
    ) -> Result<Vec<Document>, WorkloadError> {
        let state = self.state();
        let Some(collection) = state.collections.get(ns) else {
            return Ok(Vec::new());
        };
        let limit = if limit > 0 { limit as usize } else { usize::MAX };
        let mut found = Vec::new();
        for doc in &collection.documents {
            if found.len() >= limit {
                break;
            }
            if matches(doc, &filter)? {
                found.push(match &projection {
                    Some(p) => project(doc, p),
                    None => doc.clone(),
                });
            }
        }
        Ok(found)
    }

    async fn update_one(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
    ) -> Result<UpdateOutcome, WorkloadError> {
        self.update(ns, &filter, &update, false)
    }

    async fn update_many(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
    ) -> Result<UpdateOutcome, WorkloadError> {
        self.update(ns, &filter, &update, true)
    }

    async fn delete_one(&self, ns: &Namespace, filter: Document) -> Result<u64, WorkloadError> {
        self.delete(ns, &filter, false)
    }

    async fn delete_many(&self, ns: &Namespace, filter: Document) -> Result<u64, WorkloadError> {
        self.delete(ns, &filter, true)
    }

    async fn collection_stats(&self, ns: &Namespace) -> Result<CollectionStats, WorkloadError> {
        let state = self.state();
        let collection = state
            .collections
            .get(ns)
            .ok_or_else(|| WorkloadError::Store(format!("collection {ns} does not exist")))?;
        let size = collection
            .documents
            .iter()
            .map(|d| bson::to_vec(d).map_or(0, |bytes| bytes.len() as u64))
            .sum();
        Ok(CollectionStats {
            sharded: collection.shard_key.is_some(),
            size,
            documents: collection.documents.len() as u64,
        })
    }

    async fn shard_key(&self, ns: &Namespace) -> Result<Option<Vec<String>>, WorkloadError> {
        Ok(self
            .state()
            .collections
            .get(ns)
            .and_then(|c| c.shard_key.as_ref())
            .map(|key| key.keys().cloned().collect()))
    }

    async fn list_collections(&self, database: &str) -> Result<Vec<String>, WorkloadError> {
        Ok(self
            .state()
            .collections
            .keys()
            .filter(|ns| ns.database == database)
            .map(|ns| ns.collection.clone())
            .collect())
    }

    async fn create_collection(&self, ns: &Namespace) -> Result<(), WorkloadError> {
        let mut state = self.state();
        if state.collections.contains_key(ns) {
            return Err(WorkloadError::Store(format!("collection {ns} already exists")));
        }
        state.collections.insert(ns.clone(), MemoryCollection::default());
        Ok(())
    }

    async fn drop_collection(&self, ns: &Namespace) -> Result<(), WorkloadError> {
        self.state().collections.remove(ns);
        Ok(())
    }

    async fn create_index(
        &self,
        ns: &Namespace,
        keys: Document,
        options: Document,
    ) -> Result<String, WorkloadError> {
        let name = options
            .get_str("name")
            .map(str::to_string)
            .unwrap_or_else(|_| index_name(&keys));
        let mut state = self.state();
        let collection = state.collections.entry(ns.clone()).or_default();
        if !collection.indexes.iter().any(|(n, _)| *n == name) {
            collection.indexes.push((name.clone(), keys));
        }
        Ok(name)
    }

    async fn enable_sharding(&self, database: &str) -> Result<(), WorkloadError> {
        if self.replica_set {
            return Err(WorkloadError::Store(
                "sharding is not available on a replica set".to_string(),
            ));
        }
        self.state().sharded_databases.insert(database.to_string());
        Ok(())
    }

    async fn shard_collection(&self, ns: &Namespace, key: Document) -> Result<(), WorkloadError> {
        if self.replica_set {
            return Err(WorkloadError::Store(
                "sharding is not available on a replica set".to_string(),
            ));
        }
        let mut state = self.state();
        if !state.sharded_databases.contains(&ns.database) {
            return Err(WorkloadError::Store(format!(
                "sharding is not enabled for database {}",
                ns.database
            )));
        }
        state.collections.entry(ns.clone()).or_default().shard_key = Some(key);
        Ok(())
    }

    fn is_replica_set(&self) -> bool {
        self.replica_set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn ns() -> Namespace {
        Namespace::new("shop", "items")
    }

    #[tokio::test]
    async fn test_insert_assigns_ids() {
        let store = MemoryStore::new();
        let ids = store
            .insert_many(&ns(), vec![doc! { "sku": "a" }, doc! { "_id": 7, "sku": "b" }])
            .await
            .unwrap();
        assert!(matches!(ids[0], Bson::ObjectId(_)));
        assert_eq!(ids[1], Bson::Int32(7));
        let docs = store.documents(&ns());
        assert_eq!(docs[0].keys().next().map(String::as_str), Some("_id"));
        assert_eq!(store.count(&ns(), doc! {}).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_find_limit_and_projection() {
        let store = MemoryStore::new();
        let docs = (0..10).map(|i| doc! { "_id": i, "n": i, "x": "y" }).collect();
        store.insert_many(&ns(), docs).await.unwrap();
        let found = store
            .find(&ns(), doc! { "n": { "$gte": 2 } }, Some(doc! { "n": 1, "_id": 0 }), 5)
            .await
            .unwrap();
        assert_eq!(found.len(), 5);
        assert_eq!(found[0], doc! { "n": 2 });
    }

    #[tokio::test]
    async fn test_update_one_and_many() {
        let store = MemoryStore::new();
        let docs = (0..4).map(|i| doc! { "_id": i, "group": i % 2, "v": 0 }).collect();
        store.insert_many(&ns(), docs).await.unwrap();

        let one = store
            .update_one(&ns(), doc! { "group": 0 }, doc! { "$inc": { "v": 1 } })
            .await
            .unwrap();
        assert_eq!(one, UpdateOutcome { matched: 1, modified: 1 });

        let many = store
            .update_many(&ns(), doc! { "group": 1 }, doc! { "$set": { "v": 0 } })
            .await
            .unwrap();
        assert_eq!(many, UpdateOutcome { matched: 2, modified: 0 });
    }

    #[tokio::test]
    async fn test_failed_update_leaves_document() {
        let store = MemoryStore::new();
        store
            .insert_many(&ns(), vec![doc! { "_id": 1, "name": "a" }])
            .await
            .unwrap();
        let result = store
            .update_one(&ns(), doc! {}, doc! { "$inc": { "name": 1 } })
            .await;
        assert!(result.is_err());
        assert_eq!(store.documents(&ns())[0], doc! { "_id": 1, "name": "a" });
    }

    #[tokio::test]
    async fn test_delete_one_and_many() {
        let store = MemoryStore::new();
        let docs = (0..5).map(|i| doc! { "_id": i, "odd": i % 2 == 1 }).collect();
        store.insert_many(&ns(), docs).await.unwrap();
        assert_eq!(store.delete_one(&ns(), doc! { "odd": true }).await.unwrap(), 1);
        assert_eq!(store.delete_many(&ns(), doc! { "odd": false }).await.unwrap(), 3);
        assert_eq!(store.document_count(&ns()), 1);
        assert_eq!(store.delete_many(&ns(), doc! {}).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stats_and_sharding() {
        let store = MemoryStore::new();
        assert!(store.collection_stats(&ns()).await.is_err());
        store.create_collection(&ns()).await.unwrap();
        assert!(store.create_collection(&ns()).await.is_err());
        assert!(store.shard_collection(&ns(), doc! { "sku": 1 }).await.is_err());

        store.enable_sharding("shop").await.unwrap();
        store.shard_collection(&ns(), doc! { "sku": "hashed" }).await.unwrap();
        store.insert_many(&ns(), vec![doc! { "sku": "a" }]).await.unwrap();

        let stats = store.collection_stats(&ns()).await.unwrap();
        assert!(stats.sharded);
        assert_eq!(stats.documents, 1);
        assert!(stats.size > 0);
        assert_eq!(store.shard_key(&ns()).await.unwrap(), Some(vec!["sku".to_string()]));
        assert_eq!(store.list_collections("shop").await.unwrap(), vec!["items".to_string()]);
    }

    #[tokio::test]
    async fn test_replica_set_refuses_sharding() {
        let store = MemoryStore::replica_set();
        assert!(store.is_replica_set());
        assert!(store.enable_sharding("shop").await.is_err());
    }

    #[tokio::test]
    async fn test_index_names() {
        let store = MemoryStore::new();
        let name = store
            .create_index(&ns(), doc! { "sku": 1, "price": -1 }, doc! {})
            .await
            .unwrap();
        assert_eq!(name, "sku_1_price_-1");
        let named = store
            .create_index(&ns(), doc! { "a": 1 }, doc! { "name": "by_a", "unique": true })
            .await
            .unwrap();
        assert_eq!(named, "by_a");
        assert_eq!(store.index_names(&ns()), vec!["sku_1_price_-1", "by_a"]);
    }
}
