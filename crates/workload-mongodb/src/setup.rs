//! Collection preparation before a run.

use crate::error::WorkloadError;
use crate::store::{DocumentStore, Namespace};
use bson::Document;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{error, info, warn};
use workload_core::{CollectionSchema, IndexSpec, SchemaSet};

/// One concrete collection the workload targets.
///
/// With `collections > 1` every schema is instantiated as `name_1..name_N`;
/// `base_collection` always names the schema the instance came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CollectionTarget {
    pub database: String,
    pub collection: String,
    pub base_collection: String,
}

impl CollectionTarget {
    pub fn namespace(&self) -> Namespace {
        Namespace::new(&self.database, &self.collection)
    }

    /// Every instance of every schema, in schema order.
    pub fn expand(schemas: &SchemaSet, copies: usize) -> Vec<CollectionTarget> {
        let mut targets = Vec::new();
        for schema in schemas.iter() {
            if copies > 1 {
                for i in 1..=copies {
                    targets.push(CollectionTarget {
                        database: schema.database.clone(),
                        collection: format!("{}_{}", schema.collection, i),
                        base_collection: schema.collection.clone(),
                    });
                }
            } else {
                targets.push(CollectionTarget {
                    database: schema.database.clone(),
                    collection: schema.collection.clone(),
                    base_collection: schema.collection.clone(),
                });
            }
        }
        targets
    }

    pub fn schema<'a>(&self, schemas: &'a SchemaSet) -> Option<&'a CollectionSchema> {
        schemas.find(&self.database, &self.base_collection)
    }
}

/// Setup behaviour switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetupOptions {
    /// Instances per schema.
    pub copies: usize,
    /// Drop existing instances first.
    pub recreate: bool,
}

/// Outcome counters of [`setup_collections`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetupReport {
    pub created: usize,
    pub existing: usize,
    pub sharded: usize,
    pub indexes: usize,
    pub failed: usize,
}

fn json_map_to_document(value: &impl Serialize) -> Result<Document, WorkloadError> {
    Ok(bson::to_document(value)?)
}

/// Keys of a declared index with the shard key prepended, as a sharded
/// collection requires for unique indexes.
pub fn index_keys_with_shard_key(
    index: &IndexSpec,
    shard_key: Option<&Document>,
) -> Result<Document, WorkloadError> {
    let declared = json_map_to_document(&index.keys)?;
    let Some(shard_key) = shard_key else {
        return Ok(declared);
    };
    let mut keys = Document::new();
    for (field, direction) in shard_key {
        if !declared.contains_key(field) {
            keys.insert(field.clone(), direction.clone());
        }
    }
    keys.extend(declared);
    Ok(keys)
}

/// Create, shard and index every target. Failures are logged per
/// collection and never abort the remaining ones.
pub async fn setup_collections<S: DocumentStore + ?Sized>(
    store: &S,
    schemas: &SchemaSet,
    options: SetupOptions,
) -> (Vec<CollectionTarget>, SetupReport) {
    let targets = CollectionTarget::expand(schemas, options.copies);
    let mut report = SetupReport::default();
    let mut sharding_enabled: HashSet<String> = HashSet::new();

    for target in &targets {
        let Some(schema) = target.schema(schemas) else {
            warn!("No schema for {}", target.namespace());
            report.failed += 1;
            continue;
        };
        match setup_one(store, schema, target, options.recreate, &mut sharding_enabled).await {
            Ok(one) => {
                report.created += one.created;
                report.existing += one.existing;
                report.sharded += one.sharded;
                report.indexes += one.indexes;
                report.failed += one.failed;
            }
            Err(e) => {
                error!("Error creating collection '{}': {}", target.namespace(), e);
                report.failed += 1;
            }
        }
    }
    (targets, report)
}

async fn setup_one<S: DocumentStore + ?Sized>(
    store: &S,
    schema: &CollectionSchema,
    target: &CollectionTarget,
    recreate: bool,
    sharding_enabled: &mut HashSet<String>,
) -> Result<SetupReport, WorkloadError> {
    let ns = target.namespace();
    let mut report = SetupReport::default();

    let mut exists = store
        .list_collections(&ns.database)
        .await?
        .contains(&ns.collection);
    if recreate && exists {
        info!("Dropping collection: {}", ns);
        store.drop_collection(&ns).await?;
        exists = false;
    }
    if exists {
        report.existing += 1;
        return Ok(report);
    }

    store.create_collection(&ns).await?;
    info!("Collection '{}' created in DB '{}'", ns.collection, ns.database);
    report.created += 1;

    let mut shard_key = None;
    if let Some(config) = schema.shard_config.as_ref().filter(|c| !c.key.is_empty()) {
        if store.is_replica_set() {
            info!("Replica set deployment, not sharding {}", ns);
        } else {
            let key = json_map_to_document(&config.key)?;
            match shard(store, &ns, &key, sharding_enabled).await {
                Ok(()) => {
                    info!("Sharding configured for '{}' with key {}", ns, key);
                    report.sharded += 1;
                    shard_key = Some(key);
                }
                Err(e) => {
                    error!("Error sharding collection '{}': {}", ns, e);
                    report.failed += 1;
                }
            }
        }
    }

    for index in &schema.indexes {
        let keys = index_keys_with_shard_key(index, shard_key.as_ref())?;
        let index_options = json_map_to_document(&index.options)?;
        match store.create_index(&ns, keys.clone(), index_options).await {
            Ok(name) => {
                info!("Successfully created index: '{}'", name);
                report.indexes += 1;
            }
            Err(e) => {
                error!("Failed to create index {} on {}: {}", keys, ns, e);
                report.failed += 1;
            }
        }
    }
    Ok(report)
}

async fn shard<S: DocumentStore + ?Sized>(
    store: &S,
    ns: &Namespace,
    key: &Document,
    sharding_enabled: &mut HashSet<String>,
) -> Result<(), WorkloadError> {
    store.create_index(ns, key.clone(), Document::new()).await?;
    if !sharding_enabled.contains(&ns.database) {
        store.enable_sharding(&ns.database).await?;
        sharding_enabled.insert(ns.database.clone());
    }
    store.shard_collection(ns, key.clone()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use bson::doc;
    use serde_json::json;
    use workload_core::{FieldSpec, FieldType, OrderedMap};

    fn schemas() -> SchemaSet {
        let mut keys = OrderedMap::new();
        keys.insert("sku", json!(1));
        let mut options = serde_json::Map::new();
        options.insert("unique".to_string(), json!(true));
        let orders = CollectionSchema::new("shop", "orders")
            .with_field("sku", FieldSpec::new(FieldType::String).unique())
            .with_field("region", FieldSpec::new(FieldType::String))
            .with_shard_key("region", json!(1))
            .with_index(IndexSpec { keys, options });
        let logs = CollectionSchema::new("shop", "logs")
            .with_field("msg", FieldSpec::new(FieldType::String));
        SchemaSet::new(vec![orders, logs]).unwrap()
    }

    #[test]
    fn test_expand_copies() {
        let single = CollectionTarget::expand(&schemas(), 1);
        assert_eq!(single.len(), 2);
        assert_eq!(single[0].collection, "orders");

        let copies = CollectionTarget::expand(&schemas(), 3);
        assert_eq!(copies.len(), 6);
        assert_eq!(copies[2].collection, "orders_3");
        assert_eq!(copies[2].base_collection, "orders");
        assert!(copies[2].schema(&schemas()).is_some());
    }

    #[test]
    fn test_index_keys_prepend_shard_key() {
        let mut keys = OrderedMap::new();
        keys.insert("sku", json!(1));
        let index = IndexSpec {
            keys,
            options: serde_json::Map::new(),
        };
        let with_key = index_keys_with_shard_key(&index, Some(&doc! { "region": 1_i64 })).unwrap();
        assert_eq!(with_key.keys().collect::<Vec<_>>(), vec!["region", "sku"]);
        let without = index_keys_with_shard_key(&index, None).unwrap();
        assert_eq!(without.keys().collect::<Vec<_>>(), vec!["sku"]);
    }

    #[tokio::test]
    async fn test_setup_shards_and_indexes() {
        let store = MemoryStore::new();
        let (targets, report) = setup_collections(
            &store,
            &schemas(),
            SetupOptions {
                copies: 1,
                recreate: false,
            },
        )
        .await;
        assert_eq!(targets.len(), 2);
        assert_eq!(report.created, 2);
        assert_eq!(report.sharded, 1);
        assert_eq!(report.indexes, 1);
        assert_eq!(report.failed, 0);

        let orders = Namespace::new("shop", "orders");
        assert!(store.is_database_sharded("shop"));
        assert_eq!(store.shard_key(&orders).await.unwrap(), Some(vec!["region".to_string()]));
        assert_eq!(store.index_names(&orders), vec!["region_1", "region_1_sku_1"]);
        let compound = store.index_keys(&orders, "region_1_sku_1").unwrap();
        assert_eq!(compound.keys().collect::<Vec<_>>(), vec!["region", "sku"]);
    }

    #[tokio::test]
    async fn test_setup_existing_and_recreate() {
        let store = MemoryStore::new();
        let logs = Namespace::new("shop", "logs");
        store.insert_many(&logs, vec![doc! { "msg": "old" }]).await.unwrap();

        let (_, report) = setup_collections(&store, &schemas(), SetupOptions { copies: 1, recreate: false }).await;
        assert_eq!(report.existing, 1);
        assert_eq!(store.document_count(&logs), 1);

        let (_, report) = setup_collections(&store, &schemas(), SetupOptions { copies: 1, recreate: true }).await;
        assert_eq!(report.created, 2);
        assert_eq!(store.document_count(&logs), 0);
    }

    #[tokio::test]
    async fn test_replica_set_skips_sharding() {
        let store = MemoryStore::replica_set();
        let (_, report) = setup_collections(&store, &schemas(), SetupOptions { copies: 2, recreate: false }).await;
        assert_eq!(report.created, 4);
        assert_eq!(report.sharded, 0);
        assert_eq!(report.failed, 0);
        let orders = Namespace::new("shop", "orders_1");
        assert_eq!(store.shard_key(&orders).await.unwrap(), None);
        assert_eq!(store.index_names(&orders), vec!["sku_1"]);
    }
}
