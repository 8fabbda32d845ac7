//! Full runs against the in-memory store.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use workload_core::{CollectionSchema, FieldSpec, FieldType, SchemaSet};
use workload_mongodb::{DocumentStore, MemoryStore, Namespace};
use workload_runner::{
    collection_stats, run_workload, RatioSettings, SharedStoreFactory, ThroughputReport,
    WorkloadConfig,
};

fn config(ratios: RatioSettings) -> WorkloadConfig {
    WorkloadConfig {
        duration: Duration::from_millis(400),
        workers: 2,
        streams: 3,
        ops_per_batch: 4,
        report_interval: Duration::from_millis(100),
        ratios,
        ..Default::default()
    }
}

fn products() -> SchemaSet {
    SchemaSet::new(vec![CollectionSchema::new("shop", "products")
        .with_field("sku", FieldSpec::new(FieldType::String).unique())
        .with_field("price", FieldSpec::new(FieldType::Double))
        .with_field("stock", FieldSpec::new(FieldType::Int))
        .with_field("tags", FieldSpec::new(FieldType::Array))])
    .unwrap()
}

#[tokio::test]
async fn test_insert_only_run_matches_store_contents() {
    let memory = Arc::new(MemoryStore::new());
    let store: Arc<dyn DocumentStore> = memory.clone();
    let reports = Arc::new(Mutex::new(Vec::<ThroughputReport>::new()));
    let sink = Arc::clone(&reports);

    let summary = run_workload(
        config(RatioSettings {
            insert: Some(100.0),
            ..Default::default()
        }),
        products(),
        Arc::new(SharedStoreFactory::new(store)),
        move |report: &ThroughputReport| sink.lock().unwrap().push(*report),
    )
    .await
    .unwrap();

    assert_eq!(summary.failed_workers, 0);
    assert_eq!(summary.per_worker.len(), 2);
    assert!(summary.totals.insert_ops > 0);
    assert_eq!(summary.totals.total_ops(), summary.totals.insert_ops);
    assert_eq!(
        memory.document_count(&Namespace::new("shop", "products")) as u64,
        summary.totals.docs_inserted
    );
    assert!(summary.elapsed_secs >= 0.4);

    let reports = reports.lock().unwrap();
    assert!(!reports.is_empty());
    assert!(reports.iter().all(|r| r.worker.is_none()));
}

#[tokio::test]
async fn test_skipped_operations_never_run() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let summary = run_workload(
        config(RatioSettings {
            insert: Some(30.0),
            select: Some(70.0),
            skip_update: true,
            skip_delete: true,
            ..Default::default()
        }),
        products(),
        Arc::new(SharedStoreFactory::new(store)),
        |_: &ThroughputReport| {},
    )
    .await
    .unwrap();

    assert!((summary.ratios.insert - 30.0).abs() < 1e-6);
    assert!((summary.ratios.select - 70.0).abs() < 1e-6);
    assert_eq!(summary.totals.update_ops, 0);
    assert_eq!(summary.totals.delete_ops, 0);
    assert!(summary.totals.insert_ops > 0);
    assert!(summary.totals.select_ops > 0);
}

#[tokio::test]
async fn test_collection_copies_and_stats() {
    let memory = Arc::new(MemoryStore::new());
    let store: Arc<dyn DocumentStore> = memory.clone();
    let mut run = config(RatioSettings::default());
    run.collections = 2;
    run.optimized = true;

    let summary = run_workload(
        run,
        products(),
        Arc::new(SharedStoreFactory::new(Arc::clone(&store))),
        |_: &ThroughputReport| {},
    )
    .await
    .unwrap();

    let names: Vec<&str> = summary.targets.iter().map(|t| t.collection.as_str()).collect();
    assert_eq!(names, vec!["products_1", "products_2"]);

    let stats = collection_stats(store.as_ref(), &summary.targets).await;
    assert_eq!(stats.len(), 2);
    let documents: u64 = stats.values().map(|s| s.documents).sum();
    assert_eq!(
        documents,
        summary.totals.docs_inserted - summary.totals.docs_deleted
    );
}

#[tokio::test]
async fn test_sharded_optimized_run_on_replica_set_stays_unsharded() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::replica_set());
    let schemas = SchemaSet::new(vec![CollectionSchema::new("geo", "visits")
        .with_field("region", FieldSpec::new(FieldType::String))
        .with_field("visitor", FieldSpec::new(FieldType::String))
        .with_shard_key("region", serde_json::json!(1))])
    .unwrap();
    let mut run = config(RatioSettings::default());
    run.optimized = true;

    let summary = run_workload(
        run,
        schemas,
        Arc::new(SharedStoreFactory::new(Arc::clone(&store))),
        |_: &ThroughputReport| {},
    )
    .await
    .unwrap();

    assert!(summary.total_ops() > 0);
    let stats = collection_stats(store.as_ref(), &summary.targets).await;
    assert!(!stats["geo.visits"].sharded);
}

#[tokio::test]
async fn test_invalid_config_fails_before_setup() {
    let memory = Arc::new(MemoryStore::new());
    let store: Arc<dyn DocumentStore> = memory.clone();
    let mut run = config(RatioSettings::default());
    run.streams = 0;

    let result = run_workload(
        run,
        products(),
        Arc::new(SharedStoreFactory::new(store)),
        |_: &ThroughputReport| {},
    )
    .await;

    assert!(result.is_err());
    assert_eq!(memory.document_count(&Namespace::new("shop", "products")), 0);
    assert!(memory
        .list_collections("shop")
        .await
        .unwrap()
        .is_empty());
}
