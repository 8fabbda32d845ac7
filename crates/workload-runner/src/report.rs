//! Human-readable and JSON output: start banner, collection statistics and
//! the final workload summary.

use crate::config::WorkloadConfig;
use crate::metrics::WorkloadSummary;
use crate::ratio::WorkloadRatios;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Table};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;
use workload_core::SchemaSet;
use workload_mongodb::{CollectionTarget, DocumentStore, OperationKind};

const RULE_WIDTH: usize = 115;

/// Storage facts for one collection instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionReport {
    pub database: String,
    pub sharded: bool,
    pub size: u64,
    pub documents: u64,
}

/// One `collStats` pass over every target, keyed by `database.collection`.
/// Collections whose statistics cannot be read are logged and left out.
pub async fn collection_stats<S: DocumentStore + ?Sized>(
    store: &S,
    targets: &[CollectionTarget],
) -> BTreeMap<String, CollectionReport> {
    let mut stats = BTreeMap::new();
    for target in targets {
        let ns = target.namespace();
        match store.collection_stats(&ns).await {
            Ok(collection) => {
                stats.insert(
                    ns.to_string(),
                    CollectionReport {
                        database: ns.database.clone(),
                        sharded: collection.sharded,
                        size: collection.size,
                        documents: collection.documents,
                    },
                );
            }
            Err(e) => warn!("Could not read statistics for {}: {}", ns, e),
        }
    }
    stats
}

/// Configuration banner logged once before workers start.
pub fn format_banner(
    config: &WorkloadConfig,
    ratios: &WorkloadRatios,
    schemas: &SchemaSet,
    sharded: bool,
) -> String {
    let collections = schemas
        .iter()
        .map(|s| s.namespace())
        .collect::<Vec<_>>()
        .join(" | ");
    let rule = "=".repeat(RULE_WIDTH);
    format!(
        "\n\
         Duration: {}\n\
         Workers: {}\n\
         Streams: (Per worker: {} | Total: {})\n\
         Databases and Collections: ({})\n\
         Instances of the same collection: {}\n\
         Configure Sharding: {}\n\
         Insert batch size: {}\n\
         Operations per batch: {}\n\
         Optimized workload: {}\n\
         Workload ratio: (SELECTS: {:.0}% | INSERTS: {:.0}% | UPDATES: {:.0}% | DELETES: {:.0}%)\n\
         Report frequency: {} seconds\n\
         {rule}\n\
         {:^width$}\n\
         {rule}",
        format_duration(config.duration.as_secs_f64()),
        config.workers,
        config.streams,
        config.workers * config.streams,
        collections,
        config.collections,
        sharded,
        config.batch_size,
        config.ops_per_batch,
        config.optimized,
        ratios.select,
        ratios.insert,
        ratios.update,
        ratios.delete,
        config.report_interval.as_secs(),
        "Workload Started",
        width = RULE_WIDTH,
    )
}

/// Collection statistics as a table.
pub fn format_collection_table(stats: &BTreeMap<String, CollectionReport>) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Database", "Collection", "Sharded", "Size", "Documents"]);

    for (name, report) in stats {
        let collection = name
            .strip_prefix(&format!("{}.", report.database))
            .unwrap_or(name);
        table.add_row(vec![
            Cell::new(&report.database),
            Cell::new(collection),
            Cell::new(report.sharded),
            Cell::new(format_size(report.size)),
            Cell::new(format_number(report.documents)),
        ]);
    }
    format!("\nCollection Stats\n{table}")
}

/// Final workload summary as text tables.
pub fn format_summary(summary: &WorkloadSummary) -> String {
    let mut output = String::new();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Operation", "Count", "Ops/sec", "Documents"]);
    for (label, operation) in [
        ("SELECT", OperationKind::Select),
        ("INSERT", OperationKind::Insert),
        ("UPDATE", OperationKind::Update),
        ("DELETE", OperationKind::Delete),
    ] {
        table.add_row(vec![
            Cell::new(label),
            Cell::new(format_number(summary.totals.ops(operation))),
            Cell::new(format!("{:.2}", summary.throughput(Some(operation)))),
            Cell::new(format_number(summary.totals.docs(operation))),
        ]);
    }
    table.add_row(vec![
        Cell::new("TOTAL"),
        Cell::new(format_number(summary.total_ops())),
        Cell::new(format!("{:.2}", summary.throughput(None))),
        Cell::new("-"),
    ]);

    output.push_str("\nCombined Workload Stats\n");
    output.push_str(&format!(
        "Specified Duration: {}\n",
        format_duration(summary.requested_secs as f64)
    ));
    output.push_str(&format!(
        "Total Elapsed Time: {}\n",
        format_duration(summary.elapsed_secs)
    ));
    output.push_str(&format!(
        "Mode: {} | Workers: {} | Streams per worker: {}\n",
        summary.mode, summary.workers, summary.streams_per_worker
    ));
    if summary.failed_workers > 0 {
        output.push_str(&format!("Failed workers: {}\n", summary.failed_workers));
    }
    output.push_str(&table.to_string());
    output.push('\n');
    output.push_str(&format!(
        "Total: (Documents Inserted: {} | Documents Found: {} | Documents Updated: {} | Documents Deleted: {})\n",
        format_number(summary.totals.docs_inserted),
        format_number(summary.totals.docs_selected),
        format_number(summary.totals.docs_updated),
        format_number(summary.totals.docs_deleted),
    ));
    output
}

/// Final workload summary as pretty JSON.
pub fn format_summary_json(
    summary: &WorkloadSummary,
    collections: &BTreeMap<String, CollectionReport>,
) -> serde_json::Result<String> {
    #[derive(Serialize)]
    struct Output<'a> {
        summary: &'a WorkloadSummary,
        throughput: BTreeMap<String, f64>,
        collections: &'a BTreeMap<String, CollectionReport>,
    }

    let mut throughput = BTreeMap::new();
    throughput.insert("total".to_string(), summary.throughput(None));
    for operation in OperationKind::ALL {
        throughput.insert(operation.to_string(), summary.throughput(Some(operation)));
    }
    serde_json::to_string_pretty(&Output {
        summary,
        throughput,
        collections,
    })
}

/// Format duration in human-readable form.
pub fn format_duration(secs: f64) -> String {
    if secs < 60.0 {
        format!("{secs:.1}s")
    } else if secs < 3600.0 {
        let mins = (secs / 60.0).floor();
        let remaining_secs = secs - (mins * 60.0);
        format!("{}m {:02.0}s", mins as u64, remaining_secs)
    } else {
        let hours = (secs / 3600.0).floor();
        let remaining = secs - (hours * 3600.0);
        let mins = (remaining / 60.0).floor();
        format!("{}h {:02.0}m", hours as u64, mins as u64)
    }
}

/// Format number with thousands separators.
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// Bytes as MB, or GB from 1024 MB up.
pub fn format_size(bytes: u64) -> String {
    let mb = bytes as f64 / 1024.0 / 1024.0;
    if mb >= 1024.0 {
        format!("{:.2} GB", mb / 1024.0)
    } else {
        format!("{mb:.2} MB")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::WorkloadSummary;
    use bson::doc;
    use workload_core::{CollectionSchema, FieldSpec, FieldType};
    use workload_mongodb::{MemoryStore, Namespace, QueryMode, StatsSnapshot};

    fn summary() -> WorkloadSummary {
        let totals = StatsSnapshot {
            insert_ops: 1_000,
            select_ops: 3_000,
            docs_inserted: 10_000,
            docs_selected: 12_345,
            ..Default::default()
        };
        WorkloadSummary {
            requested_secs: 60,
            elapsed_secs: 40.0,
            mode: QueryMode::Ineffective,
            ratios: WorkloadRatios::default(),
            workers: 2,
            streams_per_worker: 4,
            failed_workers: 0,
            totals,
            per_worker: vec![totals],
            targets: Vec::new(),
        }
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(5.0), "5.0s");
        assert_eq!(format_duration(90.0), "1m 30s");
        assert_eq!(format_duration(7260.0), "2h 01m");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0.00 MB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn test_summary_text_contains_totals() {
        let text = format_summary(&summary());
        assert!(text.contains("Specified Duration: 1m 00s"));
        assert!(text.contains("Total Elapsed Time: 40.0s"));
        assert!(text.contains("4,000"));
        assert!(text.contains("100.00"));
        assert!(text.contains("Documents Found: 12,345"));
    }

    #[test]
    fn test_summary_json_has_throughput() {
        let json = format_summary_json(&summary(), &BTreeMap::new()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["throughput"]["total"], 100.0);
        assert_eq!(value["throughput"]["insert"], 25.0);
        assert_eq!(value["summary"]["totals"]["select_ops"], 3000);
    }

    #[test]
    fn test_banner_lists_collections_and_ratios() {
        let schemas = SchemaSet::new(vec![CollectionSchema::new("shop", "orders")
            .with_field("sku", FieldSpec::new(FieldType::String))])
        .unwrap();
        let banner = format_banner(&WorkloadConfig::default(), &WorkloadRatios::default(), &schemas, false);
        assert!(banner.contains("Databases and Collections: (shop.orders)"));
        assert!(banner.contains("SELECTS: 60% | INSERTS: 10% | UPDATES: 20% | DELETES: 10%"));
        assert!(banner.contains("Workload Started"));
    }

    #[tokio::test]
    async fn test_collection_stats_reads_every_target() {
        let store = MemoryStore::new();
        let ns = Namespace::new("shop", "orders");
        store
            .insert_many(&ns, vec![doc! { "sku": "a" }, doc! { "sku": "b" }])
            .await
            .unwrap();
        let targets = vec![
            CollectionTarget {
                database: "shop".to_string(),
                collection: "orders".to_string(),
                base_collection: "orders".to_string(),
            },
            CollectionTarget {
                database: "shop".to_string(),
                collection: "missing".to_string(),
                base_collection: "missing".to_string(),
            },
        ];

        let stats = collection_stats(&store, &targets).await;
        assert_eq!(stats.len(), 1);
        let orders = &stats["shop.orders"];
        assert_eq!(orders.documents, 2);
        assert!(!orders.sharded);

        let table = format_collection_table(&stats);
        assert!(table.contains("orders"));
    }
}
