//! Command-line interface for mongo-workload
//!
//! # Usage Examples
//!
//! ```bash
//! # One minute of the default mix (60% select, 20% update, 10% insert, 10% delete)
//! mongo-workload run --collection-definition collections/
//!
//! # Sharded cluster, two copies of each collection, fresh start
//! mongo-workload run --collection-definition collections/ \
//!   --mongodb-connection-string mongodb://mongos:27017 \
//!   --collections 2 --recreate --optimized --runtime 10m
//!
//! # Settings from a file, with one override
//! mongo-workload run --config workload.yaml --workers 4
//!
//! # Check definitions and ratios without connecting
//! mongo-workload validate --collection-definition collections/ --insert-ratio 50
//! ```

use anyhow::Context;
use clap::Parser;
use mongo_workload::logging::init_logging;
use mongo_workload::{resolve, Cli, Commands, OutputFormat, ResolvedRun, RunArgs};
use std::sync::Arc;
use tracing::info;
use workload_core::SchemaSet;
use workload_generator::DocumentGenerator;
use workload_mongodb::{DocumentStore, MemoryStore};
use workload_runner::report::{format_collection_table, format_summary, format_summary_json};
use workload_runner::{
    collection_stats, preflight, run_workload, MongoStoreFactory, SharedStoreFactory,
    StoreFactory, ThroughputReport,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug, cli.log.as_deref())?;

    match cli.command {
        Commands::Run(args) => run_command(&args).await,
        Commands::Validate(args) => validate_command(&args),
    }
}

fn load(args: &RunArgs) -> anyhow::Result<(ResolvedRun, SchemaSet)> {
    let mut resolved = resolve(args)?;
    resolved.workload.clamp_workers();
    let schemas = SchemaSet::from_path(&resolved.collection_definition).with_context(|| {
        format!(
            "Failed to load collection definitions from {}",
            resolved.collection_definition.display()
        )
    })?;
    Ok((resolved, schemas))
}

fn validate_command(args: &RunArgs) -> anyhow::Result<()> {
    let (resolved, schemas) = load(args)?;
    let ratios = preflight(&resolved.workload, &schemas, &DocumentGenerator::default())?;
    for schema in schemas.iter() {
        info!(
            "{}: {} fields, primary key '{}', shard key {:?}",
            schema.namespace(),
            schema.fields.len(),
            schema.primary_key(),
            schema.shard_key_fields()
        );
    }
    info!(
        "Workload ratio: SELECTS {:.2}% | INSERTS {:.2}% | UPDATES {:.2}% | DELETES {:.2}%",
        ratios.select, ratios.insert, ratios.update, ratios.delete
    );
    Ok(())
}

async fn run_command(args: &RunArgs) -> anyhow::Result<()> {
    let (resolved, schemas) = load(args)?;

    let factory: Arc<dyn StoreFactory> = if args.dry_run {
        info!("Dry run: using the in-memory store");
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        Arc::new(SharedStoreFactory::new(store))
    } else {
        Arc::new(MongoStoreFactory::new(resolved.connection.clone()))
    };

    let summary = run_workload(
        resolved.workload,
        schemas,
        Arc::clone(&factory),
        |report: &ThroughputReport| info!("{}", report),
    )
    .await?;
    info!("Workload Finished");

    let store = factory
        .connect()
        .await
        .context("Failed to connect for collection statistics")?;
    let collections = collection_stats(store.as_ref(), &summary.targets).await;

    match args.output_format {
        OutputFormat::Text => {
            info!("{}", format_collection_table(&collections));
            info!("{}", format_summary(&summary));
        }
        OutputFormat::Json => {
            println!("{}", format_summary_json(&summary, &collections)?);
        }
    }
    Ok(())
}
