//! Run orchestration: validation, setup, worker fan-out, aggregation and
//! shutdown.

use crate::config::{ConfigError, WorkloadConfig};
use crate::metrics::{ThroughputReport, WorkerMessage, WorkloadSummary};
use crate::ratio::WorkloadRatios;
use crate::report;
use crate::worker::{spawn_worker, StoreFactory, WorkerSpec};
use anyhow::Context;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use workload_core::SchemaSet;
use workload_generator::DocumentGenerator;
use workload_mongodb::{
    setup_collections, SetupOptions, ShardMetadataCache, StatsSnapshot, TemplateCache,
    TemplateInput,
};

/// Validate everything that can be checked without a database.
pub fn preflight(
    config: &WorkloadConfig,
    schemas: &SchemaSet,
    generator: &DocumentGenerator,
) -> Result<WorkloadRatios, ConfigError> {
    config.validate()?;
    if schemas.is_empty() {
        return Err(ConfigError::NoCollections);
    }
    generator.registry().validate(schemas)?;
    let ratios = WorkloadRatios::normalize(&config.ratios)?;
    ratios.chooser()?;
    Ok(ratios)
}

/// Run a complete workload.
///
/// Collections are prepared through one connection from `factory`, template
/// sets are built up front, then `config.workers` workers run until the
/// configured duration elapses or Ctrl-C is pressed. `on_report` receives
/// the combined throughput every report interval (or each worker's rate
/// when `per_worker_report` is set).
pub async fn run_workload<F>(
    config: WorkloadConfig,
    schemas: SchemaSet,
    factory: Arc<dyn StoreFactory>,
    on_report: F,
) -> anyhow::Result<WorkloadSummary>
where
    F: FnMut(&ThroughputReport) + Send + 'static,
{
    let generator = DocumentGenerator::default();
    let ratios = preflight(&config, &schemas, &generator)?;
    let chooser = ratios.chooser()?;

    let setup_store = factory
        .connect()
        .await
        .context("Failed to connect for collection setup")?;
    let (targets, setup) = setup_collections(
        setup_store.as_ref(),
        &schemas,
        SetupOptions {
            copies: config.collections,
            recreate: config.recreate,
        },
    )
    .await;
    info!(
        "Collection setup: {} created, {} existing, {} sharded, {} indexes, {} failed",
        setup.created, setup.existing, setup.sharded, setup.indexes, setup.failed
    );

    let template_cache = Arc::new(TemplateCache::new());
    let shard_cache = ShardMetadataCache::new();
    let mut sharded = false;
    for target in &targets {
        let Some(schema) = target.schema(&schemas) else {
            continue;
        };
        let metadata = shard_cache.refresh(setup_store.as_ref(), &target.namespace()).await;
        sharded |= metadata.sharded;
        template_cache.prewarm(&TemplateInput::from_schema(schema, &metadata.shard_keys));
    }
    drop(setup_store);

    info!(
        "{}",
        report::format_banner(&config, &ratios, &schemas, sharded)
    );

    let config = Arc::new(config);
    let schemas = Arc::new(schemas);
    let targets = Arc::new(targets);
    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::unbounded_channel();

    let aggregator = tokio::spawn(aggregate_messages(
        rx,
        cancel.clone(),
        AggregatorSettings {
            interval: config.report_interval,
            per_worker: config.per_worker_report,
            shutdown_grace: config.shutdown_grace,
        },
        on_report,
    ));

    let started = Instant::now();
    let mut handles = Vec::with_capacity(config.workers);
    for id in 0..config.workers {
        let spec = WorkerSpec {
            id,
            config: Arc::clone(&config),
            chooser: chooser.clone(),
            schemas: Arc::clone(&schemas),
            targets: Arc::clone(&targets),
            template_cache: Arc::clone(&template_cache),
            generator: generator.clone(),
            factory: Arc::clone(&factory),
            cancel: cancel.clone(),
            messages: tx.clone(),
        };
        match spawn_worker(spec) {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                error!("Could not start worker {}: {}", id, e);
                let _ = tx.send(WorkerMessage::Failed {
                    worker: id,
                    error: e.to_string(),
                });
            }
        }
    }
    drop(tx);

    wait_for_stop(config.duration, tokio::signal::ctrl_c()).await;
    cancel.cancel();

    let aggregate = aggregator
        .await
        .context("Aggregator task ended abnormally")?;
    if aggregate.drained {
        for handle in handles {
            if tokio::task::spawn_blocking(move || handle.join())
                .await
                .map_or(true, |joined| joined.is_err())
            {
                warn!("A worker thread panicked");
            }
        }
    }
    let elapsed = started.elapsed();

    if aggregate.finished.is_empty() && !aggregate.failed.is_empty() {
        anyhow::bail!("All {} workers failed to start", aggregate.failed.len());
    }

    let per_worker: Vec<StatsSnapshot> = aggregate.finished.values().copied().collect();
    Ok(WorkloadSummary {
        requested_secs: config.duration.as_secs(),
        elapsed_secs: elapsed.as_secs_f64(),
        mode: config.mode(),
        ratios,
        workers: config.workers,
        streams_per_worker: config.streams,
        failed_workers: aggregate.failed.len(),
        totals: per_worker.iter().copied().sum(),
        per_worker,
        targets: targets.as_ref().clone(),
    })
}

/// Return once `duration` has elapsed or `signal` fires. A signal source
/// that cannot be installed leaves the deadline as the only stop condition.
async fn wait_for_stop<S>(duration: Duration, signal: S)
where
    S: Future<Output = std::io::Result<()>>,
{
    let signal = async {
        match signal.await {
            Ok(()) => info!("Ctrl+C detected! Stopping workload..."),
            Err(e) => {
                warn!("Could not listen for Ctrl+C, running until the deadline: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    tokio::select! {
        _ = tokio::time::sleep(duration) => {
            info!("Workload duration reached, stopping workers");
        }
        _ = signal => {}
    }
}

/// State owned by the aggregator task, handed back when it ends.
#[derive(Debug, Clone, Default)]
struct Aggregate {
    latest: BTreeMap<usize, ThroughputReport>,
    finished: BTreeMap<usize, StatsSnapshot>,
    failed: BTreeSet<usize>,
    /// Every worker hung up before the shutdown grace ran out.
    drained: bool,
}

#[derive(Debug, Clone, Copy)]
struct AggregatorSettings {
    interval: Duration,
    per_worker: bool,
    shutdown_grace: Duration,
}

/// Collect worker messages until every worker has hung up, reporting the
/// combined rate every `interval`. Once `cancel` fires, workers get
/// `shutdown_grace` to send their totals before collection stops.
async fn aggregate_messages<F>(
    mut rx: UnboundedReceiver<WorkerMessage>,
    cancel: CancellationToken,
    settings: AggregatorSettings,
    mut on_report: F,
) -> Aggregate
where
    F: FnMut(&ThroughputReport) + Send + 'static,
{
    let mut state = Aggregate::default();
    let mut ticker =
        tokio::time::interval_at(Instant::now() + settings.interval, settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            message = rx.recv() => {
                let Some(message) = message else {
                    state.drained = true;
                    break;
                };
                match message {
                    WorkerMessage::Interval { worker, delta, elapsed } => {
                        let report = ThroughputReport::from_delta(Some(worker), &delta, elapsed);
                        if settings.per_worker {
                            on_report(&report);
                        }
                        state.latest.insert(worker, report);
                    }
                    WorkerMessage::Finished { worker, totals } => {
                        state.latest.remove(&worker);
                        state.finished.insert(worker, totals);
                    }
                    WorkerMessage::Failed { worker, error } => {
                        warn!("Worker {} stopped early: {}", worker, error);
                        state.latest.remove(&worker);
                        state.failed.insert(worker);
                    }
                }
            }
            _ = cancel.cancelled(), if deadline.is_none() => {
                deadline = Some(Instant::now() + settings.shutdown_grace);
            }
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                warn!(
                    "Workers did not stop within {:?}; the summary only covers workers that finished",
                    settings.shutdown_grace
                );
                break;
            }
            _ = ticker.tick(), if !settings.per_worker => {
                if !state.latest.is_empty() {
                    on_report(&ThroughputReport::combine(state.latest.values()));
                }
            }
        }
    }
    state
}
