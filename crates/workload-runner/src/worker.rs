//! Workload workers.
//!
//! A worker is an OS thread with its own Tokio runtime, store connection,
//! key inventory, shard metadata cache and statistics. Inside it, `streams`
//! tasks issue batches of operations until the shared cancellation token
//! fires. A reporter task sends interval deltas to the aggregator, and the
//! final totals go out once every stream has stopped.

use crate::config::WorkloadConfig;
use crate::metrics::WorkerMessage;
use crate::ratio::OperationChooser;
use async_trait::async_trait;
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use workload_core::SchemaSet;
use workload_generator::DocumentGenerator;
use workload_mongodb::{
    CollectionContext, CollectionTarget, DocumentStore, Executor, ExecutorSettings,
    MongoConnectionArgs, MongoStore, PrimaryKeyInventory, RunStatistics, ShardMetadataCache,
    StatsSnapshot, TemplateCache, WorkloadError,
};

/// Opens a store connection. Called once per worker and once for setup.
#[async_trait]
pub trait StoreFactory: Send + Sync + 'static {
    async fn connect(&self) -> Result<Arc<dyn DocumentStore>, WorkloadError>;
}

/// A fresh [`MongoStore`] (and connection pool) per call.
#[derive(Debug, Clone)]
pub struct MongoStoreFactory {
    args: MongoConnectionArgs,
}

impl MongoStoreFactory {
    pub fn new(args: MongoConnectionArgs) -> Self {
        Self { args }
    }
}

#[async_trait]
impl StoreFactory for MongoStoreFactory {
    async fn connect(&self) -> Result<Arc<dyn DocumentStore>, WorkloadError> {
        Ok(Arc::new(MongoStore::connect(&self.args).await?))
    }
}

/// Hands out the same store to every caller, e.g. one in-memory store for
/// a dry run.
#[derive(Clone)]
pub struct SharedStoreFactory {
    store: Arc<dyn DocumentStore>,
}

impl SharedStoreFactory {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl StoreFactory for SharedStoreFactory {
    async fn connect(&self) -> Result<Arc<dyn DocumentStore>, WorkloadError> {
        Ok(Arc::clone(&self.store))
    }
}

/// Everything a worker needs, all of it read-only or owned.
pub struct WorkerSpec {
    pub id: usize,
    pub config: Arc<WorkloadConfig>,
    pub chooser: OperationChooser,
    pub schemas: Arc<SchemaSet>,
    pub targets: Arc<Vec<CollectionTarget>>,
    pub template_cache: Arc<TemplateCache>,
    pub generator: DocumentGenerator,
    pub factory: Arc<dyn StoreFactory>,
    pub cancel: CancellationToken,
    pub messages: UnboundedSender<WorkerMessage>,
}

/// Start a worker on its own thread.
pub fn spawn_worker(spec: WorkerSpec) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(format!("workload-worker-{}", spec.id))
        .spawn(move || {
            let id = spec.id;
            let messages = spec.messages.clone();
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!("Worker {} could not start its runtime: {}", id, e);
                    let _ = messages.send(WorkerMessage::Failed {
                        worker: id,
                        error: e.to_string(),
                    });
                    return;
                }
            };
            let message = match runtime.block_on(run_worker(spec)) {
                Ok(totals) => WorkerMessage::Finished { worker: id, totals },
                Err(e) => {
                    error!("Worker {} failed: {}", id, e);
                    WorkerMessage::Failed {
                        worker: id,
                        error: e.to_string(),
                    }
                }
            };
            let _ = messages.send(message);
        })
}

/// Run one worker to completion and return its final counters.
pub async fn run_worker(spec: WorkerSpec) -> Result<StatsSnapshot, WorkloadError> {
    let WorkerSpec {
        id,
        config,
        chooser,
        schemas,
        targets,
        template_cache,
        generator,
        factory,
        cancel,
        messages,
    } = spec;

    let store = factory.connect().await?;
    let shard_cache = ShardMetadataCache::new();
    let mut contexts = Vec::with_capacity(targets.len());
    for target in targets.iter() {
        match CollectionContext::build(
            store.as_ref(),
            &shard_cache,
            &template_cache,
            &schemas,
            target,
        )
        .await
        {
            Ok(ctx) => contexts.push(Arc::new(ctx)),
            Err(e) => error!("Worker {} skipping {}: {}", id, target.namespace(), e),
        }
    }
    if contexts.is_empty() {
        return Err(WorkloadError::Config(
            "no usable collection for this worker".to_string(),
        ));
    }
    let contexts = Arc::new(contexts);

    let stats = Arc::new(RunStatistics::new());
    let executor = Executor::new(
        store,
        generator,
        Arc::new(PrimaryKeyInventory::new()),
        Arc::clone(&stats),
        ExecutorSettings {
            mode: config.mode(),
            batch_size: config.batch_size,
            find_limit: config.find_limit,
        },
    );

    let reporter = tokio::spawn(report_loop(
        id,
        Arc::clone(&stats),
        config.report_interval,
        messages,
        cancel.clone(),
    ));

    let streams: Vec<_> = (0..config.streams)
        .map(|_| {
            tokio::spawn(run_stream(
                executor.clone(),
                Arc::clone(&contexts),
                chooser.clone(),
                config.ops_per_batch,
                cancel.clone(),
            ))
        })
        .collect();
    debug!("Worker {} started {} streams", id, streams.len());

    for result in join_all(streams).await {
        if let Err(e) = result {
            warn!("Worker {} stream ended abnormally: {}", id, e);
        }
    }
    if let Err(e) = reporter.await {
        warn!("Worker {} reporter ended abnormally: {}", id, e);
    }

    let totals = stats.snapshot();
    info!(
        "Worker {} finished: {} operations, {} inventory keys",
        id,
        totals.total_ops(),
        executor.inventory().total()
    );
    Ok(totals)
}

/// Issue batches until cancelled. Stop is only observed between batches.
async fn run_stream(
    executor: Executor,
    contexts: Arc<Vec<Arc<CollectionContext>>>,
    chooser: OperationChooser,
    ops_per_batch: usize,
    cancel: CancellationToken,
) {
    let mut rng = StdRng::from_entropy();
    while !cancel.is_cancelled() {
        let mut batch = Vec::with_capacity(ops_per_batch);
        for _ in 0..ops_per_batch {
            let Some(ctx) = contexts.choose(&mut rng) else {
                return;
            };
            let operation = chooser.choose(&mut rng);
            match executor.plan(ctx, operation, &mut rng) {
                Ok(planned) => batch.push((Arc::clone(ctx), planned)),
                Err(reason) => debug!("{} on {} skipped: {}", operation, ctx.namespace, reason),
            }
        }

        if !batch.is_empty() {
            let executor = &executor;
            join_all(
                batch
                    .into_iter()
                    .map(|(ctx, planned)| async move { executor.execute(&ctx, planned).await }),
            )
            .await;
        }
        // In-memory stores never suspend; let sibling streams and the reporter run.
        tokio::task::yield_now().await;
    }
}

/// Send a counter delta every `interval` until cancelled.
async fn report_loop(
    worker: usize,
    stats: Arc<RunStatistics>,
    interval: std::time::Duration,
    messages: UnboundedSender<WorkerMessage>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last = stats.snapshot();
    let mut last_at = Instant::now();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let now = stats.snapshot();
                let message = WorkerMessage::Interval {
                    worker,
                    delta: now.delta(&last),
                    elapsed: last_at.elapsed(),
                };
                if messages.send(message).is_err() {
                    break;
                }
                last = now;
                last_at = Instant::now();
            }
        }
    }
}
