//! CRUD executors.
//!
//! Every operation runs in two phases. Planning is synchronous: it draws a
//! key, picks and fills a template and consults the shard guard, using the
//! caller's RNG. Execution awaits the store and updates statistics and the
//! key inventory. Keeping randomness out of the async half lets a stream
//! plan a whole batch with one RNG and then await the batch concurrently.

use crate::error::WorkloadError;
use crate::inventory::PrimaryKeyInventory;
use crate::operation::{OperationKind, QueryMode};
use crate::setup::CollectionTarget;
use crate::shard::{permits, GuardDecision, RejectReason, ShardMetadata, ShardMetadataCache};
use crate::stats::RunStatistics;
use crate::store::{DocumentStore, Namespace};
use crate::templates::{bind_values, QueryTemplate, RenderedQuery, TemplateCache, TemplateInput};
use bson::{Bson, Document};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};
use workload_core::{CollectionSchema, FieldType, SchemaSet};
use workload_generator::DocumentGenerator;

/// Documents returned by an ineffective select.
pub const DEFAULT_FIND_LIMIT: i64 = 5;

/// Documents per insert.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Why an operation did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The shard guard refused the concrete query.
    Rejected(RejectReason),
    /// The collection offers no template for this operation.
    NoTemplate,
    /// The store or template engine reported an error; it was logged.
    Failed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Rejected(reason) => write!(f, "rejected: {reason}"),
            SkipReason::NoTemplate => write!(f, "no applicable template"),
            SkipReason::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationOutcome {
    Executed { docs: u64 },
    Skipped(SkipReason),
}

impl OperationOutcome {
    pub fn is_executed(&self) -> bool {
        matches!(self, OperationOutcome::Executed { .. })
    }

    pub fn docs(&self) -> u64 {
        match self {
            OperationOutcome::Executed { docs } => *docs,
            OperationOutcome::Skipped(_) => 0,
        }
    }
}

/// Everything an executor needs to know about one target collection,
/// computed once per worker.
#[derive(Debug, Clone)]
pub struct CollectionContext {
    pub target: CollectionTarget,
    pub namespace: Namespace,
    pub schema: Arc<CollectionSchema>,
    pub primary_key: String,
    pub primary_key_type: FieldType,
    pub shard: ShardMetadata,
    templates: HashMap<(OperationKind, QueryMode), Arc<[QueryTemplate]>>,
}

impl CollectionContext {
    /// Resolve the key, fetch shard metadata and attach template sets.
    pub async fn build(
        store: &dyn DocumentStore,
        shard_cache: &ShardMetadataCache,
        template_cache: &TemplateCache,
        schemas: &SchemaSet,
        target: &CollectionTarget,
    ) -> Result<Self, WorkloadError> {
        let schema = target.schema(schemas).ok_or_else(|| {
            WorkloadError::CollectionNotFound(format!(
                "{}.{}",
                target.database, target.base_collection
            ))
        })?;
        let namespace = target.namespace();
        let shard = shard_cache.refresh(store, &namespace).await;
        Ok(Self::with_metadata(
            schema.clone(),
            target.clone(),
            shard,
            template_cache,
        ))
    }

    /// Context from known shard metadata.
    pub fn with_metadata(
        schema: CollectionSchema,
        target: CollectionTarget,
        shard: ShardMetadata,
        template_cache: &TemplateCache,
    ) -> Self {
        let input = TemplateInput::from_schema(&schema, &shard.shard_keys);
        let mut templates = HashMap::new();
        for operation in [
            OperationKind::Select,
            OperationKind::Update,
            OperationKind::Delete,
        ] {
            for mode in [QueryMode::Optimized, QueryMode::Ineffective] {
                templates.insert(
                    (operation, mode),
                    template_cache.get_or_build(operation, mode, &input),
                );
            }
        }
        Self {
            namespace: target.namespace(),
            target,
            primary_key: schema.primary_key().to_string(),
            primary_key_type: schema.primary_key_type(),
            schema: Arc::new(schema),
            shard,
            templates,
        }
    }

    pub fn templates(&self, operation: OperationKind, mode: QueryMode) -> &[QueryTemplate] {
        self.templates
            .get(&(operation, mode))
            .map(|t| &t[..])
            .unwrap_or(&[])
    }
}

/// A fully prepared operation, ready to await.
#[derive(Debug, Clone)]
pub enum PlannedOperation {
    Insert {
        documents: Vec<Document>,
    },
    Select {
        mode: QueryMode,
        query: RenderedQuery,
    },
    Update {
        mode: QueryMode,
        query: RenderedQuery,
    },
    Delete {
        mode: QueryMode,
        query: RenderedQuery,
        /// Key to prune from the inventory when an anchored delete succeeds.
        prune: Option<Bson>,
    },
}

impl PlannedOperation {
    pub fn kind(&self) -> OperationKind {
        match self {
            PlannedOperation::Insert { .. } => OperationKind::Insert,
            PlannedOperation::Select { .. } => OperationKind::Select,
            PlannedOperation::Update { .. } => OperationKind::Update,
            PlannedOperation::Delete { .. } => OperationKind::Delete,
        }
    }
}

/// Executor tunables.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorSettings {
    pub mode: QueryMode,
    pub batch_size: usize,
    pub find_limit: i64,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            mode: QueryMode::Ineffective,
            batch_size: DEFAULT_BATCH_SIZE,
            find_limit: DEFAULT_FIND_LIMIT,
        }
    }
}

/// Runs operations for one worker. Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct Executor {
    store: Arc<dyn DocumentStore>,
    generator: DocumentGenerator,
    inventory: Arc<PrimaryKeyInventory>,
    stats: Arc<RunStatistics>,
    settings: ExecutorSettings,
}

impl Executor {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        generator: DocumentGenerator,
        inventory: Arc<PrimaryKeyInventory>,
        stats: Arc<RunStatistics>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            store,
            generator,
            inventory,
            stats,
            settings,
        }
    }

    pub fn stats(&self) -> &Arc<RunStatistics> {
        &self.stats
    }

    pub fn inventory(&self) -> &Arc<PrimaryKeyInventory> {
        &self.inventory
    }

    pub fn settings(&self) -> ExecutorSettings {
        self.settings
    }

    /// Prepare one operation. Returns the skip reason when nothing should be
    /// sent to the store.
    pub fn plan<R: Rng>(
        &self,
        ctx: &CollectionContext,
        operation: OperationKind,
        rng: &mut R,
    ) -> Result<PlannedOperation, SkipReason> {
        if operation == OperationKind::Insert {
            let documents =
                self.generator
                    .generate_batch(&ctx.schema, self.settings.batch_size.max(1), rng);
            return Ok(PlannedOperation::Insert { documents });
        }

        let mode = self.settings.mode;
        let template = ctx
            .templates(operation, mode)
            .choose(rng)
            .ok_or(SkipReason::NoTemplate)?;
        let key = self
            .inventory
            .sample(&ctx.namespace, rng)
            .unwrap_or_else(|| self.generator.generate_primary_key(&ctx.schema, rng));
        let values = bind_values(template, &ctx.schema, &self.generator, &key, rng);
        let query = template.render(&values).map_err(|e| {
            error!("Could not fill {} template for {}: {}", operation, ctx.namespace, e);
            SkipReason::Failed
        })?;

        if let GuardDecision::Rejected(reason) = permits(
            operation,
            mode,
            &query.filter,
            template.modified_fields(),
            &ctx.shard,
        ) {
            debug!(
                "Skipping {} {} on {}: {} (filter: {})",
                mode, operation, ctx.namespace, reason, query.filter
            );
            return Err(SkipReason::Rejected(reason));
        }

        Ok(match operation {
            OperationKind::Select => PlannedOperation::Select { mode, query },
            OperationKind::Update => PlannedOperation::Update { mode, query },
            _ => PlannedOperation::Delete {
                mode,
                query,
                prune: template.anchored.then_some(key),
            },
        })
    }

    /// Send a planned operation to the store and account for it.
    pub async fn execute(
        &self,
        ctx: &CollectionContext,
        planned: PlannedOperation,
    ) -> OperationOutcome {
        let operation = planned.kind();
        match self.dispatch(ctx, planned).await {
            Ok(docs) => {
                self.stats.record(operation, docs);
                OperationOutcome::Executed { docs }
            }
            Err((e, filter)) => {
                error!(
                    "Error during {} on {} (filter: {}): {}",
                    operation, ctx.namespace, filter, e
                );
                OperationOutcome::Skipped(SkipReason::Failed)
            }
        }
    }

    async fn dispatch(
        &self,
        ctx: &CollectionContext,
        planned: PlannedOperation,
    ) -> Result<u64, (WorkloadError, Document)> {
        let ns = &ctx.namespace;
        match planned {
            PlannedOperation::Insert { documents } => {
                let keys: Vec<Bson> = if ctx.primary_key == workload_core::DEFAULT_PRIMARY_KEY {
                    Vec::new()
                } else {
                    documents
                        .iter()
                        .filter_map(|d| d.get(&ctx.primary_key).cloned())
                        .collect()
                };
                let ids = self
                    .store
                    .insert_many(ns, documents)
                    .await
                    .map_err(|e| (e, Document::new()))?;
                let inserted = ids.len() as u64;
                if keys.is_empty() {
                    self.inventory.record(ns, ids);
                } else {
                    self.inventory.record(ns, keys);
                }
                Ok(inserted)
            }
            PlannedOperation::Select { mode, query } => {
                let result = match mode {
                    QueryMode::Optimized => self.store.count(ns, query.filter.clone()).await,
                    QueryMode::Ineffective => self
                        .store
                        .find(
                            ns,
                            query.filter.clone(),
                            query.projection.clone(),
                            self.settings.find_limit,
                        )
                        .await
                        .map(|docs| docs.len() as u64),
                };
                result.map_err(|e| (e, query.filter))
            }
            PlannedOperation::Update { mode, query } => {
                let Some(update) = query.update.clone() else {
                    return Ok(0);
                };
                let result = match mode {
                    QueryMode::Optimized => {
                        self.store.update_one(ns, query.filter.clone(), update).await
                    }
                    QueryMode::Ineffective => {
                        self.store.update_many(ns, query.filter.clone(), update).await
                    }
                };
                result
                    .map(|outcome| outcome.modified)
                    .map_err(|e| (e, query.filter))
            }
            PlannedOperation::Delete { mode, query, prune } => {
                let result = match mode {
                    QueryMode::Optimized => self.store.delete_one(ns, query.filter.clone()).await,
                    QueryMode::Ineffective => {
                        self.store.delete_many(ns, query.filter.clone()).await
                    }
                };
                let deleted = result.map_err(|e| (e, query.filter))?;
                if deleted > 0 {
                    if let Some(key) = prune {
                        self.inventory.remove(ns, &key);
                    }
                }
                Ok(deleted)
            }
        }
    }

    /// Plan and execute one operation.
    pub async fn run<R: Rng + Send>(
        &self,
        ctx: &CollectionContext,
        operation: OperationKind,
        rng: &mut R,
    ) -> OperationOutcome {
        match self.plan(ctx, operation, rng) {
            Ok(planned) => self.execute(ctx, planned).await,
            Err(reason) => OperationOutcome::Skipped(reason),
        }
    }

    pub async fn insert<R: Rng + Send>(&self, ctx: &CollectionContext, rng: &mut R) -> OperationOutcome {
        self.run(ctx, OperationKind::Insert, rng).await
    }

    pub async fn select<R: Rng + Send>(&self, ctx: &CollectionContext, rng: &mut R) -> OperationOutcome {
        self.run(ctx, OperationKind::Select, rng).await
    }

    pub async fn update<R: Rng + Send>(&self, ctx: &CollectionContext, rng: &mut R) -> OperationOutcome {
        self.run(ctx, OperationKind::Update, rng).await
    }

    pub async fn delete<R: Rng + Send>(&self, ctx: &CollectionContext, rng: &mut R) -> OperationOutcome {
        self.run(ctx, OperationKind::Delete, rng).await
    }
}
