//! Shard metadata cache and the shard-aware execution guard.

use crate::operation::{OperationKind, QueryMode};
use crate::store::{DocumentStore, Namespace};
use bson::Document;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Sharding facts of one collection, fixed for the run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShardMetadata {
    pub sharded: bool,
    pub shard_keys: Vec<String>,
}

impl ShardMetadata {
    pub fn sharded(keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            sharded: true,
            shard_keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn unsharded() -> Self {
        Self::default()
    }
}

/// Per-worker cache of [`ShardMetadata`].
///
/// Each collection gets its own cell, so a slow lookup for one collection
/// never blocks the others. Concurrent first lookups of the same collection
/// wait on the cell instead of querying the server twice.
#[derive(Debug, Default)]
pub struct ShardMetadataCache {
    entries: Mutex<HashMap<Namespace, Arc<OnceCell<ShardMetadata>>>>,
}

impl ShardMetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, ns: &Namespace) -> Arc<OnceCell<ShardMetadata>> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(entries.entry(ns.clone()).or_default())
    }

    /// Cached metadata for `ns`, fetching it on first use.
    pub async fn refresh<S: DocumentStore + ?Sized>(
        &self,
        store: &S,
        ns: &Namespace,
    ) -> ShardMetadata {
        self.cell(ns)
            .get_or_init(|| fetch_shard_metadata(store, ns))
            .await
            .clone()
    }

    /// Metadata already fetched for `ns`, if any.
    pub fn get(&self, ns: &Namespace) -> Option<ShardMetadata> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(ns).and_then(|cell| cell.get().cloned())
    }
}

/// Query the store for sharding facts. Any failure yields "not sharded".
pub async fn fetch_shard_metadata<S: DocumentStore + ?Sized>(
    store: &S,
    ns: &Namespace,
) -> ShardMetadata {
    let stats = match store.collection_stats(ns).await {
        Ok(stats) => stats,
        Err(e) => {
            warn!("Could not read collection stats for {}: {}", ns, e);
            return ShardMetadata::unsharded();
        }
    };
    if !stats.sharded {
        debug!("{} is not sharded", ns);
        return ShardMetadata::unsharded();
    }
    match store.shard_key(ns).await {
        Ok(Some(keys)) => {
            debug!("{} is sharded on {:?}", ns, keys);
            ShardMetadata::sharded(keys)
        }
        Ok(None) => {
            warn!("{} reports sharded but has no routing entry", ns);
            ShardMetadata {
                sharded: true,
                shard_keys: Vec::new(),
            }
        }
        Err(e) => {
            warn!("Could not read shard key for {}: {}", ns, e);
            ShardMetadata::unsharded()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// An optimized operation on a sharded collection lacks a shard key field
    /// in its filter.
    MissingShardKey,
    /// An update writes a shard key field without targeting the full key.
    ModifiesShardKey,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::MissingShardKey => write!(f, "filter is missing a shard key field"),
            RejectReason::ModifiesShardKey => write!(f, "update modifies a shard key field"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Permitted,
    Rejected(RejectReason),
}

impl GuardDecision {
    pub fn is_permitted(&self) -> bool {
        matches!(self, GuardDecision::Permitted)
    }
}

/// Decide whether a concrete operation may run against a collection.
///
/// `modified_fields` lists the fields an update writes; it is empty for
/// every other operation.
pub fn permits(
    operation: OperationKind,
    mode: QueryMode,
    filter: &Document,
    modified_fields: &[String],
    metadata: &ShardMetadata,
) -> GuardDecision {
    if !metadata.sharded || metadata.shard_keys.is_empty() {
        return GuardDecision::Permitted;
    }
    let covers_full_key = metadata
        .shard_keys
        .iter()
        .all(|key| filter.contains_key(key));

    if operation == OperationKind::Update
        && modified_fields
            .iter()
            .any(|field| metadata.shard_keys.contains(field))
        && !covers_full_key
    {
        return GuardDecision::Rejected(RejectReason::ModifiesShardKey);
    }

    let targeted = matches!(
        operation,
        OperationKind::Select | OperationKind::Update | OperationKind::Delete
    );
    if targeted && mode == QueryMode::Optimized && !covers_full_key {
        return GuardDecision::Rejected(RejectReason::MissingShardKey);
    }

    GuardDecision::Permitted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use bson::doc;

    fn region_sharded() -> ShardMetadata {
        ShardMetadata::sharded(["region"])
    }

    #[test]
    fn test_optimized_select_without_shard_key_rejected() {
        let decision = permits(
            OperationKind::Select,
            QueryMode::Optimized,
            &doc! { "user_id": 5 },
            &[],
            &region_sharded(),
        );
        assert_eq!(decision, GuardDecision::Rejected(RejectReason::MissingShardKey));
    }

    #[test]
    fn test_optimized_with_full_key_permitted() {
        let decision = permits(
            OperationKind::Delete,
            QueryMode::Optimized,
            &doc! { "region": "eu", "age": { "$gt": 3 } },
            &[],
            &region_sharded(),
        );
        assert!(decision.is_permitted());
    }

    #[test]
    fn test_compound_key_needs_every_field() {
        let metadata = ShardMetadata::sharded(["region", "user_id"]);
        let partial = permits(
            OperationKind::Select,
            QueryMode::Optimized,
            &doc! { "region": "eu" },
            &[],
            &metadata,
        );
        assert!(!partial.is_permitted());
        let full = permits(
            OperationKind::Select,
            QueryMode::Optimized,
            &doc! { "user_id": 1, "region": "eu" },
            &[],
            &metadata,
        );
        assert!(full.is_permitted());
    }

    #[test]
    fn test_nested_shard_key_does_not_count() {
        let decision = permits(
            OperationKind::Select,
            QueryMode::Optimized,
            &doc! { "$and": [ { "region": "eu" } ] },
            &[],
            &region_sharded(),
        );
        assert!(!decision.is_permitted());
    }

    #[test]
    fn test_ineffective_not_filtered() {
        for op in [OperationKind::Select, OperationKind::Update, OperationKind::Delete] {
            let decision = permits(op, QueryMode::Ineffective, &doc! {}, &[], &region_sharded());
            assert!(decision.is_permitted(), "{op} should pass");
        }
    }

    #[test]
    fn test_update_of_shard_key_rejected_in_both_modes() {
        let modified = vec!["region".to_string()];
        for mode in [QueryMode::Optimized, QueryMode::Ineffective] {
            let decision = permits(
                OperationKind::Update,
                mode,
                &doc! { "age": 4 },
                &modified,
                &region_sharded(),
            );
            assert_eq!(decision, GuardDecision::Rejected(RejectReason::ModifiesShardKey));
        }
        let targeted = permits(
            OperationKind::Update,
            QueryMode::Ineffective,
            &doc! { "region": "eu" },
            &modified,
            &region_sharded(),
        );
        assert!(targeted.is_permitted());
    }

    #[test]
    fn test_unsharded_always_permitted() {
        let decision = permits(
            OperationKind::Update,
            QueryMode::Optimized,
            &doc! {},
            &["region".to_string()],
            &ShardMetadata::unsharded(),
        );
        assert!(decision.is_permitted());
    }

    #[test]
    fn test_insert_permitted_on_sharded() {
        let decision = permits(
            OperationKind::Insert,
            QueryMode::Optimized,
            &doc! {},
            &[],
            &region_sharded(),
        );
        assert!(decision.is_permitted());
    }

    #[tokio::test]
    async fn test_cache_fetches_and_fails_open() {
        let store = MemoryStore::new();
        let sharded = Namespace::new("app", "orders");
        store.create_sharded(&sharded, doc! { "region": 1 });
        let cache = ShardMetadataCache::new();

        assert!(cache.get(&sharded).is_none());
        let metadata = cache.refresh(&store, &sharded).await;
        assert_eq!(metadata, ShardMetadata::sharded(["region"]));
        assert_eq!(cache.get(&sharded), Some(metadata));

        let missing = Namespace::new("app", "nowhere");
        assert_eq!(
            cache.refresh(&store, &missing).await,
            ShardMetadata::unsharded()
        );
    }
}
