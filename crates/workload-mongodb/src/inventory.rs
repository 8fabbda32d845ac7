//! Live primary-key inventory.
//!
//! Inserts append the keys they created, confirmed deletes prune them, and
//! selects/updates/deletes sample from them so traffic targets real data.
//! One inventory exists per worker.

use crate::store::Namespace;
use bson::Bson;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

type KeyList = Arc<Mutex<Vec<Bson>>>;

#[derive(Debug, Default)]
pub struct PrimaryKeyInventory {
    collections: RwLock<HashMap<Namespace, KeyList>>,
}

impl PrimaryKeyInventory {
    pub fn new() -> Self {
        Self::default()
    }

    fn list(&self, ns: &Namespace) -> Option<KeyList> {
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        collections.get(ns).cloned()
    }

    fn list_or_create(&self, ns: &Namespace) -> KeyList {
        if let Some(list) = self.list(ns) {
            return list;
        }
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(collections.entry(ns.clone()).or_default())
    }

    /// Append keys of freshly inserted documents.
    pub fn record(&self, ns: &Namespace, keys: impl IntoIterator<Item = Bson>) {
        let list = self.list_or_create(ns);
        let mut keys_guard = list.lock().unwrap_or_else(|e| e.into_inner());
        keys_guard.extend(keys);
    }

    /// A uniformly random known key, or `None` when nothing was recorded.
    pub fn sample<R: Rng + ?Sized>(&self, ns: &Namespace, rng: &mut R) -> Option<Bson> {
        let list = self.list(ns)?;
        let keys = list.lock().unwrap_or_else(|e| e.into_inner());
        keys.choose(rng).cloned()
    }

    /// Drop the first occurrence of `key`, keeping the remaining keys in
    /// insertion order. Returns whether one was found.
    pub fn remove(&self, ns: &Namespace, key: &Bson) -> bool {
        let Some(list) = self.list(ns) else {
            return false;
        };
        let mut keys = list.lock().unwrap_or_else(|e| e.into_inner());
        match keys.iter().position(|k| k == key) {
            Some(index) => {
                keys.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn len(&self, ns: &Namespace) -> usize {
        self.list(ns)
            .map(|list| list.lock().map(|k| k.len()).unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, ns: &Namespace) -> bool {
        self.len(ns) == 0
    }

    /// Total keys across all collections.
    pub fn total(&self) -> usize {
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        collections
            .values()
            .map(|list| list.lock().map(|k| k.len()).unwrap_or(0))
            .sum()
    }
}
