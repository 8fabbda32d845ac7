//! Per-worker operation counters.

use crate::operation::OperationKind;
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, updated by executors and read by the reporter.
#[derive(Debug, Default)]
pub struct RunStatistics {
    insert_ops: AtomicU64,
    select_ops: AtomicU64,
    update_ops: AtomicU64,
    delete_ops: AtomicU64,
    docs_inserted: AtomicU64,
    docs_selected: AtomicU64,
    docs_updated: AtomicU64,
    docs_deleted: AtomicU64,
}

impl RunStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one completed operation that touched `docs` documents.
    pub fn record(&self, operation: OperationKind, docs: u64) {
        let (ops, documents) = match operation {
            OperationKind::Insert => (&self.insert_ops, &self.docs_inserted),
            OperationKind::Select => (&self.select_ops, &self.docs_selected),
            OperationKind::Update => (&self.update_ops, &self.docs_updated),
            OperationKind::Delete => (&self.delete_ops, &self.docs_deleted),
        };
        ops.fetch_add(1, Ordering::Relaxed);
        documents.fetch_add(docs, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            insert_ops: self.insert_ops.load(Ordering::Relaxed),
            select_ops: self.select_ops.load(Ordering::Relaxed),
            update_ops: self.update_ops.load(Ordering::Relaxed),
            delete_ops: self.delete_ops.load(Ordering::Relaxed),
            docs_inserted: self.docs_inserted.load(Ordering::Relaxed),
            docs_selected: self.docs_selected.load(Ordering::Relaxed),
            docs_updated: self.docs_updated.load(Ordering::Relaxed),
            docs_deleted: self.docs_deleted.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`RunStatistics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub insert_ops: u64,
    pub select_ops: u64,
    pub update_ops: u64,
    pub delete_ops: u64,
    pub docs_inserted: u64,
    pub docs_selected: u64,
    pub docs_updated: u64,
    pub docs_deleted: u64,
}

impl StatsSnapshot {
    pub fn total_ops(&self) -> u64 {
        self.insert_ops + self.select_ops + self.update_ops + self.delete_ops
    }

    pub fn ops(&self, operation: OperationKind) -> u64 {
        match operation {
            OperationKind::Insert => self.insert_ops,
            OperationKind::Select => self.select_ops,
            OperationKind::Update => self.update_ops,
            OperationKind::Delete => self.delete_ops,
        }
    }

    pub fn docs(&self, operation: OperationKind) -> u64 {
        match operation {
            OperationKind::Insert => self.docs_inserted,
            OperationKind::Select => self.docs_selected,
            OperationKind::Update => self.docs_updated,
            OperationKind::Delete => self.docs_deleted,
        }
    }

    /// Counter growth since `earlier`. Saturates so a stale baseline never
    /// underflows.
    pub fn delta(&self, earlier: &StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            insert_ops: self.insert_ops.saturating_sub(earlier.insert_ops),
            select_ops: self.select_ops.saturating_sub(earlier.select_ops),
            update_ops: self.update_ops.saturating_sub(earlier.update_ops),
            delete_ops: self.delete_ops.saturating_sub(earlier.delete_ops),
            docs_inserted: self.docs_inserted.saturating_sub(earlier.docs_inserted),
            docs_selected: self.docs_selected.saturating_sub(earlier.docs_selected),
            docs_updated: self.docs_updated.saturating_sub(earlier.docs_updated),
            docs_deleted: self.docs_deleted.saturating_sub(earlier.docs_deleted),
        }
    }
}

impl Add for StatsSnapshot {
    type Output = StatsSnapshot;

    fn add(self, other: StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            insert_ops: self.insert_ops + other.insert_ops,
            select_ops: self.select_ops + other.select_ops,
            update_ops: self.update_ops + other.update_ops,
            delete_ops: self.delete_ops + other.delete_ops,
            docs_inserted: self.docs_inserted + other.docs_inserted,
            docs_selected: self.docs_selected + other.docs_selected,
            docs_updated: self.docs_updated + other.docs_updated,
            docs_deleted: self.docs_deleted + other.docs_deleted,
        }
    }
}

impl AddAssign for StatsSnapshot {
    fn add_assign(&mut self, other: StatsSnapshot) {
        *self = *self + other;
    }
}

impl std::iter::Sum for StatsSnapshot {
    fn sum<I: Iterator<Item = StatsSnapshot>>(iter: I) -> Self {
        iter.fold(StatsSnapshot::default(), Add::add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let stats = RunStatistics::new();
        stats.record(OperationKind::Insert, 10);
        stats.record(OperationKind::Insert, 5);
        stats.record(OperationKind::Select, 3);
        stats.record(OperationKind::Delete, 0);

        let snap = stats.snapshot();
        assert_eq!(snap.insert_ops, 2);
        assert_eq!(snap.docs_inserted, 15);
        assert_eq!(snap.ops(OperationKind::Select), 1);
        assert_eq!(snap.docs(OperationKind::Select), 3);
        assert_eq!(snap.delete_ops, 1);
        assert_eq!(snap.total_ops(), 4);
    }

    #[test]
    fn test_delta_and_sum() {
        let stats = RunStatistics::new();
        stats.record(OperationKind::Update, 2);
        let before = stats.snapshot();
        stats.record(OperationKind::Update, 4);
        let delta = stats.snapshot().delta(&before);
        assert_eq!(delta.update_ops, 1);
        assert_eq!(delta.docs_updated, 4);
        assert_eq!(before.delta(&stats.snapshot()), StatsSnapshot::default());

        let total: StatsSnapshot = [before, delta].into_iter().sum();
        assert_eq!(total, stats.snapshot());
    }
}
