//! Throughput and summary types exchanged between workers, the aggregator
//! and the caller.

use crate::ratio::WorkloadRatios;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use workload_mongodb::{CollectionTarget, OperationKind, QueryMode, StatsSnapshot};

/// Messages a worker sends to the aggregator.
#[derive(Debug, Clone)]
pub enum WorkerMessage {
    /// Counter increase since the previous interval.
    Interval {
        worker: usize,
        delta: StatsSnapshot,
        elapsed: Duration,
    },
    /// Final counters, sent once after every stream has stopped.
    Finished { worker: usize, totals: StatsSnapshot },
    /// The worker could not start.
    Failed { worker: usize, error: String },
}

/// Operations per second over one report interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThroughputReport {
    /// `None` for the combined rate across workers.
    pub worker: Option<usize>,
    pub interval_secs: f64,
    pub ops_per_sec: f64,
    pub selects_per_sec: f64,
    pub inserts_per_sec: f64,
    pub updates_per_sec: f64,
    pub deletes_per_sec: f64,
}

impl ThroughputReport {
    pub fn from_delta(worker: Option<usize>, delta: &StatsSnapshot, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        let rate = |count: u64| if secs > 0.0 { count as f64 / secs } else { 0.0 };
        Self {
            worker,
            interval_secs: secs,
            ops_per_sec: rate(delta.total_ops()),
            selects_per_sec: rate(delta.select_ops),
            inserts_per_sec: rate(delta.insert_ops),
            updates_per_sec: rate(delta.update_ops),
            deletes_per_sec: rate(delta.delete_ops),
        }
    }

    /// Sum per-worker rates into one combined report.
    pub fn combine<'a>(reports: impl IntoIterator<Item = &'a ThroughputReport>) -> Self {
        let mut combined = ThroughputReport::default();
        let mut count = 0usize;
        for report in reports {
            combined.interval_secs += report.interval_secs;
            combined.ops_per_sec += report.ops_per_sec;
            combined.selects_per_sec += report.selects_per_sec;
            combined.inserts_per_sec += report.inserts_per_sec;
            combined.updates_per_sec += report.updates_per_sec;
            combined.deletes_per_sec += report.deletes_per_sec;
            count += 1;
        }
        if count > 0 {
            combined.interval_secs /= count as f64;
        }
        combined
    }
}

impl fmt::Display for ThroughputReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.worker {
            Some(worker) => write!(
                f,
                "AVG Operations last {:.0}s (worker #{}): ",
                self.interval_secs, worker
            )?,
            None => write!(f, "AVG Operations last {:.0}s: ", self.interval_secs)?,
        }
        write!(
            f,
            "{:.2} (SELECTS: {:.2}, INSERTS: {:.2}, UPDATES: {:.2}, DELETES: {:.2})",
            self.ops_per_sec,
            self.selects_per_sec,
            self.inserts_per_sec,
            self.updates_per_sec,
            self.deletes_per_sec
        )
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct WorkloadSummary {
    pub requested_secs: u64,
    pub elapsed_secs: f64,
    pub mode: QueryMode,
    pub ratios: WorkloadRatios,
    pub workers: usize,
    pub streams_per_worker: usize,
    pub failed_workers: usize,
    pub totals: StatsSnapshot,
    pub per_worker: Vec<StatsSnapshot>,
    pub targets: Vec<CollectionTarget>,
}

impl WorkloadSummary {
    pub fn total_ops(&self) -> u64 {
        self.totals.total_ops()
    }

    /// Operations per second over the elapsed time, all operations when
    /// `operation` is `None`.
    pub fn throughput(&self, operation: Option<OperationKind>) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        let count = match operation {
            Some(op) => self.totals.ops(op),
            None => self.totals.total_ops(),
        };
        count as f64 / self.elapsed_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(inserts: u64, selects: u64) -> StatsSnapshot {
        StatsSnapshot {
            insert_ops: inserts,
            select_ops: selects,
            ..Default::default()
        }
    }

    #[test]
    fn test_rates_from_delta() {
        let report = ThroughputReport::from_delta(Some(1), &snapshot(10, 40), Duration::from_secs(5));
        assert_eq!(report.ops_per_sec, 10.0);
        assert_eq!(report.inserts_per_sec, 2.0);
        assert_eq!(report.selects_per_sec, 8.0);
        assert_eq!(report.updates_per_sec, 0.0);
    }

    #[test]
    fn test_zero_elapsed_has_zero_rate() {
        let report = ThroughputReport::from_delta(None, &snapshot(10, 0), Duration::ZERO);
        assert_eq!(report.ops_per_sec, 0.0);
    }

    #[test]
    fn test_combine_sums_rates() {
        let a = ThroughputReport::from_delta(Some(0), &snapshot(10, 0), Duration::from_secs(5));
        let b = ThroughputReport::from_delta(Some(1), &snapshot(0, 20), Duration::from_secs(5));
        let combined = ThroughputReport::combine([&a, &b]);
        assert_eq!(combined.worker, None);
        assert_eq!(combined.ops_per_sec, 6.0);
        assert_eq!(combined.interval_secs, 5.0);
        assert!(combined.to_string().starts_with("AVG Operations last 5s: 6.00"));
    }

    #[test]
    fn test_summary_throughput() {
        let summary = WorkloadSummary {
            requested_secs: 10,
            elapsed_secs: 10.0,
            mode: QueryMode::Optimized,
            ratios: WorkloadRatios::default(),
            workers: 1,
            streams_per_worker: 1,
            failed_workers: 0,
            totals: snapshot(50, 150),
            per_worker: vec![snapshot(50, 150)],
            targets: Vec::new(),
        };
        assert_eq!(summary.total_ops(), 200);
        assert_eq!(summary.throughput(None), 20.0);
        assert_eq!(summary.throughput(Some(OperationKind::Insert)), 5.0);
    }
}
