//! Workload ratio normalization.
//!
//! Users may set any subset of the four operation percentages and skip any
//! operation outright. [`WorkloadRatios::normalize`] turns that into four
//! ratios that always sum to 100:
//!
//! 1. a skip flag forces its ratio to 0, even over an explicit value
//! 2. explicit values summing above 100 fall back to the defaults
//! 3. the remainder is split across unset ratios by their default weights
//! 4. everything is rescaled to remove rounding drift

use crate::config::ConfigError;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use workload_mongodb::OperationKind;

pub const DEFAULT_INSERT_RATIO: f64 = 10.0;
pub const DEFAULT_SELECT_RATIO: f64 = 60.0;
pub const DEFAULT_UPDATE_RATIO: f64 = 20.0;
pub const DEFAULT_DELETE_RATIO: f64 = 10.0;

const RATIO_TOLERANCE: f64 = 1e-6;

/// User-supplied percentages and skip flags, before normalization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatioSettings {
    pub insert: Option<f64>,
    pub select: Option<f64>,
    pub update: Option<f64>,
    pub delete: Option<f64>,
    pub skip_insert: bool,
    pub skip_select: bool,
    pub skip_update: bool,
    pub skip_delete: bool,
}

impl RatioSettings {
    fn requested(&self, operation: OperationKind) -> Option<f64> {
        match operation {
            OperationKind::Insert => self.insert,
            OperationKind::Select => self.select,
            OperationKind::Update => self.update,
            OperationKind::Delete => self.delete,
        }
    }

    pub fn skipped(&self, operation: OperationKind) -> bool {
        match operation {
            OperationKind::Insert => self.skip_insert,
            OperationKind::Select => self.skip_select,
            OperationKind::Update => self.skip_update,
            OperationKind::Delete => self.skip_delete,
        }
    }
}

/// Operation percentages summing to 100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkloadRatios {
    pub insert: f64,
    pub select: f64,
    pub update: f64,
    pub delete: f64,
}

impl Default for WorkloadRatios {
    fn default() -> Self {
        Self {
            insert: DEFAULT_INSERT_RATIO,
            select: DEFAULT_SELECT_RATIO,
            update: DEFAULT_UPDATE_RATIO,
            delete: DEFAULT_DELETE_RATIO,
        }
    }
}

impl WorkloadRatios {
    pub fn get(&self, operation: OperationKind) -> f64 {
        match operation {
            OperationKind::Insert => self.insert,
            OperationKind::Select => self.select,
            OperationKind::Update => self.update,
            OperationKind::Delete => self.delete,
        }
    }

    fn set(&mut self, operation: OperationKind, value: f64) {
        match operation {
            OperationKind::Insert => self.insert = value,
            OperationKind::Select => self.select = value,
            OperationKind::Update => self.update = value,
            OperationKind::Delete => self.delete = value,
        }
    }

    pub fn total(&self) -> f64 {
        OperationKind::ALL.iter().map(|op| self.get(*op)).sum()
    }

    /// Normalize user settings into ratios summing to 100.
    pub fn normalize(settings: &RatioSettings) -> Result<Self, ConfigError> {
        let defaults = WorkloadRatios::default();
        let mut requested: [(OperationKind, Option<f64>); 4] =
            OperationKind::ALL.map(|op| (op, settings.requested(op)));

        for (operation, value) in requested.iter_mut() {
            if let Some(v) = value {
                if !v.is_finite() || *v < 0.0 {
                    return Err(ConfigError::InvalidRatio {
                        operation: *operation,
                        value: *v,
                    });
                }
            }
            if settings.skipped(*operation) {
                if value.is_some_and(|v| v > 0.0) {
                    info!("Skipping {} operations, ignoring the requested ratio", operation);
                } else {
                    info!("Skipping {} operations", operation);
                }
                *value = Some(0.0);
            }
        }

        let specified_sum: f64 = requested.iter().filter_map(|(_, v)| *v).sum();
        if specified_sum > 100.0 + RATIO_TOLERANCE {
            warn!(
                "The total workload ratio is {:.2}%, which exceeds 100%. Each workload ratio will be adjusted to its default value.",
                specified_sum
            );
            return Ok(defaults);
        }

        let remaining = (100.0 - specified_sum).max(0.0);
        let unset_weight: f64 = requested
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(op, _)| defaults.get(*op))
            .sum();

        let mut ratios = WorkloadRatios {
            insert: 0.0,
            select: 0.0,
            update: 0.0,
            delete: 0.0,
        };
        for (operation, value) in requested {
            let ratio = match value {
                Some(v) => v,
                None => defaults.get(operation) / unset_weight * remaining,
            };
            ratios.set(operation, ratio);
        }

        let total = ratios.total();
        if total <= 0.0 {
            return Err(ConfigError::NoOperationsEnabled);
        }
        if (total - 100.0).abs() > RATIO_TOLERANCE {
            info!(
                "The adjusted workload ratio is {:.2}%, which is not 100%. Rebalancing the ratios.",
                total
            );
            let scale = 100.0 / total;
            for operation in OperationKind::ALL {
                ratios.set(operation, ratios.get(operation) * scale);
            }
        }
        Ok(ratios)
    }

    /// Weighted operation chooser for these ratios.
    pub fn chooser(&self) -> Result<OperationChooser, ConfigError> {
        OperationChooser::new(self)
    }
}

/// Picks the next operation according to [`WorkloadRatios`].
#[derive(Debug, Clone)]
pub struct OperationChooser {
    operations: Vec<OperationKind>,
    index: WeightedIndex<f64>,
}

impl OperationChooser {
    pub fn new(ratios: &WorkloadRatios) -> Result<Self, ConfigError> {
        let (operations, weights): (Vec<_>, Vec<_>) = OperationKind::ALL
            .iter()
            .map(|op| (*op, ratios.get(*op)))
            .filter(|(_, weight)| *weight > 0.0)
            .unzip();
        let index = WeightedIndex::new(&weights).map_err(|_| ConfigError::NoOperationsEnabled)?;
        Ok(Self { operations, index })
    }

    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> OperationKind {
        self.operations[self.index.sample(rng)]
    }

    /// Operations with a non-zero weight.
    pub fn operations(&self) -> &[OperationKind] {
        &self.operations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_defaults_when_nothing_set() {
        let ratios = WorkloadRatios::normalize(&RatioSettings::default()).unwrap();
        assert_eq!(ratios, WorkloadRatios::default());
        assert_close(ratios.total(), 100.0);
    }

    #[test]
    fn test_insert_select_with_skips() {
        let settings = RatioSettings {
            insert: Some(30.0),
            select: Some(70.0),
            skip_update: true,
            skip_delete: true,
            ..Default::default()
        };
        let ratios = WorkloadRatios::normalize(&settings).unwrap();
        assert_close(ratios.insert, 30.0);
        assert_close(ratios.select, 70.0);
        assert_close(ratios.update, 0.0);
        assert_close(ratios.delete, 0.0);
    }

    #[test]
    fn test_skip_wins_over_explicit_ratio() {
        let settings = RatioSettings {
            delete: Some(50.0),
            skip_delete: true,
            ..Default::default()
        };
        let ratios = WorkloadRatios::normalize(&settings).unwrap();
        assert_close(ratios.delete, 0.0);
        // 100 split over insert/select/update by 10:60:20
        assert_close(ratios.insert, 100.0 * 10.0 / 90.0);
        assert_close(ratios.select, 100.0 * 60.0 / 90.0);
        assert_close(ratios.update, 100.0 * 20.0 / 90.0);
    }

    #[test]
    fn test_remaining_distributed_by_default_weight() {
        let settings = RatioSettings {
            select: Some(40.0),
            ..Default::default()
        };
        let ratios = WorkloadRatios::normalize(&settings).unwrap();
        assert_close(ratios.select, 40.0);
        // 60 left over insert:update:delete = 10:20:10
        assert_close(ratios.insert, 15.0);
        assert_close(ratios.update, 30.0);
        assert_close(ratios.delete, 15.0);
    }

    #[test]
    fn test_sum_over_hundred_returns_defaults() {
        let settings = RatioSettings {
            insert: Some(80.0),
            select: Some(80.0),
            ..Default::default()
        };
        let ratios = WorkloadRatios::normalize(&settings).unwrap();
        assert_eq!(ratios, WorkloadRatios::default());
    }

    #[test]
    fn test_explicit_under_hundred_is_rescaled() {
        let settings = RatioSettings {
            insert: Some(10.0),
            select: Some(10.0),
            update: Some(10.0),
            delete: Some(20.0),
            ..Default::default()
        };
        let ratios = WorkloadRatios::normalize(&settings).unwrap();
        assert_close(ratios.insert, 20.0);
        assert_close(ratios.select, 20.0);
        assert_close(ratios.update, 20.0);
        assert_close(ratios.delete, 40.0);
    }

    #[test]
    fn test_all_skipped_is_an_error() {
        let settings = RatioSettings {
            skip_insert: true,
            skip_select: true,
            skip_update: true,
            skip_delete: true,
            ..Default::default()
        };
        assert!(matches!(
            WorkloadRatios::normalize(&settings),
            Err(ConfigError::NoOperationsEnabled)
        ));
    }

    #[test]
    fn test_negative_ratio_rejected() {
        let settings = RatioSettings {
            update: Some(-5.0),
            ..Default::default()
        };
        assert!(matches!(
            WorkloadRatios::normalize(&settings),
            Err(ConfigError::InvalidRatio { .. })
        ));
    }

    #[test]
    fn test_normalized_ratios_always_sum_to_hundred() {
        let values = [None, Some(0.0), Some(5.0), Some(25.0), Some(50.0)];
        for insert in values {
            for select in values {
                for skip_update in [false, true] {
                    let settings = RatioSettings {
                        insert,
                        select,
                        update: Some(15.0),
                        skip_update,
                        ..Default::default()
                    };
                    match WorkloadRatios::normalize(&settings) {
                        Ok(ratios) => {
                            assert_close(ratios.total(), 100.0);
                            assert!(OperationKind::ALL.iter().all(|op| ratios.get(*op) >= 0.0));
                            if skip_update {
                                assert_close(ratios.update, 0.0);
                            }
                        }
                        Err(e) => assert!(matches!(e, ConfigError::NoOperationsEnabled)),
                    }
                }
            }
        }
    }

    #[test]
    fn test_chooser_never_picks_zero_weight() {
        let ratios = WorkloadRatios {
            insert: 30.0,
            select: 70.0,
            update: 0.0,
            delete: 0.0,
        };
        let chooser = ratios.chooser().unwrap();
        assert_eq!(
            chooser.operations(),
            &[OperationKind::Insert, OperationKind::Select]
        );

        let mut rng = StdRng::seed_from_u64(11);
        let mut inserts = 0;
        for _ in 0..10_000 {
            match chooser.choose(&mut rng) {
                OperationKind::Insert => inserts += 1,
                OperationKind::Select => {}
                other => panic!("unexpected {other}"),
            }
        }
        assert!((2_500..3_500).contains(&inserts), "inserts = {inserts}");
    }
}
