//! Extrapolation Engine
//!
//! Selects a value vector for an (entity, window) cell when the raw data is
//! insufficient. Fallbacks are tried in a fixed order; the first success
//! wins. Neighboring and previous-period windows are only consulted for raw
//! data, never recursively, so the descent is bounded to one level.

use crate::error::{MonitorError, Result};
use crate::models::entity::EntityId;
use crate::models::registry::MetricRegistry;
use crate::models::window::WindowId;
use crate::store::aggregated::WindowValues;
use crate::store::raw::RawStore;
use serde::{Deserialize, Serialize};

/// How a reported cell was filled in when raw data was insufficient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Extrapolation {
    /// The window had some samples, at least half the required minimum
    AvgAvailable,
    /// Metric-wise average of the two adjacent windows
    AvgAdjacent,
    /// Value borrowed from the same window one period earlier
    PrevPeriod,
    /// Existing under-sampled data used as-is (invalid entities requested)
    ForcedInsufficient,
    /// No data at all; zeros synthesized (invalid entities requested)
    ForcedUnknown,
}

/// Fallback resolver over the raw store
pub struct ExtrapolationEngine<'a> {
    store: &'a RawStore,
    registry: &'a MetricRegistry,
    min_samples: u64,
    min_partial_samples: u64,
    period_windows: usize,
}

impl<'a> ExtrapolationEngine<'a> {
    pub fn new(
        store: &'a RawStore,
        registry: &'a MetricRegistry,
        min_samples: u64,
        min_partial_samples: u64,
        period_windows: usize,
    ) -> Self {
        Self {
            store,
            registry,
            min_samples,
            min_partial_samples,
            period_windows,
        }
    }

    /// Resolve the value vector for (entity, window).
    ///
    /// Returns the frozen values together with the extrapolation kind used,
    /// or `None` for the fully observed case. An outer `None` means no valid
    /// extrapolation exists and the entity cannot be reported for this
    /// window. Forced fallbacks only apply when `allow_forced` is set.
    pub fn resolve(
        &self,
        entity: &EntityId,
        window: WindowId,
        allow_forced: bool,
    ) -> Result<Option<(WindowValues, Option<Extrapolation>)>> {
        if let Some(agg) = self.store.get(window, entity) {
            let samples = agg.num_samples();
            if samples >= self.min_samples {
                return Ok(Some((agg.freeze(window), None)));
            }
            if samples >= self.min_partial_samples && samples > 0 {
                return Ok(Some((agg.freeze(window), Some(Extrapolation::AvgAvailable))));
            }
        }

        let before = self
            .store
            .get(window - 1, entity)
            .filter(|agg| agg.enough(self.min_samples));
        let after = self
            .store
            .get(window + 1, entity)
            .filter(|agg| agg.enough(self.min_samples));
        if let (Some(before), Some(after)) = (before, after) {
            let left = before.freeze(window - 1);
            let right = after.freeze(window + 1);
            if left.values.len() != right.values.len() {
                return Err(MonitorError::InternalInconsistency(format!(
                    "adjacent windows of {entity} disagree on metric count: {} vs {}",
                    left.values.len(),
                    right.values.len()
                )));
            }
            let values = left
                .values
                .iter()
                .zip(&right.values)
                .map(|(a, b)| (a + b) / 2.0)
                .collect();
            return Ok(Some((
                WindowValues { window, values },
                Some(Extrapolation::AvgAdjacent),
            )));
        }

        let previous_period = window - self.period_windows as i64;
        if let Some(agg) = self.store.get(previous_period, entity) {
            if agg.enough(self.min_samples) {
                let borrowed = agg.freeze(previous_period);
                return Ok(Some((
                    WindowValues {
                        window,
                        values: borrowed.values,
                    },
                    Some(Extrapolation::PrevPeriod),
                )));
            }
        }

        if allow_forced {
            if let Some(agg) = self.store.get(window, entity) {
                return Ok(Some((
                    agg.freeze(window),
                    Some(Extrapolation::ForcedInsufficient),
                )));
            }
            return Ok(Some((
                WindowValues {
                    window,
                    values: vec![0.0; self.registry.len()],
                },
                Some(Extrapolation::ForcedUnknown),
            )));
        }

        Ok(None)
    }

    /// Whether the entity counts as present in the window: fully observed,
    /// or reachable through a non-forced fallback.
    pub fn is_present(&self, entity: &EntityId, window: WindowId) -> bool {
        if let Some(agg) = self.store.get(window, entity) {
            let samples = agg.num_samples();
            if samples >= self.min_samples {
                return true;
            }
            if samples >= self.min_partial_samples && samples > 0 {
                return true;
            }
        }

        let observed = |w: WindowId| {
            self.store
                .get(w, entity)
                .map_or(false, |agg| agg.enough(self.min_samples))
        };
        if observed(window - 1) && observed(window + 1) {
            return true;
        }
        observed(window - self.period_windows as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::registry::AggregationStrategy;
    use crate::models::sample::MetricSample;
    use std::sync::Arc;

    const MIN_SAMPLES: u64 = 4;
    const MIN_PARTIAL: u64 = 2;
    const PERIOD: usize = 20;

    fn registry() -> Arc<MetricRegistry> {
        Arc::new(MetricRegistry::new([
            ("cpu", AggregationStrategy::Avg),
            ("messages", AggregationStrategy::Sum),
        ]))
    }

    fn entity() -> EntityId {
        EntityId::new("topic-0", "rack-a")
    }

    fn fill(store: &RawStore, window: WindowId, samples: u64, value: f64) {
        store.ensure_window(window);
        let agg = store.put(window, &entity()).unwrap();
        for i in 0..samples {
            let sample = MetricSample::new(entity(), window * 1_000 + i as i64)
                .with_value(0, value)
                .with_value(1, value);
            agg.add_sample(&sample);
        }
    }

    fn engine<'a>(store: &'a RawStore, registry: &'a MetricRegistry) -> ExtrapolationEngine<'a> {
        ExtrapolationEngine::new(store, registry, MIN_SAMPLES, MIN_PARTIAL, PERIOD)
    }

    #[test]
    fn test_fully_observed_window_needs_no_extrapolation() {
        let registry = registry();
        let store = RawStore::new(registry.clone());
        fill(&store, 5, 4, 2.0);

        let resolved = engine(&store, &registry).resolve(&entity(), 5, false).unwrap();
        let (values, kind) = resolved.unwrap();
        assert_eq!(kind, None);
        assert_eq!(values.values, vec![2.0, 8.0]);
    }

    #[test]
    fn test_partial_window_is_used_when_half_full() {
        let registry = registry();
        let store = RawStore::new(registry.clone());
        fill(&store, 5, 2, 3.0);

        let resolved = engine(&store, &registry).resolve(&entity(), 5, false).unwrap();
        let (values, kind) = resolved.unwrap();
        assert_eq!(kind, Some(Extrapolation::AvgAvailable));
        assert_eq!(values.values, vec![3.0, 6.0]);
    }

    #[test]
    fn test_adjacent_average_requires_both_neighbors() {
        let registry = registry();
        let store = RawStore::new(registry.clone());
        fill(&store, 4, 4, 2.0);
        store.ensure_window(5);

        let resolved = engine(&store, &registry).resolve(&entity(), 5, false).unwrap();
        assert!(resolved.is_none());

        fill(&store, 6, 4, 6.0);
        let resolved = engine(&store, &registry).resolve(&entity(), 5, false).unwrap();
        let (values, kind) = resolved.unwrap();
        assert_eq!(kind, Some(Extrapolation::AvgAdjacent));
        assert_eq!(values.window, 5);
        assert_eq!(values.values, vec![4.0, 16.0]);
    }

    #[test]
    fn test_previous_period_borrows_values_with_current_window_id() {
        let registry = registry();
        let store = RawStore::new(registry.clone());
        fill(&store, 5, 4, 7.0);
        store.ensure_window(25);

        let resolved = engine(&store, &registry).resolve(&entity(), 25, false).unwrap();
        let (values, kind) = resolved.unwrap();
        assert_eq!(kind, Some(Extrapolation::PrevPeriod));
        assert_eq!(values.window, 25);
        assert_eq!(values.values, vec![7.0, 28.0]);
    }

    #[test]
    fn test_forced_fallbacks_only_when_requested() {
        let registry = registry();
        let store = RawStore::new(registry.clone());
        fill(&store, 5, 1, 9.0);

        let engine = engine(&store, &registry);
        assert!(engine.resolve(&entity(), 5, false).unwrap().is_none());

        let (values, kind) = engine.resolve(&entity(), 5, true).unwrap().unwrap();
        assert_eq!(kind, Some(Extrapolation::ForcedInsufficient));
        assert_eq!(values.values, vec![9.0, 9.0]);

        let (values, kind) = engine.resolve(&entity(), 8, true).unwrap().unwrap();
        assert_eq!(kind, Some(Extrapolation::ForcedUnknown));
        assert_eq!(values.values, vec![0.0, 0.0]);
    }

    #[test]
    fn test_presence_mirrors_non_forced_resolution() {
        let registry = registry();
        let store = RawStore::new(registry.clone());
        fill(&store, 4, 4, 1.0);
        fill(&store, 6, 4, 1.0);
        store.ensure_window(5);
        store.ensure_window(7);

        let engine = engine(&store, &registry);
        assert!(engine.is_present(&entity(), 4));
        assert!(engine.is_present(&entity(), 5));
        assert!(!engine.is_present(&entity(), 7));
    }
}
