//! Windowed Metric Accumulator
//!
//! Per-(entity, window) running reductions. Updates are serialized by an
//! internal lock with a short critical section; everything else about
//! concurrency is the owner's discipline.

use crate::models::registry::{AggregationStrategy, MetricRegistry};
use crate::models::sample::MetricSample;
use crate::models::window::WindowId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Sealed snapshot of one window's reductions, keyed by dense metric id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowValues {
    /// Window the values were frozen for
    pub window: WindowId,

    /// One value per registered metric, indexed by metric id
    pub values: Vec<f64>,
}

/// Running reduction state for one metric
#[derive(Debug, Clone)]
enum Slot {
    Latest(Option<(i64, f64)>),
    Max(Option<f64>),
    Avg { sum: f64, count: u64 },
    Sum(f64),
}

#[derive(Debug)]
struct Reductions {
    sample_count: u64,
    slots: Vec<Slot>,
}

/// Accumulator for all metrics of one (entity, window) pair
#[derive(Debug)]
pub struct AggregatedMetrics {
    inner: Mutex<Reductions>,
}

impl AggregatedMetrics {
    /// Create an empty accumulator shaped by the registry.
    pub fn new(registry: &MetricRegistry) -> Self {
        let slots = registry
            .all()
            .iter()
            .map(|def| match def.strategy {
                AggregationStrategy::Latest => Slot::Latest(None),
                AggregationStrategy::Max => Slot::Max(None),
                AggregationStrategy::Avg => Slot::Avg { sum: 0.0, count: 0 },
                AggregationStrategy::Sum => Slot::Sum(0.0),
            })
            .collect();
        Self {
            inner: Mutex::new(Reductions {
                sample_count: 0,
                slots,
            }),
        }
    }

    /// Absorb one sample, updating every metric it carries.
    pub fn add_sample(&self, sample: &MetricSample) {
        let mut inner = self.inner.lock();
        for (&id, &value) in &sample.values {
            let Some(slot) = inner.slots.get_mut(usize::from(id)) else {
                continue;
            };
            match slot {
                Slot::Latest(current) => {
                    let newer = current.map_or(true, |(at_ms, _)| sample.sample_time_ms >= at_ms);
                    if newer {
                        *current = Some((sample.sample_time_ms, value));
                    }
                }
                Slot::Max(current) => {
                    *current = Some(current.map_or(value, |max| max.max(value)));
                }
                Slot::Avg { sum, count } => {
                    *sum += value;
                    *count += 1;
                }
                Slot::Sum(total) => {
                    *total += value;
                }
            }
        }
        inner.sample_count += 1;
    }

    /// Number of samples absorbed so far.
    pub fn num_samples(&self) -> u64 {
        self.inner.lock().sample_count
    }

    /// Whether at least `min_samples` samples were absorbed.
    pub fn enough(&self, min_samples: u64) -> bool {
        self.num_samples() >= min_samples
    }

    /// Materialize the current reductions into a plain snapshot.
    pub fn freeze(&self, window: WindowId) -> WindowValues {
        let inner = self.inner.lock();
        let values = inner
            .slots
            .iter()
            .map(|slot| match slot {
                Slot::Latest(current) => current.map_or(0.0, |(_, value)| value),
                Slot::Max(current) => current.unwrap_or(0.0),
                Slot::Avg { sum, count } => {
                    if *count == 0 {
                        0.0
                    } else {
                        sum / *count as f64
                    }
                }
                Slot::Sum(total) => *total,
            })
            .collect();
        WindowValues { window, values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::entity::EntityId;

    fn registry() -> MetricRegistry {
        MetricRegistry::new([
            ("latest", AggregationStrategy::Latest),
            ("max", AggregationStrategy::Max),
            ("avg", AggregationStrategy::Avg),
            ("sum", AggregationStrategy::Sum),
        ])
    }

    fn sample(t_ms: i64, value: f64) -> MetricSample {
        let mut s = MetricSample::new(EntityId::new("e", "g"), t_ms);
        for id in 0..4 {
            s.set_value(id, value);
        }
        s
    }

    #[test]
    fn test_strategies_reduce_uniform_samples() {
        let agg = AggregatedMetrics::new(&registry());
        for i in 0..4 {
            agg.add_sample(&sample(1_000 + i, 2.5));
        }

        assert_eq!(agg.num_samples(), 4);
        assert!(agg.enough(4));
        assert!(!agg.enough(5));

        let frozen = agg.freeze(1);
        assert_eq!(frozen.window, 1);
        assert_eq!(frozen.values, vec![2.5, 2.5, 2.5, 10.0]);
    }

    #[test]
    fn test_latest_keeps_newest_timestamp() {
        let agg = AggregatedMetrics::new(&registry());
        agg.add_sample(&sample(1_500, 9.0));
        agg.add_sample(&sample(1_200, 4.0));

        let frozen = agg.freeze(1);
        assert_eq!(frozen.values[0], 9.0);
        assert_eq!(frozen.values[1], 9.0);
        assert_eq!(frozen.values[2], 6.5);
        assert_eq!(frozen.values[3], 13.0);
    }

    #[test]
    fn test_freeze_of_empty_accumulator_is_zeroed() {
        let agg = AggregatedMetrics::new(&registry());
        let frozen = agg.freeze(7);
        assert_eq!(frozen.values, vec![0.0; 4]);
        assert_eq!(agg.num_samples(), 0);
    }
}
