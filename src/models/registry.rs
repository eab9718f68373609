//! Metric Registry
//!
//! Catalog of metric identifiers, human names, and per-metric aggregation
//! strategies. Identifiers are dense and start at 0, so per-metric state can
//! live in plain vectors indexed by id.

use serde::{Deserialize, Serialize};

/// Dense metric identifier
pub type MetricId = u16;

/// How samples of a metric are reduced within a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationStrategy {
    /// Keep the value with the newest sample timestamp
    Latest,
    /// Keep the maximum value
    Max,
    /// Maintain the mean of all values
    Avg,
    /// Accumulate the sum of all values
    Sum,
}

/// Definition of a single metric
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDef {
    /// Dense identifier, unique within the registry
    pub id: MetricId,

    /// Human-readable metric name
    pub name: String,

    /// Reduction strategy applied within a window
    pub strategy: AggregationStrategy,
}

/// Catalog of all metrics known to the monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricRegistry {
    defs: Vec<MetricDef>,
}

impl MetricRegistry {
    /// Build a registry from (name, strategy) pairs, assigning dense ids in
    /// iteration order.
    pub fn new<N: Into<String>>(metrics: impl IntoIterator<Item = (N, AggregationStrategy)>) -> Self {
        let defs = metrics
            .into_iter()
            .enumerate()
            .map(|(id, (name, strategy))| MetricDef {
                id: id as MetricId,
                name: name.into(),
                strategy,
            })
            .collect();
        Self { defs }
    }

    /// The default catalog for cluster load monitoring.
    pub fn cluster_default() -> Self {
        Self::new([
            ("cpu_utilization", AggregationStrategy::Avg),
            ("network_in_rate", AggregationStrategy::Avg),
            ("network_out_rate", AggregationStrategy::Avg),
            ("disk_utilization", AggregationStrategy::Latest),
            ("request_rate", AggregationStrategy::Max),
            ("messages_in", AggregationStrategy::Sum),
        ])
    }

    /// All metric definitions, ordered by id.
    pub fn all(&self) -> &[MetricDef] {
        &self.defs
    }

    /// Look up a metric by id. O(1).
    pub fn get(&self, id: MetricId) -> Option<&MetricDef> {
        self.defs.get(usize::from(id))
    }

    /// Reduction strategy of a metric.
    pub fn strategy_of(&self, id: MetricId) -> Option<AggregationStrategy> {
        self.get(id).map(|d| d.strategy)
    }

    /// Number of registered metrics.
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_dense_and_ordered() {
        let registry = MetricRegistry::cluster_default();
        for (i, def) in registry.all().iter().enumerate() {
            assert_eq!(def.id as usize, i);
        }
        assert_eq!(registry.len(), 6);
    }

    #[test]
    fn test_lookup_by_id() {
        let registry = MetricRegistry::new([
            ("cpu", AggregationStrategy::Avg),
            ("disk", AggregationStrategy::Latest),
        ]);
        assert_eq!(registry.get(1).map(|d| d.name.as_str()), Some("disk"));
        assert_eq!(registry.strategy_of(0), Some(AggregationStrategy::Avg));
        assert_eq!(registry.get(2), None);
    }
}
