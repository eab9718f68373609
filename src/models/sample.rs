//! Metric Samples
//!
//! The wire-facing sample type handed to the aggregator by producers, plus
//! the injected validation seam deciding which samples are accepted.

use crate::models::entity::EntityId;
use crate::models::registry::{MetricId, MetricRegistry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// One sample of metric values for a single entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Entity the sample is attributed to
    pub entity: EntityId,

    /// Sample timestamp in absolute milliseconds
    pub sample_time_ms: i64,

    /// Metric values carried by this sample, keyed by metric id
    pub values: HashMap<MetricId, f64>,

    /// Opaque tag identifying where the sample was taken
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<i32>,
}

impl MetricSample {
    /// Create an empty sample for an entity at a point in time.
    pub fn new(entity: EntityId, sample_time_ms: i64) -> Self {
        Self {
            entity,
            sample_time_ms,
            values: HashMap::new(),
            source_id: None,
        }
    }

    /// Set the value for one metric.
    pub fn set_value(&mut self, id: MetricId, value: f64) {
        self.values.insert(id, value);
    }

    /// Builder-style variant of [`set_value`](Self::set_value).
    pub fn with_value(mut self, id: MetricId, value: f64) -> Self {
        self.set_value(id, value);
        self
    }
}

/// Decides whether a sample is accepted into the store
pub trait SampleValidator: Send + Sync {
    fn validate(&self, sample: &MetricSample) -> bool;
}

/// Default validation: a sample is accepted iff it carries a value for every
/// registered metric.
pub struct DefaultSampleValidator {
    registry: Arc<MetricRegistry>,
}

impl DefaultSampleValidator {
    pub fn new(registry: Arc<MetricRegistry>) -> Self {
        Self { registry }
    }
}

impl SampleValidator for DefaultSampleValidator {
    fn validate(&self, sample: &MetricSample) -> bool {
        sample.values.len() == self.registry.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::registry::AggregationStrategy;

    fn registry() -> Arc<MetricRegistry> {
        Arc::new(MetricRegistry::new([
            ("cpu", AggregationStrategy::Avg),
            ("disk", AggregationStrategy::Latest),
        ]))
    }

    #[test]
    fn test_default_validator_requires_all_metrics() {
        let validator = DefaultSampleValidator::new(registry());
        let entity = EntityId::new("topic-0", "rack-a");

        let incomplete = MetricSample::new(entity.clone(), 1_000).with_value(0, 0.4);
        assert!(!validator.validate(&incomplete));

        let complete = incomplete.with_value(1, 0.7);
        assert!(validator.validate(&complete));
    }

    #[test]
    fn test_sample_serialization_roundtrip() {
        let sample = MetricSample::new(EntityId::new("topic-1", "rack-b"), 5_000)
            .with_value(0, 1.25)
            .with_value(1, 3.5);
        let json = serde_json::to_string(&sample).unwrap();
        let back: MetricSample = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample);
    }
}
