//! Cluster Load Monitor
//!
//! Windowed metric-sample aggregation engine for cluster load monitoring.
//! Samples attributed to named entities are bucketed into fixed-width time
//! windows; on demand the engine produces per-entity aggregated time series
//! together with a data-completeness report so callers can decide whether
//! enough evidence exists to act.
//!
//! # Overview
//!
//! This crate provides:
//! - **Metric Catalog**: dense metric ids with per-metric aggregation
//!   strategies (latest, max, avg, sum)
//! - **Windowed Store**: ordered window map with per-entity accumulators and
//!   bounded retention of recent history
//! - **Aggregation**: per-entity value vectors across the most recent valid
//!   windows, with extrapolation of under-sampled cells
//! - **Completeness**: per-window coverage ratios and validity sets under
//!   caller-supplied thresholds
//!
//! Producers call [`SampleAggregator::add`] from many threads; readers call
//! [`SampleAggregator::aggregate`] and [`SampleAggregator::completeness`]
//! concurrently. Mutations that could invalidate cached aggregates bump a
//! monotonic generation counter.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use cluster_load_monitor::{
//!     AggregationOptions, EntityId, MetricRegistry, MetricSample, MonitorConfig,
//!     SampleAggregator,
//! };
//!
//! let registry = Arc::new(MetricRegistry::cluster_default());
//! let config = MonitorConfig {
//!     window_ms: 1_000,
//!     min_samples_per_window: 1,
//!     ..MonitorConfig::default()
//! };
//! let aggregator = SampleAggregator::new(config, registry.clone()).unwrap();
//!
//! let entity = EntityId::new("topic-0", "rack-a");
//! for window in 1..=4i64 {
//!     let mut sample = MetricSample::new(entity.clone(), window * 1_000);
//!     for def in registry.all() {
//!         sample.set_value(def.id, 0.5);
//!     }
//!     assert!(aggregator.add(&sample));
//! }
//!
//! let options = AggregationOptions {
//!     num_windows: 3,
//!     ..AggregationOptions::default()
//! };
//! let result = aggregator.aggregate(0, 10_000, &options).unwrap();
//! assert_eq!(result.entity_values.len(), 1);
//! assert_eq!(result.entity_values[&entity].windows, vec![3_000, 2_000, 1_000]);
//! ```

pub mod analytics;
pub mod config;
pub mod error;
pub mod models;
pub mod store;

// Re-export commonly used types at the crate root
pub use analytics::aggregator::{AggregationResult, SampleAggregator, ValuesAndExtrapolations};
pub use analytics::completeness::{Completeness, CompletenessAnalyzer};
pub use analytics::extrapolation::{Extrapolation, ExtrapolationEngine};
pub use analytics::state::{AggregatorState, AggregatorStateSnapshot, GenerationClock};
pub use analytics::{AggregationOptions, Granularity, OptionsFingerprint};
pub use config::MonitorConfig;
pub use error::{MonitorError, Result};
pub use models::entity::EntityId;
pub use models::registry::{AggregationStrategy, MetricDef, MetricId, MetricRegistry};
pub use models::sample::{DefaultSampleValidator, MetricSample, SampleValidator};
pub use models::window::{FIRST_WINDOW_ID, WindowId, WindowIndex};
pub use store::aggregated::{AggregatedMetrics, WindowValues};
pub use store::raw::RawStore;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constant() {
        assert!(!VERSION.is_empty());
    }
}
