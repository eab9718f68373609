//! Property-based tests using proptest
//!
//! These tests verify properties that should hold for all inputs.

use cluster_load_monitor::{
    AggregationOptions, AggregationStrategy, EntityId, MetricRegistry, MetricSample, MonitorConfig,
    SampleAggregator, WindowIndex,
};
use proptest::prelude::*;
use std::sync::Arc;

// ============================================================================
// WINDOW ARITHMETIC PROPERTIES
// ============================================================================

proptest! {
    #[test]
    fn test_window_contains_its_timestamp(t_ms in 0i64..1_000_000_000_000i64, window_ms in 1i64..10_000_000i64) {
        let index = WindowIndex::new(window_ms);
        let window = index.window_of(t_ms);
        prop_assert!(index.window_start(window) <= t_ms);
        prop_assert!(t_ms < index.window_start(window + 1));
    }

    #[test]
    fn test_window_starts_are_aligned(window in 0i64..1_000_000i64, window_ms in 1i64..10_000_000i64) {
        let index = WindowIndex::new(window_ms);
        let start = index.window_start(window);
        prop_assert_eq!(start % window_ms, 0);
        prop_assert_eq!(index.window_of(start), window);
    }
}

// ============================================================================
// REDUCTION PROPERTIES
// ============================================================================

proptest! {
    #[test]
    fn test_uniform_samples_reduce_exactly(value in -1_000i32..1_000i32, count in 1u64..20u64) {
        let registry = Arc::new(MetricRegistry::new([
            ("latest", AggregationStrategy::Latest),
            ("max", AggregationStrategy::Max),
            ("avg", AggregationStrategy::Avg),
            ("sum", AggregationStrategy::Sum),
        ]));
        let config = MonitorConfig {
            num_windows: 4,
            window_ms: 1_000,
            min_samples_per_window: count,
            max_extra_windows_kept: 0,
        };
        let aggregator = SampleAggregator::new(config, registry).unwrap();
        let entity = EntityId::new("partition-0", "rack-a");
        let value = f64::from(value);

        // Fill one settled window with uniform samples, then roll past it.
        for window in [1i64, 2i64] {
            for j in 0..count {
                let sample = MetricSample::new(entity.clone(), window * 1_000 + j as i64)
                    .with_value(0, value)
                    .with_value(1, value)
                    .with_value(2, value)
                    .with_value(3, value);
                prop_assert!(aggregator.add(&sample));
            }
        }

        let options = AggregationOptions {
            num_windows: 1,
            ..AggregationOptions::default()
        };
        let result = aggregator.aggregate(0, 1_999, &options).unwrap();
        let series = &result.entity_values[&entity];

        prop_assert!(series.extrapolations.is_empty());
        prop_assert_eq!(series.windows[0], 1_000);
        prop_assert_eq!(series.metric_values[0][0], value);
        prop_assert_eq!(series.metric_values[1][0], value);
        prop_assert_eq!(series.metric_values[2][0], value);
        prop_assert_eq!(series.metric_values[3][0], count as f64 * value);
    }
}

// ============================================================================
// AGGREGATOR INVARIANTS
// ============================================================================

proptest! {
    #[test]
    fn test_generation_is_monotone_and_store_stays_bounded(
        windows in proptest::collection::vec(1i64..40i64, 1..60),
    ) {
        let registry = Arc::new(MetricRegistry::new([("cpu", AggregationStrategy::Avg)]));
        let config = MonitorConfig {
            num_windows: 5,
            window_ms: 1_000,
            min_samples_per_window: 1,
            max_extra_windows_kept: 2,
        };
        let aggregator = SampleAggregator::new(config.clone(), registry).unwrap();
        let entity = EntityId::new("partition-0", "rack-a");

        let mut last_generation = aggregator.generation();
        for window in windows {
            let sample = MetricSample::new(entity.clone(), window * 1_000).with_value(0, 1.0);
            aggregator.add(&sample);

            let generation = aggregator.generation();
            prop_assert!(generation >= last_generation);
            last_generation = generation;

            let all = aggregator.all_windows();
            prop_assert!(all.len() <= config.max_windows_retained());
            prop_assert!(all.windows(2).all(|pair| pair[0] < pair[1]));

            if let (Some(earliest), Some(active)) =
                (aggregator.earliest_window(), aggregator.active_window())
            {
                prop_assert!(earliest <= active);
                prop_assert!(all.iter().all(|w| *w >= earliest && *w <= active));
                let available = aggregator.available_windows();
                let expected: Vec<i64> = all.iter().copied().filter(|w| *w != active).collect();
                prop_assert_eq!(available, expected);
            }
        }
    }

    #[test]
    fn test_completeness_ratios_stay_in_unit_interval(
        cells in proptest::collection::vec((0usize..4usize, 1i64..12i64, 1u64..5u64), 1..40),
    ) {
        let registry = Arc::new(MetricRegistry::new([("cpu", AggregationStrategy::Avg)]));
        let config = MonitorConfig {
            num_windows: 6,
            window_ms: 1_000,
            min_samples_per_window: 3,
            max_extra_windows_kept: 3,
        };
        let aggregator = SampleAggregator::new(config, registry).unwrap();
        let groups = ["rack-a", "rack-a", "rack-b", "rack-c"];

        for (entity_index, window, samples) in cells {
            let entity =
                EntityId::new(format!("partition-{entity_index}"), groups[entity_index]);
            for j in 0..samples {
                let sample =
                    MetricSample::new(entity.clone(), window * 1_000 + j as i64).with_value(0, 1.0);
                aggregator.add(&sample);
            }
        }

        let report = aggregator
            .completeness(0, 1_000_000, &AggregationOptions::default())
            .unwrap();

        let active = aggregator.active_window();
        for map in [
            &report.entity_ratio_by_window,
            &report.entity_group_ratio_by_window,
            &report.entity_ratio_with_group_granularity_by_window,
        ] {
            for (window, ratio) in map.iter() {
                prop_assert!((0.0..=1.0).contains(ratio));
                if let Some(active) = active {
                    prop_assert!(window * 1_000 < active);
                }
            }
        }

        for window in &report.valid_window_indexes {
            prop_assert!(report.entity_ratio_by_window.contains_key(window));
        }
    }
}
