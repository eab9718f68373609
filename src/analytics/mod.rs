//! Aggregation Analytics
//!
//! Windowed aggregation, extrapolation of under-sampled cells, and
//! completeness analysis under caller-supplied coverage thresholds.

pub mod aggregator;
pub mod completeness;
pub mod extrapolation;
pub mod state;

pub use aggregator::{AggregationResult, SampleAggregator, ValuesAndExtrapolations};
pub use completeness::{Completeness, CompletenessAnalyzer};
pub use extrapolation::{Extrapolation, ExtrapolationEngine};
pub use state::{AggregatorState, AggregatorStateSnapshot, GenerationClock};

use crate::error::{MonitorError, Result};
use crate::models::entity::EntityId;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

/// Axis on which validity is judged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// Each entity qualifies on its own
    Entity,
    /// An entity qualifies only when its whole group does
    EntityGroup,
}

/// Caller-supplied thresholds and filters for aggregation and completeness
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationOptions {
    /// Minimum fraction of interested entities that must be present for a
    /// window to be valid, judged at the selected granularity
    pub min_valid_entity_ratio: f64,

    /// Minimum fraction of entity groups that must be fully present for a
    /// window to be valid
    pub min_valid_entity_group_ratio: f64,

    /// Number of windows the result must span
    pub num_windows: usize,

    /// Entities the caller cares about; empty means every entity observed
    pub interested_entities: HashSet<EntityId>,

    /// Granularity at which entity validity is judged
    pub granularity: Granularity,

    /// Whether invalid entities are still materialized in results, using
    /// forced extrapolations where data is missing
    pub include_invalid_entities: bool,
}

impl Default for AggregationOptions {
    fn default() -> Self {
        Self {
            min_valid_entity_ratio: 0.0,
            min_valid_entity_group_ratio: 0.0,
            num_windows: 1,
            interested_entities: HashSet::new(),
            granularity: Granularity::Entity,
            include_invalid_entities: false,
        }
    }
}

impl AggregationOptions {
    /// Validate thresholds and the requested window count.
    pub fn validate(&self) -> Result<()> {
        if self.num_windows == 0 {
            return Err(MonitorError::InvalidArgument(
                "options.num_windows must be positive".to_string(),
            ));
        }
        for (name, ratio) in [
            ("min_valid_entity_ratio", self.min_valid_entity_ratio),
            (
                "min_valid_entity_group_ratio",
                self.min_valid_entity_group_ratio,
            ),
        ] {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(MonitorError::InvalidArgument(format!(
                    "options.{name} must be within [0, 1], got {ratio}"
                )));
            }
        }
        Ok(())
    }

    /// Hashable identity of the options, used as a cache key component.
    /// The entity set is hashed order-independently.
    pub fn fingerprint(&self) -> OptionsFingerprint {
        let mut entities_hash: u64 = 0;
        for entity in &self.interested_entities {
            let mut hasher = DefaultHasher::new();
            entity.hash(&mut hasher);
            entities_hash ^= hasher.finish();
        }
        OptionsFingerprint {
            min_valid_entity_ratio_bits: self.min_valid_entity_ratio.to_bits(),
            min_valid_entity_group_ratio_bits: self.min_valid_entity_group_ratio.to_bits(),
            num_windows: self.num_windows,
            num_interested_entities: self.interested_entities.len(),
            entities_hash,
            granularity: self.granularity,
            include_invalid_entities: self.include_invalid_entities,
        }
    }
}

/// Value-comparable identity of an [`AggregationOptions`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OptionsFingerprint {
    min_valid_entity_ratio_bits: u64,
    min_valid_entity_group_ratio_bits: u64,
    num_windows: usize,
    num_interested_entities: usize,
    entities_hash: u64,
    granularity: Granularity,
    include_invalid_entities: bool,
}
