//! Completeness Analysis
//!
//! Given a window range and coverage thresholds, reports which windows,
//! entities, and entity groups hold enough evidence to act on.

use crate::analytics::extrapolation::ExtrapolationEngine;
use crate::analytics::{AggregationOptions, Granularity};
use crate::models::entity::EntityId;
use crate::models::window::WindowId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Data-completeness report over a window range
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Completeness {
    /// Windows satisfying both coverage thresholds
    pub valid_window_indexes: BTreeSet<WindowId>,

    /// Entities present in every valid window (their whole group, under
    /// group granularity)
    pub valid_entities: HashSet<EntityId>,

    /// Groups whose interested entities are all valid
    pub valid_entity_groups: HashSet<String>,

    /// Fraction of interested entities present, per window in range
    pub entity_ratio_by_window: BTreeMap<WindowId, f64>,

    /// Fraction of groups fully present, per window in range
    pub entity_group_ratio_by_window: BTreeMap<WindowId, f64>,

    /// Fraction of interested entities that sit in fully present groups,
    /// per window in range
    pub entity_ratio_with_group_granularity_by_window: BTreeMap<WindowId, f64>,
}

/// Derives a [`Completeness`] report from the raw store
pub struct CompletenessAnalyzer<'a> {
    engine: &'a ExtrapolationEngine<'a>,
}

impl<'a> CompletenessAnalyzer<'a> {
    pub fn new(engine: &'a ExtrapolationEngine<'a>) -> Self {
        Self { engine }
    }

    /// Analyze the inclusive window range `[from, to]` for the interested
    /// entities. The caller resolves an empty interest set to every observed
    /// entity and clamps the range below the active window.
    pub fn analyze(
        &self,
        from: WindowId,
        to: WindowId,
        options: &AggregationOptions,
        interested: &HashSet<EntityId>,
    ) -> Completeness {
        let mut completeness = Completeness::default();
        if from > to || interested.is_empty() {
            return completeness;
        }

        let mut groups: HashMap<&str, Vec<&EntityId>> = HashMap::new();
        for entity in interested {
            groups.entry(entity.group()).or_default().push(entity);
        }
        let total_entities = interested.len() as f64;
        let total_groups = groups.len() as f64;

        // Presence matrix, computed once per (entity, window) cell.
        let mut present_windows: HashMap<&EntityId, BTreeSet<WindowId>> = HashMap::new();
        for entity in interested {
            let windows: BTreeSet<WindowId> = (from..=to)
                .filter(|window| self.engine.is_present(entity, *window))
                .collect();
            present_windows.insert(entity, windows);
        }

        // Windows where every interested entity of a group is present.
        let mut group_windows: HashMap<&str, BTreeSet<WindowId>> = HashMap::new();
        for (group, members) in &groups {
            let mut windows: BTreeSet<WindowId> = (from..=to).collect();
            for member in members {
                windows.retain(|window| present_windows[*member].contains(window));
            }
            group_windows.insert(*group, windows);
        }

        for window in from..=to {
            let present = interested
                .iter()
                .filter(|entity| present_windows[*entity].contains(&window))
                .count();
            let full_groups: Vec<&Vec<&EntityId>> = groups
                .iter()
                .filter(|(group, _)| group_windows[*group].contains(&window))
                .map(|(_, members)| members)
                .collect();
            let entities_in_full_groups: usize = full_groups.iter().map(|members| members.len()).sum();

            let entity_ratio = present as f64 / total_entities;
            let group_ratio = full_groups.len() as f64 / total_groups;
            let group_granularity_ratio = entities_in_full_groups as f64 / total_entities;

            completeness.entity_ratio_by_window.insert(window, entity_ratio);
            completeness
                .entity_group_ratio_by_window
                .insert(window, group_ratio);
            completeness
                .entity_ratio_with_group_granularity_by_window
                .insert(window, group_granularity_ratio);

            let coverage = match options.granularity {
                Granularity::Entity => entity_ratio,
                Granularity::EntityGroup => group_granularity_ratio,
            };
            if coverage >= options.min_valid_entity_ratio
                && group_ratio >= options.min_valid_entity_group_ratio
            {
                completeness.valid_window_indexes.insert(window);
            }
        }

        if completeness.valid_window_indexes.is_empty() {
            return completeness;
        }

        for entity in interested {
            let qualifying = match options.granularity {
                Granularity::Entity => &present_windows[entity],
                Granularity::EntityGroup => &group_windows[entity.group()],
            };
            if completeness
                .valid_window_indexes
                .iter()
                .all(|window| qualifying.contains(window))
            {
                completeness.valid_entities.insert(entity.clone());
            }
        }

        for (group, members) in &groups {
            if members
                .iter()
                .all(|member| completeness.valid_entities.contains(*member))
            {
                completeness.valid_entity_groups.insert((*group).to_string());
            }
        }

        completeness
    }
}
