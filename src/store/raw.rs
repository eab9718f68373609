//! Raw Sample Store
//!
//! Ordered mapping from window id to the per-entity accumulators of that
//! window. The outer map is ordered so eviction can trim from the head; the
//! per-window submap is concurrent so producers on different entities do not
//! contend.

use crate::models::entity::EntityId;
use crate::models::registry::MetricRegistry;
use crate::models::window::WindowId;
use crate::store::aggregated::AggregatedMetrics;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Per-window map from entity to its accumulator
pub type WindowSlot = Arc<DashMap<EntityId, Arc<AggregatedMetrics>>>;

/// Ordered window store owning all accumulators
#[derive(Debug)]
pub struct RawStore {
    registry: Arc<MetricRegistry>,
    windows: RwLock<BTreeMap<WindowId, WindowSlot>>,
}

impl RawStore {
    pub fn new(registry: Arc<MetricRegistry>) -> Self {
        Self {
            registry,
            windows: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of retained windows.
    pub fn len(&self) -> usize {
        self.windows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.read().is_empty()
    }

    /// Oldest retained window id.
    pub fn earliest_window(&self) -> Option<WindowId> {
        self.windows.read().keys().next().copied()
    }

    /// Newest retained window id.
    pub fn latest_window(&self) -> Option<WindowId> {
        self.windows.read().keys().next_back().copied()
    }

    /// All retained window ids in ascending order.
    pub fn window_ids(&self) -> Vec<WindowId> {
        self.windows.read().keys().copied().collect()
    }

    /// Insert an empty bucket for a window if absent. Returns true when the
    /// window was newly created. Callers serialize window creation through
    /// the aggregator's structural lock.
    pub fn ensure_window(&self, window: WindowId) -> bool {
        let mut windows = self.windows.write();
        match windows.entry(window) {
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(DashMap::new()));
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Accumulator for (window, entity), created atomically if absent.
    /// Returns None when the window itself is not retained.
    pub fn put(&self, window: WindowId, entity: &EntityId) -> Option<Arc<AggregatedMetrics>> {
        let slot = {
            let windows = self.windows.read();
            windows.get(&window)?.clone()
        };
        let agg = slot
            .entry(entity.clone())
            .or_insert_with(|| Arc::new(AggregatedMetrics::new(&self.registry)))
            .value()
            .clone();
        Some(agg)
    }

    /// Accumulator for (window, entity) if it exists.
    pub fn get(&self, window: WindowId, entity: &EntityId) -> Option<Arc<AggregatedMetrics>> {
        let windows = self.windows.read();
        let slot = windows.get(&window)?;
        slot.get(entity).map(|entry| entry.value().clone())
    }

    /// Read-only ordered view over `[from, to]`, inclusive of both ends.
    pub fn range_view(&self, from: WindowId, to: WindowId) -> Vec<(WindowId, WindowSlot)> {
        if from > to {
            return Vec::new();
        }
        let windows = self.windows.read();
        windows
            .range(from..=to)
            .map(|(window, slot)| (*window, slot.clone()))
            .collect()
    }

    /// Every entity with at least one accumulator in any retained window.
    pub fn all_entities(&self) -> HashSet<EntityId> {
        let windows = self.windows.read();
        let mut entities = HashSet::new();
        for slot in windows.values() {
            for entry in slot.iter() {
                entities.insert(entry.key().clone());
            }
        }
        entities
    }

    /// Remove head windows while the predicate holds for the current size.
    /// Returns the evicted window ids in eviction order.
    pub fn evict_oldest_while<F>(&self, mut pred: F) -> Vec<WindowId>
    where
        F: FnMut(usize) -> bool,
    {
        let mut windows = self.windows.write();
        let mut evicted = Vec::new();
        while !windows.is_empty() && pred(windows.len()) {
            if let Some((window, _)) = windows.pop_first() {
                evicted.push(window);
            }
        }
        evicted
    }

    /// Drop the accumulators of the given entities across all windows.
    /// Returns the number of (entity, window) buckets removed.
    pub fn remove_entities(&self, entities: &HashSet<EntityId>) -> usize {
        let windows = self.windows.read();
        let mut removed = 0;
        for slot in windows.values() {
            for entity in entities {
                if slot.remove(entity).is_some() {
                    removed += 1;
                }
            }
        }
        removed
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.windows.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::registry::AggregationStrategy;
    use crate::models::sample::MetricSample;

    fn store() -> RawStore {
        RawStore::new(Arc::new(MetricRegistry::new([(
            "cpu",
            AggregationStrategy::Avg,
        )])))
    }

    fn entity(name: &str) -> EntityId {
        EntityId::new(name, "rack-a")
    }

    #[test]
    fn test_put_requires_retained_window() {
        let store = store();
        assert!(store.put(3, &entity("e1")).is_none());

        store.ensure_window(3);
        let agg = store.put(3, &entity("e1")).unwrap();
        agg.add_sample(&MetricSample::new(entity("e1"), 3_000).with_value(0, 1.0));

        assert_eq!(store.get(3, &entity("e1")).unwrap().num_samples(), 1);
        assert!(store.get(3, &entity("e2")).is_none());
    }

    #[test]
    fn test_window_order_and_range_view() {
        let store = store();
        for w in [5, 2, 9, 3] {
            store.ensure_window(w);
        }
        assert_eq!(store.window_ids(), vec![2, 3, 5, 9]);
        assert_eq!(store.earliest_window(), Some(2));
        assert_eq!(store.latest_window(), Some(9));

        let view: Vec<WindowId> = store.range_view(3, 5).into_iter().map(|(w, _)| w).collect();
        assert_eq!(view, vec![3, 5]);
        assert!(store.range_view(6, 3).is_empty());
    }

    #[test]
    fn test_evict_oldest_while() {
        let store = store();
        for w in 1..=6 {
            store.ensure_window(w);
        }
        let evicted = store.evict_oldest_while(|len| len > 4);
        assert_eq!(evicted, vec![1, 2]);
        assert_eq!(store.window_ids(), vec![3, 4, 5, 6]);
    }

    #[test]
    fn test_remove_entities() {
        let store = store();
        store.ensure_window(1);
        store.ensure_window(2);
        for w in [1, 2] {
            store.put(w, &entity("e1"));
            store.put(w, &entity("e2"));
        }

        let removed = store.remove_entities(&HashSet::from([entity("e1")]));
        assert_eq!(removed, 2);
        assert!(store.get(1, &entity("e1")).is_none());
        assert!(store.get(1, &entity("e2")).is_some());
        assert_eq!(store.all_entities(), HashSet::from([entity("e2")]));
    }
}
