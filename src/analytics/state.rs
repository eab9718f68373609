//! Aggregator State
//!
//! Generation tracking plus bookkeeping derived from the raw store: which
//! windows exist at which generation, which windows each entity has data in,
//! and the generation-keyed completeness cache.

use crate::analytics::completeness::Completeness;
use crate::analytics::OptionsFingerprint;
use crate::models::entity::EntityId;
use crate::models::window::WindowId;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic counter of mutations that can invalidate cached aggregates
#[derive(Debug, Default)]
pub struct GenerationClock(AtomicU64);

impl GenerationClock {
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Advance the clock, returning the new generation.
    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Cache key for a completeness computation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompletenessKey {
    pub generation: u64,
    pub from_window: WindowId,
    pub to_window: WindowId,
    pub fingerprint: OptionsFingerprint,
    /// Hash of the resolved interested-entity set; an empty option set
    /// resolves to every observed entity, which can drift between queries
    /// without a generation bump.
    pub interested_hash: u64,
}

#[derive(Debug, Default)]
struct StateInner {
    window_generations: BTreeMap<WindowId, u64>,
    entity_windows: HashMap<EntityId, BTreeSet<WindowId>>,
    completeness_cache: HashMap<CompletenessKey, Arc<Completeness>>,
}

/// Bookkeeping that shadows the raw store
#[derive(Debug, Default)]
pub struct AggregatorState {
    inner: RwLock<StateInner>,
}

impl AggregatorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a window created at the given generation.
    pub fn on_window_created(&self, window: WindowId, generation: u64) {
        let mut inner = self.inner.write();
        inner.window_generations.entry(window).or_insert(generation);
    }

    /// Record that an entity contributed data to a window.
    pub fn on_sample(&self, entity: &EntityId, window: WindowId) {
        let mut inner = self.inner.write();
        inner
            .entity_windows
            .entry(entity.clone())
            .or_default()
            .insert(window);
    }

    /// A settled window changed after the fact: bump its generation and drop
    /// derived caches.
    pub fn on_back_insert(&self, window: WindowId, generation: u64) {
        let mut inner = self.inner.write();
        if let Some(window_generation) = inner.window_generations.get_mut(&window) {
            *window_generation = generation;
        }
        inner.completeness_cache.clear();
    }

    /// Forget a window that was evicted from the raw store.
    pub fn on_window_evicted(&self, window: WindowId) {
        let mut inner = self.inner.write();
        inner.window_generations.remove(&window);
        inner.entity_windows.retain(|_, windows| {
            windows.remove(&window);
            !windows.is_empty()
        });
        inner.completeness_cache.clear();
    }

    /// Forget the given entities entirely.
    pub fn remove_entities(&self, entities: &HashSet<EntityId>) {
        let mut inner = self.inner.write();
        for entity in entities {
            inner.entity_windows.remove(entity);
        }
        inner.completeness_cache.clear();
    }

    /// Every entity currently holding data in some retained window.
    pub fn entities(&self) -> HashSet<EntityId> {
        self.inner.read().entity_windows.keys().cloned().collect()
    }

    /// Cached completeness for the key, if any.
    pub fn cached_completeness(&self, key: &CompletenessKey) -> Option<Arc<Completeness>> {
        self.inner.read().completeness_cache.get(key).cloned()
    }

    /// Store a completeness result, pruning entries from older generations.
    pub fn cache_completeness(&self, key: CompletenessKey, completeness: Arc<Completeness>) {
        let mut inner = self.inner.write();
        let generation = key.generation;
        inner
            .completeness_cache
            .retain(|cached, _| cached.generation == generation);
        inner.completeness_cache.insert(key, completeness);
    }

    /// Drop the completeness cache.
    pub fn invalidate_caches(&self) {
        self.inner.write().completeness_cache.clear();
    }

    /// Drop everything.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.window_generations.clear();
        inner.entity_windows.clear();
        inner.completeness_cache.clear();
    }

    /// Read-only snapshot of per-window generations and entity coverage.
    pub fn snapshot(&self) -> AggregatorStateSnapshot {
        let inner = self.inner.read();
        AggregatorStateSnapshot {
            window_generations: inner.window_generations.clone(),
            entity_coverage: inner
                .entity_windows
                .iter()
                .map(|(entity, windows)| (entity.clone(), windows.iter().copied().collect()))
                .collect(),
        }
    }
}

/// Point-in-time view of the aggregator's bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorStateSnapshot {
    /// Generation at which each retained window last changed
    pub window_generations: BTreeMap<WindowId, u64>,

    /// Windows holding data for each entity, ascending
    pub entity_coverage: BTreeMap<EntityId, Vec<WindowId>>,
}
