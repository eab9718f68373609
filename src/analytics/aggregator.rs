//! Sample Aggregator
//!
//! Orchestrates ingestion, window rollover, eviction gating, cache
//! management, and the produce-result path. Producers call [`add`] from many
//! threads; readers call [`aggregate`] and [`completeness`] concurrently.
//! Window creation and eviction are serialized by a structural lock so that
//! rollover always observes a consistent active window and generation, while
//! per-entity updates stay on the concurrent fast path.
//!
//! [`add`]: SampleAggregator::add
//! [`aggregate`]: SampleAggregator::aggregate
//! [`completeness`]: SampleAggregator::completeness

use crate::analytics::completeness::{Completeness, CompletenessAnalyzer};
use crate::analytics::extrapolation::{Extrapolation, ExtrapolationEngine};
use crate::analytics::state::{
    AggregatorState, AggregatorStateSnapshot, CompletenessKey, GenerationClock,
};
use crate::analytics::{AggregationOptions, OptionsFingerprint};
use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::models::entity::EntityId;
use crate::models::registry::MetricRegistry;
use crate::models::sample::{DefaultSampleValidator, MetricSample, SampleValidator};
use crate::models::window::{FIRST_WINDOW_ID, WindowId, WindowIndex};
use crate::store::raw::RawStore;
use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Sentinel for "no sample accepted yet"
const NO_ACTIVE_WINDOW: i64 = i64::MIN;

/// Per-entity aggregation output: one value vector per metric across the
/// selected windows, most recent window first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuesAndExtrapolations {
    /// Window start times in milliseconds, descending
    pub windows: Vec<i64>,

    /// Value vectors indexed by dense metric id; each vector is parallel to
    /// `windows`
    pub metric_values: Vec<Vec<f64>>,

    /// Positions that were filled by extrapolation rather than raw data
    pub extrapolations: BTreeMap<usize, Extrapolation>,
}

/// Result of an aggregation query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    /// Generation the result was derived at
    pub generation: u64,

    /// Aggregated series per entity
    pub entity_values: HashMap<EntityId, ValuesAndExtrapolations>,

    /// Entities that failed validity under the query options
    pub invalid_entities: HashSet<EntityId>,
}

/// Counter of in-flight collections; while positive, eviction is suppressed.
#[derive(Debug, Default)]
struct CollectionGate {
    count: Mutex<u32>,
    idle: Condvar,
}

impl CollectionGate {
    fn begin(&self) {
        *self.count.lock() += 1;
    }

    fn end(&self) -> bool {
        let mut count = self.count.lock();
        *count -= 1;
        let idle = *count == 0;
        if idle {
            self.idle.notify_all();
        }
        idle
    }

    fn is_idle(&self) -> bool {
        *self.count.lock() == 0
    }

    fn wait_idle(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.idle.wait(&mut count);
        }
    }
}

/// Scoped collection marker; released on all exit paths.
struct CollectionGuard<'a> {
    aggregator: &'a SampleAggregator,
}

impl Drop for CollectionGuard<'_> {
    fn drop(&mut self) {
        let idle = self.aggregator.collections.end();
        if idle && self.aggregator.eviction_pending.load(Ordering::Acquire) {
            let _structural = self.aggregator.structural.lock();
            self.aggregator.evict_locked();
        }
    }
}

/// Single-slot aggregation cache entry
struct CachedAggregation {
    generation: u64,
    from_window: WindowId,
    to_window: WindowId,
    fingerprint: OptionsFingerprint,
    interested_hash: u64,
    result: Arc<AggregationResult>,
}

/// Windowed, multi-entity sample aggregator
pub struct SampleAggregator {
    config: MonitorConfig,
    registry: Arc<MetricRegistry>,
    validator: Box<dyn SampleValidator>,
    index: WindowIndex,
    store: RawStore,
    state: AggregatorState,
    generation: GenerationClock,
    active_window: AtomicI64,
    structural: Mutex<()>,
    collections: CollectionGate,
    eviction_pending: AtomicBool,
    aggregation_cache: RwLock<Option<CachedAggregation>>,
}

impl SampleAggregator {
    /// Create an aggregator with the default sample validator.
    pub fn new(config: MonitorConfig, registry: Arc<MetricRegistry>) -> Result<Self> {
        let validator = Box::new(DefaultSampleValidator::new(registry.clone()));
        Self::with_validator(config, registry, validator)
    }

    /// Create an aggregator with an injected sample validator.
    pub fn with_validator(
        config: MonitorConfig,
        registry: Arc<MetricRegistry>,
        validator: Box<dyn SampleValidator>,
    ) -> Result<Self> {
        config.validate()?;
        if registry.is_empty() {
            return Err(MonitorError::InvalidArgument(
                "metric registry must not be empty".to_string(),
            ));
        }
        let index = WindowIndex::new(config.window_ms);
        let store = RawStore::new(registry.clone());
        Ok(Self {
            config,
            registry,
            validator,
            index,
            store,
            state: AggregatorState::new(),
            generation: GenerationClock::default(),
            active_window: AtomicI64::new(NO_ACTIVE_WINDOW),
            structural: Mutex::new(()),
            collections: CollectionGate::default(),
            eviction_pending: AtomicBool::new(false),
            aggregation_cache: RwLock::new(None),
        })
    }

    /// Ingest one sample. Returns whether the sample was accepted.
    ///
    /// Acceptance is owned by the injected [`SampleValidator`]. Beyond that,
    /// the engine only enforces its window domain: samples mapping below
    /// [`FIRST_WINDOW_ID`] or into a window older than the earliest retained
    /// one are dropped without any state change.
    pub fn add(&self, sample: &MetricSample) -> bool {
        if !self.validator.validate(sample) {
            return false;
        }
        let window = self.index.window_of(sample.sample_time_ms);
        if window < FIRST_WINDOW_ID {
            debug!(
                window,
                t_ms = sample.sample_time_ms,
                "dropping sample below the window id domain"
            );
            return false;
        }

        let active = self.active_window.load(Ordering::Acquire);
        if active == NO_ACTIVE_WINDOW || window > active {
            self.roll_forward(window);
        }

        if let Some(earliest) = self.store.earliest_window() {
            if window < earliest {
                debug!(window, earliest, entity = %sample.entity, "dropping stale sample");
                return false;
            }
        }

        let Some(accumulator) = self.store.put(window, &sample.entity) else {
            // The window was evicted between the staleness check and the
            // insert; the sample is stale after all.
            return false;
        };
        accumulator.add_sample(sample);
        self.state.on_sample(&sample.entity, window);

        let active = self.active_window.load(Ordering::Acquire);
        if window != active {
            let generation = self.generation.bump();
            self.state.on_back_insert(window, generation);
            self.invalidate_aggregation_cache();
            debug!(window, generation, "back-insertion into settled window");
        }
        true
    }

    /// Aggregate the range `[from_ms, to_ms]` into per-entity value vectors
    /// across the most recent `options.num_windows` valid windows. The
    /// active window is never part of the result.
    pub fn aggregate(
        &self,
        from_ms: i64,
        to_ms: i64,
        options: &AggregationOptions,
    ) -> Result<Arc<AggregationResult>> {
        options.validate()?;
        Self::validate_range(from_ms, to_ms)?;

        let _collection = self.begin_collection();
        let generation = self.generation.current();
        let Some((from, to)) = self.resolve_range(from_ms, to_ms) else {
            return Err(MonitorError::NotEnoughValidWindows {
                required: options.num_windows,
                available: 0,
            });
        };

        let interested = self.interested(options);
        let interested_hash = entity_set_hash(&interested);
        let fingerprint = options.fingerprint();
        if let Some(cached) =
            self.cached_aggregation(generation, from, to, fingerprint, interested_hash)
        {
            debug!(generation, from, to, "aggregation cache hit");
            return Ok(cached);
        }

        let completeness = self.completeness_for(from, to, options, &interested);
        let valid_windows: Vec<WindowId> =
            completeness.valid_window_indexes.iter().copied().collect();
        if valid_windows.len() < options.num_windows {
            return Err(MonitorError::NotEnoughValidWindows {
                required: options.num_windows,
                available: valid_windows.len(),
            });
        }

        // The last num_windows valid windows, reported most recent first.
        let selected: Vec<WindowId> = valid_windows[valid_windows.len() - options.num_windows..]
            .iter()
            .rev()
            .copied()
            .collect();
        let window_starts: Vec<i64> = selected
            .iter()
            .map(|window| self.index.window_start(*window))
            .collect();

        let engine = self.engine();
        let mut entity_values = HashMap::new();
        let mut invalid_entities = HashSet::new();

        for entity in &interested {
            if !completeness.valid_entities.contains(entity) {
                invalid_entities.insert(entity.clone());
                if !options.include_invalid_entities {
                    continue;
                }
            }
            match self.collect_entity(
                &engine,
                entity,
                &selected,
                &window_starts,
                options.include_invalid_entities,
            )? {
                Some(values) => {
                    entity_values.insert(entity.clone(), values);
                }
                None => {
                    invalid_entities.insert(entity.clone());
                }
            }
        }

        debug!(
            generation,
            from,
            to,
            entities = entity_values.len(),
            invalid = invalid_entities.len(),
            "aggregation computed"
        );
        let result = Arc::new(AggregationResult {
            generation,
            entity_values,
            invalid_entities,
        });
        self.store_aggregation_cache(CachedAggregation {
            generation,
            from_window: from,
            to_window: to,
            fingerprint,
            interested_hash,
            result: result.clone(),
        });
        Ok(result)
    }

    /// Completeness report for the range `[from_ms, to_ms]` under the given
    /// options. Insufficient data yields empty sets, never an error.
    pub fn completeness(
        &self,
        from_ms: i64,
        to_ms: i64,
        options: &AggregationOptions,
    ) -> Result<Arc<Completeness>> {
        options.validate()?;
        Self::validate_range(from_ms, to_ms)?;

        let _collection = self.begin_collection();
        let Some((from, to)) = self.resolve_range(from_ms, to_ms) else {
            return Ok(Arc::new(Completeness::default()));
        };
        let interested = self.interested(options);
        Ok(self.completeness_for(from, to, options, &interested))
    }

    /// Current generation.
    pub fn generation(&self) -> u64 {
        self.generation.current()
    }

    /// Start of the oldest retained window, in milliseconds.
    pub fn earliest_window(&self) -> Option<i64> {
        self.store
            .earliest_window()
            .map(|window| self.index.window_start(window))
    }

    /// Start of the active window, in milliseconds.
    pub fn active_window(&self) -> Option<i64> {
        self.active_window_id()
            .map(|window| self.index.window_start(window))
    }

    /// Start of every retained window, ascending, in milliseconds.
    pub fn all_windows(&self) -> Vec<i64> {
        self.store
            .window_ids()
            .into_iter()
            .map(|window| self.index.window_start(window))
            .collect()
    }

    /// Like [`all_windows`](Self::all_windows), excluding the active window.
    pub fn available_windows(&self) -> Vec<i64> {
        let active = self.active_window.load(Ordering::Acquire);
        self.store
            .window_ids()
            .into_iter()
            .filter(|window| *window != active)
            .map(|window| self.index.window_start(window))
            .collect()
    }

    /// Read-only view of per-window generations and entity coverage.
    pub fn aggregator_state(&self) -> AggregatorStateSnapshot {
        self.state.snapshot()
    }

    /// The metric catalog this aggregator was built with.
    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    /// The construction parameters.
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Drop all samples and windows. Blocks until in-flight collections
    /// finish, then bumps the generation.
    pub fn clear(&self) {
        self.collections.wait_idle();
        let _structural = self.structural.lock();
        self.store.clear();
        self.state.clear();
        self.active_window.store(NO_ACTIVE_WINDOW, Ordering::Release);
        let generation = self.generation.bump();
        self.invalidate_aggregation_cache();
        info!(generation, "sample store cleared");
    }

    /// Drop the given entities from every retained window. Returns the
    /// number of (entity, window) buckets removed.
    pub fn remove_entities(&self, entities: &HashSet<EntityId>) -> usize {
        let _structural = self.structural.lock();
        let removed = self.store.remove_entities(entities);
        if removed > 0 {
            self.state.remove_entities(entities);
            let generation = self.generation.bump();
            self.invalidate_aggregation_cache();
            info!(removed, generation, "entities removed from sample store");
        }
        removed
    }

    /// Keep only the given entities, dropping everything else. Returns the
    /// number of (entity, window) buckets removed.
    pub fn retain_entities(&self, keep: &HashSet<EntityId>) -> usize {
        let dropped: HashSet<EntityId> = self.state.entities().difference(keep).cloned().collect();
        if dropped.is_empty() {
            return 0;
        }
        self.remove_entities(&dropped)
    }

    fn validate_range(from_ms: i64, to_ms: i64) -> Result<()> {
        if from_ms > to_ms {
            return Err(MonitorError::InvalidArgument(format!(
                "range start {from_ms} is after range end {to_ms}"
            )));
        }
        Ok(())
    }

    fn active_window_id(&self) -> Option<WindowId> {
        let active = self.active_window.load(Ordering::Acquire);
        (active != NO_ACTIVE_WINDOW).then_some(active)
    }

    /// Promote the active window, materializing every window in between so
    /// that retained ids stay contiguous, then attempt eviction.
    fn roll_forward(&self, window: WindowId) {
        let _structural = self.structural.lock();
        let active = self.active_window.load(Ordering::Acquire);
        if active != NO_ACTIVE_WINDOW && window <= active {
            return;
        }
        let generation = self.generation.bump();
        if active == NO_ACTIVE_WINDOW {
            self.store.ensure_window(window);
            self.state.on_window_created(window, generation);
            info!(window, "first window materialized");
        } else {
            // Keep retained ids contiguous, but never materialize windows
            // that the retention bound would evict right away.
            let horizon = window - (self.config.max_windows_retained() as i64 - 1);
            let start = (active + 1).max(horizon);
            for fresh in start..=window {
                self.store.ensure_window(fresh);
                self.state.on_window_created(fresh, generation);
            }
            debug!(from = active, to = window, generation, "window rollover");
        }
        self.active_window.store(window, Ordering::Release);
        self.invalidate_aggregation_cache();
        self.state.invalidate_caches();
        self.evict_locked();
    }

    /// Trim head windows down to the retention bound. Must run under the
    /// structural lock. Skipped while a collection is in flight; retried
    /// when the last collection guard drops.
    fn evict_locked(&self) {
        if !self.collections.is_idle() {
            self.eviction_pending.store(true, Ordering::Release);
            return;
        }
        self.eviction_pending.store(false, Ordering::Release);
        let max_retained = self.config.max_windows_retained();
        let evicted = self.store.evict_oldest_while(|len| len > max_retained);
        for window in &evicted {
            self.state.on_window_evicted(*window);
        }
        if !evicted.is_empty() {
            debug!(
                count = evicted.len(),
                through = evicted[evicted.len() - 1],
                "evicted oldest windows"
            );
        }
    }

    fn begin_collection(&self) -> CollectionGuard<'_> {
        self.collections.begin();
        CollectionGuard { aggregator: self }
    }

    /// Clamp the queried range to `[earliest retained, active - 1]`.
    fn resolve_range(&self, from_ms: i64, to_ms: i64) -> Option<(WindowId, WindowId)> {
        let active = self.active_window_id()?;
        let earliest = self.store.earliest_window()?;
        let from = self.index.window_of(from_ms).max(earliest);
        let to = self.index.window_of(to_ms).min(active - 1);
        (from <= to).then_some((from, to))
    }

    fn interested(&self, options: &AggregationOptions) -> HashSet<EntityId> {
        if options.interested_entities.is_empty() {
            self.state.entities()
        } else {
            options.interested_entities.clone()
        }
    }

    fn engine(&self) -> ExtrapolationEngine<'_> {
        ExtrapolationEngine::new(
            &self.store,
            &self.registry,
            self.config.min_samples_per_window,
            self.config.min_samples_for_extrapolation(),
            self.config.num_windows,
        )
    }

    fn completeness_for(
        &self,
        from: WindowId,
        to: WindowId,
        options: &AggregationOptions,
        interested: &HashSet<EntityId>,
    ) -> Arc<Completeness> {
        let key = CompletenessKey {
            generation: self.generation.current(),
            from_window: from,
            to_window: to,
            fingerprint: options.fingerprint(),
            interested_hash: entity_set_hash(interested),
        };
        if let Some(cached) = self.state.cached_completeness(&key) {
            debug!(generation = key.generation, from, to, "completeness cache hit");
            return cached;
        }
        let engine = self.engine();
        let analyzer = CompletenessAnalyzer::new(&engine);
        let completeness = Arc::new(analyzer.analyze(from, to, options, interested));
        self.state.cache_completeness(key, completeness.clone());
        completeness
    }

    fn collect_entity(
        &self,
        engine: &ExtrapolationEngine<'_>,
        entity: &EntityId,
        selected: &[WindowId],
        window_starts: &[i64],
        allow_forced: bool,
    ) -> Result<Option<ValuesAndExtrapolations>> {
        let num_metrics = self.registry.len();
        let mut metric_values = vec![vec![0.0; selected.len()]; num_metrics];
        let mut extrapolations = BTreeMap::new();

        for (position, window) in selected.iter().enumerate() {
            let Some((values, extrapolation)) = engine.resolve(entity, *window, allow_forced)?
            else {
                return Ok(None);
            };
            if values.values.len() != num_metrics {
                return Err(MonitorError::InternalInconsistency(format!(
                    "window {window} of {entity} froze {} metrics, registry has {num_metrics}",
                    values.values.len()
                )));
            }
            for (metric, value) in values.values.iter().enumerate() {
                metric_values[metric][position] = *value;
            }
            if let Some(kind) = extrapolation {
                extrapolations.insert(position, kind);
            }
        }

        Ok(Some(ValuesAndExtrapolations {
            windows: window_starts.to_vec(),
            metric_values,
            extrapolations,
        }))
    }

    fn cached_aggregation(
        &self,
        generation: u64,
        from: WindowId,
        to: WindowId,
        fingerprint: OptionsFingerprint,
        interested_hash: u64,
    ) -> Option<Arc<AggregationResult>> {
        let cache = self.aggregation_cache.read();
        let cached = cache.as_ref()?;
        (cached.generation == generation
            && cached.from_window == from
            && cached.to_window == to
            && cached.fingerprint == fingerprint
            && cached.interested_hash == interested_hash)
            .then(|| cached.result.clone())
    }

    fn store_aggregation_cache(&self, entry: CachedAggregation) {
        let _structural = self.structural.lock();
        *self.aggregation_cache.write() = Some(entry);
    }

    fn invalidate_aggregation_cache(&self) {
        *self.aggregation_cache.write() = None;
    }
}

/// Order-independent hash of an entity set.
fn entity_set_hash(entities: &HashSet<EntityId>) -> u64 {
    let mut combined: u64 = 0;
    for entity in entities {
        let mut hasher = DefaultHasher::new();
        entity.hash(&mut hasher);
        combined ^= hasher.finish();
    }
    combined
}
