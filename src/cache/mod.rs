//! Calculation cache
//!
//! Get-or-compute-and-persist around a per-waveform calculation. A stored
//! record is trusted and read back; otherwise the calculator runs, the result
//! is checked against its sanity predicate, and either persisted (write-once)
//! or the waveform is quarantined.
//!
//! Calls for the same id serialize on a per-id lock, so concurrent workers
//! never compute or write the same record twice.

mod features;
pub mod record;

pub use features::FeatureCalculator;

use crate::aggregate::Population;
use crate::error::{CalculationError, PipelineError, StoreError};
use crate::store::{CalculationTable, Partition, WaveformStore};
use crate::waveform::WaveformId;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// A per-waveform result that can be persisted and sanity-checked
pub trait Calculation: Clone + Send + Sync + 'static {
    /// Table the record is stored in
    const TABLE: CalculationTable;

    fn to_record(&self) -> String;

    fn from_record(text: &str) -> Result<Self, CalculationError>;

    /// `CalculationError::Implausible` when the values cannot describe a real pulse
    fn validate(&self) -> Result<(), CalculationError>;
}

/// Computes a calculation for one waveform id from the store
pub trait Calculator: Send + Sync {
    type Output: Calculation;

    fn calculate(
        &self,
        store: &dyn WaveformStore,
        id: WaveformId,
    ) -> Result<Self::Output, PipelineError>;
}

/// Lifecycle of an id's calculation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CalculationStatus {
    Pending,
    Computed,
    Quarantined,
}

/// Status derived from what the store holds
pub fn calculation_status(
    store: &dyn WaveformStore,
    table: CalculationTable,
    id: WaveformId,
) -> Result<CalculationStatus, StoreError> {
    if store.load_calculation(table, id)?.is_some() {
        Ok(CalculationStatus::Computed)
    } else if store.contains(Partition::Rejected, id) {
        Ok(CalculationStatus::Quarantined)
    } else {
        Ok(CalculationStatus::Pending)
    }
}

/// Move an id's source waveform to Rejected and purge everything derived
///
/// The source is the Raw record when present, else the Accepted one. Raw
/// stays in place.
pub fn quarantine(store: &dyn WaveformStore, id: WaveformId) -> Result<(), StoreError> {
    let source = [Partition::Raw, Partition::Accepted]
        .into_iter()
        .find(|p| store.contains(*p, id));
    if let Some(partition) = source {
        let record = store.get(partition, id)?;
        store.put(Partition::Rejected, id, &record)?;
    }
    for partition in Partition::DERIVED {
        store.remove(partition, id)?;
    }
    for table in CalculationTable::ALL {
        store.remove_calculation(table, id)?;
    }
    Ok(())
}

/// What `get_or_compute` did
#[derive(Debug, Clone, PartialEq)]
pub enum CacheOutcome<C> {
    /// Read back from the store
    Loaded(C),
    /// Computed and persisted now
    Computed(C),
    /// Failed the sanity predicate; the waveform was quarantined
    Quarantined { reason: String },
}

impl<C> CacheOutcome<C> {
    pub fn value(&self) -> Option<&C> {
        match self {
            CacheOutcome::Loaded(value) | CacheOutcome::Computed(value) => Some(value),
            CacheOutcome::Quarantined { .. } => None,
        }
    }
}

/// Counters since the cache was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub loaded: usize,
    pub computed: usize,
    pub quarantined: usize,
}

pub struct CalculationCache<K: Calculator> {
    store: Arc<dyn WaveformStore>,
    calculator: K,
    population: Mutex<BTreeMap<WaveformId, K::Output>>,
    locks: Mutex<HashMap<WaveformId, Arc<Mutex<()>>>>,
    loaded: AtomicUsize,
    computed: AtomicUsize,
    quarantined: AtomicUsize,
}

impl<K: Calculator> CalculationCache<K> {
    pub fn new(store: Arc<dyn WaveformStore>, calculator: K) -> Self {
        Self {
            store,
            calculator,
            population: Mutex::new(BTreeMap::new()),
            locks: Mutex::new(HashMap::new()),
            loaded: AtomicUsize::new(0),
            computed: AtomicUsize::new(0),
            quarantined: AtomicUsize::new(0),
        }
    }

    fn id_lock(&self, id: WaveformId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(id).or_default())
    }

    /// Forget the id's lock once no other caller holds or awaits it
    fn release_id_lock(&self, id: WaveformId, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // clones are only taken under `locks`, so the count is exact here
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&id);
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn status(&self, id: WaveformId) -> Result<CalculationStatus, StoreError> {
        calculation_status(self.store.as_ref(), K::Output::TABLE, id)
    }

    /// Load, or compute, validate and persist the calculation for `id`
    pub fn get_or_compute(&self, id: WaveformId) -> Result<CacheOutcome<K::Output>, PipelineError> {
        let lock = self.id_lock(id);
        let outcome = {
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            self.load_or_compute(id)
        };
        self.release_id_lock(id, lock);
        outcome
    }

    fn load_or_compute(&self, id: WaveformId) -> Result<CacheOutcome<K::Output>, PipelineError> {
        let store = self.store.as_ref();

        let (value, loaded) = match store.load_calculation(K::Output::TABLE, id)? {
            Some(text) => (K::Output::from_record(&text)?, true),
            None => (self.calculator.calculate(store, id)?, false),
        };

        if let Err(err) = value.validate() {
            warn!(
                "[CalculationCache] Quarantining #{:05} ({}): {}",
                id,
                K::Output::TABLE.dir_name(),
                err
            );
            quarantine(store, id)?;
            self.population
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&id);
            self.quarantined.fetch_add(1, Ordering::Relaxed);
            return Ok(CacheOutcome::Quarantined {
                reason: err.to_string(),
            });
        }

        self.population
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, value.clone());

        if loaded {
            self.loaded.fetch_add(1, Ordering::Relaxed);
            debug!("[CalculationCache] Loaded #{:05}", id);
            return Ok(CacheOutcome::Loaded(value));
        }

        store.save_calculation(K::Output::TABLE, id, &value.to_record())?;
        self.computed.fetch_add(1, Ordering::Relaxed);
        debug!("[CalculationCache] Computed #{:05}", id);
        Ok(CacheOutcome::Computed(value))
    }

    /// Snapshot of every valid result seen so far, keyed by id
    pub fn population(&self) -> Population<K::Output> {
        let entries = self.population.lock().unwrap_or_else(|e| e.into_inner());
        Population::new(entries.clone())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            loaded: self.loaded.load(Ordering::Relaxed),
            computed: self.computed.load(Ordering::Relaxed),
            quarantined: self.quarantined.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::alignment::align;
    use crate::analysis::features::{FeatureExtractor, FeatureSet};
    use crate::calibration::ShapingStage;
    use crate::config::ExtractionConfig;
    use crate::fixtures::{PulseShape, SampleClock};
    use crate::store::MemoryStore;
    use rayon::prelude::*;

    fn cache_with(store: &Arc<MemoryStore>) -> CalculationCache<FeatureCalculator> {
        let extractor = FeatureExtractor::new(&ExtractionConfig::default());
        CalculationCache::new(store.clone(), FeatureCalculator::new(extractor))
    }

    fn seed_valid(store: &MemoryStore, id: WaveformId) {
        let raw = PulseShape::default()
            .record(&SampleClock::default())
            .unwrap();
        store.put(Partition::Raw, id, &raw).unwrap();
        store.put(Partition::Accepted, id, &raw).unwrap();
        store.put(Partition::Shifted, id, &align(&raw).unwrap()).unwrap();
    }

    #[test]
    fn test_second_call_is_a_pure_read() {
        let store = Arc::new(MemoryStore::new());
        seed_valid(&store, 4);
        let cache = cache_with(&store);

        let first = cache.get_or_compute(4).unwrap();
        assert!(matches!(first, CacheOutcome::Computed(_)));
        let stored = store
            .load_calculation(CalculationTable::Features, 4)
            .unwrap()
            .unwrap();

        let second = cache_with(&store).get_or_compute(4).unwrap();
        assert!(matches!(second, CacheOutcome::Loaded(_)));
        assert_eq!(first.value(), second.value());
        assert_eq!(store.calculation_writes(), 1);
        assert_eq!(
            store
                .load_calculation(CalculationTable::Features, 4)
                .unwrap()
                .unwrap(),
            stored
        );
        assert_eq!(cache.status(4).unwrap(), CalculationStatus::Computed);
    }

    #[test]
    fn test_impossible_result_quarantines_and_purges() {
        let store = Arc::new(MemoryStore::new());
        let flat = SampleClock::default().flat(0.0).unwrap();
        store.put(Partition::Raw, 9, &flat).unwrap();
        store.put(Partition::Accepted, 9, &flat).unwrap();
        store.put(Partition::Shifted, 9, &flat).unwrap();
        store
            .put(Partition::Shaped(ShapingStage::X2), 9, &flat)
            .unwrap();
        store
            .save_calculation(CalculationTable::Shaping, 9, "risetime_1,1e-9")
            .unwrap();

        let cache = cache_with(&store);
        let outcome = cache.get_or_compute(9).unwrap();

        assert!(matches!(outcome, CacheOutcome::Quarantined { .. }));
        assert!(store.contains(Partition::Rejected, 9));
        assert!(store.contains(Partition::Raw, 9));
        for partition in Partition::DERIVED {
            assert!(!store.contains(partition, 9), "{} not purged", partition);
        }
        assert!(store
            .load_calculation(CalculationTable::Shaping, 9)
            .unwrap()
            .is_none());
        assert!(store
            .load_calculation(CalculationTable::Features, 9)
            .unwrap()
            .is_none());
        assert!(cache.population().is_empty());
        assert_eq!(cache.status(9).unwrap(), CalculationStatus::Quarantined);
        assert_eq!(cache.stats().quarantined, 1);
    }

    #[test]
    fn test_concurrent_calls_write_once() {
        let store = Arc::new(MemoryStore::new());
        seed_valid(&store, 1);
        let cache = cache_with(&store);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(4)
            .build()
            .unwrap();
        let outcomes: Vec<_> = pool.install(|| {
            (0..8)
                .into_par_iter()
                .map(|_| cache.get_or_compute(1).unwrap())
                .collect()
        });

        assert_eq!(store.calculation_writes(), 1);
        let computed = outcomes
            .iter()
            .filter(|o| matches!(o, CacheOutcome::Computed(_)))
            .count();
        assert_eq!(computed, 1);
        assert_eq!(cache.population().len(), 1);
        let stats = cache.stats();
        assert_eq!(stats.computed + stats.loaded, 8);
        assert_eq!(cache.tracked_locks(), 0);
    }

    #[test]
    fn test_missing_source_is_an_error() {
        let store = Arc::new(MemoryStore::new());
        let cache = cache_with(&store);
        let err = cache.get_or_compute(77).unwrap_err();
        assert!(matches!(err, PipelineError::Store(StoreError::NotFound { .. })));
        assert_eq!(cache.status(77).unwrap(), CalculationStatus::Pending);
    }

    #[test]
    fn test_id_locks_do_not_accumulate() {
        let store = Arc::new(MemoryStore::new());
        for id in 0..6 {
            seed_valid(&store, id);
        }
        let cache = cache_with(&store);
        for id in 0..6 {
            cache.get_or_compute(id).unwrap();
            assert_eq!(cache.tracked_locks(), 0);
        }
        assert!(cache.get_or_compute(99).is_err());
        assert_eq!(cache.tracked_locks(), 0);
    }

    #[test]
    fn test_population_keeps_id_order() {
        let store = Arc::new(MemoryStore::new());
        for id in [5, 2, 8] {
            seed_valid(&store, id);
        }
        let cache = cache_with(&store);
        for id in [8, 5, 2] {
            cache.get_or_compute(id).unwrap();
        }
        let population = cache.population();
        let ids: Vec<WaveformId> = population.ids().collect();
        assert_eq!(ids, vec![2, 5, 8]);
        let _: &FeatureSet = population.get(5).unwrap();
    }
}
