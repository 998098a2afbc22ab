// In-memory waveform store for tests and dry runs

use super::{CalculationTable, Partition, WaveformStore};
use crate::error::StoreError;
use crate::waveform::{WaveformId, WaveformRecord};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryStore {
    waveforms: RwLock<HashMap<(Partition, WaveformId), WaveformRecord>>,
    calculations: RwLock<HashMap<(CalculationTable, WaveformId), String>>,
    calculation_writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calculation records actually created
    pub fn calculation_writes(&self) -> usize {
        self.calculation_writes.load(Ordering::SeqCst)
    }
}

impl WaveformStore for MemoryStore {
    fn get(&self, partition: Partition, id: WaveformId) -> Result<WaveformRecord, StoreError> {
        let waveforms = self.waveforms.read().unwrap_or_else(|e| e.into_inner());
        waveforms
            .get(&(partition, id))
            .cloned()
            .ok_or(StoreError::NotFound { partition, id })
    }

    fn put(
        &self,
        partition: Partition,
        id: WaveformId,
        record: &WaveformRecord,
    ) -> Result<(), StoreError> {
        let mut waveforms = self.waveforms.write().unwrap_or_else(|e| e.into_inner());
        waveforms.insert((partition, id), record.clone());
        Ok(())
    }

    fn remove(&self, partition: Partition, id: WaveformId) -> Result<bool, StoreError> {
        let mut waveforms = self.waveforms.write().unwrap_or_else(|e| e.into_inner());
        Ok(waveforms.remove(&(partition, id)).is_some())
    }

    fn contains(&self, partition: Partition, id: WaveformId) -> bool {
        let waveforms = self.waveforms.read().unwrap_or_else(|e| e.into_inner());
        waveforms.contains_key(&(partition, id))
    }

    fn ids(&self, partition: Partition) -> Result<Vec<WaveformId>, StoreError> {
        let waveforms = self.waveforms.read().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<WaveformId> = waveforms
            .keys()
            .filter(|(p, _)| *p == partition)
            .map(|(_, id)| *id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn load_calculation(
        &self,
        table: CalculationTable,
        id: WaveformId,
    ) -> Result<Option<String>, StoreError> {
        let calculations = self.calculations.read().unwrap_or_else(|e| e.into_inner());
        Ok(calculations.get(&(table, id)).cloned())
    }

    fn save_calculation(
        &self,
        table: CalculationTable,
        id: WaveformId,
        contents: &str,
    ) -> Result<bool, StoreError> {
        let mut calculations = self.calculations.write().unwrap_or_else(|e| e.into_inner());
        if calculations.contains_key(&(table, id)) {
            return Ok(false);
        }
        calculations.insert((table, id), contents.to_string());
        self.calculation_writes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    fn remove_calculation(
        &self,
        table: CalculationTable,
        id: WaveformId,
    ) -> Result<bool, StoreError> {
        let mut calculations = self.calculations.write().unwrap_or_else(|e| e.into_inner());
        Ok(calculations.remove(&(table, id)).is_some())
    }
}
