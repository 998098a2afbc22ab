//! Waveform store
//!
//! The pipeline reads and writes waveforms only through [`WaveformStore`].
//! Records live in named partitions; calculations live in write-once
//! tables keyed by waveform id.

mod directory;
mod memory;

pub use directory::DirectoryStore;
pub use memory::MemoryStore;

use crate::analysis::classifier::ClassificationDecision;
use crate::calibration::ShapingStage;
use crate::error::StoreError;
use crate::waveform::{WaveformId, WaveformRecord};
use std::fmt;

/// Named waveform partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Partition {
    /// Acquisitions as recorded
    Raw,
    /// Classified as SPE (filtered, trimmed)
    Accepted,
    /// Not SPE, or quarantined after an impossible calculation
    Rejected,
    /// Set aside by the adjudicator
    Uncertain,
    /// Accepted waveforms aligned to the 50% crossing with zero baseline
    Shifted,
    /// Shaped to a rise-time multiple
    Shaped(ShapingStage),
}

impl Partition {
    /// Partitions the classifier writes to
    pub const CLASSIFIER_OUTPUTS: [Partition; 3] =
        [Partition::Accepted, Partition::Rejected, Partition::Uncertain];

    /// Partitions cleared when an id is quarantined
    pub const DERIVED: [Partition; 6] = [
        Partition::Accepted,
        Partition::Shifted,
        Partition::Shaped(ShapingStage::X1),
        Partition::Shaped(ShapingStage::X2),
        Partition::Shaped(ShapingStage::X4),
        Partition::Shaped(ShapingStage::X8),
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            Partition::Raw => "d0",
            Partition::Accepted => "d1_raw",
            Partition::Rejected => "not_spe",
            Partition::Uncertain => "unsure_if_spe",
            Partition::Shifted => "d1_shifted",
            Partition::Shaped(stage) => stage.dir_name(),
        }
    }

    /// File name prefix: `C2` for scope output, `D1` for anything derived
    pub fn file_prefix(self) -> &'static str {
        match self {
            Partition::Raw => "C2",
            _ => "D1",
        }
    }

    /// Output partition for a final classifier decision
    pub fn for_decision(decision: ClassificationDecision) -> Partition {
        match decision {
            ClassificationDecision::Accept => Partition::Accepted,
            ClassificationDecision::Reject => Partition::Rejected,
            ClassificationDecision::Uncertain => Partition::Uncertain,
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Write-once calculation tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalculationTable {
    Features,
    Shaping,
}

impl CalculationTable {
    pub const ALL: [CalculationTable; 2] = [CalculationTable::Features, CalculationTable::Shaping];

    pub fn dir_name(self) -> &'static str {
        match self {
            CalculationTable::Features => "calculations",
            CalculationTable::Shaping => "calculations_shaping",
        }
    }
}

/// `{prefix}--waveforms--{id:05}.txt`
pub fn waveform_file_name(partition: Partition, id: WaveformId) -> String {
    format!("{}--waveforms--{:05}.txt", partition.file_prefix(), id)
}

/// Persistent home of waveforms and their calculations
///
/// Implementations must tolerate concurrent calls from worker threads.
pub trait WaveformStore: Send + Sync {
    /// Fetch a record; `StoreError::NotFound` when absent
    fn get(&self, partition: Partition, id: WaveformId) -> Result<WaveformRecord, StoreError>;

    /// Write a record, replacing any previous one
    fn put(
        &self,
        partition: Partition,
        id: WaveformId,
        record: &WaveformRecord,
    ) -> Result<(), StoreError>;

    /// Delete a record; returns whether one existed
    fn remove(&self, partition: Partition, id: WaveformId) -> Result<bool, StoreError>;

    fn contains(&self, partition: Partition, id: WaveformId) -> bool;

    /// Ids present in a partition, ascending
    fn ids(&self, partition: Partition) -> Result<Vec<WaveformId>, StoreError>;

    fn load_calculation(
        &self,
        table: CalculationTable,
        id: WaveformId,
    ) -> Result<Option<String>, StoreError>;

    /// Create-only write; returns false if a record already existed
    fn save_calculation(
        &self,
        table: CalculationTable,
        id: WaveformId,
        contents: &str,
    ) -> Result<bool, StoreError>;

    /// Delete a calculation; returns whether one existed
    fn remove_calculation(&self, table: CalculationTable, id: WaveformId)
        -> Result<bool, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names() {
        assert_eq!(
            waveform_file_name(Partition::Raw, 12),
            "C2--waveforms--00012.txt"
        );
        assert_eq!(
            waveform_file_name(Partition::Shaped(ShapingStage::X4), 7),
            "D1--waveforms--00007.txt"
        );
        assert_eq!(Partition::Shaped(ShapingStage::X8).dir_name(), "rt_8");
    }

    #[test]
    fn test_decision_partitions() {
        assert_eq!(
            Partition::for_decision(ClassificationDecision::Uncertain),
            Partition::Uncertain
        );
        assert_eq!(Partition::Rejected.to_string(), "not_spe");
    }
}
