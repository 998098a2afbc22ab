// Shaping state
//
// ShapingCalibration: per-stage time constant and gain factor, derived once
// per population from the average template and saved next to the data so
// later runs shape with the same filters.
//
// ShapingProfile: per-waveform rise time and amplitude at every stage,
// persisted in the shaping calculation table.

use super::stage::ShapingStage;
use super::validation::ProfileValidator;
use crate::cache::record::{parse_record, write_record};
use crate::cache::Calculation;
use crate::error::{CalculationError, StoreError};
use crate::store::CalculationTable;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Filter applied to reach one stage from the previous one
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageParameters {
    pub stage: ShapingStage,
    /// Single-pole time constant in seconds (0 for the unshaped stage)
    pub tau: f64,
    /// Multiplier that restores the unshaped peak height
    pub gain: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapingCalibration {
    pub stages: [StageParameters; 4],
    /// Waveforms averaged into the template this was derived from
    pub template_contributors: usize,
}

impl ShapingCalibration {
    /// Build from the three shaping taus and gains (2x, 4x, 8x)
    pub fn new(taus: [f64; 3], gains: [f64; 3], template_contributors: usize) -> Self {
        let shaped = |i: usize, stage| StageParameters {
            stage,
            tau: taus[i],
            gain: gains[i],
        };
        Self {
            stages: [
                StageParameters {
                    stage: ShapingStage::X1,
                    tau: 0.0,
                    gain: 1.0,
                },
                shaped(0, ShapingStage::X2),
                shaped(1, ShapingStage::X4),
                shaped(2, ShapingStage::X8),
            ],
            template_contributors,
        }
    }

    pub fn stage(&self, stage: ShapingStage) -> &StageParameters {
        &self.stages[stage.index()]
    }

    pub fn load_from_file(path: &Path) -> Result<Self, StoreError> {
        let text = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
        serde_json::from_str(&text).map_err(|e| StoreError::Corrupt {
            location: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| StoreError::Corrupt {
            location: path.display().to_string(),
            reason: e.to_string(),
        })?;
        fs::write(path, json).map_err(|e| StoreError::io(path, e))
    }
}

/// Rise time and amplitude of one waveform at every stage
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ShapingProfile {
    /// 10-90% rise time per stage, indexed by `ShapingStage::index`
    pub rise1090: [f64; 4],
    /// Baseline-to-minimum amplitude per stage
    pub amplitude: [f64; 4],
}

/// Named column of a shaping profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapingColumn {
    RiseTime(ShapingStage),
    Amplitude(ShapingStage),
}

impl ShapingColumn {
    /// Persisted order
    pub const ALL: [ShapingColumn; 8] = [
        ShapingColumn::RiseTime(ShapingStage::X1),
        ShapingColumn::RiseTime(ShapingStage::X2),
        ShapingColumn::RiseTime(ShapingStage::X4),
        ShapingColumn::RiseTime(ShapingStage::X8),
        ShapingColumn::Amplitude(ShapingStage::X1),
        ShapingColumn::Amplitude(ShapingStage::X2),
        ShapingColumn::Amplitude(ShapingStage::X4),
        ShapingColumn::Amplitude(ShapingStage::X8),
    ];

    pub fn key(self) -> String {
        match self {
            ShapingColumn::RiseTime(stage) => format!("risetime_{}", stage.multiplier()),
            ShapingColumn::Amplitude(stage) => format!("amp_{}", stage.multiplier()),
        }
    }

    pub fn value(self, profile: &ShapingProfile) -> f64 {
        match self {
            ShapingColumn::RiseTime(stage) => profile.rise1090[stage.index()],
            ShapingColumn::Amplitude(stage) => profile.amplitude[stage.index()],
        }
    }
}

impl Calculation for ShapingProfile {
    const TABLE: CalculationTable = CalculationTable::Shaping;

    fn to_record(&self) -> String {
        let keys: Vec<String> = ShapingColumn::ALL.iter().map(|c| c.key()).collect();
        let entries: Vec<(&str, f64)> = keys
            .iter()
            .zip(ShapingColumn::ALL)
            .map(|(key, column)| (key.as_str(), column.value(self)))
            .collect();
        write_record(&entries)
    }

    fn from_record(text: &str) -> Result<Self, CalculationError> {
        let fields = parse_record(text)?;
        let mut profile = ShapingProfile {
            rise1090: [0.0; 4],
            amplitude: [0.0; 4],
        };
        for column in ShapingColumn::ALL {
            let value = fields.get(&column.key())?;
            match column {
                ShapingColumn::RiseTime(stage) => profile.rise1090[stage.index()] = value,
                ShapingColumn::Amplitude(stage) => profile.amplitude[stage.index()] = value,
            }
        }
        Ok(profile)
    }

    fn validate(&self) -> Result<(), CalculationError> {
        ProfileValidator::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_record_keys_and_round_trip() {
        let profile = ShapingProfile {
            rise1090: [2.5e-9, 5.0e-9, 1.0e-8, 2.0e-8],
            amplitude: [0.01, 0.0098, 0.0097, 0.0095],
        };
        let text = profile.to_record();
        let keys: Vec<&str> = text.lines().map(|l| l.split(',').next().unwrap()).collect();
        assert_eq!(
            keys,
            vec![
                "risetime_1", "risetime_2", "risetime_4", "risetime_8", "amp_1", "amp_2", "amp_4",
                "amp_8"
            ]
        );
        assert_eq!(ShapingProfile::from_record(&text).unwrap(), profile);
    }

    #[test]
    fn test_missing_stage_key() {
        let err = ShapingProfile::from_record("risetime_1,1e-9").unwrap_err();
        assert!(matches!(err, CalculationError::MissingKey { .. }));
    }

    #[test]
    fn test_calibration_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shaping.json");
        let calibration =
            ShapingCalibration::new([1.271e-8, 1.048e-8, 2.754e-8], [1.2, 1.5, 2.1], 40);
        calibration.save_to_file(&path).unwrap();
        let loaded = ShapingCalibration::load_from_file(&path).unwrap();
        assert_eq!(loaded, calibration);
        assert_eq!(loaded.stage(ShapingStage::X1).gain, 1.0);
        assert_eq!(loaded.stage(ShapingStage::X4).tau, 1.048e-8);
    }
}
