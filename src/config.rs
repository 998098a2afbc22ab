//! Configuration management for the SPE pipeline
//!
//! Every tunable constant of the classifier, feature extractor, shaping
//! calibrator and aggregator lives here, loaded from a JSON file so runs can
//! be re-parameterized without recompiling. Missing sections and fields
//! take their defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub classifier: ClassifierConfig,
    pub extraction: ExtractionConfig,
    pub shaping: ShapingConfig,
    pub aggregation: AggregationConfig,
    pub store: StoreConfig,
    pub batch: BatchConfig,
}

/// Filter-and-count classifier parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Lowpass cutoff in Hz
    pub cutoff_frequency: f64,
    /// FIR length; also the number of samples trimmed from the front
    pub tap_count: usize,
    /// Minimum inverted peak height in volts
    pub noise_floor: f64,
    /// Inclusive height band for secondary peaks, volts
    pub secondary_band: (f64, f64),
    /// Sample range of the trimmed waveform searched for the minimum
    pub analysis_window: (usize, usize),
    /// Single-peak acceptance depth, volts
    pub single_peak_threshold: f64,
    /// Multi-peak acceptance depth, volts
    pub multi_peak_threshold: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            cutoff_frequency: 250e6,
            tap_count: 51,
            noise_floor: 0.001,
            secondary_band: (0.001, 0.0025),
            analysis_window: (370, 1370),
            single_peak_threshold: 0.002,
            multi_peak_threshold: 0.005,
        }
    }
}

/// Feature extraction parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Points in every crossing-search resampling
    pub resample_grid_size: usize,
    /// Scope input impedance in ohms when the info file has none
    pub impedance: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            resample_grid_size: 5000,
            impedance: 50.0,
        }
    }
}

/// Shaping calibration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapingConfig {
    /// Rise-time multiple each stage aims for
    pub target_rise_ratio: f64,
    /// Tau grid spacing in seconds
    pub tau_step: f64,
    /// First tau grid index scanned
    pub tau_first_index: usize,
    /// Tau grid index the scan stops before
    pub tau_last_index: usize,
    /// Skip the search and use these 2x/4x/8x taus
    pub fixed_taus: Option<[f64; 3]>,
}

impl Default for ShapingConfig {
    fn default() -> Self {
        Self {
            target_rise_ratio: 2.0,
            tau_step: 1e-11,
            tau_first_index: 5,
            tau_last_index: 50000,
            fixed_taus: None,
        }
    }
}

/// Template and histogram parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub histogram_bins: usize,
    /// Array fraction past which the pre-pulse baseline is taken
    pub coverage_fraction: f64,
    /// Template length as a fraction of the first contributor's length
    pub template_window_fraction: f64,
    /// Interpolation points in each fit window
    pub fit_samples: usize,
    /// Model evaluations allowed per least-squares fit
    pub max_evaluations: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            histogram_bins: 100,
            coverage_fraction: 0.87,
            template_window_fraction: 0.99,
            fit_samples: 10000,
            max_evaluations: 10000,
        }
    }
}

/// Waveform file layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Opaque lines in front of the sample rows
    pub header_lines: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { header_lines: 5 }
    }
}

/// Batch execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// 1 runs ids sequentially; more starts a worker pool of that size
    pub workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { workers: 1 }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file
    ///
    /// Falls back to defaults (with a warning) if the file is missing or
    /// does not parse.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Save configuration as pretty-printed JSON
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
    }
}
