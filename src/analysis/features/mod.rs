// FeatureExtractor - per-pulse timing, charge and shape features
//
// Every timing feature reduces to one primitive: resample the record on a
// uniform grid running outward from the pulse minimum and take the first
// point that recovers to a fraction of the amplitude (see `crossing`).
//
// Module organization:
// - types: FeatureSet, FeatureKind and the persisted record form
// - crossing: crossing search, baseline average, pulse geometry
// - timing: rise, fall, fwhm and charge
// - validation: sanity predicate applied before a result is cached
// - mod.rs: Coordinator (FeatureExtractor)

mod crossing;
mod timing;
mod types;
mod validation;

pub use crossing::{baseline_average, level, search, Crossing, PulseGeometry};
pub use types::{FeatureKind, FeatureSet};
pub use validation::check_plausible;

use crate::config::ExtractionConfig;
use crate::error::WaveformError;
use crate::waveform::WaveformRecord;

/// Fewest samples a record needs for the baseline windows to be populated
pub const MIN_SAMPLES: usize = 16;

/// Extracts a [`FeatureSet`] from one waveform
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    grid_size: usize,
    impedance: f64,
}

impl FeatureExtractor {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            grid_size: config.resample_grid_size.max(2),
            impedance: config.impedance,
        }
    }

    /// Override the input impedance used for charge
    pub fn with_impedance(mut self, impedance: f64) -> Self {
        self.impedance = impedance;
        self
    }

    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    pub fn impedance(&self) -> f64 {
        self.impedance
    }

    pub fn geometry(&self, record: &WaveformRecord) -> Result<PulseGeometry, WaveformError> {
        record.require_len(MIN_SAMPLES)?;
        Ok(PulseGeometry::locate(record, self.grid_size))
    }

    /// Compute every feature of `record`
    pub fn extract(&self, record: &WaveformRecord) -> Result<FeatureSet, WaveformError> {
        let grid = self.grid_size;
        let geometry = self.geometry(record)?;

        let (rise1090, rise_a) = timing::rise_time(record, &geometry, 0.1, 0.9, grid);
        let (rise2080, rise_b) = timing::rise_time(record, &geometry, 0.2, 0.8, grid);
        let (fall1090, fall_a) = timing::fall_time(record, &geometry, 0.1, 0.9, grid);
        let (fall2080, fall_b) = timing::fall_time(record, &geometry, 0.2, 0.8, grid);
        let (fwhm, fwhm_fallback) = timing::fwhm(record, &geometry, grid);

        let jitter = |fraction: f64| timing::leading(record, &geometry, fraction, grid);
        let jitters = [jitter(0.1), jitter(0.2), jitter(0.8), jitter(0.9)];

        let fallback_used = geometry.start.fallback
            || geometry.end.fallback
            || rise_a
            || rise_b
            || fall_a
            || fall_b
            || fwhm_fallback
            || jitters.iter().any(|c| c.fallback);

        Ok(FeatureSet {
            t_start: geometry.start.time - record.first_time(),
            t_end: geometry.end.time - record.first_time(),
            charge: timing::charge(record, self.impedance, grid),
            amplitude: geometry.amplitude(),
            fwhm,
            rise1090,
            rise2080,
            fall1090,
            fall2080,
            jitter10: jitters[0].time,
            jitter20: jitters[1].time,
            jitter80: jitters[2].time,
            jitter90: jitters[3].time,
            fallback_used,
        })
    }

    /// Leading-edge `low`-to-`high` rise time, rounded to 2 significant digits
    pub fn rise_time(
        &self,
        record: &WaveformRecord,
        low: f64,
        high: f64,
    ) -> Result<f64, WaveformError> {
        let geometry = self.geometry(record)?;
        Ok(timing::rise_time(record, &geometry, low, high, self.grid_size).0)
    }

    /// Baseline minus minimum voltage
    pub fn amplitude(&self, record: &WaveformRecord) -> Result<f64, WaveformError> {
        record.require_len(MIN_SAMPLES)?;
        Ok(baseline_average(record) - record.min_voltage())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::alignment::align;
    use crate::cache::Calculation;
    use crate::fixtures::{PulseShape, SampleClock};
    use approx::assert_relative_eq;

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::new(&ExtractionConfig::default())
    }

    fn pulse() -> WaveformRecord {
        PulseShape::default()
            .record(&SampleClock::default())
            .unwrap()
    }

    #[test]
    fn test_unimodal_pulse_features() {
        let shape = PulseShape::default();
        let features = extractor().extract(&pulse()).unwrap();

        assert_relative_eq!(features.amplitude, shape.amplitude, max_relative = 0.01);
        assert_relative_eq!(features.rise1090, features.fall1090, max_relative = 0.05);
        // 10-90% of a Gaussian edge spans 1.687 sigma
        assert_relative_eq!(features.rise1090, 1.687 * shape.rise_sigma, max_relative = 0.05);
        assert_relative_eq!(features.fwhm, 2.3548 * shape.rise_sigma, max_relative = 0.02);
        assert!(!features.fallback_used);
    }

    #[test]
    fn test_charge_is_pulse_area_over_impedance() {
        let shape = PulseShape::default();
        let features = extractor().extract(&pulse()).unwrap();
        let area = shape.amplitude * shape.rise_sigma * (2.0 * std::f64::consts::PI).sqrt();
        assert_relative_eq!(features.charge, area / 50.0, max_relative = 0.01);
    }

    #[test]
    fn test_aligned_pulse_is_plausible() {
        let shifted = align(&pulse()).unwrap();
        let features = extractor().extract(&shifted).unwrap();
        assert!(features.jitter10 < 0.0 && features.jitter20 < 0.0);
        assert!(features.jitter80 > 0.0 && features.jitter90 > 0.0);
        assert!(features.t_start >= 0.0);
        assert!(features.validate().is_ok());
    }

    #[test]
    fn test_record_round_trip_is_exact() {
        let features = extractor().extract(&align(&pulse()).unwrap()).unwrap();
        let text = features.to_record();
        assert_eq!(text.lines().count(), 13);
        assert!(text.starts_with("t1,"));
        assert!(!text.ends_with('\n'));
        let parsed = FeatureSet::from_record(&text).unwrap();
        assert_eq!(parsed, features);
        assert_eq!(parsed.to_record(), text);
    }

    #[test]
    fn test_fallback_flag_persists() {
        let mut features = extractor().extract(&pulse()).unwrap();
        features.fallback_used = true;
        let text = features.to_record();
        assert!(text.ends_with("fallback,1e0"));
        assert!(FeatureSet::from_record(&text).unwrap().fallback_used);
    }

    #[test]
    fn test_flat_trace_is_impossible() {
        let flat = SampleClock::default().flat(0.0).unwrap();
        let features = extractor().extract(&flat).unwrap();
        assert_eq!(features.amplitude, 0.0);
        assert!(features.validate().is_err());
    }

    #[test]
    fn test_too_short_record() {
        let record = WaveformRecord::new(vec![0.0, 1.0], vec![0.0, -1.0], Vec::new()).unwrap();
        let err = extractor().extract(&record).unwrap_err();
        assert!(matches!(err, WaveformError::TooShort { required: 16, .. }));
    }
}
