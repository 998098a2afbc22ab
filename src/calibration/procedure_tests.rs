use super::*;
use crate::aggregate::TemplateBuilder;
use crate::analysis::alignment::align;
use crate::config::{AggregationConfig, ExtractionConfig};
use crate::fixtures::{PulseShape, SampleClock};
use crate::store::MemoryStore;
use approx::assert_relative_eq;

const LEGACY_TAUS: [f64; 3] = [1.271e-08, 1.048e-08, 2.754e-08];

fn extractor() -> FeatureExtractor {
    FeatureExtractor::new(&ExtractionConfig {
        resample_grid_size: 1000,
        ..ExtractionConfig::default()
    })
}

fn calibrator(config: ShapingConfig) -> ShapingCalibrator {
    ShapingCalibrator::new(extractor(), config, SampleClock::default().sample_rate)
}

fn shifted_pulse() -> WaveformRecord {
    align(
        &PulseShape::default()
            .record(&SampleClock::default())
            .unwrap(),
    )
    .unwrap()
}

fn template() -> AverageWaveformTemplate {
    let mut builder = TemplateBuilder::new(&AggregationConfig::default());
    for id in 0..2 {
        builder.add(id, &shifted_pulse());
    }
    builder.finish().unwrap()
}

#[test]
fn test_search_stops_at_first_tau_reaching_target() {
    let calibrator = calibrator(ShapingConfig::default());
    let record = shifted_pulse();
    let search = calibrator.search_tau(&record).unwrap();
    assert!(search.reached);

    let step = ShapingConfig::default().tau_step;
    let first = ShapingConfig::default().tau_first_index;
    let stop_tau = (first + search.evaluated - 1) as f64 * step;
    let before_tau = (first + search.evaluated - 2) as f64 * step;
    let rise_at = |tau: f64| {
        extractor()
            .rise_time(&calibrator.filter(&record, tau).unwrap(), 0.1, 0.9)
            .unwrap()
    };
    assert!(rise_at(stop_tau) >= search.target);
    assert!(rise_at(before_tau) < search.target);
    assert!(search.tau == stop_tau || search.tau == before_tau);
}

#[test]
fn test_exhausted_grid_returns_best_point() {
    let config = ShapingConfig {
        tau_first_index: 5,
        tau_last_index: 8,
        ..ShapingConfig::default()
    };
    let search = calibrator(config).search_tau(&shifted_pulse()).unwrap();
    assert!(!search.reached);
    assert_eq!(search.evaluated, 3);
    let scanned: Vec<f64> = (5..8).map(|k| k as f64 * 1e-11).collect();
    assert!(scanned.contains(&search.tau));
}

#[test]
fn test_fixed_taus_bypass_search() {
    let config = ShapingConfig {
        fixed_taus: Some(LEGACY_TAUS),
        ..ShapingConfig::default()
    };
    let calibration = calibrator(config).calibrate(&template()).unwrap();
    assert_eq!(calibration.stage(ShapingStage::X2).tau, LEGACY_TAUS[0]);
    assert_eq!(calibration.stage(ShapingStage::X8).tau, LEGACY_TAUS[2]);
    assert_eq!(calibration.template_contributors, 2);
    let gains: Vec<f64> = ShapingStage::ALL
        .iter()
        .map(|s| calibration.stage(*s).gain)
        .collect();
    assert_eq!(gains[0], 1.0);
    // each stage lowers the peak further
    assert!(gains.windows(2).all(|w| w[1] > w[0]));
}

#[test]
fn test_calibrated_stages_double_rise_time() {
    let calibrator = calibrator(ShapingConfig::default());
    let calibration = calibrator.calibrate(&template()).unwrap();

    let store = MemoryStore::new();
    store.put(Partition::Shifted, 1, &shifted_pulse()).unwrap();
    calibrator.shape_chain(&store, 1, &calibration).unwrap();

    let rises: Vec<f64> = ShapingStage::ALL
        .iter()
        .map(|s| {
            let record = store.get(Partition::Shaped(*s), 1).unwrap();
            extractor().rise_time(&record, 0.1, 0.9).unwrap()
        })
        .collect();
    for pair in rises.windows(2) {
        assert_relative_eq!(pair[1], 2.0 * pair[0], max_relative = 0.1);
    }

    // gains bring every stage back to the unshaped peak height
    let unshaped = store
        .get(Partition::Shaped(ShapingStage::X1), 1)
        .unwrap()
        .min_voltage();
    for stage in ShapingStage::ALL {
        let peak = store.get(Partition::Shaped(stage), 1).unwrap().min_voltage();
        assert_relative_eq!(peak, unshaped, max_relative = 0.02);
    }
}

#[test]
fn test_composition_law_for_every_stage_pair() {
    let config = ShapingConfig {
        fixed_taus: Some(LEGACY_TAUS),
        ..ShapingConfig::default()
    };
    let calibrator = calibrator(config);
    let calibration = calibrator.calibrate(&template()).unwrap();
    let fs = SampleClock::default().sample_rate;

    let store = MemoryStore::new();
    store.put(Partition::Shifted, 3, &shifted_pulse()).unwrap();
    assert_eq!(calibrator.shape_chain(&store, 3, &calibration).unwrap(), 4);

    for stage in ShapingStage::ALL.into_iter().skip(1) {
        let previous = stage.previous().unwrap();
        let before = store.get(Partition::Shaped(previous), 3).unwrap();
        let after = store.get(Partition::Shaped(stage), 3).unwrap();
        let prev = calibration.stage(previous);
        let next = calibration.stage(stage);

        let degained: Vec<f64> = before.voltage().iter().map(|v| v / prev.gain).collect();
        let expected: Vec<f64> = single_pole_lowpass(&degained, next.tau, fs)
            .iter()
            .map(|v| v * next.gain)
            .collect();
        for (a, b) in after.voltage().iter().zip(&expected) {
            assert_relative_eq!(*a, *b, epsilon = 1e-15);
        }
    }
}

#[test]
fn test_shape_chain_is_idempotent() {
    let config = ShapingConfig {
        fixed_taus: Some(LEGACY_TAUS),
        ..ShapingConfig::default()
    };
    let calibrator = calibrator(config);
    let calibration = calibrator.calibrate(&template()).unwrap();
    let store = MemoryStore::new();
    store.put(Partition::Shifted, 8, &shifted_pulse()).unwrap();

    assert_eq!(calibrator.shape_chain(&store, 8, &calibration).unwrap(), 4);
    let first = store.get(Partition::Shaped(ShapingStage::X8), 8).unwrap();

    store
        .remove(Partition::Shaped(ShapingStage::X8), 8)
        .unwrap();
    assert_eq!(calibrator.shape_chain(&store, 8, &calibration).unwrap(), 1);
    assert_eq!(store.get(Partition::Shaped(ShapingStage::X8), 8).unwrap(), first);
    assert_eq!(calibrator.shape_chain(&store, 8, &calibration).unwrap(), 0);
}

#[test]
fn test_missing_shifted_record() {
    let calibrator = calibrator(ShapingConfig::default());
    let calibration = ShapingCalibration::new(LEGACY_TAUS, [1.0, 1.0, 1.0], 0);
    let err = calibrator
        .shape_chain(&MemoryStore::new(), 5, &calibration)
        .unwrap_err();
    assert!(matches!(err, PipelineError::Store(_)));
}
