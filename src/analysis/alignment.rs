// Alignment - move an accepted pulse onto a common time and voltage origin
//
// The sample on the falling flank closest to the half-amplitude level becomes
// t = 0 exactly, and the baseline average is subtracted from every voltage.

use crate::analysis::features::{baseline_average, level};
use crate::error::WaveformError;
use crate::waveform::resample::argmin;
use crate::waveform::WaveformRecord;

pub fn align(record: &WaveformRecord) -> Result<WaveformRecord, WaveformError> {
    record.require_len(crate::analysis::features::MIN_SAMPLES)?;
    let baseline = baseline_average(record);
    let half = level(baseline, record.min_voltage(), 0.5);
    let volts = record.voltage();

    let distance: Vec<f64> = (0..volts.len())
        .map(|i| match volts.get(i + 1) {
            Some(next) if next - volts[i] > 0.0 => f64::INFINITY,
            _ => (volts[i] - half).abs(),
        })
        .collect();
    let origin = record.time()[argmin(&distance)];

    let time = record.time().iter().map(|t| t - origin).collect();
    let voltage = volts.iter().map(|v| v - baseline).collect();
    WaveformRecord::new(time, voltage, record.header().to_vec())
}
