// Crossing search - the primitive every timing feature is built on
//
// Resample a stretch of the waveform onto a uniform grid that starts at the
// pulse minimum and runs outward, then take the first grid point whose
// voltage has recovered to a given level. When nothing reaches the level the
// closest grid point is used instead and the result is flagged.

use crate::waveform::resample::{argmin, interp_many, linspace, mean};
use crate::waveform::WaveformRecord;

/// Result of one crossing search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossing {
    /// Absolute time of the chosen grid point
    pub time: f64,
    /// True when no grid point reached the level
    pub fallback: bool,
}

/// Mean voltage of the record away from the pulse
///
/// Minimum in the second half: samples [10%, 35%). Otherwise [65%, 90%).
pub fn baseline_average(record: &WaveformRecord) -> f64 {
    let n = record.len();
    let fraction = |f: f64| (n as f64 * f) as usize;
    let (lo, hi) = if 2 * record.min_index() > n {
        (fraction(0.10), fraction(0.35))
    } else {
        (fraction(0.65), fraction(0.90))
    };
    mean(&record.voltage()[lo..hi.max(lo + 1).min(n)])
}

/// `baseline + fraction * (minimum - baseline)`
pub fn level(baseline: f64, minimum: f64, fraction: f64) -> f64 {
    baseline + fraction * (minimum - baseline)
}

/// Walk a `grid`-point resampling from `from` toward `to` for the first
/// voltage at or above `level`
pub fn search(record: &WaveformRecord, from: f64, to: f64, level: f64, grid: usize) -> Crossing {
    let times = linspace(from, to, grid);
    let volts = interp_many(&times, record.time(), record.voltage());

    if let Some(i) = volts.iter().position(|&v| v >= level) {
        return Crossing {
            time: times[i],
            fallback: false,
        };
    }

    let distance: Vec<f64> = volts.iter().map(|v| (v - level).abs()).collect();
    Crossing {
        time: times[argmin(&distance)],
        fallback: true,
    }
}

/// Where the pulse sits in a record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseGeometry {
    pub baseline: f64,
    pub min_index: usize,
    pub min_time: f64,
    pub min_voltage: f64,
    /// 10% crossing before the minimum
    pub start: Crossing,
    /// 10% crossing after the minimum
    pub end: Crossing,
}

impl PulseGeometry {
    pub fn locate(record: &WaveformRecord, grid: usize) -> Self {
        let baseline = baseline_average(record);
        let min_index = record.min_index();
        let min_time = record.time()[min_index];
        let min_voltage = record.voltage()[min_index];
        let ten_percent = level(baseline, min_voltage, 0.1);

        Self {
            baseline,
            min_index,
            min_time,
            min_voltage,
            start: search(record, min_time, record.first_time(), ten_percent, grid),
            end: search(record, min_time, record.last_time(), ten_percent, grid),
        }
    }

    /// Voltage `fraction` of the way from baseline to minimum
    pub fn level(&self, fraction: f64) -> f64 {
        level(self.baseline, self.min_voltage, fraction)
    }

    /// Baseline minus minimum, positive for a negative-going pulse
    pub fn amplitude(&self) -> f64 {
        self.baseline - self.min_voltage
    }
}
