// Timing features built on the crossing search

use super::crossing::{search, Crossing, PulseGeometry};
use crate::waveform::resample::{argmin, interp_many, linspace, mean, round_significant};
use crate::waveform::WaveformRecord;

/// Significant digits kept for rise and fall durations
const DURATION_DIGITS: usize = 2;

/// Leading-flank crossing of the `fraction` level
pub fn leading(
    record: &WaveformRecord,
    geometry: &PulseGeometry,
    fraction: f64,
    grid: usize,
) -> Crossing {
    search(
        record,
        geometry.min_time,
        geometry.start.time,
        geometry.level(fraction),
        grid,
    )
}

/// Trailing-flank crossing of the `fraction` level
pub fn trailing(
    record: &WaveformRecord,
    geometry: &PulseGeometry,
    fraction: f64,
    grid: usize,
) -> Crossing {
    search(
        record,
        geometry.min_time,
        geometry.end.time,
        geometry.level(fraction),
        grid,
    )
}

/// Time from the `low` to the `high` crossing on the leading flank
pub fn rise_time(
    record: &WaveformRecord,
    geometry: &PulseGeometry,
    low: f64,
    high: f64,
    grid: usize,
) -> (f64, bool) {
    let early = leading(record, geometry, low, grid);
    let late = leading(record, geometry, high, grid);
    (
        round_significant(late.time - early.time, DURATION_DIGITS),
        early.fallback || late.fallback,
    )
}

/// Time from the `high` to the `low` crossing on the trailing flank
pub fn fall_time(
    record: &WaveformRecord,
    geometry: &PulseGeometry,
    low: f64,
    high: f64,
    grid: usize,
) -> (f64, bool) {
    let early = trailing(record, geometry, high, grid);
    let late = trailing(record, geometry, low, grid);
    (
        round_significant(late.time - early.time, DURATION_DIGITS),
        early.fallback || late.fallback,
    )
}

/// Full width at half maximum over the whole record
///
/// From the grid point nearest the minimum, each side takes the point closest
/// to the 50% level, skipping points where the waveform is heading back
/// toward the minimum so a secondary dip cannot be chosen.
pub fn fwhm(record: &WaveformRecord, geometry: &PulseGeometry, grid: usize) -> (f64, bool) {
    let times = linspace(record.first_time(), record.last_time(), grid);
    let volts = interp_many(&times, record.time(), record.voltage());
    let half = geometry.level(0.5);

    let nearest_min: Vec<f64> = volts.iter().map(|v| (v - geometry.min_voltage).abs()).collect();
    let center = argmin(&nearest_min);

    let score = |i: usize, neighbour: usize| {
        if volts[neighbour] - volts[i] < 0.0 {
            f64::INFINITY
        } else {
            (volts[i] - half).abs()
        }
    };

    let trailing_scores: Vec<f64> = (center..times.len().saturating_sub(1))
        .map(|i| score(i, i + 1))
        .collect();
    let leading_scores: Vec<f64> = (1..=center).rev().map(|i| score(i, i - 1)).collect();

    let mut fallback = false;
    let mut pick = |scores: &[f64], to_index: &dyn Fn(usize) -> usize, edge: usize| {
        if scores.is_empty() || scores.iter().all(|s| s.is_infinite()) {
            fallback = true;
            return times[edge];
        }
        times[to_index(argmin(scores))]
    };
    let trail = pick(&trailing_scores, &|k| center + k, times.len() - 1);
    let lead = pick(&leading_scores, &|k| center - k, 0);

    (trail - lead, fallback)
}

/// Riemann-sum pulse area over the record, sign-flipped, divided by `impedance`
pub fn charge(record: &WaveformRecord, impedance: f64, grid: usize) -> f64 {
    let times = linspace(record.first_time(), record.last_time(), grid);
    let volts = interp_many(&times, record.time(), record.voltage());
    -(record.duration() * mean(&volts)) / impedance
}
