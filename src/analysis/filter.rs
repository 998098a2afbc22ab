//! Lowpass filters
//!
//! - [`FirLowpass`]: Blackman-windowed sinc design run forward and backward
//!   for zero phase, used by the classifier.
//! - [`single_pole_lowpass`]: first-order recursive filter, used to emulate
//!   slower front-end electronics when shaping pulses.

use crate::error::WaveformError;
use std::f64::consts::PI;

/// Zero-phase FIR lowpass
#[derive(Debug, Clone)]
pub struct FirLowpass {
    taps: Vec<f64>,
}

impl FirLowpass {
    /// Design a lowpass with `tap_count` taps cutting off at `cutoff_frequency`
    ///
    /// The cutoff is normalized to Nyquist (`2 * fc / fs`) and clamped into
    /// the open interval (0, 1).
    pub fn new(sample_rate: f64, cutoff_frequency: f64, tap_count: usize) -> Self {
        let normalized = (2.0 * cutoff_frequency / sample_rate).clamp(1e-9, 1.0 - 1e-9);
        Self {
            taps: design_lowpass(tap_count.max(1), normalized),
        }
    }

    pub fn taps(&self) -> &[f64] {
        &self.taps
    }

    /// Samples of odd-extension padding on each side
    pub fn pad_len(&self) -> usize {
        3 * self.taps.len()
    }

    /// Filter forward then backward
    ///
    /// The input is padded at both ends by point-reflection about its end
    /// samples, and each pass starts from the filter's steady state for its
    /// first sample, so a constant input comes out unchanged.
    ///
    /// # Errors
    /// `TooShort` unless the input is longer than the padding.
    pub fn filtfilt(&self, x: &[f64]) -> Result<Vec<f64>, WaveformError> {
        let n = x.len();
        let pad = self.pad_len();
        if n <= pad {
            return Err(WaveformError::TooShort {
                required: pad + 1,
                actual: n,
            });
        }

        let first = x[0];
        let last = x[n - 1];
        let mut extended = Vec::with_capacity(n + 2 * pad);
        extended.extend((1..=pad).rev().map(|k| 2.0 * first - x[k]));
        extended.extend_from_slice(x);
        extended.extend((1..=pad).map(|k| 2.0 * last - x[n - 1 - k]));

        let mut y = self.apply_steady(&extended);
        y.reverse();
        let mut y = self.apply_steady(&y);
        y.reverse();

        Ok(y[pad..pad + n].to_vec())
    }

    /// Causal convolution treating samples before the start as `x[0]`
    fn apply_steady(&self, x: &[f64]) -> Vec<f64> {
        let first = x.first().copied().unwrap_or(0.0);
        (0..x.len())
            .map(|i| {
                self.taps
                    .iter()
                    .enumerate()
                    .map(|(k, b)| b * if k <= i { x[i - k] } else { first })
                    .sum()
            })
            .collect()
    }
}

/// Windowed-sinc lowpass taps, `cutoff` relative to Nyquist, unit DC gain
pub fn design_lowpass(tap_count: usize, cutoff: f64) -> Vec<f64> {
    let alpha = (tap_count as f64 - 1.0) / 2.0;
    let mut taps: Vec<f64> = (0..tap_count)
        .map(|i| {
            let m = i as f64 - alpha;
            cutoff * sinc(cutoff * m) * blackman(i, tap_count)
        })
        .collect();

    let dc: f64 = taps.iter().sum();
    if dc != 0.0 {
        for tap in &mut taps {
            *tap /= dc;
        }
    }
    taps
}

fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

fn blackman(i: usize, len: usize) -> f64 {
    if len == 1 {
        return 1.0;
    }
    let phase = i as f64 / (len - 1) as f64;
    0.42 - 0.5 * (2.0 * PI * phase).cos() + 0.08 * (4.0 * PI * phase).cos()
}

/// First-order recursive lowpass with time constant `tau`
///
/// `y[0] = x[0]`, `y[i] = a*x[i] + (1-a)*y[i-1]` with `a = 1 - exp(-1/(fs*tau))`.
pub fn single_pole_lowpass(x: &[f64], tau: f64, sample_rate: f64) -> Vec<f64> {
    let alpha = 1.0 - (-1.0 / (sample_rate * tau)).exp();
    let mut y = Vec::with_capacity(x.len());
    let mut previous = match x.first() {
        Some(&v) => v,
        None => return y,
    };
    y.push(previous);
    for &v in &x[1..] {
        previous = alpha * v + (1.0 - alpha) * previous;
        y.push(previous);
    }
    y
}
