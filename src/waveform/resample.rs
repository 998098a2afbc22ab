//! Resampling and search helpers with numpy-compatible semantics

/// `n` evenly spaced points from `start` to `end` inclusive
///
/// Matches `numpy.linspace`: the last point is exactly `end`.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            let mut points: Vec<f64> = (0..n).map(|i| start + i as f64 * step).collect();
            points[n - 1] = end;
            points
        }
    }
}

/// Piecewise-linear interpolation of `fp` over increasing `xp` at `x`
///
/// Clamps to the end values outside `[xp[0], xp[last]]`. At an exact sample
/// time the sample value is returned unchanged.
pub fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let n = xp.len().min(fp.len());
    if n == 0 {
        return f64::NAN;
    }
    if x <= xp[0] {
        return fp[0];
    }
    let upper = xp[..n].partition_point(|&v| v <= x);
    if upper >= n {
        return fp[n - 1];
    }
    let lo = upper - 1;
    let x0 = xp[lo];
    if x == x0 {
        return fp[lo];
    }
    let slope = (fp[upper] - fp[lo]) / (xp[upper] - x0);
    fp[lo] + slope * (x - x0)
}

/// `interp` at each point of `xs`
pub fn interp_many(xs: &[f64], xp: &[f64], fp: &[f64]) -> Vec<f64> {
    xs.iter().map(|&x| interp(x, xp, fp)).collect()
}

/// Index of the first minimum; NaN entries never win
pub fn argmin(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v < values[best] || values[best].is_nan() {
            best = i;
        }
    }
    best
}

/// Index of the first maximum; NaN entries never win
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] || values[best].is_nan() {
            best = i;
        }
    }
    best
}

/// Round to `digits` significant digits through scientific text
///
/// Equivalent to formatting with `'.{digits-1}e'` and parsing back.
pub fn round_significant(value: f64, digits: usize) -> f64 {
    if !value.is_finite() || value == 0.0 {
        return value;
    }
    let text = format!("{:.*e}", digits.saturating_sub(1), value);
    text.parse().unwrap_or(value)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
