// Histogram and two-pass Gaussian fit
//
// First pass: closed-form normal estimate, then a least-squares Gaussian over
// a +-1 sigma window of the interpolated bin counts. Second pass: the same
// fit over +-2 sigma around the (rounded) first-pass estimate.

use crate::error::FitError;
use crate::waveform::resample::{interp_many, linspace, mean, round_significant};
use nalgebra::{Matrix3, Vector3};
use serde::Serialize;

/// Significant digits reported for fitted parameters
const REPORT_DIGITS: usize = 2;

const FTOL: f64 = 1.49012e-8;
const XTOL: f64 = 1.49012e-8;
const MAX_DAMPING: f64 = 1e15;

/// Equal-width count histogram over [min, max], last bin closed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub edges: Vec<f64>,
    pub centers: Vec<f64>,
    pub counts: Vec<f64>,
}

impl Histogram {
    pub fn new(values: &[f64], bins: usize) -> Result<Self, FitError> {
        if values.is_empty() || bins == 0 {
            return Err(FitError::InsufficientData {
                samples: values.len(),
            });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(FitError::Degenerate {
                reason: "non-finite value in histogram input".to_string(),
            });
        }

        let mut lo = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let mut hi = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if lo == hi {
            lo -= 0.5;
            hi += 0.5;
        }
        let edges = linspace(lo, hi, bins + 1);
        let norm = bins as f64 / (hi - lo);

        let mut counts = vec![0.0; bins];
        for &v in values {
            let mut index = (((v - lo) * norm) as usize).min(bins - 1);
            if v < edges[index] {
                index = index.saturating_sub(1);
            } else if index != bins - 1 && v >= edges[index + 1] {
                index += 1;
            }
            counts[index] += 1.0;
        }

        let half_width = (edges[1] - edges[0]) / 2.0;
        let centers = edges[..bins].iter().map(|e| e + half_width).collect();
        Ok(Self {
            edges,
            centers,
            counts,
        })
    }
}

/// `amplitude * exp(-(x - mean)^2 / (2 std_dev^2))`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GaussianParameters {
    pub amplitude: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl GaussianParameters {
    pub fn rounded(&self) -> Self {
        Self {
            amplitude: round_significant(self.amplitude, REPORT_DIGITS),
            mean: round_significant(self.mean, REPORT_DIGITS),
            std_dev: round_significant(self.std_dev.abs(), REPORT_DIGITS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramFit {
    pub centers: Vec<f64>,
    pub counts: Vec<f64>,
    /// Rounded +-1 sigma estimate that seeded the second pass
    pub first_pass: GaussianParameters,
    /// Final rounded parameters
    pub parameters: GaussianParameters,
}

#[derive(Debug, Clone)]
pub struct GaussianFitter {
    samples: usize,
    max_evaluations: usize,
}

impl GaussianFitter {
    pub fn new(samples: usize, max_evaluations: usize) -> Self {
        Self {
            samples: samples.max(3),
            max_evaluations,
        }
    }

    pub fn fit(&self, values: &[f64], bins: usize) -> Result<HistogramFit, FitError> {
        if values.len() < 3 {
            return Err(FitError::InsufficientData {
                samples: values.len(),
            });
        }
        let histogram = Histogram::new(values, bins)?;

        let mu = mean(values);
        let sigma = (values.iter().map(|v| (v - mu) * (v - mu)).sum::<f64>()
            / values.len() as f64)
            .sqrt();
        if !(sigma > 0.0) {
            return Err(FitError::Degenerate {
                reason: "zero spread".to_string(),
            });
        }

        let first = self
            .fit_window(&histogram, mu - sigma, mu + sigma, mu, sigma)?
            .rounded();
        let second = self.fit_window(
            &histogram,
            first.mean - 2.0 * first.std_dev,
            first.mean + 2.0 * first.std_dev,
            first.mean,
            first.std_dev,
        )?;

        Ok(HistogramFit {
            centers: histogram.centers,
            counts: histogram.counts,
            first_pass: first,
            parameters: second.rounded(),
        })
    }

    /// Least-squares Gaussian over interpolated counts in [lo, hi]
    ///
    /// Solved in z = (x - center) / scale so the normal equations stay well
    /// conditioned for tiny physical units.
    fn fit_window(
        &self,
        histogram: &Histogram,
        lo: f64,
        hi: f64,
        center: f64,
        scale: f64,
    ) -> Result<GaussianParameters, FitError> {
        if !(scale > 0.0) || !center.is_finite() {
            return Err(FitError::Degenerate {
                reason: format!("window scale {}", scale),
            });
        }
        let xs = linspace(lo, hi, self.samples);
        let ys = interp_many(&xs, &histogram.centers, &histogram.counts);
        let zs: Vec<f64> = xs.iter().map(|x| (x - center) / scale).collect();

        let peak = ys.iter().cloned().fold(0.0, f64::max);
        if !(peak > 0.0) {
            return Err(FitError::Degenerate {
                reason: "empty fit window".to_string(),
            });
        }

        let p = levenberg_marquardt(&zs, &ys, Vector3::new(peak, 0.0, 1.0), self.max_evaluations)?;
        let fitted = GaussianParameters {
            amplitude: p[0],
            mean: center + p[1] * scale,
            std_dev: p[2].abs() * scale,
        };
        if !fitted.amplitude.is_finite() || !fitted.mean.is_finite() || !(fitted.std_dev > 0.0) {
            return Err(FitError::Degenerate {
                reason: format!("fit produced {:?}", fitted),
            });
        }
        Ok(fitted)
    }
}

fn gaussian(z: f64, p: &Vector3<f64>) -> f64 {
    let d = z - p[1];
    p[0] * (-(d * d) / (2.0 * p[2] * p[2])).exp()
}

fn sum_squares(z: &[f64], y: &[f64], p: &Vector3<f64>) -> f64 {
    z.iter()
        .zip(y)
        .map(|(&z, &y)| {
            let r = y - gaussian(z, p);
            r * r
        })
        .sum()
}

/// J^T J and J^T r for the Gaussian model
fn normal_equations(z: &[f64], y: &[f64], p: &Vector3<f64>) -> (Matrix3<f64>, Vector3<f64>) {
    let mut jtj = Matrix3::zeros();
    let mut jtr = Vector3::zeros();
    let (a, m, s) = (p[0], p[1], p[2]);
    for (&z, &y) in z.iter().zip(y) {
        let d = z - m;
        let e = (-(d * d) / (2.0 * s * s)).exp();
        let row = Vector3::new(e, a * e * d / (s * s), a * e * d * d / (s * s * s));
        let r = y - a * e;
        jtj += row * row.transpose();
        jtr += row * r;
    }
    (jtj, jtr)
}

fn levenberg_marquardt(
    z: &[f64],
    y: &[f64],
    initial: Vector3<f64>,
    max_evaluations: usize,
) -> Result<Vector3<f64>, FitError> {
    let mut p = initial;
    let mut cost = sum_squares(z, y, &p);
    let mut evaluations = 1;
    let mut damping = 1e-3;

    loop {
        let (jtj, jtr) = normal_equations(z, y, &p);
        evaluations += 1;

        loop {
            if evaluations >= max_evaluations {
                return Err(FitError::NonConvergence { evaluations });
            }

            let mut damped = jtj;
            for i in 0..3 {
                damped[(i, i)] += damping * jtj[(i, i)].max(1e-12);
            }
            let step = match damped.lu().solve(&jtr) {
                Some(step) => step,
                None => {
                    damping *= 10.0;
                    if damping > MAX_DAMPING {
                        return Ok(p);
                    }
                    continue;
                }
            };

            let candidate = p + step;
            let candidate_cost = sum_squares(z, y, &candidate);
            evaluations += 1;

            if candidate_cost.is_finite() && candidate_cost <= cost {
                let reduction = cost - candidate_cost;
                let converged =
                    reduction <= FTOL * cost || step.norm() <= XTOL * (candidate.norm() + XTOL);
                p = candidate;
                cost = candidate_cost;
                damping = (damping * 0.1).max(1e-15);
                if converged {
                    return Ok(p);
                }
                break;
            }

            damping *= 10.0;
            // no downhill step left: p is stationary
            if damping > MAX_DAMPING {
                return Ok(p);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::normal_samples;
    use approx::assert_relative_eq;

    #[test]
    fn test_histogram_numpy_semantics() {
        let hist = Histogram::new(&[0.0, 1.0, 1.0, 2.0, 4.0], 4).unwrap();
        assert_eq!(hist.edges, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(hist.counts, vec![1.0, 2.0, 1.0, 1.0]);
        assert_eq!(hist.centers, vec![0.5, 1.5, 2.5, 3.5]);
    }

    #[test]
    fn test_degenerate_range_widens() {
        let hist = Histogram::new(&[3.0, 3.0], 2).unwrap();
        assert_eq!(hist.edges, vec![2.5, 3.0, 3.5]);
        assert_eq!(hist.counts, vec![0.0, 2.0]);
    }

    #[test]
    fn test_two_pass_fit_recovers_standard_normal() {
        let values = normal_samples(5.0, 1.0, 100_000, 42);
        let fit = GaussianFitter::new(10_000, 10_000).fit(&values, 50).unwrap();
        assert!((fit.parameters.mean - 5.0).abs() < 0.05);
        assert!((fit.parameters.std_dev - 1.0).abs() < 0.05);
        assert_eq!(fit.centers.len(), 50);
        assert_relative_eq!(fit.counts.iter().sum::<f64>(), 100_000.0);
    }

    #[test]
    fn test_fit_in_physical_units() {
        let values: Vec<f64> = normal_samples(2.5e-9, 2.0e-10, 20_000, 7);
        let fit = GaussianFitter::new(10_000, 10_000).fit(&values, 60).unwrap();
        assert_relative_eq!(fit.parameters.mean, 2.5e-9, max_relative = 0.05);
        assert_relative_eq!(fit.parameters.std_dev, 2.0e-10, max_relative = 0.1);
    }

    #[test]
    fn test_constant_values_are_degenerate() {
        let err = GaussianFitter::new(100, 100).fit(&[1.0; 10], 5).unwrap_err();
        assert!(matches!(err, FitError::Degenerate { .. }));
    }

    #[test]
    fn test_exhausted_budget() {
        let values = normal_samples(0.0, 1.0, 1000, 3);
        let err = GaussianFitter::new(1000, 2).fit(&values, 20).unwrap_err();
        assert!(matches!(err, FitError::NonConvergence { .. }));
    }
}
