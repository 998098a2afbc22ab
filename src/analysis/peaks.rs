//! Peak detection
//!
//! Local maxima above a height threshold. A flat-topped peak counts once,
//! at the middle of its plateau; edge samples are never peaks.

/// A detected local maximum
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    /// Sample index
    pub index: usize,
    /// Signal value at the peak
    pub height: f64,
}

/// Peak detection configuration
#[derive(Debug, Clone)]
pub struct PeakFinder {
    /// Minimum peak height (inclusive)
    min_height: f64,
}

impl PeakFinder {
    pub fn new(min_height: f64) -> Self {
        Self { min_height }
    }

    /// Find qualifying peaks in ascending index order
    pub fn find(&self, signal: &[f64]) -> Vec<Peak> {
        local_maxima(signal)
            .into_iter()
            .map(|index| Peak {
                index,
                height: signal[index],
            })
            .filter(|peak| peak.height >= self.min_height)
            .collect()
    }
}

/// Indices of local maxima; plateaus resolve to their (lower) midpoint
fn local_maxima(x: &[f64]) -> Vec<usize> {
    let mut maxima = Vec::new();
    if x.len() < 3 {
        return maxima;
    }
    let last = x.len() - 1;
    let mut i = 1;
    while i < last {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < last && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                let left_edge = i;
                let right_edge = ahead - 1;
                maxima.push((left_edge + right_edge) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    maxima
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_peaks() {
        let signal = [0.0, 1.0, 0.0, 2.0, 0.5, 3.0, 3.5];
        let peaks = PeakFinder::new(0.0).find(&signal);
        let indices: Vec<usize> = peaks.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![1, 3]);
        assert_eq!(peaks[1].height, 2.0);
    }

    #[test]
    fn test_plateau_resolves_to_midpoint() {
        let signal = [0.0, 1.0, 1.0, 1.0, 0.0, 2.0, 2.0, 0.0];
        let indices: Vec<usize> = PeakFinder::new(0.5)
            .find(&signal)
            .iter()
            .map(|p| p.index)
            .collect();
        assert_eq!(indices, vec![2, 5]);
    }

    #[test]
    fn test_plateau_running_into_edge_is_not_a_peak() {
        let signal = [0.0, 1.0, 1.0, 1.0];
        assert!(PeakFinder::new(0.0).find(&signal).is_empty());
    }

    #[test]
    fn test_min_height_is_inclusive() {
        let signal = [0.0, 0.001, 0.0, 0.01, 0.0, 0.0005, 0.0];
        let peaks = PeakFinder::new(0.001).find(&signal);
        assert_eq!(peaks.len(), 2);
        assert_eq!(peaks[0].index, 1);
        assert_eq!(peaks[1].height, 0.01);
    }
}
