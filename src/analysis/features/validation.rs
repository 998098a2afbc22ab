// Sanity predicate for extracted features
//
// A feature set is impossible when any value is non-finite or any of the
// sign rules below is violated. Strict and non-strict comparisons differ per
// rule and are kept exactly.

use super::types::FeatureSet;
use crate::error::CalculationError;

pub fn check_plausible(f: &FeatureSet) -> Result<(), CalculationError> {
    let rules: [(bool, &str); 13] = [
        (f.t_start < 0.0, "t_start < 0"),
        (f.t_end <= f.t_start, "t_end <= t_start"),
        (f.charge <= 0.0, "charge <= 0"),
        (f.amplitude <= 0.0, "amplitude <= 0"),
        (f.fwhm <= 0.0, "fwhm <= 0"),
        (f.rise1090 <= 0.0, "rise1090 <= 0"),
        (f.rise2080 <= 0.0, "rise2080 <= 0"),
        (f.fall1090 <= 0.0, "fall1090 <= 0"),
        (f.fall2080 <= 0.0, "fall2080 <= 0"),
        (f.jitter10 >= 0.0, "jitter10 >= 0"),
        (f.jitter20 >= 0.0, "jitter20 >= 0"),
        (f.jitter80 <= 0.0, "jitter80 <= 0"),
        (f.jitter90 <= 0.0, "jitter90 <= 0"),
    ];

    let values = [
        f.t_start, f.t_end, f.charge, f.amplitude, f.fwhm, f.rise1090, f.rise2080, f.fall1090,
        f.fall2080, f.jitter10, f.jitter20, f.jitter80, f.jitter90,
    ];
    if values.iter().any(|v| !v.is_finite()) {
        return Err(CalculationError::Implausible {
            reason: "non-finite feature value".to_string(),
        });
    }

    match rules.iter().find(|(violated, _)| *violated) {
        Some((_, rule)) => Err(CalculationError::Implausible {
            reason: rule.to_string(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plausible() -> FeatureSet {
        FeatureSet {
            t_start: 3.0e-8,
            t_end: 4.0e-8,
            charge: 7.5e-13,
            amplitude: 0.01,
            fwhm: 3.5e-9,
            rise1090: 2.5e-9,
            rise2080: 1.4e-9,
            fall1090: 2.5e-9,
            fall2080: 1.4e-9,
            jitter10: -1.5e-9,
            jitter20: -1.0e-9,
            jitter80: 6.0e-10,
            jitter90: 1.0e-9,
            fallback_used: false,
        }
    }

    fn reason(f: &FeatureSet) -> String {
        match check_plausible(f) {
            Err(CalculationError::Implausible { reason }) => reason,
            other => panic!("expected implausible, got {:?}", other),
        }
    }

    #[test]
    fn test_plausible_set_passes() {
        assert!(check_plausible(&plausible()).is_ok());
    }

    #[test]
    fn test_reference_pulse_passes() {
        let f = FeatureSet {
            t_start: 1e-9,
            t_end: 5e-9,
            charge: 2e-12,
            amplitude: 0.01,
            fwhm: 1e-9,
            rise1090: 2e-10,
            rise2080: 1.5e-10,
            fall1090: 2e-10,
            fall2080: 1.5e-10,
            jitter10: -1e-10,
            jitter20: -5e-11,
            jitter80: 5e-11,
            jitter90: 1e-10,
            fallback_used: false,
        };
        assert_eq!(check_plausible(&f), Ok(()));
    }

    #[test]
    fn test_end_before_start_is_impossible() {
        let f = FeatureSet {
            t_start: 5e-9,
            t_end: 3e-9,
            ..plausible()
        };
        assert_eq!(reason(&f), "t_end <= t_start");
    }

    #[test]
    fn test_negative_charge_is_impossible() {
        let mut f = plausible();
        f.charge = -1.0e-13;
        assert_eq!(reason(&f), "charge <= 0");
    }

    #[test]
    fn test_zero_jitter10_is_impossible() {
        let mut f = plausible();
        f.jitter10 = 0.0;
        assert_eq!(reason(&f), "jitter10 >= 0");
    }

    #[test]
    fn test_t_end_equal_to_t_start_is_impossible() {
        let mut f = plausible();
        f.t_end = f.t_start;
        assert_eq!(reason(&f), "t_end <= t_start");
    }

    #[test]
    fn test_t_start_zero_is_allowed() {
        let mut f = plausible();
        f.t_start = 0.0;
        assert!(check_plausible(&f).is_ok());
    }

    #[test]
    fn test_non_finite_is_impossible() {
        let mut f = plausible();
        f.fwhm = f64::INFINITY;
        assert_eq!(reason(&f), "non-finite feature value");
    }
}
