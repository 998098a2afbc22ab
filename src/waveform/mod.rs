//! Waveform records
//!
//! A record is one oscilloscope acquisition: strictly increasing sample
//! times, the matching voltages, and the opaque header lines the scope
//! wrote in front of the data.

mod format;
mod info;
pub mod resample;

pub use format::{format_scientific, parse_waveform, write_waveform};
pub use info::{AcquisitionInfo, IMPEDANCE_KEY, SAMPLE_RATE_KEY};

use crate::error::WaveformError;

/// Waveform identifier, rendered zero-padded to five digits in file names
pub type WaveformId = u32;

/// Time/voltage samples plus the header blob they were read with
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformRecord {
    time: Vec<f64>,
    voltage: Vec<f64>,
    header: Vec<u8>,
}

impl WaveformRecord {
    /// Build a record, validating the sample invariants
    ///
    /// # Errors
    /// * `Malformed` - arrays differ in length, hold non-finite values, or
    ///   time does not strictly increase
    /// * `TooShort` - fewer than two samples
    pub fn new(time: Vec<f64>, voltage: Vec<f64>, header: Vec<u8>) -> Result<Self, WaveformError> {
        if time.len() != voltage.len() {
            return Err(WaveformError::Malformed {
                reason: format!(
                    "{} time samples but {} voltage samples",
                    time.len(),
                    voltage.len()
                ),
            });
        }
        if time.len() < 2 {
            return Err(WaveformError::TooShort {
                required: 2,
                actual: time.len(),
            });
        }
        if let Some(i) = time
            .iter()
            .zip(&voltage)
            .position(|(t, v)| !t.is_finite() || !v.is_finite())
        {
            return Err(WaveformError::Malformed {
                reason: format!("non-finite sample at index {}", i),
            });
        }
        if let Some(i) = time.windows(2).position(|w| w[1] <= w[0]) {
            return Err(WaveformError::Malformed {
                reason: format!("time does not increase at index {}", i + 1),
            });
        }

        Ok(Self {
            time,
            voltage,
            header,
        })
    }

    /// Same time axis and header, new voltages
    pub fn with_voltage(&self, voltage: Vec<f64>) -> Result<Self, WaveformError> {
        Self::new(self.time.clone(), voltage, self.header.clone())
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn voltage(&self) -> &[f64] {
        &self.voltage
    }

    pub fn header(&self) -> &[u8] {
        &self.header
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    /// Always false for a constructed record
    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn first_time(&self) -> f64 {
        self.time[0]
    }

    pub fn last_time(&self) -> f64 {
        self.time[self.time.len() - 1]
    }

    /// Last time minus first time
    pub fn duration(&self) -> f64 {
        self.last_time() - self.first_time()
    }

    /// Index of the first sample holding the minimum voltage
    pub fn min_index(&self) -> usize {
        resample::argmin(&self.voltage)
    }

    pub fn min_voltage(&self) -> f64 {
        self.voltage[self.min_index()]
    }

    /// Fail with `TooShort` unless the record holds at least `required` samples
    pub fn require_len(&self, required: usize) -> Result<(), WaveformError> {
        if self.len() < required {
            return Err(WaveformError::TooShort {
                required,
                actual: self.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unequal_lengths() {
        let err = WaveformRecord::new(vec![0.0, 1.0], vec![0.0], Vec::new()).unwrap_err();
        assert!(matches!(err, WaveformError::Malformed { .. }));
    }

    #[test]
    fn test_rejects_non_increasing_time() {
        let err =
            WaveformRecord::new(vec![0.0, 1.0, 1.0], vec![0.0, 0.0, 0.0], Vec::new()).unwrap_err();
        assert_eq!(
            err,
            WaveformError::Malformed {
                reason: "time does not increase at index 2".to_string()
            }
        );
    }

    #[test]
    fn test_rejects_single_sample() {
        let err = WaveformRecord::new(vec![0.0], vec![0.0], Vec::new()).unwrap_err();
        assert!(matches!(err, WaveformError::TooShort { required: 2, actual: 1 }));
    }

    #[test]
    fn test_rejects_nan() {
        let err = WaveformRecord::new(vec![0.0, 1.0], vec![f64::NAN, 0.0], Vec::new()).unwrap_err();
        assert!(matches!(err, WaveformError::Malformed { .. }));
    }

    #[test]
    fn test_min_index_takes_first_minimum() {
        let record = WaveformRecord::new(
            vec![0.0, 1.0, 2.0, 3.0],
            vec![0.0, -2.0, -2.0, 1.0],
            Vec::new(),
        )
        .unwrap();
        assert_eq!(record.min_index(), 1);
        assert_eq!(record.min_voltage(), -2.0);
        assert_eq!(record.duration(), 3.0);
    }
}
