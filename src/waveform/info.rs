// Acquisition info file: ordered `key,value` lines written next to the raw
// waveforms. Only the sample rate and the scope input impedance are
// interpreted; everything else passes through untouched.

use crate::error::StoreError;

pub const SAMPLE_RATE_KEY: &str = "Oscilloscope sample rate (Hz)";
pub const IMPEDANCE_KEY: &str = "Oscilloscope resistance (ohms)";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcquisitionInfo {
    entries: Vec<(String, String)>,
}

impl AcquisitionInfo {
    /// Info carrying just the two interpreted parameters
    pub fn with_acquisition(sample_rate: f64, impedance: f64) -> Self {
        let mut info = Self::default();
        info.set(SAMPLE_RATE_KEY, &format!("{:e}", sample_rate));
        info.set(IMPEDANCE_KEY, &impedance.to_string());
        info
    }

    /// Parse the info file text; blank lines are skipped
    pub fn parse(text: &str) -> Result<Self, StoreError> {
        let mut entries = Vec::new();
        for (i, line) in text.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let (key, value) = line.split_once(',').ok_or_else(|| StoreError::Corrupt {
                location: format!("info line {}", i + 1),
                reason: format!("expected 'key,value', got '{}'", line),
            })?;
            entries.push((key.to_string(), value.to_string()));
        }
        Ok(Self { entries })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Replace the value of `key`, appending it when absent
    pub fn set(&mut self, key: &str, value: &str) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((key.to_string(), value.to_string())),
        }
    }

    /// Samples per second, if present and numeric
    pub fn sample_rate(&self) -> Option<f64> {
        self.numeric(SAMPLE_RATE_KEY)
    }

    /// Scope input impedance in ohms, if present and numeric
    pub fn impedance(&self) -> Option<f64> {
        self.numeric(IMPEDANCE_KEY)
    }

    fn numeric(&self, key: &str) -> Option<f64> {
        self.get(key)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v > 0.0)
    }

    pub fn to_text(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{},{}", k, v))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors_and_passthrough() {
        let text = "Gain,1e7\nOscilloscope sample rate (Hz),2e10\nOscilloscope resistance (ohms),50\nNotes,dark box, 22C\n";
        let info = AcquisitionInfo::parse(text).unwrap();
        assert_eq!(info.sample_rate(), Some(2e10));
        assert_eq!(info.impedance(), Some(50.0));
        assert_eq!(info.get("Notes"), Some("dark box, 22C"));
        assert_eq!(info.to_text(), text.trim_end());
    }

    #[test]
    fn test_missing_or_bad_values() {
        let info = AcquisitionInfo::parse("Oscilloscope sample rate (Hz),fast").unwrap();
        assert_eq!(info.sample_rate(), None);
        assert_eq!(info.impedance(), None);
    }

    #[test]
    fn test_rejects_line_without_comma() {
        assert!(AcquisitionInfo::parse("just text").is_err());
    }

    #[test]
    fn test_with_acquisition_round_trips() {
        let info = AcquisitionInfo::with_acquisition(2.0e10, 50.0);
        let parsed = AcquisitionInfo::parse(&info.to_text()).unwrap();
        assert_eq!(parsed.sample_rate(), Some(2.0e10));
        assert_eq!(parsed.impedance(), Some(50.0));
    }
}
