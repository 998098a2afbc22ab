// Calculation record text: `key,value` lines, no trailing newline. Values are
// written in shortest round-trip scientific form so a reload is bit-exact.

use crate::error::CalculationError;

pub fn write_record(entries: &[(&str, f64)]) -> String {
    entries
        .iter()
        .map(|(key, value)| format!("{},{:e}", key, value))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parsed `key,value` pairs in file order
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFields {
    values: Vec<(String, f64)>,
}

impl RecordFields {
    pub fn get(&self, key: &str) -> Result<f64, CalculationError> {
        self.optional(key).ok_or_else(|| CalculationError::MissingKey {
            key: key.to_string(),
        })
    }

    pub fn optional(&self, key: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| *v)
    }
}

pub fn parse_record(text: &str) -> Result<RecordFields, CalculationError> {
    let mut values = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (key, value) = line.split_once(',').ok_or_else(|| CalculationError::Corrupt {
            line: i + 1,
            reason: format!("expected 'key,value', got '{}'", line),
        })?;
        let value = value
            .trim()
            .parse::<f64>()
            .map_err(|e| CalculationError::Corrupt {
                line: i + 1,
                reason: format!("{}: {}", key, e),
            })?;
        values.push((key.trim().to_string(), value));
    }
    Ok(RecordFields { values })
}
