// Waveform error types and constants

use crate::error::ErrorCode;
use log::error;

/// Waveform error code constants
///
/// Error code range: 1001-1003
pub struct WaveformErrorCodes;

impl WaveformErrorCodes {
    /// Sample arrays violate the record invariants
    pub const MALFORMED: i32 = 1001;

    /// Not enough samples for the requested operation
    pub const TOO_SHORT: i32 = 1002;

    /// A data row could not be parsed
    pub const PARSE: i32 = 1003;
}

/// Log a waveform error with structured context
pub fn log_waveform_error(err: &WaveformError, context: &str) {
    error!(
        "Waveform error in {}: code={}, component=WaveformRecord, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors raised while constructing or reading waveform records
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WaveformError {
    /// Unequal array lengths, non-finite samples or non-increasing time
    #[error("Malformed waveform: {reason}")]
    Malformed { reason: String },

    /// Fewer samples than an operation requires
    #[error("Waveform too short: need {required} samples, got {actual}")]
    TooShort { required: usize, actual: usize },

    /// A `time,voltage` row that does not parse
    #[error("Unparseable waveform row {line}: {reason}")]
    Parse { line: usize, reason: String },
}

impl ErrorCode for WaveformError {
    fn code(&self) -> i32 {
        match self {
            WaveformError::Malformed { .. } => WaveformErrorCodes::MALFORMED,
            WaveformError::TooShort { .. } => WaveformErrorCodes::TOO_SHORT,
            WaveformError::Parse { .. } => WaveformErrorCodes::PARSE,
        }
    }

    fn message(&self) -> String {
        self.to_string()
    }
}
