// Waveform store error types and constants

use crate::error::{ErrorCode, WaveformError};
use crate::store::Partition;
use crate::waveform::WaveformId;
use log::error;
use std::path::PathBuf;

/// Store error code constants
///
/// Error code range: 2001-2004
pub struct StoreErrorCodes;

impl StoreErrorCodes {
    /// Requested waveform is not in the partition
    pub const NOT_FOUND: i32 = 2001;

    /// Filesystem operation failed
    pub const IO: i32 = 2002;

    /// Stored bytes are not a valid record
    pub const CORRUPT: i32 = 2003;

    /// Stored waveform failed record validation
    pub const WAVEFORM: i32 = 2004;
}

/// Log a store error with structured context
pub fn log_store_error(err: &StoreError, context: &str) {
    error!(
        "Store error in {}: code={}, component=WaveformStore, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors raised by `WaveformStore` implementations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{partition} has no waveform #{id:05}")]
    NotFound { partition: Partition, id: WaveformId },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt record at {location}: {reason}")]
    Corrupt { location: String, reason: String },

    #[error(transparent)]
    Waveform(#[from] WaveformError),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the error only means "not there"
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl ErrorCode for StoreError {
    fn code(&self) -> i32 {
        match self {
            StoreError::NotFound { .. } => StoreErrorCodes::NOT_FOUND,
            StoreError::Io { .. } => StoreErrorCodes::IO,
            StoreError::Corrupt { .. } => StoreErrorCodes::CORRUPT,
            StoreError::Waveform(_) => StoreErrorCodes::WAVEFORM,
        }
    }

    fn message(&self) -> String {
        self.to_string()
    }
}
