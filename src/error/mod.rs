// Error types for the SPE waveform pipeline
//
// Each stage has its own error family with stable numeric codes. The
// pipeline-level error wraps them so batch drivers can propagate with `?`.

mod analysis;
mod store;
mod waveform;

pub use analysis::{
    log_analysis_error, AdjudicationError, AnalysisErrorCodes, CalculationError, FitError,
    TemplateError,
};
pub use store::{log_store_error, StoreError, StoreErrorCodes};
pub use waveform::{log_waveform_error, WaveformError, WaveformErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, so the CLI and reports can surface them
/// consistently.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}

/// Pipeline error code constants
///
/// Error code range: 6001-6002 (wrapped families keep their own codes)
pub struct PipelineErrorCodes;

impl PipelineErrorCodes {
    /// Worker pool could not be started
    pub const WORKER_POOL: i32 = 6001;

    /// A required acquisition parameter is missing from the info file
    pub const MISSING_ACQUISITION_PARAMETER: i32 = 6002;
}

/// Errors surfaced by the batch pipeline and the calculation cache
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Waveform(#[from] WaveformError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Calculation(#[from] CalculationError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Fit(#[from] FitError),

    #[error(transparent)]
    Adjudication(#[from] AdjudicationError),

    /// Worker pool could not be started
    #[error("Worker pool failed to start: {0}")]
    WorkerPool(String),

    /// The info file lacks a parameter the stage needs
    #[error("Acquisition info is missing '{key}'")]
    MissingAcquisitionParameter { key: String },
}

impl PipelineError {
    /// The sample-level cause when only one waveform's data is unusable
    ///
    /// Batch stages record these per id and keep going; anything else
    /// (I/O, adjudication, worker pool) aborts the stage.
    pub fn as_waveform_error(&self) -> Option<&WaveformError> {
        match self {
            PipelineError::Waveform(err) | PipelineError::Store(StoreError::Waveform(err)) => {
                Some(err)
            }
            _ => None,
        }
    }
}

impl ErrorCode for PipelineError {
    fn code(&self) -> i32 {
        match self {
            PipelineError::Waveform(err) => err.code(),
            PipelineError::Store(err) => err.code(),
            PipelineError::Calculation(err) => err.code(),
            PipelineError::Template(err) => err.code(),
            PipelineError::Fit(err) => err.code(),
            PipelineError::Adjudication(err) => err.code(),
            PipelineError::WorkerPool(_) => PipelineErrorCodes::WORKER_POOL,
            PipelineError::MissingAcquisitionParameter { .. } => {
                PipelineErrorCodes::MISSING_ACQUISITION_PARAMETER
            }
        }
    }

    fn message(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_errors_keep_their_codes() {
        let err = PipelineError::from(WaveformError::TooShort {
            required: 16,
            actual: 3,
        });
        assert_eq!(err.code(), WaveformErrorCodes::TOO_SHORT);
        assert!(err.message().contains("16"));

        let err = PipelineError::from(FitError::NonConvergence { evaluations: 10 });
        assert_eq!(err.code(), AnalysisErrorCodes::FIT_NON_CONVERGENCE);
    }

    #[test]
    fn test_pipeline_codes() {
        let err = PipelineError::MissingAcquisitionParameter {
            key: "Oscilloscope sample rate (Hz)".to_string(),
        };
        assert_eq!(err.code(), 6002);
        assert!(err.message().contains("sample rate"));
        assert_eq!(PipelineError::WorkerPool("x".into()).code(), 6001);
    }

    #[test]
    fn test_waveform_cause_through_store() {
        let malformed = WaveformError::Malformed {
            reason: "time does not increase at index 4".to_string(),
        };
        let err = PipelineError::from(StoreError::from(malformed.clone()));
        assert_eq!(err.as_waveform_error(), Some(&malformed));
        assert!(PipelineError::from(malformed.clone())
            .as_waveform_error()
            .is_some());

        let io = StoreError::io("d0", std::io::Error::new(std::io::ErrorKind::Other, "disk gone"));
        assert!(PipelineError::from(io).as_waveform_error().is_none());
        assert!(PipelineError::from(AdjudicationError::Closed)
            .as_waveform_error()
            .is_none());
    }
}
