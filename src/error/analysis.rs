// Analysis error types: calculation records, template building, histogram
// fits and human adjudication

use crate::error::ErrorCode;
use log::error;

/// Analysis error code constants
///
/// Error code ranges: 3001-3003 (calculations), 4001 (template),
/// 4101-4103 (fits), 5001-5003 (adjudication)
pub struct AnalysisErrorCodes;

impl AnalysisErrorCodes {
    pub const CALCULATION_CORRUPT: i32 = 3001;
    pub const CALCULATION_MISSING_KEY: i32 = 3002;
    pub const CALCULATION_IMPLAUSIBLE: i32 = 3003;

    pub const TEMPLATE_STARVED: i32 = 4001;

    pub const FIT_INSUFFICIENT_DATA: i32 = 4101;
    pub const FIT_DEGENERATE: i32 = 4102;
    pub const FIT_NON_CONVERGENCE: i32 = 4103;

    pub const ADJUDICATION_IO: i32 = 5001;
    pub const ADJUDICATION_CLOSED: i32 = 5002;
    pub const ADJUDICATION_POISONED: i32 = 5003;
}

/// Log any analysis error with structured context
pub fn log_analysis_error<E: ErrorCode>(err: &E, component: &str, context: &str) {
    error!(
        "Analysis error in {}: code={}, component={}, message={}",
        context,
        err.code(),
        component,
        err.message()
    );
}

/// Errors reading or validating a persisted calculation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalculationError {
    #[error("Corrupt calculation line {line}: {reason}")]
    Corrupt { line: usize, reason: String },

    #[error("Calculation record lacks key '{key}'")]
    MissingKey { key: String },

    /// Values violate the sanity predicate
    #[error("Impossible calculation: {reason}")]
    Implausible { reason: String },
}

impl ErrorCode for CalculationError {
    fn code(&self) -> i32 {
        match self {
            CalculationError::Corrupt { .. } => AnalysisErrorCodes::CALCULATION_CORRUPT,
            CalculationError::MissingKey { .. } => AnalysisErrorCodes::CALCULATION_MISSING_KEY,
            CalculationError::Implausible { .. } => AnalysisErrorCodes::CALCULATION_IMPLAUSIBLE,
        }
    }

    fn message(&self) -> String {
        self.to_string()
    }
}

/// Errors building the average waveform template
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TemplateError {
    #[error("No waveform qualified for the average template ({examined} examined)")]
    Starved { examined: usize },
}

impl ErrorCode for TemplateError {
    fn code(&self) -> i32 {
        match self {
            TemplateError::Starved { .. } => AnalysisErrorCodes::TEMPLATE_STARVED,
        }
    }

    fn message(&self) -> String {
        self.to_string()
    }
}

/// Errors fitting a Gaussian to a histogram
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FitError {
    #[error("Not enough data to fit: {samples} samples")]
    InsufficientData { samples: usize },

    #[error("Degenerate fit: {reason}")]
    Degenerate { reason: String },

    #[error("Fit did not converge within {evaluations} evaluations")]
    NonConvergence { evaluations: usize },
}

impl ErrorCode for FitError {
    fn code(&self) -> i32 {
        match self {
            FitError::InsufficientData { .. } => AnalysisErrorCodes::FIT_INSUFFICIENT_DATA,
            FitError::Degenerate { .. } => AnalysisErrorCodes::FIT_DEGENERATE,
            FitError::NonConvergence { .. } => AnalysisErrorCodes::FIT_NON_CONVERGENCE,
        }
    }

    fn message(&self) -> String {
        self.to_string()
    }
}

/// Errors talking to a human adjudicator
#[derive(Debug, thiserror::Error)]
pub enum AdjudicationError {
    #[error("Adjudicator I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Input ended before a decision was given
    #[error("Adjudicator input closed before a decision")]
    Closed,

    /// Another worker panicked while holding the adjudicator
    #[error("Adjudicator lock poisoned")]
    Poisoned,
}

impl ErrorCode for AdjudicationError {
    fn code(&self) -> i32 {
        match self {
            AdjudicationError::Io(_) => AnalysisErrorCodes::ADJUDICATION_IO,
            AdjudicationError::Closed => AnalysisErrorCodes::ADJUDICATION_CLOSED,
            AdjudicationError::Poisoned => AnalysisErrorCodes::ADJUDICATION_POISONED,
        }
    }

    fn message(&self) -> String {
        self.to_string()
    }
}
