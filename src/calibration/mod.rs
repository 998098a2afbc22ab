// Calibration module - pulse shaping to slower front-end bandwidths
//
// This module provides:
// 1. ShapingStage: 1x/2x/4x/8x rise-time tag
// 2. ShapingCalibrator: tau search on the average template and chain building
// 3. ShapingCalibration / ShapingProfile: derived filters and per-id results
//
// The calibration workflow:
// 1. Build the average template from the shifted population
// 2. Calibrate taus and gains on it
// 3. Shape every waveform and cache its per-stage rise time and amplitude

pub mod measure;
pub mod procedure;
pub mod stage;
pub mod state;
pub mod validation;

pub use measure::ShapingCalculator;
pub use procedure::{ShapingCalibrator, TauSearch};
pub use stage::ShapingStage;
pub use state::{ShapingCalibration, ShapingColumn, ShapingProfile, StageParameters};
pub use validation::ProfileValidator;
