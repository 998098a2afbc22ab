// Sanity check for shaping profiles

use super::state::ShapingProfile;
use super::ShapingStage;
use crate::error::CalculationError;

/// Validator for per-waveform shaping profiles
pub struct ProfileValidator;

impl ProfileValidator {
    /// Every stage needs a finite, positive rise time and amplitude
    pub fn validate(profile: &ShapingProfile) -> Result<(), CalculationError> {
        for stage in ShapingStage::ALL {
            let rise = profile.rise1090[stage.index()];
            let amplitude = profile.amplitude[stage.index()];
            if !rise.is_finite() || rise <= 0.0 {
                return Err(CalculationError::Implausible {
                    reason: format!("{} rise time {}", stage, rise),
                });
            }
            if !amplitude.is_finite() || amplitude <= 0.0 {
                return Err(CalculationError::Implausible {
                    reason: format!("{} amplitude {}", stage, amplitude),
                });
            }
        }
        Ok(())
    }
}
