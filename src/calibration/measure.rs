// Shaping profile calculation over the shaped partitions

use super::state::ShapingProfile;
use super::ShapingStage;
use crate::analysis::features::FeatureExtractor;
use crate::cache::Calculator;
use crate::error::PipelineError;
use crate::store::{Partition, WaveformStore};
use crate::waveform::WaveformId;

pub struct ShapingCalculator {
    extractor: FeatureExtractor,
}

impl ShapingCalculator {
    pub fn new(extractor: FeatureExtractor) -> Self {
        Self { extractor }
    }
}

impl Calculator for ShapingCalculator {
    type Output = ShapingProfile;

    fn calculate(
        &self,
        store: &dyn WaveformStore,
        id: WaveformId,
    ) -> Result<ShapingProfile, PipelineError> {
        let mut profile = ShapingProfile {
            rise1090: [0.0; 4],
            amplitude: [0.0; 4],
        };
        for stage in ShapingStage::ALL {
            let record = store.get(Partition::Shaped(stage), id)?;
            profile.rise1090[stage.index()] = self.extractor.rise_time(&record, 0.1, 0.9)?;
            profile.amplitude[stage.index()] = self.extractor.amplitude(&record)?;
        }
        Ok(profile)
    }
}
