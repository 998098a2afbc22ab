// Feature calculation over the shifted partition

use super::Calculator;
use crate::analysis::features::{FeatureExtractor, FeatureSet};
use crate::error::PipelineError;
use crate::store::{Partition, WaveformStore};
use crate::waveform::WaveformId;

pub struct FeatureCalculator {
    extractor: FeatureExtractor,
}

impl FeatureCalculator {
    pub fn new(extractor: FeatureExtractor) -> Self {
        Self { extractor }
    }
}

impl Calculator for FeatureCalculator {
    type Output = FeatureSet;

    fn calculate(
        &self,
        store: &dyn WaveformStore,
        id: WaveformId,
    ) -> Result<FeatureSet, PipelineError> {
        let record = store.get(Partition::Shifted, id)?;
        Ok(self.extractor.extract(&record)?)
    }
}
