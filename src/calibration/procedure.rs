// ShapingCalibrator - emulate slower front-end electronics
//
// Workflow:
// 1. calibrate(): on the negated average template, search the single-pole
//    time constant that doubles the 10-90% rise time, then repeat on the 2x
//    and 4x results. Gains are measured on the un-normalized chain.
// 2. shape_chain(): for each waveform, write 1x (the shifted record) and
//    build every further stage from the stored previous stage.

use super::stage::ShapingStage;
use super::state::{ShapingCalibration, StageParameters};
use crate::aggregate::AverageWaveformTemplate;
use crate::analysis::features::FeatureExtractor;
use crate::analysis::filter::single_pole_lowpass;
use crate::config::ShapingConfig;
use crate::error::{PipelineError, WaveformError};
use crate::store::{Partition, WaveformStore};
use crate::waveform::resample::argmin;
use crate::waveform::{WaveformId, WaveformRecord};
use serde::Serialize;
use tracing::{debug, info};

/// Outcome of one bounded tau scan
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TauSearch {
    pub tau: f64,
    /// Rise time of the record filtered with `tau`
    pub shaped_rise: f64,
    /// Ratio times the unshaped rise time
    pub target: f64,
    /// Grid points filtered before stopping
    pub evaluated: usize,
    /// False when the grid ran out before reaching the target
    pub reached: bool,
}

pub struct ShapingCalibrator {
    extractor: FeatureExtractor,
    config: ShapingConfig,
    sample_rate: f64,
}

impl ShapingCalibrator {
    pub fn new(extractor: FeatureExtractor, config: ShapingConfig, sample_rate: f64) -> Self {
        Self {
            extractor,
            config,
            sample_rate,
        }
    }

    /// Apply the single-pole lowpass with time constant `tau`
    pub fn filter(&self, record: &WaveformRecord, tau: f64) -> Result<WaveformRecord, WaveformError> {
        record.with_voltage(single_pole_lowpass(record.voltage(), tau, self.sample_rate))
    }

    /// Scan `tau = k * tau_step` upward until the rise time reaches the target
    ///
    /// Returns the scanned tau whose rise time is closest to the target.
    pub fn search_tau(&self, record: &WaveformRecord) -> Result<TauSearch, WaveformError> {
        let original = self.extractor.rise_time(record, 0.1, 0.9)?;
        let target = self.config.target_rise_ratio * original;
        let first = self.config.tau_first_index;
        let last = self.config.tau_last_index.max(first + 1);

        let mut taus = Vec::new();
        let mut rises = Vec::new();
        let mut reached = false;
        for k in first..last {
            let tau = k as f64 * self.config.tau_step;
            let rise = self.extractor.rise_time(&self.filter(record, tau)?, 0.1, 0.9)?;
            taus.push(tau);
            rises.push(rise);
            if rise - target >= 0.0 {
                reached = true;
                break;
            }
        }

        let distance: Vec<f64> = rises.iter().map(|r| (r - target).abs()).collect();
        let best = argmin(&distance);
        debug!(
            "[ShapingCalibrator] tau {:.3e} after {} steps (rise {:.2e}, target {:.2e})",
            taus[best],
            taus.len(),
            rises[best],
            target
        );
        Ok(TauSearch {
            tau: taus[best],
            shaped_rise: rises[best],
            target,
            evaluated: taus.len(),
            reached,
        })
    }

    /// Derive per-stage taus and gains from the average template
    pub fn calibrate(
        &self,
        template: &AverageWaveformTemplate,
    ) -> Result<ShapingCalibration, PipelineError> {
        let unshaped = template.to_negative_record()?;

        let mut taus = [0.0; 3];
        let mut chain = vec![unshaped];
        for i in 0..3 {
            let previous = &chain[i];
            taus[i] = match self.config.fixed_taus {
                Some(fixed) => fixed[i],
                None => self.search_tau(previous)?.tau,
            };
            let next = self.filter(previous, taus[i])?;
            chain.push(next);
        }

        let unshaped_peak = chain[0].min_voltage();
        let gains = [
            unshaped_peak / chain[1].min_voltage(),
            unshaped_peak / chain[2].min_voltage(),
            unshaped_peak / chain[3].min_voltage(),
        ];

        info!(
            "[ShapingCalibrator] taus {:.3e} {:.3e} {:.3e}, gains {:.4} {:.4} {:.4} ({} waveforms averaged)",
            taus[0], taus[1], taus[2], gains[0], gains[1], gains[2], template.contributors
        );
        Ok(ShapingCalibration::new(taus, gains, template.contributors))
    }

    /// Build stage `next` from the gain-normalized `previous` stage record
    pub fn next_stage(
        &self,
        previous_record: &WaveformRecord,
        previous: &StageParameters,
        next: &StageParameters,
    ) -> Result<WaveformRecord, WaveformError> {
        let degained: Vec<f64> = previous_record
            .voltage()
            .iter()
            .map(|v| v / previous.gain)
            .collect();
        let filtered = single_pole_lowpass(&degained, next.tau, self.sample_rate);
        previous_record.with_voltage(filtered.iter().map(|v| v * next.gain).collect())
    }

    /// Write every missing stage of `id`; returns how many were written
    pub fn shape_chain(
        &self,
        store: &dyn WaveformStore,
        id: WaveformId,
        calibration: &ShapingCalibration,
    ) -> Result<usize, PipelineError> {
        let mut written = 0;
        let first = Partition::Shaped(ShapingStage::X1);
        let mut current = if store.contains(first, id) {
            store.get(first, id)?
        } else {
            let shifted = store.get(Partition::Shifted, id)?;
            store.put(first, id, &shifted)?;
            written += 1;
            shifted
        };

        for stage in ShapingStage::ALL.into_iter().skip(1) {
            let partition = Partition::Shaped(stage);
            current = if store.contains(partition, id) {
                store.get(partition, id)?
            } else {
                let previous = stage.previous().unwrap_or(ShapingStage::X1);
                let record = self.next_stage(
                    &current,
                    calibration.stage(previous),
                    calibration.stage(stage),
                )?;
                store.put(partition, id, &record)?;
                written += 1;
                record
            };
        }
        Ok(written)
    }
}

#[cfg(test)]
#[path = "procedure_tests.rs"]
mod tests;
