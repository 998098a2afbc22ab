// Classifier - single-photoelectron sorting of raw scope traces
//
// Each raw waveform is baseline-corrected, run through a zero-phase FIR
// lowpass, trimmed of the filter's edge transients and inverted so pulses
// point up. Peaks above the noise floor are counted and the decision follows
// a fixed rule order:
//
// - no peak                                              → Reject
// - one peak, window minimum below -single_peak_threshold → Accept
// - several peaks, window minimum below -multi_peak_threshold,
//   every peak but one inside the secondary band           → Accept
// - anything else                                        → Uncertain (adjudicated)
//
// The filtered, trimmed trace is what lands in the decided partition.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::analysis::adjudicator::{AdjudicationRequest, Adjudicator};
use crate::analysis::features::{baseline_average, MIN_SAMPLES};
use crate::analysis::filter::FirLowpass;
use crate::analysis::peaks::{Peak, PeakFinder};
use crate::config::ClassifierConfig;
use crate::error::{AdjudicationError, PipelineError, WaveformError};
use crate::store::{Partition, WaveformStore};
use crate::waveform::{WaveformId, WaveformRecord};

/// Final verdict for one waveform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationDecision {
    Accept,
    Reject,
    Uncertain,
}

/// Automatic classification of one raw waveform
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub decision: ClassificationDecision,
    /// Baseline-corrected, filtered and trimmed trace
    pub filtered: WaveformRecord,
    /// Peaks of the inverted filtered trace, ascending index
    pub peaks: Vec<Peak>,
    /// Peaks whose height lies in the secondary band
    pub secondary_peaks: usize,
    /// Minimum of the filtered trace over the analysis window
    pub window_minimum: f64,
    /// Baseline subtracted before filtering
    pub baseline: f64,
}

/// Result of sorting one id into a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOutcome {
    /// Already present in an output partition; nothing was done
    AlreadySorted(Partition),
    Sorted {
        decision: ClassificationDecision,
        /// True when the adjudicator made the call
        adjudicated: bool,
    },
}

impl SortOutcome {
    pub fn partition(&self) -> Partition {
        match *self {
            SortOutcome::AlreadySorted(partition) => partition,
            SortOutcome::Sorted { decision, .. } => Partition::for_decision(decision),
        }
    }
}

/// Filter-and-count classifier
#[derive(Debug, Clone)]
pub struct Classifier {
    config: ClassifierConfig,
    lowpass: FirLowpass,
    peaks: PeakFinder,
}

impl Classifier {
    pub fn new(config: &ClassifierConfig, sample_rate: f64) -> Self {
        Self {
            config: config.clone(),
            lowpass: FirLowpass::new(sample_rate, config.cutoff_frequency, config.tap_count),
            peaks: PeakFinder::new(config.noise_floor),
        }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify a raw waveform without touching any store
    ///
    /// # Errors
    /// `TooShort` when the record cannot survive filtering and trimming.
    pub fn classify(&self, raw: &WaveformRecord) -> Result<Classification, WaveformError> {
        raw.require_len(MIN_SAMPLES)?;

        let baseline = baseline_average(raw);
        let centered: Vec<f64> = raw.voltage().iter().map(|v| v - baseline).collect();
        let smoothed = self.lowpass.filtfilt(&centered)?;

        let (lo, hi) = (self.config.tap_count, raw.len() - 1);
        if hi <= lo + 1 {
            return Err(WaveformError::TooShort {
                required: self.config.tap_count + 3,
                actual: raw.len(),
            });
        }
        let filtered = WaveformRecord::new(
            raw.time()[lo..hi].to_vec(),
            smoothed[lo..hi].to_vec(),
            raw.header().to_vec(),
        )?;

        let inverted: Vec<f64> = filtered.voltage().iter().map(|v| -v).collect();
        let peaks = self.peaks.find(&inverted);
        let (band_lo, band_hi) = self.config.secondary_band;
        let secondary_peaks = peaks
            .iter()
            .filter(|p| p.height >= band_lo && p.height <= band_hi)
            .count();
        let window_minimum = self.window_minimum(filtered.voltage());
        let decision = self.decide(peaks.len(), secondary_peaks, window_minimum);

        tracing::debug!(
            "[Classifier] {} peaks ({} secondary), window minimum {:.6} → {:?}",
            peaks.len(),
            secondary_peaks,
            window_minimum,
            decision
        );

        Ok(Classification {
            decision,
            filtered,
            peaks,
            secondary_peaks,
            window_minimum,
            baseline,
        })
    }

    /// Apply the decision rules, in order
    pub fn decide(
        &self,
        peak_count: usize,
        secondary_peaks: usize,
        window_minimum: f64,
    ) -> ClassificationDecision {
        if peak_count == 0 {
            ClassificationDecision::Reject
        } else if peak_count == 1 && window_minimum < -self.config.single_peak_threshold {
            ClassificationDecision::Accept
        } else if peak_count >= 2
            && window_minimum < -self.config.multi_peak_threshold
            && secondary_peaks == peak_count - 1
        {
            ClassificationDecision::Accept
        } else {
            ClassificationDecision::Uncertain
        }
    }

    // Empty window (trace shorter than its start) never passes a threshold.
    fn window_minimum(&self, voltage: &[f64]) -> f64 {
        let (start, end) = self.config.analysis_window;
        let end = end.min(voltage.len());
        let start = start.min(end);
        voltage[start..end]
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min)
    }

    /// Classify one stored raw waveform and persist it to its partition
    ///
    /// Ids already present in an output partition are left alone. Uncertain
    /// waveforms go through `adjudicator`, which stays locked for the whole
    /// render and decision exchange.
    pub fn sort<A: Adjudicator>(
        &self,
        store: &dyn WaveformStore,
        id: WaveformId,
        adjudicator: &Mutex<A>,
    ) -> Result<SortOutcome, PipelineError> {
        if let Some(existing) = Partition::CLASSIFIER_OUTPUTS
            .iter()
            .copied()
            .find(|&partition| store.contains(partition, id))
        {
            tracing::debug!("[Classifier] {:05} already in {}", id, existing);
            return Ok(SortOutcome::AlreadySorted(existing));
        }

        let raw = store.get(Partition::Raw, id)?;
        let classification = self.classify(&raw)?;

        let (decision, adjudicated) = match classification.decision {
            ClassificationDecision::Uncertain => {
                let mut guard = adjudicator
                    .lock()
                    .map_err(|_| AdjudicationError::Poisoned)?;
                let request = AdjudicationRequest {
                    id,
                    raw: &raw,
                    classification: &classification,
                };
                let handle = guard.render(&request)?;
                (guard.await_decision(handle)?, true)
            }
            automatic => (automatic, false),
        };

        let partition = Partition::for_decision(decision);
        store.put(partition, id, &classification.filtered)?;
        tracing::info!(
            "[Classifier] {:05} → {}{}",
            id,
            partition,
            if adjudicated { " (adjudicated)" } else { "" }
        );

        Ok(SortOutcome::Sorted {
            decision,
            adjudicated,
        })
    }
}

#[cfg(test)]
#[path = "classifier_tests.rs"]
mod tests;
