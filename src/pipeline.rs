// Batch pipeline - drives every stage over an ordered id range
//
// Stages, each idempotent on restart:
//   classify → align → extract → build_template → calibrate → shape →
//   measure_shaping → summarize
//
// Per-id work runs sequentially, or on a rayon pool when batch.workers > 1.
// Results are gathered back in id order before any reduction, so reports and
// populations do not depend on scheduling.
//
// A waveform whose samples cannot be used is listed in the stage summary and
// the rest of the batch carries on; store I/O and adjudication failures abort.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::aggregate::{
    AverageWaveformTemplate, ColumnSummary, GaussianFitter, Population, TemplateBuilder,
};
use crate::analysis::adjudicator::Adjudicator;
use crate::analysis::alignment::align;
use crate::analysis::classifier::{Classifier, SortOutcome};
use crate::analysis::features::{FeatureExtractor, FeatureKind, FeatureSet};
use crate::cache::{
    calculation_status, CacheOutcome, CacheStats, CalculationCache, CalculationStatus,
    FeatureCalculator,
};
use crate::calibration::{
    ShapingCalculator, ShapingCalibration, ShapingCalibrator, ShapingColumn, ShapingProfile,
    ShapingStage,
};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, StoreError};
use crate::store::{CalculationTable, Partition, WaveformStore};
use crate::waveform::{AcquisitionInfo, WaveformId, SAMPLE_RATE_KEY};

/// Half-open range of waveform ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IdRange {
    pub start: WaveformId,
    pub end: WaveformId,
}

impl IdRange {
    pub fn new(start: WaveformId, end: WaveformId) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, id: WaveformId) -> bool {
        id >= self.start && id < self.end
    }
}

impl Default for IdRange {
    fn default() -> Self {
        Self {
            start: 0,
            end: WaveformId::MAX,
        }
    }
}

/// A waveform a stage had to leave out, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnusableWaveform {
    pub id: WaveformId,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassifySummary {
    pub accepted: usize,
    pub rejected: usize,
    pub uncertain: usize,
    /// Ids skipped because an earlier run already sorted them
    pub already_sorted: usize,
    pub adjudicated: usize,
    /// Raw waveforms left in place because they could not be read or filtered
    pub unusable: Vec<UnusableWaveform>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlignSummary {
    pub aligned: usize,
    pub skipped: usize,
    pub unusable: Vec<UnusableWaveform>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheSummary {
    #[serde(flatten)]
    pub stats: CacheStats,
    pub quarantined_ids: Vec<WaveformId>,
    /// Computed or loaded records whose crossings used the fallback point
    pub fallbacks: usize,
    pub unusable: Vec<UnusableWaveform>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShapeSummary {
    pub waveforms: usize,
    pub stages_written: usize,
    pub unusable: Vec<UnusableWaveform>,
}

/// Histogram fits of every population column
#[derive(Debug, Clone, Serialize)]
pub struct PopulationSummary {
    pub waveforms: usize,
    pub shaped_waveforms: usize,
    pub columns: Vec<ColumnSummary>,
}

/// Per-id lifecycle snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaveformStatus {
    pub id: WaveformId,
    /// Classifier output partition, if sorted
    pub partition: Option<&'static str>,
    pub shifted: bool,
    pub features: CalculationStatus,
    pub shaping: CalculationStatus,
}

/// Everything one full run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub classify: ClassifySummary,
    pub align: AlignSummary,
    pub extract: CacheSummary,
    pub template_contributors: Option<usize>,
    pub calibration: Option<ShapingCalibration>,
    pub shape: Option<ShapeSummary>,
    pub measure: Option<CacheSummary>,
    pub summary: PopulationSummary,
}

/// Orchestrates the per-waveform stages against one store
pub struct BatchPipeline<A: Adjudicator> {
    config: PipelineConfig,
    store: Arc<dyn WaveformStore>,
    adjudicator: Mutex<A>,
    classifier: Classifier,
    extractor: FeatureExtractor,
    sample_rate: f64,
    pool: Option<rayon::ThreadPool>,
}

impl<A: Adjudicator> BatchPipeline<A> {
    /// # Errors
    /// `MissingAcquisitionParameter` when the info has no usable sample rate,
    /// `WorkerPool` when the thread pool cannot be built.
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn WaveformStore>,
        info: &AcquisitionInfo,
        adjudicator: A,
    ) -> Result<Self, PipelineError> {
        let sample_rate =
            info.sample_rate()
                .ok_or_else(|| PipelineError::MissingAcquisitionParameter {
                    key: SAMPLE_RATE_KEY.to_string(),
                })?;
        let impedance = info.impedance().unwrap_or(config.extraction.impedance);

        let pool = if config.batch.workers > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.batch.workers)
                .thread_name(|i| format!("spe-worker-{i}"))
                .build()
                .map_err(|e| PipelineError::WorkerPool(e.to_string()))?;
            Some(pool)
        } else {
            None
        };

        info!(
            "[BatchPipeline] fs {:.3e} Hz, impedance {} ohm, {} worker(s)",
            sample_rate, impedance, config.batch.workers
        );

        Ok(Self {
            classifier: Classifier::new(&config.classifier, sample_rate),
            extractor: FeatureExtractor::new(&config.extraction).with_impedance(impedance),
            config,
            store,
            adjudicator: Mutex::new(adjudicator),
            sample_rate,
            pool,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn WaveformStore> {
        &self.store
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn adjudicator(&self) -> &Mutex<A> {
        &self.adjudicator
    }

    /// Run `f` for every id, in parallel when a pool exists; output keeps id order
    fn for_each<T, F>(&self, ids: &[WaveformId], f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(WaveformId) -> T + Send + Sync,
    {
        match &self.pool {
            Some(pool) => pool.install(|| ids.par_iter().map(|&id| f(id)).collect()),
            None => ids.iter().map(|&id| f(id)).collect(),
        }
    }

    fn ids_in(&self, partition: Partition, range: IdRange) -> Result<Vec<WaveformId>, StoreError> {
        Ok(self
            .store
            .ids(partition)?
            .into_iter()
            .filter(|&id| range.contains(id))
            .collect())
    }

    /// Sort every raw waveform in range into Accepted, Rejected or Uncertain
    ///
    /// Unusable raw waveforms stay unsorted and are listed in the summary.
    /// Any other failure aborts the stage at the first failing id.
    pub fn classify(&self, range: IdRange) -> Result<ClassifySummary, PipelineError> {
        let ids = self.ids_in(Partition::Raw, range)?;
        let store = self.store.as_ref();
        let outcomes = self.for_each(&ids, |id| {
            self.classifier.sort(store, id, &self.adjudicator)
        });
        let (outcomes, unusable) = settle("classify", &ids, outcomes)?;

        let mut summary = ClassifySummary {
            unusable,
            ..ClassifySummary::default()
        };
        for (_, outcome) in outcomes {
            match outcome {
                SortOutcome::AlreadySorted(_) => summary.already_sorted += 1,
                SortOutcome::Sorted { adjudicated, .. } => {
                    if adjudicated {
                        summary.adjudicated += 1;
                    }
                }
            }
            match outcome.partition() {
                Partition::Accepted => summary.accepted += 1,
                Partition::Rejected => summary.rejected += 1,
                _ => summary.uncertain += 1,
            }
        }

        info!(
            "[BatchPipeline] classified {} ids: {} accepted, {} rejected, {} uncertain ({} adjudicated, {} unusable)",
            ids.len(),
            summary.accepted,
            summary.rejected,
            summary.uncertain,
            summary.adjudicated,
            summary.unusable.len()
        );
        Ok(summary)
    }

    /// Write the aligned copy of every accepted waveform that lacks one
    pub fn align(&self, range: IdRange) -> Result<AlignSummary, PipelineError> {
        let ids = self.ids_in(Partition::Accepted, range)?;
        let store = self.store.as_ref();
        let results = self.for_each(&ids, |id| -> Result<bool, PipelineError> {
            if store.contains(Partition::Shifted, id) {
                return Ok(false);
            }
            let accepted = store.get(Partition::Accepted, id)?;
            store.put(Partition::Shifted, id, &align(&accepted)?)?;
            Ok(true)
        });

        let (results, unusable) = settle("align", &ids, results)?;

        let mut summary = AlignSummary {
            unusable,
            ..AlignSummary::default()
        };
        for (_, written) in results {
            if written {
                summary.aligned += 1;
            } else {
                summary.skipped += 1;
            }
        }
        info!(
            "[BatchPipeline] aligned {} waveforms ({} already shifted)",
            summary.aligned, summary.skipped
        );
        Ok(summary)
    }

    /// Run the cache over `ids` and summarize what happened
    fn drain_cache<K>(
        &self,
        stage: &str,
        cache: &CalculationCache<K>,
        ids: &[WaveformId],
    ) -> Result<CacheSummary, PipelineError>
    where
        K: crate::cache::Calculator,
    {
        let outcomes = self.for_each(ids, |id| cache.get_or_compute(id));
        let (outcomes, unusable) = settle(stage, ids, outcomes)?;
        let quarantined_ids = outcomes
            .into_iter()
            .filter(|(_, outcome)| matches!(outcome, CacheOutcome::Quarantined { .. }))
            .map(|(id, _)| id)
            .collect();
        Ok(CacheSummary {
            stats: cache.stats(),
            quarantined_ids,
            fallbacks: 0,
            unusable,
        })
    }

    /// Feature sets of every shifted waveform in range, computing missing ones
    pub fn extract(
        &self,
        range: IdRange,
    ) -> Result<(CacheSummary, Population<FeatureSet>), PipelineError> {
        let ids = self.ids_in(Partition::Shifted, range)?;
        let cache = CalculationCache::new(
            Arc::clone(&self.store),
            FeatureCalculator::new(self.extractor.clone()),
        );
        let mut summary = self.drain_cache("extract", &cache, &ids)?;
        let population = cache.population();
        summary.fallbacks = population.iter().filter(|(_, f)| f.fallback_used).count();

        info!(
            "[BatchPipeline] features: {} computed, {} loaded, {} quarantined",
            summary.stats.computed, summary.stats.loaded, summary.stats.quarantined
        );
        Ok((summary, population))
    }

    /// Average of the shifted waveforms in range, in id order
    pub fn build_template(&self, range: IdRange) -> Result<AverageWaveformTemplate, PipelineError> {
        let ids = self.ids_in(Partition::Shifted, range)?;
        let store = self.store.as_ref();
        let records = self.for_each(&ids, |id| {
            store.get(Partition::Shifted, id).map_err(PipelineError::from)
        });
        let (records, _) = settle("template", &ids, records)?;

        let mut builder = TemplateBuilder::new(&self.config.aggregation);
        for (id, record) in &records {
            builder.add(*id, record);
        }
        if !builder.excluded().is_empty() {
            info!(
                "[BatchPipeline] {} waveforms left out of the template",
                builder.excluded().len()
            );
        }
        Ok(builder.finish()?)
    }

    pub fn calibrator(&self) -> ShapingCalibrator {
        ShapingCalibrator::new(
            self.extractor.clone(),
            self.config.shaping.clone(),
            self.sample_rate,
        )
    }

    pub fn calibrate(
        &self,
        template: &AverageWaveformTemplate,
    ) -> Result<ShapingCalibration, PipelineError> {
        self.calibrator().calibrate(template)
    }

    /// Write the missing shaped stages of every shifted waveform in range
    pub fn shape(
        &self,
        range: IdRange,
        calibration: &ShapingCalibration,
    ) -> Result<ShapeSummary, PipelineError> {
        let ids = self.ids_in(Partition::Shifted, range)?;
        let calibrator = self.calibrator();
        let store = self.store.as_ref();
        let written = self.for_each(&ids, |id| calibrator.shape_chain(store, id, calibration));
        let (written, unusable) = settle("shape", &ids, written)?;

        let summary = ShapeSummary {
            waveforms: ids.len(),
            stages_written: written.iter().map(|(_, count)| count).sum(),
            unusable,
        };
        info!(
            "[BatchPipeline] shaped {} waveforms, {} stage records written",
            summary.waveforms, summary.stages_written
        );
        Ok(summary)
    }

    /// Shaping profiles of every fully shaped waveform in range
    pub fn measure_shaping(
        &self,
        range: IdRange,
    ) -> Result<(CacheSummary, Population<ShapingProfile>), PipelineError> {
        let ids = self.ids_in(Partition::Shaped(ShapingStage::X8), range)?;
        let cache = CalculationCache::new(
            Arc::clone(&self.store),
            ShapingCalculator::new(self.extractor.clone()),
        );
        let summary = self.drain_cache("measure", &cache, &ids)?;
        Ok((summary, cache.population()))
    }

    /// Fit a two-pass Gaussian to every feature and shaping column
    pub fn summarize(
        &self,
        features: &Population<FeatureSet>,
        profiles: Option<&Population<ShapingProfile>>,
    ) -> PopulationSummary {
        let aggregation = &self.config.aggregation;
        let fitter = GaussianFitter::new(aggregation.fit_samples, aggregation.max_evaluations);
        let columns = histogram_columns(features, profiles)
            .into_iter()
            .map(|(name, values)| {
                ColumnSummary::fit(&name, &values, &fitter, aggregation.histogram_bins)
            })
            .collect();

        PopulationSummary {
            waveforms: features.len(),
            shaped_waveforms: profiles.map_or(0, |p| p.len()),
            columns,
        }
    }

    /// Lifecycle of every id seen in range
    pub fn status(&self, range: IdRange) -> Result<Vec<WaveformStatus>, StoreError> {
        let mut ids = BTreeSet::new();
        for partition in [Partition::Raw]
            .into_iter()
            .chain(Partition::CLASSIFIER_OUTPUTS)
        {
            ids.extend(self.ids_in(partition, range)?);
        }

        let store = self.store.as_ref();
        ids.into_iter()
            .map(|id| {
                let partition = Partition::CLASSIFIER_OUTPUTS
                    .into_iter()
                    .find(|&p| store.contains(p, id))
                    .map(Partition::dir_name);
                Ok(WaveformStatus {
                    id,
                    partition,
                    shifted: store.contains(Partition::Shifted, id),
                    features: calculation_status(store, CalculationTable::Features, id)?,
                    shaping: calculation_status(store, CalculationTable::Shaping, id)?,
                })
            })
            .collect()
    }

    /// Every stage in order
    ///
    /// A starved template skips shaping; the feature summary is still produced.
    /// Ids the shaping measurement quarantines drop out of the feature summary.
    pub fn run(&self, range: IdRange) -> Result<RunReport, PipelineError> {
        let classify = self.classify(range)?;
        let align = self.align(range)?;
        let (extract, mut features) = self.extract(range)?;

        let mut report = RunReport {
            classify,
            align,
            extract,
            template_contributors: None,
            calibration: None,
            shape: None,
            measure: None,
            summary: PopulationSummary {
                waveforms: 0,
                shaped_waveforms: 0,
                columns: Vec::new(),
            },
        };

        let profiles = match self.build_template(range) {
            Ok(template) => {
                let calibration = self.calibrate(&template)?;
                report.template_contributors = Some(template.contributors);
                report.shape = Some(self.shape(range, &calibration)?);
                report.calibration = Some(calibration);
                let (measure, profiles) = self.measure_shaping(range)?;
                features.remove(&measure.quarantined_ids);
                report.measure = Some(measure);
                Some(profiles)
            }
            Err(PipelineError::Template(err)) => {
                warn!("[BatchPipeline] shaping skipped: {}", err);
                None
            }
            Err(err) => return Err(err),
        };

        report.summary = self.summarize(&features, profiles.as_ref());
        Ok(report)
    }
}

/// Pair per-id results with their ids, setting aside unusable waveforms
///
/// The first other error, in id order, aborts.
fn settle<T>(
    stage: &str,
    ids: &[WaveformId],
    results: Vec<Result<T, PipelineError>>,
) -> Result<(Vec<(WaveformId, T)>, Vec<UnusableWaveform>), PipelineError> {
    let mut settled = Vec::with_capacity(results.len());
    let mut unusable = Vec::new();
    for (&id, result) in ids.iter().zip(results) {
        match result {
            Ok(value) => settled.push((id, value)),
            Err(err) => match err.as_waveform_error() {
                Some(cause) => {
                    warn!("[BatchPipeline] {} left #{:05} out: {}", stage, id, cause);
                    unusable.push(UnusableWaveform {
                        id,
                        reason: cause.to_string(),
                    });
                }
                None => return Err(err),
            },
        }
    }
    Ok((settled, unusable))
}

/// Named value columns of the populations, features first
pub fn histogram_columns(
    features: &Population<FeatureSet>,
    profiles: Option<&Population<ShapingProfile>>,
) -> Vec<(String, Vec<f64>)> {
    let mut columns: Vec<(String, Vec<f64>)> = FeatureKind::ALL
        .iter()
        .map(|&kind| (kind.key().to_string(), features.feature(kind)))
        .collect();
    if let Some(profiles) = profiles {
        columns.extend(
            ShapingColumn::ALL
                .iter()
                .map(|&column| (column.key(), profiles.shaping(column))),
        );
    }
    columns
}
