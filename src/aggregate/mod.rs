//! Population aggregation
//!
//! - [`Population`]: read-only snapshot of per-id calculations, keyed by id
//! - [`TemplateBuilder`]: aligned, normalized average waveform
//! - [`GaussianFitter`]: two-pass Gaussian refinement of a feature histogram

mod histogram;
mod template;

pub use histogram::{GaussianFitter, GaussianParameters, Histogram, HistogramFit};
pub use template::{AverageWaveformTemplate, TemplateBuilder};

use crate::analysis::features::{FeatureKind, FeatureSet};
use crate::calibration::{ShapingColumn, ShapingProfile};
use crate::error::StoreError;
use crate::waveform::WaveformId;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Calculations of many waveforms, iterated in id order
#[derive(Debug, Clone, PartialEq)]
pub struct Population<C> {
    entries: BTreeMap<WaveformId, C>,
}

impl<C> Population<C> {
    pub fn new(entries: BTreeMap<WaveformId, C>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: WaveformId) -> Option<&C> {
        self.entries.get(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = WaveformId> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (WaveformId, &C)> {
        self.entries.iter().map(|(id, c)| (*id, c))
    }

    /// Drop members, e.g. ids a later stage quarantined
    pub fn remove(&mut self, ids: &[WaveformId]) {
        for id in ids {
            self.entries.remove(id);
        }
    }

    /// One value per member, in id order
    pub fn column(&self, value: impl Fn(&C) -> f64) -> Vec<f64> {
        self.entries.values().map(value).collect()
    }
}

impl Population<FeatureSet> {
    pub fn feature(&self, kind: FeatureKind) -> Vec<f64> {
        self.column(|f| kind.value(f))
    }
}

impl Population<ShapingProfile> {
    pub fn shaping(&self, column: ShapingColumn) -> Vec<f64> {
        self.column(|p| column.value(p))
    }
}

/// Write `values` sorted ascending, one per line
pub fn write_histogram_data(values: &[f64], path: &Path) -> Result<(), StoreError> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let text: String = sorted.iter().map(|v| format!("{}\n", v)).collect();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    fs::write(path, text).map_err(|e| StoreError::io(path, e))
}

/// Fit outcome for one named column
#[derive(Debug, Clone, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fit: Option<HistogramFit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ColumnSummary {
    /// Fit `values`; a fit failure is recorded, not propagated
    pub fn fit(name: &str, values: &[f64], fitter: &GaussianFitter, bins: usize) -> Self {
        let (fit, error) = match fitter.fit(values, bins) {
            Ok(fit) => (Some(fit), None),
            Err(err) => {
                tracing::warn!("[Aggregator] Gaussian fit of {} failed: {}", name, err);
                (None, Some(err.to_string()))
            }
        };
        Self {
            name: name.to_string(),
            count: values.len(),
            fit,
            error,
        }
    }
}
