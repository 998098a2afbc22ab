// Average waveform template
//
// Each contributor is normalized to unit peak, rotated so its t = 0 sample
// leads, has the span between its latest sample and the coverage cut excised
// so the pre-pulse baseline wraps to the front, and is cut or padded to a
// common window before being summed.

use crate::config::AggregationConfig;
use crate::error::{TemplateError, WaveformError};
use crate::waveform::resample::{argmax, argmin};
use crate::waveform::{WaveformId, WaveformRecord};
use tracing::debug;

/// Header written in front of a saved template
pub const TEMPLATE_HEADER: &[u8] = b"Average Waveform\n\n\n\nTime,Ampl\n";

/// Mean of the normalized, aligned contributors (peak at +1)
#[derive(Debug, Clone, PartialEq)]
pub struct AverageWaveformTemplate {
    pub time: Vec<f64>,
    pub voltage: Vec<f64>,
    pub contributors: usize,
}

impl AverageWaveformTemplate {
    pub fn to_record(&self) -> Result<WaveformRecord, WaveformError> {
        WaveformRecord::new(
            self.time.clone(),
            self.voltage.clone(),
            TEMPLATE_HEADER.to_vec(),
        )
    }

    /// The template flipped back to a negative-going pulse
    pub fn to_negative_record(&self) -> Result<WaveformRecord, WaveformError> {
        WaveformRecord::new(
            self.time.clone(),
            self.voltage.iter().map(|v| -v).collect(),
            TEMPLATE_HEADER.to_vec(),
        )
    }
}

/// Running sum over contributors
#[derive(Debug, Clone)]
pub struct TemplateBuilder {
    coverage_fraction: f64,
    window_fraction: f64,
    window_len: Option<usize>,
    time_sum: Vec<f64>,
    voltage_sum: Vec<f64>,
    contributors: usize,
    examined: usize,
    excluded: Vec<WaveformId>,
}

impl TemplateBuilder {
    pub fn new(config: &AggregationConfig) -> Self {
        Self {
            coverage_fraction: config.coverage_fraction,
            window_fraction: config.template_window_fraction,
            window_len: None,
            time_sum: Vec::new(),
            voltage_sum: Vec::new(),
            contributors: 0,
            examined: 0,
            excluded: Vec::new(),
        }
    }

    /// Ids left out of the average so far
    pub fn excluded(&self) -> &[WaveformId] {
        &self.excluded
    }

    /// Add a shifted waveform; returns whether it contributed
    pub fn add(&mut self, id: WaveformId, record: &WaveformRecord) -> bool {
        self.examined += 1;
        match self.prepare(record) {
            Some((time, voltage)) => {
                if self.time_sum.is_empty() {
                    self.time_sum = time;
                    self.voltage_sum = voltage;
                } else {
                    for (sum, t) in self.time_sum.iter_mut().zip(&time) {
                        *sum += t;
                    }
                    for (sum, v) in self.voltage_sum.iter_mut().zip(&voltage) {
                        *sum += v;
                    }
                }
                self.contributors += 1;
                true
            }
            None => {
                debug!("[TemplateBuilder] #{:05} excluded from the average", id);
                self.excluded.push(id);
                false
            }
        }
    }

    fn prepare(&mut self, record: &WaveformRecord) -> Option<(Vec<f64>, Vec<f64>)> {
        let n = record.len();
        let minimum = record.min_voltage();
        if minimum >= 0.0 {
            return None;
        }
        let zero = record.time().iter().position(|&t| t == 0.0)?;

        let mut time = record.time().to_vec();
        let mut voltage: Vec<f64> = record.voltage().iter().map(|v| v / minimum).collect();
        time.rotate_left(zero);
        voltage.rotate_left(zero);

        let latest = argmax(&time);
        let earliest = argmin(&time);
        let cut = (self.coverage_fraction * n as f64) as usize;
        // the wrapped pre-pulse samples must start right after the latest one
        if zero == 0 || earliest != latest + 1 || earliest > cut {
            return None;
        }

        let mut time: Vec<f64> = time[..latest].iter().chain(&time[cut..]).copied().collect();
        let mut voltage: Vec<f64> = voltage[..latest]
            .iter()
            .chain(&voltage[cut..])
            .copied()
            .collect();
        time.rotate_left(latest);
        voltage.rotate_left(latest);

        let window = *self
            .window_len
            .get_or_insert(((self.window_fraction * n as f64) as usize).max(2));
        fit_to_window(&mut time, &mut voltage, window);
        Some((time, voltage))
    }

    pub fn finish(self) -> Result<AverageWaveformTemplate, TemplateError> {
        if self.contributors == 0 {
            return Err(TemplateError::Starved {
                examined: self.examined,
            });
        }
        let count = self.contributors as f64;
        Ok(AverageWaveformTemplate {
            time: self.time_sum.iter().map(|t| t / count).collect(),
            voltage: self.voltage_sum.iter().map(|v| v / count).collect(),
            contributors: self.contributors,
        })
    }
}

/// Truncate to `window`, or pad by continuing time at the mean spacing and
/// holding the last voltage
fn fit_to_window(time: &mut Vec<f64>, voltage: &mut Vec<f64>, window: usize) {
    if time.len() >= window {
        time.truncate(window);
        voltage.truncate(window);
        return;
    }
    let len = time.len();
    let first = time[0];
    let last = time[len - 1];
    let step = if len > 1 {
        (last - first) / (len - 1) as f64
    } else {
        0.0
    };
    let hold = voltage[len - 1];
    for k in 1..=(window - len) {
        time.push(last + step * k as f64);
        voltage.push(hold);
    }
}
