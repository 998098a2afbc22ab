//! Synthetic waveform generators.
//!
//! Deterministic pulse shapes and seeded batches used by the unit tests,
//! the integration tests and the `spe_cli synth` command. Every generator is
//! driven by an explicit seed so repeated runs produce identical stores.

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, WaveformError};
use crate::store::{Partition, WaveformStore};
use crate::waveform::{AcquisitionInfo, WaveformId, WaveformRecord};

/// Header written in front of every synthetic waveform file.
pub const DEFAULT_HEADER: &str = "LECROYWR8208HD,00000,Waveform\n\
Segments,1,SegmentSize,2002\n\
Segment,TrigTime,TimeSinceSegment1\n\
#1,19-Oct-2026 12:00:00,0\n\
Time,Ampl\n";

/// Sampling grid shared by every generated record.
///
/// Sample `i` sits at `(i - trigger_index) / sample_rate`, so the trigger
/// lands on t = 0.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleClock {
    pub sample_rate: f64,
    pub samples: usize,
    pub trigger_index: usize,
}

impl Default for SampleClock {
    fn default() -> Self {
        Self {
            sample_rate: 2e10,
            samples: 2002,
            trigger_index: 870,
        }
    }
}

impl SampleClock {
    pub fn times(&self) -> Vec<f64> {
        (0..self.samples)
            .map(|i| (i as f64 - self.trigger_index as f64) / self.sample_rate)
            .collect()
    }

    /// Constant trace at `level`.
    pub fn flat(&self, level: f64) -> Result<WaveformRecord, WaveformError> {
        let time = self.times();
        let voltage = vec![level; time.len()];
        WaveformRecord::new(time, voltage, DEFAULT_HEADER.as_bytes().to_vec())
    }

    /// Sum of several pulses; their baselines add up.
    pub fn superpose(&self, pulses: &[PulseShape]) -> Result<WaveformRecord, WaveformError> {
        let time = self.times();
        let voltage = time
            .iter()
            .map(|&t| pulses.iter().map(|p| p.voltage_at(t)).sum())
            .collect();
        WaveformRecord::new(time, voltage, DEFAULT_HEADER.as_bytes().to_vec())
    }
}

/// Negative-going pulse built from two half-Gaussians.
#[derive(Debug, Clone, PartialEq)]
pub struct PulseShape {
    /// Depth below baseline in volts (positive number).
    pub amplitude: f64,
    /// Time of the minimum in seconds.
    pub center: f64,
    pub rise_sigma: f64,
    pub fall_sigma: f64,
    pub baseline: f64,
}

impl Default for PulseShape {
    fn default() -> Self {
        Self {
            amplitude: 0.01,
            center: 0.0,
            rise_sigma: 1.5e-9,
            fall_sigma: 1.5e-9,
            baseline: 0.0,
        }
    }
}

impl PulseShape {
    pub fn voltage_at(&self, t: f64) -> f64 {
        let sigma = if t < self.center {
            self.rise_sigma
        } else {
            self.fall_sigma
        };
        let z = (t - self.center) / sigma;
        self.baseline - self.amplitude * (-0.5 * z * z).exp()
    }

    pub fn record(&self, clock: &SampleClock) -> Result<WaveformRecord, WaveformError> {
        clock.superpose(std::slice::from_ref(self))
    }

    /// Same pulse shifted to `center` with a different depth.
    pub fn echo(&self, amplitude: f64, center: f64) -> Self {
        Self {
            amplitude,
            center,
            baseline: 0.0,
            ..self.clone()
        }
    }
}

/// Draw `n` values from N(mean, std_dev) with a seeded generator.
pub fn normal_samples(mean: f64, std_dev: f64, n: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| mean + std_dev * standard_normal(&mut rng)).collect()
}

// Box-Muller; the first uniform is kept away from zero.
fn standard_normal<R: Rng>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Acquisition metadata matching [`SampleClock`].
pub fn acquisition_info(clock: &SampleClock, impedance: f64) -> AcquisitionInfo {
    let mut info = AcquisitionInfo::with_acquisition(clock.sample_rate, impedance);
    info.set("Source", "synthetic");
    info.set("Samples per waveform", &clock.samples.to_string());
    info
}

/// Kind of trace produced for one synthetic id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyntheticKind {
    /// Single photoelectron pulse.
    Single,
    /// Noise only.
    Empty,
    /// Pulse too shallow for an automatic decision.
    Shallow,
    /// Large pulse followed by a small afterpulse.
    Afterpulse,
}

/// Seeded batch of synthetic raw waveforms.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticBatch {
    pub count: u32,
    pub seed: u64,
    pub noise_std: f64,
    pub amplitude_mean: f64,
    pub amplitude_spread: f64,
    /// Every `empty_every`-th id is a noise-only trace (0 disables).
    pub empty_every: u32,
    /// Every `shallow_every`-th id is a shallow pulse (0 disables).
    pub shallow_every: u32,
    /// Every `afterpulse_every`-th id carries a secondary pulse (0 disables).
    pub afterpulse_every: u32,
    pub impedance: f64,
}

impl Default for SyntheticBatch {
    fn default() -> Self {
        Self {
            count: 20,
            seed: 7,
            noise_std: 1e-4,
            amplitude_mean: 0.01,
            amplitude_spread: 0.001,
            empty_every: 7,
            shallow_every: 0,
            afterpulse_every: 0,
            impedance: 50.0,
        }
    }
}

impl SyntheticBatch {
    pub fn kind(&self, id: WaveformId) -> SyntheticKind {
        let hits = |every: u32| every > 0 && id % every == every - 1;
        if hits(self.empty_every) {
            SyntheticKind::Empty
        } else if hits(self.shallow_every) {
            SyntheticKind::Shallow
        } else if hits(self.afterpulse_every) {
            SyntheticKind::Afterpulse
        } else {
            SyntheticKind::Single
        }
    }

    /// Trace for one id; the same id always yields the same samples.
    pub fn generate(
        &self,
        clock: &SampleClock,
        id: WaveformId,
    ) -> Result<WaveformRecord, WaveformError> {
        let mut rng = StdRng::seed_from_u64(self.seed ^ (u64::from(id) << 20));
        let amplitude = self.amplitude_mean + self.amplitude_spread * standard_normal(&mut rng);
        let jitter = rng.gen_range(-0.1e-9..0.1e-9);
        let base = PulseShape {
            amplitude,
            center: jitter,
            ..PulseShape::default()
        };

        let pulses = match self.kind(id) {
            SyntheticKind::Single => vec![base],
            SyntheticKind::Empty => Vec::new(),
            SyntheticKind::Shallow => vec![base.echo(0.0015, jitter)],
            SyntheticKind::Afterpulse => vec![base.clone(), base.echo(0.002, jitter + 15e-9)],
        };

        let clean = clock.superpose(&pulses)?;
        let noisy = clean
            .voltage()
            .iter()
            .map(|v| v + self.noise_std * standard_normal(&mut rng))
            .collect();
        clean.with_voltage(noisy)
    }

    /// Write `count` raw waveforms starting at `first_id` plus `info.txt`.
    pub fn write_to(
        &self,
        store: &dyn WaveformStore,
        clock: &SampleClock,
        first_id: WaveformId,
    ) -> Result<Vec<WaveformId>, PipelineError> {
        let mut written = Vec::with_capacity(self.count as usize);
        for id in first_id..first_id + self.count {
            let record = self.generate(clock, id)?;
            store.put(Partition::Raw, id, &record)?;
            written.push(id);
        }
        tracing::info!(
            "[Synth] wrote {} raw waveforms starting at {}",
            written.len(),
            first_id
        );
        Ok(written)
    }
}
