// Analysis module - per-waveform signal processing
//
// Architecture:
// - classifier: filter, count peaks, decide Accept / Reject / Uncertain
// - adjudicator: external verdict for Uncertain waveforms
// - alignment: put the falling half-amplitude crossing at t = 0
// - features: timing and charge features of an aligned pulse
// - filter, peaks: DSP building blocks shared by the stages above

pub mod adjudicator;
pub mod alignment;
pub mod classifier;
pub mod features;
pub mod filter;
pub mod peaks;

pub use adjudicator::{AdjudicationRequest, Adjudicator, ConsoleAdjudicator, ScriptedAdjudicator};
pub use alignment::align;
pub use classifier::{Classification, ClassificationDecision, Classifier, SortOutcome};
pub use features::{FeatureExtractor, FeatureKind, FeatureSet};
