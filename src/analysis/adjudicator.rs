// Adjudicator - external decision for waveforms the classifier cannot settle
//
// The classifier hands an Uncertain waveform to an Adjudicator in two steps:
// render() shows the raw and filtered traces and returns a handle, then
// await_decision() blocks until a verdict is available. The pipeline holds
// the adjudicator behind a Mutex for the whole exchange.
//
// Implementations:
// - ScriptedAdjudicator: canned answers (tests, non-interactive CLI runs)
// - ConsoleAdjudicator: text plot plus a y/n/u prompt

use std::collections::HashMap;
use std::io::{self, BufRead, Write};

use crate::analysis::classifier::{Classification, ClassificationDecision};
use crate::error::AdjudicationError;
use crate::waveform::{WaveformId, WaveformRecord};

/// Everything an adjudicator gets to look at
#[derive(Debug, Clone, Copy)]
pub struct AdjudicationRequest<'a> {
    pub id: WaveformId,
    pub raw: &'a WaveformRecord,
    pub classification: &'a Classification,
}

pub trait Adjudicator: Send {
    /// Token tying a rendered request to its decision
    type Handle;

    fn render(&mut self, request: &AdjudicationRequest<'_>)
        -> Result<Self::Handle, AdjudicationError>;

    /// Block until a decision for `handle` is available
    fn await_decision(
        &mut self,
        handle: Self::Handle,
    ) -> Result<ClassificationDecision, AdjudicationError>;
}

/// Answers from a lookup table with a fallback
#[derive(Debug, Clone)]
pub struct ScriptedAdjudicator {
    fallback: ClassificationDecision,
    decisions: HashMap<WaveformId, ClassificationDecision>,
    rendered: Vec<WaveformId>,
}

impl ScriptedAdjudicator {
    pub fn new(fallback: ClassificationDecision) -> Self {
        Self {
            fallback,
            decisions: HashMap::new(),
            rendered: Vec::new(),
        }
    }

    pub fn with_decision(mut self, id: WaveformId, decision: ClassificationDecision) -> Self {
        self.decisions.insert(id, decision);
        self
    }

    /// Ids shown so far, in order
    pub fn rendered(&self) -> &[WaveformId] {
        &self.rendered
    }
}

impl Adjudicator for ScriptedAdjudicator {
    type Handle = WaveformId;

    fn render(&mut self, request: &AdjudicationRequest<'_>) -> Result<WaveformId, AdjudicationError> {
        self.rendered.push(request.id);
        Ok(request.id)
    }

    fn await_decision(&mut self, id: WaveformId) -> Result<ClassificationDecision, AdjudicationError> {
        Ok(self.decisions.get(&id).copied().unwrap_or(self.fallback))
    }
}

const PLOT_COLUMNS: usize = 72;
const PLOT_ROWS: usize = 12;

/// Interactive prompt on a text stream
pub struct ConsoleAdjudicator<R, W> {
    input: R,
    output: W,
}

impl ConsoleAdjudicator<io::BufReader<io::Stdin>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::BufReader::new(io::stdin()), io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsoleAdjudicator<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

impl<R: BufRead + Send, W: Write + Send> Adjudicator for ConsoleAdjudicator<R, W> {
    type Handle = WaveformId;

    fn render(&mut self, request: &AdjudicationRequest<'_>) -> Result<WaveformId, AdjudicationError> {
        let c = request.classification;
        writeln!(self.output, "waveform {:05}", request.id)?;
        writeln!(
            self.output,
            "  raw minimum {:.6} V, baseline {:.6} V, window minimum {:.6} V",
            request.raw.min_voltage(),
            c.baseline,
            c.window_minimum
        )?;
        let heights: Vec<String> = c.peaks.iter().map(|p| format!("{:.4}", p.height)).collect();
        writeln!(
            self.output,
            "  {} peak(s) at heights [{}]",
            c.peaks.len(),
            heights.join(", ")
        )?;
        for line in plot(c.filtered.voltage(), PLOT_COLUMNS, PLOT_ROWS) {
            writeln!(self.output, "  |{line}")?;
        }
        self.output.flush()?;
        Ok(request.id)
    }

    fn await_decision(&mut self, id: WaveformId) -> Result<ClassificationDecision, AdjudicationError> {
        loop {
            write!(self.output, "is {id:05} a single photoelectron? [y/n/u] ")?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Err(AdjudicationError::Closed);
            }
            match line.trim() {
                "y" => return Ok(ClassificationDecision::Accept),
                "n" => return Ok(ClassificationDecision::Reject),
                "u" => return Ok(ClassificationDecision::Uncertain),
                other => writeln!(self.output, "unrecognized answer {other:?}")?,
            }
        }
    }
}

/// Column-wise minimum of `values` drawn as a coarse character plot
fn plot(values: &[f64], columns: usize, rows: usize) -> Vec<String> {
    if values.is_empty() || columns == 0 || rows == 0 {
        return Vec::new();
    }
    let per_column = values.len().div_ceil(columns);
    let lows: Vec<f64> = values
        .chunks(per_column)
        .map(|chunk| chunk.iter().copied().fold(f64::INFINITY, f64::min))
        .collect();
    let top = lows.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let bottom = lows.iter().copied().fold(f64::INFINITY, f64::min);
    let span = (top - bottom).max(f64::MIN_POSITIVE);

    (0..rows)
        .map(|row| {
            lows.iter()
                .map(|&v| {
                    let depth = ((top - v) / span * (rows - 1) as f64).round() as usize;
                    if depth == row {
                        '*'
                    } else {
                        ' '
                    }
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::classifier::Classifier;
    use crate::config::ClassifierConfig;
    use crate::fixtures::{PulseShape, SampleClock};

    fn uncertain_request_parts() -> (WaveformRecord, Classification) {
        let clock = SampleClock::default();
        let raw = PulseShape {
            amplitude: 0.0015,
            ..PulseShape::default()
        }
        .record(&clock)
        .unwrap();
        let classification = Classifier::new(&ClassifierConfig::default(), clock.sample_rate)
            .classify(&raw)
            .unwrap();
        (raw, classification)
    }

    #[test]
    fn test_scripted_answers() {
        let (raw, classification) = uncertain_request_parts();
        let mut adjudicator = ScriptedAdjudicator::new(ClassificationDecision::Reject)
            .with_decision(4, ClassificationDecision::Accept);

        for (id, expected) in [
            (4, ClassificationDecision::Accept),
            (5, ClassificationDecision::Reject),
        ] {
            let request = AdjudicationRequest {
                id,
                raw: &raw,
                classification: &classification,
            };
            let handle = adjudicator.render(&request).unwrap();
            assert_eq!(adjudicator.await_decision(handle).unwrap(), expected);
        }
        assert_eq!(adjudicator.rendered(), &[4, 5]);
    }

    #[test]
    fn test_console_reprompts_until_valid() {
        let (raw, classification) = uncertain_request_parts();
        let input = io::Cursor::new(b"maybe\nu\n".to_vec());
        let mut console = ConsoleAdjudicator::new(input, Vec::new());
        let request = AdjudicationRequest {
            id: 12,
            raw: &raw,
            classification: &classification,
        };

        let handle = console.render(&request).unwrap();
        let decision = console.await_decision(handle).unwrap();
        assert_eq!(decision, ClassificationDecision::Uncertain);

        let text = String::from_utf8(console.into_output()).unwrap();
        assert!(text.contains("waveform 00012"));
        assert!(text.contains("unrecognized answer \"maybe\""));
        assert!(text.contains('*'));
    }

    #[test]
    fn test_console_closed_input() {
        let mut console = ConsoleAdjudicator::new(io::Cursor::new(Vec::new()), Vec::new());
        assert!(matches!(
            console.await_decision(1),
            Err(AdjudicationError::Closed)
        ));
    }

    #[test]
    fn test_plot_marks_every_column() {
        let lines = plot(&[0.0, -1.0, 0.0, -0.5], 4, 3);
        assert_eq!(lines.len(), 3);
        let stars: usize = lines.iter().map(|l| l.matches('*').count()).sum();
        assert_eq!(stars, 4);
        assert_eq!(lines[2], " *  ");
    }
}
