use std::fs;
use std::io::{BufReader, Stdin, Stdout};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

use spe_pipeline::aggregate::write_histogram_data;
use spe_pipeline::analysis::adjudicator::{
    AdjudicationRequest, Adjudicator, ConsoleAdjudicator, ScriptedAdjudicator,
};
use spe_pipeline::analysis::classifier::ClassificationDecision;
use spe_pipeline::calibration::ShapingCalibration;
use spe_pipeline::error::AdjudicationError;
use spe_pipeline::fixtures::{acquisition_info, SampleClock, SyntheticBatch};
use spe_pipeline::pipeline::{histogram_columns, CacheSummary, ShapeSummary};
use spe_pipeline::waveform::write_waveform;
use spe_pipeline::{BatchPipeline, DirectoryStore, IdRange, PipelineConfig, WaveformId};

const CALIBRATION_FILE: &str = "shaping_calibration.json";
const TEMPLATE_FILE: &str = "average_waveform.txt";
const HISTOGRAM_DIR: &str = "hist_data";

#[derive(Parser, Debug)]
#[command(
    name = "spe_cli",
    about = "Single-photoelectron waveform pipeline over a directory store"
)]
struct Cli {
    /// Store root holding info.txt and the partition directories
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    /// Pipeline configuration (JSON); defaults when missing or invalid
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// First waveform id (inclusive)
    #[arg(long, global = true, default_value_t = 0)]
    start: WaveformId,
    /// Last waveform id (exclusive)
    #[arg(long, global = true)]
    end: Option<WaveformId>,
    /// How waveforms the classifier cannot decide are resolved
    #[arg(long, global = true, value_enum, default_value_t = Undecided::Ask)]
    undecided: Undecided,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write synthetic raw waveforms and an info file
    Synth(SynthArgs),
    /// Sort raw waveforms into accepted / rejected / set aside
    Classify,
    /// Write aligned copies of accepted waveforms
    Align,
    /// Compute (or load) feature sets and print cache counts
    Extract,
    /// Calibrate the shaping filters and write the shaped stages
    Shape(ShapeArgs),
    /// Fit every feature histogram and print a JSON report
    Summarize(ReportArgs),
    /// Per-id lifecycle as JSON
    Status,
    /// Every stage in order
    Run(ReportArgs),
}

#[derive(Args, Debug, Clone)]
struct SynthArgs {
    #[arg(long, default_value_t = 20)]
    count: u32,
    #[arg(long, default_value_t = 7)]
    seed: u64,
    /// Gaussian noise standard deviation in volts
    #[arg(long, default_value_t = 1e-4)]
    noise: f64,
    /// Every n-th id is noise only (0 disables)
    #[arg(long, default_value_t = 7)]
    empty_every: u32,
    /// Every n-th id is a pulse too shallow to accept automatically (0 disables)
    #[arg(long, default_value_t = 0)]
    shallow_every: u32,
    /// Every n-th id carries a small afterpulse (0 disables)
    #[arg(long, default_value_t = 0)]
    afterpulse_every: u32,
}

#[derive(Args, Debug, Clone)]
struct ShapeArgs {
    /// Ignore a saved calibration and derive a new one
    #[arg(long)]
    recalibrate: bool,
}

#[derive(Args, Debug, Clone)]
struct ReportArgs {
    /// Also write the JSON report to this file
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Undecided {
    /// Prompt on the terminal
    Ask,
    Accept,
    Reject,
    /// Leave in the set-aside partition
    SetAside,
}

/// Adjudicator picked on the command line
enum CliAdjudicator {
    Console(ConsoleAdjudicator<BufReader<Stdin>, Stdout>),
    Scripted(ScriptedAdjudicator),
}

impl From<Undecided> for CliAdjudicator {
    fn from(mode: Undecided) -> Self {
        let scripted = |d| CliAdjudicator::Scripted(ScriptedAdjudicator::new(d));
        match mode {
            Undecided::Ask => CliAdjudicator::Console(ConsoleAdjudicator::stdio()),
            Undecided::Accept => scripted(ClassificationDecision::Accept),
            Undecided::Reject => scripted(ClassificationDecision::Reject),
            Undecided::SetAside => scripted(ClassificationDecision::Uncertain),
        }
    }
}

impl Adjudicator for CliAdjudicator {
    type Handle = WaveformId;

    fn render(&mut self, request: &AdjudicationRequest<'_>) -> Result<WaveformId, AdjudicationError> {
        match self {
            CliAdjudicator::Console(console) => console.render(request),
            CliAdjudicator::Scripted(scripted) => scripted.render(request),
        }
    }

    fn await_decision(
        &mut self,
        handle: WaveformId,
    ) -> Result<ClassificationDecision, AdjudicationError> {
        match self {
            CliAdjudicator::Console(console) => console.await_decision(handle),
            CliAdjudicator::Scripted(scripted) => scripted.await_decision(handle),
        }
    }
}

fn main() -> ExitCode {
    spe_pipeline::init_logging();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => PipelineConfig::load_from_file(path),
        None => PipelineConfig::default(),
    };
    let range = IdRange::new(cli.start, cli.end.unwrap_or(WaveformId::MAX));
    let store = Arc::new(DirectoryStore::new(&cli.root, config.store.header_lines));
    let open = || open_pipeline(config.clone(), &store, cli.undecided);

    match &cli.command {
        Command::Synth(args) => run_synth(&store, args, cli.start)?,
        Command::Classify => print_json(&open()?.classify(range).context("classifying")?)?,
        Command::Align => print_json(&open()?.align(range).context("aligning")?)?,
        Command::Extract => {
            let (summary, _) = open()?.extract(range).context("extracting features")?;
            print_json(&summary)?;
        }
        Command::Shape(args) => run_shape(&open()?, &store, range, args)?,
        Command::Summarize(args) => run_summarize(&open()?, &store, range, args)?,
        Command::Status => print_json(&open()?.status(range).context("reading status")?)?,
        Command::Run(args) => {
            let report = open()?.run(range).context("running the pipeline")?;
            if let Some(calibration) = &report.calibration {
                save_calibration(&store, calibration)?;
            }
            emit_report(&report, args.output.as_deref())?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn open_pipeline(
    config: PipelineConfig,
    store: &Arc<DirectoryStore>,
    undecided: Undecided,
) -> Result<BatchPipeline<CliAdjudicator>> {
    let info = store
        .load_info()
        .with_context(|| format!("reading acquisition info under {}", store.root().display()))?;
    BatchPipeline::new(
        config,
        store.clone(),
        &info,
        CliAdjudicator::from(undecided),
    )
    .context("setting up the pipeline")
}

fn run_synth(store: &DirectoryStore, args: &SynthArgs, first_id: WaveformId) -> Result<()> {
    store.ensure_layout().context("creating store layout")?;
    let batch = SyntheticBatch {
        count: args.count,
        seed: args.seed,
        noise_std: args.noise,
        empty_every: args.empty_every,
        shallow_every: args.shallow_every,
        afterpulse_every: args.afterpulse_every,
        ..SyntheticBatch::default()
    };
    let clock = SampleClock::default();
    store
        .save_info(&acquisition_info(&clock, batch.impedance))
        .context("writing info.txt")?;
    let ids = batch
        .write_to(store, &clock, first_id)
        .context("writing synthetic waveforms")?;

    #[derive(Serialize)]
    struct SynthReport {
        written: usize,
        first_id: WaveformId,
        root: PathBuf,
    }
    print_json(&SynthReport {
        written: ids.len(),
        first_id,
        root: store.root().to_path_buf(),
    })
}

fn run_shape(
    pipeline: &BatchPipeline<CliAdjudicator>,
    store: &DirectoryStore,
    range: IdRange,
    args: &ShapeArgs,
) -> Result<()> {
    let saved = store.root().join(CALIBRATION_FILE);
    let calibration = if saved.exists() && !args.recalibrate {
        ShapingCalibration::load_from_file(&saved)
            .with_context(|| format!("loading {}", saved.display()))?
    } else {
        let template = pipeline
            .build_template(range)
            .context("building the average template")?;
        let record = template.to_record()?;
        let path = store.root().join(TEMPLATE_FILE);
        fs::write(&path, write_waveform(&record))
            .with_context(|| format!("writing {}", path.display()))?;

        let calibration = pipeline
            .calibrate(&template)
            .context("calibrating the shaping filters")?;
        save_calibration(store, &calibration)?;
        calibration
    };

    let shaped = pipeline
        .shape(range, &calibration)
        .context("shaping waveforms")?;
    let (measured, _) = pipeline
        .measure_shaping(range)
        .context("measuring shaped waveforms")?;

    #[derive(Serialize)]
    struct ShapeReport<'a> {
        calibration: &'a ShapingCalibration,
        shaped: ShapeSummary,
        measured: CacheSummary,
    }
    print_json(&ShapeReport {
        calibration: &calibration,
        shaped,
        measured,
    })
}

fn run_summarize(
    pipeline: &BatchPipeline<CliAdjudicator>,
    store: &DirectoryStore,
    range: IdRange,
    args: &ReportArgs,
) -> Result<()> {
    let (_, features) = pipeline.extract(range).context("loading features")?;
    let (_, profiles) = pipeline
        .measure_shaping(range)
        .context("loading shaping profiles")?;
    let profiles = (!profiles.is_empty()).then_some(profiles);

    let hist_dir = store.root().join(HISTOGRAM_DIR);
    for (name, values) in histogram_columns(&features, profiles.as_ref()) {
        let path = hist_dir.join(format!("{name}.txt"));
        write_histogram_data(&values, &path)
            .with_context(|| format!("writing {}", path.display()))?;
    }

    let summary = pipeline.summarize(&features, profiles.as_ref());
    emit_report(&summary, args.output.as_deref())
}

fn save_calibration(store: &DirectoryStore, calibration: &ShapingCalibration) -> Result<()> {
    let path = store.root().join(CALIBRATION_FILE);
    calibration
        .save_to_file(&path)
        .with_context(|| format!("writing {}", path.display()))
}

fn emit_report<T: Serialize>(report: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    if let Some(path) = output {
        fs::write(path, &json).with_context(|| format!("writing {}", path.display()))?;
    }
    println!("{json}");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
