use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

fn cli(root: &Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_spe_cli"));
    command.arg("--root").arg(root);
    command
}

fn run_ok(command: &mut Command) -> Value {
    let output = command.output().expect("failed to run spe_cli");
    assert_success(&output);
    let stdout = String::from_utf8(output.stdout).expect("stdout UTF-8");
    serde_json::from_str(stdout.trim()).expect("JSON report on stdout")
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "CLI exited with {:?}: {}",
        output.status.code(),
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Store root with synthetic data and a config using a coarse resampling grid
fn synth_root(count: u32) -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    let json = run_ok(cli(dir.path()).args(["synth", "--count", &count.to_string()]));
    assert_eq!(json["written"], count);

    std::fs::write(
        dir.path().join("config.json"),
        r#"{ "extraction": { "resample_grid_size": 1000 } }"#,
    )
    .expect("config file");
    dir
}

fn with_config(dir: &TempDir) -> Command {
    let mut command = cli(dir.path());
    command.arg("--config").arg(dir.path().join("config.json"));
    command
}

#[test]
fn synth_writes_raw_partition_and_info() {
    let dir = synth_root(5);
    assert!(dir.path().join("info.txt").exists());
    assert!(dir.path().join("d0/C2--waveforms--00004.txt").exists());

    let info = std::fs::read_to_string(dir.path().join("info.txt")).unwrap();
    assert!(info.contains("Oscilloscope sample rate (Hz),"));
}

#[test]
fn classify_then_status_reports_partitions() {
    let dir = synth_root(8);
    let classify = run_ok(with_config(&dir).args(["classify", "--undecided", "reject"]));
    assert_eq!(classify["accepted"], 7);
    assert_eq!(classify["rejected"], 1);

    let status = run_ok(with_config(&dir).arg("status"));
    let entries = status.as_array().expect("status array");
    assert_eq!(entries.len(), 8);
    assert_eq!(entries[6]["partition"], "not_spe");
    assert_eq!(entries[0]["partition"], "d1_raw");
    assert_eq!(entries[0]["features"], "Pending");
}

#[test]
fn id_range_limits_processing() {
    let dir = synth_root(8);
    let classify = run_ok(
        with_config(&dir).args(["classify", "--undecided", "reject", "--start", "2", "--end", "4"]),
    );
    assert_eq!(classify["accepted"], 2);
    assert!(!dir.path().join("d1_raw/D1--waveforms--00005.txt").exists());
}

#[test]
fn run_writes_report_calibration_and_histograms() {
    let dir = synth_root(8);
    let report_path = dir.path().join("report.json");
    let report = run_ok(with_config(&dir).args([
        "run",
        "--undecided",
        "set-aside",
        "--output",
        report_path.to_str().unwrap(),
    ]));

    assert_eq!(report["classify"]["accepted"], 7);
    assert_eq!(report["extract"]["computed"], 7);
    assert!(report["calibration"]["stages"].is_array());
    assert!(dir.path().join("shaping_calibration.json").exists());
    assert!(report_path.exists());

    let summary = run_ok(with_config(&dir).arg("summarize"));
    assert_eq!(summary["waveforms"], 7);
    assert_eq!(summary["columns"].as_array().unwrap().len(), 21);
    let charge = std::fs::read_to_string(dir.path().join("hist_data/charge.txt")).unwrap();
    assert_eq!(charge.lines().count(), 7);
}

#[test]
fn shape_reuses_saved_calibration() {
    let dir = synth_root(6);
    run_ok(with_config(&dir).args(["classify", "--undecided", "reject"]));
    run_ok(with_config(&dir).arg("align"));

    let first = run_ok(with_config(&dir).arg("shape"));
    assert!(dir.path().join("average_waveform.txt").exists());
    assert_eq!(first["shaped"]["stages_written"], 6 * 4);

    let second = run_ok(with_config(&dir).arg("shape"));
    assert_eq!(second["calibration"], first["calibration"]);
    assert_eq!(second["shaped"]["stages_written"], 0);
}

#[test]
fn missing_info_fails_with_exit_code_one() {
    let dir = TempDir::new().unwrap();
    let output = cli(dir.path()).arg("classify").output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("reading acquisition info"), "{stderr}");
}
