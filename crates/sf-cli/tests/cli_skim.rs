use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use sf_frame::{Column, EventTable};

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_skimflow"))
}

fn run(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run {:?} {:?}: {}", bin_path(), args, e))
}

fn write_input(dir: &Path, name: &str, n: usize) -> PathBuf {
    let table = EventTable::from_columns([
        ("HLT_A", Column::bools((0..n).map(|i| i % 2 == 0))),
        ("Flag_goodVertices", Column::bools((0..n).map(|_| true))),
        ("MET_pt", Column::floats((0..n).map(|i| i as f64))),
        ("nMuon", Column::ints((0..n).map(|i| (i % 3) as i64))),
    ])
    .unwrap();
    let path = dir.join(name);
    sf_io::write_event_table(&table, "Events", &path).unwrap();
    path
}

fn write_config(dir: &Path, files: &[PathBuf], output: &Path) -> PathBuf {
    let files: Vec<String> = files.iter().map(|f| format!("\"{}\"", f.display())).collect();
    let yaml = format!(
        "files: [{}]\noutput: \"{}\"\nthreads: 1\nobjects: []\n\
         triggers: [HLT_A]\nmet_filters: [Flag_goodVertices]\n\
         branches_to_save: [MET_pt, nMuon]\nmonitor: {{columns: [nMuon]}}\n",
        files.join(", "),
        output.display()
    );
    let path = dir.join("skim.yaml");
    std::fs::write(&path, yaml).unwrap();
    path
}

#[test]
fn version_smoke() {
    let out = run(&["version"]);
    assert!(out.status.success(), "version should succeed");
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("skimflow "), "unexpected stdout: {}", stdout);
}

#[test]
fn skim_prints_verification_report_and_summary() {
    let dir = tempfile::tempdir().unwrap();
    let inputs =
        vec![write_input(dir.path(), "a.parquet", 10), write_input(dir.path(), "b.parquet", 6)];
    let output = dir.path().join("skim.parquet");
    let config = write_config(dir.path(), &inputs, &output);
    let summary = dir.path().join("summary.json");

    let out = run(&[
        "skim",
        "--config",
        config.to_str().unwrap(),
        "--summary-json",
        summary.to_str().unwrap(),
    ]);
    assert!(out.status.success(), "skim should succeed, stderr={}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("PROCESSING VERIFICATION REPORT"), "stdout={stdout}");
    assert!(stdout.contains(&format!("{:30} | Events: 16", "Total Input Events")), "stdout={stdout}");
    assert!(stdout.contains(&format!("{:30} | Events: 8", "Combined MET Cut")), "stdout={stdout}");
    assert!(stdout.contains("Files Requested : 2"), "stdout={stdout}");
    assert!(stdout.contains("[SUCCESS]"), "stdout={stdout}");
    assert!(output.exists());

    let v: serde_json::Value = serde_json::from_slice(&std::fs::read(&summary).unwrap()).unwrap();
    assert_eq!(v["files"].as_array().unwrap().len(), 2);
    assert_eq!(v["artifact"]["n_events"].as_u64(), Some(8));
    assert_eq!(v["artifact"]["columns"], serde_json::json!(["MET_pt", "nMuon"]));
}

#[test]
fn cli_flags_override_config() {
    let dir = tempfile::tempdir().unwrap();
    let inputs =
        vec![write_input(dir.path(), "a.parquet", 10), write_input(dir.path(), "b.parquet", 6)];
    let config = write_config(dir.path(), &inputs, &dir.path().join("ignored.parquet"));
    let output = dir.path().join("first_file_only.parquet");

    let out = run(&[
        "skim",
        "--config",
        config.to_str().unwrap(),
        "--output",
        output.to_str().unwrap(),
        "--max-files",
        "1",
        "--threads",
        "2",
    ]);
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));
    assert!(output.exists());
    assert!(!dir.path().join("ignored.parquet").exists());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("Events Processed: 10"), "stdout={stdout}");
}

#[test]
fn skim_with_unknown_branch_fails_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = vec![write_input(dir.path(), "a.parquet", 4)];
    let output = dir.path().join("skim.parquet");
    let config = write_config(dir.path(), &inputs, &output);
    let yaml = std::fs::read_to_string(&config).unwrap().replace("[MET_pt, nMuon]", "[MET_pt, Foo_bar]");
    std::fs::write(&config, yaml).unwrap();

    let out = run(&["skim", "--config", config.to_str().unwrap()]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Foo_bar"), "stderr={stderr}");
    assert!(stderr.contains("skim rejected before reading any event"), "stderr={stderr}");
    assert!(!String::from_utf8_lossy(&out.stdout).contains("VERIFICATION REPORT"));
    assert!(!output.exists());
}

#[test]
fn files_lists_resolved_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let inputs: Vec<PathBuf> =
        (0..3).map(|i| write_input(dir.path(), &format!("f{i}.parquet"), 2)).collect();
    let config = write_config(dir.path(), &inputs, &dir.path().join("out.parquet"));

    let out = run(&["files", "--config", config.to_str().unwrap(), "--max-files", "2"]);
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, vec![inputs[0].to_str().unwrap(), inputs[1].to_str().unwrap()]);
}

#[test]
fn inspect_reads_back_control_plots() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = vec![write_input(dir.path(), "a.parquet", 10)];
    let output = dir.path().join("skim.parquet");
    let config = write_config(dir.path(), &inputs, &output);
    let out = run(&["skim", "--config", config.to_str().unwrap()]);
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));

    let text = run(&["inspect", output.to_str().unwrap()]);
    assert!(text.status.success());
    let stdout = String::from_utf8_lossy(&text.stdout);
    assert!(stdout.contains("Combined Trigger Cut"), "stdout={stdout}");
    assert!(stdout.contains("nMuon_AfterMETFilters"), "stdout={stdout}");
    assert!(stdout.contains("eff=100.00 % cumulative eff=50.00 %"), "stdout={stdout}");

    let json = run(&["inspect", output.to_str().unwrap(), "--json"]);
    assert!(json.status.success());
    let v: serde_json::Value = serde_json::from_slice(&json.stdout).unwrap();
    assert_eq!(v["n_events"].as_u64(), Some(5));
    assert_eq!(v["control_plots"]["namespace"], "ControlPlots");
    assert_eq!(v["control_plots"]["cutflow"]["bin_content"], serde_json::json!([10, 5, 5]));
    assert_eq!(v["control_plots"]["histograms"].as_array().unwrap().len(), 3);
}

#[test]
fn missing_config_is_an_error() {
    let out = run(&["skim", "--config", "/nonexistent/skim.yaml"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("failed to load config"));
}
