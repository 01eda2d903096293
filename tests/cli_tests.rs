use regex::Regex;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

struct TestContext {
    dir: TempDir,
}

impl TestContext {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("Failed to create temp dir"),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write_coords(&self) -> PathBuf {
        let path = self.path("coords.csv");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "x,y").unwrap();
        writeln!(file, "0,0").unwrap();
        writeln!(file, "1,0").unwrap();
        writeln!(file, "0,1").unwrap();
        path
    }
}

fn archipelago(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_archipelago"))
        .args(args)
        .output()
        .expect("Failed to execute binary")
}

const QUICK_RUN: &[&str] = &[
    "run",
    "--time",
    "30",
    "--trials",
    "20",
    "--slices",
    "3",
    "--islands",
    "3",
    "--population",
    "4",
    "--generations",
    "100",
    "--threads",
    "2",
    "--seed",
    "1",
];

#[test]
fn test_cli_run_prints_report() {
    let output = archipelago(QUICK_RUN);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stdout: {}", stdout);

    let state = Regex::new(r"State: joined \| trials (\d+)").unwrap();
    let caps = state.captures(&stdout).expect("status line missing");
    let trials: u64 = caps[1].parse().unwrap();
    assert!(trials >= 20);

    // One row per incumbent slice.
    let row = Regex::new(r"(?m)^\|\s*(0\.1000|0\.5500|1\.0000)\s*\|").unwrap();
    assert_eq!(row.find_iter(&stdout).count(), 3, "stdout: {}", stdout);
}

#[test]
fn test_cli_run_writes_json_snapshot() {
    let ctx = TestContext::new();
    let json = ctx.path("snapshot.json");
    let coords = ctx.write_coords();

    let mut args = QUICK_RUN.to_vec();
    args.extend_from_slice(&[
        "--coords",
        coords.to_str().unwrap(),
        "--topology",
        "nearest",
        "--json",
        json.to_str().unwrap(),
    ]);
    let output = archipelago(&args);
    assert!(output.status.success());

    let snapshot: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
    assert_eq!(snapshot["slices"], 3);
    assert_eq!(snapshot["islands"], 3);
    assert!(snapshot["counters"]["trials"].as_u64().unwrap() >= 20);
}

#[test]
fn test_cli_run_rejects_single_island() {
    let output = archipelago(&["run", "--islands", "1", "--time", "1"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Configuration Error in 'islands'"), "{}", stderr);
}

#[test]
fn test_cli_probe_prints_postfix_and_range() {
    let output = archipelago(&["probe", "x - X", "--lower", "0", "--upper", "1"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("Postfix: x X -"));

    let max = Regex::new(r"max\s*\|\s*1\.000000").unwrap();
    assert!(max.is_match(&stdout), "{}", stdout);
    assert!(stdout.contains("does not depend on n"));
}

#[test]
fn test_cli_probe_reports_parse_position() {
    let output = archipelago(&["probe", "x * (X + 1"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        Regex::new(r"position \d+").unwrap().is_match(&stderr),
        "{}",
        stderr
    );
}
