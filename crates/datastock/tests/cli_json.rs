use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn datastock_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_datastock"))
}

fn run_cli(home: &Path, args: &[String]) -> Output {
    Command::new(datastock_bin())
        .args(args)
        .env("DATASTOCK_HOME", home)
        .output()
        .expect("failed to execute datastock CLI")
}

fn parse_json_output(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim()).unwrap_or_else(|err| {
        panic!(
            "failed to parse JSON output: {}\nstdout:\n{}\nstderr:\n{}",
            err,
            stdout,
            String::from_utf8_lossy(&output.stderr)
        )
    })
}

#[derive(Debug, Deserialize)]
struct ScanFile {
    path: String,
    size: u64,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScanOutput {
    files: Vec<ScanFile>,
    dated: usize,
    proto: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PartitionRow {
    name: String,
    files: usize,
}

fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_check_json() {
    let home = TempDir::new().unwrap();
    let output = run_cli(
        home.path(),
        &args(&["check", "/data/radar/**/KFTG_#yyyyMMdd_HHmm#.nc", "--json"]),
    );
    assert!(output.status.success());
    let value = parse_json_output(&output);
    assert_eq!(value["root_dir"], "/data/radar");
    assert_eq!(value["recurse"], true);
    assert_eq!(value["date_template"], "KFTG_#yyyyMMdd_HHmm#.nc");
}

#[test]
fn test_check_invalid_spec_json_error() {
    let home = TempDir::new().unwrap();
    let output = run_cli(home.path(), &args(&["check", "/data/a#b#c#d", "--json"]));
    assert!(!output.status.success());
    // the report is printed before the error object
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"error\""));
}

#[test]
fn test_scan_json_lists_dated_files() {
    let home = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    for name in ["obs_20230602.nc", "obs_20230601.nc", "obs_20230603.nc"] {
        fs::write(data.path().join(name), b"abcd").unwrap();
    }
    fs::write(data.path().join("readme.txt"), b"skip").unwrap();

    let spec = format!("{}/obs_#yyyyMMdd#.nc", data.path().display());
    let output = run_cli(home.path(), &["scan".to_string(), spec, "--json".to_string()]);
    assert!(
        output.status.success(),
        "stderr:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let result: ScanOutput = serde_json::from_value(parse_json_output(&output)).unwrap();

    assert_eq!(result.files.len(), 3);
    assert_eq!(result.dated, 3);
    assert!(result.files[0].path.ends_with("obs_20230601.nc"));
    assert!(result.files.iter().all(|f| f.size == 4 && f.date.is_some()));
    assert!(result.proto.unwrap().ends_with("obs_20230602.nc"));
}

#[test]
fn test_partition_json_daily() {
    let home = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    for name in ["obs_20230601_0600.nc", "obs_20230601_1800.nc", "obs_20230602_0000.nc"] {
        fs::write(data.path().join(name), b"x").unwrap();
    }

    let spec = format!("{}/obs_#yyyyMMdd_HHmm#.nc", data.path().display());
    let output = run_cli(home.path(), &["partition".to_string(), spec, "--json".to_string()]);
    assert!(output.status.success());
    let rows: Vec<PartitionRow> = serde_json::from_value(parse_json_output(&output)).unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].name, "partition-20230601");
    assert_eq!(rows[0].files, 2);
    assert_eq!(rows[1].name, "partition-20230602");
    assert_eq!(rows[1].files, 1);
}

#[test]
fn test_watch_once_with_config() {
    let home = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    fs::write(data.path().join("a.nc"), b"x").unwrap();
    fs::write(data.path().join("b.nc"), b"x").unwrap();

    let config_path = home.path().join("datastock.toml");
    fs::write(
        &config_path,
        format!(
            "poll_interval_secs = 1\n\n[[collections]]\nname = \"obs\"\nspec = '{}/.*\\.nc'\nrecheck_after = \"1 hour\"\n",
            data.path().display()
        ),
    )
    .unwrap();

    let output = run_cli(
        home.path(),
        &[
            "watch".to_string(),
            "--config".to_string(),
            config_path.display().to_string(),
            "--once".to_string(),
            "--json".to_string(),
        ],
    );
    assert!(
        output.status.success(),
        "stderr:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let value = parse_json_output(&output);
    assert_eq!(value[0]["name"], "obs");
    assert_eq!(value[0]["files"], 2);
}

#[test]
fn test_watch_missing_config() {
    let home = TempDir::new().unwrap();
    let output = run_cli(
        home.path(),
        &args(&["watch", "--config", "/nonexistent/datastock.toml", "--once", "--json"]),
    );
    assert!(!output.status.success());
    let value = parse_json_output(&output);
    assert!(value["error"].as_str().unwrap().contains("Config file not found"));
}
