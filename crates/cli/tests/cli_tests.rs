// Integration tests for the crossmatch binary: exit codes and the --json contract.
// Run with: cargo test -p crossmatch-cli --test cli_tests -- --nocapture

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn crossmatch() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_crossmatch"));
    cmd.current_dir(env!("CARGO_MANIFEST_DIR"));
    cmd.env_remove("RUST_LOG");
    cmd
}

fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../recon/tests/fixtures")
}

fn fixture_config() -> PathBuf {
    fixtures_dir().join("ga4-salesforce.recon.toml")
}

fn run(args: &[&str]) -> Output {
    crossmatch().args(args).output().expect("spawn crossmatch")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Assert stdout is a single, parseable JSON value.
fn assert_single_json(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let trimmed = stdout.trim();
    assert!(!trimmed.is_empty(), "stdout should not be empty");
    serde_json::from_str(trimmed).unwrap_or_else(|e| {
        panic!("stdout must be valid JSON.\nParse error: {e}\nstdout:\n{trimmed}")
    })
}

/// Write a config next to copies of the fixture CSVs.
fn temp_recon(config: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    for name in ["ga4_events.csv", "salesforce_opportunities.csv"] {
        std::fs::copy(fixtures_dir().join(name), dir.path().join(name)).unwrap();
    }
    let path = dir.path().join("test.recon.toml");
    std::fs::write(&path, config).unwrap();
    (dir, path)
}

// ===========================================================================
// crossmatch validate
// ===========================================================================

#[test]
fn validate_accepts_fixture_config() {
    let config = fixture_config();
    let output = run(&["validate", config.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    let err = stderr(&output);
    assert!(err.contains("valid: recon 'GA4 vs Salesforce'"), "stderr: {err}");
    assert!(err.contains("keep_first"), "stderr: {err}");
}

#[test]
fn validate_rejects_missing_classify_section() {
    let (_dir, path) = temp_recon("name = \"Broken\"\n");
    let output = run(&["validate", path.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(60), "stderr: {}", stderr(&output));
    assert!(stderr(&output).starts_with("error: "));
}

#[test]
fn validate_requires_input_files() {
    let toml = r#"
name = "No files"

[classify]
low_value_threshold_cents   = 10000
cancellation_window_minutes = 60
variance_tolerance          = { amount_cents = 100 }
non_web_channels            = ["phone"]
"#;
    let (_dir, path) = temp_recon(toml);
    let output = run(&["validate", path.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(60));
    let err = stderr(&output);
    assert!(err.contains("sources.source.file"), "stderr: {err}");
    assert!(err.contains("hint:"), "stderr: {err}");
}

// ===========================================================================
// crossmatch run
// ===========================================================================

#[test]
fn run_json_contract() {
    let config = fixture_config();
    let output = run(&["run", config.to_str().unwrap(), "--json"]);

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    let val = assert_single_json(&output);

    let obj = val.as_object().expect("should be JSON object");
    for key in ["meta", "quality", "summary", "records"] {
        assert!(obj.contains_key(key), "must have '{key}' key");
    }
    assert_eq!(val["meta"]["config_name"], "GA4 vs Salesforce");
    assert_eq!(val["summary"]["total_records"], 11);
    assert_eq!(val["records"].as_array().unwrap().len(), 11);
    assert_eq!(val["quality"]["source"]["eligible"], 8);

    let err = stderr(&output);
    assert!(err.contains("11 records, 5 matched"), "stderr: {err}");
}

#[test]
fn run_without_json_keeps_stdout_empty() {
    let config = fixture_config();
    let output = run(&["run", config.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(0));
    assert!(output.stdout.is_empty());
    assert!(stderr(&output).contains("unexplained_needs_investigation"));
}

#[test]
fn run_writes_output_file_without_records() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("result.json");
    let config = fixture_config();

    let output = run(&[
        "run",
        config.to_str().unwrap(),
        "--output",
        out.to_str().unwrap(),
        "--no-records",
    ]);

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    assert!(output.stdout.is_empty());

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert!(written["records"].as_array().unwrap().is_empty());
    // Summary still reflects the full run.
    assert_eq!(written["summary"]["total_records"], 11);
}

#[test]
fn fail_on_unexplained_exits_62() {
    let config = fixture_config();
    let output = run(&["run", config.to_str().unwrap(), "--fail-on-unexplained"]);

    assert_eq!(output.status.code(), Some(62));
    assert!(stderr(&output).contains("2 record(s) need investigation"));
}

#[test]
fn as_of_override_reclassifies_recent_booking() {
    let config = fixture_config();
    let output = run(&[
        "run",
        config.to_str().unwrap(),
        "--json",
        "--as-of",
        "2025-10-07T10:30:00",
        "--fail-on-unexplained",
    ]);

    // BK200003 (bing) is still unexplained.
    assert_eq!(output.status.code(), Some(62));
    assert!(stderr(&output).contains("1 record(s) need investigation"));

    let val = assert_single_json(&output);
    let bk100007 = val["records"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["transaction_id"] == "BK100007")
        .unwrap();
    assert_eq!(bk100007["discrepancy_cause"], "likely_quick_cancellation");
}

#[test]
fn bad_as_of_is_usage_error() {
    let config = fixture_config();
    let output = run(&["run", config.to_str().unwrap(), "--as-of", "yesterday"]);

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("--as-of"));
}

#[test]
fn missing_input_file_is_runtime_error() {
    let toml = std::fs::read_to_string(fixture_config())
        .unwrap()
        .replace("ga4_events.csv", "does_not_exist.csv");
    let (_dir, path) = temp_recon(&toml);
    let output = run(&["run", path.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(61));
    assert!(stderr(&output).contains("does_not_exist.csv"));
}

#[test]
fn duplicate_reject_is_runtime_error_with_hint() {
    let toml = std::fs::read_to_string(fixture_config())
        .unwrap()
        .replace("[quality]\n", "[quality]\nduplicate_policy = \"reject\"\n");
    let (_dir, path) = temp_recon(&toml);
    let output = run(&["run", path.to_str().unwrap(), "--json"]);

    assert_eq!(output.status.code(), Some(61));
    assert!(output.stdout.is_empty(), "no partial output on failure");
    let err = stderr(&output);
    assert!(err.contains("BK100001"), "stderr: {err}");
    assert!(err.contains("keep_first"), "stderr: {err}");
}

#[test]
fn run_help_describes_json_as_additive() {
    let output = run(&["run", "--help"]);

    assert_eq!(output.status.code(), Some(0));
    let help = String::from_utf8_lossy(&output.stdout);
    assert!(help.contains("human summary stays on stderr"), "help: {help}");
    assert!(!help.contains("instead of human summary"), "help: {help}");
}

#[test]
fn validate_rejects_out_of_range_cancellation_window() {
    let toml = std::fs::read_to_string(fixture_config())
        .unwrap()
        .replace("processing_delay_minutes    = 15", "processing_delay_minutes = 9223372036854775807");
    let (_dir, path) = temp_recon(&toml);
    let output = run(&["validate", path.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(60), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("out of range"));
}

#[test]
fn missing_subcommand_is_usage_error() {
    let output = run(&[]);
    assert_eq!(output.status.code(), Some(2));
}
