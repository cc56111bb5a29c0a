// tests/cli_tests.rs
//
// Smoke tests for the crowdshield and surge_sim binaries.
//
// Each test runs in its own temp directory with the advisory and model
// environment cleared, so the runs are offline and deterministic.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::tempdir;

fn crowdshield_bin() -> &'static str {
    env!("CARGO_BIN_EXE_crowdshield")
}

fn surge_sim_bin() -> &'static str {
    env!("CARGO_BIN_EXE_surge_sim")
}

fn run(bin: &str, dir: &Path, args: &[&str]) -> Output {
    Command::new(bin)
        .args(args)
        .current_dir(dir)
        .env_remove("CROWDSHIELD_ADVISORY_API_KEY")
        .env_remove("OPENAI_API_KEY")
        .env_remove("CROWDSHIELD_MODEL_PATH")
        .env_remove("CROWDSHIELD_SURGE_SAMPLES")
        .env_remove("CROWDSHIELD_SURGE_SEED")
        .env_remove("CROWDSHIELD_ROUTING_THRESHOLD")
        .output()
        .expect("failed to spawn binary")
}

fn assert_success(out: &Output) {
    assert!(
        out.status.success(),
        "exit {:?}\nstdout:\n{}\nstderr:\n{}",
        out.status,
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
}

#[test]
fn precompute_then_timeline_and_surge_export() {
    let dir = tempdir().unwrap();

    let out = run(crowdshield_bin(), dir.path(), &["precompute", "--db", "cache.db", "--log-jsonl", "minutes.jsonl"]);
    assert_success(&out);
    let report: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["routing_strategy"], "fallback");
    assert_eq!(report["model_degraded"], true);
    assert_eq!(report["scenarios"].as_array().unwrap().len(), 3);
    assert!(report["failures"].as_array().unwrap().is_empty());

    let telemetry = fs::read_to_string(dir.path().join("minutes.jsonl")).unwrap();
    assert_eq!(telemetry.lines().count(), 3 * 1440);

    let out = run(
        crowdshield_bin(),
        dir.path(),
        &["timeline", "--scenario", "scenario_c_blowout_q3", "--db", "cache.db"],
    );
    assert_success(&out);
    let timeline: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(timeline["source"], "cache");
    assert_eq!(timeline["timeline"].as_array().unwrap().len(), 1440);

    let surge_args = [
        "--cache",
        "cache.db",
        "--samples",
        "200",
        "--seed",
        "5",
        "--output-dir",
        "exports",
    ];
    let out = run(surge_sim_bin(), dir.path(), &surge_args);
    assert_success(&out);
    let summary: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(summary["num_minutes"], 1440);
    assert_eq!(summary["seed"], 5);

    let export: Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("exports/surge_export.json")).unwrap()).unwrap();
    assert_eq!(export["scenario_id"], "scenario_c_blowout_q3");
    assert_eq!(export["timeline"].as_array().unwrap().len(), 1440);

    // Same seed and sample count reproduce the curve.
    let again = run(surge_sim_bin(), dir.path(), &surge_args);
    assert_success(&again);
    let summary_again: Value = serde_json::from_slice(&again.stdout).unwrap();
    assert_eq!(summary["surge_checksum"], summary_again["surge_checksum"]);
}

#[test]
fn empty_cache_serves_synthetic_timeline() {
    let dir = tempdir().unwrap();
    let out = run(
        crowdshield_bin(),
        dir.path(),
        &["timeline", "--scenario", "scenario_a_normal_exit", "--db", "empty.db"],
    );
    assert_success(&out);
    let timeline: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(timeline["source"], "synthetic");

    // The surge harness refuses to export from a synthetic timeline.
    let out = run(
        surge_sim_bin(),
        dir.path(),
        &["--scenario", "scenario_a_normal_exit", "--cache", "empty.db", "--samples", "10"],
    );
    assert!(!out.status.success());
}

#[test]
fn unknown_scenario_exits_nonzero() {
    let dir = tempdir().unwrap();
    let out = run(
        crowdshield_bin(),
        dir.path(),
        &["timeline", "--scenario", "scenario_x", "--db", "cache.db"],
    );
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("unknown scenario_id"));
}

#[test]
fn scenarios_lists_builtins() {
    let dir = tempdir().unwrap();
    let out = run(crowdshield_bin(), dir.path(), &["scenarios"]);
    assert_success(&out);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert_eq!(stdout.lines().count(), 3);
    assert!(stdout.contains("scenario_b_close_game\thigh_attendance_close_game"));
}
