//! CLI integration tests using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn gil() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("gil").unwrap();
    // Keep the developer's environment out of the engine config.
    for key in [
        "GIL_IRT_MIN_ITEMS",
        "GIL_IRT_MAX_ITEMS",
        "GIL_IRT_TARGET_SE",
        "GIL_IRT_INITIAL_THETA",
        "GIL_BTS_MIN_RESPONSES",
        "GIL_BTS_WEIGHT_INFORMATION",
        "GIL_BTS_WEIGHT_PREDICTION",
        "GIL_BTS_WEIGHT_ACCURACY",
        "GIL_BTS_WEIGHT_INSIGHT",
    ] {
        cmd.env_remove(key);
    }
    cmd
}

#[test]
fn validate_valid_item_bank() {
    gil()
        .arg("validate")
        .arg("--item-bank")
        .arg("../../item-banks/cardiology.toml")
        .assert()
        .success()
        .stdout(predicate::str::contains("12 items"))
        .stdout(predicate::str::contains("domains: cardiology"))
        .stdout(predicate::str::contains("All item banks valid"));
}

#[test]
fn validate_directory() {
    gil()
        .arg("validate")
        .arg("--item-bank")
        .arg("../../item-banks")
        .assert()
        .success()
        .stdout(predicate::str::contains("Cardiology Vignettes"))
        .stdout(predicate::str::contains("Neurology Vignettes"));
}

#[test]
fn validate_reports_warnings() {
    gil()
        .arg("validate")
        .arg("--item-bank")
        .arg("tests/fixtures/flawed-bank.toml")
        .assert()
        .success()
        .stdout(predicate::str::contains("[dup] WARNING: duplicate item ID"))
        .stdout(predicate::str::contains("[flat] WARNING:"))
        .stdout(predicate::str::contains("discrimination must be positive"))
        .stdout(predicate::str::contains("[no-ref] WARNING: no reference differential"))
        .stdout(predicate::str::contains("warning(s) found"));
}

#[test]
fn validate_nonexistent_file() {
    gil()
        .arg("validate")
        .arg("--item-bank")
        .arg("nonexistent.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn invalid_config_is_fatal() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("gil.toml");
    std::fs::write(&config, "[irt]\nmin_items = 12\nmax_items = 4\n").unwrap();

    gil()
        .arg("validate")
        .arg("--item-bank")
        .arg("../../item-banks/cardiology.toml")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid configuration"));
}

#[test]
fn env_override_is_validated() {
    gil()
        .env("GIL_IRT_TARGET_SE", "-1")
        .arg("validate")
        .arg("--item-bank")
        .arg("../../item-banks/cardiology.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn init_creates_files() {
    let dir = TempDir::new().unwrap();

    gil()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created gil.toml"))
        .stdout(predicate::str::contains("Created item-banks/example.toml"));

    assert!(dir.path().join("gil.toml").exists());
    assert!(dir.path().join("item-banks/example.toml").exists());

    // The generated files are accepted by the other commands.
    gil()
        .current_dir(dir.path())
        .arg("validate")
        .arg("--item-bank")
        .arg("item-banks/example.toml")
        .assert()
        .success()
        .stdout(predicate::str::contains("Example Item Bank (3 items"))
        .stdout(predicate::str::contains("All item banks valid"));
}

#[test]
fn init_skips_existing() {
    let dir = TempDir::new().unwrap();

    gil().current_dir(dir.path()).arg("init").assert().success();

    gil()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn simulate_prints_summary_table() {
    gil()
        .arg("simulate")
        .arg("--item-bank")
        .arg("../../item-banks")
        .arg("--domain")
        .arg("cardiology")
        .arg("--abilities=-1.5,0,1.5")
        .arg("--parallelism")
        .arg("2")
        .assert()
        .success()
        .stdout(predicate::str::contains("sim-01"))
        .stdout(predicate::str::contains("sim-03"))
        .stdout(predicate::str::contains("Estimated θ"))
        .stdout(predicate::str::contains("Refit θ"))
        .stdout(predicate::str::contains("3/3 sessions successful"));
}

#[test]
fn simulate_resumes_profiles_from_snapshot() {
    let dir = TempDir::new().unwrap();
    let snapshot = dir.path().join("profiles.json");
    let run = || {
        gil()
            .arg("simulate")
            .arg("--item-bank")
            .arg("../../item-banks/cardiology.toml")
            .arg("--domain")
            .arg("cardiology")
            .arg("--abilities")
            .arg("1")
            .arg("--profiles")
            .arg(&snapshot)
            .arg("--format")
            .arg("json")
            .output()
            .unwrap()
    };

    let first = run();
    assert!(first.status.success());
    let first: serde_json::Value = serde_json::from_slice(&first.stdout).unwrap();
    let first_items = first["sessions"][0]["items_administered"].as_u64().unwrap();

    let second = run();
    assert!(second.status.success());
    let second: serde_json::Value = serde_json::from_slice(&second.stdout).unwrap();
    let second_items = second["sessions"][0]["items_administered"].as_u64().unwrap();
    let lifetime = second["sessions"][0]["final_profile"]["num_assessments"]
        .as_u64()
        .unwrap();
    assert_eq!(lifetime, first_items + second_items);

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&snapshot).unwrap()).unwrap();
    assert_eq!(saved[0]["user_id"], "sim-01");
    assert_eq!(saved[0]["num_assessments"].as_u64().unwrap(), lifetime);
}

#[test]
fn simulate_writes_json_report() {
    let dir = TempDir::new().unwrap();

    let output = gil()
        .arg("simulate")
        .arg("--item-bank")
        .arg("../../item-banks/cardiology.toml")
        .arg("--domain")
        .arg("cardiology")
        .arg("--abilities")
        .arg("0.5,2")
        .arg("--format")
        .arg("json")
        .arg("--output")
        .arg(dir.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let sessions = report["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(report["item_bank"]["item_count"], 12);
    for s in sessions {
        let items = s["items_administered"].as_u64().unwrap();
        assert!((3..=10).contains(&items));
    }

    let saved: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|x| x == "json"))
        .collect();
    assert_eq!(saved.len(), 1);
}

#[test]
fn report_reads_saved_simulation() {
    let dir = TempDir::new().unwrap();

    gil()
        .arg("simulate")
        .arg("--item-bank")
        .arg("../../item-banks/cardiology.toml")
        .arg("--domain")
        .arg("cardiology")
        .arg("--abilities=-1,1")
        .arg("--output")
        .arg(dir.path())
        .assert()
        .success();

    let saved = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| p.extension().is_some_and(|x| x == "json"))
        .unwrap();

    gil()
        .arg("report")
        .arg("--input")
        .arg(&saved)
        .assert()
        .success()
        .stdout(predicate::str::contains("Item bank: Cardiology Vignettes (12 items)"))
        .stdout(predicate::str::contains("sim-02"))
        .stdout(predicate::str::contains("2/2 sessions successful"));
}

#[test]
fn report_missing_file_fails() {
    gil()
        .arg("report")
        .arg("--input")
        .arg("nonexistent.json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read report"));
}

#[test]
fn simulate_unknown_domain_exhausts_bank() {
    gil()
        .arg("simulate")
        .arg("--item-bank")
        .arg("../../item-banks/cardiology.toml")
        .arg("--domain")
        .arg("dermatology")
        .arg("--abilities")
        .arg("0")
        .assert()
        .success()
        .stdout(predicate::str::contains("exhausted_bank"))
        .stdout(predicate::str::contains("0/1 sessions successful"));
}

#[test]
fn simulate_rejects_bad_abilities() {
    gil()
        .arg("simulate")
        .arg("--item-bank")
        .arg("../../item-banks/cardiology.toml")
        .arg("--domain")
        .arg("cardiology")
        .arg("--abilities")
        .arg("0.5,high")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid ability value: 'high'"));
}

#[test]
fn score_bts_prints_breakdown() {
    gil()
        .args([
            "score-bts",
            "--own",
            "90",
            "--peer",
            "40",
            "--community-average",
            "40",
            "--samples",
            "5",
            "--accuracy",
            "80",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Prediction"))
        .stdout(predicate::str::contains("20.00"))
        .stdout(predicate::str::contains("Prediction error: 0.0"));
}

#[test]
fn score_bts_json_output() {
    let output = gil()
        .args([
            "score-bts",
            "--own",
            "90",
            "--peer",
            "40",
            "--community-average",
            "40",
            "--samples",
            "12",
            "--accuracy",
            "80",
            "--format",
            "json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let score: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(score["prediction"], 20.0);
    assert_eq!(score["prediction_error"], 0.0);
    let total = score["total"].as_f64().unwrap();
    assert!((0.0..=55.0).contains(&total));
}

#[test]
fn score_bts_insufficient_data() {
    gil()
        .args([
            "score-bts",
            "--own",
            "70",
            "--peer",
            "60",
            "--community-average",
            "55",
            "--samples",
            "4",
            "--accuracy",
            "75",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Insufficient data"))
        .stdout(predicate::str::contains("5 required"));
}

#[test]
fn score_bts_rejects_out_of_range() {
    gil()
        .args([
            "score-bts",
            "--own",
            "120",
            "--peer",
            "40",
            "--community-average",
            "40",
            "--samples",
            "5",
            "--accuracy",
            "80",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("own_assessment"));
}

#[test]
fn help_output() {
    gil()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Adaptive clinical assessment engine"));
}

#[test]
fn version_output() {
    gil()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("gil"));
}
