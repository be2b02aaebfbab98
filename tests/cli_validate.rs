use std::fs;
use std::process::Command;

use tempfile::tempdir;

/// Deterministic 60-subject cohort: events carry high marker values and
/// happen between day 8 and day 66; survivors carry low values and are
/// censored at day 120, past every configured horizon.
fn cohort_tsv() -> String {
    let mut rows = vec!["id\ttime_to_event\tevent\tmarker\tcomorbidity".to_string()];
    for i in 0..30 {
        rows.push(format!(
            "case_{i}\t{}\t1\t{}\t{}",
            8 + 2 * i,
            25 + (i % 10),
            i % 2
        ));
    }
    for i in 0..30 {
        rows.push(format!(
            "ctrl_{i}\t120\t0\t{}\t{}",
            10 + (i % 10),
            i % 2
        ));
    }
    rows.join("\n") + "\n"
}

const CONFIG: &str = r#"
[score]
max_missing_components = 1

[[score.component]]
variable = "marker"
kind = "continuous"
direction = "above"
points = 2

[[score.component]]
variable = "comorbidity"
kind = "binary"
points = 1

[[risk.category]]
name = "low"
min = 0
max = 0

[[risk.category]]
name = "medium"
min = 1
max = 1

[[risk.category]]
name = "high"
min = 2
max = 3

[validation]
bootstrap_iterations = 100
landmark_days = [3.0, 5.0, 7.0]
horizons = [30.0, 60.0, 90.0]
primary_landmark = 7.0
primary_horizon = 90.0
metrics = ["auc", "cindex", "brier"]
skip_tolerance = 0.05
seed = 42
"#;

#[test]
fn validate_cli_writes_every_artifact() {
    let tmp = tempdir().expect("temporary directory");
    let cohort_path = tmp.path().join("cohort.tsv");
    let config_path = tmp.path().join("config.toml");
    fs::write(&cohort_path, cohort_tsv()).expect("write cohort");
    fs::write(&config_path, CONFIG).expect("write config");

    let exe = env!("CARGO_BIN_EXE_prognos");
    let status = Command::new(exe)
        .current_dir(tmp.path())
        .args([
            "validate",
            cohort_path.to_str().expect("path str"),
            "--config",
            config_path.to_str().expect("path str"),
            "--out-dir",
            "out",
            "--no-progress",
        ])
        .status()
        .expect("run prognos cli");

    assert!(status.success(), "CLI exited with status {status:?}");
    for artifact in [
        "thresholds.tsv",
        "roc_curves.tsv",
        "auc_summary.tsv",
        "bootstrap_reports.tsv",
        "risk_categories.tsv",
        "adjacent_odds.tsv",
    ] {
        assert!(
            tmp.path().join("out").join(artifact).exists(),
            "{artifact} missing"
        );
    }

    // Every configured metric got a bootstrap row.
    let reports = fs::read_to_string(tmp.path().join("out/bootstrap_reports.tsv"))
        .expect("read bootstrap reports");
    assert_eq!(reports.lines().count(), 4); // header + three metrics
    for metric in ["auc", "cindex", "brier"] {
        assert!(reports.contains(metric), "missing metric row {metric}");
    }
}

#[test]
fn score_cli_requires_and_uses_fixed_cuts() {
    let tmp = tempdir().expect("temporary directory");
    let cohort_path = tmp.path().join("cohort.tsv");
    fs::write(&cohort_path, cohort_tsv()).expect("write cohort");

    // Without a configured cut for the continuous component the scoring
    // command must refuse to run.
    let unpinned = tmp.path().join("unpinned.toml");
    fs::write(&unpinned, CONFIG).expect("write config");
    let exe = env!("CARGO_BIN_EXE_prognos");
    let status = Command::new(exe)
        .current_dir(tmp.path())
        .args([
            "score",
            cohort_path.to_str().expect("path str"),
            "--config",
            unpinned.to_str().expect("path str"),
        ])
        .status()
        .expect("run prognos cli");
    assert!(!status.success(), "scoring without a cut must fail");

    // With the cut pinned, scores come out one row per subject.
    let pinned = tmp.path().join("pinned.toml");
    fs::write(
        &pinned,
        CONFIG.replace(
            "direction = \"above\"",
            "direction = \"above\"\ncut = 20.0",
        ),
    )
    .expect("write config");
    let status = Command::new(exe)
        .current_dir(tmp.path())
        .args([
            "score",
            cohort_path.to_str().expect("path str"),
            "--config",
            pinned.to_str().expect("path str"),
            "--output",
            "scores.tsv",
        ])
        .status()
        .expect("run prognos cli");
    assert!(status.success(), "CLI exited with status {status:?}");

    let scores = fs::read_to_string(tmp.path().join("scores.tsv")).expect("read scores");
    assert_eq!(scores.lines().count(), 61); // header + 60 subjects
    let case_row = scores
        .lines()
        .find(|l| l.starts_with("case_1\t"))
        .expect("case_1 present");
    // marker 26 > 20 scores 2, comorbidity adds 1: high risk.
    assert_eq!(case_row, "case_1\t3\t3\thigh");
}
