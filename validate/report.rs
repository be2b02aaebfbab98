//! # Artifact Writers
//!
//! Plain TSV renditions of the engine's outputs for downstream reporting
//! and plotting collaborators. Nothing here computes; every number is taken
//! verbatim from the structured records produced by the statistical core.

use crate::bootstrap::BootstrapReport;
use crate::cohort::Cohort;
use crate::roc::RocResult;
use crate::score::CohortScores;
use crate::stratify::{RiskPartition, StratificationTable};
use crate::thresholds::Threshold;
use std::path::Path;
use thiserror::Error;

/// Errors surfaced while writing artifacts.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not write TSV output: {0}")]
    Csv(#[from] csv::Error),
}

fn tsv_writer(path: &Path) -> Result<csv::Writer<std::fs::File>, ReportError> {
    Ok(csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)?)
}

fn fmt(value: f64) -> String {
    format!("{value:.6}")
}

/// Derived thresholds: one row per continuous component.
pub fn write_thresholds(path: &Path, thresholds: &[Threshold]) -> Result<(), ReportError> {
    let mut writer = tsv_writer(path)?;
    writer.write_record([
        "variable",
        "direction",
        "cut",
        "sensitivity",
        "specificity",
        "youden",
        "ci_lower",
        "ci_upper",
    ])?;
    for threshold in thresholds {
        let (ci_lower, ci_upper) = match threshold.ci {
            Some((lo, hi)) => (fmt(lo), fmt(hi)),
            None => ("NA".to_string(), "NA".to_string()),
        };
        writer.write_record([
            threshold.variable.clone(),
            format!("{:?}", threshold.direction).to_lowercase(),
            fmt(threshold.cut),
            fmt(threshold.sensitivity),
            fmt(threshold.specificity),
            fmt(threshold.youden),
            ci_lower,
            ci_upper,
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// ROC operating points in long format, one row per (landmark, horizon,
/// threshold) triple.
pub fn write_roc_curves(path: &Path, results: &[RocResult]) -> Result<(), ReportError> {
    let mut writer = tsv_writer(path)?;
    writer.write_record([
        "landmark_day",
        "horizon",
        "threshold",
        "sensitivity",
        "specificity",
    ])?;
    for result in results {
        for point in &result.points {
            writer.write_record([
                fmt(result.landmark_day),
                fmt(result.horizon),
                fmt(point.threshold),
                fmt(point.sensitivity),
                fmt(point.specificity),
            ])?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Scalar AUC summary, one row per (landmark, horizon) pair.
pub fn write_auc_summary(path: &Path, results: &[RocResult]) -> Result<(), ReportError> {
    let mut writer = tsv_writer(path)?;
    writer.write_record(["landmark_day", "horizon", "auc", "cases", "controls"])?;
    for result in results {
        writer.write_record([
            fmt(result.landmark_day),
            fmt(result.horizon),
            fmt(result.auc),
            result.cases.to_string(),
            result.controls.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Bootstrap validation reports, one row per metric.
pub fn write_bootstrap_reports(
    path: &Path,
    reports: &[BootstrapReport],
) -> Result<(), ReportError> {
    let mut writer = tsv_writer(path)?;
    writer.write_record([
        "metric",
        "landmark_day",
        "horizon",
        "apparent",
        "mean_test",
        "mean_optimism",
        "bias_corrected",
        "ci_lower",
        "ci_upper",
        "evaluated",
        "skipped",
    ])?;
    for report in reports {
        writer.write_record([
            report.metric.name().to_string(),
            fmt(report.landmark_day),
            fmt(report.horizon),
            fmt(report.apparent),
            fmt(report.mean_test),
            fmt(report.mean_optimism),
            fmt(report.corrected),
            fmt(report.ci.0),
            fmt(report.ci.1),
            report.evaluated.to_string(),
            report.skipped.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// The per-category outcome table and the adjacent odds ratios, as two
/// separate files.
pub fn write_stratification(
    categories_path: &Path,
    odds_path: &Path,
    table: &StratificationTable,
) -> Result<(), ReportError> {
    let mut writer = tsv_writer(categories_path)?;
    writer.write_record([
        "category",
        "score_min",
        "score_max",
        "subjects",
        "events",
        "outcome_rate",
    ])?;
    for category in &table.categories {
        writer.write_record([
            category.name.clone(),
            category.min.to_string(),
            category.max.to_string(),
            category.subjects.to_string(),
            category.events.to_string(),
            fmt(category.outcome_rate),
        ])?;
    }
    writer.flush()?;

    let mut writer = tsv_writer(odds_path)?;
    writer.write_record(["lower", "upper", "odds_ratio", "ci_lower", "ci_upper"])?;
    for odds in &table.adjacent_odds {
        writer.write_record([
            odds.lower.clone(),
            odds.upper.clone(),
            fmt(odds.odds_ratio),
            fmt(odds.ci.0),
            fmt(odds.ci.1),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Per-subject scores with their risk category, for the standalone scoring
/// command.
pub fn write_scores(
    path: &Path,
    cohort: &Cohort,
    scores: &CohortScores,
    partition: &RiskPartition,
) -> Result<(), ReportError> {
    let mut writer = tsv_writer(path)?;
    writer.write_record(["id", "score", "max_score", "category"])?;
    let max_score = partition.max_score().to_string();
    for (subject, score) in cohort.iter().zip(&scores.by_subject) {
        let (score_text, category) = match score {
            Some(score) => (
                score.to_string(),
                partition
                    .category_of(*score)
                    .map(|c| c.name.clone())
                    .unwrap_or_else(|| "NA".to_string()),
            ),
            None => ("NA".to_string(), "NA".to_string()),
        };
        writer.write_record([
            subject.id().to_string(),
            score_text,
            max_score.clone(),
            category,
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricKind;
    use crate::roc::RocPoint;
    use crate::score::Direction;
    use std::fs;

    #[test]
    fn threshold_table_includes_interval_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thresholds.tsv");
        let thresholds = vec![
            Threshold {
                variable: "meld".into(),
                cut: 20.0,
                direction: Direction::Above,
                sensitivity: 0.786,
                specificity: 0.691,
                youden: 0.477,
                ci: Some((18.0, 24.0)),
            },
            Threshold {
                variable: "platelets".into(),
                cut: 78.0,
                direction: Direction::Below,
                sensitivity: 0.714,
                specificity: 0.636,
                youden: 0.350,
                ci: None,
            },
        ];
        write_thresholds(&path, &thresholds).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("variable\tdirection"));
        assert!(text.contains("meld\tabove\t20.000000"));
        assert!(text.contains("platelets\tbelow\t78.000000"));
        assert!(text.contains("NA\tNA"));
    }

    #[test]
    fn roc_curves_are_written_in_long_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roc.tsv");
        let results = vec![RocResult {
            landmark_day: 7.0,
            horizon: 90.0,
            points: vec![
                RocPoint {
                    threshold: 3.0,
                    sensitivity: 1.0,
                    specificity: 0.474,
                },
                RocPoint {
                    threshold: 2.0,
                    sensitivity: 1.0,
                    specificity: 0.2,
                },
            ],
            auc: 0.754,
            cases: 10,
            controls: 37,
        }];
        write_roc_curves(&path, &results).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3); // header + two points

        let auc_path = dir.path().join("auc.tsv");
        write_auc_summary(&auc_path, &results).unwrap();
        let auc_text = fs::read_to_string(&auc_path).unwrap();
        assert!(auc_text.contains("0.754000\t10\t37"));
    }

    #[test]
    fn bootstrap_rows_carry_the_skip_counts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bootstrap.tsv");
        let reports = vec![BootstrapReport {
            metric: MetricKind::Auc,
            landmark_day: 7.0,
            horizon: 90.0,
            apparent: 0.754,
            mean_test: 0.745,
            mean_optimism: 0.009,
            corrected: 0.745,
            ci: (0.631, 0.859),
            evaluated: 992,
            skipped: 8,
        }];
        write_bootstrap_reports(&path, &reports).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("auc\t"));
        assert!(text.trim_end().ends_with("992\t8"));
    }
}
