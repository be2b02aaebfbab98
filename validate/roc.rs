//! # Time-Dependent ROC Analysis
//!
//! Discrimination of the integer score at a prediction horizon within a
//! landmark cohort. Cases experienced the event at or before the horizon;
//! controls were followed beyond it; subjects censored earlier are neither
//! and are excluded from both sets.

use crate::landmark::LandmarkCohort;
use crate::score::CohortScores;
use itertools::Itertools;
use std::collections::BTreeMap;

/// One operating point of the ROC curve: at threshold `c`, a subject is
/// called positive when `score >= c`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RocPoint {
    pub threshold: f64,
    pub sensitivity: f64,
    pub specificity: f64,
}

/// The ROC curve and scalar AUC for one (landmark, horizon) pair.
/// Immutable; produced once per invocation.
#[derive(Debug, Clone)]
pub struct RocResult {
    pub landmark_day: f64,
    pub horizon: f64,
    pub points: Vec<RocPoint>,
    pub auc: f64,
    pub cases: usize,
    pub controls: usize,
}

/// Computes the time-dependent ROC curve of the scores at `horizon`.
///
/// `scores` must be aligned with the landmark cohort's subjects; unscored
/// subjects are skipped. Returns `None` when either the case or the control
/// set is empty; the result is non-evaluable, not AUC = 0.
pub fn time_dependent_roc(
    landmark: &LandmarkCohort,
    scores: &CohortScores,
    horizon: f64,
) -> Option<RocResult> {
    debug_assert_eq!(scores.by_subject.len(), landmark.cohort().len());

    // Per-score (case, control) counts, keyed ascending.
    let mut counts: BTreeMap<u32, (usize, usize)> = BTreeMap::new();
    let mut cases = 0usize;
    let mut controls = 0usize;
    for (subject, score) in landmark.cohort().iter().zip(&scores.by_subject) {
        let (Some(score), Some(is_case)) = (score, subject.outcome_at(horizon)) else {
            continue;
        };
        let entry = counts.entry(*score).or_insert((0, 0));
        if is_case {
            entry.0 += 1;
            cases += 1;
        } else {
            entry.1 += 1;
            controls += 1;
        }
    }

    if cases == 0 || controls == 0 {
        return None;
    }

    // Sweep thresholds from the highest observed score down. At threshold c:
    // sensitivity = cases with score >= c, specificity = controls below c.
    let mut points = Vec::with_capacity(counts.len());
    let mut cases_at_or_above = 0usize;
    let mut controls_at_or_above = 0usize;
    for (&score, &(case_count, control_count)) in counts.iter().rev() {
        cases_at_or_above += case_count;
        controls_at_or_above += control_count;
        points.push(RocPoint {
            threshold: score as f64,
            sensitivity: cases_at_or_above as f64 / cases as f64,
            specificity: (controls - controls_at_or_above) as f64 / controls as f64,
        });
    }

    let auc = trapezoidal_auc(&points);

    Some(RocResult {
        landmark_day: landmark.day(),
        horizon,
        points,
        auc,
        cases,
        controls,
    })
}

/// Trapezoidal rule over the (1 - specificity, sensitivity) curve, anchored
/// at (0, 0). The final point of a threshold sweep is (1, 1) by
/// construction, so the curve always spans the unit square.
fn trapezoidal_auc(points: &[RocPoint]) -> f64 {
    let anchor = std::iter::once((0.0f64, 0.0f64));
    let curve = points
        .iter()
        .map(|p| (1.0 - p.specificity, p.sensitivity));
    anchor
        .chain(curve)
        .tuple_windows()
        .map(|((x0, y0), (x1, y1))| (x1 - x0) * (y0 + y1) / 2.0)
        .sum()
}
