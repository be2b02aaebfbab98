//! # Scalar Performance Metrics
//!
//! The metrics the bootstrap validator can target: time-dependent AUC,
//! Harrell's concordance index, and the Brier score, plus the percentile
//! helper shared by every confidence-interval computation.
//!
//! Concordance uses a sort plus Fenwick-tree sweep, O(n log n) instead of
//! the quadratic all-pairs scan.

use crate::landmark::LandmarkCohort;
use crate::roc;
use crate::score::CohortScores;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Named metric evaluated on a scored landmark cohort at a horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Time-dependent AUC (trapezoidal, see [`roc`]).
    Auc,
    /// Harrell's concordance index with follow-up capped at the horizon.
    CIndex,
    /// Brier score at the horizon, using score / max_score as the risk.
    Brier,
}

impl MetricKind {
    pub fn name(self) -> &'static str {
        match self {
            MetricKind::Auc => "auc",
            MetricKind::CIndex => "cindex",
            MetricKind::Brier => "brier",
        }
    }

    /// Evaluates the metric. `None` means non-evaluable on this cohort
    /// (e.g. an empty case or control set), never a defaulted value.
    pub fn compute(
        self,
        landmark: &LandmarkCohort,
        scores: &CohortScores,
        horizon: f64,
        max_score: u32,
    ) -> Option<f64> {
        match self {
            MetricKind::Auc => {
                roc::time_dependent_roc(landmark, scores, horizon).map(|r| r.auc)
            }
            MetricKind::CIndex => {
                let observations: Vec<(f64, bool, f64)> = landmark
                    .cohort()
                    .iter()
                    .zip(&scores.by_subject)
                    .filter_map(|(subject, score)| {
                        let score = (*score)? as f64;
                        // Administrative censoring at the horizon.
                        let time = subject.time_to_event().min(horizon);
                        let event = subject.event() && subject.time_to_event() <= horizon;
                        Some((time, event, score))
                    })
                    .collect();
                concordance_index(&observations)
            }
            MetricKind::Brier => brier_score(landmark, scores, horizon, max_score),
        }
    }
}

/// Fenwick (binary indexed) tree over score ranks; supports point updates
/// and prefix counts in O(log n).
struct Fenwick {
    tree: Vec<i64>,
}

impl Fenwick {
    fn new(size: usize) -> Self {
        Self {
            tree: vec![0; size + 1],
        }
    }

    /// `rank` is 1-based.
    fn add(&mut self, rank: usize, delta: i64) {
        let mut i = rank;
        while i < self.tree.len() {
            self.tree[i] += delta;
            i += i & i.wrapping_neg();
        }
    }

    /// Count of entries with rank in [1, rank].
    fn prefix(&self, rank: usize) -> i64 {
        let mut sum = 0;
        let mut i = rank;
        while i > 0 {
            sum += self.tree[i];
            i -= i & i.wrapping_neg();
        }
        sum
    }

    fn total(&self) -> i64 {
        self.prefix(self.tree.len() - 1)
    }
}

/// Harrell's concordance index over `(time, event, score)` observations.
///
/// A pair is comparable when the subject with the shorter time had the
/// event; it is concordant when that subject also has the higher score.
/// Score ties count 1/2; pairs tied on time are not comparable. Returns
/// `None` when no pair is comparable.
pub fn concordance_index(observations: &[(f64, bool, f64)]) -> Option<f64> {
    let n = observations.len();
    if n < 2 {
        return None;
    }

    // Dense 1-based ranks over the distinct score values.
    let mut distinct: Vec<f64> = observations.iter().map(|&(_, _, s)| s).collect();
    distinct.sort_by(|a, b| a.partial_cmp(b).expect("scores are finite"));
    distinct.dedup();
    let rank_of = |score: f64| -> usize {
        distinct
            .binary_search_by(|probe| probe.partial_cmp(&score).expect("scores are finite"))
            .expect("score came from the same observations")
            + 1
    };

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        observations[a]
            .0
            .partial_cmp(&observations[b].0)
            .expect("times are finite")
    });

    let mut tree = Fenwick::new(distinct.len());
    for &(_, _, score) in observations {
        tree.add(rank_of(score), 1);
    }

    let mut concordant = 0.0f64;
    let mut tied = 0.0f64;
    let mut comparable = 0i64;

    let mut i = 0;
    while i < n {
        // Subjects sharing a time are processed as one group: they leave the
        // tree before any of them is scored against it, so the tree holds
        // exactly the subjects with strictly later times.
        let mut j = i;
        while j < n && observations[order[j]].0 == observations[order[i]].0 {
            j += 1;
        }
        for &idx in &order[i..j] {
            tree.add(rank_of(observations[idx].2), -1);
        }
        for &idx in &order[i..j] {
            let (_, event, score) = observations[idx];
            if !event {
                continue;
            }
            let later = tree.total();
            if later == 0 {
                continue;
            }
            comparable += later;
            let rank = rank_of(score);
            concordant += tree.prefix(rank - 1) as f64;
            tied += (tree.prefix(rank) - tree.prefix(rank - 1)) as f64;
        }
        i = j;
    }

    if comparable == 0 {
        None
    } else {
        Some((concordant + 0.5 * tied) / comparable as f64)
    }
}

/// Brier score at the horizon: mean squared difference between the observed
/// outcome (0/1) and the predicted risk `score / max_score`, over subjects
/// with a score and a determinate outcome. `None` when no subject qualifies.
pub fn brier_score(
    landmark: &LandmarkCohort,
    scores: &CohortScores,
    horizon: f64,
    max_score: u32,
) -> Option<f64> {
    debug_assert!(max_score > 0);
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for (subject, score) in landmark.cohort().iter().zip(&scores.by_subject) {
        let (Some(score), Some(outcome)) = (score, subject.outcome_at(horizon)) else {
            continue;
        };
        let risk = *score as f64 / max_score as f64;
        let observed = if outcome { 1.0 } else { 0.0 };
        sum += (observed - risk) * (observed - risk);
        count += 1;
    }
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Percentile with linear interpolation between order statistics.
/// `q` in [0, 100].
pub fn percentile(values: &Array1<f64>, q: f64) -> f64 {
    assert!(!values.is_empty(), "percentile of an empty sample");
    assert!((0.0..=100.0).contains(&q), "q must be in [0, 100]");
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("values are finite"));
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        sorted[lo] + (rank - lo as f64) * (sorted[hi] - sorted[lo])
    }
}
