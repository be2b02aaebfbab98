//! # Risk Stratification
//!
//! Buckets integer scores into ordered, named categories and reports
//! per-category outcome rates plus odds ratios between adjacent categories.
//! The partition is the single source of truth for every boundary quoted
//! downstream; it must tile `[0, max_score]` exactly, so a score can never
//! fall between categories or into two of them.

use crate::cohort::Cohort;
use crate::score::CohortScores;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced while validating a partition. All are configuration
/// defects: fatal at startup, never silently repaired.
#[derive(Debug, Error)]
pub enum StratifyError {
    #[error("risk partition has no categories")]
    EmptyPartition,
    #[error("risk category '{name}' has min {min} greater than max {max}")]
    InvertedRange { name: String, min: u32, max: u32 },
    #[error(
        "risk partition does not tile the score range: category '{name}' starts at {found} where {expected} was required"
    )]
    NotContiguous {
        name: String,
        expected: u32,
        found: u32,
    },
    #[error("risk partition ends at {found} but the maximum score is {max_score}")]
    WrongUpperBound { found: u32, max_score: u32 },
}

/// One named, inclusive sub-range of the score scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskCategory {
    pub name: String,
    pub min: u32,
    pub max: u32,
}

/// An ordered, exhaustive, non-overlapping partition of `[0, max_score]`.
#[derive(Debug, Clone)]
pub struct RiskPartition {
    categories: Vec<RiskCategory>,
    max_score: u32,
}

impl RiskPartition {
    /// Validates that the categories, in order, tile `[0, max_score]` with
    /// no gaps and no overlaps.
    pub fn new(categories: Vec<RiskCategory>, max_score: u32) -> Result<Self, StratifyError> {
        if categories.is_empty() {
            return Err(StratifyError::EmptyPartition);
        }
        let mut expected = 0u32;
        for category in &categories {
            if category.min > category.max {
                return Err(StratifyError::InvertedRange {
                    name: category.name.clone(),
                    min: category.min,
                    max: category.max,
                });
            }
            if category.min != expected {
                return Err(StratifyError::NotContiguous {
                    name: category.name.clone(),
                    expected,
                    found: category.min,
                });
            }
            expected = category.max + 1;
        }
        if expected != max_score + 1 {
            return Err(StratifyError::WrongUpperBound {
                found: expected - 1,
                max_score,
            });
        }
        Ok(Self {
            categories,
            max_score,
        })
    }

    pub fn categories(&self) -> &[RiskCategory] {
        &self.categories
    }

    pub fn max_score(&self) -> u32 {
        self.max_score
    }

    /// The unique category containing `score`. `None` only for scores above
    /// the partition's scale, which a well-formed pipeline never produces.
    pub fn category_of(&self, score: u32) -> Option<&RiskCategory> {
        self.categories
            .iter()
            .find(|c| c.min <= score && score <= c.max)
    }
}

/// Observed outcome summary for one category.
#[derive(Debug, Clone)]
pub struct CategorySummary {
    pub name: String,
    pub min: u32,
    pub max: u32,
    /// Subjects with a score and a determinate outcome at the horizon.
    pub subjects: usize,
    pub events: usize,
    pub outcome_rate: f64,
}

/// Odds ratio of the outcome between two adjacent categories (upper vs.
/// lower), with its Woolf 95% confidence interval.
#[derive(Debug, Clone)]
pub struct AdjacentOddsRatio {
    pub lower: String,
    pub upper: String,
    pub odds_ratio: f64,
    pub ci: (f64, f64),
}

/// The per-category table plus adjacent odds ratios for one horizon.
#[derive(Debug, Clone)]
pub struct StratificationTable {
    pub horizon: f64,
    pub categories: Vec<CategorySummary>,
    pub adjacent_odds: Vec<AdjacentOddsRatio>,
    /// Subjects with no score or an indeterminate outcome at the horizon.
    pub indeterminate: usize,
}

/// Buckets a scored cohort and summarizes outcomes per category at the
/// horizon. Scores and subjects must be index-aligned.
pub fn stratify(
    cohort: &Cohort,
    scores: &CohortScores,
    partition: &RiskPartition,
    horizon: f64,
) -> StratificationTable {
    debug_assert_eq!(scores.by_subject.len(), cohort.len());

    let mut subject_counts = vec![0usize; partition.categories().len()];
    let mut event_counts = vec![0usize; partition.categories().len()];
    let mut indeterminate = 0usize;

    for (subject, score) in cohort.iter().zip(&scores.by_subject) {
        let (Some(score), Some(outcome)) = (score, subject.outcome_at(horizon)) else {
            indeterminate += 1;
            continue;
        };
        let index = partition
            .categories()
            .iter()
            .position(|c| c.min <= *score && *score <= c.max)
            .expect("scores are bounded by max_score, which the partition tiles");
        subject_counts[index] += 1;
        if outcome {
            event_counts[index] += 1;
        }
    }

    let categories: Vec<CategorySummary> = partition
        .categories()
        .iter()
        .enumerate()
        .map(|(i, category)| CategorySummary {
            name: category.name.clone(),
            min: category.min,
            max: category.max,
            subjects: subject_counts[i],
            events: event_counts[i],
            outcome_rate: if subject_counts[i] == 0 {
                f64::NAN
            } else {
                event_counts[i] as f64 / subject_counts[i] as f64
            },
        })
        .collect();

    let adjacent_odds = categories
        .windows(2)
        .map(|pair| {
            let (lower, upper) = (&pair[0], &pair[1]);
            let (odds_ratio, ci) = woolf_odds_ratio(
                upper.events,
                upper.subjects - upper.events,
                lower.events,
                lower.subjects - lower.events,
            );
            AdjacentOddsRatio {
                lower: lower.name.clone(),
                upper: upper.name.clone(),
                odds_ratio,
                ci,
            }
        })
        .collect();

    StratificationTable {
        horizon,
        categories,
        adjacent_odds,
        indeterminate,
    }
}

/// Odds ratio (a/b) / (c/d) with the Woolf log-odds 95% interval, applying
/// the Haldane–Anscombe 0.5 correction when any cell is zero.
fn woolf_odds_ratio(a: usize, b: usize, c: usize, d: usize) -> (f64, (f64, f64)) {
    let needs_correction = a == 0 || b == 0 || c == 0 || d == 0;
    let correction = if needs_correction { 0.5 } else { 0.0 };
    let a = a as f64 + correction;
    let b = b as f64 + correction;
    let c = c as f64 + correction;
    let d = d as f64 + correction;

    let odds_ratio = (a * d) / (b * c);
    let se = (1.0 / a + 1.0 / b + 1.0 / c + 1.0 / d).sqrt();
    let log_or = odds_ratio.ln();
    let ci = (
        (log_or - 1.96 * se).exp(),
        (log_or + 1.96 * se).exp(),
    );
    (odds_ratio, ci)
}
