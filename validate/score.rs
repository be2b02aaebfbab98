//! # Point-Sum Score Definition and Calculator
//!
//! A risk score is an ordered table of components, each a predicate over one
//! covariate worth a fixed number of points. The maximum achievable score is
//! derived exactly once, by [`ScoreDefinition::max_score`], from the same
//! table used to assign points; every consumer that reports "out of N" must
//! read N from there.

use crate::cohort::{Cohort, Subject};
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Side of the cut value that scores points for a continuous component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Points are scored when the observed value is strictly above the cut.
    Above,
    /// Points are scored when the observed value is strictly below the cut.
    Below,
}

impl Direction {
    pub fn triggers(self, value: f64, cut: f64) -> bool {
        match self {
            Direction::Above => value > cut,
            Direction::Below => value < cut,
        }
    }
}

/// Predicate kind of one score component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ComponentKind {
    /// Dichotomized continuous covariate: strict `>` or `<` against a cut.
    Continuous { direction: Direction, cut: f64 },
    /// Boolean covariate scoring points when present.
    Binary,
}

/// One (variable, predicate, weight) row of the score table.
#[derive(Debug, Clone)]
pub struct ScoreComponent {
    pub variable: String,
    pub kind: ComponentKind,
    pub points: u32,
}

impl ScoreComponent {
    /// Evaluates the component against a subject. `None` means the covariate
    /// is missing (as opposed to present but not scoring).
    fn evaluate(&self, subject: &Subject) -> Option<u32> {
        match self.kind {
            ComponentKind::Continuous { direction, cut } => subject
                .continuous(&self.variable)
                .map(|v| if direction.triggers(v, cut) { self.points } else { 0 }),
            ComponentKind::Binary => subject
                .binary(&self.variable)
                .map(|v| if v { self.points } else { 0 }),
        }
    }
}

/// Errors surfaced while building a score definition or scoring a subject.
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("score definition lists variable '{0}' more than once")]
    DuplicateVariable(String),
    #[error("score definition has no components")]
    EmptyDefinition,
    #[error(
        "subject '{id}' is missing {missing} required covariate(s) ({variables:?}) with a budget of {budget}"
    )]
    MissingCovariate {
        id: String,
        missing: usize,
        variables: Vec<String>,
        budget: usize,
    },
}

/// The ordered score table. Immutable once built; re-deriving cut points
/// (e.g. on a bootstrap resample) produces a new definition via
/// [`ScoreDefinition::with_cut`].
#[derive(Debug, Clone)]
pub struct ScoreDefinition {
    components: Vec<ScoreComponent>,
}

impl ScoreDefinition {
    pub fn new(components: Vec<ScoreComponent>) -> Result<Self, ScoreError> {
        if components.is_empty() {
            return Err(ScoreError::EmptyDefinition);
        }
        let mut seen = std::collections::HashSet::new();
        for component in &components {
            if !seen.insert(component.variable.as_str()) {
                return Err(ScoreError::DuplicateVariable(component.variable.clone()));
            }
        }
        Ok(Self { components })
    }

    pub fn components(&self) -> &[ScoreComponent] {
        &self.components
    }

    /// The single canonical maximum achievable score: the sum of all
    /// component weights. Never recompute this anywhere else.
    pub fn max_score(&self) -> u32 {
        self.components.iter().map(|c| c.points).sum()
    }

    /// Returns a copy with the cut value of one continuous component
    /// replaced. Unknown or binary variables are left untouched.
    pub fn with_cut(&self, variable: &str, cut: f64) -> Self {
        let mut components = self.components.clone();
        for component in &mut components {
            if component.variable == variable
                && let ComponentKind::Continuous { direction, .. } = component.kind
            {
                component.kind = ComponentKind::Continuous { direction, cut };
            }
        }
        Self { components }
    }
}

/// Missing-data policy for scoring: up to `max_missing` absent components
/// contribute zero points (with a warning); beyond that the subject fails.
#[derive(Debug, Clone, Copy)]
pub struct ScorePolicy {
    pub max_missing: usize,
}

impl Default for ScorePolicy {
    fn default() -> Self {
        Self { max_missing: 0 }
    }
}

/// Per-subject scoring detail: the total plus each component's contribution
/// and the components that were absent.
#[derive(Debug, Clone)]
pub struct ScoreBreakdown {
    pub total: u32,
    pub contributions: Vec<(String, u32)>,
    pub missing: Vec<String>,
}

/// Scores for a whole cohort, aligned index-for-index with its subjects.
/// `None` marks a subject excluded under the missing-data policy.
#[derive(Debug, Clone)]
pub struct CohortScores {
    pub by_subject: Vec<Option<u32>>,
    pub excluded: usize,
}

/// Computes the integer score of one subject. Pure and deterministic: the
/// same definition and covariates always produce the same breakdown.
pub fn score_subject(
    definition: &ScoreDefinition,
    subject: &Subject,
    policy: ScorePolicy,
) -> Result<ScoreBreakdown, ScoreError> {
    let mut total = 0u32;
    let mut contributions = Vec::with_capacity(definition.components().len());
    let mut missing = Vec::new();

    for component in definition.components() {
        match component.evaluate(subject) {
            Some(points) => {
                total += points;
                contributions.push((component.variable.clone(), points));
            }
            None => missing.push(component.variable.clone()),
        }
    }

    if missing.len() > policy.max_missing {
        return Err(ScoreError::MissingCovariate {
            id: subject.id().to_string(),
            missing: missing.len(),
            variables: missing,
            budget: policy.max_missing,
        });
    }

    Ok(ScoreBreakdown {
        total,
        contributions,
        missing,
    })
}

/// Scores every subject in a cohort. Per-subject failures are isolated:
/// the failing subject is excluded with a logged reason and the rest of the
/// cohort is unaffected.
pub fn score_cohort(
    definition: &ScoreDefinition,
    cohort: &Cohort,
    policy: ScorePolicy,
) -> CohortScores {
    let mut by_subject = Vec::with_capacity(cohort.len());
    let mut excluded = 0usize;
    for subject in cohort.iter() {
        match score_subject(definition, subject, policy) {
            Ok(breakdown) => by_subject.push(Some(breakdown.total)),
            Err(err) => {
                warn!("excluding subject from scoring: {err}");
                by_subject.push(None);
                excluded += 1;
            }
        }
    }
    CohortScores {
        by_subject,
        excluded,
    }
}
