//! # Cohort Data Model
//!
//! This module defines the in-memory representation of a validated study
//! cohort. A `Cohort` is constructed exactly once (by the data loading layer
//! or by `landmark::LandmarkCohort`) and is immutable afterwards: no `&mut`
//! accessors are exposed, so a `&Cohort` can be shared freely across the
//! bootstrap worker threads.

use std::collections::HashMap;
use thiserror::Error;

/// Errors surfaced while constructing subjects or cohorts.
#[derive(Debug, Error)]
pub enum CohortError {
    #[error("subject '{id}' has non-positive time_to_event {time}")]
    NonPositiveTime { id: String, time: f64 },
    #[error("subject '{id}' has a non-finite value for covariate '{variable}'")]
    NonFiniteCovariate { id: String, variable: String },
    #[error("cohort contains duplicate subject id '{0}'")]
    DuplicateId(String),
}

/// A single observed covariate value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Covariate {
    Continuous(f64),
    Binary(bool),
}

impl Covariate {
    pub fn as_continuous(self) -> Option<f64> {
        match self {
            Covariate::Continuous(v) => Some(v),
            Covariate::Binary(_) => None,
        }
    }

    pub fn as_binary(self) -> Option<bool> {
        match self {
            Covariate::Binary(v) => Some(v),
            Covariate::Continuous(_) => None,
        }
    }
}

/// One subject: covariates plus the censored time-to-event outcome.
///
/// `time_to_event` is strictly positive. `event` records whether the outcome
/// was observed at that time (`true`) or the subject was censored (`false`).
/// Covariates a subject is missing are simply absent from the map; the load
/// layer enforces the bounded-missingness policy.
#[derive(Debug, Clone)]
pub struct Subject {
    id: String,
    values: HashMap<String, Covariate>,
    time_to_event: f64,
    event: bool,
}

impl Subject {
    pub fn new(
        id: impl Into<String>,
        time_to_event: f64,
        event: bool,
    ) -> Result<Self, CohortError> {
        let id = id.into();
        if !time_to_event.is_finite() || time_to_event <= 0.0 {
            return Err(CohortError::NonPositiveTime {
                id,
                time: time_to_event,
            });
        }
        Ok(Self {
            id,
            values: HashMap::new(),
            time_to_event,
            event,
        })
    }

    /// Builder-style covariate attachment.
    pub fn with_covariate(
        mut self,
        name: impl Into<String>,
        value: Covariate,
    ) -> Result<Self, CohortError> {
        let name = name.into();
        if let Covariate::Continuous(v) = value
            && !v.is_finite()
        {
            return Err(CohortError::NonFiniteCovariate {
                id: self.id.clone(),
                variable: name,
            });
        }
        self.values.insert(name, value);
        Ok(self)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn time_to_event(&self) -> f64 {
        self.time_to_event
    }

    pub fn event(&self) -> bool {
        self.event
    }

    pub fn covariate(&self, name: &str) -> Option<Covariate> {
        self.values.get(name).copied()
    }

    pub fn continuous(&self, name: &str) -> Option<f64> {
        self.covariate(name).and_then(Covariate::as_continuous)
    }

    pub fn binary(&self, name: &str) -> Option<bool> {
        self.covariate(name).and_then(Covariate::as_binary)
    }

    /// Outcome status at a prediction horizon.
    ///
    /// `Some(true)`: the event occurred at or before the horizon (a case).
    /// `Some(false)`: followed up beyond the horizon event-free (a control).
    /// `None`: censored at or before the horizon without the event, which is
    /// neither a confirmed case nor a valid control.
    pub fn outcome_at(&self, horizon: f64) -> Option<bool> {
        if self.event && self.time_to_event <= horizon {
            Some(true)
        } else if self.time_to_event > horizon {
            Some(false)
        } else {
            None
        }
    }

    /// Returns a copy with the time origin shifted forward by `offset`.
    /// Callers must guarantee `time_to_event > offset`.
    pub(crate) fn shifted_by(&self, offset: f64) -> Self {
        debug_assert!(self.time_to_event > offset);
        Self {
            id: self.id.clone(),
            values: self.values.clone(),
            time_to_event: self.time_to_event - offset,
            event: self.event,
        }
    }
}

/// An immutable, ordered collection of subjects with a consistent schema.
#[derive(Debug, Clone)]
pub struct Cohort {
    subjects: Vec<Subject>,
}

impl Cohort {
    /// Builds a cohort, rejecting duplicate subject identifiers.
    pub fn new(subjects: Vec<Subject>) -> Result<Self, CohortError> {
        let mut seen = std::collections::HashSet::with_capacity(subjects.len());
        for subject in &subjects {
            if !seen.insert(subject.id()) {
                return Err(CohortError::DuplicateId(subject.id().to_string()));
            }
        }
        Ok(Self { subjects })
    }

    /// Constructor for cohorts whose subjects are already vetted: landmark
    /// filtering (uniqueness preserved) and bootstrap resamples (duplicates
    /// are the point).
    pub(crate) fn new_unchecked(subjects: Vec<Subject>) -> Self {
        Self { subjects }
    }

    pub fn subjects(&self) -> &[Subject] {
        &self.subjects
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Subject> {
        self.subjects.iter()
    }

    /// Number of subjects whose event was observed (at any follow-up time).
    pub fn event_count(&self) -> usize {
        self.subjects.iter().filter(|s| s.event()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(id: &str, time: f64, event: bool) -> Subject {
        Subject::new(id, time, event).unwrap()
    }

    #[test]
    fn non_positive_time_is_rejected() {
        let err = Subject::new("s1", 0.0, true).unwrap_err();
        match err {
            CohortError::NonPositiveTime { id, time } => {
                assert_eq!(id, "s1");
                assert_eq!(time, 0.0);
            }
            other => panic!("expected NonPositiveTime, got {other:?}"),
        }
        assert!(Subject::new("s2", -3.0, false).is_err());
    }

    #[test]
    fn non_finite_covariate_is_rejected() {
        let err = subject("s1", 10.0, false)
            .with_covariate("meld", Covariate::Continuous(f64::NAN))
            .unwrap_err();
        assert!(matches!(err, CohortError::NonFiniteCovariate { .. }));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = Cohort::new(vec![subject("a", 1.0, true), subject("a", 2.0, false)])
            .unwrap_err();
        assert!(matches!(err, CohortError::DuplicateId(id) if id == "a"));
    }

    #[test]
    fn covariate_accessors_distinguish_kinds() {
        let s = subject("s1", 12.0, true)
            .with_covariate("meld", Covariate::Continuous(24.0))
            .unwrap()
            .with_covariate("hcc", Covariate::Binary(true))
            .unwrap();
        assert_eq!(s.continuous("meld"), Some(24.0));
        assert_eq!(s.binary("hcc"), Some(true));
        assert_eq!(s.continuous("hcc"), None);
        assert_eq!(s.binary("meld"), None);
        assert_eq!(s.covariate("platelets"), None);
    }

    #[test]
    fn outcome_at_partitions_cases_controls_and_censored() {
        // Event before the horizon: case.
        assert_eq!(subject("a", 20.0, true).outcome_at(30.0), Some(true));
        // Followed past the horizon: control, whether censored later or not.
        assert_eq!(subject("b", 45.0, false).outcome_at(30.0), Some(false));
        assert_eq!(subject("c", 45.0, true).outcome_at(30.0), Some(false));
        // Censored before the horizon without the event: ambiguous.
        assert_eq!(subject("d", 20.0, false).outcome_at(30.0), None);
        // Event exactly at the horizon still counts as a case.
        assert_eq!(subject("e", 30.0, true).outcome_at(30.0), Some(true));
    }
}
