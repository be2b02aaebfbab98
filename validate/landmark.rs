//! # Landmark Cohort Construction
//!
//! Landmarking removes immortal-time bias: analysis at landmark day τ is
//! restricted to subjects still at risk at τ, so a subject who reached the
//! outcome before τ cannot appear as a long-term survivor with a favorable
//! score. Each call produces an independently owned cohort; building cohorts
//! for several landmark days never shares mutable state.

use crate::cohort::Cohort;
use log::debug;

/// A cohort restricted to subjects at risk at the landmark day, with the
/// time origin shifted to that day. Discarded once the corresponding
/// analysis completes.
#[derive(Debug, Clone)]
pub struct LandmarkCohort {
    day: f64,
    cohort: Cohort,
    source_size: usize,
}

impl LandmarkCohort {
    /// Builds the landmark cohort for `day`: retain subjects with
    /// `time_to_event > day`, shift their times by `-day`, and carry the
    /// event indicator relative to the new origin. Shifted times are
    /// strictly positive by construction.
    pub fn build(cohort: &Cohort, day: f64) -> Self {
        assert!(day >= 0.0 && day.is_finite(), "landmark day must be a finite non-negative number");
        let retained: Vec<_> = cohort
            .iter()
            .filter(|s| s.time_to_event() > day)
            .map(|s| s.shifted_by(day))
            .collect();
        debug!(
            "landmark day {day}: retained {} of {} subjects",
            retained.len(),
            cohort.len()
        );
        Self {
            day,
            cohort: Cohort::new_unchecked(retained),
            source_size: cohort.len(),
        }
    }

    pub fn day(&self) -> f64 {
        self.day
    }

    pub fn cohort(&self) -> &Cohort {
        &self.cohort
    }

    /// Size of the cohort the landmark was built from.
    pub fn source_size(&self) -> usize {
        self.source_size
    }
}
