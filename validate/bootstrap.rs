//! # Bootstrap Bias Correction
//!
//! Internal validation by optimism correction (Harrell). Each iteration
//! draws a with-replacement resample of the original cohort, re-derives
//! every cut point on it, and measures the resulting model twice: on the
//! resample itself (apparent) and on the original cohort (test). The mean
//! of `apparent - test` across iterations estimates the optimism of the
//! originally derived model, and subtracting it yields the bias-corrected
//! performance.
//!
//! Iterations are independent given a read-only snapshot of the original
//! cohort, so they fan out over a rayon pool; per-worker accumulators are
//! merged reduce-style at the end, and a shared atomic flag cancels the
//! remaining work once the skip tolerance is mathematically breached.

use crate::cohort::Cohort;
use crate::landmark::LandmarkCohort;
use crate::metrics::{MetricKind, percentile};
use crate::score::{ComponentKind, ScoreDefinition, ScorePolicy, score_cohort};
use crate::thresholds::derive_cut;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, warn};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use thiserror::Error;

/// Errors surfaced by the validation orchestrator.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(
        "metric '{metric}' is not evaluable on the original cohort at landmark {landmark_day}, horizon {horizon} (an outcome class is empty)"
    )]
    BaselineNotEvaluable {
        metric: &'static str,
        landmark_day: f64,
        horizon: f64,
    },
    #[error(
        "bootstrap unstable: {skipped} of {iterations} iterations were not evaluable (tolerance {tolerance}); the cohort is too small or the outcome too rare for reliable resampling"
    )]
    UnstableBootstrap {
        skipped: usize,
        iterations: usize,
        tolerance: f64,
    },
}

/// Resampling parameters.
#[derive(Debug, Clone, Copy)]
pub struct BootstrapSettings {
    pub iterations: usize,
    pub skip_tolerance: f64,
    pub seed: u64,
    pub show_progress: bool,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            iterations: 1000,
            skip_tolerance: 0.05,
            seed: 42,
            show_progress: false,
        }
    }
}

/// Bias-corrected, confidence-bounded performance for one metric at one
/// (landmark, horizon) pair, aggregated across iterations.
#[derive(Debug, Clone)]
pub struct BootstrapReport {
    pub metric: MetricKind,
    pub landmark_day: f64,
    pub horizon: f64,
    /// Performance of the originally derived model on the original cohort.
    pub apparent: f64,
    /// Mean test performance of resample-derived models on the original cohort.
    pub mean_test: f64,
    /// Mean of apparent - test across evaluable iterations.
    pub mean_optimism: f64,
    /// `apparent - mean_optimism`, by construction.
    pub corrected: f64,
    /// 2.5th/97.5th percentiles of the per-iteration test performance.
    pub ci: (f64, f64),
    pub evaluated: usize,
    pub skipped: usize,
}

/// Per-worker running aggregate; order-independent, merged at the end.
#[derive(Default)]
struct Accumulator {
    optimism_sum: f64,
    test_values: Vec<f64>,
    skipped: usize,
}

impl Accumulator {
    fn merge(mut self, other: Self) -> Self {
        self.optimism_sum += other.optimism_sum;
        self.test_values.extend(other.test_values);
        self.skipped += other.skipped;
        self
    }
}

/// Orchestrates the resampling loop over a read-only cohort snapshot.
pub struct BootstrapValidator<'a> {
    cohort: &'a Cohort,
    definition: &'a ScoreDefinition,
    policy: ScorePolicy,
    settings: BootstrapSettings,
}

impl<'a> BootstrapValidator<'a> {
    pub fn new(
        cohort: &'a Cohort,
        definition: &'a ScoreDefinition,
        policy: ScorePolicy,
        settings: BootstrapSettings,
    ) -> Self {
        Self {
            cohort,
            definition,
            policy,
            settings,
        }
    }

    /// Runs the full optimism-correction procedure for one metric at one
    /// (landmark, horizon) pair.
    pub fn validate(
        &self,
        metric: MetricKind,
        landmark_day: f64,
        horizon: f64,
    ) -> Result<BootstrapReport, BootstrapError> {
        let iterations = self.settings.iterations;
        debug!(
            "bootstrap: metric={} landmark={landmark_day} horizon={horizon} iterations={iterations} ({} subjects, {} events)",
            metric.name(),
            self.cohort.len(),
            self.cohort.event_count(),
        );

        let original_landmark = LandmarkCohort::build(self.cohort, landmark_day);

        // Apparent performance of the originally derived model.
        let apparent = fit_definition(&original_landmark, self.definition, horizon)
            .and_then(|definition| {
                evaluate(&definition, &original_landmark, metric, horizon, self.policy)
            })
            .ok_or(BootstrapError::BaselineNotEvaluable {
                metric: metric.name(),
                landmark_day,
                horizon,
            })?;

        // Cooperative cancellation: once more iterations have been skipped
        // than the tolerance allows, the run is doomed and the remaining
        // workers stop early without touching the partial aggregates.
        let max_skips = (self.settings.skip_tolerance * iterations as f64).floor() as usize;
        let cancelled = AtomicBool::new(false);
        let skip_count = AtomicUsize::new(0);

        let progress = if self.settings.show_progress {
            let bar = ProgressBar::new(iterations as u64);
            bar.set_style(
                ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len}")
                    .expect("static progress template")
                    .progress_chars("=> "),
            );
            bar.set_message(format!("bootstrap {}", metric.name()));
            Some(bar)
        } else {
            None
        };

        let accumulated = (0..iterations)
            .into_par_iter()
            .fold(Accumulator::default, |mut acc, iteration| {
                if cancelled.load(Ordering::Relaxed) {
                    return acc;
                }
                // Seeded per iteration so results do not depend on thread
                // scheduling.
                let mut rng =
                    StdRng::seed_from_u64(self.settings.seed.wrapping_add(iteration as u64));
                let sample = resample(self.cohort, &mut rng);

                let outcome = (|| {
                    let dev_landmark = LandmarkCohort::build(&sample, landmark_day);
                    let definition = fit_definition(&dev_landmark, self.definition, horizon)?;
                    let apparent_b =
                        evaluate(&definition, &dev_landmark, metric, horizon, self.policy)?;
                    let test_b =
                        evaluate(&definition, &original_landmark, metric, horizon, self.policy)?;
                    Some((apparent_b, test_b))
                })();

                match outcome {
                    Some((apparent_b, test_b)) => {
                        acc.optimism_sum += apparent_b - test_b;
                        acc.test_values.push(test_b);
                    }
                    None => {
                        acc.skipped += 1;
                        let skipped_so_far = skip_count.fetch_add(1, Ordering::Relaxed) + 1;
                        if skipped_so_far > max_skips {
                            cancelled.store(true, Ordering::Relaxed);
                        }
                    }
                }
                if let Some(bar) = &progress {
                    bar.inc(1);
                }
                acc
            })
            .reduce(Accumulator::default, Accumulator::merge);

        if let Some(bar) = &progress {
            bar.finish_and_clear();
        }

        let skipped = accumulated.skipped;
        let evaluated = accumulated.test_values.len();
        let skip_rate = skipped as f64 / iterations as f64;
        if evaluated == 0 || skip_rate > self.settings.skip_tolerance {
            return Err(BootstrapError::UnstableBootstrap {
                skipped,
                iterations,
                tolerance: self.settings.skip_tolerance,
            });
        }
        if skipped > 0 {
            warn!(
                "bootstrap for '{}': {skipped} of {iterations} iterations skipped (within tolerance)",
                metric.name()
            );
        }

        let test_values = Array1::from_vec(accumulated.test_values);
        let mean_optimism = accumulated.optimism_sum / evaluated as f64;
        let ci = (percentile(&test_values, 2.5), percentile(&test_values, 97.5));

        Ok(BootstrapReport {
            metric,
            landmark_day,
            horizon,
            apparent,
            mean_test: test_values.mean().expect("at least one evaluated iteration"),
            mean_optimism,
            corrected: apparent - mean_optimism,
            ci,
            evaluated,
            skipped,
        })
    }
}

/// Draws a with-replacement sample of the same size as the cohort; the
/// sample is a private, iteration-local copy.
fn resample(cohort: &Cohort, rng: &mut StdRng) -> Cohort {
    let subjects = cohort.subjects();
    let n = subjects.len();
    let drawn = (0..n)
        .map(|_| subjects[rng.gen_range(0..n)].clone())
        .collect();
    Cohort::new_unchecked(drawn)
}

/// Re-derives every continuous component's cut on the development landmark
/// cohort. `None` when any covariate's threshold is not derivable there
/// (the iteration counts as skipped).
fn fit_definition(
    development: &LandmarkCohort,
    base: &ScoreDefinition,
    horizon: f64,
) -> Option<ScoreDefinition> {
    let mut definition = base.clone();
    for component in base.components() {
        if let ComponentKind::Continuous { direction, .. } = component.kind {
            let cut = derive_cut(
                development.cohort(),
                &component.variable,
                direction,
                horizon,
            )
            .ok()?;
            definition = definition.with_cut(&component.variable, cut.cut);
        }
    }
    Some(definition)
}

/// Scores the evaluation landmark cohort with a fitted definition and
/// computes the metric. `None` when the metric is non-evaluable there.
fn evaluate(
    definition: &ScoreDefinition,
    evaluation: &LandmarkCohort,
    metric: MetricKind,
    horizon: f64,
    policy: ScorePolicy,
) -> Option<f64> {
    let scores = score_cohort(definition, evaluation.cohort(), policy);
    metric.compute(evaluation, &scores, horizon, definition.max_score())
}
