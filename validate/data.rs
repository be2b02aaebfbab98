//! # Data Loading and Validation Module
//!
//! The exclusive entry point for user-provided cohorts. It reads a tabular
//! TSV file, validates it against the schema implied by the configured
//! score table, and assembles the clean [`Cohort`] the statistical core
//! operates on.
//!
//! - Strict schema: the file must name exactly the covariates the score
//!   table references, plus `time_to_event` and `event`. An optional `id`
//!   column supplies subject identifiers; sequential ones are generated
//!   otherwise.
//! - Whole-file defects (a missing column, a non-numeric column, too few
//!   rows) are errors. Per-subject defects (non-positive time, values
//!   outside a component's plausible range, too many missing covariates)
//!   exclude that subject with a logged reason and leave the rest intact.

use crate::cohort::{Cohort, CohortError, Covariate, Subject};
use crate::config::{ComponentKindConfig, EngineConfig};
use log::{info, warn};
use polars::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

const MINIMUM_ROWS: usize = 10;

/// A comprehensive error type for all cohort loading failures.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    Polars(#[from] PolarsError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error(
        "The required column '{column_name}' could not be converted to the expected type '{expected_type}'. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error(
        "Input file contains only {found} data rows, but at least {required} are required for validation."
    )]
    InsufficientRows { found: usize, required: usize },
    #[error("Missing or null values were found in the required column '{0}'.")]
    MissingValues(String),
    #[error("Cohort construction failed: {0}")]
    Cohort(#[from] CohortError),
    #[error("No usable subjects remain after validation ({excluded} excluded).")]
    EmptyCohort { excluded: usize },
}

/// A validated cohort plus the number of subjects the loader excluded.
#[derive(Debug)]
pub struct LoadedCohort {
    pub cohort: Cohort,
    pub excluded: usize,
}

/// Loads a TSV cohort file against the schema of `config`'s score table.
pub fn load_cohort(path: &str, config: &EngineConfig) -> Result<LoadedCohort, DataError> {
    let df = read_table(path)?;

    if df.height() < MINIMUM_ROWS {
        return Err(DataError::InsufficientRows {
            found: df.height(),
            required: MINIMUM_ROWS,
        });
    }

    let columns: HashSet<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();
    for component in &config.score.components {
        if !columns.contains(&component.variable) {
            return Err(DataError::ColumnNotFound(component.variable.clone()));
        }
    }
    for required in ["time_to_event", "event"] {
        if !columns.contains(required) {
            return Err(DataError::ColumnNotFound(required.to_string()));
        }
    }

    let n = df.height();
    let times = extract_required_column(&df, "time_to_event")?;
    let events = extract_required_column(&df, "event")?;
    let ids = build_subject_ids(&df, n)?;

    // Covariate columns may contain nulls; missingness is judged per
    // subject against the configured budget.
    let mut covariates = Vec::with_capacity(config.score.components.len());
    for component in &config.score.components {
        covariates.push((component, extract_nullable_column(&df, &component.variable)?));
    }

    let max_missing = config.score.max_missing_components;
    let mut subjects = Vec::with_capacity(n);
    let mut excluded = 0usize;

    'rows: for row in 0..n {
        let id = &ids[row];
        let time = times[row];
        if !time.is_finite() || time <= 0.0 {
            warn!("excluding subject '{id}': non-positive time_to_event {time}");
            excluded += 1;
            continue;
        }
        let event = match events[row] {
            v if v == 0.0 => false,
            v if v == 1.0 => true,
            v => {
                warn!("excluding subject '{id}': event indicator {v} is not 0 or 1");
                excluded += 1;
                continue;
            }
        };

        let mut subject = Subject::new(id.clone(), time, event)?;
        let mut missing = 0usize;
        for (component, values) in &covariates {
            let Some(value) = values[row] else {
                missing += 1;
                continue;
            };
            let covariate = match component.kind {
                ComponentKindConfig::Continuous => {
                    if !value.is_finite() {
                        warn!(
                            "excluding subject '{id}': non-finite value for '{}'",
                            component.variable
                        );
                        excluded += 1;
                        continue 'rows;
                    }
                    if let Some([low, high]) = component.range
                        && !(low..=high).contains(&value)
                    {
                        warn!(
                            "excluding subject '{id}': '{}' = {value} outside plausible range [{low}, {high}]",
                            component.variable
                        );
                        excluded += 1;
                        continue 'rows;
                    }
                    Covariate::Continuous(value)
                }
                ComponentKindConfig::Binary => {
                    if value == 0.0 {
                        Covariate::Binary(false)
                    } else if value == 1.0 {
                        Covariate::Binary(true)
                    } else {
                        warn!(
                            "excluding subject '{id}': '{}' = {value} is not a 0/1 indicator",
                            component.variable
                        );
                        excluded += 1;
                        continue 'rows;
                    }
                }
            };
            subject = subject.with_covariate(component.variable.clone(), covariate)?;
        }

        if missing > max_missing {
            warn!(
                "excluding subject '{id}': {missing} missing covariates exceed the budget of {max_missing}"
            );
            excluded += 1;
            continue;
        }

        subjects.push(subject);
    }

    if subjects.is_empty() {
        return Err(DataError::EmptyCohort { excluded });
    }
    info!(
        "loaded {} subjects from '{path}' ({excluded} excluded)",
        subjects.len()
    );

    Ok(LoadedCohort {
        cohort: Cohort::new(subjects)?,
        excluded,
    })
}

fn read_table(path: &str) -> Result<DataFrame, DataError> {
    let df = CsvReader::new(File::open(Path::new(path))?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_parse_options(CsvParseOptions::default().with_separator(b'\t')),
        )
        .finish()?;
    Ok(df)
}

/// Extracts a fully populated numeric column.
fn extract_required_column(df: &DataFrame, column_name: &str) -> Result<Vec<f64>, DataError> {
    let series = df.column(column_name)?;
    if series.null_count() > 0 {
        return Err(DataError::MissingValues(column_name.to_string()));
    }
    let values = extract_nullable_column(df, column_name)?;
    // Nulls were ruled out above, so every entry is present.
    Ok(values.into_iter().map(|v| v.expect("no nulls")).collect())
}

/// Extracts a numeric column, preserving nulls as `None`.
fn extract_nullable_column(
    df: &DataFrame,
    column_name: &str,
) -> Result<Vec<Option<f64>>, DataError> {
    let series = df.column(column_name)?;
    let casted = match series.cast(&DataType::Float64) {
        Ok(casted) => casted,
        Err(_) => {
            return Err(DataError::ColumnWrongType {
                column_name: column_name.to_string(),
                expected_type: "f64 (numeric)",
                found_type: format!("{:?}", series.dtype()),
            });
        }
    };
    if casted.null_count() > series.null_count() {
        return Err(DataError::ColumnWrongType {
            column_name: column_name.to_string(),
            expected_type: "f64 (numeric)",
            found_type: format!("{:?}", series.dtype()),
        });
    }
    let chunked = casted.f64()?.rechunk();
    Ok(chunked.into_iter().collect())
}

/// Uses the `id` column when present and fully populated; generates
/// sequential identifiers otherwise.
fn build_subject_ids(df: &DataFrame, n: usize) -> Result<Vec<String>, DataError> {
    if !df.get_column_names().iter().any(|c| c == &"id") {
        return Ok((1..=n).map(|i| i.to_string()).collect());
    }
    let series = df.column("id")?;
    if series.null_count() > 0 {
        return Ok((1..=n).map(|i| i.to_string()).collect());
    }
    let mut ids = Vec::with_capacity(n);
    for i in 0..n {
        let value = series.get(i).unwrap_or(AnyValue::Null);
        let text = match value {
            AnyValue::Null => (i + 1).to_string(),
            _ => {
                let text = value.to_string();
                if text.is_empty() {
                    (i + 1).to_string()
                } else {
                    text.trim_matches('"').to_string()
                }
            }
        };
        ids.push(text);
    }
    Ok(ids)
}
