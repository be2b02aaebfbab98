//! # Configuration Surface
//!
//! One human-readable TOML file describes everything the engine needs: the
//! score table (variables, predicates, weights), the risk partition, and the
//! resampling settings. The file is validated once at load time; every
//! inconsistency is fatal at startup rather than silently repaired.

use crate::metrics::MetricKind;
use crate::score::{
    ComponentKind, Direction, ScoreComponent, ScoreDefinition, ScoreError, ScorePolicy,
};
use crate::stratify::{RiskCategory, RiskPartition, StratifyError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use thiserror::Error;

/// A comprehensive error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse the configuration file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("could not serialize the configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid score table: {0}")]
    Score(#[from] ScoreError),
    #[error("invalid risk partition: {0}")]
    Partition(#[from] StratifyError),
    #[error("continuous component '{0}' must declare a direction")]
    MissingDirection(String),
    #[error("binary component '{0}' must not declare a direction, cut, or range")]
    BinaryWithPredicate(String),
    #[error("component '{variable}' has an empty plausible range [{low}, {high}]")]
    InvalidRange {
        variable: String,
        low: f64,
        high: f64,
    },
    #[error("continuous component '{0}' has no configured cut; run the validation pipeline or set one explicitly")]
    MissingCut(String),
    #[error("bootstrap_iterations must be at least 1")]
    NoIterations,
    #[error("skip_tolerance must lie in (0, 1), got {0}")]
    BadTolerance(f64),
    #[error("{0} must not be empty")]
    EmptyList(&'static str),
}

/// Predicate kind of a configured component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKindConfig {
    Continuous,
    Binary,
}

/// One row of the configured score table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentConfig {
    pub variable: String,
    pub kind: ComponentKindConfig,
    pub points: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    /// Fixed cut value; derived from the data when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cut: Option<f64>,
    /// Plausible value range enforced at load time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<[f64; 2]>,
}

/// The score section: component table plus the missing-data budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreConfig {
    #[serde(default = "default_max_missing")]
    pub max_missing_components: usize,
    #[serde(rename = "component")]
    pub components: Vec<ComponentConfig>,
}

fn default_max_missing() -> usize {
    2
}

/// The risk section: the ordinal category partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(rename = "category")]
    pub categories: Vec<RiskCategory>,
}

/// Resampling and evaluation-grid settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSettings {
    #[serde(default = "default_iterations")]
    pub bootstrap_iterations: usize,
    #[serde(default = "default_landmark_days")]
    pub landmark_days: Vec<f64>,
    #[serde(default = "default_horizons")]
    pub horizons: Vec<f64>,
    /// Landmark day the bootstrap reports and risk table are computed at.
    #[serde(default = "default_primary_landmark")]
    pub primary_landmark: f64,
    /// Horizon the bootstrap reports and risk table are computed at.
    #[serde(default = "default_primary_horizon")]
    pub primary_horizon: f64,
    #[serde(default = "default_metrics")]
    pub metrics: Vec<MetricKind>,
    #[serde(default = "default_skip_tolerance")]
    pub skip_tolerance: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_iterations() -> usize {
    1000
}

fn default_landmark_days() -> Vec<f64> {
    vec![3.0, 5.0, 7.0]
}

fn default_horizons() -> Vec<f64> {
    vec![30.0, 60.0, 90.0]
}

fn default_primary_landmark() -> f64 {
    7.0
}

fn default_primary_horizon() -> f64 {
    90.0
}

fn default_metrics() -> Vec<MetricKind> {
    vec![MetricKind::Auc, MetricKind::CIndex, MetricKind::Brier]
}

fn default_skip_tolerance() -> f64 {
    0.05
}

fn default_seed() -> u64 {
    42
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            bootstrap_iterations: default_iterations(),
            landmark_days: default_landmark_days(),
            horizons: default_horizons(),
            primary_landmark: default_primary_landmark(),
            primary_horizon: default_primary_horizon(),
            metrics: default_metrics(),
            skip_tolerance: default_skip_tolerance(),
            seed: default_seed(),
        }
    }
}

/// The whole configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub score: ScoreConfig,
    pub risk: RiskConfig,
    #[serde(default)]
    pub validation: ValidationSettings,
}

impl EngineConfig {
    /// Loads and validates a TOML configuration file.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration in a human-readable TOML format.
    pub fn save(&self, path: &str) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }

    /// Structural validation beyond what serde enforces.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for component in &self.score.components {
            match component.kind {
                ComponentKindConfig::Continuous => {
                    if component.direction.is_none() {
                        return Err(ConfigError::MissingDirection(component.variable.clone()));
                    }
                    if let Some([low, high]) = component.range
                        && low >= high
                    {
                        return Err(ConfigError::InvalidRange {
                            variable: component.variable.clone(),
                            low,
                            high,
                        });
                    }
                }
                ComponentKindConfig::Binary => {
                    if component.direction.is_some()
                        || component.cut.is_some()
                        || component.range.is_some()
                    {
                        return Err(ConfigError::BinaryWithPredicate(
                            component.variable.clone(),
                        ));
                    }
                }
            }
        }
        if self.validation.bootstrap_iterations == 0 {
            return Err(ConfigError::NoIterations);
        }
        let tolerance = self.validation.skip_tolerance;
        if !(tolerance > 0.0 && tolerance < 1.0) {
            return Err(ConfigError::BadTolerance(tolerance));
        }
        if self.validation.landmark_days.is_empty() {
            return Err(ConfigError::EmptyList("landmark_days"));
        }
        if self.validation.horizons.is_empty() {
            return Err(ConfigError::EmptyList("horizons"));
        }
        if self.validation.metrics.is_empty() {
            return Err(ConfigError::EmptyList("metrics"));
        }

        // Build the derived objects once to surface table and partition
        // defects (duplicates, tiling) at startup.
        let definition = self.base_definition()?;
        self.partition(definition.max_score())?;
        Ok(())
    }

    /// The score definition with configured cuts where present and NaN
    /// placeholders otherwise. The validation pipeline re-derives every
    /// continuous cut before any evaluation, so placeholders never reach a
    /// comparison.
    pub fn base_definition(&self) -> Result<ScoreDefinition, ConfigError> {
        self.definition_with(|component| Ok(component.cut.unwrap_or(f64::NAN)))
    }

    /// The score definition with every continuous cut fixed in the
    /// configuration; required for standalone scoring.
    pub fn fixed_definition(&self) -> Result<ScoreDefinition, ConfigError> {
        self.definition_with(|component| {
            component
                .cut
                .ok_or_else(|| ConfigError::MissingCut(component.variable.clone()))
        })
    }

    fn definition_with(
        &self,
        cut_of: impl Fn(&ComponentConfig) -> Result<f64, ConfigError>,
    ) -> Result<ScoreDefinition, ConfigError> {
        let mut components = Vec::with_capacity(self.score.components.len());
        for config in &self.score.components {
            let kind = match config.kind {
                ComponentKindConfig::Continuous => {
                    let direction = config
                        .direction
                        .ok_or_else(|| ConfigError::MissingDirection(config.variable.clone()))?;
                    ComponentKind::Continuous {
                        direction,
                        cut: cut_of(config)?,
                    }
                }
                ComponentKindConfig::Binary => ComponentKind::Binary,
            };
            components.push(ScoreComponent {
                variable: config.variable.clone(),
                kind,
                points: config.points,
            });
        }
        Ok(ScoreDefinition::new(components)?)
    }

    /// The risk partition, validated against the canonical maximum score.
    pub fn partition(&self, max_score: u32) -> Result<RiskPartition, ConfigError> {
        Ok(RiskPartition::new(self.risk.categories.clone(), max_score)?)
    }

    pub fn policy(&self) -> ScorePolicy {
        ScorePolicy {
            max_missing: self.score.max_missing_components,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
[score]
max_missing_components = 2

[[score.component]]
variable = "meld"
kind = "continuous"
direction = "above"
points = 2
range = [6.0, 40.0]

[[score.component]]
variable = "platelets"
kind = "continuous"
direction = "below"
points = 1
cut = 78.0

[[score.component]]
variable = "hcc"
kind = "binary"
points = 1

[[risk.category]]
name = "low"
min = 0
max = 1

[[risk.category]]
name = "high"
min = 2
max = 4

[validation]
bootstrap_iterations = 200
landmark_days = [3.0, 5.0, 7.0]
horizons = [30.0, 60.0, 90.0]
primary_landmark = 7.0
primary_horizon = 90.0
metrics = ["auc", "cindex"]
skip_tolerance = 0.05
seed = 42
"#;

    fn example_config() -> EngineConfig {
        let config: EngineConfig = toml::from_str(EXAMPLE).unwrap();
        config.validate().unwrap();
        config
    }

    #[test]
    fn example_configuration_round_trips() {
        let config = example_config();
        assert_eq!(config.score.components.len(), 3);
        assert_eq!(config.validation.bootstrap_iterations, 200);
        assert_eq!(
            config.validation.metrics,
            vec![MetricKind::Auc, MetricKind::CIndex]
        );

        let serialized = toml::to_string_pretty(&config).unwrap();
        let reparsed: EngineConfig = toml::from_str(&serialized).unwrap();
        reparsed.validate().unwrap();
        assert_eq!(
            reparsed.score.components[1].cut,
            config.score.components[1].cut
        );
    }

    #[test]
    fn validation_settings_default_when_omitted() {
        let minimal = r#"
[score]
[[score.component]]
variable = "marker"
kind = "continuous"
direction = "above"
points = 1

[[risk.category]]
name = "all"
min = 0
max = 1
"#;
        let config: EngineConfig = toml::from_str(minimal).unwrap();
        config.validate().unwrap();
        assert_eq!(config.validation.bootstrap_iterations, 1000);
        assert_eq!(config.validation.landmark_days, vec![3.0, 5.0, 7.0]);
        assert_eq!(config.validation.horizons, vec![30.0, 60.0, 90.0]);
        assert_eq!(config.validation.skip_tolerance, 0.05);
        assert_eq!(config.validation.seed, 42);
        assert_eq!(config.score.max_missing_components, 2);
    }

    #[test]
    fn continuous_without_direction_is_rejected() {
        let broken = r#"
[score]
[[score.component]]
variable = "marker"
kind = "continuous"
points = 1

[[risk.category]]
name = "all"
min = 0
max = 1
"#;
        let config: EngineConfig = toml::from_str(broken).unwrap();
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::MissingDirection(v) if v == "marker"
        ));
    }

    #[test]
    fn binary_with_cut_is_rejected() {
        let broken = r#"
[score]
[[score.component]]
variable = "hcc"
kind = "binary"
points = 1
cut = 3.0

[[risk.category]]
name = "all"
min = 0
max = 1
"#;
        let config: EngineConfig = toml::from_str(broken).unwrap();
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::BinaryWithPredicate(_)
        ));
    }

    #[test]
    fn partition_must_tile_the_derived_max_score() {
        // Components sum to 4 but the partition stops at 3.
        let broken = r#"
[score]
[[score.component]]
variable = "a"
kind = "binary"
points = 2

[[score.component]]
variable = "b"
kind = "binary"
points = 2

[[risk.category]]
name = "low"
min = 0
max = 1

[[risk.category]]
name = "high"
min = 2
max = 3
"#;
        let config: EngineConfig = toml::from_str(broken).unwrap();
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::Partition(StratifyError::WrongUpperBound { .. })
        ));
    }

    #[test]
    fn fixed_definition_requires_every_cut() {
        let config = example_config();
        // "meld" has no configured cut.
        assert!(matches!(
            config.fixed_definition().unwrap_err(),
            ConfigError::MissingCut(v) if v == "meld"
        ));

        let mut pinned = config.clone();
        pinned.score.components[0].cut = Some(20.0);
        let definition = pinned.fixed_definition().unwrap();
        assert_eq!(definition.max_score(), 4);
    }

    #[test]
    fn zero_iterations_and_bad_tolerance_are_rejected() {
        let mut config = example_config();
        config.validation.bootstrap_iterations = 0;
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::NoIterations
        ));

        let mut config = example_config();
        config.validation.skip_tolerance = 1.5;
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::BadTolerance(_)
        ));
    }

    #[test]
    fn save_and_load_round_trip_through_a_file() {
        let config = example_config();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        config.save(path.to_str().unwrap()).unwrap();
        let loaded = EngineConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded.score.components.len(), 3);
        assert_eq!(loaded.validation.seed, 42);
    }
}
