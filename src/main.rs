use prognos::bootstrap::{BootstrapSettings, BootstrapValidator};
use prognos::config::EngineConfig;
use prognos::data::load_cohort;
use prognos::landmark::LandmarkCohort;
use prognos::report;
use prognos::roc::time_dependent_roc;
use prognos::score::{ComponentKind, score_cohort};
use prognos::stratify::stratify;
use prognos::thresholds::ThresholdOptimizer;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(
    name = "prognos",
    about = "Internally validate integer clinical risk scores",
    long_about = "A batch validation engine for point-sum clinical risk scores: \
                 Youden-index cut-point discovery, landmark analysis against immortal-time bias, \
                 time-dependent ROC curves, and bootstrap bias-corrected performance estimates."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full internal validation pipeline
    #[command(about = "Validate a risk score against a cohort (outputs: TSV artifacts)")]
    Validate {
        /// Path to the cohort TSV file with id, covariate, time_to_event and event columns
        cohort: String,

        /// Path to the TOML configuration (score table, risk partition, settings)
        #[arg(long)]
        config: String,

        /// Directory the TSV artifacts are written to
        #[arg(long, default_value = "validation_out")]
        out_dir: PathBuf,

        /// Suppress the bootstrap progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Apply a fully configured score to a cohort
    #[command(about = "Score subjects with fixed cut points (outputs: scores.tsv)")]
    Score {
        /// Path to the cohort TSV file
        cohort: String,

        /// Path to the TOML configuration; every continuous component needs a cut
        #[arg(long)]
        config: String,

        /// Output file for the per-subject scores
        #[arg(long, default_value = "scores.tsv")]
        output: PathBuf,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate {
            cohort,
            config,
            out_dir,
            no_progress,
        } => validate_command(&cohort, &config, &out_dir, !no_progress),
        Commands::Score {
            cohort,
            config,
            output,
        } => score_command(&cohort, &config, &output),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn validate_command(
    cohort_path: &str,
    config_path: &str,
    out_dir: &Path,
    show_progress: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Loading configuration from: {config_path}");
    let config = EngineConfig::load(config_path)?;
    let base_definition = config.base_definition()?;
    let max_score = base_definition.max_score();
    let partition = config.partition(max_score)?;
    let policy = config.policy();
    let settings = &config.validation;

    println!("Loading cohort from: {cohort_path}");
    let loaded = load_cohort(cohort_path, &config)?;
    println!(
        "Loaded {} subjects ({} excluded); maximum score {max_score}",
        loaded.cohort.len(),
        loaded.excluded
    );

    std::fs::create_dir_all(out_dir)?;

    // Derive the reported thresholds (with bootstrap confidence bounds) on
    // the full cohort at the primary horizon.
    println!(
        "Deriving optimal cut points at horizon {}...",
        settings.primary_horizon
    );
    let optimizer = ThresholdOptimizer::new(settings.bootstrap_iterations, settings.seed);
    let mut thresholds = Vec::new();
    let mut definition = base_definition.clone();
    for component in base_definition.components() {
        if let ComponentKind::Continuous { direction, .. } = component.kind {
            let threshold = optimizer.optimize(
                &loaded.cohort,
                &component.variable,
                direction,
                settings.primary_horizon,
            )?;
            println!(
                "  {} {:?} {:.3} (Youden {:.3})",
                threshold.variable, threshold.direction, threshold.cut, threshold.youden
            );
            definition = definition.with_cut(&component.variable, threshold.cut);
            thresholds.push(threshold);
        }
    }
    report::write_thresholds(&out_dir.join("thresholds.tsv"), &thresholds)?;

    // Time-dependent ROC over the full (landmark, horizon) grid.
    println!("Computing time-dependent ROC curves...");
    let mut roc_results = Vec::new();
    for &day in &settings.landmark_days {
        let landmark = LandmarkCohort::build(&loaded.cohort, day);
        let scores = score_cohort(&definition, landmark.cohort(), policy);
        for &horizon in &settings.horizons {
            match time_dependent_roc(&landmark, &scores, horizon) {
                Some(result) => {
                    println!(
                        "  landmark {day}, horizon {horizon}: AUC {:.3} ({} cases / {} controls)",
                        result.auc, result.cases, result.controls
                    );
                    roc_results.push(result);
                }
                None => println!("  landmark {day}, horizon {horizon}: non-evaluable"),
            }
        }
    }
    report::write_roc_curves(&out_dir.join("roc_curves.tsv"), &roc_results)?;
    report::write_auc_summary(&out_dir.join("auc_summary.tsv"), &roc_results)?;

    // Bootstrap bias correction at the primary landmark/horizon.
    println!(
        "Bootstrap validation ({} iterations, landmark {}, horizon {})...",
        settings.bootstrap_iterations, settings.primary_landmark, settings.primary_horizon
    );
    let validator = BootstrapValidator::new(
        &loaded.cohort,
        &base_definition,
        policy,
        BootstrapSettings {
            iterations: settings.bootstrap_iterations,
            skip_tolerance: settings.skip_tolerance,
            seed: settings.seed,
            show_progress,
        },
    );
    let mut reports = Vec::new();
    for &metric in &settings.metrics {
        let report = validator.validate(
            metric,
            settings.primary_landmark,
            settings.primary_horizon,
        )?;
        println!(
            "  {}: apparent {:.3}, bias-corrected {:.3} (95% CI {:.3}-{:.3}, {} skipped)",
            report.metric.name(),
            report.apparent,
            report.corrected,
            report.ci.0,
            report.ci.1,
            report.skipped
        );
        reports.push(report);
    }
    report::write_bootstrap_reports(&out_dir.join("bootstrap_reports.tsv"), &reports)?;

    // Risk stratification of the whole cohort at the primary horizon.
    println!("Stratifying by risk category...");
    let cohort_scores = score_cohort(&definition, &loaded.cohort, policy);
    let table = stratify(
        &loaded.cohort,
        &cohort_scores,
        &partition,
        settings.primary_horizon,
    );
    for category in &table.categories {
        println!(
            "  {} [{}-{}]: {} subjects, outcome rate {:.3}",
            category.name, category.min, category.max, category.subjects, category.outcome_rate
        );
    }
    report::write_stratification(
        &out_dir.join("risk_categories.tsv"),
        &out_dir.join("adjacent_odds.tsv"),
        &table,
    )?;

    println!("Artifacts written to: {}", out_dir.display());
    Ok(())
}

fn score_command(
    cohort_path: &str,
    config_path: &str,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Loading configuration from: {config_path}");
    let config = EngineConfig::load(config_path)?;
    let definition = config.fixed_definition()?;
    let partition = config.partition(definition.max_score())?;

    println!("Loading cohort from: {cohort_path}");
    let loaded = load_cohort(cohort_path, &config)?;
    println!(
        "Scoring {} subjects (maximum score {})",
        loaded.cohort.len(),
        definition.max_score()
    );

    let scores = score_cohort(&definition, &loaded.cohort, config.policy());
    if scores.excluded > 0 {
        println!(
            "{} subject(s) could not be scored under the missing-data policy",
            scores.excluded
        );
    }
    report::write_scores(output, &loaded.cohort, &scores, &partition)?;

    println!("Scores written to: {}", output.display());
    Ok(())
}
