use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use domus_boost::{
    CrossValidationResult, FoldData, KFold, Model, ModelKind, RegressionMetrics, SplitMethod, Study, TuneConfig,
    train_test_split, tune,
};
use domus_io::{
    ExperimentName, FeatureEntry, ListingReader, MetricsEntry, ResultWriter, ScoreReport, TrainingReport, TrialEntry,
};
use domus_prep::{FeatureMatrix, FittedEncoder, OutlierRule, PrepConfig, PrepReport, TargetMode};

#[derive(Parser)]
#[command(name = "domus")]
#[command(about = "Real-estate price prediction from property listings")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// RNG seed for reproducibility
    #[arg(long, default_value_t = 42, global = true)]
    seed: u64,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Number of threads for parallel computation (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Clean listings, search hyperparameters and save the best model
    Train {
        /// Path to the listings JSON file
        #[arg(default_value = "train.json")]
        data: PathBuf,

        /// Experiment name for output files (must match [a-zA-Z0-9_-]+)
        #[arg(long, default_value = "domus")]
        experiment: String,

        /// Output directory for result files
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Model family: "boosting" or "forest"
        #[arg(long, default_value = "boosting")]
        model: String,

        /// Number of search trials (30 for boosting, 10 for forest if not set)
        #[arg(long)]
        trials: Option<usize>,

        /// Fraction of rows held out for validation and testing
        #[arg(long, default_value_t = 0.08)]
        test_size: f64,

        /// Outlier rule: "iqr", "zscore", or "none"
        #[arg(long, default_value = "iqr")]
        outlier: String,

        /// Column the outlier rule is applied to
        #[arg(long, default_value = "Price")]
        outlier_column: String,

        /// Drop rows whose postal code occurs fewer times than this
        #[arg(long)]
        min_postal_count: Option<usize>,

        /// Boosting rounds per trial
        #[arg(long, default_value_t = 1000)]
        iterations: usize,

        /// Stop boosting after this many rounds without validation improvement
        #[arg(long)]
        early_stopping: Option<usize>,

        /// Split-finding strategy: "exact" or "histogram"
        #[arg(long, default_value = "histogram")]
        split_method: String,

        /// Cross-validate the best parameters with this many folds
        #[arg(long)]
        cv_folds: Option<usize>,
    },

    /// Score a labelled listings file with a saved model
    Score {
        /// Path to the listings JSON file
        data: PathBuf,

        /// Path to the trained model binary
        #[arg(long)]
        model: PathBuf,

        /// Path to the fitted encoder binary
        #[arg(long)]
        encoder: PathBuf,

        /// Write `{experiment}_score.json` when set
        #[arg(long)]
        experiment: Option<String>,

        /// Output directory for result files
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Predict prices for unlabelled listings
    Predict {
        /// Path to the listings JSON file
        data: PathBuf,

        /// Path to the trained model binary
        #[arg(long)]
        model: PathBuf,

        /// Path to the fitted encoder binary
        #[arg(long)]
        encoder: PathBuf,

        /// Experiment name for output files
        #[arg(long)]
        experiment: String,

        /// Output directory for result files
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
}

// --- JSON stdout output structs ---

#[derive(Serialize)]
struct TrainOutput {
    experiment: String,
    model: ModelKind,
    preprocessing: PrepReport,
    n_train: usize,
    n_test: usize,
    n_trials: usize,
    n_failed_trials: usize,
    best_trial: usize,
    best_value: f64,
    test_metrics: RegressionMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    oob_metrics: Option<RegressionMetrics>,
    n_trees: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    cross_validation: Option<CvOutput>,
}

#[derive(Serialize)]
struct CvOutput {
    n_folds: usize,
    mean_r2: f64,
    std_r2: f64,
    mean_mse: f64,
    std_mse: f64,
}

impl From<&CrossValidationResult> for CvOutput {
    fn from(result: &CrossValidationResult) -> Self {
        Self {
            n_folds: result.n_folds,
            mean_r2: result.mean_r2,
            std_r2: result.std_r2,
            mean_mse: result.mean_mse,
            std_mse: result.std_mse,
        }
    }
}

#[derive(Serialize)]
struct ScoreOutput {
    data: String,
    n_rows: usize,
    model: ModelKind,
    r2: f64,
    mse: f64,
    rmse: f64,
    mae: f64,
}

#[derive(Serialize)]
struct PredictOutput {
    experiment: String,
    n_listings: usize,
    model: ModelKind,
    model_n_features: usize,
    mean_prediction: Option<f64>,
}

fn parse_model_kind(s: &str) -> Result<ModelKind> {
    match s {
        "boosting" => Ok(ModelKind::Boosting),
        "forest" => Ok(ModelKind::Forest),
        other => anyhow::bail!("unknown model: {other} (expected boosting or forest)"),
    }
}

fn parse_split_method(s: &str) -> Result<SplitMethod> {
    match s {
        "exact" => Ok(SplitMethod::Exact),
        "histogram" => Ok(SplitMethod::Histogram { n_bins: 256 }),
        other => anyhow::bail!("unknown split method: {other} (expected exact or histogram)"),
    }
}

fn parse_outlier_rule(s: &str) -> Result<OutlierRule> {
    match s {
        "iqr" => Ok(OutlierRule::iqr()),
        "zscore" => Ok(OutlierRule::z_score()),
        "none" => Ok(OutlierRule::None),
        other => anyhow::bail!("unknown outlier rule: {other} (expected iqr, zscore, or none)"),
    }
}

fn metrics_entry(metrics: &RegressionMetrics) -> MetricsEntry {
    MetricsEntry {
        r2: metrics.r2,
        mse: metrics.mse,
        rmse: metrics.rmse,
        mae: metrics.mae,
    }
}

/// Copy a fold's fitted training matrix and transformed held-out matrix.
fn fold_data(train: &FeatureMatrix, test: &FeatureMatrix) -> Result<FoldData> {
    Ok(FoldData {
        train_features: train.rows().to_vec(),
        train_targets: train.targets().context("fold training rows have no targets")?.to_vec(),
        test_features: test.rows().to_vec(),
        test_targets: test.targets().context("fold held-out rows have no targets")?.to_vec(),
        feature_names: train.feature_names().to_vec(),
    })
}

/// Load a model and its encoder and check they describe the same features.
fn load_artifacts(model_path: &Path, encoder_path: &Path) -> Result<(Model, FittedEncoder)> {
    let model = Model::load(model_path).context("failed to load model")?;
    let encoder = FittedEncoder::load(encoder_path).context("failed to load encoder")?;
    if model.feature_names() != encoder.feature_names() {
        anyhow::bail!(
            "model expects {} features but encoder produces {}; were they saved by the same run?",
            model.n_features(),
            encoder.n_features()
        );
    }
    info!(
        kind = %model.kind(),
        n_trees = model.n_trees(),
        n_features = model.n_features(),
        "model and encoder loaded"
    );
    Ok((model, encoder))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;
        info!(threads, "thread pool configured");
    }

    match cli.command {
        Command::Train {
            data,
            experiment,
            output_dir,
            model,
            trials,
            test_size,
            outlier,
            outlier_column,
            min_postal_count,
            iterations,
            early_stopping,
            split_method,
            cv_folds,
        } => {
            let experiment_name = ExperimentName::new(experiment.clone())?;
            let kind = parse_model_kind(&model)?;
            let split_method = parse_split_method(&split_method)?;

            // 1. Read listings
            let table = ListingReader::new(&data)
                .read()
                .context("failed to read listings")?;
            let n_listings = table.n_rows();
            info!(n_listings, "listings loaded");

            // 2. Scope and split; everything fitted below sees training rows only
            let prep_config = PrepConfig::new()
                .with_outlier_rule(parse_outlier_rule(&outlier)?)
                .with_outlier_column(outlier_column)
                .with_min_postal_count(min_postal_count);
            let scoped = prep_config.scope(&table).context("preprocessing failed")?;
            let (train_idx, test_idx) =
                train_test_split(scoped.n_rows(), test_size, cli.seed).context("train/test split failed")?;
            let train_rows = scoped.select_rows(&train_idx);

            // 3. Fit the encoder on the training rows, transform the held-out rows
            let prepared = prep_config
                .fit_scoped(&train_rows)
                .context("preprocessing failed")?;
            let train = &prepared.features;
            let test = prepared
                .encoder
                .transform(scoped.select_rows(&test_idx).table(), TargetMode::Required)
                .context("failed to transform held-out rows")?;
            let train_targets = train.targets().context("training rows have no targets")?;
            let test_targets = test.targets().context("test rows have no targets")?;
            info!(
                n_train = train.n_rows(),
                n_test = test.n_rows(),
                n_features = train.n_features(),
                "preprocessing complete"
            );

            // 4. Search
            let mut study = Study::default_for(kind).with_seed(cli.seed);
            if let Some(n_trials) = trials {
                study = study.with_n_trials(n_trials)?;
            }
            if early_stopping.is_some() && kind == ModelKind::Forest {
                warn!("--early-stopping only applies to boosting, ignored");
            }
            let tune_config = TuneConfig::new(kind)
                .with_study(study)
                .with_iterations(iterations)
                .with_early_stopping_rounds(early_stopping)
                .with_split_method(split_method)
                .with_seed(cli.seed);
            let feature_names = train.feature_names();
            let result = tune(
                &tune_config,
                (train.rows(), train_targets),
                (test.rows(), test_targets),
                feature_names,
            )
            .context("hyperparameter search failed")?;
            info!(
                best_trial = result.study.best_trial,
                r2 = result.best_metrics.r2,
                rmse = result.best_metrics.rmse,
                "best model selected"
            );
            if let Some(oob) = &result.oob_score {
                info!(oob_r2 = oob.metrics.r2, n_oob_samples = oob.n_oob_samples, "out-of-bag score");
            }

            // 5. Optional cross-validation of the best parameters on the
            //    training rows, refitting the encoder in every fold
            let cv_result = match cv_folds {
                Some(n_folds) => {
                    let spec = tune_config.spec_for(&result.study.best_params)?;
                    let cv = KFold::new(n_folds)?.with_seed(cli.seed);
                    let cv_run = cv
                        .evaluate_with(
                            &spec,
                            train_rows.n_rows(),
                            |fold_train: &[usize], fold_test: &[usize]| -> Result<FoldData> {
                                let fitted = prep_config.fit_scoped(&train_rows.select_rows(fold_train))?;
                                let held_out = fitted
                                    .encoder
                                    .transform(train_rows.select_rows(fold_test).table(), TargetMode::Required)?;
                                fold_data(&fitted.features, &held_out)
                            },
                        )
                        .context("cross-validation failed")?;
                    Some(cv_run)
                }
                None => None,
            };

            // 6. Save model and encoder
            let writer = ResultWriter::new(&output_dir, experiment_name)?;
            result
                .model
                .save(writer.model_path())
                .context("failed to save model")?;
            prepared
                .encoder
                .save(writer.encoder_path())
                .context("failed to save encoder")?;
            info!(
                model = %writer.model_path().display(),
                encoder = %writer.encoder_path().display(),
                "artifacts saved"
            );

            // 7. Write training report
            let trials: Vec<TrialEntry> = result
                .study
                .trials
                .iter()
                .zip(&result.trial_metrics)
                .map(|(trial, metrics)| TrialEntry {
                    number: trial.number,
                    params: trial.params.as_map().clone(),
                    value: trial.value,
                    metrics: metrics.as_ref().map(metrics_entry),
                    error: trial.error.clone(),
                })
                .collect();
            let n_failed_trials = trials.iter().filter(|t| t.value.is_none()).count();
            let report = TrainingReport {
                model: kind.to_string(),
                n_listings,
                n_rows: train.n_rows() + test.n_rows(),
                n_features: train.n_features(),
                n_train: train.n_rows(),
                n_test: test.n_rows(),
                direction: tune_config.study().direction().to_string(),
                objective: match tune_config.study().direction() {
                    domus_boost::Direction::Minimize => "mse".to_string(),
                    domus_boost::Direction::Maximize => "r2".to_string(),
                },
                best_params: result.study.best_params.as_map().clone(),
                best_trial: result.study.best_trial,
                test_metrics: metrics_entry(&result.best_metrics),
                oob_metrics: result.oob_score.as_ref().map(|oob| metrics_entry(&oob.metrics)),
                trials,
                feature_importances: result
                    .model
                    .importances()
                    .into_iter()
                    .map(|f| FeatureEntry {
                        name: f.name,
                        importance: f.importance,
                        rank: f.rank,
                    })
                    .collect(),
            };
            writer.write_training(&report)?;

            // 8. Print summary
            let output = TrainOutput {
                experiment,
                model: kind,
                preprocessing: prepared.report,
                n_train: train.n_rows(),
                n_test: test.n_rows(),
                n_trials: result.study.trials.len(),
                n_failed_trials,
                best_trial: result.study.best_trial,
                best_value: result.study.best_value,
                test_metrics: result.best_metrics,
                oob_metrics: result.oob_score.as_ref().map(|oob| oob.metrics),
                n_trees: result.model.n_trees(),
                cross_validation: cv_result.as_ref().map(CvOutput::from),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Score {
            data,
            model,
            encoder,
            experiment,
            output_dir,
        } => {
            let experiment_name = experiment.map(ExperimentName::new).transpose()?;
            let (model, encoder) = load_artifacts(&model, &encoder)?;

            // 1. Read and transform
            let table = ListingReader::new(&data)
                .read()
                .context("failed to read listings")?;
            let matrix: FeatureMatrix = encoder
                .transform(&table, TargetMode::Required)
                .context("failed to transform listings")?;
            let targets = matrix.targets().context("listings have no prices to score against")?;

            // 2. Predict and score
            let predictions = model.predict_batch(matrix.rows()).context("prediction failed")?;
            let metrics = RegressionMetrics::compute(targets, &predictions).context("scoring failed")?;
            info!(r2 = metrics.r2, rmse = metrics.rmse, mae = metrics.mae, "scored");

            // 3. Optional score report
            if let Some(experiment_name) = experiment_name {
                let writer = ResultWriter::new(&output_dir, experiment_name)?;
                writer.write_scores(&ScoreReport {
                    data: data.display().to_string(),
                    n_rows: matrix.n_rows(),
                    metrics: metrics_entry(&metrics),
                })?;
            }

            let output = ScoreOutput {
                data: data.display().to_string(),
                n_rows: matrix.n_rows(),
                model: model.kind(),
                r2: metrics.r2,
                mse: metrics.mse,
                rmse: metrics.rmse,
                mae: metrics.mae,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Predict {
            data,
            model,
            encoder,
            experiment,
            output_dir,
        } => {
            let experiment_name = ExperimentName::new(experiment.clone())?;
            let (model, encoder) = load_artifacts(&model, &encoder)?;

            // 1. Read and transform
            let table = ListingReader::new(&data)
                .read()
                .context("failed to read listings")?;
            let matrix = encoder
                .transform(&table, TargetMode::Absent)
                .context("failed to transform listings")?;

            // 2. Predict
            let predictions = model.predict_batch(matrix.rows()).context("prediction failed")?;

            // 3. Write predictions
            let writer = ResultWriter::new(&output_dir, experiment_name)?;
            writer.write_predictions(matrix.row_ids(), &predictions)?;

            let mean_prediction =
                (!predictions.is_empty()).then(|| predictions.iter().sum::<f64>() / predictions.len() as f64);
            let output = PredictOutput {
                experiment,
                n_listings: predictions.len(),
                model: model.kind(),
                model_n_features: model.n_features(),
                mean_prediction,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
