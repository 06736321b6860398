//! JSON result writer for training, scoring, and prediction outputs.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::domain::ExperimentName;
use crate::IoError;

/// Regression metrics as written to result files.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsEntry {
    /// Coefficient of determination.
    pub r2: f64,
    /// Mean squared error.
    pub mse: f64,
    /// Root mean squared error.
    pub rmse: f64,
    /// Mean absolute error.
    pub mae: f64,
}

/// One hyperparameter search trial as written to `{experiment}_train.json`.
#[derive(Debug, Clone, Serialize)]
pub struct TrialEntry {
    /// Zero-based trial number.
    pub number: usize,
    /// Sampled parameters by name.
    pub params: BTreeMap<String, f64>,
    /// Objective value, absent when the trial failed.
    pub value: Option<f64>,
    /// Validation metrics, absent when the trial failed.
    pub metrics: Option<MetricsEntry>,
    /// Failure reason for failed trials.
    pub error: Option<String>,
}

/// A ranked feature importance.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureEntry {
    /// Feature name.
    pub name: String,
    /// Normalized importance.
    pub importance: f64,
    /// 1-based rank.
    pub rank: usize,
}

/// Everything the `train` command records about a run.
///
/// Plain data so the writer has no dependency on `domus-boost`.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    /// Model family (`"boosting"` or `"forest"`).
    pub model: String,
    /// Listings read from the input file.
    pub n_listings: usize,
    /// Rows left after cleaning and outlier removal.
    pub n_rows: usize,
    /// Number of model features.
    pub n_features: usize,
    /// Training split size.
    pub n_train: usize,
    /// Test split size.
    pub n_test: usize,
    /// Search direction (`"minimize"` or `"maximize"`).
    pub direction: String,
    /// Objective metric name.
    pub objective: String,
    /// Parameters of the best trial.
    pub best_params: BTreeMap<String, f64>,
    /// Zero-based number of the best trial.
    pub best_trial: usize,
    /// Test metrics of the refitted best model.
    pub test_metrics: MetricsEntry,
    /// Out-of-bag metrics of a random forest, when computed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oob_metrics: Option<MetricsEntry>,
    /// Every trial in the order it ran.
    pub trials: Vec<TrialEntry>,
    /// Ranked feature importances of the final model.
    pub feature_importances: Vec<FeatureEntry>,
}

/// Metrics of a saved model on a labelled dataset.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreReport {
    /// Path of the scored dataset.
    pub data: String,
    /// Number of scored rows.
    pub n_rows: usize,
    /// Metrics over those rows.
    pub metrics: MetricsEntry,
}

/// Writes training, scoring, and prediction results to JSON files.
///
/// Creates the output directory on construction if it does not exist.
/// Output files are named `{experiment}_train.json`,
/// `{experiment}_score.json` and `{experiment}_predict.json`.
pub struct ResultWriter {
    output_dir: PathBuf,
    experiment: ExperimentName,
}

impl ResultWriter {
    /// Create a new writer targeting the given directory and experiment name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutputDirCreate`] if the directory cannot be created.
    #[instrument(skip_all, fields(dir = %output_dir.display(), experiment = %experiment))]
    pub fn new(output_dir: &Path, experiment: ExperimentName) -> Result<Self, IoError> {
        fs::create_dir_all(output_dir).map_err(|e| IoError::OutputDirCreate {
            path: output_dir.to_path_buf(),
            source: e,
        })?;
        debug!("output directory ready");
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            experiment,
        })
    }

    /// Write a training report to `{experiment}_train.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Encode`] or [`IoError::WriteFile`].
    #[instrument(skip_all)]
    pub fn write_training(&self, report: &TrainingReport) -> Result<PathBuf, IoError> {
        let path = self.artifact_path("train.json");
        let artifact = Artifact {
            experiment: self.experiment.as_str(),
            body: report,
        };
        write_json(&path, &artifact)?;
        info!(path = %path.display(), "training report written");
        Ok(path)
    }

    /// Write a score report to `{experiment}_score.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Encode`] or [`IoError::WriteFile`].
    #[instrument(skip_all)]
    pub fn write_scores(&self, report: &ScoreReport) -> Result<PathBuf, IoError> {
        let path = self.artifact_path("score.json");
        let artifact = Artifact {
            experiment: self.experiment.as_str(),
            body: report,
        };
        write_json(&path, &artifact)?;
        info!(path = %path.display(), "score report written");
        Ok(path)
    }

    /// Write predictions to `{experiment}_predict.json`.
    ///
    /// `row_ids[i]` identifies the listing predicted as `predictions[i]`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::LengthMismatch`], [`IoError::Encode`] or
    /// [`IoError::WriteFile`].
    #[instrument(skip_all, fields(n = predictions.len()))]
    pub fn write_predictions(
        &self,
        row_ids: &[String],
        predictions: &[f64],
    ) -> Result<PathBuf, IoError> {
        if row_ids.len() != predictions.len() {
            return Err(IoError::LengthMismatch {
                name: "predictions".to_string(),
                expected: row_ids.len(),
                got: predictions.len(),
            });
        }
        let path = self.artifact_path("predict.json");

        let entries: Vec<PredictionEntry<'_>> = row_ids
            .iter()
            .zip(predictions)
            .map(|(id, &price)| PredictionEntry { id: id.as_str(), price })
            .collect();

        let artifact = PredictArtifact {
            experiment: self.experiment.as_str(),
            n_listings: entries.len(),
            predictions: entries,
        };
        write_json(&path, &artifact)?;
        info!(path = %path.display(), "predictions written");
        Ok(path)
    }

    /// Return the path where the model binary should be saved.
    ///
    /// Computes `{output_dir}/{experiment}_model.bin` without writing anything.
    #[must_use]
    pub fn model_path(&self) -> PathBuf {
        self.artifact_path("model.bin")
    }

    /// Return the path where the fitted encoder should be saved
    /// (`{output_dir}/{experiment}_encoder.bin`).
    #[must_use]
    pub fn encoder_path(&self) -> PathBuf {
        self.artifact_path("encoder.bin")
    }

    fn artifact_path(&self, suffix: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}_{suffix}", self.experiment.as_str()))
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), IoError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| IoError::Encode {
        path: path.to_path_buf(),
        source: e,
    })?;
    fs::write(path, json).map_err(|e| IoError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })
}

// --- Shadow structs for JSON serialization ---

#[derive(Serialize)]
struct Artifact<'a, T: Serialize> {
    experiment: &'a str,
    #[serde(flatten)]
    body: &'a T,
}

#[derive(Serialize)]
struct PredictArtifact<'a> {
    experiment: &'a str,
    n_listings: usize,
    predictions: Vec<PredictionEntry<'a>>,
}

#[derive(Serialize)]
struct PredictionEntry<'a> {
    id: &'a str,
    price: f64,
}
