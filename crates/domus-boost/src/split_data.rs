//! Train/test splitting and k-fold cross-validation.

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use tracing::{info, instrument};

use crate::error::BoostError;
use crate::importance::{RankedFeature, aggregate_importances};
use crate::metrics::RegressionMetrics;
use crate::model::ModelSpec;

/// Shuffle `0..n_samples` with `seed` and hold out `ceil(n_samples · test_fraction)`
/// indices for testing.
///
/// Both returned index lists are sorted ascending.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`BoostError::InvalidTestFraction`] | fraction outside (0.0, 1.0) |
/// | [`BoostError::TooFewSamples`] | either side would be empty |
pub fn train_test_split(
    n_samples: usize,
    test_fraction: f64,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>), BoostError> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(BoostError::InvalidTestFraction {
            fraction: test_fraction,
        });
    }
    let n_test = (n_samples as f64 * test_fraction).ceil() as usize;
    if n_test >= n_samples {
        return Err(BoostError::TooFewSamples {
            n_samples,
            needed: n_test + 1,
        });
    }

    let mut indices: Vec<usize> = (0..n_samples).collect();
    indices.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
    let mut train = indices.split_off(n_test);
    let mut test = indices;
    train.sort_unstable();
    test.sort_unstable();
    Ok((train, test))
}

/// Gather the rows and targets at `indices`.
#[must_use]
pub fn select(features: &[Vec<f64>], targets: &[f64], indices: &[usize]) -> (Vec<Vec<f64>>, Vec<f64>) {
    indices
        .iter()
        .map(|&i| (features[i].clone(), targets[i]))
        .unzip()
}

/// Shuffled k-fold cross-validation.
///
/// Construct via [`KFold::new`], then chain `with_seed` if desired.
#[derive(Debug, Clone)]
pub struct KFold {
    n_folds: usize,
    seed: u64,
}

/// Results of k-fold cross-validation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CrossValidationResult {
    /// R² of each fold.
    pub fold_r2: Vec<f64>,
    /// MSE of each fold.
    pub fold_mse: Vec<f64>,
    /// Mean R² across folds.
    pub mean_r2: f64,
    /// Population standard deviation of fold R².
    pub std_r2: f64,
    /// Mean MSE across folds.
    pub mean_mse: f64,
    /// Population standard deviation of fold MSE.
    pub std_mse: f64,
    /// Importances averaged over every fold's model.
    pub feature_importances: Vec<RankedFeature>,
    /// Number of folds.
    pub n_folds: usize,
    /// Total number of samples.
    pub n_samples: usize,
}

impl KFold {
    /// Create a new cross-validation config with the given number of folds.
    ///
    /// # Errors
    ///
    /// Returns [`BoostError::InvalidFoldCount`] if `n_folds` < 2.
    pub fn new(n_folds: usize) -> Result<Self, BoostError> {
        if n_folds < 2 {
            return Err(BoostError::InvalidFoldCount { n_folds });
        }
        Ok(Self { n_folds, seed: 42 })
    }

    /// Set the random seed for fold shuffling.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Return the number of folds.
    #[must_use]
    pub fn n_folds(&self) -> usize {
        self.n_folds
    }

    /// Return `(train, test)` index lists for each fold.
    ///
    /// Fold sizes differ by at most one; every index is in exactly one test fold.
    ///
    /// # Errors
    ///
    /// Returns [`BoostError::TooFewSamples`] if `n_samples < n_folds`.
    pub fn folds(&self, n_samples: usize) -> Result<Vec<(Vec<usize>, Vec<usize>)>, BoostError> {
        if n_samples < self.n_folds {
            return Err(BoostError::TooFewSamples {
                n_samples,
                needed: self.n_folds,
            });
        }
        let mut order: Vec<usize> = (0..n_samples).collect();
        order.shuffle(&mut ChaCha8Rng::seed_from_u64(self.seed));
        let mut assignment = vec![0usize; n_samples];
        for (pos, &i) in order.iter().enumerate() {
            assignment[i] = pos % self.n_folds;
        }

        Ok((0..self.n_folds)
            .map(|fold| (0..n_samples).partition(|&i| assignment[i] != fold))
            .collect())
    }

    /// Train `spec` on each fold's training part and score the held-out part.
    ///
    /// Each fold trains with the spec's seed plus the fold number.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`BoostError::EmptyDataset`] | zero samples |
    /// | [`BoostError::TargetCountMismatch`] | targets and rows differ in count |
    /// | [`BoostError::TooFewSamples`] | fewer samples than folds |
    /// | other errors | from training or prediction |
    pub fn evaluate(
        &self,
        spec: &ModelSpec,
        features: &[Vec<f64>],
        targets: &[f64],
        feature_names: &[String],
    ) -> Result<CrossValidationResult, BoostError> {
        if targets.len() != features.len() {
            return Err(BoostError::TargetCountMismatch {
                n_samples: features.len(),
                n_targets: targets.len(),
            });
        }
        self.evaluate_with(spec, features.len(), |train_idx, test_idx| {
            let (train_features, train_targets) = select(features, targets, train_idx);
            let (test_features, test_targets) = select(features, targets, test_idx);
            Ok::<_, BoostError>(FoldData {
                train_features,
                train_targets,
                test_features,
                test_targets,
                feature_names: feature_names.to_vec(),
            })
        })
    }

    /// Cross-validate with fold matrices built by `prepare`.
    ///
    /// `prepare` receives the training and held-out sample indices of a fold
    /// and returns that fold's data. Use it when features are fitted on the
    /// training rows, so each fold refits them without seeing its held-out
    /// rows. Importances are matched across folds by feature name.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`BoostError::EmptyDataset`] | `n_samples` is zero |
    /// | [`BoostError::TooFewSamples`] | fewer samples than folds |
    /// | other errors | from `prepare`, training or prediction |
    #[instrument(skip_all, fields(n_folds = self.n_folds, n_samples = n_samples, kind = %spec.kind()))]
    pub fn evaluate_with<F, E>(
        &self,
        spec: &ModelSpec,
        n_samples: usize,
        mut prepare: F,
    ) -> Result<CrossValidationResult, E>
    where
        F: FnMut(&[usize], &[usize]) -> Result<FoldData, E>,
        E: From<BoostError>,
    {
        if n_samples == 0 {
            return Err(BoostError::EmptyDataset.into());
        }

        let mut fold_r2 = Vec::with_capacity(self.n_folds);
        let mut fold_mse = Vec::with_capacity(self.n_folds);
        let mut all_importances: Vec<Vec<f64>> = Vec::with_capacity(self.n_folds);
        let mut names: Vec<String> = Vec::new();

        for (fold, (train_idx, test_idx)) in self.folds(n_samples)?.into_iter().enumerate() {
            let data = prepare(&train_idx, &test_idx)?;
            if names.is_empty() {
                names = data.feature_names.clone();
            }

            let fold_spec = spec.clone().with_seed(spec.seed().wrapping_add(fold as u64));
            let model = fold_spec.fit(&data.train_features, &data.train_targets, &data.feature_names)?;
            let predictions = model.predict_batch(&data.test_features)?;
            let metrics = RegressionMetrics::compute(&data.test_targets, &predictions)?;
            info!(fold, r2 = metrics.r2, mse = metrics.mse, "fold completed");

            fold_r2.push(metrics.r2);
            fold_mse.push(metrics.mse);
            let mut by_name = vec![0.0; names.len()];
            for ranked in model.importances() {
                if let Some(pos) = names.iter().position(|n| *n == ranked.name) {
                    by_name[pos] = ranked.importance;
                }
            }
            all_importances.push(by_name);
        }

        let (mean_r2, std_r2) = mean_and_std(&fold_r2);
        let (mean_mse, std_mse) = mean_and_std(&fold_mse);
        info!(mean_r2, std_r2, mean_mse, "cross-validation complete");

        Ok(CrossValidationResult {
            fold_r2,
            fold_mse,
            mean_r2,
            std_r2,
            mean_mse,
            std_mse,
            feature_importances: aggregate_importances(&all_importances, &names),
            n_folds: self.n_folds,
            n_samples,
        })
    }
}

/// The matrices of one cross-validation fold.
#[derive(Debug, Clone)]
pub struct FoldData {
    /// Training rows.
    pub train_features: Vec<Vec<f64>>,
    /// Training targets.
    pub train_targets: Vec<f64>,
    /// Held-out rows.
    pub test_features: Vec<Vec<f64>>,
    /// Held-out targets.
    pub test_targets: Vec<f64>,
    /// Column names shared by both row sets.
    pub feature_names: Vec<String>,
}

fn mean_and_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}
