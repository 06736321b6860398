//! Gradient-boosted regression trees with squared loss.

use rand::Rng;
use rand::SeedableRng;
use rand::seq::index;
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info, instrument, warn};

use crate::error::BoostError;
use crate::importance::{RankedFeature, aggregate_importances};
use crate::metrics::mean_squared_error;
use crate::split::SplitMethod;
use crate::tree::{RegressionTree, RegressionTreeConfig, to_columns, validate_dataset};

/// Configuration for gradient boosting.
///
/// Construct via [`GradientBoostingConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter               | Default  |
/// |-------------------------|----------|
/// | `learning_rate`         | 0.03     |
/// | `max_depth`             | 6        |
/// | `subsample`             | 1.0      |
/// | `colsample`             | 1.0      |
/// | `min_samples_leaf`      | 1        |
/// | `early_stopping_rounds` | `None`   |
/// | `split_method`          | `Exact`  |
/// | `seed`                  | 42       |
#[derive(Debug, Clone)]
pub struct GradientBoostingConfig {
    pub(crate) n_estimators: usize,
    pub(crate) learning_rate: f64,
    pub(crate) max_depth: usize,
    pub(crate) subsample: f64,
    pub(crate) colsample: f64,
    pub(crate) min_samples_leaf: usize,
    pub(crate) early_stopping_rounds: Option<usize>,
    pub(crate) split_method: SplitMethod,
    pub(crate) seed: u64,
}

impl GradientBoostingConfig {
    /// Create a new config with the given number of boosting rounds.
    ///
    /// # Errors
    ///
    /// Returns [`BoostError::InvalidEstimatorCount`] if `n_estimators` is zero.
    pub fn new(n_estimators: usize) -> Result<Self, BoostError> {
        if n_estimators == 0 {
            return Err(BoostError::InvalidEstimatorCount { name: "n_estimators" });
        }
        Ok(Self {
            n_estimators,
            learning_rate: 0.03,
            max_depth: 6,
            subsample: 1.0,
            colsample: 1.0,
            min_samples_leaf: 1,
            early_stopping_rounds: None,
            split_method: SplitMethod::Exact,
            seed: 42,
        })
    }

    // --- Setters ---

    /// Set the shrinkage applied to each tree.
    #[must_use]
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Set the depth of each tree.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the fraction of rows drawn (without replacement) for each round.
    #[must_use]
    pub fn with_subsample(mut self, subsample: f64) -> Self {
        self.subsample = subsample;
        self
    }

    /// Set the fraction of features considered at each split.
    #[must_use]
    pub fn with_colsample(mut self, colsample: f64) -> Self {
        self.colsample = colsample;
        self
    }

    /// Set the minimum number of samples in each leaf.
    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf;
        self
    }

    /// Stop after this many rounds without improvement of the evaluation MSE.
    ///
    /// Only used by [`fit_with_eval`](Self::fit_with_eval).
    #[must_use]
    pub fn with_early_stopping_rounds(mut self, rounds: Option<usize>) -> Self {
        self.early_stopping_rounds = rounds;
        self
    }

    /// Set the split-finding strategy.
    #[must_use]
    pub fn with_split_method(mut self, split_method: SplitMethod) -> Self {
        self.split_method = split_method;
        self
    }

    /// Set the random seed for reproducibility.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    // --- Getters ---

    /// Return the number of boosting rounds.
    #[must_use]
    pub fn n_estimators(&self) -> usize {
        self.n_estimators
    }

    /// Return the learning rate.
    #[must_use]
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Return the tree depth.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Return the row subsample fraction.
    #[must_use]
    pub fn subsample(&self) -> f64 {
        self.subsample
    }

    /// Return the feature subsample fraction.
    #[must_use]
    pub fn colsample(&self) -> f64 {
        self.colsample
    }

    /// Return the minimum samples per leaf.
    #[must_use]
    pub fn min_samples_leaf(&self) -> usize {
        self.min_samples_leaf
    }

    /// Return the early stopping patience, if any.
    #[must_use]
    pub fn early_stopping_rounds(&self) -> Option<usize> {
        self.early_stopping_rounds
    }

    /// Return the split-finding strategy.
    #[must_use]
    pub fn split_method(&self) -> SplitMethod {
        self.split_method
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Train on `features`/`targets` for the configured number of rounds.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---|---|
    /// | dataset errors | see [`RegressionTreeConfig::fit`] |
    /// | [`BoostError::FeatureNameMismatch`] | `feature_names.len()` differs from the feature count |
    /// | [`BoostError::InvalidLearningRate`] | learning rate outside (0.0, 1.0] |
    /// | [`BoostError::InvalidFraction`] | subsample or colsample outside (0.0, 1.0] |
    /// | [`BoostError::InvalidMaxDepth`] | `max_depth` is zero |
    pub fn fit(
        &self,
        features: &[Vec<f64>],
        targets: &[f64],
        feature_names: &[String],
    ) -> Result<GradientBoostedModel, BoostError> {
        train(self, features, targets, feature_names, None)
    }

    /// Train while tracking the MSE on an evaluation set after every round.
    ///
    /// With `early_stopping_rounds = Some(n)`, training stops after `n` rounds
    /// without improvement and the ensemble is truncated to the best round.
    ///
    /// # Errors
    ///
    /// As [`fit`](Self::fit), plus [`BoostError::PredictionFeatureMismatch`],
    /// [`BoostError::TargetCountMismatch`] or [`BoostError::EmptyDataset`] for
    /// a malformed evaluation set.
    pub fn fit_with_eval(
        &self,
        features: &[Vec<f64>],
        targets: &[f64],
        feature_names: &[String],
        eval_features: &[Vec<f64>],
        eval_targets: &[f64],
    ) -> Result<GradientBoostedModel, BoostError> {
        train(
            self,
            features,
            targets,
            feature_names,
            Some((eval_features, eval_targets)),
        )
    }

    fn validate(&self) -> Result<(), BoostError> {
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(BoostError::InvalidLearningRate {
                learning_rate: self.learning_rate,
            });
        }
        for (name, value) in [("subsample", self.subsample), ("colsample", self.colsample)] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(BoostError::InvalidFraction { name, value });
            }
        }
        Ok(())
    }
}

#[instrument(skip_all, fields(n_estimators = config.n_estimators, n_samples = features.len()))]
fn train(
    config: &GradientBoostingConfig,
    features: &[Vec<f64>],
    targets: &[f64],
    feature_names: &[String],
    eval: Option<(&[Vec<f64>], &[f64])>,
) -> Result<GradientBoostedModel, BoostError> {
    let n_features = validate_dataset(features, targets)?;
    if feature_names.len() != n_features {
        return Err(BoostError::FeatureNameMismatch {
            expected: n_features,
            got: feature_names.len(),
        });
    }
    config.validate()?;
    if let Some((eval_features, eval_targets)) = eval {
        validate_eval_set(eval_features, eval_targets, n_features)?;
    }

    let n_samples = features.len();
    let max_features = ((config.colsample * n_features as f64).ceil() as usize).clamp(1, n_features);
    let tree_config = RegressionTreeConfig::new()
        .with_split_method(config.split_method)
        .with_max_depth(Some(config.max_depth))
        .with_min_samples_leaf(config.min_samples_leaf)
        .with_max_features(Some(max_features));
    tree_config.validate(n_features)?;

    let col_features = to_columns(features, n_features);
    let bins = tree_config.build_bins(&col_features);
    let n_rows = ((config.subsample * n_samples as f64).ceil() as usize).clamp(1, n_samples);
    let all_rows: Vec<usize> = (0..n_samples).collect();

    let base_score = targets.iter().sum::<f64>() / n_samples as f64;
    let mut train_pred = vec![base_score; n_samples];
    let mut residuals = vec![0.0; n_samples];
    let mut eval_pred = eval.map(|(x, _)| vec![base_score; x.len()]);
    let patience = if eval.is_some() {
        config.early_stopping_rounds
    } else {
        if config.early_stopping_rounds.is_some() {
            warn!("early stopping requested without an evaluation set, ignored");
        }
        None
    };

    info!(
        n_samples,
        n_features,
        max_features,
        rows_per_round = n_rows,
        learning_rate = config.learning_rate,
        "training gradient boosting"
    );

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut trees: Vec<RegressionTree> = Vec::with_capacity(config.n_estimators);
    let mut eval_history = Vec::new();
    let mut best_mse = f64::INFINITY;
    let mut best_round = 0usize;

    for round in 0..config.n_estimators {
        for ((r, y), p) in residuals.iter_mut().zip(targets).zip(&train_pred) {
            *r = y - p;
        }
        let rows = if n_rows < n_samples {
            let mut rows = index::sample(&mut rng, n_samples, n_rows).into_vec();
            rows.sort_unstable();
            rows
        } else {
            all_rows.clone()
        };
        let tree = tree_config
            .clone()
            .with_seed(rng.r#gen())
            .grow(&col_features, &residuals, &rows, bins.as_ref());

        for (p, row) in train_pred.iter_mut().zip(features) {
            *p += config.learning_rate * tree.predict_row(row);
        }

        let mut stop = false;
        if let (Some((eval_features, eval_targets)), Some(pred)) = (eval, eval_pred.as_mut()) {
            for (p, row) in pred.iter_mut().zip(eval_features) {
                *p += config.learning_rate * tree.predict_row(row);
            }
            let mse = mean_squared_error(eval_targets, pred)?;
            eval_history.push(mse);
            if mse < best_mse {
                best_mse = mse;
                best_round = round + 1;
            } else if let Some(patience) = patience
                && round + 1 - best_round >= patience
            {
                info!(round = round + 1, best_round, best_mse, "early stopping");
                stop = true;
            }
        }
        trees.push(tree);

        if (round + 1) % 100 == 0 {
            debug!(round = round + 1, "boosting progress");
        }
        if stop {
            break;
        }
    }

    let best_iteration = if eval.is_some() { Some(best_round) } else { None };
    if patience.is_some() {
        trees.truncate(best_round);
    }

    info!(
        n_trees = trees.len(),
        best_iteration,
        eval_mse = eval_history.last().copied(),
        "gradient boosting training complete"
    );

    Ok(GradientBoostedModel {
        base_score,
        learning_rate: config.learning_rate,
        trees,
        n_features,
        feature_names: feature_names.to_vec(),
        best_iteration,
        eval_history,
    })
}

fn validate_eval_set(features: &[Vec<f64>], targets: &[f64], n_features: usize) -> Result<(), BoostError> {
    if features.is_empty() {
        return Err(BoostError::EmptyDataset);
    }
    if targets.len() != features.len() {
        return Err(BoostError::TargetCountMismatch {
            n_samples: features.len(),
            n_targets: targets.len(),
        });
    }
    for (sample_index, row) in features.iter().enumerate() {
        if row.len() != n_features {
            return Err(BoostError::PredictionFeatureMismatch {
                expected: n_features,
                got: row.len(),
            });
        }
        if let Some(feature_index) = row.iter().position(|v| !v.is_finite()) {
            return Err(BoostError::NonFiniteValue {
                sample_index,
                feature_index,
            });
        }
    }
    if let Some(sample_index) = targets.iter().position(|y| !y.is_finite()) {
        return Err(BoostError::NonFiniteTarget { sample_index });
    }
    Ok(())
}

/// A fitted gradient-boosted ensemble: `base_score + learning_rate · Σ tree(x)`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GradientBoostedModel {
    pub(crate) base_score: f64,
    pub(crate) learning_rate: f64,
    pub(crate) trees: Vec<RegressionTree>,
    pub(crate) n_features: usize,
    pub(crate) feature_names: Vec<String>,
    pub(crate) best_iteration: Option<usize>,
    pub(crate) eval_history: Vec<f64>,
}

impl GradientBoostedModel {
    /// Predict the target for a single sample.
    ///
    /// # Errors
    ///
    /// Returns [`BoostError::PredictionFeatureMismatch`] when `sample.len() != n_features`.
    pub fn predict(&self, sample: &[f64]) -> Result<f64, BoostError> {
        if sample.len() != self.n_features {
            return Err(BoostError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: sample.len(),
            });
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict_row(sample)).sum();
        Ok(self.base_score + self.learning_rate * sum)
    }

    /// Predict a batch of samples in parallel.
    ///
    /// # Errors
    ///
    /// Returns [`BoostError::PredictionFeatureMismatch`] if any sample has the wrong feature count.
    pub fn predict_batch(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, BoostError> {
        features
            .into_par_iter()
            .map(|sample| self.predict(sample))
            .collect()
    }

    /// Rank features by total split gain across the ensemble.
    #[must_use]
    pub fn feature_importances(&self) -> Vec<RankedFeature> {
        let per_tree: Vec<Vec<f64>> = self.trees.iter().map(RegressionTree::gain_by_feature).collect();
        aggregate_importances(&per_tree, &self.feature_names)
    }

    /// Return the initial prediction (training target mean).
    #[must_use]
    pub fn base_score(&self) -> f64 {
        self.base_score
    }

    /// Return the learning rate.
    #[must_use]
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Return the trees in boosting order.
    #[must_use]
    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    /// Return the number of trees kept.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Return the round with the lowest evaluation MSE, when trained with an
    /// evaluation set.
    #[must_use]
    pub fn best_iteration(&self) -> Option<usize> {
        self.best_iteration
    }

    /// Return the evaluation MSE after each round.
    #[must_use]
    pub fn eval_history(&self) -> &[f64] {
        &self.eval_history
    }

    /// Return the number of features this model was trained on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Return the feature names.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::r2_score;

    fn make_regression(n: usize) -> (Vec<Vec<f64>>, Vec<f64>, Vec<String>) {
        let features: Vec<Vec<f64>> = (0..n)
            .map(|i| {
                let x = i as f64 / n as f64;
                vec![x, ((i * 7) % 13) as f64]
            })
            .collect();
        let targets = features.iter().map(|r| 10.0 * r[0] * r[0] + 3.0).collect();
        (features, targets, vec!["x".to_string(), "noise".to_string()])
    }

    #[test]
    fn fits_smooth_function() {
        let (features, targets, names) = make_regression(200);
        let model = GradientBoostingConfig::new(200)
            .unwrap()
            .with_learning_rate(0.1)
            .with_max_depth(3)
            .fit(&features, &targets, &names)
            .unwrap();
        let pred = model.predict_batch(&features).unwrap();
        assert!(r2_score(&targets, &pred).unwrap() > 0.98);
        assert_eq!(model.n_trees(), 200);
        assert_eq!(model.feature_importances()[0].name, "x");
    }

    #[test]
    fn single_round_moves_toward_target() {
        let features = vec![vec![0.0], vec![1.0]];
        let targets = vec![0.0, 10.0];
        let model = GradientBoostingConfig::new(1)
            .unwrap()
            .with_learning_rate(0.5)
            .fit(&features, &targets, &["x".to_string()])
            .unwrap();
        assert_eq!(model.base_score(), 5.0);
        assert!((model.predict(&[0.0]).unwrap() - 2.5).abs() < 1e-12);
        assert!((model.predict(&[1.0]).unwrap() - 7.5).abs() < 1e-12);
    }

    #[test]
    fn early_stopping_truncates_to_best_round() {
        let features: Vec<Vec<f64>> = (0..40).map(|i| vec![f64::from(i)]).collect();
        let targets: Vec<f64> = (0..40).map(|i| if i < 20 { 0.0 } else { 10.0 }).collect();
        let names = vec!["x".to_string()];
        // Every round moves predictions away from the constant evaluation
        // target, so the first round stays best.
        let eval_targets = vec![5.0; features.len()];
        let model = GradientBoostingConfig::new(500)
            .unwrap()
            .with_learning_rate(0.3)
            .with_max_depth(1)
            .with_early_stopping_rounds(Some(5))
            .fit_with_eval(&features, &targets, &names, &features, &eval_targets)
            .unwrap();
        assert_eq!(model.best_iteration(), Some(1));
        assert_eq!(model.n_trees(), 1);
        assert_eq!(model.eval_history().len(), 6);
        assert!(model.eval_history().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn eval_history_without_early_stopping() {
        let (features, targets, names) = make_regression(60);
        let model = GradientBoostingConfig::new(20)
            .unwrap()
            .with_learning_rate(0.2)
            .fit_with_eval(&features, &targets, &names, &features, &targets)
            .unwrap();
        assert_eq!(model.n_trees(), 20);
        assert_eq!(model.eval_history().len(), 20);
        assert!(model.eval_history()[19] < model.eval_history()[0]);
    }

    #[test]
    fn subsample_is_deterministic() {
        let (features, targets, names) = make_regression(100);
        let config = GradientBoostingConfig::new(30)
            .unwrap()
            .with_subsample(0.5)
            .with_colsample(0.5)
            .with_seed(9);
        let a = config.fit(&features, &targets, &names).unwrap();
        let b = config.fit(&features, &targets, &names).unwrap();
        assert_eq!(a, b);
        let c = config.clone().with_seed(10).fit(&features, &targets, &names).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn invalid_configs() {
        let (features, targets, names) = make_regression(10);
        assert!(matches!(
            GradientBoostingConfig::new(0),
            Err(BoostError::InvalidEstimatorCount { .. })
        ));
        let err = GradientBoostingConfig::new(5)
            .unwrap()
            .with_learning_rate(0.0)
            .fit(&features, &targets, &names)
            .unwrap_err();
        assert!(matches!(err, BoostError::InvalidLearningRate { .. }));
        let err = GradientBoostingConfig::new(5)
            .unwrap()
            .with_subsample(1.5)
            .fit(&features, &targets, &names)
            .unwrap_err();
        assert!(matches!(err, BoostError::InvalidFraction { name: "subsample", .. }));
        let err = GradientBoostingConfig::new(5)
            .unwrap()
            .fit(&features, &targets, &names[..1])
            .unwrap_err();
        assert!(matches!(err, BoostError::FeatureNameMismatch { expected: 2, got: 1 }));
        let err = GradientBoostingConfig::new(5)
            .unwrap()
            .with_max_depth(0)
            .fit(&features, &targets, &names)
            .unwrap_err();
        assert!(matches!(err, BoostError::InvalidMaxDepth { .. }));
    }
}
