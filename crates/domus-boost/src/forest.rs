//! Random forest regression with parallel tree construction.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info, instrument, warn};

use crate::error::BoostError;
use crate::importance::{RankedFeature, aggregate_importances};
use crate::metrics::RegressionMetrics;
use crate::split::SplitMethod;
use crate::tree::{RegressionTree, RegressionTreeConfig, to_columns, validate_dataset};

/// Strategy for determining the number of features to consider at each split.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum MaxFeatures {
    /// Square root of total features.
    Sqrt,
    /// Log base 2 of total features.
    Log2,
    /// A fraction of total features (must be in (0.0, 1.0]).
    Fraction(f64),
    /// A fixed count.
    Fixed(usize),
    /// All features (no subsampling).
    All,
}

/// Whether to score each sample with the trees that did not see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OobMode {
    /// Compute out-of-bag R² and MSE.
    Enabled,
    /// Skip out-of-bag evaluation.
    Disabled,
}

/// Configuration for random forest training.
///
/// Construct via [`RandomForestConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter            | Default     |
/// |----------------------|-------------|
/// | `max_features`       | `All`       |
/// | `max_depth`          | `None`      |
/// | `min_samples_split`  | 2           |
/// | `min_samples_leaf`   | 1           |
/// | `split_method`       | `Exact`     |
/// | `seed`               | 42          |
/// | `oob_mode`           | `Disabled`  |
/// | `bootstrap_fraction` | 1.0         |
#[derive(Debug, Clone)]
pub struct RandomForestConfig {
    pub(crate) n_trees: usize,
    pub(crate) max_features: MaxFeatures,
    pub(crate) max_depth: Option<usize>,
    pub(crate) min_samples_split: usize,
    pub(crate) min_samples_leaf: usize,
    pub(crate) split_method: SplitMethod,
    pub(crate) seed: u64,
    pub(crate) oob_mode: OobMode,
    pub(crate) bootstrap_fraction: f64,
}

impl RandomForestConfig {
    /// Create a new config with the given number of trees.
    ///
    /// # Errors
    ///
    /// Returns [`BoostError::InvalidEstimatorCount`] if `n_trees` is zero.
    pub fn new(n_trees: usize) -> Result<Self, BoostError> {
        if n_trees == 0 {
            return Err(BoostError::InvalidEstimatorCount { name: "n_trees" });
        }
        Ok(Self {
            n_trees,
            max_features: MaxFeatures::All,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            split_method: SplitMethod::Exact,
            seed: 42,
            oob_mode: OobMode::Disabled,
            bootstrap_fraction: 1.0,
        })
    }

    // --- Setters ---

    /// Set the feature subsampling strategy.
    #[must_use]
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set the maximum tree depth. `None` means unlimited.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the minimum number of samples required to split a node.
    #[must_use]
    pub fn with_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.min_samples_split = min_samples_split;
        self
    }

    /// Set the minimum number of samples required in each leaf.
    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf;
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

    /// Enable or disable out-of-bag evaluation.
    #[must_use]
    pub fn with_oob_mode(mut self, oob_mode: OobMode) -> Self {
        self.oob_mode = oob_mode;
        self
    }

    /// Set the bootstrap sample size as a fraction of the training set.
    #[must_use]
    pub fn with_bootstrap_fraction(mut self, fraction: f64) -> Self {
        self.bootstrap_fraction = fraction;
        self
    }

    // --- Getters ---

    /// Return the number of trees.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.n_trees
    }

    /// Return the feature subsampling strategy.
    #[must_use]
    pub fn max_features(&self) -> MaxFeatures {
        self.max_features
    }

    /// Return the maximum depth limit, if any.
    #[must_use]
    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    /// Return the minimum samples required to split a node.
    #[must_use]
    pub fn min_samples_split(&self) -> usize {
        self.min_samples_split
    }

    /// Return the minimum samples required in each leaf.
    #[must_use]
    pub fn min_samples_leaf(&self) -> usize {
        self.min_samples_leaf
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

    /// Return the out-of-bag mode.
    #[must_use]
    pub fn oob_mode(&self) -> OobMode {
        self.oob_mode
    }

    /// Return the bootstrap fraction.
    #[must_use]
    pub fn bootstrap_fraction(&self) -> f64 {
        self.bootstrap_fraction
    }

    /// Train a random forest on `features`/`targets`.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---|---|
    /// | dataset errors | see [`RegressionTreeConfig::fit`] |
    /// | [`BoostError::FeatureNameMismatch`] | `feature_names.len()` differs from the feature count |
    /// | [`BoostError::InvalidMaxFeatures`] | `max_features` resolves outside [1, n_features] |
    /// | [`BoostError::InvalidFraction`] | bootstrap fraction outside (0.0, 1.0] |
    /// | tree config errors | see [`RegressionTreeConfig::fit`] |
    pub fn fit(
        &self,
        features: &[Vec<f64>],
        targets: &[f64],
        feature_names: &[String],
    ) -> Result<RandomForestResult, BoostError> {
        train(self, features, targets, feature_names)
    }
}

/// Resolve `MaxFeatures` to a concrete count.
pub(crate) fn resolve_max_features(max_features: MaxFeatures, n_features: usize) -> Result<usize, BoostError> {
    let resolved = match max_features {
        MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
        MaxFeatures::Log2 => (n_features as f64).log2().ceil().max(1.0) as usize,
        MaxFeatures::Fraction(f) => (n_features as f64 * f).ceil() as usize,
        MaxFeatures::Fixed(n) => n,
        MaxFeatures::All => n_features,
    };
    if resolved == 0 || resolved > n_features {
        return Err(BoostError::InvalidMaxFeatures {
            max_features: resolved,
            n_features,
        });
    }
    Ok(resolved)
}

/// Draw a bootstrap sample (with replacement) and the out-of-bag indices.
fn bootstrap_sample(n_samples: usize, draw_count: usize, rng: &mut impl Rng) -> (Vec<usize>, Vec<usize>) {
    let mut in_bag = vec![false; n_samples];
    let mut bootstrap_indices = Vec::with_capacity(draw_count);
    for _ in 0..draw_count {
        let idx = rng.gen_range(0..n_samples);
        bootstrap_indices.push(idx);
        in_bag[idx] = true;
    }
    let oob_indices: Vec<usize> = (0..n_samples).filter(|&i| !in_bag[i]).collect();
    (bootstrap_indices, oob_indices)
}

#[instrument(skip_all, fields(n_trees = config.n_trees, n_samples = features.len()))]
fn train(
    config: &RandomForestConfig,
    features: &[Vec<f64>],
    targets: &[f64],
    feature_names: &[String],
) -> Result<RandomForestResult, BoostError> {
    let n_features = validate_dataset(features, targets)?;
    if feature_names.len() != n_features {
        return Err(BoostError::FeatureNameMismatch {
            expected: n_features,
            got: feature_names.len(),
        });
    }
    let max_features = resolve_max_features(config.max_features, n_features)?;
    if !(config.bootstrap_fraction > 0.0 && config.bootstrap_fraction <= 1.0) {
        return Err(BoostError::InvalidFraction {
            name: "bootstrap_fraction",
            value: config.bootstrap_fraction,
        });
    }

    let tree_config = RegressionTreeConfig::new()
        .with_split_method(config.split_method)
        .with_max_depth(config.max_depth)
        .with_min_samples_split(config.min_samples_split)
        .with_min_samples_leaf(config.min_samples_leaf)
        .with_max_features(Some(max_features));
    tree_config.validate(n_features)?;

    let n_samples = features.len();
    let draw_count = ((n_samples as f64) * config.bootstrap_fraction).ceil() as usize;
    let col_features = to_columns(features, n_features);
    let bins = tree_config.build_bins(&col_features);

    info!(
        n_trees = config.n_trees,
        n_samples,
        n_features,
        max_features,
        draw_count,
        "training random forest"
    );

    let mut master_rng = ChaCha8Rng::seed_from_u64(config.seed);
    let tree_seeds: Vec<u64> = (0..config.n_trees).map(|_| master_rng.r#gen()).collect();

    let tree_results: Vec<(RegressionTree, Vec<usize>)> = tree_seeds
        .into_par_iter()
        .map(|seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let (bootstrap_indices, oob_indices) = bootstrap_sample(n_samples, draw_count, &mut rng);
            let tree = tree_config.clone().with_seed(rng.r#gen()).grow(
                &col_features,
                targets,
                &bootstrap_indices,
                bins.as_ref(),
            );
            (tree, oob_indices)
        })
        .collect();

    let (trees, oob_indices_per_tree): (Vec<RegressionTree>, Vec<Vec<usize>>) = tree_results.into_iter().unzip();
    debug!(n_trees_trained = trees.len(), "tree training complete");

    let per_tree: Vec<Vec<f64>> = trees.iter().map(RegressionTree::feature_importances).collect();
    let importances = aggregate_importances(&per_tree, feature_names);

    let oob_score = match config.oob_mode {
        OobMode::Enabled => compute_oob(&trees, features, targets, &oob_indices_per_tree)?,
        OobMode::Disabled => None,
    };

    info!(
        oob_r2 = oob_score.as_ref().map(|s| s.metrics.r2),
        "random forest training complete"
    );

    Ok(RandomForestResult {
        forest: RandomForest {
            trees,
            n_features,
            feature_names: feature_names.to_vec(),
        },
        importances,
        oob_score,
        max_features,
    })
}

/// Out-of-bag evaluation result.
#[derive(Debug, Clone, PartialEq)]
pub struct OobScore {
    /// Metrics over the samples that had at least one out-of-bag tree.
    pub metrics: RegressionMetrics,
    /// Number of samples scored.
    pub n_oob_samples: usize,
}

/// Average the out-of-bag trees of every sample; `None` when no sample was
/// ever left out.
fn compute_oob(
    trees: &[RegressionTree],
    features: &[Vec<f64>],
    targets: &[f64],
    oob_indices_per_tree: &[Vec<usize>],
) -> Result<Option<OobScore>, BoostError> {
    let n_samples = features.len();
    let mut sums = vec![0.0f64; n_samples];
    let mut counts = vec![0usize; n_samples];
    for (tree, oob_indices) in trees.iter().zip(oob_indices_per_tree) {
        for &i in oob_indices {
            sums[i] += tree.predict_row(&features[i]);
            counts[i] += 1;
        }
    }

    let (y_true, y_pred): (Vec<f64>, Vec<f64>) = (0..n_samples)
        .filter(|&i| counts[i] > 0)
        .map(|i| (targets[i], sums[i] / counts[i] as f64))
        .unzip();
    if y_true.is_empty() {
        warn!("no sample was out of bag, skipping OOB evaluation");
        return Ok(None);
    }
    Ok(Some(OobScore {
        metrics: RegressionMetrics::compute(&y_true, &y_pred)?,
        n_oob_samples: y_true.len(),
    }))
}

/// A fitted random forest: the prediction is the mean over its trees.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RandomForest {
    pub(crate) trees: Vec<RegressionTree>,
    pub(crate) n_features: usize,
    pub(crate) feature_names: Vec<String>,
}

impl RandomForest {
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
        Ok(sum / self.trees.len() as f64)
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

    /// Rank features by mean normalized gain across trees.
    #[must_use]
    pub fn feature_importances(&self) -> Vec<RankedFeature> {
        let per_tree: Vec<Vec<f64>> = self.trees.iter().map(RegressionTree::feature_importances).collect();
        aggregate_importances(&per_tree, &self.feature_names)
    }

    /// Return the trees.
    #[must_use]
    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    /// Return the number of trees.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
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

/// Everything produced by a random forest training run.
#[derive(Debug, Clone)]
pub struct RandomForestResult {
    forest: RandomForest,
    importances: Vec<RankedFeature>,
    oob_score: Option<OobScore>,
    max_features: usize,
}

impl RandomForestResult {
    /// Return the fitted forest.
    #[must_use]
    pub fn forest(&self) -> &RandomForest {
        &self.forest
    }

    /// Consume the result and return the forest.
    #[must_use]
    pub fn into_forest(self) -> RandomForest {
        self.forest
    }

    /// Return the ranked feature importances.
    #[must_use]
    pub fn importances(&self) -> &[RankedFeature] {
        &self.importances
    }

    /// Return the out-of-bag score, if it was computed.
    #[must_use]
    pub fn oob_score(&self) -> Option<&OobScore> {
        self.oob_score.as_ref()
    }

    /// Return the resolved number of features considered per split.
    #[must_use]
    pub fn max_features(&self) -> usize {
        self.max_features
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::r2_score;

    fn make_regression() -> (Vec<Vec<f64>>, Vec<f64>, Vec<String>) {
        let features: Vec<Vec<f64>> = (0..80)
            .map(|i| vec![f64::from(i) * 0.25, f64::from(i % 3)])
            .collect();
        let targets = features.iter().map(|r| 2.0 * r[0] + 1.0).collect();
        (features, targets, vec!["x".to_string(), "z".to_string()])
    }

    #[test]
    fn fits_linear_trend() {
        let (features, targets, names) = make_regression();
        let result = RandomForestConfig::new(30).unwrap().fit(&features, &targets, &names).unwrap();
        let pred = result.forest().predict_batch(&features).unwrap();
        assert!(r2_score(&targets, &pred).unwrap() > 0.95);
        assert_eq!(result.importances()[0].name, "x");
        assert_eq!(result.max_features(), 2);
    }

    #[test]
    fn prediction_is_tree_mean() {
        let (features, targets, names) = make_regression();
        let forest = RandomForestConfig::new(7)
            .unwrap()
            .with_max_depth(Some(2))
            .fit(&features, &targets, &names)
            .unwrap()
            .into_forest();
        let sample = &features[10];
        let mean = forest.trees().iter().map(|t| t.predict(sample).unwrap()).sum::<f64>() / 7.0;
        assert!((forest.predict(sample).unwrap() - mean).abs() < 1e-12);
    }

    #[test]
    fn oob_score_computed() {
        let (features, targets, names) = make_regression();
        let result = RandomForestConfig::new(40)
            .unwrap()
            .with_oob_mode(OobMode::Enabled)
            .fit(&features, &targets, &names)
            .unwrap();
        let oob = result.oob_score().expect("OOB should be computed");
        assert!(oob.n_oob_samples > 0);
        assert!(oob.metrics.r2 > 0.9, "oob r2 = {}", oob.metrics.r2);
    }

    #[test]
    fn deterministic_with_same_seed() {
        let (features, targets, names) = make_regression();
        let config = RandomForestConfig::new(10)
            .unwrap()
            .with_max_features(MaxFeatures::Sqrt)
            .with_seed(99);
        let a = config.fit(&features, &targets, &names).unwrap().into_forest();
        let b = config.fit(&features, &targets, &names).unwrap().into_forest();
        assert_eq!(a, b);
    }

    #[test]
    fn histogram_forest() {
        let (features, targets, names) = make_regression();
        let result = RandomForestConfig::new(20)
            .unwrap()
            .with_split_method(SplitMethod::Histogram { n_bins: 32 })
            .fit(&features, &targets, &names)
            .unwrap();
        let pred = result.forest().predict_batch(&features).unwrap();
        assert!(r2_score(&targets, &pred).unwrap() > 0.9);
    }

    #[test]
    fn resolve_max_features_variants() {
        assert_eq!(resolve_max_features(MaxFeatures::Sqrt, 10).unwrap(), 4);
        assert_eq!(resolve_max_features(MaxFeatures::Log2, 8).unwrap(), 3);
        assert_eq!(resolve_max_features(MaxFeatures::Fraction(0.5), 5).unwrap(), 3);
        assert_eq!(resolve_max_features(MaxFeatures::All, 5).unwrap(), 5);
        assert!(resolve_max_features(MaxFeatures::Fixed(6), 5).is_err());
    }

    #[test]
    fn invalid_configs() {
        let (features, targets, names) = make_regression();
        assert!(matches!(
            RandomForestConfig::new(0),
            Err(BoostError::InvalidEstimatorCount { name: "n_trees" })
        ));
        let err = RandomForestConfig::new(3)
            .unwrap()
            .with_bootstrap_fraction(0.0)
            .fit(&features, &targets, &names)
            .unwrap_err();
        assert!(matches!(err, BoostError::InvalidFraction { name: "bootstrap_fraction", .. }));
        let err = RandomForestConfig::new(3)
            .unwrap()
            .with_min_samples_split(1)
            .fit(&features, &targets, &names)
            .unwrap_err();
        assert!(matches!(err, BoostError::InvalidMinSamplesSplit { .. }));
        let err = RandomForestConfig::new(3).unwrap().fit(&[], &[], &names).unwrap_err();
        assert!(matches!(err, BoostError::EmptyDataset));
    }
}
