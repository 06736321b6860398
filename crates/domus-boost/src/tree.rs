use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, instrument};

use crate::{
    BoostError,
    histogram::FeatureBins,
    node::{Node, NodeIndex},
    split::{SplitMethod, TargetStats, find_split},
};

/// Configuration for a single CART regression tree.
///
/// Construct via [`RegressionTreeConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter           | Default               |
/// |---------------------|-----------------------|
/// | `split_method`      | `Exact`               |
/// | `max_depth`         | `None` (unlimited)    |
/// | `min_samples_split` | 2                     |
/// | `min_samples_leaf`  | 1                     |
/// | `max_features`      | `None` (all features) |
/// | `seed`              | 42                    |
#[derive(Debug, Clone)]
pub struct RegressionTreeConfig {
    pub(crate) split_method: SplitMethod,
    pub(crate) max_depth: Option<usize>,
    pub(crate) min_samples_split: usize,
    pub(crate) min_samples_leaf: usize,
    pub(crate) max_features: Option<usize>,
    pub(crate) seed: u64,
}

impl RegressionTreeConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            split_method: SplitMethod::Exact,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            seed: 42,
        }
    }

    /// Set the split-finding strategy.
    #[must_use]
    pub fn with_split_method(mut self, split_method: SplitMethod) -> Self {
        self.split_method = split_method;
        self
    }

    /// Set the maximum tree depth (root is depth 0). `None` means unlimited.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the minimum number of samples required to attempt a split.
    #[must_use]
    pub fn with_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.min_samples_split = min_samples_split;
        self
    }

    /// Set the minimum number of samples required in each leaf after a split.
    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf;
        self
    }

    /// Set the maximum number of features to consider at each split.
    #[must_use]
    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set the random seed for reproducibility.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    // --- Getters ---

    /// Return the split-finding strategy.
    #[must_use]
    pub fn split_method(&self) -> SplitMethod {
        self.split_method
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

    /// Return the maximum features to consider per split, if set.
    #[must_use]
    pub fn max_features(&self) -> Option<usize> {
        self.max_features
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Train a regression tree on the provided row-major dataset.
    ///
    /// `features[sample_idx][feature_idx]`, `targets[sample_idx]`.
    ///
    /// # Errors
    ///
    /// | Variant                                 | When                                              |
    /// |-----------------------------------------|---------------------------------------------------|
    /// | [`BoostError::EmptyDataset`]            | `features` is empty                               |
    /// | [`BoostError::ZeroFeatures`]            | rows have zero feature columns                    |
    /// | [`BoostError::FeatureCountMismatch`]    | rows have inconsistent lengths                    |
    /// | [`BoostError::TargetCountMismatch`]     | `targets.len() != features.len()`                 |
    /// | [`BoostError::NonFiniteValue`]          | any feature value is NaN or infinite              |
    /// | [`BoostError::NonFiniteTarget`]         | any target is NaN or infinite                     |
    /// | [`BoostError::InvalidMaxFeatures`]      | `max_features` outside [1, n_features]            |
    /// | [`BoostError::InvalidMaxDepth`]         | `max_depth` is `Some(0)`                          |
    /// | [`BoostError::InvalidMinSamplesSplit`]  | `min_samples_split` < 2                           |
    /// | [`BoostError::InvalidMinSamplesLeaf`]   | `min_samples_leaf` < 1                            |
    /// | [`BoostError::InvalidBinCount`]         | histogram with fewer than 2 bins                  |
    #[instrument(skip(self, features, targets), fields(n_samples = features.len()))]
    pub fn fit(&self, features: &[Vec<f64>], targets: &[f64]) -> Result<RegressionTree, BoostError> {
        let n_features = validate_dataset(features, targets)?;
        self.validate(n_features)?;

        let col_features = to_columns(features, n_features);
        let bins = self.build_bins(&col_features);
        let sample_indices: Vec<usize> = (0..features.len()).collect();
        Ok(self.grow(&col_features, targets, &sample_indices, bins.as_ref()))
    }

    /// Check the config against a dataset with `n_features` columns.
    pub(crate) fn validate(&self, n_features: usize) -> Result<(), BoostError> {
        if self.max_depth == Some(0) {
            return Err(BoostError::InvalidMaxDepth { max_depth: 0 });
        }
        if self.min_samples_split < 2 {
            return Err(BoostError::InvalidMinSamplesSplit {
                min_samples_split: self.min_samples_split,
            });
        }
        if self.min_samples_leaf < 1 {
            return Err(BoostError::InvalidMinSamplesLeaf {
                min_samples_leaf: self.min_samples_leaf,
            });
        }
        let max_features = self.max_features.unwrap_or(n_features);
        if max_features == 0 || max_features > n_features {
            return Err(BoostError::InvalidMaxFeatures {
                max_features,
                n_features,
            });
        }
        if let SplitMethod::Histogram { n_bins } = self.split_method
            && n_bins < 2
        {
            return Err(BoostError::InvalidBinCount { n_bins });
        }
        Ok(())
    }

    /// Pre-compute histogram bins when using the histogram split method.
    pub(crate) fn build_bins(&self, col_features: &[Vec<f64>]) -> Option<FeatureBins> {
        match self.split_method {
            SplitMethod::Histogram { n_bins } => Some(FeatureBins::build(col_features, n_bins)),
            SplitMethod::Exact => None,
        }
    }

    /// Grow a tree on the rows `sample_indices` of pre-validated column-major
    /// data.
    pub(crate) fn grow(
        &self,
        col_features: &[Vec<f64>],
        targets: &[f64],
        sample_indices: &[usize],
        bins: Option<&FeatureBins>,
    ) -> RegressionTree {
        let n_features = col_features.len();
        let max_features = self.max_features.unwrap_or(n_features);
        let mut builder = TreeBuilder {
            col_features,
            targets,
            config: self,
            bins,
            max_features,
            rng: ChaCha8Rng::seed_from_u64(self.seed),
            arena: Vec::new(),
        };
        let root = builder.build(sample_indices, 0);
        let nodes = builder.arena;

        debug!(root_index = root.index(), n_nodes = nodes.len(), "regression tree built");
        RegressionTree { nodes, n_features }
    }
}

impl Default for RegressionTreeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate a row-major dataset and its targets; return the feature count.
pub(crate) fn validate_dataset(features: &[Vec<f64>], targets: &[f64]) -> Result<usize, BoostError> {
    if features.is_empty() {
        return Err(BoostError::EmptyDataset);
    }
    let n_features = features[0].len();
    if n_features == 0 {
        return Err(BoostError::ZeroFeatures);
    }
    if targets.len() != features.len() {
        return Err(BoostError::TargetCountMismatch {
            n_samples: features.len(),
            n_targets: targets.len(),
        });
    }
    for (sample_index, row) in features.iter().enumerate() {
        if row.len() != n_features {
            return Err(BoostError::FeatureCountMismatch {
                expected: n_features,
                got: row.len(),
                sample_index,
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
    Ok(n_features)
}

/// Convert row-major features to column-major.
pub(crate) fn to_columns(features: &[Vec<f64>], n_features: usize) -> Vec<Vec<f64>> {
    (0..n_features)
        .map(|feat_idx| features.iter().map(|row| row[feat_idx]).collect())
        .collect()
}

struct TreeBuilder<'a> {
    col_features: &'a [Vec<f64>],
    targets: &'a [f64],
    config: &'a RegressionTreeConfig,
    bins: Option<&'a FeatureBins>,
    max_features: usize,
    rng: ChaCha8Rng,
    arena: Vec<Node>,
}

impl TreeBuilder<'_> {
    /// Recursively build the arena; returns the index of the node created.
    fn build(&mut self, sample_indices: &[usize], depth: usize) -> NodeIndex {
        let stats = TargetStats::from_indices(self.targets, sample_indices);
        let impurity = stats.impurity();
        let n_samples = stats.n;

        let depth_exceeded = self.config.max_depth.is_some_and(|max_d| depth >= max_d);
        let too_few = n_samples < self.config.min_samples_split;
        let pure = is_constant(self.targets, sample_indices);

        let split = if too_few || pure || depth_exceeded {
            None
        } else {
            find_split(
                self.col_features,
                self.targets,
                sample_indices,
                self.config.split_method,
                self.bins,
                self.max_features,
                self.config.min_samples_leaf,
                &mut self.rng,
            )
        };

        let Some(split) = split else {
            let idx = self.arena.len();
            self.arena.push(Node::Leaf {
                value: stats.mean(),
                impurity,
                n_samples,
            });
            return NodeIndex::new(idx);
        };

        // Reserve the parent slot so children get later indices.
        let node_idx = self.arena.len();
        self.arena.push(Node::Leaf {
            value: stats.mean(),
            impurity,
            n_samples,
        });
        let left = self.build(&split.left_indices, depth + 1);
        let right = self.build(&split.right_indices, depth + 1);
        self.arena[node_idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
            impurity,
            n_samples,
            gain: split.gain,
        };
        NodeIndex::new(node_idx)
    }
}

fn is_constant(targets: &[f64], sample_indices: &[usize]) -> bool {
    match sample_indices.split_first() {
        Some((&first, rest)) => rest.iter().all(|&si| targets[si] == targets[first]),
        None => true,
    }
}

/// A fitted CART regression tree.
///
/// Stored as an arena-based `Vec<Node>`; the root is at index 0.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RegressionTree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) n_features: usize,
}

impl RegressionTree {
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
        Ok(self.predict_row(sample))
    }

    /// Predict a sample already known to have `n_features` values.
    pub(crate) fn predict_row(&self, sample: &[f64]) -> f64 {
        let mut idx = 0usize;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value, .. } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    idx = if sample[feature.index()] <= *threshold {
                        left.index()
                    } else {
                        right.index()
                    };
                }
            }
        }
    }

    /// Sum of split gains per feature, unnormalized.
    pub(crate) fn gain_by_feature(&self) -> Vec<f64> {
        let mut totals = vec![0.0f64; self.n_features];
        for node in &self.nodes {
            if let Node::Split { feature, gain, .. } = node {
                totals[feature.index()] += gain;
            }
        }
        totals
    }

    /// Compute feature importances: split gains summed by feature, normalized
    /// to sum to 1.0. All zeros when the tree is a single leaf.
    #[must_use]
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut totals = self.gain_by_feature();
        let sum: f64 = totals.iter().sum();
        if sum > 0.0 {
            totals.iter_mut().for_each(|v| *v /= sum);
        }
        totals
    }

    /// Return the arena of nodes; the root is at index 0.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Return the total number of nodes in the tree (both splits and leaves).
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Return the number of leaf nodes.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Return the maximum depth of the tree. A single leaf has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }
        let mut max_depth = 0usize;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((node_idx, d)) = stack.pop() {
            match &self.nodes[node_idx] {
                Node::Leaf { .. } => max_depth = max_depth.max(d),
                Node::Split { left, right, .. } => {
                    stack.push((left.index(), d + 1));
                    stack.push((right.index(), d + 1));
                }
            }
        }
        max_depth
    }
}
