use rand::Rng;

use crate::histogram::{FeatureBins, find_histogram_split};
use crate::node::{FeatureIndex, Impurity};

/// Strategy for finding split thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SplitMethod {
    /// Sort each candidate feature and evaluate every boundary between
    /// distinct values.
    Exact,
    /// Bucket each feature into quantile bins once, then evaluate only bin
    /// boundaries.
    Histogram {
        /// Requested number of bins per feature.
        n_bins: usize,
    },
}

/// Running count, sum and sum of squares of targets.
///
/// The sum of squared errors around the mean is `sum_sq - sum² / n`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct TargetStats {
    pub(crate) n: usize,
    pub(crate) sum: f64,
    pub(crate) sum_sq: f64,
}

impl TargetStats {
    pub(crate) fn from_indices(targets: &[f64], sample_indices: &[usize]) -> Self {
        let mut stats = Self::default();
        for &si in sample_indices {
            stats.push(targets[si]);
        }
        stats
    }

    pub(crate) fn push(&mut self, y: f64) {
        self.n += 1;
        self.sum += y;
        self.sum_sq += y * y;
    }

    pub(crate) fn add(&mut self, other: &Self) {
        self.n += other.n;
        self.sum += other.sum;
        self.sum_sq += other.sum_sq;
    }

    pub(crate) fn sub(&mut self, other: &Self) {
        self.n -= other.n;
        self.sum -= other.sum;
        self.sum_sq -= other.sum_sq;
    }

    pub(crate) fn mean(&self) -> f64 {
        if self.n == 0 { 0.0 } else { self.sum / self.n as f64 }
    }

    /// Sum of squared errors around the mean, clamped at zero.
    pub(crate) fn sse(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        (self.sum_sq - self.sum * self.sum / self.n as f64).max(0.0)
    }

    pub(crate) fn impurity(&self) -> Impurity {
        if self.n == 0 {
            Impurity::new(0.0)
        } else {
            Impurity::new(self.sse() / self.n as f64)
        }
    }
}

/// Result of finding the best split for a node.
#[derive(Debug, Clone)]
pub(crate) struct SplitResult {
    /// Feature used for the split.
    pub(crate) feature: FeatureIndex,
    /// Threshold value.
    pub(crate) threshold: f64,
    /// Decrease in the sum of squared errors.
    pub(crate) gain: f64,
    /// Sample indices going to the left child.
    pub(crate) left_indices: Vec<usize>,
    /// Sample indices going to the right child.
    pub(crate) right_indices: Vec<usize>,
}

/// Choose up to `max_features` feature indices by partial Fisher-Yates.
pub(crate) fn sample_features(n_features: usize, max_features: usize, rng: &mut impl Rng) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n_features).collect();
    let take = max_features.min(n_features);
    for i in 0..take {
        let j = rng.gen_range(i..n_features);
        order.swap(i, j);
    }
    order.truncate(take);
    order
}

/// Partition `sample_indices` on `feature <= threshold`.
pub(crate) fn partition(
    col_features: &[Vec<f64>],
    sample_indices: &[usize],
    feature: FeatureIndex,
    threshold: f64,
) -> (Vec<usize>, Vec<usize>) {
    let feat_col = &col_features[feature.index()];
    let mut left = Vec::with_capacity(sample_indices.len() / 2);
    let mut right = Vec::with_capacity(sample_indices.len() / 2);
    for &si in sample_indices {
        if feat_col[si] <= threshold {
            left.push(si);
        } else {
            right.push(si);
        }
    }
    (left, right)
}

/// Find the best split with the configured method.
#[allow(clippy::too_many_arguments)]
pub(crate) fn find_split(
    col_features: &[Vec<f64>],
    targets: &[f64],
    sample_indices: &[usize],
    method: SplitMethod,
    bins: Option<&FeatureBins>,
    max_features: usize,
    min_samples_leaf: usize,
    rng: &mut impl Rng,
) -> Option<SplitResult> {
    match (method, bins) {
        (SplitMethod::Histogram { .. }, Some(bins)) => find_histogram_split(
            col_features,
            targets,
            sample_indices,
            bins,
            max_features,
            min_samples_leaf,
            rng,
        ),
        _ => find_best_split(
            col_features,
            targets,
            sample_indices,
            max_features,
            min_samples_leaf,
            rng,
        ),
    }
}

/// Find the split with the largest decrease in squared error among a random
/// subset of features.
///
/// For each of `max_features` randomly chosen features, sorts the samples by
/// feature value and scans left-to-right with running target sums.
///
/// Returns `None` when no valid split exists (all values identical, no
/// positive gain, or `min_samples_leaf` cannot be met).
///
/// `col_features` is column-major: `col_features[feature_idx][sample_idx]`.
pub(crate) fn find_best_split(
    col_features: &[Vec<f64>],
    targets: &[f64],
    sample_indices: &[usize],
    max_features: usize,
    min_samples_leaf: usize,
    rng: &mut impl Rng,
) -> Option<SplitResult> {
    let n_features = col_features.len();
    let n_samples = sample_indices.len();
    if n_samples < 2 || n_features == 0 {
        return None;
    }

    let parent = TargetStats::from_indices(targets, sample_indices);
    let parent_sse = parent.sse();

    let mut best_gain = 0.0;
    let mut best: Option<(FeatureIndex, f64)> = None;

    for feat_idx in sample_features(n_features, max_features, rng) {
        let feat_col = &col_features[feat_idx];
        let mut sorted: Vec<(f64, usize)> = sample_indices.iter().map(|&si| (feat_col[si], si)).collect();
        sorted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

        let mut left = TargetStats::default();
        let mut right = parent;
        for i in 0..(n_samples - 1) {
            let (val_i, si) = sorted[i];
            let y = targets[si];
            left.push(y);
            right.n -= 1;
            right.sum -= y;
            right.sum_sq -= y * y;

            let val_next = sorted[i + 1].0;
            if val_i == val_next {
                continue;
            }
            if left.n < min_samples_leaf || right.n < min_samples_leaf {
                continue;
            }

            let gain = parent_sse - left.sse() - right.sse();
            if gain > best_gain {
                best_gain = gain;
                let mid = (val_i + val_next) / 2.0;
                // Adjacent floats can round the midpoint up to val_next.
                let threshold = if mid < val_next { mid } else { val_i };
                best = Some((FeatureIndex::new(feat_idx), threshold));
            }
        }
    }

    let (feature, threshold) = best?;
    let (left_indices, right_indices) = partition(col_features, sample_indices, feature, threshold);
    Some(SplitResult {
        feature,
        threshold,
        gain: best_gain,
        left_indices,
        right_indices,
    })
}
