//! Histogram-based splitting for regression trees.
//!
//! Quantile binning pre-computes per-feature bin edges once per training set;
//! each split evaluation then runs in O(n) for binning plus O(B) for scanning
//! bins, avoiding the O(n log n) sort of exact CART. Boosting reuses the same
//! bins across every round.

use rand::Rng;

use crate::node::FeatureIndex;
use crate::split::{SplitResult, TargetStats, partition, sample_features};

/// Pre-computed quantile bin edges for all features.
#[derive(Debug, Clone)]
pub(crate) struct FeatureBins {
    /// Bin edges per feature, strictly increasing and strictly inside the
    /// feature's (min, max). Values <= edges[0] go into bin 0, values in
    /// (edges[i-1], edges[i]] go into bin i.
    edges: Vec<Vec<f64>>,
}

impl FeatureBins {
    /// Build quantile-based bin edges from column-major features.
    ///
    /// Features with all identical values get zero edges (treated as constant).
    pub(crate) fn build(col_features: &[Vec<f64>], n_bins: usize) -> Self {
        let edges = col_features
            .iter()
            .map(|col| {
                if col.is_empty() {
                    return Vec::new();
                }
                let mut sorted = col.clone();
                sorted.sort_unstable_by(|a, b| a.total_cmp(b));
                let n = sorted.len();
                let (min, max) = (sorted[0], sorted[n - 1]);
                if min == max {
                    return Vec::new();
                }

                let mut raw_edges: Vec<f64> = (1..n_bins)
                    .map(|k| {
                        let pos = (k as f64 / n_bins as f64) * (n - 1) as f64;
                        let lo = pos.floor() as usize;
                        let hi = (lo + 1).min(n - 1);
                        let frac = pos - lo as f64;
                        sorted[lo] + frac * (sorted[hi] - sorted[lo])
                    })
                    .collect();
                raw_edges.dedup_by(|a, b| *a == *b);
                raw_edges.retain(|&e| e > min && e < max);
                raw_edges
            })
            .collect();

        Self { edges }
    }

    /// Return the bin index for a value: the number of edges below it.
    pub(crate) fn bin_index(&self, feat_idx: usize, value: f64) -> usize {
        self.edges[feat_idx].partition_point(|&e| e < value)
    }

    /// Return the number of bins for a feature (`edges.len() + 1`, or 0 if
    /// the feature is constant).
    pub(crate) fn n_bins_for_feature(&self, feat_idx: usize) -> usize {
        match self.edges[feat_idx].len() {
            0 => 0,
            n => n + 1,
        }
    }

    /// Return the threshold closing bin `bin_idx`.
    pub(crate) fn threshold(&self, feat_idx: usize, bin_idx: usize) -> f64 {
        self.edges[feat_idx][bin_idx]
    }
}

/// Find the best split by scanning histogram bin boundaries.
///
/// For each of `max_features` randomly chosen features, accumulates per-bin
/// target sums, then scans the bins left-to-right. The threshold is the edge
/// value at the chosen boundary.
///
/// Returns `None` when no valid split exists.
pub(crate) fn find_histogram_split(
    col_features: &[Vec<f64>],
    targets: &[f64],
    sample_indices: &[usize],
    bins: &FeatureBins,
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
        let actual_bins = bins.n_bins_for_feature(feat_idx);
        if actual_bins == 0 {
            continue;
        }

        let mut bin_stats = vec![TargetStats::default(); actual_bins];
        let feat_col = &col_features[feat_idx];
        for &si in sample_indices {
            let bin = bins.bin_index(feat_idx, feat_col[si]).min(actual_bins - 1);
            bin_stats[bin].push(targets[si]);
        }

        // Splitting after bin b sends bins [0..=b] left; the last bin has no
        // boundary after it.
        let mut left = TargetStats::default();
        let mut right = parent;
        for (split_bin, stats) in bin_stats.iter().enumerate().take(actual_bins - 1) {
            left.add(stats);
            right.sub(stats);
            if left.n < min_samples_leaf.max(1) || right.n < min_samples_leaf.max(1) {
                continue;
            }
            let gain = parent_sse - left.sse() - right.sse();
            if gain > best_gain {
                best_gain = gain;
                best = Some((FeatureIndex::new(feat_idx), bins.threshold(feat_idx, split_bin)));
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

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::{FeatureBins, find_histogram_split};
    use crate::split::find_best_split;

    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        (
            vec![vec![1.0, 2.0, 3.0, 10.0, 11.0, 12.0]],
            vec![5.0, 5.0, 5.0, 50.0, 50.0, 50.0],
        )
    }

    #[test]
    fn histogram_step_function() {
        let (features, targets) = step_data();
        let indices: Vec<usize> = (0..6).collect();
        let bins = FeatureBins::build(&features, 8);
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let split = find_histogram_split(&features, &targets, &indices, &bins, 1, 1, &mut rng)
            .expect("should split a step function");
        assert!(split.threshold >= 3.0 && split.threshold < 10.0, "threshold = {}", split.threshold);
        assert_eq!(split.left_indices.len(), 3);
        assert_eq!(split.right_indices.len(), 3);
    }

    #[test]
    fn histogram_matches_exact_gain_on_step() {
        let (features, targets) = step_data();
        let indices: Vec<usize> = (0..6).collect();
        let bins = FeatureBins::build(&features, 16);

        let hist = find_histogram_split(
            &features,
            &targets,
            &indices,
            &bins,
            1,
            1,
            &mut ChaCha8Rng::seed_from_u64(42),
        )
        .unwrap();
        let exact = find_best_split(&features, &targets, &indices, 1, 1, &mut ChaCha8Rng::seed_from_u64(42)).unwrap();
        assert!((hist.gain - exact.gain).abs() < 1e-6);
    }

    #[test]
    fn constant_feature_has_no_bins() {
        let features = vec![vec![5.0; 4]];
        let bins = FeatureBins::build(&features, 8);
        assert_eq!(bins.n_bins_for_feature(0), 0);
        let targets = vec![1.0, 2.0, 3.0, 4.0];
        let indices: Vec<usize> = (0..4).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        assert!(find_histogram_split(&features, &targets, &indices, &bins, 1, 1, &mut rng).is_none());
    }

    #[test]
    fn edges_strictly_increasing_inside_range() {
        let features = vec![(1..=10).map(f64::from).collect::<Vec<_>>()];
        let bins = FeatureBins::build(&features, 5);
        let edges = &bins.edges[0];
        assert!(!edges.is_empty() && edges.len() <= 4);
        assert!(edges.windows(2).all(|w| w[0] < w[1]));
        assert!(edges.iter().all(|&e| e > 1.0 && e < 10.0));
    }

    #[test]
    fn bin_index_bounds() {
        let features = vec![(1..=10).map(f64::from).collect::<Vec<_>>()];
        let bins = FeatureBins::build(&features, 4);
        assert_eq!(bins.bin_index(0, 1.0), 0);
        assert_eq!(bins.bin_index(0, 10.0), bins.n_bins_for_feature(0) - 1);
    }
}
