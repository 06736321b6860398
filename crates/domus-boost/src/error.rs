use std::path::PathBuf;

/// Errors from tree ensemble training, evaluation, and search.
#[derive(Debug, thiserror::Error)]
pub enum BoostError {
    /// Returned when the number of boosting rounds or trees is zero.
    #[error("{name} must be at least 1, got 0")]
    InvalidEstimatorCount {
        /// Parameter name (`n_estimators` or `n_trees`).
        name: &'static str,
    },

    /// Returned when the learning rate is not in (0.0, 1.0].
    #[error("learning_rate must be in (0.0, 1.0], got {learning_rate}")]
    InvalidLearningRate {
        /// The invalid learning rate.
        learning_rate: f64,
    },

    /// Returned when max_depth is zero.
    #[error("max_depth must be at least 1, got {max_depth}")]
    InvalidMaxDepth {
        /// The invalid max_depth value provided.
        max_depth: usize,
    },

    /// Returned when min_samples_split is less than 2.
    #[error("min_samples_split must be at least 2, got {min_samples_split}")]
    InvalidMinSamplesSplit {
        /// The invalid min_samples_split value provided.
        min_samples_split: usize,
    },

    /// Returned when min_samples_leaf is zero.
    #[error("min_samples_leaf must be at least 1, got {min_samples_leaf}")]
    InvalidMinSamplesLeaf {
        /// The invalid min_samples_leaf value provided.
        min_samples_leaf: usize,
    },

    /// Returned when max_features resolves to 0 or exceeds n_features.
    #[error("max_features resolved to {max_features}, but must be in [1, {n_features}]")]
    InvalidMaxFeatures {
        /// The resolved max_features value.
        max_features: usize,
        /// The number of features in the dataset.
        n_features: usize,
    },

    /// Returned when a sampling fraction is not in (0.0, 1.0].
    #[error("{name} must be in (0.0, 1.0], got {value}")]
    InvalidFraction {
        /// Parameter name (`subsample`, `colsample`, `bootstrap_fraction`).
        name: &'static str,
        /// The invalid fraction.
        value: f64,
    },

    /// Returned when a histogram split method asks for fewer than two bins.
    #[error("histogram n_bins must be at least 2, got {n_bins}")]
    InvalidBinCount {
        /// The invalid bin count.
        n_bins: usize,
    },

    /// Returned when the test fraction of a train/test split is not in (0.0, 1.0).
    #[error("test fraction must be in (0.0, 1.0), got {fraction}")]
    InvalidTestFraction {
        /// The invalid fraction.
        fraction: f64,
    },

    /// Returned when n_folds is less than 2.
    #[error("n_folds must be at least 2, got {n_folds}")]
    InvalidFoldCount {
        /// The invalid n_folds value provided.
        n_folds: usize,
    },

    /// Returned when there are too few samples to split as requested.
    #[error("{n_samples} samples are too few, need at least {needed}")]
    TooFewSamples {
        /// The number of samples available.
        n_samples: usize,
        /// The minimum number required.
        needed: usize,
    },

    /// Returned when the training dataset has zero samples.
    #[error("training dataset has zero samples")]
    EmptyDataset,

    /// Returned when the training dataset has zero feature columns.
    #[error("training dataset has zero feature columns")]
    ZeroFeatures,

    /// Returned when a sample has a different number of features than expected.
    #[error("sample {sample_index} has {got} features, expected {expected}")]
    FeatureCountMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features in the sample.
        got: usize,
        /// The zero-based index of the offending sample.
        sample_index: usize,
    },

    /// Returned when a sample has a different number of features at prediction time.
    #[error("prediction input has {got} features, expected {expected}")]
    PredictionFeatureMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features in the prediction input.
        got: usize,
    },

    /// Returned when the number of feature names differs from the feature count.
    #[error("{got} feature names given for {expected} features")]
    FeatureNameMismatch {
        /// The number of features.
        expected: usize,
        /// The number of names provided.
        got: usize,
    },

    /// Returned when a training value is NaN or infinite.
    #[error("non-finite value at sample {sample_index}, feature {feature_index}")]
    NonFiniteValue {
        /// The zero-based index of the offending sample.
        sample_index: usize,
        /// The zero-based index of the offending feature column.
        feature_index: usize,
    },

    /// Returned when a target value is NaN or infinite.
    #[error("non-finite target at sample {sample_index}")]
    NonFiniteTarget {
        /// The zero-based index of the offending sample.
        sample_index: usize,
    },

    /// Returned when the number of targets differs from the number of samples.
    #[error("{n_targets} targets given for {n_samples} samples")]
    TargetCountMismatch {
        /// The number of samples.
        n_samples: usize,
        /// The number of targets.
        n_targets: usize,
    },

    /// Returned when a metric receives no values.
    #[error("cannot compute a metric on empty input")]
    EmptyMetricInput,

    /// Returned when a metric receives slices of different lengths.
    #[error("metric inputs differ in length: {n_true} true values, {n_pred} predictions")]
    MetricLengthMismatch {
        /// The number of true values.
        n_true: usize,
        /// The number of predictions.
        n_pred: usize,
    },

    /// Returned when a study is asked to run zero trials.
    #[error("n_trials must be at least 1, got 0")]
    InvalidTrialCount,

    /// Returned when a search parameter's range is empty or not finite.
    #[error("invalid range for parameter \"{name}\": [{low}, {high}]")]
    InvalidParamRange {
        /// Parameter name.
        name: String,
        /// Lower bound.
        low: f64,
        /// Upper bound.
        high: f64,
    },

    /// Returned when an objective reads a parameter the search space lacks.
    #[error("parameter \"{name}\" is not in the search space")]
    MissingParam {
        /// Parameter name.
        name: String,
    },

    /// Returned when every trial of a study fails.
    #[error("all {n_trials} trials failed; last error: {last_error}")]
    AllTrialsFailed {
        /// The number of trials run.
        n_trials: usize,
        /// The error message of the last trial.
        last_error: String,
    },

    /// Returned when model serialization fails.
    #[error("failed to serialize model")]
    SerializeModel {
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when model deserialization fails.
    #[error("failed to deserialize model from {path}")]
    DeserializeModel {
        /// Path to the model file that could not be deserialized.
        path: PathBuf,
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when writing the model file fails.
    #[error("failed to write model to {path}")]
    WriteModel {
        /// Path to the file that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when reading the model file fails.
    #[error("failed to read model from {path}")]
    ReadModel {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when loading a model with an incompatible format version.
    #[error("incompatible model version in {path}: expected {expected}, found {found}")]
    IncompatibleModelVersion {
        /// The model format version this build expects.
        expected: u32,
        /// The model format version found in the file.
        found: u32,
        /// Path to the model file with the incompatible version.
        path: PathBuf,
    },
}
