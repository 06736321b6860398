//! Error types for domus-prep.

use std::path::PathBuf;

use domus_io::IoError;

/// Errors from cleaning, encoding, and feature engineering.
#[derive(Debug, thiserror::Error)]
pub enum PrepError {
    /// Returned when a table operation fails (missing column, wrong type, ...).
    #[error(transparent)]
    Table(#[from] IoError),

    /// Returned when a quantile is outside [0.0, 1.0] or the IQR quantiles are not ordered.
    #[error("invalid IQR quantiles: lower {lower}, upper {upper} (need 0 <= lower < upper <= 1)")]
    InvalidQuantiles {
        /// Lower quantile.
        lower: f64,
        /// Upper quantile.
        upper: f64,
    },

    /// Returned when an outlier factor or threshold is negative or non-finite.
    #[error("outlier {name} must be finite and non-negative, got {value}")]
    InvalidOutlierParameter {
        /// Parameter name (`factor` or `threshold`).
        name: &'static str,
        /// The invalid value.
        value: f64,
    },

    /// Returned when the rare-category threshold is zero.
    #[error("min_count must be at least 1, got {min_count}")]
    InvalidMinCount {
        /// The invalid threshold.
        min_count: usize,
    },

    /// Returned when a cleaning stage removes every remaining row.
    #[error("no listings left after {stage}")]
    NoRowsLeft {
        /// The stage that removed the last row.
        stage: &'static str,
    },

    /// Returned when the remaining table has no usable feature columns.
    #[error("no feature columns left after preprocessing")]
    NoFeatures,

    /// Returned when a feature column arrives as text with no fitted vocabulary.
    #[error("feature column \"{name}\" holds text but was numeric at fit time")]
    UnencodedText {
        /// Column name.
        name: String,
    },

    /// Returned when encoder serialization fails.
    #[error("failed to serialize encoder")]
    SerializeEncoder {
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when encoder deserialization fails.
    #[error("failed to deserialize encoder from {path}")]
    DeserializeEncoder {
        /// Path to the encoder file that could not be deserialized.
        path: PathBuf,
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when writing the encoder file fails.
    #[error("failed to write encoder to {path}")]
    WriteEncoder {
        /// Path to the file that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when reading the encoder file fails.
    #[error("failed to read encoder from {path}")]
    ReadEncoder {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when loading an encoder with an incompatible format version.
    #[error("incompatible encoder version in {path}: expected {expected}, found {found}")]
    IncompatibleEncoderVersion {
        /// The format version this build expects.
        expected: u32,
        /// The format version found in the file.
        found: u32,
        /// Path to the encoder file.
        path: PathBuf,
    },
}
