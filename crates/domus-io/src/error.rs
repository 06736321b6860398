//! I/O error types for domus-io.

use std::path::PathBuf;

/// Errors from listing JSON parsing, table manipulation, and result writing.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Returned when the input file does not exist or is unreadable.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when the input is not valid JSON.
    #[error("JSON parse error in {path} at line {line}, column {column}")]
    JsonParse {
        /// Path to the JSON file.
        path: PathBuf,
        /// One-based line of the error.
        line: usize,
        /// One-based column of the error.
        column: usize,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// Returned when the top-level JSON value is neither an array of records
    /// nor an object of columns.
    #[error("unsupported JSON layout in {path}: expected an array of records or an object of columns, found {found}")]
    UnsupportedLayout {
        /// Path to the JSON file.
        path: PathBuf,
        /// Kind of JSON value found at the top level.
        found: &'static str,
    },

    /// Returned when an element of a records array is not a JSON object.
    #[error("record {row_index} in {path} is not a JSON object")]
    RecordNotObject {
        /// Path to the JSON file.
        path: PathBuf,
        /// Zero-based record index.
        row_index: usize,
    },

    /// Returned when a cell holds an array or object instead of a scalar.
    #[error("non-scalar value in {path}: row {row_index}, column \"{column}\"")]
    NonScalarValue {
        /// Path to the JSON file.
        path: PathBuf,
        /// Zero-based row index.
        row_index: usize,
        /// Column name.
        column: String,
    },

    /// Returned when a column-oriented file uses a row key that is not an integer.
    #[error("invalid row key \"{key}\" in column \"{column}\" of {path}")]
    InvalidRowKey {
        /// Path to the JSON file.
        path: PathBuf,
        /// Column name.
        column: String,
        /// The offending key.
        key: String,
    },

    /// Returned when the file parses but holds zero listings.
    #[error("empty dataset (no listings) in {path}")]
    EmptyDataset {
        /// Path to the JSON file.
        path: PathBuf,
    },

    /// Returned when a column is looked up by name and does not exist.
    #[error("missing column \"{name}\"")]
    MissingColumn {
        /// Name of the missing column.
        name: String,
    },

    /// Returned when a column has the wrong type for the requested access.
    #[error("column \"{name}\" is {found}, expected {expected}")]
    ColumnType {
        /// Column name.
        name: String,
        /// Expected column kind.
        expected: &'static str,
        /// Actual column kind.
        found: &'static str,
    },

    /// Returned when a column or mask length does not match the table height.
    #[error("length mismatch for \"{name}\": got {got} values, table has {expected} rows")]
    LengthMismatch {
        /// Column name (or "row mask").
        name: String,
        /// Number of rows in the table.
        expected: usize,
        /// Number of values supplied.
        got: usize,
    },

    /// Returned when the experiment name contains characters outside `[a-zA-Z0-9_-]`.
    #[error("invalid experiment name \"{name}\": must match [a-zA-Z0-9_-]+")]
    InvalidExperimentName {
        /// The invalid name.
        name: String,
    },

    /// Returned when the output directory cannot be created.
    #[error("cannot create output directory {path}")]
    OutputDirCreate {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when a result artifact cannot be encoded as JSON.
    #[error("cannot encode {path} as JSON")]
    Encode {
        /// Path of the artifact being written.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// Returned when a result file cannot be written.
    #[error("cannot write file {path}")]
    WriteFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}
