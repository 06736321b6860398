//! File I/O, tabular listing data, and result serialization for the domus pipeline.

mod domain;
mod error;
mod reader;
mod writer;

pub use domain::{Column, ExperimentName, ListingTable};
pub use error::IoError;
pub use reader::ListingReader;
pub use writer::{FeatureEntry, MetricsEntry, ResultWriter, ScoreReport, TrainingReport, TrialEntry};
