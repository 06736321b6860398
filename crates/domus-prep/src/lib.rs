//! Cleaning, categorical encoding, outlier removal and feature engineering
//! for property listings.
//!
//! [`PrepConfig::fit`] turns a [`ListingTable`](domus_io::ListingTable) into a
//! [`FeatureMatrix`] and a [`FittedEncoder`]; the encoder is saved next to the
//! model and replays the same transformation on new listings.

mod encode;
mod error;
mod features;
mod outlier;
mod pipeline;
pub mod schema;
mod serialize;

pub use encode::{UNKNOWN_CODE, Vocabulary, encode_column};
pub use error::PrepError;
pub use features::{
    PostalStats, YearImputer, add_amenities, add_living_area_category, fill_surface_of_good,
    living_area_bin,
};
pub use outlier::{OutlierRule, drop_rare, mean_and_std, quantile, remove_outliers};
pub use pipeline::{FeatureMatrix, FittedEncoder, PrepConfig, PrepReport, Prepared, Scoped, TargetMode};
