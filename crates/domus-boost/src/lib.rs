//! Tree-ensemble regression: train, evaluate, tune, predict.
//!
//! Provides hand-rolled CART regression trees, gradient boosting with squared
//! loss and early stopping, a random forest regressor with parallel training
//! via rayon, regression metrics, train/test and k-fold splitting, seeded
//! random hyperparameter search, and model serialization.

mod boosting;
mod error;
mod forest;
mod histogram;
mod importance;
mod metrics;
mod model;
mod node;
mod search;
mod serialize;
mod split;
mod split_data;
mod tree;

pub use boosting::{GradientBoostedModel, GradientBoostingConfig};
pub use error::BoostError;
pub use forest::{MaxFeatures, OobMode, OobScore, RandomForest, RandomForestConfig, RandomForestResult};
pub use importance::RankedFeature;
pub use metrics::{RegressionMetrics, mean_absolute_error, mean_squared_error, r2_score, root_mean_squared_error};
pub use model::{Model, ModelKind, ModelSpec};
pub use node::{FeatureIndex, Impurity, Node, NodeIndex};
pub use search::{
    Direction, ParamSet, ParamSpec, SearchSpace, Study, StudyResult, Trial, TrialRecord, TuneConfig, TuneResult,
    tune,
};
pub use split::SplitMethod;
pub use split_data::{CrossValidationResult, FoldData, KFold, select, train_test_split};
pub use tree::{RegressionTree, RegressionTreeConfig};
